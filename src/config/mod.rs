use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// GitHub CLI settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Polling behaviour while waiting for CI
    #[serde(default)]
    pub poll: PollConfig,

    /// Verdict reduction settings
    #[serde(default)]
    pub verdict: VerdictConfig,

    /// Data directory (where the history database and results are stored)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Path or name of the `gh` executable
    #[serde(default = "default_gh_binary")]
    pub binary: String,

    /// Repository in `owner/name` form. When unset, `gh` infers it from `working_dir`.
    #[serde(default)]
    pub repo: Option<String>,

    /// Directory `gh` commands run in
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Upper bound for a single `gh` invocation
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,
}

/// Timing of the CI poll loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Sleep between two polls
    #[serde(default = "default_poll_interval")]
    pub interval_seconds: u64,

    /// Hard wall-clock bound for the whole poll loop
    #[serde(default = "default_poll_timeout")]
    pub timeout_seconds: u64,

    /// How long to wait for the first check before assuming no CI is configured
    #[serde(default = "default_no_checks_grace")]
    pub no_checks_grace_seconds: u64,

    /// Rollup states that mean the whole PR is finished
    #[serde(default = "default_terminal_rollup_states")]
    pub terminal_rollup_states: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictConfig {
    /// Substrings of a check or workflow name that mark it as test-related
    #[serde(default = "default_test_keywords")]
    pub test_keywords: Vec<String>,

    /// Check names that are bare interpreter versions (per-version test matrix jobs)
    #[serde(default = "default_version_job_pattern")]
    pub version_job_pattern: String,

    /// Maximum number of failing test ids reported per check
    #[serde(default = "default_max_failed_tests")]
    pub max_failed_tests: usize,

    /// Upper bound for fetching a failed build log
    #[serde(default = "default_log_fetch_timeout")]
    pub log_fetch_timeout_seconds: u64,

    /// Error text longer than this is truncated in failure reasons
    #[serde(default = "default_max_error_chars")]
    pub max_error_chars: usize,

    /// Directory artifact downloads are staged in (system temp dir when unset)
    #[serde(default)]
    pub artifact_dir: Option<PathBuf>,
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn no_checks_grace(&self) -> Duration {
        Duration::from_secs(self.no_checks_grace_seconds)
    }
}

impl VerdictConfig {
    pub fn log_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.log_fetch_timeout_seconds)
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_gh_binary() -> String {
    "gh".to_string()
}

fn default_command_timeout() -> u64 {
    60
}

fn default_poll_interval() -> u64 {
    15
}

fn default_poll_timeout() -> u64 {
    600 // 10 minutes
}

fn default_no_checks_grace() -> u64 {
    120
}

fn default_terminal_rollup_states() -> Vec<String> {
    ["SUCCESS", "FAILURE", "ERROR"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_test_keywords() -> Vec<String> {
    ["test", "pytest", "unittest", "ci", "build"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_version_job_pattern() -> String {
    r"^\d+\.\d+$|^pypy\d*$".to_string()
}

fn default_max_failed_tests() -> usize {
    10
}

fn default_log_fetch_timeout() -> u64 {
    30
}

fn default_max_error_chars() -> usize {
    200
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            binary: default_gh_binary(),
            repo: None,
            working_dir: None,
            command_timeout_seconds: default_command_timeout(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_poll_interval(),
            timeout_seconds: default_poll_timeout(),
            no_checks_grace_seconds: default_no_checks_grace(),
            terminal_rollup_states: default_terminal_rollup_states(),
        }
    }
}

impl Default for VerdictConfig {
    fn default() -> Self {
        Self {
            test_keywords: default_test_keywords(),
            version_job_pattern: default_version_job_pattern(),
            max_failed_tests: default_max_failed_tests(),
            log_fetch_timeout_seconds: default_log_fetch_timeout(),
            max_error_chars: default_max_error_chars(),
            artifact_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from file, or create default if not found
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(PathBuf::from).or_else(Self::default_config_path);

        let config = if let Some(ref path) = config_path {
            if path.exists() {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config from {:?}", path))?;
                toml::from_str(&contents)
                    .with_context(|| format!("Failed to parse config from {:?}", path))?
            } else {
                Config::default()
            }
        } else {
            Config::default()
        };

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = path
            .map(PathBuf::from)
            .or_else(Self::default_config_path)
            .context("No config path available")?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config to {:?}", config_path))?;

        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "mutation-verdict", "mutation-verdict")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            ProjectDirs::from("com", "mutation-verdict", "mutation-verdict")
                .map(|dirs| dirs.data_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".mutation-verdict"))
        })
    }

    /// Get the history database file path
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("history.db")
    }

    /// Directory analysis JSON files are written to when none is given
    pub fn results_dir(&self) -> PathBuf {
        self.data_dir().join("results")
    }
}

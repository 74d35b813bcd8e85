//! [`CiProvider`] backed by the GitHub CLI.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;

use crate::artifacts::{archive_file_name, ArtifactMetadata};
use crate::ci::command::{run_command_with_timeout, CommandError, CommandResult};
use crate::ci::{CiProvider, Fetch, ProviderError};
use crate::config::GitHubConfig;

/// Fields requested from `gh pr view`.
const STATUS_FIELDS: &str = "number,title,state,mergeable,statusCheckRollup,url";

/// Fields requested from `gh pr checks`.
const CHECK_FIELDS: &str = "name,state,bucket,completedAt,startedAt,description,link,workflow";

/// Exit code `gh pr checks` uses while checks are still pending.
const CHECKS_PENDING_EXIT_CODE: i32 = 8;

/// GitHub CLI client.
#[derive(Debug, Clone)]
pub struct GhCli {
    binary: String,
    repo: Option<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl GhCli {
    pub fn new(config: &GitHubConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            repo: config.repo.clone(),
            working_dir: config.working_dir.clone(),
            timeout: Duration::from_secs(config.command_timeout_seconds),
        }
    }

    /// Override the target repository (`owner/name`).
    pub fn with_repo(mut self, repo: Option<String>) -> Self {
        if repo.is_some() {
            self.repo = repo;
        }
        self
    }

    fn repo_args(&self) -> Vec<String> {
        match &self.repo {
            Some(repo) => vec!["--repo".to_string(), repo.clone()],
            None => vec![],
        }
    }

    /// Repository path segment for `gh api`; gh expands the placeholders from the
    /// git remote of the working directory.
    fn api_repo(&self) -> &str {
        self.repo.as_deref().unwrap_or("{owner}/{repo}")
    }

    fn describe(&self, args: &[String]) -> String {
        format!("{} {}", self.binary, args.join(" "))
    }

    async fn run(&self, args: Vec<String>) -> Result<CommandResult, ProviderError> {
        let command = self.describe(&args);
        run_command_with_timeout(&self.binary, &args, self.working_dir.as_deref(), self.timeout)
            .await
            .map_err(|e| match e {
                CommandError::Spawn(e) | CommandError::Wait(e) => ProviderError::Spawn {
                    command,
                    reason: e.to_string(),
                },
                CommandError::TimedOut(timeout) => ProviderError::TimedOut {
                    command,
                    seconds: timeout.as_secs(),
                },
            })
    }
}

/// Map a failed gh invocation onto the provider error taxonomy.
fn classify_failure(command: &str, result: &CommandResult) -> ProviderError {
    let stderr = result.stderr.trim();
    let lower = stderr.to_lowercase();

    // "could not resolve host" is a network failure and stays retryable.
    if lower.contains("http 404")
        || lower.contains("not found")
        || lower.contains("could not resolve to a")
    {
        ProviderError::NotFound(stderr.to_string())
    } else if lower.contains("http 401")
        || lower.contains("http 403")
        || lower.contains("gh auth login")
        || lower.contains("authentication")
    {
        ProviderError::Unauthorized(stderr.to_string())
    } else {
        ProviderError::CommandFailed {
            command: command.to_string(),
            code: result.code,
            stderr: stderr.to_string(),
        }
    }
}

/// Interpret the result of `gh pr checks`.
fn interpret_checks(command: &str, result: &CommandResult) -> Fetch<Vec<Value>> {
    if result.success() {
        return match serde_json::from_slice::<Vec<Value>>(&result.stdout) {
            Ok(checks) if checks.is_empty() => Fetch::Empty,
            Ok(checks) => Fetch::Ready(checks),
            Err(e) => Fetch::Failed(ProviderError::Parse(e.to_string())),
        };
    }

    if result.code == Some(CHECKS_PENDING_EXIT_CODE) {
        // Pending checks still print their JSON
        return match serde_json::from_slice::<Vec<Value>>(&result.stdout) {
            Ok(checks) if !checks.is_empty() => Fetch::Ready(checks),
            _ => Fetch::NotYetAvailable,
        };
    }

    let lower = result.stderr.to_lowercase();
    if lower.contains("no checks reported") {
        return Fetch::NotYetAvailable;
    }
    if lower.contains("not found") {
        return Fetch::Empty;
    }

    Fetch::Failed(classify_failure(command, result))
}

impl CiProvider for GhCli {
    async fn fetch_pr_status(&self, pr_number: u64) -> Fetch<Value> {
        let mut args = vec![
            "pr".to_string(),
            "view".to_string(),
            pr_number.to_string(),
            "--json".to_string(),
            STATUS_FIELDS.to_string(),
        ];
        args.extend(self.repo_args());
        let command = self.describe(&args);

        match self.run(args).await {
            Ok(result) if result.success() => match serde_json::from_slice(&result.stdout) {
                Ok(value) => Fetch::Ready(value),
                Err(e) => Fetch::Failed(ProviderError::Parse(e.to_string())),
            },
            Ok(result) => Fetch::Failed(classify_failure(&command, &result)),
            Err(e) => Fetch::Failed(e),
        }
    }

    async fn fetch_pr_checks(&self, pr_number: u64) -> Fetch<Vec<Value>> {
        let mut args = vec![
            "pr".to_string(),
            "checks".to_string(),
            pr_number.to_string(),
            "--json".to_string(),
            CHECK_FIELDS.to_string(),
        ];
        args.extend(self.repo_args());
        let command = self.describe(&args);

        match self.run(args).await {
            Ok(result) => interpret_checks(&command, &result),
            Err(e) => Fetch::Failed(e),
        }
    }

    async fn fetch_run_artifact_list(&self, run_id: u64) -> Fetch<Value> {
        let args = vec![
            "api".to_string(),
            format!("repos/{}/actions/runs/{}/artifacts", self.api_repo(), run_id),
        ];
        let command = self.describe(&args);

        match self.run(args).await {
            Ok(result) if result.success() => match serde_json::from_slice(&result.stdout) {
                Ok(value) => Fetch::Ready(value),
                Err(e) => Fetch::Failed(ProviderError::Parse(e.to_string())),
            },
            Ok(result) => match classify_failure(&command, &result) {
                ProviderError::NotFound(_) => Fetch::Empty,
                other => Fetch::Failed(other),
            },
            Err(e) => Fetch::Failed(e),
        }
    }

    async fn download_run_artifact(
        &self,
        run_id: u64,
        artifact: &ArtifactMetadata,
        dest_dir: &Path,
    ) -> Result<PathBuf, ProviderError> {
        let artifact_id = artifact.id.ok_or_else(|| {
            ProviderError::NotFound(format!(
                "artifact '{}' of run {} has no id",
                artifact.name, run_id
            ))
        })?;
        let args = vec![
            "api".to_string(),
            format!("repos/{}/actions/artifacts/{}/zip", self.api_repo(), artifact_id),
        ];
        let command = self.describe(&args);

        let result = self.run(args).await?;
        if !result.success() {
            return Err(classify_failure(&command, &result));
        }

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| ProviderError::Io(e.to_string()))?;
        let archive_path = dest_dir.join(archive_file_name(&artifact.name));
        tokio::fs::write(&archive_path, &result.stdout)
            .await
            .map_err(|e| ProviderError::Io(e.to_string()))?;

        tracing::debug!(
            "Downloaded artifact {} of run {} ({} bytes)",
            artifact.name,
            run_id,
            result.stdout.len()
        );
        Ok(archive_path)
    }

    async fn fetch_failed_build_log(&self, run_id: u64) -> Fetch<String> {
        let mut args = vec![
            "run".to_string(),
            "view".to_string(),
            run_id.to_string(),
            "--log-failed".to_string(),
        ];
        args.extend(self.repo_args());
        let command = self.describe(&args);

        match self.run(args).await {
            Ok(result) if result.success() => {
                let text = result.stdout_text();
                if text.trim().is_empty() {
                    Fetch::Empty
                } else {
                    Fetch::Ready(text)
                }
            }
            Ok(result) => Fetch::Failed(classify_failure(&command, &result)),
            Err(e) => Fetch::Failed(e),
        }
    }
}

//! Check normalization.
//!
//! CI providers report checks with their own field names and status vocabulary.
//! This module projects them onto [`NormalizedCheck`] with a fixed [`Bucket`] set
//! and aggregates them into a [`CheckSummary`].

pub mod rollup;

pub use rollup::{RawStatus, RollupState};

use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::VerdictConfig;

/// Canonical coarse status of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Pass,
    Fail,
    Pending,
    Skipping,
    Cancel,
    Unknown,
}

impl Bucket {
    /// Map a provider bucket string; anything unrecognised is `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pass" => Self::Pass,
            "fail" => Self::Fail,
            "pending" => Self::Pending,
            "skipping" => Self::Skipping,
            "cancel" => Self::Cancel,
            _ => Self::Unknown,
        }
    }

    /// The check is no longer running.
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Pass | Self::Fail | Self::Cancel | Self::Skipping)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Pending => "pending",
            Self::Skipping => "skipping",
            Self::Cancel => "cancel",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A CI check in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedCheck {
    pub name: String,
    pub state: String,
    pub bucket: Bucket,
    pub url: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub description: String,
    pub workflow: String,
}

impl Default for NormalizedCheck {
    fn default() -> Self {
        Self {
            name: "Unknown".to_string(),
            state: "unknown".to_string(),
            bucket: Bucket::Unknown,
            url: String::new(),
            started_at: None,
            completed_at: None,
            description: String::new(),
            workflow: String::new(),
        }
    }
}

fn string_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::to_string)
}

impl NormalizedCheck {
    /// Project a raw provider record. Never fails: anything missing or of the
    /// wrong type falls back to the defaults.
    pub fn normalize(raw: &Value) -> Self {
        let defaults = Self::default();
        if !raw.is_object() {
            return defaults;
        }

        Self {
            name: string_field(raw, "name").unwrap_or(defaults.name),
            state: string_field(raw, "state").unwrap_or(defaults.state),
            bucket: string_field(raw, "bucket")
                .map(|b| Bucket::parse(&b))
                .unwrap_or(Bucket::Unknown),
            url: string_field(raw, "link")
                .or_else(|| string_field(raw, "url"))
                .unwrap_or_default(),
            started_at: string_field(raw, "startedAt"),
            completed_at: string_field(raw, "completedAt"),
            description: string_field(raw, "description").unwrap_or_default(),
            workflow: string_field(raw, "workflow").unwrap_or_default(),
        }
    }

    /// Workflow run this check belongs to, taken from its URL.
    pub fn run_id(&self) -> Option<u64> {
        extract_run_id(&self.url)
    }
}

/// Normalize a whole list of raw checks, preserving order.
pub fn normalize_all(raw: &[Value]) -> Vec<NormalizedCheck> {
    raw.iter().map(NormalizedCheck::normalize).collect()
}

/// Extract a GitHub Actions run id from a check URL.
///
/// Handles both `.../actions/runs/123/job/456` and `.../runs/123`.
pub fn extract_run_id(url: &str) -> Option<u64> {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = REGEX.get_or_init(|| Regex::new(r"/runs/(\d+)").unwrap());
    regex
        .captures(url)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Aggregate counts over a set of checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSummary {
    pub total_checks: usize,
    pub completed_checks: usize,
    pub running_checks: usize,
    pub passed_checks: usize,
    pub failed_checks: usize,
    pub cancelled_checks: usize,
    pub skipped_checks: usize,
}

impl CheckSummary {
    pub fn from_checks(checks: &[NormalizedCheck]) -> Self {
        let mut summary = Self {
            total_checks: checks.len(),
            ..Default::default()
        };
        for check in checks {
            match check.bucket {
                Bucket::Pass => summary.passed_checks += 1,
                Bucket::Fail => summary.failed_checks += 1,
                Bucket::Cancel => summary.cancelled_checks += 1,
                Bucket::Skipping => summary.skipped_checks += 1,
                Bucket::Pending => summary.running_checks += 1,
                Bucket::Unknown => {}
            }
            if check.bucket.is_completed() {
                summary.completed_checks += 1;
            }
        }
        summary
    }

    /// Every check has finished (and there is at least one).
    pub fn all_finished(&self) -> bool {
        self.total_checks > 0
            && self.running_checks == 0
            && self.completed_checks == self.total_checks
    }
}

/// Normalize raw checks and aggregate them.
pub fn summarize(raw: &[Value]) -> CheckSummary {
    CheckSummary::from_checks(&normalize_all(raw))
}

/// Decides whether a check is part of the test suite.
///
/// Deliberately generous: a false positive costs one extra log fetch, a false
/// negative hides a real test failure.
#[derive(Debug, Clone)]
pub struct TestCheckMatcher {
    keywords: Vec<String>,
    version_job: Regex,
}

impl TestCheckMatcher {
    pub fn new(config: &VerdictConfig) -> Result<Self> {
        let version_job = Regex::new(&config.version_job_pattern).with_context(|| {
            format!(
                "Invalid version job pattern: {}",
                config.version_job_pattern
            )
        })?;
        Ok(Self {
            keywords: config
                .test_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
            version_job,
        })
    }

    pub fn is_test_related(&self, check: &NormalizedCheck) -> bool {
        let name = check.name.to_lowercase();
        let workflow = check.workflow.to_lowercase();

        if self
            .keywords
            .iter()
            .any(|k| name.contains(k.as_str()) || workflow.contains(k.as_str()))
        {
            return true;
        }

        self.version_job.is_match(&name)
    }
}

/// Print-friendly progress lines for a set of checks (at most `limit` checks listed).
pub fn describe_checks(checks: &[NormalizedCheck], limit: usize) -> Vec<String> {
    if checks.is_empty() {
        return vec!["No checks available yet - CI may still be starting up".to_string()];
    }

    let summary = CheckSummary::from_checks(checks);
    let mut lines = vec![
        format!(
            "Checks summary: {} total, {} completed, {} running",
            summary.total_checks, summary.completed_checks, summary.running_checks
        ),
        format!(
            "  Passed: {}, Failed: {}",
            summary.passed_checks, summary.failed_checks
        ),
    ];
    for check in checks.iter().take(limit) {
        lines.push(format!("  - {}: {} ({})", check.name, check.state, check.bucket));
    }
    if checks.len() > limit {
        lines.push(format!("  ... and {} more checks", checks.len() - limit));
    }
    lines
}

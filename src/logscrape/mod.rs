//! Failing-test extraction from raw build logs.
//!
//! Only used when a failed check produced no structured report. Two tiers:
//! the pytest "short test summary info" block when one exists, otherwise
//! individually well-formed failure lines anywhere in the log.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::checks::NormalizedCheck;
use crate::ci::{CiProvider, Fetch, ProviderError};
use crate::config::VerdictConfig;

pub const REASON_OTHER: &str = "due to reasons other than test case failure";
pub const REASON_BUILD_ERRORS: &str = "due to build or runtime errors";

/// `due to N failed test case(s)`
pub fn failed_tests_reason(count: usize) -> String {
    format!("due to {count} failed test case(s)")
}

fn summary_block_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?is)=+ short test summary info =+\s*\n(.*?)\n=+.*?=+").unwrap()
    })
}

fn summary_line_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"FAILED\s+([^\n\r]+)").unwrap())
}

fn punctuation_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[\[\]:()]+$").unwrap())
}

fn pytest_failure_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(
            r"(?im)FAILED\s+((?:tests?/)?[a-zA-Z0-9_/.-]+\.py::[a-zA-Z0-9_]+(?:\s+-\s+[^\n\r]+)?)",
        )
        .unwrap()
    })
}

fn cargo_failure_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?m)\btest\s+([A-Za-z0-9_]+(?:::[A-Za-z0-9_]+)+)\s+\.\.\.\s+FAILED").unwrap()
    })
}

fn push_unique(found: &mut Vec<String>, candidate: &str) {
    let candidate = candidate.trim();
    if !candidate.is_empty() && !found.iter().any(|f| f == candidate) {
        found.push(candidate.to_string());
    }
}

/// Failing-test identifiers found in the summary block, if there is one.
fn from_summary_block(log: &str) -> Vec<String> {
    let mut found = Vec::new();
    let Some(block) = summary_block_regex()
        .captures(log)
        .and_then(|c| c.get(1))
    else {
        return found;
    };

    for capture in summary_line_regex().captures_iter(block.as_str()) {
        let line = capture[1].trim();
        if line.contains("::") && line.len() > 5 && !punctuation_regex().is_match(line) {
            push_unique(&mut found, line);
        }
    }
    found
}

/// Well-formed `FAILED file.py::test` and `test a::b ... FAILED` lines anywhere in the log.
fn from_failure_lines(log: &str) -> Vec<String> {
    let mut found = Vec::new();
    for capture in pytest_failure_regex().captures_iter(log) {
        push_unique(&mut found, &capture[1]);
    }
    for capture in cargo_failure_regex().captures_iter(log) {
        push_unique(&mut found, &capture[1]);
    }
    found
}

/// Best-effort failing-test identifiers from a build log, in order of
/// appearance, at most `limit`.
pub fn extract_failed_tests(log: &str, limit: usize) -> Vec<String> {
    let mut found = from_summary_block(log);
    if found.is_empty() {
        found = from_failure_lines(log);
    }
    found.truncate(limit);
    found
}

/// What the failed-job log says about a failed check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogDetails {
    pub failure_reason: String,
    pub failed_tests: Vec<String>,
    pub log_available: bool,
}

impl LogDetails {
    fn unavailable(reason: String) -> Self {
        Self {
            failure_reason: reason,
            failed_tests: Vec::new(),
            log_available: false,
        }
    }

    /// Classify a fetched log.
    pub fn from_log(log: &str, limit: usize) -> Self {
        let failed_tests = extract_failed_tests(log, limit);
        let failure_reason = if !failed_tests.is_empty() {
            failed_tests_reason(failed_tests.len())
        } else {
            let lower = log.to_lowercase();
            if lower.contains("error") || lower.contains("failed") {
                REASON_BUILD_ERRORS.to_string()
            } else {
                REASON_OTHER.to_string()
            }
        };
        Self {
            failure_reason,
            failed_tests,
            log_available: true,
        }
    }
}

/// First `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// First `max` characters of `text`, with `...` appended when cut.
fn truncate_with_ellipsis(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", truncate_chars(text, max))
    } else {
        text.to_string()
    }
}

fn fetch_failure_reason(error: &ProviderError, max_chars: usize) -> String {
    match error {
        ProviderError::CommandFailed { stderr, .. } => format!(
            "due to unknown reasons (failed to fetch logs: {})",
            truncate_with_ellipsis(stderr.trim(), max_chars)
        ),
        ProviderError::NotFound(msg) | ProviderError::Unauthorized(msg) => format!(
            "due to unknown reasons (failed to fetch logs: {})",
            truncate_with_ellipsis(msg.trim(), max_chars)
        ),
        other => format!(
            "due to unknown reasons (error: {})",
            truncate_chars(&other.to_string(), max_chars)
        ),
    }
}

/// Fetch the failed-job log of a check's run and classify it.
///
/// Never fails: a missing run id, a fetch error or a timeout all produce a
/// detail whose reason says what went wrong.
pub async fn get_failed_check_details<P: CiProvider>(
    provider: &P,
    check: &NormalizedCheck,
    config: &VerdictConfig,
) -> LogDetails {
    let Some(run_id) = check.run_id() else {
        return LogDetails::unavailable(format!(
            "due to unknown reasons (no run ID found in URL: {})",
            check.url
        ));
    };

    let timeout = config.log_fetch_timeout();
    let fetched = match tokio::time::timeout(timeout, provider.fetch_failed_build_log(run_id)).await
    {
        Ok(fetched) => fetched,
        Err(_) => {
            warn!("Timed out fetching failed log of run {}", run_id);
            return LogDetails::unavailable(format!(
                "due to unknown reasons (error: log fetch timed out after {}s)",
                timeout.as_secs()
            ));
        }
    };

    match fetched {
        Fetch::Ready(log) => {
            let details = LogDetails::from_log(&log, config.max_failed_tests);
            debug!(
                "Run {} log: {} failing test(s) found",
                run_id,
                details.failed_tests.len()
            );
            details
        }
        Fetch::Empty => LogDetails::from_log("", config.max_failed_tests),
        Fetch::NotYetAvailable => LogDetails::unavailable(
            "due to unknown reasons (failed to fetch logs: log not yet available)".to_string(),
        ),
        Fetch::Failed(e) => {
            warn!("Could not fetch failed log of run {}: {}", run_id, e);
            LogDetails::unavailable(fetch_failure_reason(&e, config.max_error_chars))
        }
    }
}

//! CI completion polling.
//!
//! Fetches a PR's status and checks on a fixed interval until the run is judged
//! complete or the overall timeout elapses. Completion is decided by
//! [`evaluate`], checked in order:
//!
//! 1. every individual check has finished;
//! 2. the rollup resolves to a terminal state;
//! 3. no checks appeared within the grace period (no CI configured).
//!
//! Individual checks come first because a rollup can stay stale long after
//! every check is done.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::checks::{describe_checks, normalize_all, summarize, CheckSummary, RawStatus, RollupState};
use crate::ci::{CiProvider, Fetch, ProviderError};
use crate::config::PollConfig;

/// Checks listed per progress line.
const PROGRESS_CHECK_LIMIT: usize = 10;

/// Which rule declared the run complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "state", rename_all = "snake_case")]
pub enum CompletionReason {
    AllChecksFinished,
    RollupTerminal(String),
    NoChecksConfigured,
}

impl fmt::Display for CompletionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllChecksFinished => f.write_str("all_checks_finished"),
            Self::RollupTerminal(state) => write!(f, "rollup_terminal({state})"),
            Self::NoChecksConfigured => f.write_str("no_checks_configured"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Waiting,
    Completed(CompletionReason),
    TimedOut,
}

/// Decide the poll state from one observation.
pub fn evaluate(
    summary: &CheckSummary,
    rollup: &RollupState,
    elapsed: Duration,
    config: &PollConfig,
) -> PollState {
    if summary.all_finished() {
        return PollState::Completed(CompletionReason::AllChecksFinished);
    }

    if rollup.is_terminal(&config.terminal_rollup_states) {
        let state = rollup.resolve().unwrap_or_default().to_string();
        return PollState::Completed(CompletionReason::RollupTerminal(state));
    }

    if summary.total_checks == 0 && elapsed > config.no_checks_grace() {
        return PollState::Completed(CompletionReason::NoChecksConfigured);
    }

    if elapsed >= config.timeout() {
        return PollState::TimedOut;
    }

    PollState::Waiting
}

/// What polling ended with. On timeout, carries the last observation made.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub status: Option<RawStatus>,
    pub checks: Vec<Value>,
    pub completed: bool,
    pub timed_out: bool,
    pub no_checks_configured: bool,
    pub completion: Option<CompletionReason>,
    pub elapsed: Duration,
}

impl PollOutcome {
    fn completed(
        status: Option<RawStatus>,
        checks: Vec<Value>,
        reason: CompletionReason,
        elapsed: Duration,
    ) -> Self {
        Self {
            status,
            checks,
            completed: true,
            timed_out: false,
            no_checks_configured: reason == CompletionReason::NoChecksConfigured,
            completion: Some(reason),
            elapsed,
        }
    }

    fn timed_out(status: Option<RawStatus>, checks: Vec<Value>, elapsed: Duration) -> Self {
        Self {
            status,
            checks,
            completed: false,
            timed_out: true,
            no_checks_configured: false,
            completion: None,
            elapsed,
        }
    }
}

/// Polls one PR until its CI is done.
pub struct Poller<'a, P> {
    provider: &'a P,
    config: PollConfig,
}

impl<'a, P: CiProvider> Poller<'a, P> {
    pub fn new(provider: &'a P, config: PollConfig) -> Self {
        Self { provider, config }
    }

    /// Poll until completion or timeout.
    ///
    /// Transient fetch errors are retried at the poll interval. Only an
    /// unrecoverable provider error (unknown PR, missing authorization) ends
    /// polling early.
    pub async fn wait_for_checks(&self, pr_number: u64) -> Result<PollOutcome, ProviderError> {
        let start = Instant::now();
        let timeout = self.config.timeout();
        let mut last_status: Option<RawStatus> = None;
        let mut last_checks: Vec<Value> = Vec::new();

        info!(
            "Waiting for checks on PR #{} (timeout {}s, interval {}s)",
            pr_number,
            timeout.as_secs(),
            self.config.interval_seconds
        );

        loop {
            if start.elapsed() >= timeout {
                break;
            }

            let status = self.fetch_status(pr_number).await?;
            let checks = self.fetch_checks(pr_number).await?;
            let elapsed = start.elapsed();
            info!("Waiting for checks... ({}s elapsed)", elapsed.as_secs());

            // Only this tick's rollup is evaluated.
            let rollup = status
                .as_ref()
                .map(|s| s.rollup.clone())
                .unwrap_or(RollupState::Absent);
            if status.is_some() {
                last_status = status;
            }

            if let Some(checks) = checks {
                log_progress(&rollup, &checks);

                let summary = summarize(&checks);
                let state = evaluate(&summary, &rollup, elapsed, &self.config);
                last_checks = checks;
                match state {
                    PollState::Completed(reason) => {
                        info!("Checks complete for PR #{}: {}", pr_number, reason);
                        return Ok(PollOutcome::completed(
                            last_status,
                            last_checks,
                            reason,
                            elapsed,
                        ));
                    }
                    PollState::TimedOut => break,
                    PollState::Waiting => {}
                }
            }

            let remaining = timeout.saturating_sub(start.elapsed());
            tokio::time::sleep(self.config.interval().min(remaining)).await;
        }

        let elapsed = start.elapsed();
        warn!(
            "Timeout reached after {}s waiting for PR #{}",
            elapsed.as_secs(),
            pr_number
        );
        Ok(PollOutcome::timed_out(last_status, last_checks, elapsed))
    }

    /// `Ok(None)` means retry on the next tick.
    async fn fetch_status(&self, pr_number: u64) -> Result<Option<RawStatus>, ProviderError> {
        match self.provider.fetch_pr_status(pr_number).await {
            Fetch::Ready(value) => {
                let status = RawStatus::from_value(&value);
                if status.is_none() {
                    warn!("Unexpected PR status shape, retrying");
                }
                Ok(status)
            }
            Fetch::Empty | Fetch::NotYetAvailable => {
                debug!("PR #{} status not available yet", pr_number);
                Ok(None)
            }
            Fetch::Failed(e) if e.is_transient() => {
                warn!("Error checking PR status: {}, retrying", e);
                Ok(None)
            }
            Fetch::Failed(e) => Err(e),
        }
    }

    async fn fetch_checks(&self, pr_number: u64) -> Result<Option<Vec<Value>>, ProviderError> {
        match self.provider.fetch_pr_checks(pr_number).await {
            Fetch::Ready(checks) => Ok(Some(checks)),
            Fetch::Empty | Fetch::NotYetAvailable => Ok(Some(Vec::new())),
            Fetch::Failed(e) if e.is_transient() => {
                warn!("Error checking PR checks: {}, retrying", e);
                Ok(None)
            }
            Fetch::Failed(e) => Err(e),
        }
    }
}

fn log_progress(rollup: &RollupState, checks: &[Value]) {
    for line in describe_checks(&normalize_all(checks), PROGRESS_CHECK_LIMIT) {
        info!("{}", line);
    }
    info!("Overall status: {}", rollup.describe());
}

//! Boundary to the CI provider.
//!
//! Everything the verdict engine needs from the outside world (PR status, check
//! lists, run artifacts, failed build logs) goes through [`CiProvider`]. The only
//! production implementation shells out to the GitHub CLI ([`gh::GhCli`]).

pub mod command;
pub mod gh;
#[cfg(test)]
pub mod testing;

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::artifacts::ArtifactMetadata;

/// Errors surfaced by a CI provider call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("`{command}` failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to spawn `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    #[error("`{command}` timed out after {seconds}s")]
    TimedOut { command: String, seconds: u64 },

    #[error("unparseable provider output: {0}")]
    Parse(String),

    #[error("i/o error: {0}")]
    Io(String),
}

impl ProviderError {
    /// Whether retrying the same call later can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::NotFound(_) | Self::Unauthorized(_))
    }
}

/// Outcome of a provider fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetch<T> {
    Ready(T),
    /// The provider answered, but there is nothing there.
    Empty,
    /// The CI system has not started reporting yet.
    NotYetAvailable,
    Failed(ProviderError),
}

impl<T> Fetch<T> {
    /// The fetched value, if any.
    #[cfg(test)]
    pub fn ready(self) -> Option<T> {
        match self {
            Fetch::Ready(value) => Some(value),
            _ => None,
        }
    }
}

/// The calls the verdict engine makes against a CI provider.
///
/// Implementations must report "nothing yet" as [`Fetch::Empty`] or
/// [`Fetch::NotYetAvailable`], never as a failure.
#[allow(async_fn_in_trait)]
pub trait CiProvider {
    /// Raw PR status document (number, url, state, rollup).
    async fn fetch_pr_status(&self, pr_number: u64) -> Fetch<Value>;

    /// Raw per-check records for the PR.
    async fn fetch_pr_checks(&self, pr_number: u64) -> Fetch<Vec<Value>>;

    /// Raw artifact listing for a workflow run.
    async fn fetch_run_artifact_list(&self, run_id: u64) -> Fetch<Value>;

    /// Download one artifact archive into `dest_dir`, returning the path written.
    async fn download_run_artifact(
        &self,
        run_id: u64,
        artifact: &ArtifactMetadata,
        dest_dir: &Path,
    ) -> Result<PathBuf, ProviderError>;

    /// Log text of the failed jobs of a workflow run.
    async fn fetch_failed_build_log(&self, run_id: u64) -> Fetch<String>;
}

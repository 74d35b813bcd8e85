//! Verdict reduction.
//!
//! Turns the final check list of a PR into per-check [`FailureDetail`]s and an
//! overall [`Analysis`]. Failed test checks are explained by an ordered list of
//! [`Strategy`]s: structured artifact reports first, the failed-job log second.

pub mod storage;
pub mod summary;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::artifacts::download_all_test_artifacts;
use crate::checks::{normalize_all, Bucket, CheckSummary, NormalizedCheck, TestCheckMatcher};
use crate::ci::CiProvider;
use crate::config::{Config, VerdictConfig};
use crate::logscrape::{failed_tests_reason, get_failed_check_details};
use crate::poller::{CompletionReason, PollOutcome, Poller};
use crate::report::{parse_report, TestOutcome, TestsSummary};

pub const REASON_UNKNOWN: &str = "due to unknown reasons";
pub const REASON_ARTIFACT_RESULTS: &str = "due to test results reported in artifacts";
pub const NO_DETAILS: &str = "No details available";

/// Report files recovered from one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JunitArtifact {
    pub artifact: String,
    pub files: Vec<String>,
}

/// Why one failed test check failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub check_name: String,
    pub details: String,
    pub failure_reason: String,
    pub failed_tests: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<Vec<TestOutcome>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests_summary: Option<TestsSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub junit_artifacts: Option<Vec<JunitArtifact>>,
    pub log_available: bool,
}

/// What one strategy found out about a failed check.
#[derive(Debug, Clone, PartialEq)]
pub struct Findings {
    pub failure_reason: String,
    pub failed_tests: Vec<String>,
    pub tests: Option<Vec<TestOutcome>>,
    pub tests_summary: Option<TestsSummary>,
    pub junit_artifacts: Option<Vec<JunitArtifact>>,
    pub log_available: bool,
}

impl FailureDetail {
    /// Assemble a detail; without findings the reason is unknown and no tests are listed.
    pub fn new(check: &NormalizedCheck, findings: Option<Findings>) -> Self {
        let details = if check.description.trim().is_empty() {
            NO_DETAILS.to_string()
        } else {
            check.description.clone()
        };

        match findings {
            Some(found) => Self {
                check_name: check.name.clone(),
                details,
                failure_reason: found.failure_reason,
                failed_tests: found.failed_tests,
                tests: found.tests,
                tests_summary: found.tests_summary,
                junit_artifacts: found.junit_artifacts,
                log_available: found.log_available,
            },
            None => Self {
                check_name: check.name.clone(),
                details,
                failure_reason: REASON_UNKNOWN.to_string(),
                failed_tests: Vec::new(),
                tests: None,
                tests_summary: None,
                junit_artifacts: None,
                log_available: false,
            },
        }
    }
}

/// A source of failure information, tried in order until one yields findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// JUnit reports in the run's artifacts.
    Artifacts,
    /// Failing tests scraped from the failed-job log.
    BuildLog,
}

pub const DEFAULT_STRATEGIES: [Strategy; 2] = [Strategy::Artifacts, Strategy::BuildLog];

/// Explains failed test checks.
pub struct Reducer<'a, P> {
    provider: &'a P,
    config: &'a VerdictConfig,
    matcher: TestCheckMatcher,
    strategies: Vec<Strategy>,
    artifact_root: Option<PathBuf>,
}

impl<'a, P: CiProvider> Reducer<'a, P> {
    pub fn new(provider: &'a P, config: &'a VerdictConfig) -> Result<Self> {
        Ok(Self {
            provider,
            config,
            matcher: TestCheckMatcher::new(config)?,
            strategies: DEFAULT_STRATEGIES.to_vec(),
            artifact_root: config.artifact_dir.clone(),
        })
    }

    #[cfg(test)]
    pub fn with_strategies(mut self, strategies: Vec<Strategy>) -> Self {
        self.strategies = strategies;
        self
    }

    /// One detail per failed test check, in check order.
    pub async fn analyze_failed_checks(
        &self,
        checks: &[NormalizedCheck],
    ) -> Vec<FailureDetail> {
        let mut failures = Vec::new();
        for check in checks {
            if check.bucket != Bucket::Fail {
                continue;
            }
            if !self.matcher.is_test_related(check) {
                debug!("Ignoring failed non-test check {}", check.name);
                continue;
            }

            let findings = self.explain(check).await;
            let detail = FailureDetail::new(check, findings);
            info!("{}: {}", detail.check_name, detail.failure_reason);
            failures.push(detail);
        }
        failures
    }

    async fn explain(&self, check: &NormalizedCheck) -> Option<Findings> {
        for strategy in &self.strategies {
            let findings = match strategy {
                Strategy::Artifacts => self.from_artifacts(check).await,
                Strategy::BuildLog => Some(self.from_build_log(check).await),
            };
            if findings.is_some() {
                debug!("{} explained by {:?}", check.name, strategy);
                return findings;
            }
        }
        None
    }

    /// Findings from the JUnit reports of the check's run, if any parse.
    ///
    /// Artifacts are optional: any listing error yields no findings.
    async fn from_artifacts(&self, check: &NormalizedCheck) -> Option<Findings> {
        let run_id = check.run_id()?;

        let downloads =
            match download_all_test_artifacts(self.provider, run_id, self.artifact_root.as_deref())
                .await
            {
                Ok(downloads) => downloads,
                Err(e) => {
                    warn!("Could not list artifacts of run {}: {}", run_id, e);
                    return None;
                }
            };

        let mut tests: Vec<TestOutcome> = Vec::new();
        let mut sources = Vec::new();
        for download in downloads {
            sources.push(JunitArtifact {
                artifact: download.name.clone(),
                files: download
                    .report_paths
                    .iter()
                    .filter_map(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .collect(),
            });
            for path in &download.report_paths {
                tests.extend(parse_report(path, &download.name));
            }
            if let Err(e) = download.cleanup() {
                warn!("{:#}", e);
            }
        }

        if tests.is_empty() {
            return None;
        }

        let failing: Vec<String> = tests
            .iter()
            .filter(|t| t.status.is_failing())
            .map(|t| t.id.clone())
            .collect();
        let failure_reason = if failing.is_empty() {
            REASON_ARTIFACT_RESULTS.to_string()
        } else {
            failed_tests_reason(failing.len())
        };

        Some(Findings {
            failure_reason,
            failed_tests: failing.into_iter().take(self.config.max_failed_tests).collect(),
            tests_summary: Some(TestsSummary::from_outcomes(&tests)),
            tests: Some(tests),
            junit_artifacts: Some(sources),
            log_available: false,
        })
    }

    async fn from_build_log(&self, check: &NormalizedCheck) -> Findings {
        let details = get_failed_check_details(self.provider, check, self.config).await;
        Findings {
            failure_reason: details.failure_reason,
            failed_tests: details.failed_tests,
            tests: None,
            tests_summary: None,
            junit_artifacts: None,
            log_available: details.log_available,
        }
    }
}

/// Overall characterisation of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Killed,
    Survived,
    NoChecksConfigured,
    /// Timed out without observing a failure.
    Undetermined,
    Error,
}

impl Verdict {
    pub fn decide(summary: &CheckSummary, completed: bool, no_checks_configured: bool) -> Self {
        if summary.failed_checks > 0 {
            Self::Killed
        } else if no_checks_configured {
            Self::NoChecksConfigured
        } else if completed {
            Self::Survived
        } else {
            Self::Undetermined
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Killed => "killed",
            Self::Survived => "survived",
            Self::NoChecksConfigured => "no_checks_configured",
            Self::Undetermined => "undetermined",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check counts plus the mutation outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    #[serde(flatten)]
    pub checks: CheckSummary,
    pub test_failures_count: usize,
    pub mutation_killed: bool,
    pub mutation_survived: bool,
}

impl AnalysisSummary {
    pub fn new(checks: CheckSummary, test_failures_count: usize, completed: bool) -> Self {
        Self {
            checks,
            test_failures_count,
            mutation_killed: checks.failed_checks > 0,
            mutation_survived: checks.failed_checks == 0 && completed,
        }
    }
}

/// The result of judging one mutation PR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub pr_number: Option<u64>,
    pub pr_url: Option<String>,
    pub timestamp: DateTime<Local>,
    pub completed: bool,
    #[serde(alias = "timeout")]
    pub timed_out: bool,
    #[serde(default)]
    pub no_checks_configured: bool,
    #[serde(default)]
    pub completion: Option<CompletionReason>,
    pub overall_status: Option<String>,
    pub checks: Vec<NormalizedCheck>,
    pub test_failures: Vec<FailureDetail>,
    pub summary: AnalysisSummary,
    pub verdict: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_trace: Option<String>,
}

impl Analysis {
    /// Assemble the analysis of a finished (or timed out) poll.
    pub fn build(
        pr_number: u64,
        outcome: &PollOutcome,
        checks: Vec<NormalizedCheck>,
        test_failures: Vec<FailureDetail>,
    ) -> Self {
        let check_summary = CheckSummary::from_checks(&checks);
        let summary =
            AnalysisSummary::new(check_summary, test_failures.len(), outcome.completed);
        let status = outcome.status.as_ref();

        Self {
            pr_number: status.and_then(|s| s.number).or(Some(pr_number)),
            pr_url: status.and_then(|s| s.url.clone()),
            timestamp: Local::now(),
            completed: outcome.completed,
            timed_out: outcome.timed_out,
            no_checks_configured: outcome.no_checks_configured,
            completion: outcome.completion.clone(),
            overall_status: status.and_then(|s| s.rollup.overall_status()),
            checks,
            test_failures,
            summary,
            verdict: Verdict::decide(
                &check_summary,
                outcome.completed,
                outcome.no_checks_configured,
            ),
            error: None,
            error_trace: None,
        }
    }

    /// An analysis recording a run that failed before producing a verdict.
    pub fn from_error(pr_number: u64, err: &anyhow::Error) -> Self {
        Self {
            pr_number: Some(pr_number),
            pr_url: None,
            timestamp: Local::now(),
            completed: false,
            timed_out: false,
            no_checks_configured: false,
            completion: None,
            overall_status: None,
            checks: Vec::new(),
            test_failures: Vec::new(),
            summary: AnalysisSummary::default(),
            verdict: Verdict::Error,
            error: Some(format!("{err:#}")),
            error_trace: Some(format!("{err:?}")),
        }
    }
}

/// Poll a PR until its CI is done and judge the mutation.
///
/// Never fails: an unrecoverable error is recorded in the returned analysis.
pub async fn run_verdict<P: CiProvider>(provider: &P, pr_number: u64, config: &Config) -> Analysis {
    match try_run_verdict(provider, pr_number, config).await {
        Ok(analysis) => {
            info!(
                "PR #{}: {} ({} failed check(s))",
                pr_number, analysis.verdict, analysis.summary.checks.failed_checks
            );
            analysis
        }
        Err(e) => {
            error!("Verdict for PR #{} failed: {:#}", pr_number, e);
            Analysis::from_error(pr_number, &e)
        }
    }
}

async fn try_run_verdict<P: CiProvider>(
    provider: &P,
    pr_number: u64,
    config: &Config,
) -> Result<Analysis> {
    let reducer = Reducer::new(provider, &config.verdict)?;
    let outcome = Poller::new(provider, config.poll.clone())
        .wait_for_checks(pr_number)
        .await
        .with_context(|| format!("Failed to poll CI status of PR #{pr_number}"))?;

    debug!(
        "Polling PR #{} ended after {}s",
        pr_number,
        outcome.elapsed.as_secs()
    );

    let checks = normalize_all(&outcome.checks);
    let failures = reducer.analyze_failed_checks(&checks).await;

    Ok(Analysis::build(pr_number, &outcome, checks, failures))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ci::testing::{raw_check, raw_status, MockProvider, JUNIT_ONE_PASS_ONE_FAIL};
    use crate::ci::{Fetch, ProviderError};
    use serde_json::json;

    const RUN_7: &str = "https://github.com/org/repo/actions/runs/7/job/70";

    const FAILED_LOG: &str = "\
=========================== short test summary info ============================
FAILED tests/test_example.py::test_fail - assert 1 == 2
========================= 1 failed, 1 passed in 0.12s ==========================
";

    fn failed_check(name: &str, url: &str) -> NormalizedCheck {
        NormalizedCheck {
            name: name.to_string(),
            state: "COMPLETED".to_string(),
            bucket: Bucket::Fail,
            url: url.to_string(),
            ..Default::default()
        }
    }

    fn timed_out_outcome(checks: Vec<serde_json::Value>) -> PollOutcome {
        PollOutcome {
            status: None,
            checks,
            completed: false,
            timed_out: true,
            no_checks_configured: false,
            completion: None,
            elapsed: std::time::Duration::from_secs(600),
        }
    }

    // =========================================================================
    // Reducer tests
    // =========================================================================

    #[tokio::test]
    async fn test_artifacts_preferred_over_logs() {
        let provider = MockProvider::new()
            .with_artifact(7, "junit-results", &[("reports/junit.xml", JUNIT_ONE_PASS_ONE_FAIL)])
            .with_log(Fetch::Ready(FAILED_LOG.to_string()));
        let config = VerdictConfig::default();
        let reducer = Reducer::new(&provider, &config).unwrap();

        let failures = reducer
            .analyze_failed_checks(&[failed_check("pytest (3.11)", RUN_7)])
            .await;

        assert_eq!(failures.len(), 1);
        let detail = &failures[0];
        assert_eq!(detail.failed_tests, vec!["tests.test_example::test_fail"]);
        assert_eq!(detail.failure_reason, "due to 1 failed test case(s)");
        assert_eq!(
            detail.tests_summary,
            Some(TestsSummary {
                total: 2,
                passed: 1,
                failed: 1,
                errors: 0,
                skipped: 0
            })
        );
        assert_eq!(
            detail.junit_artifacts,
            Some(vec![JunitArtifact {
                artifact: "junit-results".into(),
                files: vec!["junit.xml".into()],
            }])
        );
        assert!(!detail.log_available);
        assert_eq!(detail.details, NO_DETAILS);
        assert_eq!(MockProvider::calls(&provider.log_calls), 0);
    }

    #[tokio::test]
    async fn test_unparseable_report_falls_back_to_logs() {
        let provider = MockProvider::new()
            .with_artifact(7, "junit", &[("junit.xml", "<testsuite><testcase name=\"t\">")])
            .with_log(Fetch::Ready(FAILED_LOG.to_string()));
        let config = VerdictConfig::default();
        let reducer = Reducer::new(&provider, &config).unwrap();

        let failures = reducer
            .analyze_failed_checks(&[failed_check("pytest", RUN_7)])
            .await;

        let detail = &failures[0];
        assert!(detail.log_available);
        assert_eq!(
            detail.failed_tests,
            vec!["tests/test_example.py::test_fail - assert 1 == 2"]
        );
        assert_eq!(detail.tests, None);
        assert_eq!(MockProvider::calls(&provider.log_calls), 1);
    }

    #[tokio::test]
    async fn test_all_passing_report_reason() {
        let passing = r#"<testsuite><testcase classname="t" name="ok"/></testsuite>"#;
        let provider = MockProvider::new().with_artifact(7, "junit", &[("junit.xml", passing)]);
        let config = VerdictConfig::default();
        let reducer = Reducer::new(&provider, &config).unwrap();

        let failures = reducer
            .analyze_failed_checks(&[failed_check("pytest", RUN_7)])
            .await;

        assert_eq!(failures[0].failure_reason, REASON_ARTIFACT_RESULTS);
        assert!(failures[0].failed_tests.is_empty());
    }

    #[tokio::test]
    async fn test_skips_passing_and_non_test_checks() {
        let provider = MockProvider::new();
        let config = VerdictConfig::default();
        let reducer = Reducer::new(&provider, &config).unwrap();

        let mut passing = failed_check("pytest", RUN_7);
        passing.bucket = Bucket::Pass;
        let lint = failed_check("lint", RUN_7);

        let failures = reducer.analyze_failed_checks(&[passing, lint]).await;
        assert!(failures.is_empty());
        assert_eq!(MockProvider::calls(&provider.artifact_list_calls), 0);
    }

    #[tokio::test]
    async fn test_no_strategy_yields_unknown_reason() {
        let provider = MockProvider::new();
        let config = VerdictConfig::default();
        let reducer = Reducer::new(&provider, &config)
            .unwrap()
            .with_strategies(vec![Strategy::Artifacts]);

        let mut check = failed_check("unit tests", RUN_7);
        check.description = "2 failing".to_string();
        let failures = reducer.analyze_failed_checks(&[check]).await;

        assert_eq!(failures[0].failure_reason, REASON_UNKNOWN);
        assert!(failures[0].failed_tests.is_empty());
        assert_eq!(failures[0].details, "2 failing");
    }

    #[tokio::test]
    async fn test_check_without_run_id() {
        let provider = MockProvider::new();
        let config = VerdictConfig::default();
        let reducer = Reducer::new(&provider, &config).unwrap();

        let failures = reducer
            .analyze_failed_checks(&[failed_check("build", "https://ci.example.com/1")])
            .await;

        assert_eq!(
            failures[0].failure_reason,
            "due to unknown reasons (no run ID found in URL: https://ci.example.com/1)"
        );
        assert_eq!(MockProvider::calls(&provider.artifact_list_calls), 0);
    }

    #[tokio::test]
    async fn test_unauthorized_artifact_listing_falls_back_to_logs() {
        let provider = MockProvider::new()
            .with_artifact_list(Fetch::Failed(ProviderError::Unauthorized(
                "HTTP 403: Resource not accessible by integration".into(),
            )))
            .with_log(Fetch::Ready(FAILED_LOG.to_string()));
        let config = VerdictConfig::default();
        let reducer = Reducer::new(&provider, &config).unwrap();

        let failures = reducer
            .analyze_failed_checks(&[failed_check("pytest", RUN_7)])
            .await;

        assert_eq!(failures.len(), 1);
        assert!(failures[0].log_available);
        assert_eq!(failures[0].failure_reason, "due to 1 failed test case(s)");
        assert_eq!(MockProvider::calls(&provider.log_calls), 1);
    }

    #[tokio::test]
    async fn test_missing_artifact_listing_falls_back_to_logs() {
        let provider = MockProvider::new()
            .with_artifact_list(Fetch::Failed(ProviderError::NotFound("run 7".into())))
            .with_log(Fetch::Ready(FAILED_LOG.to_string()));
        let config = VerdictConfig::default();
        let reducer = Reducer::new(&provider, &config).unwrap();

        let failures = reducer
            .analyze_failed_checks(&[failed_check("pytest", RUN_7)])
            .await;
        assert!(failures[0].log_available);
    }

    #[tokio::test]
    async fn test_artifact_failed_tests_are_capped() {
        let cases: String = (0..12)
            .map(|i| {
                format!(
                    r#"<testcase classname="tests.test_many" name="test_{i}"><failure message="boom"/></testcase>"#
                )
            })
            .collect();
        let report = format!("<testsuite>{cases}</testsuite>");
        let provider =
            MockProvider::new().with_artifact(7, "junit", &[("junit.xml", report.as_str())]);
        let config = VerdictConfig::default();
        let reducer = Reducer::new(&provider, &config).unwrap();

        let failures = reducer
            .analyze_failed_checks(&[failed_check("pytest", RUN_7)])
            .await;

        let detail = &failures[0];
        assert_eq!(detail.failed_tests.len(), 10);
        assert_eq!(detail.failed_tests[0], "tests.test_many::test_0");
        assert_eq!(detail.failure_reason, "due to 12 failed test case(s)");
        assert_eq!(detail.tests_summary.map(|s| s.failed), Some(12));
        assert_eq!(detail.tests.as_ref().map(Vec::len), Some(12));
    }

    #[tokio::test]
    async fn test_transient_artifact_error_falls_back() {
        let provider = MockProvider::new()
            .with_artifact_list(Fetch::Failed(ProviderError::Parse("eof".into())))
            .with_log(Fetch::Ready(FAILED_LOG.to_string()));
        let config = VerdictConfig::default();
        let reducer = Reducer::new(&provider, &config).unwrap();

        let failures = reducer
            .analyze_failed_checks(&[failed_check("pytest", RUN_7)])
            .await;
        assert!(failures[0].log_available);
    }

    #[tokio::test]
    async fn test_artifact_storage_is_cleaned_up() {
        let root = tempfile::TempDir::new().unwrap();
        let provider = MockProvider::new()
            .with_artifact(7, "junit", &[("junit.xml", JUNIT_ONE_PASS_ONE_FAIL)]);
        let config = VerdictConfig {
            artifact_dir: Some(root.path().to_path_buf()),
            ..Default::default()
        };
        let reducer = Reducer::new(&provider, &config).unwrap();

        reducer
            .analyze_failed_checks(&[failed_check("pytest", RUN_7)])
            .await;
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    // =========================================================================
    // Verdict and summary tests
    // =========================================================================

    #[test]
    fn test_summary_rule() {
        let failed = CheckSummary {
            total_checks: 2,
            completed_checks: 2,
            passed_checks: 1,
            failed_checks: 1,
            ..Default::default()
        };
        let summary = AnalysisSummary::new(failed, 1, true);
        assert!(summary.mutation_killed);
        assert!(!summary.mutation_survived);

        let passed = CheckSummary {
            total_checks: 1,
            completed_checks: 1,
            passed_checks: 1,
            ..Default::default()
        };
        assert!(AnalysisSummary::new(passed, 0, true).mutation_survived);
        let timed_out = AnalysisSummary::new(passed, 0, false);
        assert!(!timed_out.mutation_killed && !timed_out.mutation_survived);
    }

    #[test]
    fn test_verdict_decide() {
        let none_failed = CheckSummary::default();
        let one_failed = CheckSummary {
            failed_checks: 1,
            ..Default::default()
        };
        assert_eq!(Verdict::decide(&one_failed, false, false), Verdict::Killed);
        assert_eq!(Verdict::decide(&none_failed, true, false), Verdict::Survived);
        assert_eq!(
            Verdict::decide(&none_failed, true, true),
            Verdict::NoChecksConfigured
        );
        assert_eq!(Verdict::decide(&none_failed, false, false), Verdict::Undetermined);
    }

    #[test]
    fn test_build_timed_out_keeps_checks() {
        let raw = vec![
            raw_check("pytest", "pending", RUN_7),
            raw_check("lint", "pass", RUN_7),
        ];
        let outcome = timed_out_outcome(raw.clone());
        let analysis = Analysis::build(42, &outcome, normalize_all(&raw), vec![]);

        assert!(analysis.timed_out);
        assert!(!analysis.completed);
        assert_eq!(analysis.checks.len(), 2);
        assert_eq!(analysis.summary.checks.total_checks, 2);
        assert_eq!(analysis.verdict, Verdict::Undetermined);
        assert!(!analysis.summary.mutation_survived);
        assert_eq!(analysis.pr_number, Some(42));
    }

    #[test]
    fn test_from_error() {
        let err = anyhow::anyhow!(ProviderError::Unauthorized("run gh auth login".into()))
            .context("Failed to poll CI status of PR #42");
        let analysis = Analysis::from_error(42, &err);

        assert_eq!(analysis.verdict, Verdict::Error);
        assert!(!analysis.summary.mutation_killed);
        assert_eq!(analysis.summary.checks.total_checks, 0);
        assert!(analysis.error.unwrap().contains("not authorized"));
        assert!(analysis.error_trace.unwrap().contains("Caused by"));
    }

    #[test]
    fn test_analysis_json_shape() {
        let outcome = timed_out_outcome(vec![]);
        let analysis = Analysis::build(42, &outcome, vec![], vec![]);
        let value = serde_json::to_value(&analysis).unwrap();

        assert_eq!(value["summary"]["total_checks"], json!(0));
        assert_eq!(value["summary"]["mutation_killed"], json!(false));
        assert_eq!(value["verdict"], json!("undetermined"));
        assert!(value.get("error").is_none());

        let back: Analysis = serde_json::from_value(value).unwrap();
        assert_eq!(back.summary, analysis.summary);
    }

    // =========================================================================
    // run_verdict tests
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_run_verdict_killed_via_artifacts() {
        let provider = MockProvider::new()
            .with_status(Fetch::Ready(raw_status(json!({"state": "FAILURE"}))))
            .with_checks(Fetch::Ready(vec![
                raw_check("pytest (3.11)", "fail", RUN_7),
                raw_check("lint", "pass", RUN_7),
            ]))
            .with_artifact(7, "junit", &[("junit.xml", JUNIT_ONE_PASS_ONE_FAIL)]);

        let analysis = run_verdict(&provider, 42, &Config::default()).await;

        assert!(analysis.completed);
        assert_eq!(analysis.verdict, Verdict::Killed);
        assert!(analysis.summary.mutation_killed);
        assert_eq!(analysis.overall_status.as_deref(), Some("FAILURE"));
        assert_eq!(analysis.pr_url.as_deref(), Some("https://github.com/org/repo/pull/42"));
        assert_eq!(analysis.test_failures.len(), 1);
        assert_eq!(analysis.summary.test_failures_count, 1);
        assert_eq!(MockProvider::calls(&provider.log_calls), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_verdict_killed_without_artifact_access() {
        let provider = MockProvider::new()
            .with_status(Fetch::Ready(raw_status(json!({"state": "FAILURE"}))))
            .with_checks(Fetch::Ready(vec![
                raw_check("pytest (3.11)", "fail", RUN_7),
                raw_check("lint", "pass", RUN_7),
            ]))
            .with_artifact_list(Fetch::Failed(ProviderError::Unauthorized(
                "HTTP 403: Resource not accessible by integration".into(),
            )))
            .with_log(Fetch::Ready(FAILED_LOG.to_string()));

        let analysis = run_verdict(&provider, 42, &Config::default()).await;

        assert_eq!(analysis.verdict, Verdict::Killed);
        assert!(analysis.summary.mutation_killed);
        assert!(analysis.error.is_none());
        assert_eq!(analysis.checks.len(), 2);
        assert_eq!(analysis.summary.checks.failed_checks, 1);
        assert_eq!(
            analysis.test_failures[0].failed_tests,
            vec!["tests/test_example.py::test_fail - assert 1 == 2"]
        );
        assert_eq!(MockProvider::calls(&provider.log_calls), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_verdict_no_checks_configured() {
        let provider = MockProvider::new()
            .with_status(Fetch::Ready(raw_status(json!(null))))
            .with_checks(Fetch::Empty);

        let analysis = run_verdict(&provider, 42, &Config::default()).await;

        assert!(analysis.completed);
        assert!(analysis.no_checks_configured);
        assert!(!analysis.summary.mutation_killed);
        assert!(analysis.summary.mutation_survived);
        assert_eq!(analysis.verdict, Verdict::NoChecksConfigured);
        assert_eq!(analysis.overall_status, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_verdict_records_error() {
        let provider = MockProvider::new()
            .with_status(Fetch::Failed(ProviderError::NotFound("PR #42".into())));

        let analysis = run_verdict(&provider, 42, &Config::default()).await;

        assert_eq!(analysis.verdict, Verdict::Error);
        assert!(analysis.error.is_some());
        assert!(!analysis.summary.mutation_killed);
        assert!(analysis.checks.is_empty());
    }
}

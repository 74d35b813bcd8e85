//! Human-readable rendering of an [`Analysis`].

use super::Analysis;

fn or_na(value: Option<&str>) -> &str {
    value.unwrap_or("N/A")
}

/// Summary lines for printing.
pub fn render_summary_lines(analysis: &Analysis) -> Vec<String> {
    let summary = &analysis.summary;
    let mut lines = vec![
        "Mutation testing summary:".to_string(),
        format!(
            "  - Pull request: #{} ({})",
            analysis
                .pr_number
                .map(|n| n.to_string())
                .unwrap_or_else(|| "?".to_string()),
            or_na(analysis.pr_url.as_deref())
        ),
        format!(
            "  - Analyzed at: {}",
            analysis.timestamp.format("%Y-%m-%d %H:%M:%S")
        ),
        format!(
            "  - CI completed: {}{}",
            analysis.completed,
            if analysis.timed_out { " (timed out)" } else { "" }
        ),
    ];

    if let Some(reason) = &analysis.completion {
        lines.push(format!("  - Completion: {reason}"));
    }
    lines.push(format!(
        "  - Overall status: {}",
        or_na(analysis.overall_status.as_deref())
    ));
    lines.push(format!("  - Total checks: {}", summary.checks.total_checks));
    lines.push(format!("  - Passed checks: {}", summary.checks.passed_checks));
    lines.push(format!("  - Failed checks: {}", summary.checks.failed_checks));
    lines.push(format!("  - Mutation killed: {}", summary.mutation_killed));
    lines.push(format!("  - Mutation survived: {}", summary.mutation_survived));
    lines.push(format!("  - Verdict: {}", analysis.verdict));

    if !analysis.test_failures.is_empty() {
        lines.push(String::new());
        lines.push("Detailed failure information:".to_string());
        for failure in &analysis.test_failures {
            lines.push(format!(
                "  * {}: {}",
                failure.check_name, failure.failure_reason
            ));
            if let Some(tests) = &failure.tests_summary {
                lines.push(format!(
                    "    Tests: {} total, {} passed, {} failed, {} errors, {} skipped",
                    tests.total, tests.passed, tests.failed, tests.errors, tests.skipped
                ));
            }
            if !failure.failed_tests.is_empty() {
                lines.push("    Failed tests:".to_string());
                for test in &failure.failed_tests {
                    lines.push(format!("      - {test}"));
                }
            }
        }
    }

    if let Some(error) = &analysis.error {
        lines.push(String::new());
        lines.push("Errors encountered:".to_string());
        lines.push(format!("  - {error}"));
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::CheckSummary;
    use crate::poller::PollOutcome;
    use crate::verdict::{FailureDetail, Verdict};
    use std::time::Duration;

    fn analysis_with_failure() -> Analysis {
        let outcome = PollOutcome {
            status: None,
            checks: vec![],
            completed: true,
            timed_out: false,
            no_checks_configured: false,
            completion: None,
            elapsed: Duration::from_secs(45),
        };
        let mut analysis = Analysis::build(42, &outcome, vec![], vec![]);
        analysis.summary.checks = CheckSummary {
            total_checks: 2,
            completed_checks: 2,
            passed_checks: 1,
            failed_checks: 1,
            ..Default::default()
        };
        analysis.summary.mutation_killed = true;
        analysis.verdict = Verdict::Killed;
        analysis.test_failures = vec![FailureDetail {
            check_name: "pytest (3.11)".into(),
            details: "No details available".into(),
            failure_reason: "due to 1 failed test case(s)".into(),
            failed_tests: vec!["tests.test_example::test_fail".into()],
            tests: None,
            tests_summary: None,
            junit_artifacts: None,
            log_available: true,
        }];
        analysis
    }

    #[test]
    fn test_render_failures() {
        let lines = render_summary_lines(&analysis_with_failure());

        assert_eq!(lines[0], "Mutation testing summary:");
        assert!(lines.contains(&"  - Pull request: #42 (N/A)".to_string()));
        assert!(lines.contains(&"  - Mutation killed: true".to_string()));
        assert!(lines.contains(&"  - Verdict: killed".to_string()));
        assert!(lines
            .contains(&"  * pytest (3.11): due to 1 failed test case(s)".to_string()));
        assert!(lines.contains(&"      - tests.test_example::test_fail".to_string()));
    }

    #[test]
    fn test_render_error() {
        let err = anyhow::anyhow!("gh: command not found");
        let lines = render_summary_lines(&Analysis::from_error(7, &err));

        assert!(lines.contains(&"  - Total checks: 0".to_string()));
        assert!(lines.contains(&"  - Verdict: error".to_string()));
        assert_eq!(lines.last().unwrap(), "  - gh: command not found");
    }
}

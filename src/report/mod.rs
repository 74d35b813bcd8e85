//! JUnit report parsing.
//!
//! Reads `<testsuite>`/`<testsuites>` documents into per-test [`TestOutcome`]s.
//! Malformed documents yield no outcomes instead of an error: a broken report
//! means the caller should try another source, not abort.

use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Error,
    Skipped,
}

impl TestStatus {
    /// The test did not pass and was not skipped.
    pub fn is_failing(self) -> bool {
        matches!(self, Self::Failed | Self::Error)
    }

    fn from_marker(tag: &[u8]) -> Option<Self> {
        match tag {
            b"failure" => Some(Self::Failed),
            b"error" => Some(Self::Error),
            b"skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// One test case recovered from a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub status: TestStatus,
    pub message: Option<String>,
    pub output: Option<String>,
    /// Seconds, as reported by the `time` attribute.
    pub duration: Option<f64>,
    pub source_artifact: String,
    pub source_file: String,
}

/// `namespace::name`, or the bare name when there is no namespace.
pub fn format_test_id(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}::{name}")
    }
}

/// Aggregate counts over a set of test outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestsSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub skipped: usize,
}

impl TestsSummary {
    pub fn from_outcomes(outcomes: &[TestOutcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome.status {
                TestStatus::Passed => summary.passed += 1,
                TestStatus::Failed => summary.failed += 1,
                TestStatus::Error => summary.errors += 1,
                TestStatus::Skipped => summary.skipped += 1,
            }
        }
        summary
    }
}

/// Parse the report at `path`. Unreadable or malformed files yield no outcomes.
pub fn parse_report(path: &Path, artifact_name: &str) -> Vec<TestOutcome> {
    let source_file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let xml = match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!("Could not read report {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    parse_report_str(&xml, artifact_name, &source_file)
}

/// A test case being read.
struct OpenCase {
    depth: usize,
    name: String,
    namespace: String,
    duration: Option<f64>,
    status: TestStatus,
    message: Option<String>,
    output: Option<String>,
    marker: Option<OpenMarker>,
}

/// The outcome marker of the current test case, while its text is read.
struct OpenMarker {
    depth: usize,
    message: Option<String>,
    text: String,
}

fn attribute(element: &BytesStart<'_>, key: &str) -> Option<String> {
    element
        .try_get_attribute(key)
        .ok()
        .flatten()
        .and_then(|attr| attr.unescape_value().ok())
        .map(|v| v.into_owned())
}

impl OpenCase {
    fn new(element: &BytesStart<'_>, depth: usize) -> Self {
        Self {
            depth,
            name: attribute(element, "name")
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| "unknown".to_string()),
            namespace: attribute(element, "classname").unwrap_or_default(),
            duration: attribute(element, "time").and_then(|t| t.trim().parse().ok()),
            status: TestStatus::Passed,
            message: None,
            output: None,
            marker: None,
        }
    }

    /// Only the first outcome marker of a case counts.
    fn has_outcome(&self) -> bool {
        self.status != TestStatus::Passed || self.marker.is_some()
    }

    /// Start reading `element` as this case's outcome marker if it is one.
    fn open_marker(&mut self, element: &BytesStart<'_>, depth: usize) -> bool {
        if depth != self.depth + 1 || self.has_outcome() {
            return false;
        }
        let local = element.local_name();
        let Some(status) = TestStatus::from_marker(local.as_ref()) else {
            return false;
        };
        self.status = status;
        self.marker = Some(OpenMarker {
            depth,
            message: attribute(element, "message"),
            text: String::new(),
        });
        true
    }

    fn close_marker(&mut self, marker: OpenMarker) {
        let text = marker.text.trim();
        let text = (!text.is_empty()).then(|| text.to_string());
        self.message = marker.message.filter(|m| !m.is_empty()).or(text.clone());
        self.output = text;
    }

    fn finish(self, artifact_name: &str, source_file: &str) -> TestOutcome {
        TestOutcome {
            id: format_test_id(&self.namespace, &self.name),
            name: self.name,
            namespace: self.namespace,
            status: self.status,
            message: self.message,
            output: self.output,
            duration: self.duration,
            source_artifact: artifact_name.to_string(),
            source_file: source_file.to_string(),
        }
    }
}

/// Parse report text. Any well-formedness error yields no outcomes.
pub fn parse_report_str(xml: &str, artifact_name: &str, source_file: &str) -> Vec<TestOutcome> {
    let mut reader = Reader::from_str(xml);
    let mut outcomes = Vec::new();
    let mut depth = 0usize;
    let mut current: Option<OpenCase> = None;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                debug!(
                    "Malformed report {} at byte {}: {}",
                    source_file,
                    reader.buffer_position(),
                    e
                );
                return Vec::new();
            }
        };

        match event {
            Event::Start(element) => {
                if let Some(case) = current.as_mut() {
                    case.open_marker(&element, depth);
                } else if is_testcase(&element) {
                    current = Some(OpenCase::new(&element, depth));
                }
                depth += 1;
            }
            Event::Empty(element) => {
                if let Some(case) = current.as_mut() {
                    if case.open_marker(&element, depth) {
                        if let Some(marker) = case.marker.take() {
                            case.close_marker(marker);
                        }
                    }
                } else if is_testcase(&element) {
                    outcomes.push(OpenCase::new(&element, depth).finish(artifact_name, source_file));
                }
            }
            Event::End(_) => {
                if depth == 0 {
                    return Vec::new();
                }
                depth -= 1;

                if let Some(case) = current.as_mut() {
                    if case.marker.as_ref().is_some_and(|m| m.depth == depth) {
                        if let Some(marker) = case.marker.take() {
                            case.close_marker(marker);
                        }
                    } else if case.depth == depth {
                        if let Some(case) = current.take() {
                            outcomes.push(case.finish(artifact_name, source_file));
                        }
                    }
                }
            }
            Event::Text(text) => {
                if let Some(marker) = marker_at(&mut current, depth) {
                    match text.unescape() {
                        Ok(text) => marker.text.push_str(&text),
                        Err(_) => return Vec::new(),
                    }
                }
            }
            Event::CData(data) => {
                if let Some(marker) = marker_at(&mut current, depth) {
                    marker.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        debug!("Report {} ended with unclosed elements", source_file);
        return Vec::new();
    }

    outcomes
}

fn is_testcase(element: &BytesStart<'_>) -> bool {
    element.local_name().as_ref() == b"testcase"
}

/// The open marker whose direct text is at `depth`.
fn marker_at(current: &mut Option<OpenCase>, depth: usize) -> Option<&mut OpenMarker> {
    current
        .as_mut()
        .and_then(|case| case.marker.as_mut())
        .filter(|marker| marker.depth + 1 == depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ci::testing::JUNIT_ONE_PASS_ONE_FAIL;
    use tempfile::TempDir;

    fn parse(xml: &str) -> Vec<TestOutcome> {
        parse_report_str(xml, "junit", "junit.xml")
    }

    // =========================================================================
    // parse tests
    // =========================================================================

    #[test]
    fn test_parse_pass_and_fail() {
        let outcomes = parse(JUNIT_ONE_PASS_ONE_FAIL);
        assert_eq!(outcomes.len(), 2);

        assert_eq!(outcomes[0].id, "tests.test_example::test_pass");
        assert_eq!(outcomes[0].status, TestStatus::Passed);
        assert_eq!(outcomes[0].duration, Some(0.001));
        assert_eq!(outcomes[0].message, None);

        let failed = &outcomes[1];
        assert_eq!(failed.id, "tests.test_example::test_fail");
        assert_eq!(failed.namespace, "tests.test_example");
        assert_eq!(failed.status, TestStatus::Failed);
        assert_eq!(failed.message.as_deref(), Some("assert 1 == 2"));
        assert!(failed.output.as_deref().unwrap().contains(">       assert 1 == 2"));
        assert_eq!(failed.source_artifact, "junit");
        assert_eq!(failed.source_file, "junit.xml");
    }

    #[test]
    fn test_parse_bare_testsuite_without_classname() {
        let xml = r#"<testsuite name="s"><testcase name="only_name"/></testsuite>"#;
        let outcomes = parse(xml);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].id, "only_name");
        assert_eq!(outcomes[0].namespace, "");
    }

    #[test]
    fn test_parse_error_and_skipped_markers() {
        let xml = r#"<testsuite>
            <testcase classname="m" name="a"><error message="boom"/></testcase>
            <testcase classname="m" name="b"><skipped/></testcase>
            <testcase classname="m" name="c"><skipped>not on linux</skipped></testcase>
        </testsuite>"#;
        let outcomes = parse(xml);

        assert_eq!(outcomes[0].status, TestStatus::Error);
        assert_eq!(outcomes[0].message.as_deref(), Some("boom"));
        assert_eq!(outcomes[0].output, None);
        assert_eq!(outcomes[1].status, TestStatus::Skipped);
        assert_eq!(outcomes[1].message, None);
        assert_eq!(outcomes[2].message.as_deref(), Some("not on linux"));
    }

    #[test]
    fn test_first_marker_wins() {
        let xml = r#"<testsuite>
            <testcase name="t">
              <system-out>noise</system-out>
              <failure message="first">trace</failure>
              <error message="second"/>
            </testcase>
        </testsuite>"#;
        let outcomes = parse(xml);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, TestStatus::Failed);
        assert_eq!(outcomes[0].message.as_deref(), Some("first"));
        assert_eq!(outcomes[0].output.as_deref(), Some("trace"));
    }

    #[test]
    fn test_namespaced_tags() {
        let xml = r#"<j:testsuites xmlns:j="urn:junit">
            <j:testsuite>
              <j:testcase classname="pkg" name="t"><j:failure message="m"/></j:testcase>
            </j:testsuite>
        </j:testsuites>"#;
        let outcomes = parse(xml);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, TestStatus::Failed);
    }

    #[test]
    fn test_cdata_output() {
        let xml = r#"<testsuite><testcase name="t"><failure><![CDATA[x < y]]></failure></testcase></testsuite>"#;
        let outcomes = parse(xml);
        assert_eq!(outcomes[0].output.as_deref(), Some("x < y"));
        assert_eq!(outcomes[0].message.as_deref(), Some("x < y"));
    }

    #[test]
    fn test_missing_name_defaults() {
        let outcomes = parse(r#"<testsuite><testcase classname="c"/></testsuite>"#);
        assert_eq!(outcomes[0].name, "unknown");
        assert_eq!(outcomes[0].id, "c::unknown");
    }

    #[test]
    fn test_malformed_documents_yield_nothing() {
        for xml in [
            "",
            "not xml at all",
            "<testsuite><testcase name=\"a\"></testsuite>",
            "<testsuite><testcase name=\"a\"/>",
            "<testsuite><testcase name=\"a\"/></testsuite></extra>",
        ] {
            assert!(parse(xml).is_empty(), "xml: {xml}");
        }
    }

    #[test]
    fn test_parse_report_missing_file() {
        assert!(parse_report(Path::new("/nonexistent/junit.xml"), "junit").is_empty());
    }

    #[test]
    fn test_parse_report_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.xml");
        std::fs::write(&path, JUNIT_ONE_PASS_ONE_FAIL).unwrap();

        let outcomes = parse_report(&path, "py311");
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[1].source_file, "results.xml");
        assert_eq!(outcomes[1].source_artifact, "py311");
    }

    // =========================================================================
    // summary tests
    // =========================================================================

    #[test]
    fn test_tests_summary() {
        let summary = TestsSummary::from_outcomes(&parse(JUNIT_ONE_PASS_ONE_FAIL));
        assert_eq!(
            summary,
            TestsSummary {
                total: 2,
                passed: 1,
                failed: 1,
                errors: 0,
                skipped: 0
            }
        );
        assert_eq!(TestsSummary::from_outcomes(&[]), TestsSummary::default());
    }
}

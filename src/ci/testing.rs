//! Scripted in-memory [`CiProvider`] for tests.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::{json, Value};

use crate::artifacts::{archive_file_name, ArtifactMetadata};
use crate::ci::{CiProvider, Fetch, ProviderError};

/// One artifact the mock can serve: its name and the files inside its zip.
#[derive(Debug, Clone)]
pub struct MockArtifact {
    pub name: String,
    pub files: Vec<(String, String)>,
    pub fail_download: bool,
}

/// Provider whose answers are scripted up front.
///
/// Status and check scripts are consumed one entry per call; the last entry
/// repeats forever.
#[derive(Default)]
pub struct MockProvider {
    statuses: Mutex<VecDeque<Fetch<Value>>>,
    checks: Mutex<VecDeque<Fetch<Vec<Value>>>>,
    artifacts: HashMap<u64, Vec<MockArtifact>>,
    artifact_list: Option<Fetch<Value>>,
    log: Option<Fetch<String>>,
    log_delay: Option<Duration>,
    pub status_calls: AtomicUsize,
    pub check_calls: AtomicUsize,
    pub artifact_list_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
    pub log_calls: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(self, status: Fetch<Value>) -> Self {
        self.statuses.lock().unwrap().push_back(status);
        self
    }

    pub fn with_checks(self, checks: Fetch<Vec<Value>>) -> Self {
        self.checks.lock().unwrap().push_back(checks);
        self
    }

    pub fn with_artifact(mut self, run_id: u64, name: &str, files: &[(&str, &str)]) -> Self {
        self.artifacts.entry(run_id).or_default().push(MockArtifact {
            name: name.to_string(),
            files: files
                .iter()
                .map(|(path, body)| (path.to_string(), body.to_string()))
                .collect(),
            fail_download: false,
        });
        self
    }

    pub fn with_failing_artifact(mut self, run_id: u64, name: &str) -> Self {
        self.artifacts.entry(run_id).or_default().push(MockArtifact {
            name: name.to_string(),
            files: vec![],
            fail_download: true,
        });
        self
    }

    /// Serve this raw listing instead of one derived from the registered artifacts.
    pub fn with_artifact_list(mut self, listing: Fetch<Value>) -> Self {
        self.artifact_list = Some(listing);
        self
    }

    pub fn with_log(mut self, log: Fetch<String>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_log_delay(mut self, delay: Duration) -> Self {
        self.log_delay = Some(delay);
        self
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

fn next_scripted<T: Clone>(script: &Mutex<VecDeque<Fetch<T>>>) -> Fetch<T> {
    let mut script = script.lock().unwrap();
    if script.len() > 1 {
        script.pop_front().unwrap_or(Fetch::Empty)
    } else {
        script.front().cloned().unwrap_or(Fetch::Empty)
    }
}

impl CiProvider for MockProvider {
    async fn fetch_pr_status(&self, _pr_number: u64) -> Fetch<Value> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        next_scripted(&self.statuses)
    }

    async fn fetch_pr_checks(&self, _pr_number: u64) -> Fetch<Vec<Value>> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        next_scripted(&self.checks)
    }

    async fn fetch_run_artifact_list(&self, run_id: u64) -> Fetch<Value> {
        self.artifact_list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(listing) = &self.artifact_list {
            return listing.clone();
        }
        match self.artifacts.get(&run_id) {
            Some(artifacts) => {
                let entries: Vec<Value> = artifacts
                    .iter()
                    .enumerate()
                    .map(|(idx, a)| json!({"id": idx + 1, "name": a.name, "expired": false}))
                    .collect();
                Fetch::Ready(json!({"total_count": entries.len(), "artifacts": entries}))
            }
            None => Fetch::Empty,
        }
    }

    async fn download_run_artifact(
        &self,
        run_id: u64,
        artifact: &ArtifactMetadata,
        dest_dir: &Path,
    ) -> Result<PathBuf, ProviderError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let served = self
            .artifacts
            .get(&run_id)
            .and_then(|list| list.iter().find(|a| a.name == artifact.name))
            .ok_or_else(|| ProviderError::NotFound(artifact.name.clone()))?;

        if served.fail_download {
            return Err(ProviderError::CommandFailed {
                command: format!("download {}", artifact.name),
                code: Some(1),
                stderr: "simulated download failure".to_string(),
            });
        }

        std::fs::create_dir_all(dest_dir).map_err(|e| ProviderError::Io(e.to_string()))?;
        let path = dest_dir.join(archive_file_name(&artifact.name));
        let files: Vec<(&str, &str)> = served
            .files
            .iter()
            .map(|(p, b)| (p.as_str(), b.as_str()))
            .collect();
        write_zip(&path, &files);
        Ok(path)
    }

    async fn fetch_failed_build_log(&self, _run_id: u64) -> Fetch<String> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.log_delay {
            tokio::time::sleep(delay).await;
        }
        self.log.clone().unwrap_or(Fetch::Empty)
    }
}

/// Write a zip archive containing `files` (path, contents).
pub fn write_zip(path: &Path, files: &[(&str, &str)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for (name, contents) in files {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

/// A raw check record shaped like `gh pr checks --json` output.
pub fn raw_check(name: &str, bucket: &str, link: &str) -> Value {
    json!({
        "name": name,
        "state": if bucket == "pending" { "IN_PROGRESS" } else { "COMPLETED" },
        "bucket": bucket,
        "link": link,
        "startedAt": "2026-01-01T00:00:00Z",
        "completedAt": "2026-01-01T00:05:00Z",
        "description": "",
        "workflow": "Tests",
    })
}

/// A raw PR status document with the given rollup.
pub fn raw_status(rollup: Value) -> Value {
    json!({
        "number": 42,
        "title": "Mutation Test: flip comparison",
        "state": "OPEN",
        "url": "https://github.com/org/repo/pull/42",
        "statusCheckRollup": rollup,
    })
}

/// JUnit document with one passing and one failing test case.
pub const JUNIT_ONE_PASS_ONE_FAIL: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<testsuites>
  <testsuite name="pytest" errors="0" failures="1" skipped="0" tests="2" time="0.05">
    <testcase classname="tests.test_example" name="test_pass" time="0.001" />
    <testcase classname="tests.test_example" name="test_fail" time="0.002">
      <failure message="assert 1 == 2">def test_fail():
&gt;       assert 1 == 2
E       assert 1 == 2</failure>
    </testcase>
  </testsuite>
</testsuites>
"#;

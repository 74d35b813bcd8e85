//! Artifact resolution.
//!
//! Lists the artifacts of a workflow run, downloads and extracts them into
//! scoped temporary storage, and finds the JUnit reports inside.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tempfile::TempDir;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::ci::{CiProvider, Fetch, ProviderError};

/// How many leading bytes of an XML file are inspected for a report root.
const REPORT_SNIFF_BYTES: usize = 256;

/// One entry of a run's artifact listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArtifactMetadata {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size_in_bytes: Option<u64>,
    #[serde(default)]
    pub expired: bool,
}

/// File name an artifact archive is stored under.
pub fn archive_file_name(artifact_name: &str) -> String {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = REGEX.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.\-]").unwrap());
    format!("{}.zip", regex.replace_all(artifact_name, "-"))
}

/// List the usable artifacts of a run.
///
/// A malformed or empty listing is an empty list. Expired and unnamed
/// artifacts are skipped.
pub async fn list_run_artifacts<P: CiProvider>(
    provider: &P,
    run_id: u64,
) -> Result<Vec<ArtifactMetadata>, ProviderError> {
    let listing = match provider.fetch_run_artifact_list(run_id).await {
        Fetch::Ready(listing) => listing,
        Fetch::Empty | Fetch::NotYetAvailable => return Ok(Vec::new()),
        Fetch::Failed(e) => return Err(e),
    };
    Ok(parse_artifact_listing(&listing))
}

fn parse_artifact_listing(listing: &Value) -> Vec<ArtifactMetadata> {
    let entries = match listing {
        Value::Array(entries) => entries,
        Value::Object(_) => match listing.get("artifacts") {
            Some(Value::Array(entries)) => entries,
            _ => {
                warn!("Artifact listing has no artifacts array");
                return Vec::new();
            }
        },
        _ => {
            warn!("Unexpected artifact listing type");
            return Vec::new();
        }
    };

    entries
        .iter()
        .filter_map(|entry| serde_json::from_value::<ArtifactMetadata>(entry.clone()).ok())
        .filter(|artifact| {
            if artifact.expired {
                debug!("Skipping expired artifact {}", artifact.name);
                return false;
            }
            !artifact.name.is_empty()
        })
        .collect()
}

/// A downloaded and extracted artifact.
///
/// Owns its temporary storage: everything under it is removed when the value
/// is dropped or [`ArtifactDownload::cleanup`] is called.
#[derive(Debug)]
pub struct ArtifactDownload {
    pub name: String,
    pub archive_path: PathBuf,
    pub extract_path: PathBuf,
    pub report_paths: Vec<PathBuf>,
    storage: TempDir,
}

impl ArtifactDownload {
    /// Root of this download's temporary storage.
    #[cfg(test)]
    pub fn storage_path(&self) -> &Path {
        self.storage.path()
    }

    /// Delete the temporary storage now, reporting failures.
    pub fn cleanup(self) -> Result<()> {
        let path = self.storage.path().to_path_buf();
        self.storage
            .close()
            .with_context(|| format!("Failed to remove artifact storage {}", path.display()))
    }
}

fn storage_for(name: &str, root: Option<&Path>) -> Result<TempDir> {
    let prefix = format!("artifact-{}-", archive_file_name(name).trim_end_matches(".zip"));
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix);
    let storage = match root {
        Some(root) => {
            fs::create_dir_all(root)
                .with_context(|| format!("Failed to create {}", root.display()))?;
            builder.tempdir_in(root)
        }
        None => builder.tempdir(),
    };
    storage.context("Failed to create artifact storage")
}

/// Download one artifact into fresh temporary storage, extract it and
/// discover the test reports it contains.
pub async fn download_artifact<P: CiProvider>(
    provider: &P,
    run_id: u64,
    artifact: &ArtifactMetadata,
    root: Option<&Path>,
) -> Result<ArtifactDownload> {
    debug!(
        "Downloading artifact {} of run {} ({} bytes)",
        artifact.name,
        run_id,
        artifact
            .size_in_bytes
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".to_string())
    );
    let storage = storage_for(&artifact.name, root)?;
    let archive_dir = storage.path().join("archives");
    let extract_path = storage.path().join("extracted");
    fs::create_dir_all(&archive_dir).context("Failed to create archive directory")?;
    fs::create_dir_all(&extract_path).context("Failed to create extraction directory")?;

    let written = provider
        .download_run_artifact(run_id, artifact, &archive_dir)
        .await
        .with_context(|| format!("Failed to download artifact {}", artifact.name))?;

    let archive_path = if written.is_file() {
        written
    } else {
        resolve_archive_path(&archive_dir, &artifact.name)?
    };

    let (archive, dest) = (archive_path.clone(), extract_path.clone());
    tokio::task::spawn_blocking(move || extract_zip(&archive, &dest))
        .await
        .context("Extraction task panicked")??;

    let report_paths = discover_test_reports(&extract_path);
    debug!(
        "Extracted {} to {}: {} report file(s)",
        archive_path.display(),
        extract_path.display(),
        report_paths.len()
    );

    Ok(ArtifactDownload {
        name: artifact.name.clone(),
        archive_path,
        extract_path,
        report_paths,
        storage,
    })
}

/// Download every artifact of a run, keeping only those holding test reports.
///
/// A failure on one artifact skips that artifact; a failure to list the run's
/// artifacts is returned.
pub async fn download_all_test_artifacts<P: CiProvider>(
    provider: &P,
    run_id: u64,
    root: Option<&Path>,
) -> Result<Vec<ArtifactDownload>, ProviderError> {
    let artifacts = list_run_artifacts(provider, run_id).await?;
    let mut downloads = Vec::new();

    for artifact in &artifacts {
        match download_artifact(provider, run_id, artifact, root).await {
            Ok(download) if !download.report_paths.is_empty() => downloads.push(download),
            Ok(_) => debug!("Artifact {} has no test reports", artifact.name),
            Err(e) => warn!("Skipping artifact {} of run {}: {:#}", artifact.name, run_id, e),
        }
    }

    Ok(downloads)
}

/// The archive for `artifact_name` in `archive_dir`: the exact file name when
/// present, otherwise the most recently modified zip.
pub fn resolve_archive_path(archive_dir: &Path, artifact_name: &str) -> Result<PathBuf> {
    for candidate in [
        archive_dir.join(format!("{artifact_name}.zip")),
        archive_dir.join(archive_file_name(artifact_name)),
    ] {
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    let pattern = archive_dir.join("*.zip");
    let pattern = pattern.to_string_lossy();
    let newest = glob::glob(&pattern)
        .context("Invalid archive glob")?
        .filter_map(|entry| entry.ok())
        .filter_map(|path| {
            let modified = path.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, path))
        })
        .max_by_key(|(modified, _)| *modified);

    match newest {
        Some((_, path)) => Ok(path),
        None => bail!("No zip archive found after downloading artifact '{artifact_name}'"),
    }
}

/// Extract `archive` under `dest`. Entries that would escape `dest` are skipped.
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file =
        fs::File::open(archive).with_context(|| format!("Failed to open {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(file)
        .with_context(|| format!("Not a zip archive: {}", archive.display()))?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping unsafe archive entry {}", entry.name());
            continue;
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&target)
            .with_context(|| format!("Failed to create {}", target.display()))?;
        io::copy(&mut entry, &mut out)?;
    }

    Ok(())
}

/// Recursively find XML files under `root` that open with a test suite element.
pub fn discover_test_reports(root: &Path) -> Vec<PathBuf> {
    let mut reports: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
        })
        .filter(|e| looks_like_test_report(e.path()))
        .map(|e| e.into_path())
        .collect();
    reports.sort();
    reports
}

fn looks_like_test_report(path: &Path) -> bool {
    use std::io::Read;

    let Ok(file) = fs::File::open(path) else {
        return false;
    };
    let mut head = Vec::with_capacity(REPORT_SNIFF_BYTES);
    if file
        .take(REPORT_SNIFF_BYTES as u64)
        .read_to_end(&mut head)
        .is_err()
    {
        return false;
    }
    let snippet = String::from_utf8_lossy(&head).to_lowercase();
    snippet.contains("<testsuite")
}

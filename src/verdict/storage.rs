//! JSON persistence of analyses.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::Analysis;

/// `test_results_pr_<n>_<YYYYmmdd_HHMMSS>.json`
pub fn results_file_name(analysis: &Analysis) -> String {
    let pr = analysis
        .pr_number
        .map(|n| n.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "test_results_pr_{}_{}.json",
        pr,
        analysis.timestamp.format("%Y%m%d_%H%M%S")
    )
}

/// Write `analysis` as pretty JSON into `dir`, returning the file written.
pub fn save_results(analysis: &Analysis, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create results directory: {:?}", dir))?;

    let path = dir.join(results_file_name(analysis));
    let contents =
        serde_json::to_string_pretty(analysis).context("Failed to serialize analysis")?;
    std::fs::write(&path, contents)
        .with_context(|| format!("Failed to write results to {:?}", path))?;

    Ok(path)
}

/// Read an analysis written by [`save_results`].
pub fn load_results(path: &Path) -> Result<Analysis> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read results from {:?}", path))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse results from {:?}", path))
}

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One recorded analysis, without its full JSON
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AnalysisRecord {
    pub id: i64,
    pub pr_number: Option<i64>,
    pub pr_url: Option<String>,
    /// killed, survived, no_checks_configured, undetermined or error
    pub verdict: String,
    pub completed: bool,
    pub timed_out: bool,
    pub total_checks: i64,
    pub passed_checks: i64,
    pub failed_checks: i64,
    pub test_failures_count: i64,
    pub mutation_killed: bool,
    pub mutation_survived: bool,
    pub error: Option<String>,
    pub results_path: Option<String>,
    pub created_at: String,
}

mod models;

pub use models::*;

use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;

use crate::verdict::Analysis;

/// Database wrapper for SQLite operations
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Create a new database connection
    pub async fn new(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
        }

        let database_url = format!("sqlite:{}?mode=rwc", path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await
            .with_context(|| format!("Failed to connect to database: {}", database_url))?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analyses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pr_number INTEGER,
                pr_url TEXT,
                verdict TEXT NOT NULL,
                completed INTEGER NOT NULL,
                timed_out INTEGER NOT NULL,
                total_checks INTEGER NOT NULL,
                passed_checks INTEGER NOT NULL,
                failed_checks INTEGER NOT NULL,
                test_failures_count INTEGER NOT NULL,
                mutation_killed INTEGER NOT NULL,
                mutation_survived INTEGER NOT NULL,
                error TEXT,
                results_path TEXT,
                analysis_json TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create analyses table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_analyses_pr ON analyses(pr_number)")
            .execute(&self.pool)
            .await
            .context("Failed to create analyses index")?;

        Ok(())
    }

    /// Record a finished analysis, returning its row id
    pub async fn insert_analysis(
        &self,
        analysis: &Analysis,
        results_path: Option<&Path>,
    ) -> Result<i64> {
        let json = serde_json::to_string(analysis).context("Failed to serialize analysis")?;
        let summary = &analysis.summary;

        let row = sqlx::query(
            r#"
            INSERT INTO analyses (
                pr_number, pr_url, verdict, completed, timed_out,
                total_checks, passed_checks, failed_checks, test_failures_count,
                mutation_killed, mutation_survived, error, results_path, analysis_json
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(analysis.pr_number.map(|n| n as i64))
        .bind(analysis.pr_url.as_deref())
        .bind(analysis.verdict.as_str())
        .bind(analysis.completed)
        .bind(analysis.timed_out)
        .bind(summary.checks.total_checks as i64)
        .bind(summary.checks.passed_checks as i64)
        .bind(summary.checks.failed_checks as i64)
        .bind(summary.test_failures_count as i64)
        .bind(summary.mutation_killed)
        .bind(summary.mutation_survived)
        .bind(analysis.error.as_deref())
        .bind(results_path.map(|p| p.display().to_string()))
        .bind(json)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert analysis")?;

        Ok(sqlx::Row::get(&row, "id"))
    }

    /// Most recent analyses, newest first
    pub async fn get_recent_analyses(&self, limit: i64) -> Result<Vec<AnalysisRecord>> {
        let records = sqlx::query_as::<_, AnalysisRecord>(
            r#"
            SELECT id, pr_number, pr_url, verdict, completed, timed_out,
                   total_checks, passed_checks, failed_checks, test_failures_count,
                   mutation_killed, mutation_survived, error, results_path, created_at
            FROM analyses
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch analyses")?;

        Ok(records)
    }

    /// The full analysis stored under `id`
    pub async fn get_analysis(&self, id: i64) -> Result<Option<Analysis>> {
        let json: Option<String> =
            sqlx::query_scalar("SELECT analysis_json FROM analyses WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to fetch analysis")?;

        json.map(|json| serde_json::from_str(&json).context("Failed to parse stored analysis"))
            .transpose()
    }
}

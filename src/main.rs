mod artifacts;
mod checks;
mod ci;
mod config;
mod db;
mod logscrape;
mod poller;
mod report;
mod verdict;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::ci::gh::GhCli;
use crate::config::Config;
use crate::db::Database;
use crate::verdict::storage::{load_results, save_results};
use crate::verdict::summary::render_summary_lines;
use crate::verdict::{run_verdict, Verdict};

#[derive(Parser)]
#[command(name = "mutation-verdict")]
#[command(version)]
#[command(about = "Decides whether a mutation pull request was killed or survived by its CI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for a PR's CI to finish and judge the mutation
    Watch {
        /// Pull request number
        #[arg(long)]
        pr: u64,

        /// Repository as owner/name (defaults to the configured one)
        #[arg(long)]
        repo: Option<String>,

        /// Overall polling timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Directory the results JSON is written to
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the summary of a saved analysis
    Show {
        /// Path to a test_results_pr_*.json file
        path: Option<PathBuf>,

        /// History id of a recorded analysis
        #[arg(long, conflicts_with = "path")]
        id: Option<i64>,
    },
    /// List recently recorded analyses
    History {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Write a configuration file with every default filled in
    InitConfig,
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.clone().or_else(Config::default_config_path);
    let mut config = Config::load(cli.config.as_deref())?;
    init_logging(&config);

    tracing::debug!(
        "Config path: {}",
        config_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none, using defaults)".to_string())
    );

    match cli.command {
        Commands::Watch {
            pr,
            repo,
            timeout,
            output,
        } => {
            if let Some(timeout) = timeout {
                config.poll.timeout_seconds = timeout;
            }

            let provider = GhCli::new(&config.github).with_repo(repo);
            let analysis = run_verdict(&provider, pr, &config).await;

            let results_dir = output.unwrap_or_else(|| config.results_dir());
            let results_path = save_results(&analysis, &results_dir)?;
            tracing::info!("Results saved to {}", results_path.display());

            let db = Database::new(&config.database_path()).await?;
            db.run_migrations().await?;
            db.insert_analysis(&analysis, Some(&results_path)).await?;

            for line in render_summary_lines(&analysis) {
                println!("{line}");
            }
            println!("  - Results file: {}", results_path.display());

            if analysis.verdict == Verdict::Error {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Show { path, id } => {
            let analysis = match (path, id) {
                (Some(path), _) => load_results(&path)?,
                (None, Some(id)) => {
                    let db = Database::new(&config.database_path()).await?;
                    db.run_migrations().await?;
                    db.get_analysis(id)
                        .await?
                        .with_context(|| format!("No analysis recorded with id {id}"))?
                }
                (None, None) => bail!("Pass a results file or --id"),
            };
            for line in render_summary_lines(&analysis) {
                println!("{line}");
            }
        }
        Commands::History { limit } => {
            let db = Database::new(&config.database_path()).await?;
            db.run_migrations().await?;

            let records = db.get_recent_analyses(limit).await?;
            if records.is_empty() {
                println!("No analyses recorded yet");
            }
            for record in records {
                println!(
                    "{:>5}  {}  PR #{:<6} {:<20} checks {}/{} failed{}",
                    record.id,
                    record.created_at,
                    record
                        .pr_number
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "?".to_string()),
                    record.verdict,
                    record.failed_checks,
                    record.total_checks,
                    if record.timed_out { " (timed out)" } else { "" }
                );
            }
        }
        Commands::InitConfig => {
            let path = config_path.context("No config path available")?;
            if path.exists() {
                bail!("Config file already exists: {}", path.display());
            }
            config.save(Some(&path))?;
            println!("Wrote {}", path.display());
        }
    }

    Ok(ExitCode::SUCCESS)
}

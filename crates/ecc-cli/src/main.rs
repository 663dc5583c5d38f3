use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use ecc_core::{render_matches_csv, Competition, Season};
use ecc_sync::{
    extract_page_records, load_calendar_book, run_sync_once_from_env, SyncConfig, SyncPipeline,
};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "ecc-cli")]
#[command(about = "UEFA club competition results extraction")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one extraction over every enabled competition.
    Sync {
        /// Keep at most this many matches per competition.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Extract a single saved results page and print the CSV to stdout.
    Extract {
        #[arg(long)]
        competition: Competition,
        #[arg(long)]
        html: PathBuf,
        #[arg(long)]
        season: Option<Season>,
        /// Reference date for year inference (YYYY-MM-DD).
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Run the cron scheduler until interrupted.
    Schedule,
    /// Summarize the most recent run reports.
    Report {
        #[arg(long, default_value = "5")]
        runs: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync { limit: None }) {
        Commands::Sync { limit } => {
            let summary = run_sync_once_from_env(limit).await?;
            let failed = summary
                .competitions
                .iter()
                .filter(|c| c.error.is_some())
                .count();
            println!(
                "sync complete: run_id={} competitions={} failed={} matches={} reports={}",
                summary.run_id,
                summary.competitions.len(),
                failed,
                summary.total_matches,
                summary.reports_dir
            );
        }
        Commands::Extract {
            competition,
            html,
            season,
            today,
        } => {
            let page = std::fs::read_to_string(&html)
                .with_context(|| format!("reading {}", html.display()))?;
            let config = SyncConfig::from_env();
            let calendars = load_calendar_book(&config.workspace_root)?;
            let today = today
                .or(config.today)
                .unwrap_or_else(|| Local::now().date_naive());
            let outcome = extract_page_records(competition, &page, season, today, calendars)?;
            info!(
                competition = competition.code(),
                accepted = outcome.records.len(),
                stats = ?outcome.stats,
                "page extracted"
            );
            print!("{}", render_matches_csv(&outcome.records)?);
        }
        Commands::Schedule => {
            let mut config = SyncConfig::from_env();
            config.scheduler_enabled = true;
            let pipeline = SyncPipeline::new(config)?;
            let Some(mut scheduler) = pipeline.maybe_build_scheduler().await? else {
                return Ok(());
            };
            scheduler.start().await.context("starting scheduler")?;
            info!(cron = %pipeline.config().sync_cron, "scheduler running; ctrl-c to stop");
            tokio::signal::ctrl_c()
                .await
                .context("waiting for ctrl-c")?;
            scheduler.shutdown().await.context("stopping scheduler")?;
        }
        Commands::Report { runs } => {
            let root = SyncConfig::from_env().workspace_root;
            println!("{}", ecc_sync::report_recent_runs(runs, Some(root))?);
        }
    }

    Ok(())
}

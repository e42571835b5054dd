mod api;
mod assessment;
mod config;
mod db;
mod enrich;
mod error;
mod export;
mod harvest;
mod llm;
mod record;
mod scheduler;
mod scorer;
mod sources;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::config::Settings;
use crate::db::Store;
use crate::harvest::Harvester;
use crate::record::Record;

#[derive(Parser)]
#[command(name = "job_harvester", about = "Harvest, score and track senior data leadership job postings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search, enrich, score and store new postings once
    Run,
    /// Show the most recently stored postings
    Latest {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Set a posting's lifecycle status
    Status {
        id: String,
        status: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Posting counts per status
    Stats,
    /// Serve the HTTP API and run scheduled harvests
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let settings = Settings::from_env().context("loading settings")?;
    let store = Store::open(&settings.db_path, &settings.job_status_choices)
        .with_context(|| format!("opening job store at {}", settings.db_path.display()))?;
    let store = Arc::new(store);

    match cli.command {
        Commands::Run => {
            let harvester = Harvester::from_settings(settings, store)?;
            let pb = ProgressBar::new(0);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40} {pos}/{len} searches ({eta})")?
                    .progress_chars("#>-"),
            );
            let summary = harvester.run_once_with_progress(&pb).await;
            print_new_matches(&summary.new_records);
            match &summary.export_path {
                Some(path) => println!("\nInserted {} new postings, exported to {}", summary.inserted_count, path.display()),
                None => println!("\nInserted {} new postings.", summary.inserted_count),
            }
        }
        Commands::Latest { limit } => {
            let rows = store.latest(limit)?;
            if rows.is_empty() {
                println!("No postings stored yet. Run 'run' first.");
                return Ok(());
            }
            println!(
                "{:<32} | {:>5} | {:<12} | {:<36} | {:<20} | {:<10}",
                "ID", "Score", "Status", "Title", "Company", "Posted"
            );
            println!("{}", "-".repeat(130));
            for r in &rows {
                println!(
                    "{:<32} | {:>5} | {:<12} | {:<36} | {:<20} | {:<10}",
                    r.id,
                    score_cell(r),
                    r.status,
                    truncate(&r.title, 36),
                    truncate(&r.company, 20),
                    date_cell(&r.posted_at),
                );
            }
            println!("\n{} postings", rows.len());
        }
        Commands::Status { id, status, notes } => {
            if store.update_status(&id, &status, notes.as_deref())? {
                println!("{} -> {}", id, status);
            } else {
                anyhow::bail!("no posting with id {}", id);
            }
        }
        Commands::Stats => {
            let counts = store.status_counts()?;
            let total: usize = counts.iter().map(|(_, n)| n).sum();
            for (status, n) in &counts {
                println!("{:<14} {}", format!("{}:", status), n);
            }
            println!("{:<14} {}", "Total:", total);
        }
        Commands::Serve => {
            let bind_addr = settings.bind_addr.clone();
            let crons = settings.schedule_crons.clone();
            let tz = settings.timezone;
            let harvester = Arc::new(Harvester::from_settings(settings, store)?);

            let _scheduler = scheduler::start_scheduler(Arc::clone(&harvester), &crons, tz).await?;
            let app = api::router(api::AppState { harvester });
            let listener = tokio::net::TcpListener::bind(&bind_addr)
                .await
                .with_context(|| format!("binding {}", bind_addr))?;
            info!("Listening on {}", bind_addr);
            axum::serve(listener, app).await?;
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }
    Ok(())
}

/// Up to 20 new postings, best score first.
fn print_new_matches(records: &[Record]) {
    if records.is_empty() {
        println!("No new matches this run.");
        return;
    }
    let mut sorted: Vec<&Record> = records.iter().collect();
    sorted.sort_by(|a, b| {
        b.llm_score
            .unwrap_or(0.0)
            .total_cmp(&a.llm_score.unwrap_or(0.0))
    });

    println!("\nNew matches ({})", records.len());
    println!(
        "{:>5} | {:^6} | {:<36} | {:<20} | {:<18} | {:<15} | {:<10}",
        "Score", "Assess", "Title", "Company", "Loc", "Source", "Posted"
    );
    println!("{}", "-".repeat(128));
    for r in sorted.into_iter().take(20) {
        println!(
            "{:>5} | {:^6} | {:<36} | {:<20} | {:<18} | {:<15} | {:<10}",
            r.llm_score.unwrap_or(0.0) as i64,
            if r.assessment_flag { "yes" } else { "" },
            truncate(&r.title, 36),
            truncate(&r.company, 20),
            truncate(&r.location, 18),
            r.source.as_str(),
            date_cell(&r.posted_at),
        );
    }
}

fn score_cell(r: &Record) -> String {
    r.llm_score
        .map(|s| format!("{:.0}", s))
        .unwrap_or_else(|| "-".into())
}

fn date_cell(posted_at: &str) -> String {
    posted_at.chars().take(10).collect()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

mod browser;
mod config;
mod models;
mod pipeline;
mod scraper;
mod storage;
mod targets;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::browser::ChromeSession;
use crate::config::{AppConfig, SinkConfig, SinkKind};
use crate::pipeline::Pipeline;
use crate::scraper::swot::extract_swot_counts;
use crate::storage::{CsvSink, Repository, ResultSink};
use crate::targets::{quote_url, COMPANIES};

#[derive(Parser)]
#[command(name = "swot-scraper", about = "Moneycontrol SWOT count scraper", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Log in, scrape SWOT counts for every company and write them to the sink (default)
    Run,

    /// List the companies and their quote-page URLs
    Targets,

    /// Extract SWOT counts from a saved quote page
    Extract {
        /// Path to an HTML file
        file: PathBuf,
    },

    /// Show DuckDB snapshot statistics
    Stats,

    /// Apply schema migrations to the DuckDB store
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "swot_scraper=info,warn",
        1 => "swot_scraper=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await?,

        Command::Targets => {
            for t in COMPANIES {
                let url = quote_url(&config.portal.quote_base_url, t)?;
                println!("{:<6} {:<36} {}", t.ticker, t.name, url);
            }
        }

        Command::Extract { file } => {
            let html = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            let c = extract_swot_counts(&html);
            println!(
                "Strengths: {}  Weaknesses: {}  Opportunities: {}  Threats: {}",
                c.strengths, c.weaknesses, c.opportunities, c.threats
            );
        }

        Command::Stats => {
            let repo = Repository::open(&config.sink.db_path)?;
            repo.run_migrations()?;
            let snapshots = repo.snapshot_count()?;
            let tickers = repo.ticker_count()?;
            let runs = repo.run_count()?;
            let last = repo.last_run_at()?;
            println!("─────────────────────────────────");
            println!("  SWOT scraper · Snapshot Stats");
            println!("─────────────────────────────────");
            println!("  Runs      : {}", utils::fmt_number(runs));
            println!("  Tickers   : {}", utils::fmt_number(tickers));
            println!("  Snapshots : {}", utils::fmt_number(snapshots));
            println!("  Last run  : {}", last.map(|d| d.to_string()).unwrap_or_else(|| "never".into()));
            println!("─────────────────────────────────");
            for (ticker, s, w, o, t) in repo.latest_counts()? {
                println!("  {:<6} S={:<4} W={:<4} O={:<4} T={}", ticker, s, w, o, t);
            }
        }

        Command::Migrate => {
            Repository::open(&config.sink.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}

async fn run(config: AppConfig) -> Result<()> {
    let _t = utils::Timer::start("SWOT scrape");

    let credentials = config.credentials()?;
    config.validate_sink()?;
    let sink_config = config.sink.clone();

    let mut session = ChromeSession::launch(
        &config.browser,
        Duration::from_millis(config.portal.idle_ms),
    )
    .await
    .context("Failed to start browser session")?;

    let records = Pipeline::new(config, credentials)
        .run(&mut session, COMPANIES)
        .await;

    if records.is_empty() {
        info!("No data scraped due to login or other issues.");
        return Ok(());
    }

    if let Err(e) = open_sink(&sink_config).and_then(|mut sink| sink.store(&records)) {
        error!("Failed to store results: {:#}", e);
    }
    Ok(())
}

fn open_sink(config: &SinkConfig) -> Result<Box<dyn ResultSink>> {
    match config.kind {
        SinkKind::Csv => Ok(Box::new(CsvSink::new(&config.csv_path))),
        SinkKind::Duckdb => {
            let repo = Repository::open(&config.db_path)?;
            repo.run_migrations()?;
            Ok(Box::new(repo))
        }
    }
}

mod answers;
mod browser;
mod chat;
mod config;
mod crawl;
mod db;
mod export;
mod locator;
mod models;
mod nav;
mod pacing;
mod progress;
mod resolver;
mod runner;
mod score;
mod session;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;

use browser::WebDriverProvider;
use config::RunConfig;
use db::ResultStore;
use locator::SelectorBook;
use models::MatchSignals;
use pacing::TokioSleeper;
use progress::ChannelSink;
use runner::Agent;

#[derive(Parser)]
#[command(name = "pounce")]
#[command(about = "Unattended job portal agent - log in, crawl, score, and apply")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the result database and write a starter config
    Init {
        /// Config file location (defaults to the platform config dir)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Result database location (defaults to the platform data dir)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Log in, crawl the configured search, and apply to full matches
    Run {
        /// Config file to use
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Result database to write to
        #[arg(long)]
        db: Option<PathBuf>,

        /// Walk the whole pipeline but never click apply
        #[arg(long)]
        dry_run: bool,

        /// Run the browser headless
        #[arg(long)]
        headless: bool,

        /// Override the number of listing pages to crawl
        #[arg(short, long)]
        pages: Option<u32>,

        /// Override the WebDriver endpoint, e.g. http://localhost:9515
        #[arg(long)]
        webdriver: Option<String>,

        /// Override where the run's result CSV is written
        #[arg(long, value_name = "FILE")]
        export: Option<PathBuf>,
    },

    /// List recorded results
    Results {
        /// Filter by status (applied, skipped)
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by portal account
        #[arg(short, long)]
        user: Option<String>,

        /// Number of rows to show
        #[arg(short, long, default_value = "25")]
        limit: usize,

        /// Result database to read
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Export recorded results to CSV
    Export {
        /// Output file
        output: PathBuf,

        /// Export only this portal account's rows
        #[arg(short, long)]
        user: Option<String>,

        /// Result database to read
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pounce=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(db: Option<PathBuf>) -> Result<ResultStore> {
    match db {
        Some(path) => ResultStore::open_at(&path),
        None => ResultStore::open(),
    }
}

async fn run_command(
    config_path: Option<PathBuf>,
    db: Option<PathBuf>,
    dry_run: bool,
    headless: bool,
    pages: Option<u32>,
    webdriver: Option<String>,
    export: Option<PathBuf>,
) -> Result<()> {
    let config_path = config_path.unwrap_or_else(RunConfig::default_path);
    let mut config = RunConfig::load(&config_path)?;
    if dry_run {
        config.dry_run = true;
    }
    if headless {
        config.browser.headless = true;
    }
    if let Some(pages) = pages {
        config.search.pages = pages.max(1);
    }
    if let Some(url) = webdriver {
        config.browser.webdriver_url = url;
    }
    if let Some(path) = export {
        config.export_csv = path;
    }

    let book = match &config.selectors_path {
        Some(path) => SelectorBook::load(path)?,
        None => SelectorBook::default(),
    };

    let mut store = open_store(db)?;
    store.ensure_initialized()?;

    let agent = Arc::new(Agent::new());
    {
        let agent = agent.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nStopping after the current job...");
                agent.request_stop();
            }
        });
    }

    // Progress goes through a channel to a printer thread so the run
    // itself never blocks on the terminal.
    let (tx, rx) = mpsc::channel::<models::LogEntry>();
    let printer = std::thread::spawn(move || {
        for entry in rx {
            println!(
                "{} [{:<7}] {}",
                entry.timestamp.format("%H:%M:%S"),
                entry.severity.as_str().to_uppercase(),
                entry.message
            );
        }
    });

    let provider = WebDriverProvider::new(config.browser.clone());
    let report = {
        // The sink drops with this scope, which closes the channel and
        // lets the printer thread finish.
        let sink = ChannelSink::new(tx);
        agent
            .run(&config, &book, &provider, &mut store, &TokioSleeper, &sink)
            .await?
    };
    let _ = printer.join();

    println!();
    println!("Pages visited: {}", report.pages_visited);
    println!("Jobs seen:     {}", report.jobs_seen);
    println!("Applied:       {}", report.jobs_applied);
    println!("Skipped:       {}", report.jobs_skipped);
    for (reason, count) in &report.skip_reasons {
        println!("  {reason}: {count}");
    }

    if let Some(error) = report.error {
        return Err(anyhow!(error));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { config, db } => {
            let store = open_store(db)?;
            store.init()?;
            println!("Result database initialized at {}", store.path().display());

            let config_path = config.unwrap_or_else(RunConfig::default_path);
            if config_path.exists() {
                println!("Config already present at {}", config_path.display());
            } else {
                RunConfig::example().save(&config_path)?;
                println!("Starter config written to {}", config_path.display());
                println!("Fill in your credentials and search before running.");
            }
        }

        Commands::Run {
            config,
            db,
            dry_run,
            headless,
            pages,
            webdriver,
            export,
        } => {
            run_command(config, db, dry_run, headless, pages, webdriver, export).await?;
        }

        Commands::Results {
            status,
            user,
            limit,
            db,
        } => {
            let store = open_store(db)?;
            store.ensure_initialized()?;
            let rows = store.list_results(user.as_deref(), status.as_deref(), Some(limit))?;
            if rows.is_empty() {
                println!("No results recorded.");
            } else {
                println!(
                    "{:<6} {:<8} {:<28} {:<20} {:<6} {:<20}",
                    "ID", "STATUS", "TITLE", "COMPANY", "SCORE", "REASON"
                );
                println!("{}", "-".repeat(92));
                for row in &rows {
                    let r = &row.result;
                    println!(
                        "{:<6} {:<8} {:<28} {:<20} {:<6} {:<20}",
                        row.id,
                        r.status.as_str(),
                        truncate(&r.detail.title, 26),
                        truncate(&r.detail.company, 18),
                        format!("{}/{}", r.match_result.score, MatchSignals::COUNT),
                        truncate(r.skip_reason.as_deref().unwrap_or("-"), 18),
                    );
                }

                let counts = store.count_by_status(user.as_deref())?;
                let summary: Vec<String> = counts
                    .iter()
                    .map(|(status, n)| format!("{status}: {n}"))
                    .collect();
                println!("\n{}", summary.join(", "));
            }
        }

        Commands::Export { output, user, db } => {
            let store = open_store(db)?;
            store.ensure_initialized()?;
            let rows = store.list_results(user.as_deref(), None, None)?;
            if rows.is_empty() {
                println!("Nothing to export.");
            } else {
                let written = export::write_csv_stored(&output, &rows)?;
                println!("Wrote {} rows to {}", written, output.display());
            }
        }
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

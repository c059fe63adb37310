//! Operator CLI: submit search jobs, drive continuation runs, inspect
//! stored results. Connects to Postgres when DATABASE_URL is set and falls
//! back to the in-memory store otherwise (useful for `run --follow` smoke
//! tests without a database).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use castnet_common::{EngineConfig, Job, Platform, SearchMode};
use castnet_engine::{ModifierExpander, NoopSourceClient, SearchEngine};
use castnet_store::{JobStore, MemoryStore, PgJobStore};

#[derive(Parser)]
#[command(name = "castnet", about = "Creator search job runner", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply database migrations (requires DATABASE_URL)
    Migrate,

    /// Submit a new search job and print its id
    Submit {
        /// tiktok | instagram | youtube
        #[arg(long)]
        platform: String,

        /// keyword_search | similar_creators
        #[arg(long, default_value = "keyword_search")]
        mode: String,

        /// Comma-separated query keywords
        #[arg(long, value_delimiter = ',')]
        keywords: Vec<String>,

        /// Seed handle for similar-creators jobs
        #[arg(long)]
        target_handle: Option<String>,

        /// Stop once this many creators are collected
        #[arg(long, default_value_t = 100)]
        target: i64,

        #[arg(long, default_value = "cli")]
        owner: String,
    },

    /// Execute one continuation run (or all of them with --follow)
    Run {
        job_id: String,

        /// Keep re-running, with the per-platform delay, until the job
        /// stops asking for more
        #[arg(long)]
        follow: bool,

        /// Run against the no-op source instead of ScrapeDeck: no token
        /// needed, no external calls, every batch comes back empty
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the stored job document
    Status { job_id: String },

    /// Print stored creators
    Results {
        job_id: String,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Migrate => {
            let store = pg_store().await?.context("DATABASE_URL is not set")?;
            store.migrate().await?;
            info!("Migrations applied");
        }
        Commands::Submit { platform, mode, keywords, target_handle, target, owner } => {
            let store = build_store().await?;
            let job = build_job(&platform, &mode, keywords, target_handle, target, &owner)?;
            store.create(&job).await?;
            println!("{}", job.id);
        }
        Commands::Run { job_id, follow, dry_run } => {
            let store = build_store().await?;
            let engine = build_engine(store.clone(), dry_run)?;
            loop {
                let Some(outcome) = engine.run(&job_id).await? else {
                    bail!("job {job_id} not found");
                };
                println!("{}", serde_json::to_string_pretty(&outcome)?);
                if !(follow && outcome.has_more) {
                    break;
                }
                let Some(job) = store.load(&job_id).await? else {
                    break;
                };
                let delay = engine.config().limits(job.platform).continuation_delay_ms;
                info!(job_id, delay_ms = delay, "Waiting before next continuation run");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }
        Commands::Status { job_id } => {
            let store = build_store().await?;
            let job = store
                .load(&job_id)
                .await?
                .with_context(|| format!("job {job_id} not found"))?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        Commands::Results { job_id, limit } => {
            let store = build_store().await?;
            let mut creators = store.load_creators(&job_id).await?;
            creators.truncate(limit);
            println!("{}", serde_json::to_string_pretty(&creators)?);
        }
    }
    Ok(())
}

fn build_job(
    platform: &str,
    mode: &str,
    keywords: Vec<String>,
    target_handle: Option<String>,
    target: i64,
    owner: &str,
) -> Result<Job> {
    let platform = Platform::parse(platform).with_context(|| format!("unknown platform: {platform}"))?;
    let mode = SearchMode::parse(mode).with_context(|| format!("unknown mode: {mode}"))?;

    let keywords: Vec<String> = keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();
    match mode {
        SearchMode::KeywordSearch if keywords.is_empty() => {
            bail!("keyword_search jobs need --keywords");
        }
        SearchMode::SimilarCreators if target_handle.is_none() => {
            bail!("similar_creators jobs need --target-handle");
        }
        _ => {}
    }

    let id = Uuid::new_v4().to_string();
    let mut job = Job::new(&id, owner, platform, mode)
        .with_keywords(keywords)
        .with_target_results(target);
    if let Some(handle) = &target_handle {
        job = job.with_target_handle(handle);
    }
    Ok(job)
}

async fn pg_store() -> Result<Option<PgJobStore>> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        return Ok(None);
    };
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .context("connecting to Postgres")?;
    Ok(Some(PgJobStore::new(pool)))
}

async fn build_store() -> Result<Arc<dyn JobStore>> {
    match pg_store().await? {
        Some(store) => Ok(Arc::new(store)),
        None => {
            warn!("DATABASE_URL is not set, using the in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// A missing SCRAPEDECK_TOKEN is fatal here: downgrading to an empty source
/// would let empty runs finalize a real job as completed with zero results.
fn build_engine(store: Arc<dyn JobStore>, dry_run: bool) -> Result<SearchEngine> {
    let config = EngineConfig::from_env();
    if dry_run {
        warn!("Dry run: the no-op source returns empty batches only");
        return Ok(SearchEngine::new(
            store,
            Arc::new(NoopSourceClient),
            Arc::new(ModifierExpander),
            config,
        ));
    }
    let engine = SearchEngine::with_scrapedeck(
        store,
        std::env::var("SCRAPEDECK_TOKEN").ok(),
        config,
    )?;
    Ok(engine)
}

use anyhow::Context;
use etl::{CheckpointManager, Pipeline};
use redlake_core::AppConfig;
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const PREVIEW_POSTS: u32 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("redlake=info,etl=info,reddit_client=info,database=info")
        }))
        .init();

    let command = std::env::args().nth(1);
    match dispatch(command.as_deref()).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(command: Option<&str>) -> anyhow::Result<ExitCode> {
    match command {
        None => run().await,
        Some("test") => preview().await,
        Some("clear") => clear(),
        Some("help" | "-h" | "--help") => {
            print_help();
            Ok(ExitCode::SUCCESS)
        }
        Some(other) => {
            eprintln!("unknown command: {other}");
            print_help();
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run() -> anyhow::Result<ExitCode> {
    let config = AppConfig::load().context("loading configuration")?;
    info!("ingesting {} target(s)", config.targets.len());

    let pipeline = Pipeline::new(config)
        .await
        .context("initializing pipeline")?;
    let summary = pipeline.run().await.context("running ingestion")?;

    println!("{summary}");
    // Per-target failures are reported in the summary, not the exit code.
    Ok(ExitCode::SUCCESS)
}

async fn preview() -> anyhow::Result<ExitCode> {
    let config = AppConfig::load().context("loading configuration")?;
    etl::preview(&config, PREVIEW_POSTS)
        .await
        .context("preview fetch")?;
    Ok(ExitCode::SUCCESS)
}

fn clear() -> anyhow::Result<ExitCode> {
    let config = AppConfig::load().context("loading configuration")?;
    CheckpointManager::clear(Path::new(&config.run.checkpoint_file))
        .context("clearing checkpoint")?;
    println!("Checkpoint cleared; the next run will process all posts.");
    Ok(ExitCode::SUCCESS)
}

fn print_help() {
    println!(
        r#"redlake - Reddit ingestion pipeline

Usage:
    redlake            Run the full pipeline (fetch + store)
    redlake test       Fetch a few posts per target, no database writes
    redlake clear      Clear the run checkpoint
    redlake help       Show this message

Configuration:
    redlake.toml (or REDLAKE_CONFIG) for targets, sort order, fetch caps,
    comment depth, rate limits and retry behavior.

Environment:
    REDDIT_CLIENT_ID / REDDIT_CLIENT_SECRET    API credentials (required)
    DATABASE_URL                               storage location
    RUST_LOG                                   log filter"#
    );
}

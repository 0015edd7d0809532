use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sentirank_engine::ReviewSampler;
use sentirank_sync::{DrillDown, InsightsSnapshot, RefreshPipeline, SyncConfig};

#[derive(Debug, Parser)]
#[command(name = "sentirank")]
#[command(about = "SentiRank sentiment insights command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one refresh against the configured source and print a summary line.
    Refresh {
        /// Ask the upstream API to recompute before fetching.
        #[arg(long)]
        trigger_backend: bool,
    },
    /// Print insight statistics, the leader and chart series as JSON.
    Insights {
        #[arg(long)]
        fixture: Option<PathBuf>,
    },
    /// Print a synthetic review sample for the product at a 1-based rank.
    Sample {
        #[arg(long)]
        rank: usize,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        fixture: Option<PathBuf>,
    },
    /// Serve the dashboard.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Refresh { trigger_backend } => {
            let summary = sentirank_sync::run_refresh_once_from_env(trigger_backend).await?;
            println!(
                "refresh complete: run_id={} source={} products={} skipped={}",
                summary.run_id, summary.source_id, summary.products, summary.skipped_records
            );
        }
        Commands::Insights { fixture } => {
            let snapshot = load_snapshot(fixture).await?;
            let out = serde_json::json!({
                "run_id": snapshot.run_id,
                "upstream_timestamp": snapshot.upstream_timestamp,
                "stats": snapshot.stats,
                "leader": snapshot.leader,
                "skipped_records": snapshot.rejected.len(),
                "charts": snapshot.charts,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Sample {
            rank,
            seed,
            fixture,
        } => {
            let config = config_with_fixture(fixture)?;
            let seed = seed.or(config.sampler_seed);
            let snapshot = refresh_snapshot(config).await?;
            let drill_down = DrillDown::new(ReviewSampler::default(), seed);
            let Some(sample) = drill_down.select(&snapshot, rank) else {
                bail!(
                    "no product at rank {rank}; snapshot has {} products",
                    snapshot.products.len()
                );
            };
            println!("{}", serde_json::to_string_pretty(&sample)?);
        }
        Commands::Serve => {
            sentirank_web::serve_from_env().await?;
        }
    }

    Ok(())
}

fn config_with_fixture(fixture: Option<PathBuf>) -> Result<SyncConfig> {
    let mut config = SyncConfig::from_env()?;
    if fixture.is_some() {
        config.fixture_path = fixture;
    }
    Ok(config)
}

async fn load_snapshot(fixture: Option<PathBuf>) -> Result<Arc<InsightsSnapshot>> {
    refresh_snapshot(config_with_fixture(fixture)?).await
}

async fn refresh_snapshot(config: SyncConfig) -> Result<Arc<InsightsSnapshot>> {
    let pipeline = RefreshPipeline::new(config)?;
    pipeline.refresh(false).await?;
    pipeline
        .current()
        .context("refresh finished without publishing a snapshot")
}

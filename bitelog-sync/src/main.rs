//! bitelog-sync - one-shot record sync and enrichment
//!
//! Pulls every restaurant record from the configured Notion database,
//! materializes cover images into the CDN-backed asset repository, backfills
//! missing coordinates via place search, writes derived fields back to the
//! source, and publishes the snapshot the web front end consumes.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bitelog_common::config::SyncConfig;
use bitelog_sync::pipeline::SyncPipeline;
use bitelog_sync::services::amap::AmapClient;
use bitelog_sync::services::covers::{CoverMaterializer, GithubContentHost};
use bitelog_sync::services::notion::NotionClient;
use bitelog_sync::snapshot;

/// Command-line arguments for bitelog-sync
#[derive(Parser, Debug)]
#[command(name = "bitelog-sync")]
#[command(about = "Sync restaurant records from Notion and publish the site snapshot")]
#[command(version)]
struct Args {
    /// Snapshot output path
    #[arg(
        short,
        long,
        default_value = "src/data/restaurants.json",
        env = "SNAPSHOT_PATH"
    )]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials may live in a local .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bitelog_sync=info,bitelog_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting bitelog sync v{}", env!("CARGO_PKG_VERSION"));

    let config = SyncConfig::from_env().context("Incomplete configuration")?;

    let notion = NotionClient::new(&config.notion_key).context("Failed to build Notion client")?;
    let host = GithubContentHost::new(
        &config.github_token,
        &config.github_repo,
        &config.github_branch,
    )
    .context("Failed to build content host client")?;
    let covers = CoverMaterializer::new(host).context("Failed to build cover materializer")?;
    let geocoder = AmapClient::new(&config.amap_key).context("Failed to build geocoder client")?;

    let pipeline = SyncPipeline::new(notion, covers, geocoder);
    let records = pipeline
        .run(&config.notion_db_id)
        .await
        .context("Sync run failed")?;

    snapshot::publish(&records, &args.output).context("Failed to write snapshot")?;

    info!(count = records.len(), "Sync complete");
    Ok(())
}

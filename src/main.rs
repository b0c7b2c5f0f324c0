use schemasync::config::Configuration;
use schemasync::crypto::{AesGcmCipher, CipherService, HashOnlyCipher};
use schemasync::pipeline::DataSyncPipeline;
use schemasync::scheduler::SyncScheduler;
use schemasync::store::postgres::{load_table_metadata, PgSyncStores};
use schemasync::transform::registry::TransformerRegistry;
use schemasync::transform::TransformContext;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "schemasync")]
#[command(about = "Journal-driven schema sync engine for product upgrades")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync service until interrupted
    Run {
        /// Path to the configuration file
        #[arg(short, long, default_value = "schemasync.json")]
        config: PathBuf,
    },
    /// Load and validate the configuration, then exit
    CheckConfig {
        #[arg(short, long, default_value = "schemasync.json")]
        config: PathBuf,
    },
    /// Show per-table watermark lag against the source journal
    Status {
        #[arg(short, long, default_value = "schemasync.json")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    match args.command {
        Commands::Run { config } => run(&config).await,
        Commands::CheckConfig { config } => check_config(&config),
        Commands::Status { config } => status(&config).await,
    }
}

async fn run(path: &Path) -> Result<()> {
    let config = Configuration::from_file(path)?;
    let stores = Arc::new(connect(&config).await?);
    let registry = TransformerRegistry::with_defaults(&config);
    let cipher = build_cipher(&config)?;

    let mut scheduler = SyncScheduler::new();
    for table in &config.tables {
        let pipeline_config = config.pipeline_configuration(table)?;
        let meta = load_table_metadata(
            stores.target_pool(),
            &config.source_schema,
            &config.target_schema,
            table,
        )
        .await?;
        let chain = registry.resolve(
            &table.name,
            pipeline_config.source_version,
            pipeline_config.target_version,
        );
        let context = TransformContext {
            table: table.clone(),
            token_encryption_enabled: config.token_encryption_enabled,
            token_hashing_enabled: config.token_hashing_enabled,
            encryption_with_transformation: config.encryption_with_transformation,
            cipher: cipher.clone(),
        };
        let pipeline = DataSyncPipeline::new(
            pipeline_config,
            meta,
            stores.clone(),
            chain,
            context,
            scheduler.cancellation_token().child_token(),
        );
        scheduler.spawn(pipeline);
    }

    info!(tables = scheduler.task_count(), "sync service started");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    scheduler.shutdown().await;
    Ok(())
}

fn check_config(path: &Path) -> Result<()> {
    let config = Configuration::from_file(path)?;
    println!(
        "Configuration OK: syncing {} -> {}, {} table(s), batch size {}, poll every {}s",
        config.source_version,
        config.target_version,
        config.tables.len(),
        config.batch_size,
        config.poll_interval_secs
    );
    for table in &config.tables {
        println!("  - {}", table.name);
    }
    Ok(())
}

async fn status(path: &Path) -> Result<()> {
    let config = Configuration::from_file(path)?;
    let stores = connect(&config).await?;
    println!(
        "{:<32} {:>12} {:>12} {:>10}",
        "TABLE", "WATERMARK", "JOURNAL MAX", "PENDING"
    );
    for table in &config.tables {
        let status = stores
            .read_status(&config.source_schema, &config.target_schema, &table.name)
            .await?;
        println!(
            "{:<32} {:>12} {:>12} {:>10}",
            table.name,
            status.watermark,
            status.max_sync_id,
            status.pending()
        );
    }
    Ok(())
}

async fn connect(config: &Configuration) -> Result<PgSyncStores> {
    let source_url = config
        .source_url
        .as_deref()
        .ok_or_else(|| anyhow!("source database URL missing"))?;
    let target_url = config
        .target_url
        .as_deref()
        .ok_or_else(|| anyhow!("target database URL missing"))?;
    Ok(PgSyncStores::connect(source_url, target_url).await?)
}

fn build_cipher(config: &Configuration) -> Result<Arc<dyn CipherService>> {
    match &config.encryption_key {
        Some(key) => Ok(Arc::new(AesGcmCipher::from_hex_key(key)?)),
        None => Ok(Arc::new(HashOnlyCipher)),
    }
}

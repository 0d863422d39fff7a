use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use shopfeed::catalog::{ProductId, SnapshotCatalog};
use shopfeed::config::Config;
use shopfeed::sync::{CatalogEvent, SyncEngine, SyncWorker};

/// Queue depth for replayed events.
const QUEUE_CAPACITY: usize = 64;

#[derive(Parser, Debug)]
#[command(
    name = "shopfeed",
    about = "Maintain a Google Shopping XML feed from catalog change events"
)]
struct Args {
    /// Configuration file
    #[arg(long, value_name = "FILE", default_value = "shopfeed.toml")]
    config: PathBuf,

    /// JSON snapshot of the product catalog
    #[arg(long, value_name = "FILE")]
    catalog: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay "saved" events for the given record ids, in order
    Saved {
        #[arg(required = true)]
        ids: Vec<ProductId>,
    },
    /// Replay "before delete" events for the given record ids, in order
    Delete {
        #[arg(required = true)]
        ids: Vec<ProductId>,
    },
    /// Regenerate the feed from the whole published catalog
    Rebuild,
    /// Print the feed location and the ids it contains
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config '{}'", args.config.display()))?;
    let catalog = SnapshotCatalog::load(&args.catalog).with_context(|| {
        format!(
            "Failed to load catalog snapshot '{}'",
            args.catalog.display()
        )
    })?;
    let engine = SyncEngine::from_config(Arc::new(catalog), &config);

    match args.command {
        Command::Saved { ids } => replay(engine, ids, CatalogEvent::saved).await?,
        Command::Delete { ids } => replay(engine, ids, CatalogEvent::before_delete).await?,
        Command::Rebuild => {
            let outcome = engine.rebuild().context("Failed to rebuild feed")?;
            println!("{}: {}", engine.store().path().display(), outcome);
        }
        Command::Show => {
            let store = engine.store();
            if !store.exists() {
                println!("{}: no feed yet", store.path().display());
                return Ok(());
            }
            let document = store.load().context("Failed to read feed")?;
            println!("{}: {} items", store.path().display(), document.len());
            for item in document.items() {
                println!("  {}  {}  {}", item.id, item.price, item.title);
            }
        }
    }

    Ok(())
}

/// Sends every event through the sync worker and prints each outcome.
async fn replay(
    engine: SyncEngine<Arc<SnapshotCatalog>>,
    ids: Vec<ProductId>,
    make_event: fn(ProductId) -> CatalogEvent,
) -> Result<()> {
    let worker = SyncWorker::spawn(engine, QUEUE_CAPACITY);
    let handle = worker.handle();

    let mut failures = 0;
    for id in ids {
        match handle.submit(make_event(id)).await {
            Ok(outcome) => println!("{id}: {outcome}"),
            Err(e) => {
                failures += 1;
                eprintln!("{id}: error: {e:#}");
            }
        }
    }

    drop(handle);
    worker.shutdown().await?;

    if failures > 0 {
        anyhow::bail!("{failures} event(s) failed");
    }
    Ok(())
}

//! livesync demo - one node, one observer, a stream of edits.
//!
//! Runs a node over the in-memory store and transport, opens an observer on
//! a note and edits the note periodically. Every edit is pushed to the
//! observer, which logs the fields it receives.

mod demo;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use livesync_client::{callback, ClientConfig, Observer, Topic};
use livesync_core::{EntityRegistry, MemoryHub, MemoryStore};
use livesync_proto::SaveEvent;
use livesync_server::Node;

#[derive(Parser, Debug)]
#[command(name = "livesync-demo")]
#[command(version, about = "Single-process livesync demo", long_about = None)]
struct DemoArgs {
    #[command(flatten)]
    node: livesync_server::Args,

    /// Milliseconds between scripted edits.
    #[arg(long, default_value_t = 2000)]
    edit_interval_ms: u64,

    /// Number of edits before exiting. 0 runs until Ctrl+C.
    #[arg(long, default_value_t = 0)]
    edits: u64,

    /// Ask for changed fields only instead of full snapshots.
    #[arg(long)]
    atomic: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "livesync_server=info,livesync_demo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = DemoArgs::parse();
    let config = args.node.into_config();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        atomic = args.atomic,
        "starting livesync demo"
    );

    let notes = demo::create_notes();
    let entities = Arc::new(EntityRegistry::new().with_source(demo::NOTE, notes.clone()));
    let store = Arc::new(MemoryStore::with_lock_timeout(config.lock_timeout));
    let hub = MemoryHub::new();

    let node = Node::start(config, store, entities, hub.clone());
    hub.attach(node.router());

    let client = Arc::new(hub.connect());
    let mut initial = livesync_proto::FieldMap::new();
    initial.insert("id".into(), json!(demo::WATCHED_NOTE));
    let observer = Observer::new(
        demo::NOTE,
        initial,
        client,
        ClientConfig::new().with_atomic(args.atomic),
    );
    observer.on(
        Topic::Updated,
        callback(|data| tracing::info!(note = %data, "observer updated")),
    );
    observer.refresh().await?;
    observer.listen().await?;

    let saves = node.saves();
    let mut ticker = tokio::time::interval(Duration::from_millis(args.edit_interval_ms.max(1)));
    ticker.tick().await;
    let mut revision = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                revision += 1;
                let changed = demo::edit(&notes, revision);
                tracing::info!(revision, fields = ?changed, "note edited");
                saves.send(SaveEvent::new(demo::NOTE, demo::WATCHED_NOTE, changed)).await?;
                if args.edits > 0 && revision >= args.edits {
                    // Let the last update reach the observer.
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    break;
                }
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "failed to listen for ctrl+c");
                }
                tracing::info!("received shutdown signal");
                break;
            }
        }
    }

    observer.destroy().await?;
    node.shutdown().await;
    tracing::info!("demo finished");
    Ok(())
}

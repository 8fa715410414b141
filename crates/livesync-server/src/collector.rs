//! Periodic eviction of stale listeners.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::registrar::Registrar;

/// Run collection sweeps every `interval` until shutdown is signalled.
///
/// The first sweep runs one full interval after start.
pub async fn collect_task(
    registrar: Arc<Registrar>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(interval_secs = interval.as_secs(), "listener collection started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = registrar.collect().await {
                    tracing::warn!(error = %e, "listener collection failed");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
    tracing::info!("listener collection stopped");
}

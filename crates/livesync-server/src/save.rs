//! Save event processing.
//!
//! The persistence layer announces committed writes by sending a
//! [`SaveEvent`] through a [`SaveHandle`]. A background [`SaveProcessor`]
//! hands each event to the registrar, one at a time, in arrival order.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use livesync_proto::SaveEvent;

use crate::registrar::{Registrar, SaveOutcome};

/// Bridges save notifications to the registrar.
pub struct SaveProcessor {
    /// Receiver for save events.
    rx: mpsc::Receiver<SaveEvent>,
    /// Registrar fanning updates out.
    registrar: Arc<Registrar>,
}

impl SaveProcessor {
    /// Create a new save processor.
    pub fn new(rx: mpsc::Receiver<SaveEvent>, registrar: Arc<Registrar>) -> Self {
        Self { rx, registrar }
    }

    /// Process events until the channel is closed or shutdown is signalled.
    ///
    /// Events already queued when shutdown arrives are dropped.
    pub async fn run_until_shutdown(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("save processor started");

        loop {
            tokio::select! {
                event = self.rx.recv() => match event {
                    Some(event) => self.process(&event).await,
                    None => break,
                },
                _ = shutdown.recv() => {
                    info!("save processor shutting down");
                    return;
                }
            }
        }

        info!("save processor stopped (channel closed)");
    }

    async fn process(&self, event: &SaveEvent) {
        debug!(
            entity = %event.key(),
            fields = ?event.updated_fields,
            "processing save"
        );
        if let SaveOutcome::Skipped(reason) = self.registrar.on_save(event).await {
            debug!(entity = %event.key(), ?reason, "save produced no updates");
        }
    }
}

/// Save channel sender.
pub type SaveSender = mpsc::Sender<SaveEvent>;

/// Save channel receiver.
pub type SaveReceiver = mpsc::Receiver<SaveEvent>;

/// Create a new save channel with the given buffer size.
pub fn channel(buffer_size: usize) -> (SaveSender, SaveReceiver) {
    mpsc::channel(buffer_size.max(1))
}

/// Handle for announcing saves to a running processor.
#[derive(Clone)]
pub struct SaveHandle {
    tx: SaveSender,
}

impl SaveHandle {
    /// Create a new save handle.
    pub fn new(tx: SaveSender) -> Self {
        Self { tx }
    }

    /// Announce a save without waiting. Fails if the channel is full or closed.
    pub fn try_send(&self, event: SaveEvent) -> Result<(), mpsc::error::TrySendError<SaveEvent>> {
        self.tx.try_send(event)
    }

    /// Announce a save, waiting if the channel is full.
    pub async fn send(&self, event: SaveEvent) -> Result<(), mpsc::error::SendError<SaveEvent>> {
        self.tx.send(event).await
    }

    /// Check whether the processor has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for SaveHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livesync_core::{EntityRegistry, MemoryEntitySource, MemoryHub, MemoryStore};

    use crate::config::RegistrarConfig;

    fn registrar() -> Arc<Registrar> {
        let entities = EntityRegistry::new().with_source("user", Arc::new(MemoryEntitySource::new("user")));
        Arc::new(Registrar::new(
            Arc::new(MemoryStore::new()),
            Arc::new(entities),
            MemoryHub::new(),
            RegistrarConfig::default(),
        ))
    }

    fn save(id: &str) -> SaveEvent {
        SaveEvent::new("user", id, vec!["name".to_string()])
    }

    #[tokio::test]
    async fn test_processor_stops_when_channel_closes() {
        let (tx, rx) = channel(10);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let processor = SaveProcessor::new(rx, registrar());
        let handle = tokio::spawn(processor.run_until_shutdown(shutdown_rx));

        tx.send(save("1")).await.unwrap();
        drop(tx);

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_processor_stops_on_shutdown() {
        let (_tx, rx) = channel(10);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let processor = SaveProcessor::new(rx, registrar());
        let handle = tokio::spawn(processor.run_until_shutdown(shutdown_rx));

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_try_send_and_clone() {
        let (tx, rx) = channel(10);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(SaveProcessor::new(rx, registrar()).run_until_shutdown(shutdown_rx));

        let handle1 = SaveHandle::new(tx);
        let handle2 = handle1.clone();

        assert!(handle1.try_send(save("1")).is_ok());
        assert!(handle2.try_send(save("2")).is_ok());
        assert!(!handle1.is_closed());
    }
}

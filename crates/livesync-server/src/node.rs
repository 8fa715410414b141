//! A running livesync node: registrar, endpoints and background tasks.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use livesync_core::{CoordinationStore, EntityRegistry, SessionSink};

use crate::collector::collect_task;
use crate::config::ServerConfig;
use crate::endpoints;
use crate::registrar::Registrar;
use crate::router::EndpointRouter;
use crate::save::{self, SaveHandle, SaveProcessor};

/// Wires a registrar to its router, save processor and collector.
///
/// Must be started inside a Tokio runtime.
pub struct Node {
    registrar: Arc<Registrar>,
    router: Arc<EndpointRouter>,
    saves: SaveHandle,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    /// Build the registrar, mount its endpoints and spawn background tasks.
    pub fn start(
        config: ServerConfig,
        store: Arc<dyn CoordinationStore>,
        entities: Arc<EntityRegistry>,
        sink: Arc<dyn SessionSink>,
    ) -> Self {
        let registrar = Arc::new(Registrar::new(
            store,
            entities,
            sink,
            config.registrar.clone(),
        ));

        let router = Arc::new(EndpointRouter::new());
        endpoints::mount(registrar.clone(), &router);

        let (shutdown_tx, _) = broadcast::channel(1);
        let mut tasks = Vec::new();

        let (tx, rx) = save::channel(config.save_buffer);
        let processor = SaveProcessor::new(rx, registrar.clone());
        tasks.push(tokio::spawn(
            processor.run_until_shutdown(shutdown_tx.subscribe()),
        ));

        if let Some(interval) = config.collect_interval {
            tasks.push(tokio::spawn(collect_task(
                registrar.clone(),
                interval,
                shutdown_tx.subscribe(),
            )));
        }

        tracing::info!(
            listener_ttl_secs = config.registrar.listener_ttl.as_secs(),
            stale_after_secs = config.registrar.stale_after.as_secs(),
            collect_interval = ?config.collect_interval,
            "livesync node started"
        );

        Self {
            registrar,
            router,
            saves: SaveHandle::new(tx),
            shutdown_tx,
            tasks,
        }
    }

    /// Get the registrar.
    pub fn registrar(&self) -> &Arc<Registrar> {
        &self.registrar
    }

    /// Get the endpoint router. Attach it to the transport to serve calls.
    pub fn router(&self) -> Arc<EndpointRouter> {
        self.router.clone()
    }

    /// Get a handle for announcing saves.
    pub fn saves(&self) -> SaveHandle {
        self.saves.clone()
    }

    /// Stop background tasks and wait for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "background task failed");
            }
        }
        tracing::info!("livesync node stopped");
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("registrar", &self.registrar)
            .field("router", &self.router)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

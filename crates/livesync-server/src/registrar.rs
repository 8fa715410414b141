//! Listener registrar.
//!
//! The registrar owns the listener registry and update fan-out. It is
//! stateless: every listener set lives in the coordination store, so any
//! worker sharing the store can serve any subscribe, unsubscribe or save.
//!
//! Registry mutation (subscribe, unsubscribe, collection) is read-modify-write
//! under the per-entity store lock. Save fan-out reads the set without the
//! lock and tolerates slightly stale membership.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use livesync_core::{CoordinationStore, EntityRegistry, SessionSink};
use livesync_proto::event::LISTEN_KEY_PREFIX;
use livesync_proto::{atomic_diff, EntityKey, FieldMap, ListenerSet, SaveEvent, UpdateEnvelope};

use crate::config::RegistrarConfig;
use crate::error::Error;

/// Why a save produced no deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Only system-managed fields changed.
    NoUserFields,
    /// Nobody observes the entity.
    NoListeners,
    /// The listener set could not be read.
    StoreUnavailable,
    /// The entity could not be loaded or sanitized.
    EntityUnavailable,
}

/// Result of reacting to one save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Updates were sent.
    Delivered {
        /// Sessions that received an update, in delivery order.
        sessions: Vec<String>,
        /// Deliveries the transport rejected.
        failed: usize,
    },
    /// Nothing was sent.
    Skipped(SkipReason),
}

impl SaveOutcome {
    /// Sessions that received an update.
    pub fn delivered_sessions(&self) -> &[String] {
        match self {
            SaveOutcome::Delivered { sessions, .. } => sessions,
            SaveOutcome::Skipped(_) => &[],
        }
    }
}

/// Summary of one collection sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectReport {
    /// Listener sets inspected.
    pub sets_scanned: usize,
    /// Records evicted across all sets.
    pub records_evicted: usize,
    /// Sets left empty by eviction.
    pub sets_emptied: usize,
    /// Sets skipped because their lock or value was unavailable.
    pub sets_skipped: usize,
}

/// Tracks which sessions observe which entities and pushes updates to them.
pub struct Registrar {
    store: Arc<dyn CoordinationStore>,
    entities: Arc<EntityRegistry>,
    sink: Arc<dyn SessionSink>,
    config: RegistrarConfig,
}

impl Registrar {
    /// Create a registrar over the given collaborators.
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        entities: Arc<EntityRegistry>,
        sink: Arc<dyn SessionSink>,
        config: RegistrarConfig,
    ) -> Self {
        Self {
            store,
            entities,
            sink,
            config,
        }
    }

    /// Get the registrar configuration.
    pub fn config(&self) -> &RegistrarConfig {
        &self.config
    }

    /// Get the entity registry.
    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    /// Register (or refresh) a session's subscription to an entity.
    ///
    /// The entity does not need to exist.
    pub async fn subscribe(
        &self,
        session_id: &str,
        entity_type: &str,
        entity_id: &str,
        subscription_id: &str,
        atomic: bool,
    ) -> Result<(), Error> {
        let key = EntityKey::new(entity_type, entity_id);
        let store_key = key.store_key();

        tracing::debug!(
            entity = %key,
            session_id,
            subscription_id,
            atomic,
            "adding model listener"
        );

        let guard = self.store.lock(&store_key).await?;
        let mut listeners = self.load_set(&store_key).await?;
        let added = listeners.touch(session_id, subscription_id, atomic, Utc::now());
        self.store_set(&store_key, &listeners).await?;
        guard.release();

        tracing::trace!(entity = %key, added, listeners = listeners.len(), "listener set stored");
        Ok(())
    }

    /// Remove every record of a subscription from an entity's listener set.
    ///
    /// The set is stored back even when it becomes empty.
    pub async fn unsubscribe(
        &self,
        session_id: &str,
        entity_type: &str,
        entity_id: &str,
        subscription_id: &str,
    ) -> Result<(), Error> {
        let key = EntityKey::new(entity_type, entity_id);
        let store_key = key.store_key();

        tracing::debug!(
            entity = %key,
            session_id,
            subscription_id,
            "removing model listener"
        );

        let guard = self.store.lock(&store_key).await?;
        let mut listeners = self.load_set(&store_key).await?;
        let removed = listeners.remove_subscription(subscription_id);
        self.store_set(&store_key, &listeners).await?;
        guard.release();

        tracing::trace!(entity = %key, removed, listeners = listeners.len(), "listener set stored");
        Ok(())
    }

    /// Read the current listener set of an entity without locking.
    pub async fn listeners(&self, entity_type: &str, entity_id: &str) -> Result<ListenerSet, Error> {
        self.load_set(&EntityKey::new(entity_type, entity_id).store_key())
            .await
    }

    /// React to a committed write.
    ///
    /// Never fails: there is no caller to report to, so problems are logged
    /// and reflected in the returned outcome.
    pub async fn on_save(&self, event: &SaveEvent) -> SaveOutcome {
        let changed = event.user_fields(&self.config.system_fields);
        if changed.is_empty() {
            return SaveOutcome::Skipped(SkipReason::NoUserFields);
        }

        let key = event.key();
        let listeners = match self.load_set(&key.store_key()).await {
            Ok(listeners) => listeners,
            Err(e) => {
                tracing::warn!(entity = %key, error = %e, "failed to read listeners on save");
                return SaveOutcome::Skipped(SkipReason::StoreUnavailable);
            }
        };
        if listeners.is_empty() {
            return SaveOutcome::Skipped(SkipReason::NoListeners);
        }

        tracing::debug!(entity = %key, listeners = listeners.len(), "sending live update");

        let sanitized = match self
            .entities
            .snapshot(key.entity_type(), key.entity_id())
            .await
        {
            Ok(sanitized) => sanitized,
            Err(e) => {
                tracing::warn!(entity = %key, error = %e, "failed to load saved entity");
                return SaveOutcome::Skipped(SkipReason::EntityUnavailable);
            }
        };
        let diff = atomic_diff(&sanitized, &changed);
        let event_name = key.update_event();

        let mut sessions = Vec::new();
        let mut failed = 0;
        for listener in listeners.deliveries() {
            let envelope = UpdateEnvelope::for_listener(listener.atomic, &diff, &sanitized);
            let atomic = envelope.is_atomic();
            match self
                .sink
                .emit_to_session(&listener.session_id, &event_name, envelope.into_payload())
                .await
            {
                Ok(()) => {
                    tracing::trace!(
                        entity = %key,
                        session_id = %listener.session_id,
                        atomic,
                        "update delivered"
                    );
                    sessions.push(listener.session_id.clone());
                }
                Err(e) => {
                    tracing::warn!(
                        entity = %key,
                        session_id = %listener.session_id,
                        error = %e,
                        "update delivery failed"
                    );
                    failed += 1;
                }
            }
        }

        SaveOutcome::Delivered { sessions, failed }
    }

    /// Load the current sanitized snapshot of an entity.
    pub async fn refresh(&self, entity_type: &str, entity_id: &str) -> Result<FieldMap, Error> {
        Ok(self.entities.snapshot(entity_type, entity_id).await?)
    }

    /// Evict stale listeners from every listener set.
    pub async fn collect(&self) -> Result<CollectReport, Error> {
        self.collect_at(Utc::now()).await
    }

    /// Evict listeners last seen more than the staleness window before `now`.
    ///
    /// Each set is rewritten under its lock. A set whose lock or value is
    /// unavailable is skipped and retried on the next sweep.
    pub async fn collect_at(&self, now: DateTime<Utc>) -> Result<CollectReport, Error> {
        let window = chrono::Duration::from_std(self.config.stale_after)
            .unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut report = CollectReport::default();
        for store_key in self.store.keys(LISTEN_KEY_PREFIX).await? {
            report.sets_scanned += 1;
            let Some(entity) = EntityKey::from_store_key(&store_key) else {
                report.sets_skipped += 1;
                tracing::warn!(key = %store_key, "skipping malformed listener key");
                continue;
            };
            match self.evict_stale(&store_key, cutoff).await {
                Ok((0, _)) => {}
                Ok((evicted, remaining)) => {
                    report.records_evicted += evicted;
                    if remaining == 0 {
                        report.sets_emptied += 1;
                    }
                    tracing::debug!(%entity, evicted, remaining, "evicted stale listeners");
                }
                Err(e) => {
                    report.sets_skipped += 1;
                    tracing::warn!(%entity, error = %e, "skipping listener set during collection");
                }
            }
        }

        if report.records_evicted > 0 {
            tracing::info!(
                sets = report.sets_scanned,
                evicted = report.records_evicted,
                "collected stale listeners"
            );
        }
        Ok(report)
    }

    async fn evict_stale(
        &self,
        store_key: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<(usize, usize), Error> {
        let guard = self.store.lock(store_key).await?;
        let mut listeners = self.load_set(store_key).await?;
        let evicted = listeners.evict_stale(cutoff);
        if evicted > 0 {
            self.store_set(store_key, &listeners).await?;
        }
        guard.release();
        Ok((evicted, listeners.len()))
    }

    async fn load_set(&self, store_key: &str) -> Result<ListenerSet, Error> {
        match self.store.get(store_key).await? {
            Some(bytes) => Ok(ListenerSet::decode(&bytes)?),
            None => Ok(ListenerSet::new()),
        }
    }

    async fn store_set(&self, store_key: &str, listeners: &ListenerSet) -> Result<(), Error> {
        self.store
            .set(store_key, listeners.encode()?, self.config.listener_ttl)
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for Registrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registrar")
            .field("entities", &self.entities)
            .field("config", &self.config)
            .finish()
    }
}

//! Shared observers per entity.
//!
//! Every view showing the same entity shares one [`Observer`], and so one
//! server subscription. The cache counts holders: the observer is destroyed
//! and evicted when the last of them releases it.

use std::sync::Arc;

use dashmap::DashMap;

use livesync_core::ClientTransport;
use livesync_proto::event::normalize_type;
use livesync_proto::FieldMap;

use crate::config::ClientConfig;
use crate::error::Error;
use crate::observer::{entity_id_of, Observer};

struct Cached {
    observer: Observer,
    holders: usize,
}

/// Hands out one shared [`Observer`] per `(type, id)`.
pub struct ObserverCache {
    transport: Arc<dyn ClientTransport>,
    config: ClientConfig,
    observers: DashMap<(String, String), Cached>,
}

impl ObserverCache {
    /// Create an empty cache.
    pub fn new(transport: Arc<dyn ClientTransport>, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            observers: DashMap::new(),
        }
    }

    /// Get the observer for an entity, creating it on first use, and count the
    /// caller as one of its holders.
    ///
    /// An existing observer receives `fields` through
    /// [`apply_options`](Observer::apply_options). Fields without an `id`
    /// produce a fresh observer that is not cached. Every successful call must
    /// be paired with one [`release`](Self::release).
    pub fn acquire(&self, entity_type: &str, fields: FieldMap) -> Result<Observer, Error> {
        let Some(id) = entity_id_of(&fields) else {
            return Ok(self.create(entity_type, fields));
        };
        let key = (normalize_type(entity_type), id);

        // Callbacks run outside the map's shard lock.
        let existing = self.observers.get(&key).map(|cached| cached.observer.clone());
        if let Some(existing) = existing {
            existing.apply_options(&fields)?;
        }

        let mut cached = self.observers.entry(key).or_insert_with(|| Cached {
            observer: self.create(entity_type, fields),
            holders: 0,
        });
        cached.holders += 1;
        Ok(cached.observer.clone())
    }

    /// Give up one hold on an observer returned by [`acquire`](Self::acquire).
    ///
    /// The last holder destroys the observer and evicts it. Uncached
    /// observers are destroyed right away.
    pub async fn release(&self, observer: &Observer) -> Result<(), Error> {
        let Some(id) = observer.entity_id() else {
            return observer.destroy().await;
        };
        let key = (observer.entity_type().to_string(), id.to_string());

        let mut still_held = false;
        let evicted = self.observers.remove_if_mut(&key, |_, cached| {
            if !cached.observer.ptr_eq(observer) {
                return false;
            }
            cached.holders = cached.holders.saturating_sub(1);
            still_held = cached.holders > 0;
            !still_held
        });

        if still_held {
            return Ok(());
        }
        if evicted.is_some() {
            tracing::debug!(?observer, "last holder released observer");
        }
        observer.destroy().await
    }

    /// Number of holders of the cached observer for an entity.
    pub fn holders(&self, entity_type: &str, entity_id: &str) -> usize {
        self.observers
            .get(&(normalize_type(entity_type), entity_id.to_string()))
            .map_or(0, |cached| cached.holders)
    }

    /// Number of cached observers.
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    fn create(&self, entity_type: &str, fields: FieldMap) -> Observer {
        Observer::new(entity_type, fields, self.transport.clone(), self.config.clone())
    }
}

impl std::fmt::Debug for ObserverCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverCache")
            .field("observers", &self.observers.len())
            .finish()
    }
}

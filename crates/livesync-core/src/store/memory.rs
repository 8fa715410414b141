//! In-process coordination store.
//!
//! Shared by every worker that holds the same `Arc<MemoryStore>`. Expiry uses
//! `tokio::time::Instant`, so tests can drive TTLs with a paused clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{CoordinationStore, LockGuard};
use crate::error::StoreError;

/// Default time to wait for a key lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Coordination store backed by process memory.
#[derive(Debug)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    lock_timeout: Duration,
    available: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store with the default lock timeout.
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Create an empty store with a custom lock timeout.
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            locks: DashMap::new(),
            lock_timeout,
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: while unavailable every operation fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Remaining time to live of a key, `None` if absent or expired.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.expires_at - now)
    }

    /// Number of stored entries, including ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store is offline".to_string()))
        }
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.check_available()?;

        let now = Instant::now();
        let value = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            _ => None,
        };
        Ok(value)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        self.check_available()?;

        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn lock(&self, key: &str) -> Result<LockGuard, StoreError> {
        self.check_available()?;

        let mutex = self.key_lock(key);
        let guard = tokio::time::timeout(self.lock_timeout, mutex.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout {
                key: key.to_string(),
                timeout: self.lock_timeout,
            })?;

        tracing::trace!(key, "lock acquired");
        Ok(LockGuard::new(key, move || drop(guard)))
    }

    /// Scanning also drops every expired entry, so periodic collection keeps
    /// the map bounded.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.check_available()?;

        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before - self.entries.len();
        if purged > 0 {
            tracing::trace!(purged, "dropped expired entries");
        }

        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

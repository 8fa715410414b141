//! Coordination store abstraction.
//!
//! The coordination store is the shared, lockable key/value store every
//! backend worker can reach. Listener sets live here and nowhere else.
//!
//! # Example
//!
//! ```rust,ignore
//! let guard = store.lock("listen.user.1").await?;
//! let current = store.get("listen.user.1").await?;
//! // ... modify ...
//! store.set("listen.user.1", encoded, Duration::from_secs(3600)).await?;
//! guard.release();
//! ```

mod memory;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StoreError;

pub use memory::{MemoryStore, DEFAULT_LOCK_TIMEOUT};

/// A shared key/value store with TTLs and per-key locks.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Read a value. Expired keys read as `None`.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Write a value that expires `ttl` from now.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError>;

    /// Acquire the exclusive lock for `key`.
    ///
    /// The lock is held until the returned guard is released or dropped.
    async fn lock(&self, key: &str) -> Result<LockGuard, StoreError>;

    /// List live keys starting with `prefix`.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Holds a coordination store lock.
///
/// Dropping the guard releases the lock, so early returns through `?` never
/// leave a key locked.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard {
    key: String,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl LockGuard {
    /// Create a guard that runs `release` exactly once.
    pub fn new(key: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            key: key.into(),
            release: Some(Box::new(release)),
        }
    }

    /// The locked key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the lock.
    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("held", &self.release.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_guard_releases_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let guard = LockGuard::new("k", move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(guard.key(), "k");
        guard.release();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        {
            let _guard = LockGuard::new("k", move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}

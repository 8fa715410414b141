//! Change notification callbacks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

/// What a callback is notified about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// A field (or dot path) changed. Receives the new value.
    Field(String),
    /// An update from the server was applied. Receives the whole data mapping.
    Updated,
}

impl Topic {
    /// Topic for a field or dot path.
    pub fn field(path: impl Into<String>) -> Self {
        Topic::Field(path.into())
    }
}

/// Identifies a registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Notification callback.
pub type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Wrap a closure as a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&Value) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Callback registry keyed by topic.
///
/// Callbacks run outside the registry lock, so they may register or remove
/// callbacks themselves.
#[derive(Default)]
pub struct Emitter {
    callbacks: RwLock<HashMap<Topic, Vec<(ListenerId, Callback)>>>,
    next_id: AtomicU64,
}

impl Emitter {
    /// Create an empty emitter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback.
    pub fn on(&self, topic: Topic, callback: Callback) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks
            .write()
            .entry(topic)
            .or_default()
            .push((id, callback));
        id
    }

    /// Remove a callback. Returns `false` if it was not registered.
    pub fn off(&self, topic: &Topic, id: ListenerId) -> bool {
        let mut callbacks = self.callbacks.write();
        let Some(list) = callbacks.get_mut(topic) else {
            return false;
        };
        let before = list.len();
        list.retain(|(listener_id, _)| *listener_id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            callbacks.remove(topic);
        }
        removed
    }

    /// Invoke every callback registered for a topic, in registration order.
    pub fn emit(&self, topic: &Topic, value: &Value) {
        let targets: Vec<Callback> = match self.callbacks.read().get(topic) {
            Some(list) => list.iter().map(|(_, cb)| cb.clone()).collect(),
            None => return,
        };
        for cb in targets {
            cb(value);
        }
    }

    /// Number of callbacks registered for a topic.
    pub fn count(&self, topic: &Topic) -> usize {
        self.callbacks.read().get(topic).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topics: Vec<Topic> = self.callbacks.read().keys().cloned().collect();
        f.debug_struct("Emitter").field("topics", &topics).finish()
    }
}

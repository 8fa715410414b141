//! Client-side live observer of one entity.
//!
//! An [`Observer`] holds a local copy of an entity's fields, subscribes to
//! server pushes for it and keeps the subscription alive across reconnects.
//!
//! `listen` and `destroy` are serialized through a single-slot guard held for
//! the whole operation, so they run one at a time in call order and never
//! overlap. Field access (`get`, `set`, `apply_update`) does not take the
//! guard.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use livesync_core::{event_handler, ClientTransport, HandlerId};
use livesync_proto::event::{self, normalize_type, CONNECT};
use livesync_proto::path::{get_path, root_segment, set_path};
use livesync_proto::{DeafenArgs, EntityKey, FieldMap, ListenArgs, RefreshArgs};

use crate::config::ClientConfig;
use crate::emitter::{Callback, Emitter, ListenerId, Topic};
use crate::error::Error;

#[derive(Default)]
struct SubscriptionState {
    subscription_id: Option<String>,
    subscribed: bool,
    update_handler: Option<(String, HandlerId)>,
    connect_handler: Option<HandlerId>,
    keepalive: Option<JoinHandle<()>>,
}

struct Inner {
    entity_type: String,
    /// Captured at construction; later writes to the `id` field do not retarget the observer.
    entity_id: Option<String>,
    transport: Arc<dyn ClientTransport>,
    config: ClientConfig,
    data: RwLock<FieldMap>,
    emitter: Emitter,
    state: Mutex<SubscriptionState>,
}

/// Live, locally cached view of one entity.
///
/// Cloning yields another handle to the same observer.
#[derive(Clone)]
pub struct Observer {
    inner: Arc<Inner>,
}

impl Observer {
    /// Create an observer over initial fields. The `id` field names the entity.
    pub fn new(
        entity_type: &str,
        fields: FieldMap,
        transport: Arc<dyn ClientTransport>,
        config: ClientConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                entity_type: normalize_type(entity_type),
                entity_id: entity_id_of(&fields),
                transport,
                config,
                data: RwLock::new(fields),
                emitter: Emitter::new(),
                state: Mutex::new(SubscriptionState::default()),
            }),
        }
    }

    /// The normalized entity type.
    pub fn entity_type(&self) -> &str {
        &self.inner.entity_type
    }

    /// The entity id, taken from the `id` field the observer was created with.
    pub fn entity_id(&self) -> Option<&str> {
        self.inner.entity_id.as_deref()
    }

    /// Check whether two handles refer to the same observer.
    pub fn ptr_eq(&self, other: &Observer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// A copy of every field.
    pub fn data(&self) -> FieldMap {
        self.inner.data.read().clone()
    }

    /// Read the value at a dot path.
    pub fn get(&self, path: &str) -> Option<Value> {
        get_path(&self.inner.data.read(), path).cloned()
    }

    /// Write a value at a dot path and notify about it.
    ///
    /// Callbacks on `path` are notified, then callbacks on its first segment
    /// when the path is nested. Returns the stored value.
    pub fn set(&self, path: &str, value: Value) -> Result<Value, Error> {
        let root = root_segment(path);
        let root_value = {
            let mut data = self.inner.data.write();
            set_path(&mut data, path, value.clone())?;
            if root != path {
                data.get(root).cloned()
            } else {
                None
            }
        };

        self.inner.emitter.emit(&Topic::field(path), &value);
        if let Some(root_value) = root_value {
            self.inner.emitter.emit(&Topic::field(root), &root_value);
        }
        Ok(value)
    }

    /// Set every key whose value differs from the current one.
    pub fn apply_options(&self, options: &FieldMap) -> Result<(), Error> {
        for (key, value) in options {
            if self.get(key).as_ref() != Some(value) {
                self.set(key, value.clone())?;
            }
        }
        Ok(())
    }

    /// Merge fields pushed by the server.
    ///
    /// Each differing field is overwritten and notified. One [`Topic::Updated`]
    /// notification follows, even when nothing changed.
    pub fn apply_update(&self, update: FieldMap) {
        let (changed, snapshot) = {
            let mut data = self.inner.data.write();
            let mut changed = Vec::new();
            for (key, value) in update {
                if data.get(&key) != Some(&value) {
                    data.insert(key.clone(), value.clone());
                    changed.push((key, value));
                }
            }
            (changed, Value::Object(data.clone()))
        };

        for (key, value) in &changed {
            self.inner.emitter.emit(&Topic::field(key.as_str()), value);
        }
        self.inner.emitter.emit(&Topic::Updated, &snapshot);
    }

    /// Register a change callback.
    pub fn on(&self, topic: Topic, callback: Callback) -> ListenerId {
        self.inner.emitter.on(topic, callback)
    }

    /// Remove a change callback.
    pub fn off(&self, topic: &Topic, id: ListenerId) -> bool {
        self.inner.emitter.off(topic, id)
    }

    /// Number of callbacks registered for a topic.
    pub fn callback_count(&self, topic: &Topic) -> usize {
        self.inner.emitter.count(topic)
    }

    /// Check whether the observer holds an active subscription.
    pub async fn is_subscribed(&self) -> bool {
        self.inner.state.lock().await.subscribed
    }

    /// The subscription id, once one has been generated.
    pub async fn subscription_id(&self) -> Option<String> {
        self.inner.state.lock().await.subscription_id.clone()
    }

    /// Subscribe to server pushes for this entity.
    ///
    /// A no-op when already subscribed or when the entity has no id. A failed
    /// call leaves the observer unsubscribed.
    pub async fn listen(&self) -> Result<(), Error> {
        let mut state = self.inner.state.lock().await;
        if state.subscribed {
            return Ok(());
        }
        let Some(entity_id) = self.entity_id() else {
            tracing::debug!(entity_type = %self.inner.entity_type, "observer has no id, not listening");
            return Ok(());
        };

        let subscription_id = state
            .subscription_id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone();

        // Must be in place before the call: a reconnect while it is in flight
        // leaves the subscription on the old session.
        let connect_id = self
            .inner
            .transport
            .on(CONNECT, connect_handler(Arc::downgrade(&self.inner)));

        let args = ListenArgs::new(entity_id, &subscription_id, self.inner.config.atomic);
        if let Err(e) = self
            .inner
            .transport
            .call(&event::listen(&self.inner.entity_type), args.to_args())
            .await
        {
            self.inner.transport.off(CONNECT, connect_id);
            return Err(e.into());
        }

        let key = EntityKey::new(&self.inner.entity_type, entity_id);
        let update_event = key.update_event();
        let update_id = self
            .inner
            .transport
            .on(&update_event, update_handler(Arc::downgrade(&self.inner)));

        state.subscribed = true;
        state.update_handler = Some((update_event, update_id));
        state.connect_handler = Some(connect_id);
        state.keepalive = self
            .inner
            .config
            .keepalive_interval
            .map(|interval| spawn_keepalive(Arc::downgrade(&self.inner), interval));

        tracing::debug!(entity = %key, subscription_id = %subscription_id, "observer listening");
        Ok(())
    }

    /// Unsubscribe and remove the transport handlers.
    ///
    /// A no-op when not subscribed, so destroying twice is harmless. A failed
    /// call leaves the observer subscribed.
    pub async fn destroy(&self) -> Result<(), Error> {
        let mut state = self.inner.state.lock().await;
        if !state.subscribed {
            return Ok(());
        }

        let entity_id = self.entity_id().unwrap_or_default();
        let subscription_id = state.subscription_id.clone().unwrap_or_default();
        let args = DeafenArgs::new(entity_id, &subscription_id);
        self.inner
            .transport
            .call(&event::deafen(&self.inner.entity_type), args.to_args())
            .await?;

        if let Some((update_event, id)) = state.update_handler.take() {
            self.inner.transport.off(&update_event, id);
        }
        if let Some(id) = state.connect_handler.take() {
            self.inner.transport.off(CONNECT, id);
        }
        if let Some(keepalive) = state.keepalive.take() {
            keepalive.abort();
        }
        state.subscribed = false;

        tracing::debug!(
            entity_type = %self.inner.entity_type,
            entity_id = %entity_id,
            subscription_id = %subscription_id,
            "observer destroyed"
        );
        Ok(())
    }

    /// Fetch the current snapshot from the server and apply it as an update.
    ///
    /// A no-op when the entity has no id.
    pub async fn refresh(&self) -> Result<(), Error> {
        let Some(entity_id) = self.entity_id() else {
            return Ok(());
        };
        let response = self
            .inner
            .transport
            .call(
                &event::refresh(&self.inner.entity_type),
                RefreshArgs::new(entity_id).to_args(),
            )
            .await?;

        match response {
            Value::Object(snapshot) => {
                self.apply_update(snapshot);
                Ok(())
            }
            other => Err(Error::InvalidResponse(format!(
                "expected an object from refresh, got {}",
                other
            ))),
        }
    }
}

impl Inner {
    /// Re-issue the active subscription under the current session.
    async fn relisten(&self, reason: &'static str) {
        let state = self.state.lock().await;
        self.renew(&state, reason).await;
    }

    async fn renew(&self, state: &SubscriptionState, reason: &'static str) {
        if !state.subscribed {
            return;
        }
        let (Some(entity_id), Some(subscription_id)) = (&self.entity_id, &state.subscription_id) else {
            return;
        };

        let args = ListenArgs::new(entity_id, subscription_id, self.config.atomic);
        match self
            .transport
            .call(&event::listen(&self.entity_type), args.to_args())
            .await
        {
            Ok(_) => tracing::trace!(
                entity_type = %self.entity_type,
                entity_id = %entity_id,
                reason,
                "subscription renewed"
            ),
            Err(e) => tracing::warn!(
                entity_type = %self.entity_type,
                entity_id = %entity_id,
                reason,
                error = %e,
                "failed to renew subscription"
            ),
        }
    }
}

fn update_handler(inner: Weak<Inner>) -> livesync_core::EventHandler {
    event_handler(move |payload| {
        let inner = inner.clone();
        async move {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            match payload {
                Value::Object(update) => Observer { inner }.apply_update(update),
                other => tracing::warn!(
                    entity_type = %inner.entity_type,
                    payload = %other,
                    "ignoring non-object update"
                ),
            }
        }
    })
}

/// Renews the subscription on every (re)connect.
///
/// When a listen or destroy holds the guard, renewal is deferred to a task
/// that waits for it, so the transport's connect dispatch never blocks on a
/// call that is itself waiting for the connection.
fn connect_handler(inner: Weak<Inner>) -> livesync_core::EventHandler {
    event_handler(move |_| {
        let inner = inner.clone();
        async move {
            let Some(strong) = inner.upgrade() else {
                return;
            };
            let Ok(state) = strong.state.try_lock() else {
                tracing::debug!(entity_type = %strong.entity_type, "subscription busy, renewing once it settles");
                tokio::spawn(async move {
                    if let Some(inner) = inner.upgrade() {
                        inner.relisten("reconnect").await;
                    }
                });
                return;
            };
            strong.renew(&state, "reconnect").await;
        }
    })
}

fn spawn_keepalive(inner: Weak<Inner>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            inner.relisten("keepalive").await;
        }
    })
}

/// The entity id named by a field map's `id`, if any.
pub(crate) fn entity_id_of(fields: &FieldMap) -> Option<String> {
    match fields.get("id") {
        Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("entity_type", &self.inner.entity_type)
            .field("entity_id", &self.entity_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use livesync_core::{CallContext, CallHandler, MemoryClient, MemoryHub, TransportError};
    use parking_lot::Mutex as SyncMutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::emitter::callback;

    /// Accepts every call; refresh answers with a fixed snapshot.
    struct Accept;

    #[async_trait]
    impl CallHandler for Accept {
        async fn handle_call(
            &self,
            _ctx: CallContext,
            event: &str,
            _args: Vec<Value>,
        ) -> Result<Value, TransportError> {
            if event.starts_with(event::REFRESH) {
                Ok(json!({ "id": "1", "name": "Server" }))
            } else {
                Ok(Value::Null)
            }
        }
    }

    /// Holds the first listen call until opened; records the session of every listen.
    struct GatedListen {
        gated: std::sync::atomic::AtomicBool,
        open: Arc<tokio::sync::Notify>,
        sessions: SyncMutex<Vec<String>>,
    }

    #[async_trait]
    impl CallHandler for GatedListen {
        async fn handle_call(
            &self,
            ctx: CallContext,
            event: &str,
            _args: Vec<Value>,
        ) -> Result<Value, TransportError> {
            if event.starts_with(event::LISTEN) {
                if self.gated.swap(false, Ordering::SeqCst) {
                    self.open.notified().await;
                }
                self.sessions.lock().push(ctx.session_id);
            }
            Ok(Value::Null)
        }
    }

    fn fields(value: Value) -> FieldMap {
        value.as_object().cloned().unwrap()
    }

    fn setup(config: ClientConfig) -> (Arc<MemoryHub>, Arc<MemoryClient>, Observer) {
        let hub = MemoryHub::new();
        hub.attach(Arc::new(Accept));
        let client = Arc::new(hub.connect());
        let observer = Observer::new(
            "User",
            fields(json!({ "id": "1", "name": "Alice" })),
            client.clone(),
            config,
        );
        (hub, client, observer)
    }

    #[tokio::test]
    async fn test_listen_registers_handlers_once() {
        let (_hub, client, observer) = setup(ClientConfig::new().without_keepalive());

        observer.listen().await.unwrap();
        observer.listen().await.unwrap();

        let calls = client.calls_to("model.listen.user");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0], json!("1"));
        assert_eq!(calls[0][2], json!(false));
        assert_eq!(client.handler_count("model.update.user.1"), 1);
        assert_eq!(client.handler_count(CONNECT), 1);
        assert!(observer.is_subscribed().await);
    }

    #[tokio::test]
    async fn test_listen_then_destroy_leaves_nothing_registered() {
        let (_hub, client, observer) = setup(ClientConfig::new());

        let (a, b) = tokio::join!(observer.listen(), observer.destroy());
        a.unwrap();
        b.unwrap();

        assert_eq!(client.calls_to("model.listen.user").len(), 1);
        assert_eq!(client.calls_to("model.deafen.user").len(), 1);
        assert_eq!(client.handler_count("model.update.user.1"), 0);
        assert_eq!(client.handler_count(CONNECT), 0);
        assert!(!observer.is_subscribed().await);
    }

    #[tokio::test]
    async fn test_destroy_without_listen_makes_no_calls() {
        let (_hub, client, observer) = setup(ClientConfig::new());
        observer.destroy().await.unwrap();
        observer.destroy().await.unwrap();
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_listen_without_id_is_noop() {
        let hub = MemoryHub::new();
        let client = Arc::new(hub.connect());
        let observer = Observer::new("user", FieldMap::new(), client.clone(), ClientConfig::new());

        observer.listen().await.unwrap();
        assert!(client.calls().is_empty());
        assert!(!observer.is_subscribed().await);
    }

    #[tokio::test]
    async fn test_failed_listen_leaves_unsubscribed() {
        // No handler attached: every call fails.
        let hub = MemoryHub::new();
        let client = Arc::new(hub.connect());
        let observer = Observer::new(
            "user",
            fields(json!({ "id": "1" })),
            client.clone(),
            ClientConfig::new(),
        );

        assert!(observer.listen().await.is_err());
        assert!(!observer.is_subscribed().await);
        assert_eq!(client.handler_count("model.update.user.1"), 0);
        assert_eq!(client.handler_count(CONNECT), 0);
    }

    #[tokio::test]
    async fn test_local_id_write_does_not_retarget() {
        let (_hub, client, observer) = setup(ClientConfig::new().without_keepalive());
        observer.set("id", json!("2")).unwrap();

        observer.listen().await.unwrap();
        observer.refresh().await.unwrap();
        observer.destroy().await.unwrap();

        assert_eq!(observer.entity_id(), Some("1"));
        assert_eq!(client.calls_to("model.listen.user")[0][0], json!("1"));
        assert_eq!(client.calls_to("model.refresh.user"), vec![vec![json!("1")]]);
        assert_eq!(client.calls_to("model.deafen.user")[0][0], json!("1"));
        assert_eq!(client.handler_count("model.update.user.1"), 0);
    }

    #[tokio::test]
    async fn test_reconnect_relistens_with_same_subscription() {
        let (_hub, client, observer) = setup(ClientConfig::new().without_keepalive());
        observer.listen().await.unwrap();

        client.reconnect().await;

        let calls = client.calls_to("model.listen.user");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0][1], calls[1][1]);
        assert_eq!(
            calls[1][1],
            json!(observer.subscription_id().await.unwrap())
        );
    }

    #[tokio::test]
    async fn test_reconnect_during_listen_renews_on_new_session() {
        let hub = MemoryHub::new();
        let gate = Arc::new(GatedListen {
            gated: std::sync::atomic::AtomicBool::new(true),
            open: Arc::new(tokio::sync::Notify::new()),
            sessions: SyncMutex::new(Vec::new()),
        });
        hub.attach(gate.clone());
        let client = Arc::new(hub.connect());
        let observer = Observer::new(
            "user",
            fields(json!({ "id": "1" })),
            client.clone(),
            ClientConfig::new().without_keepalive(),
        );

        let pending = tokio::spawn({
            let observer = observer.clone();
            async move { observer.listen().await }
        });
        while client.calls_to("model.listen.user").is_empty() {
            tokio::task::yield_now().await;
        }

        client.reconnect().await;
        gate.open.notify_one();
        pending.await.unwrap().unwrap();

        while gate.sessions.lock().len() < 2 {
            tokio::task::yield_now().await;
        }
        let sessions = gate.sessions.lock().clone();
        assert_eq!(sessions[1], client.session_id().unwrap());
        assert_ne!(sessions[0], sessions[1]);
        assert!(observer.is_subscribed().await);
    }

    #[tokio::test]
    async fn test_reconnect_after_destroy_does_nothing() {
        let (_hub, client, observer) = setup(ClientConfig::new());
        observer.listen().await.unwrap();
        observer.destroy().await.unwrap();

        client.reconnect().await;
        assert_eq!(client.calls_to("model.listen.user").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_relistens_periodically() {
        let (_hub, client, observer) =
            setup(ClientConfig::new().with_keepalive_interval(Duration::from_secs(60)));
        observer.listen().await.unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(client.calls_to("model.listen.user").len(), 2);

        observer.destroy().await.unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(client.calls_to("model.listen.user").len(), 2);
    }

    #[tokio::test]
    async fn test_set_nested_notifies_path_and_root() {
        let (_hub, _client, observer) = setup(ClientConfig::new());
        let seen = Arc::new(SyncMutex::new(Vec::new()));

        for path in ["address.city", "address"] {
            let seen = seen.clone();
            observer.on(
                Topic::field(path),
                callback(move |v| seen.lock().push((path, v.clone()))),
            );
        }

        let stored = observer.set("address.city", json!("Oslo")).unwrap();
        assert_eq!(stored, json!("Oslo"));
        assert_eq!(observer.get("address.city"), Some(json!("Oslo")));
        assert_eq!(
            *seen.lock(),
            vec![
                ("address.city", json!("Oslo")),
                ("address", json!({ "city": "Oslo" })),
            ]
        );
    }

    #[tokio::test]
    async fn test_apply_update_notifies_changed_fields_then_updated() {
        let (_hub, _client, observer) = setup(ClientConfig::new());
        let names = Arc::new(AtomicUsize::new(0));
        let updates = Arc::new(AtomicUsize::new(0));

        let n = names.clone();
        observer.on(
            Topic::field("name"),
            callback(move |_| {
                n.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let u = updates.clone();
        observer.on(
            Topic::Updated,
            callback(move |_| {
                u.fetch_add(1, Ordering::SeqCst);
            }),
        );

        observer.apply_update(fields(json!({ "id": "1", "name": "Bob" })));
        observer.apply_update(fields(json!({ "name": "Bob" })));

        assert_eq!(names.load(Ordering::SeqCst), 1);
        assert_eq!(updates.load(Ordering::SeqCst), 2);
        assert_eq!(observer.get("name"), Some(json!("Bob")));
    }

    #[tokio::test]
    async fn test_apply_options_sets_only_differences() {
        let (_hub, _client, observer) = setup(ClientConfig::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        observer.on(
            Topic::field("name"),
            callback(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );

        observer
            .apply_options(&fields(json!({ "id": "1", "name": "Alice", "role": "admin" })))
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(observer.get("role"), Some(json!("admin")));
    }

    #[tokio::test]
    async fn test_pushed_update_reaches_observer() {
        use livesync_core::SessionSink;

        let (hub, client, observer) = setup(ClientConfig::new());
        observer.listen().await.unwrap();

        let session = client.session_id().unwrap();
        hub.emit_to_session(&session, "model.update.user.1", json!({ "name": "Pushed" }))
            .await
            .unwrap();
        assert_eq!(observer.get("name"), Some(json!("Pushed")));
    }

    #[tokio::test]
    async fn test_refresh_applies_snapshot() {
        let (_hub, client, observer) = setup(ClientConfig::new());
        observer.refresh().await.unwrap();

        assert_eq!(client.calls_to("model.refresh.user"), vec![vec![json!("1")]]);
        assert_eq!(observer.get("name"), Some(json!("Server")));
    }
}

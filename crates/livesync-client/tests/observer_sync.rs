//! Observers kept in sync by a node over the in-memory transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use livesync_client::{callback, Binding, ClientConfig, Observer, ObserverCache, Topic};
use livesync_core::{
    CoordinationStore, EntityRegistry, MemoryClient, MemoryEntitySource, MemoryHub, MemoryStore,
};
use livesync_proto::{FieldMap, SaveEvent};
use livesync_server::{Node, ServerConfig};

fn fields(value: Value) -> FieldMap {
    value.as_object().cloned().unwrap()
}

struct Env {
    hub: Arc<MemoryHub>,
    store: Arc<MemoryStore>,
    notes: Arc<MemoryEntitySource>,
    node: Node,
}

fn start() -> Env {
    let notes = Arc::new(MemoryEntitySource::new("note").with_hidden_fields(["owner_token"]));
    notes.insert(
        "7",
        fields(json!({ "id": "7", "title": "Draft", "body": "", "owner_token": "secret" })),
    );
    let hub = MemoryHub::new();
    let store = Arc::new(MemoryStore::new());
    let node = Node::start(
        ServerConfig::default().without_collection(),
        store.clone(),
        Arc::new(EntityRegistry::new().with_source("note", notes.clone())),
        hub.clone(),
    );
    hub.attach(node.router());
    Env {
        hub,
        store,
        notes,
        node,
    }
}

impl Env {
    async fn save(&self, changes: Value) {
        let changed = self.notes.update("7", fields(changes));
        self.node
            .registrar()
            .on_save(&SaveEvent::new("note", "7", changed))
            .await;
    }

    async fn has_listener(&self, session_id: &str) -> bool {
        self.node
            .registrar()
            .listeners("note", "7")
            .await
            .unwrap()
            .records()
            .iter()
            .any(|r| r.session_id == session_id)
    }
}

fn observer(client: &Arc<MemoryClient>, config: ClientConfig) -> Observer {
    Observer::new("Note", fields(json!({ "id": "7" })), client.clone(), config)
}

#[tokio::test]
async fn test_observer_receives_full_updates() {
    let env = start();
    let client = Arc::new(env.hub.connect());
    let note = observer(&client, ClientConfig::new().without_keepalive());
    note.listen().await.unwrap();

    env.save(json!({ "title": "Final" })).await;

    assert_eq!(note.get("title"), Some(json!("Final")));
    assert_eq!(note.get("body"), Some(json!("")));
    assert_eq!(note.get("owner_token"), None);
}

#[tokio::test]
async fn test_atomic_observer_receives_changed_fields_only() {
    let env = start();
    let client = Arc::new(env.hub.connect());
    let note = observer(&client, ClientConfig::new().with_atomic(true).without_keepalive());
    note.listen().await.unwrap();

    let updates = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let u = updates.clone();
    note.on(Topic::Updated, callback(move |data| u.lock().push(data.clone())));

    env.save(json!({ "body": "Hello" })).await;

    assert_eq!(*updates.lock(), vec![json!({ "id": "7", "body": "Hello" })]);
    assert_eq!(note.get("title"), None);
}

#[tokio::test]
async fn test_observer_survives_reconnect() {
    let env = start();
    let client = Arc::new(env.hub.connect());
    let note = observer(&client, ClientConfig::new().without_keepalive());
    note.listen().await.unwrap();

    client.reconnect().await;
    env.save(json!({ "title": "After reconnect" })).await;

    assert_eq!(note.get("title"), Some(json!("After reconnect")));
    // The old session's record stays until collection; only the live session is reachable.
    let listeners = env.node.registrar().listeners("note", "7").await.unwrap();
    let subscriptions: Vec<&str> = listeners
        .records()
        .iter()
        .map(|r| r.subscription_id.as_str())
        .collect();
    let expected = note.subscription_id().await.unwrap();
    assert_eq!(subscriptions, vec![expected.as_str(), expected.as_str()]);
}

#[tokio::test]
async fn test_destroy_removes_server_listener() {
    let env = start();
    let client = Arc::new(env.hub.connect());
    let note = observer(&client, ClientConfig::new());
    note.listen().await.unwrap();
    note.destroy().await.unwrap();

    assert!(env.node.registrar().listeners("note", "7").await.unwrap().is_empty());
    env.save(json!({ "title": "Unseen" })).await;
    assert_eq!(note.get("title"), None);
}

#[tokio::test]
async fn test_refresh_pulls_current_snapshot() {
    let env = start();
    let client = Arc::new(env.hub.connect());
    let note = observer(&client, ClientConfig::new());

    note.refresh().await.unwrap();
    assert_eq!(note.get("title"), Some(json!("Draft")));
}

#[tokio::test]
async fn test_binding_renders_and_tears_down() {
    let env = start();
    let client = Arc::new(env.hub.connect());
    let cache = Arc::new(ObserverCache::new(client.clone(), ClientConfig::new()));

    let renders = Arc::new(AtomicUsize::new(0));
    let r = renders.clone();
    let binding = Binding::new(
        cache.clone(),
        callback(move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        }),
    );

    let first = binding.model("note", fields(json!({ "id": "7" }))).await.unwrap();
    let again = cache.acquire("note", fields(json!({ "id": "7" }))).unwrap();
    again.set("title", json!("local edit")).unwrap();
    assert_eq!(first.get("title"), Some(json!("local edit")));
    cache.release(&again).await.unwrap();

    env.save(json!({ "title": "Server edit" })).await;
    assert_eq!(renders.load(Ordering::SeqCst), 1);
    assert_eq!(first.get("title"), Some(json!("Server edit")));

    binding.teardown().await.unwrap();
    assert!(env.node.registrar().listeners("note", "7").await.unwrap().is_empty());

    env.save(json!({ "title": "Ignored" })).await;
    assert_eq!(renders.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_second_view_survives_first_teardown() {
    let env = start();
    let client = Arc::new(env.hub.connect());
    let cache = Arc::new(ObserverCache::new(client.clone(), ClientConfig::new()));

    let renders = Arc::new(AtomicUsize::new(0));
    let r = renders.clone();
    let list_view = Binding::new(cache.clone(), callback(|_| {}));
    let detail_view = Binding::new(
        cache.clone(),
        callback(move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        }),
    );

    list_view.model("note", fields(json!({ "id": "7" }))).await.unwrap();
    let note = detail_view.model("note", fields(json!({ "id": "7" }))).await.unwrap();
    list_view.teardown().await.unwrap();

    env.save(json!({ "title": "Still watched" })).await;
    assert_eq!(renders.load(Ordering::SeqCst), 1);
    assert_eq!(note.get("title"), Some(json!("Still watched")));
    assert_eq!(env.node.registrar().listeners("note", "7").await.unwrap().len(), 1);

    detail_view.teardown().await.unwrap();
    assert!(env.node.registrar().listeners("note", "7").await.unwrap().is_empty());
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_reconnect_while_listen_in_flight() {
    let env = start();
    let client = Arc::new(env.hub.connect());
    let note = observer(&client, ClientConfig::new().without_keepalive());

    // Park the subscribe call on the listener set lock.
    let held = env.store.lock("listen.note.7").await.unwrap();
    let pending = tokio::spawn({
        let note = note.clone();
        async move { note.listen().await }
    });
    while client.calls_to("model.listen.note").is_empty() {
        tokio::task::yield_now().await;
    }

    client.reconnect().await;
    held.release();
    pending.await.unwrap().unwrap();

    let session = client.session_id().unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !env.has_listener(&session).await {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    env.save(json!({ "title": "Seen" })).await;
    assert!(note.is_subscribed().await);
    assert_eq!(note.get("title"), Some(json!("Seen")));
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_outlives_staleness_window() {
    let env = start();
    let client = Arc::new(env.hub.connect());
    let note = observer(
        &client,
        ClientConfig::new().with_keepalive_interval(Duration::from_secs(20 * 60)),
    );
    note.listen().await.unwrap();

    // Two hours of inactivity: the set would have expired twice without keepalive.
    tokio::time::sleep(Duration::from_secs(2 * 3600)).await;
    assert_eq!(env.node.registrar().listeners("note", "7").await.unwrap().len(), 1);

    env.save(json!({ "title": "Still live" })).await;
    assert_eq!(note.get("title"), Some(json!("Still live")));
}

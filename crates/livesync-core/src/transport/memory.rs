//! In-process messaging transport.
//!
//! [`MemoryHub`] plays the server side: it routes calls from its clients to
//! an attached [`CallHandler`] and delivers session events to them.
//! [`MemoryClient`] plays the frontend side. Every (re)connect assigns a new
//! session id, the way a real socket transport does, and fires the
//! [`CONNECT`](livesync_proto::event::CONNECT) event on the client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use livesync_proto::event::CONNECT;

use super::{CallContext, CallHandler, ClientTransport, EventHandler, HandlerId, Scope, SessionSink};
use crate::error::TransportError;

#[derive(Default)]
struct Endpoint {
    handlers: Mutex<HashMap<String, Vec<(HandlerId, EventHandler)>>>,
    next_handler_id: AtomicU64,
    received: Mutex<Vec<(String, Value)>>,
}

impl Endpoint {
    fn handlers_for(&self, event: &str) -> Vec<EventHandler> {
        self.handlers
            .lock()
            .get(event)
            .map(|handlers| handlers.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }

    async fn dispatch(&self, event: &str, payload: Value) {
        for handler in self.handlers_for(event) {
            handler(payload.clone()).await;
        }
    }
}

/// Server side of the in-process transport.
pub struct MemoryHub {
    sessions: DashMap<String, Arc<Endpoint>>,
    handler: RwLock<Option<Arc<dyn CallHandler>>>,
    scope: Scope,
}

impl MemoryHub {
    /// Create a hub whose calls arrive with [`Scope::Local`].
    pub fn new() -> Arc<Self> {
        Self::with_scope(Scope::Local)
    }

    /// Create a hub whose calls arrive with the given scope.
    pub fn with_scope(scope: Scope) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            handler: RwLock::new(None),
            scope,
        })
    }

    /// Attach the handler that serves client calls.
    pub fn attach(&self, handler: Arc<dyn CallHandler>) {
        *self.handler.write() = Some(handler);
    }

    /// Connect a new client.
    pub fn connect(self: &Arc<Self>) -> MemoryClient {
        let endpoint = Arc::new(Endpoint::default());
        let session_id = self.register(&endpoint);
        MemoryClient {
            hub: self.clone(),
            endpoint,
            session_id: RwLock::new(Some(session_id)),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Number of connected sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn register(&self, endpoint: &Arc<Endpoint>) -> String {
        let session_id = uuid::Uuid::new_v4().to_string();
        self.sessions.insert(session_id.clone(), endpoint.clone());
        tracing::debug!(session_id = %session_id, "session connected");
        session_id
    }

    fn unregister(&self, session_id: &str) {
        if self.sessions.remove(session_id).is_some() {
            tracing::debug!(session_id, "session disconnected");
        }
    }
}

impl std::fmt::Debug for MemoryHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHub")
            .field("sessions", &self.sessions.len())
            .field("scope", &self.scope)
            .finish()
    }
}

#[async_trait]
impl SessionSink for MemoryHub {
    async fn emit_to_session(
        &self,
        session_id: &str,
        event: &str,
        payload: Value,
    ) -> Result<(), TransportError> {
        let endpoint = self
            .sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::SessionNotFound(session_id.to_string()))?;

        endpoint
            .received
            .lock()
            .push((event.to_string(), payload.clone()));
        endpoint.dispatch(event, payload).await;
        Ok(())
    }
}

/// Frontend side of the in-process transport.
pub struct MemoryClient {
    hub: Arc<MemoryHub>,
    endpoint: Arc<Endpoint>,
    session_id: RwLock<Option<String>>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
}

impl MemoryClient {
    /// Current session id, `None` while disconnected.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    /// Check whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.session_id.read().is_some()
    }

    /// Drop the connection. Calls fail and deliveries are lost until [`reconnect`](Self::reconnect).
    pub fn disconnect(&self) {
        if let Some(session_id) = self.session_id.write().take() {
            self.hub.unregister(&session_id);
        }
    }

    /// Establish a fresh connection under a new session id and fire `connect`.
    pub async fn reconnect(&self) {
        self.disconnect();
        let session_id = self.hub.register(&self.endpoint);
        *self.session_id.write() = Some(session_id);
        self.endpoint.dispatch(CONNECT, Value::Null).await;
    }

    /// Every call made through this client, in order.
    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().clone()
    }

    /// Calls made to one event name.
    pub fn calls_to(&self, event: &str) -> Vec<Vec<Value>> {
        self.calls
            .lock()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, args)| args.clone())
            .collect()
    }

    /// Every event delivered to this client, in order.
    pub fn received(&self) -> Vec<(String, Value)> {
        self.endpoint.received.lock().clone()
    }

    /// Number of handlers registered for an event.
    pub fn handler_count(&self, event: &str) -> usize {
        self.endpoint
            .handlers
            .lock()
            .get(event)
            .map_or(0, |handlers| handlers.len())
    }
}

impl std::fmt::Debug for MemoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryClient")
            .field("session_id", &self.session_id())
            .finish()
    }
}

#[async_trait]
impl ClientTransport for MemoryClient {
    async fn call(&self, event: &str, args: Vec<Value>) -> Result<Value, TransportError> {
        self.calls.lock().push((event.to_string(), args.clone()));

        let session_id = self.session_id().ok_or(TransportError::Closed)?;
        let handler = self
            .hub
            .handler
            .read()
            .clone()
            .ok_or_else(|| TransportError::NoHandler(event.to_string()))?;

        handler
            .handle_call(CallContext::new(session_id, self.hub.scope), event, args)
            .await
    }

    fn on(&self, event: &str, handler: EventHandler) -> HandlerId {
        let id = HandlerId(self.endpoint.next_handler_id.fetch_add(1, Ordering::SeqCst));
        self.endpoint
            .handlers
            .lock()
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    fn off(&self, event: &str, id: HandlerId) -> bool {
        let mut handlers = self.endpoint.handlers.lock();
        let Some(list) = handlers.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(handler_id, _)| *handler_id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(event);
        }
        removed
    }
}

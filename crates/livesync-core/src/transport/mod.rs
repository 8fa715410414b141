//! Messaging transport abstraction.
//!
//! The transport is the bidirectional channel between backend workers and
//! frontend sessions. The backend sees it as a [`SessionSink`] (push a named
//! event to one session) and serves calls through a [`CallHandler`]. The
//! frontend sees it as a [`ClientTransport`] (make calls, subscribe to named
//! events).
//!
//! ```text
//! ┌──────────┐  call(model.listen.user)   ┌─────────────┐
//! │  client  │ ─────────────────────────► │ CallHandler │
//! │          │                            │  (worker)   │
//! │          │ ◄───────────────────────── │ SessionSink │
//! └──────────┘  model.update.user.1       └─────────────┘
//! ```

mod memory;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use crate::error::TransportError;

pub use memory::{MemoryClient, MemoryHub};

/// Addressing mode of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// The call originated in the same worker process as the handler.
    Local,
    /// The call originated on any other worker process.
    Cluster,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Local => write!(f, "local"),
            Scope::Cluster => write!(f, "cluster"),
        }
    }
}

/// Origin of an incoming call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    /// Session that made the call.
    pub session_id: String,
    /// How the call was addressed.
    pub scope: Scope,
}

impl CallContext {
    /// Create a call context.
    pub fn new(session_id: impl Into<String>, scope: Scope) -> Self {
        Self {
            session_id: session_id.into(),
            scope,
        }
    }
}

/// Identifies a registered client-side event handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub u64);

/// Client-side event handler.
pub type EventHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as an [`EventHandler`].
pub fn event_handler<F, Fut>(f: F) -> EventHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |payload| f(payload).boxed())
}

/// Backend view: deliver a named event to one session.
#[async_trait]
pub trait SessionSink: Send + Sync {
    /// Emit `event` with `payload` to the session.
    async fn emit_to_session(
        &self,
        session_id: &str,
        event: &str,
        payload: Value,
    ) -> Result<(), TransportError>;
}

/// Backend view: serve calls made by sessions.
#[async_trait]
pub trait CallHandler: Send + Sync {
    /// Handle one call and produce its response.
    async fn handle_call(
        &self,
        ctx: CallContext,
        event: &str,
        args: Vec<Value>,
    ) -> Result<Value, TransportError>;
}

/// Frontend view of the transport.
#[async_trait]
pub trait ClientTransport: Send + Sync {
    /// Make a request/response call to the backend.
    async fn call(&self, event: &str, args: Vec<Value>) -> Result<Value, TransportError>;

    /// Register a handler for a named event.
    fn on(&self, event: &str, handler: EventHandler) -> HandlerId;

    /// Remove a handler. Returns `false` if it was not registered.
    fn off(&self, event: &str, id: HandlerId) -> bool;
}

//! Endpoint routing for incoming calls.
//!
//! Calls are named `<endpoint>.<entity type>`. The router holds one handler
//! per `(scope, endpoint)` pair and passes the entity type suffix to it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use serde_json::Value;

use livesync_core::{CallContext, CallHandler, Scope, TransportError};
use livesync_proto::event::{normalize_type, strip_endpoint};

use crate::error::Error;

/// Handler for one endpoint. Receives the call context, the normalized
/// entity type and the positional arguments.
pub type EndpointFn =
    Arc<dyn Fn(CallContext, String, Vec<Value>) -> BoxFuture<'static, Result<Value, Error>> + Send + Sync>;

/// Wrap an async closure as an [`EndpointFn`].
pub fn endpoint_fn<F, Fut>(f: F) -> EndpointFn
where
    F: Fn(CallContext, String, Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, Error>> + Send + 'static,
{
    Arc::new(move |ctx, entity_type, args| f(ctx, entity_type, args).boxed())
}

/// Routes calls to endpoint handlers by scope and name.
#[derive(Default)]
pub struct EndpointRouter {
    endpoints: RwLock<HashMap<(Scope, String), EndpointFn>>,
}

impl EndpointRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an endpoint under one scope, replacing any previous one.
    pub fn endpoint(&self, scope: Scope, name: &str, handler: EndpointFn) {
        tracing::debug!(%scope, endpoint = name, "registering endpoint");
        self.endpoints.write().insert((scope, name.to_string()), handler);
    }

    /// Register the same handler under both scopes.
    pub fn endpoint_all(&self, name: &str, handler: EndpointFn) {
        self.endpoint(Scope::Local, name, handler.clone());
        self.endpoint(Scope::Cluster, name, handler);
    }

    /// Check whether an endpoint is registered under a scope.
    pub fn has_endpoint(&self, scope: Scope, name: &str) -> bool {
        self.endpoints.read().contains_key(&(scope, name.to_string()))
    }

    /// Number of registered `(scope, endpoint)` pairs.
    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    /// Check if no endpoint is registered.
    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }

    /// Dispatch a call to the endpoint its name addresses.
    pub async fn dispatch(
        &self,
        ctx: CallContext,
        event: &str,
        args: Vec<Value>,
    ) -> Result<Value, Error> {
        let (handler, entity_type) = self
            .resolve(ctx.scope, event)
            .ok_or_else(|| TransportError::NoHandler(event.to_string()))?;
        handler(ctx, entity_type, args).await
    }

    fn resolve(&self, scope: Scope, event: &str) -> Option<(EndpointFn, String)> {
        let endpoints = self.endpoints.read();
        endpoints.iter().find_map(|((s, name), handler)| {
            if *s != scope {
                return None;
            }
            strip_endpoint(event, name).map(|entity_type| (handler.clone(), normalize_type(entity_type)))
        })
    }
}

impl std::fmt::Debug for EndpointRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self
            .endpoints
            .read()
            .keys()
            .map(|(scope, name)| format!("{}:{}", scope, name))
            .collect();
        names.sort();
        f.debug_struct("EndpointRouter").field("endpoints", &names).finish()
    }
}

#[async_trait]
impl CallHandler for EndpointRouter {
    async fn handle_call(
        &self,
        ctx: CallContext,
        event: &str,
        args: Vec<Value>,
    ) -> Result<Value, TransportError> {
        let session_id = ctx.session_id.clone();
        self.dispatch(ctx, event, args).await.map_err(|e| {
            tracing::debug!(session_id = %session_id, event, error = %e, "call failed");
            e.into_response()
        })
    }
}

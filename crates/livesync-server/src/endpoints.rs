//! Registrar endpoints exposed over the transport.

use std::sync::Arc;

use serde_json::Value;

use livesync_core::Scope;
use livesync_proto::event::{DEAFEN, LISTEN, REFRESH};
use livesync_proto::{DeafenArgs, ListenArgs, RefreshArgs};

use crate::error::Error;
use crate::registrar::Registrar;
use crate::router::{endpoint_fn, EndpointRouter};

/// Register the registrar's endpoints on a router.
///
/// `model.listen` and `model.deafen` are served under both scopes so a
/// session can reach them from any worker. `model.refresh` is local only.
pub fn mount(registrar: Arc<Registrar>, router: &EndpointRouter) {
    let r = registrar.clone();
    router.endpoint_all(
        LISTEN,
        endpoint_fn(move |ctx, entity_type, args| {
            let registrar = r.clone();
            async move {
                let args = ListenArgs::from_args(&args)?;
                registrar
                    .subscribe(
                        &ctx.session_id,
                        &entity_type,
                        &args.entity_id,
                        &args.subscription_id,
                        args.atomic,
                    )
                    .await?;
                Ok::<_, Error>(Value::Null)
            }
        }),
    );

    let r = registrar.clone();
    router.endpoint_all(
        DEAFEN,
        endpoint_fn(move |ctx, entity_type, args| {
            let registrar = r.clone();
            async move {
                let args = DeafenArgs::from_args(&args)?;
                registrar
                    .unsubscribe(
                        &ctx.session_id,
                        &entity_type,
                        &args.entity_id,
                        &args.subscription_id,
                    )
                    .await?;
                Ok::<_, Error>(Value::Null)
            }
        }),
    );

    let types = registrar.entities().types();
    router.endpoint(
        Scope::Local,
        REFRESH,
        endpoint_fn(move |_ctx, entity_type, args| {
            let registrar = registrar.clone();
            async move {
                let args = RefreshArgs::from_args(&args)?;
                let snapshot = registrar.refresh(&entity_type, &args.entity_id).await?;
                Ok::<_, Error>(Value::Object(snapshot))
            }
        }),
    );

    tracing::info!(?types, endpoints = router.len(), "model endpoints mounted");
}

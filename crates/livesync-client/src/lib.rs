//! livesync client - live, locally cached views of server entities.
//!
//! An [`Observer`] mirrors one entity and applies the updates the server
//! pushes when the entity is saved. [`ObserverCache`] shares one observer
//! per entity, and a [`Binding`] ties observers to the lifetime of a view.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use livesync_client::{callback, ClientConfig, Observer, Topic};
//!
//! let observer = Observer::new("user", fields, transport, ClientConfig::default());
//! observer.on(Topic::field("name"), callback(|name| println!("name is now {name}")));
//! observer.listen().await?;
//! ```

pub mod binding;
pub mod cache;
pub mod config;
pub mod emitter;
pub mod error;
pub mod observer;

pub use binding::Binding;
pub use cache::ObserverCache;
pub use config::{ClientConfig, DEFAULT_KEEPALIVE_INTERVAL};
pub use emitter::{callback, Callback, Emitter, ListenerId, Topic};
pub use error::Error;
pub use observer::Observer;

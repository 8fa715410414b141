//! livesync server - listener registry and live update fan-out.
//!
//! A [`Registrar`] records which sessions observe which entities in a shared
//! coordination store and pushes an update to every observer when an entity
//! is saved. A [`Node`] wires the registrar to an [`EndpointRouter`], a save
//! processor and the stale-listener collector.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use livesync_core::{EntityRegistry, MemoryHub, MemoryStore};
//! use livesync_server::{Node, ServerConfig};
//!
//! let hub = MemoryHub::new();
//! let node = Node::start(
//!     ServerConfig::default(),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(EntityRegistry::new()),
//!     hub.clone(),
//! );
//! hub.attach(node.router());
//! ```

pub mod collector;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod node;
pub mod registrar;
pub mod router;
pub mod save;

pub use collector::collect_task;
pub use config::{Args, RegistrarConfig, ServerConfig};
pub use endpoints::mount;
pub use error::Error;
pub use node::Node;
pub use registrar::{CollectReport, Registrar, SaveOutcome, SkipReason};
pub use router::{endpoint_fn, EndpointFn, EndpointRouter};
pub use save::{SaveHandle, SaveProcessor};

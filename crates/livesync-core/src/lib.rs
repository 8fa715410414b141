//! livesync core - seams to the collaborators the registry depends on.
//!
//! - [`store`] - the shared, lockable coordination store holding listener sets
//! - [`entity`] - per-type load and sanitize capability
//! - [`transport`] - the messaging transport between workers and sessions
//!
//! Each seam is a trait with an in-memory implementation used by tests and
//! the single-process demo node.

pub mod entity;
pub mod error;
pub mod store;
pub mod transport;

pub use entity::{EntityRegistry, EntitySource, MemoryEntitySource};
pub use error::{EntityError, StoreError, TransportError};
pub use store::{CoordinationStore, LockGuard, MemoryStore};
pub use transport::{
    event_handler, CallContext, CallHandler, ClientTransport, EventHandler, HandlerId, MemoryClient,
    MemoryHub, Scope, SessionSink,
};

/// Re-export protocol types.
pub use livesync_proto as proto;

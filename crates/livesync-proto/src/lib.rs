//! livesync protocol types.
//!
//! This crate defines the wire contract shared by the livesync registrar
//! (backend) and observers (frontend). Payloads are plain JSON so any
//! messaging transport that can carry named JSON events can carry them.
//!
//! # Modules
//!
//! - [`event`] - Event names and entity addressing
//! - [`listener`] - Listener records and listener sets stored in the coordination store
//! - [`update`] - Save events and update envelopes
//! - [`call`] - Argument decoding for client-to-server calls
//! - [`path`] - Dot-path access into field mappings
//! - [`error`] - Protocol error types

pub mod call;
pub mod error;
pub mod event;
pub mod listener;
pub mod path;
pub mod update;

pub use error::Error;

// Re-export commonly used types at crate root
pub use call::{error_codes, DeafenArgs, ListenArgs, RefreshArgs};
pub use event::EntityKey;
pub use listener::{ListenerRecord, ListenerSet};
pub use update::{atomic_diff, SaveEvent, UpdateEnvelope};

/// A mapping of field name to value, the unit of data exchanged for an entity.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

/// Fields maintained by the persistence layer that never trigger a live update.
pub const DEFAULT_SYSTEM_FIELDS: &[&str] = &["created_at", "updated_at"];

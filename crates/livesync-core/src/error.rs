//! Core error types.

use std::time::Duration;

use thiserror::Error;

/// Coordination store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A lock could not be acquired in time.
    #[error("timed out after {timeout:?} waiting for lock {key}")]
    LockTimeout { key: String, timeout: Duration },

    /// The store could not be reached.
    #[error("coordination store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] livesync_proto::Error),
}

/// Entity lookup errors.
#[derive(Debug, Error)]
pub enum EntityError {
    /// No source is registered for the entity type.
    #[error("unknown entity type: {0}")]
    UnknownType(String),

    /// The entity does not exist.
    #[error("{entity_type} #{entity_id} not found")]
    NotFound {
        entity_type: String,
        entity_id: String,
    },

    /// The source failed to load or sanitize the entity.
    #[error("entity source error: {0}")]
    Source(String),
}

/// Messaging transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection is closed.
    #[error("transport closed")]
    Closed,

    /// No session with this id is connected.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// No endpoint serves this event.
    #[error("no handler for {0}")]
    NoHandler(String),

    /// The remote side rejected the call.
    #[error("remote error {code}: {message}")]
    Remote { code: u32, message: String },
}

impl TransportError {
    /// Build a remote error response.
    pub fn remote(code: u32, message: impl Into<String>) -> Self {
        Self::Remote {
            code,
            message: message.into(),
        }
    }

    /// Error code of a remote failure, if this is one.
    pub fn code(&self) -> Option<u32> {
        match self {
            Self::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }
}

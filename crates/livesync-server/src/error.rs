//! Server error types.

use livesync_core::{EntityError, StoreError, TransportError};
use livesync_proto::error_codes;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Coordination store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Entity lookup error.
    #[error("entity error: {0}")]
    Entity(#[from] EntityError),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] livesync_proto::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Error code reported to a remote caller.
    pub fn code(&self) -> u32 {
        match self {
            Error::Store(_) => error_codes::UNAVAILABLE,
            Error::Entity(EntityError::NotFound { .. } | EntityError::UnknownType(_)) => {
                error_codes::NOT_FOUND
            }
            Error::Entity(EntityError::Source(_)) => error_codes::INTERNAL,
            Error::Transport(TransportError::NoHandler(_)) => error_codes::NOT_FOUND,
            Error::Transport(e) => e.code().unwrap_or(error_codes::INTERNAL),
            Error::Protocol(_) => error_codes::INVALID_REQUEST,
            Error::Config(_) => error_codes::INTERNAL,
        }
    }

    /// Convert into the error response sent back over the transport.
    pub fn into_response(self) -> TransportError {
        match self {
            Error::Transport(remote @ TransportError::Remote { .. }) => remote,
            other => TransportError::remote(other.code(), other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_codes() {
        let timeout = Error::from(StoreError::LockTimeout {
            key: "listen.user.1".into(),
            timeout: Duration::from_secs(5),
        });
        assert_eq!(timeout.code(), error_codes::UNAVAILABLE);

        let missing = Error::from(EntityError::NotFound {
            entity_type: "user".into(),
            entity_id: "1".into(),
        });
        assert_eq!(missing.code(), error_codes::NOT_FOUND);

        let bad = Error::from(livesync_proto::Error::InvalidMessage("x".into()));
        assert_eq!(bad.code(), error_codes::INVALID_REQUEST);
    }

    #[test]
    fn test_into_response_keeps_message() {
        let response = Error::from(EntityError::UnknownType("post".into())).into_response();
        match response {
            TransportError::Remote { code, message } => {
                assert_eq!(code, error_codes::NOT_FOUND);
                assert!(message.contains("post"));
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }
}

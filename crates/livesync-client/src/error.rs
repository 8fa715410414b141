//! Client error types.

use livesync_core::TransportError;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The transport call failed or the server rejected it.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] livesync_proto::Error),

    /// The server answered with something other than expected.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

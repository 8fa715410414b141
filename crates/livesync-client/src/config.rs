//! Client configuration.

use std::time::Duration;

/// Default interval between keepalive re-subscriptions (20 minutes).
///
/// Kept well below the server's listener TTL and staleness window.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20 * 60);

/// Observer configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Interval between keepalive re-subscriptions. None disables keepalive.
    pub keepalive_interval: Option<Duration>,

    /// Ask the server for changed fields only instead of full snapshots.
    pub atomic: bool,
}

impl ClientConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            keepalive_interval: Some(DEFAULT_KEEPALIVE_INTERVAL),
            atomic: false,
        }
    }

    /// Set the keepalive interval.
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = Some(interval);
        self
    }

    /// Disable keepalive re-subscription.
    pub fn without_keepalive(mut self) -> Self {
        self.keepalive_interval = None;
        self
    }

    /// Request atomic updates.
    pub fn with_atomic(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

//! Server configuration.

use std::time::Duration;

use clap::Parser;
use livesync_core::store::DEFAULT_LOCK_TIMEOUT;
use livesync_proto::DEFAULT_SYSTEM_FIELDS;

/// Default lifetime of an untouched listener set in seconds (1 hour).
pub const DEFAULT_LISTENER_TTL_SECS: u64 = 3600;

/// Default age after which a listener record is considered stale (1 hour).
pub const DEFAULT_STALE_AFTER_SECS: u64 = 3600;

/// Default interval between collection sweeps in seconds.
pub const DEFAULT_COLLECT_INTERVAL_SECS: u64 = 30;

/// Default capacity of the save event channel.
pub const DEFAULT_SAVE_BUFFER: usize = 1024;

/// Registrar behaviour.
#[derive(Debug, Clone)]
pub struct RegistrarConfig {
    /// TTL applied to a listener set on every mutating access.
    pub listener_ttl: Duration,

    /// Records whose `last_seen` is older than this are evicted by collection.
    pub stale_after: Duration,

    /// Field names maintained by the persistence layer; saves touching only
    /// these never notify listeners.
    pub system_fields: Vec<String>,
}

impl RegistrarConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            listener_ttl: Duration::from_secs(DEFAULT_LISTENER_TTL_SECS),
            stale_after: Duration::from_secs(DEFAULT_STALE_AFTER_SECS),
            system_fields: DEFAULT_SYSTEM_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Set the listener set TTL.
    pub fn with_listener_ttl(mut self, ttl: Duration) -> Self {
        self.listener_ttl = ttl;
        self
    }

    /// Set the staleness window used by collection.
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Replace the system-managed field list.
    pub fn with_system_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.system_fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Node configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Registrar behaviour.
    pub registrar: RegistrarConfig,

    /// Interval between collection sweeps. None disables collection.
    pub collect_interval: Option<Duration>,

    /// Capacity of the save event channel.
    pub save_buffer: usize,

    /// Time to wait for a listener set lock.
    pub lock_timeout: Duration,
}

impl ServerConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            registrar: RegistrarConfig::new(),
            collect_interval: Some(Duration::from_secs(DEFAULT_COLLECT_INTERVAL_SECS)),
            save_buffer: DEFAULT_SAVE_BUFFER,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Set the registrar configuration.
    pub fn with_registrar(mut self, registrar: RegistrarConfig) -> Self {
        self.registrar = registrar;
        self
    }

    /// Set the collection interval.
    pub fn with_collect_interval(mut self, interval: Duration) -> Self {
        self.collect_interval = Some(interval);
        self
    }

    /// Disable periodic collection.
    pub fn without_collection(mut self) -> Self {
        self.collect_interval = None;
        self
    }

    /// Set the save channel capacity.
    pub fn with_save_buffer(mut self, size: usize) -> Self {
        self.save_buffer = size.max(1);
        self
    }

    /// Set the lock acquisition timeout.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Check if periodic collection is enabled.
    pub fn has_collection(&self) -> bool {
        self.collect_interval.is_some()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Command-line arguments for a livesync node.
#[derive(Parser, Debug)]
#[command(name = "livesync")]
#[command(version, about = "livesync node", long_about = None)]
pub struct Args {
    /// Listener set TTL in seconds.
    #[arg(long, default_value_t = DEFAULT_LISTENER_TTL_SECS)]
    pub listener_ttl: u64,

    /// Evict listeners not seen for this many seconds.
    #[arg(long, default_value_t = DEFAULT_STALE_AFTER_SECS)]
    pub stale_after: u64,

    /// Collection interval in seconds. Set to 0 to disable collection.
    #[arg(long, default_value_t = DEFAULT_COLLECT_INTERVAL_SECS)]
    pub collect_interval: u64,

    /// Lock acquisition timeout in milliseconds.
    #[arg(long, default_value_t = DEFAULT_LOCK_TIMEOUT.as_millis() as u64)]
    pub lock_timeout_ms: u64,

    /// Save event channel capacity.
    #[arg(long, default_value_t = DEFAULT_SAVE_BUFFER)]
    pub save_buffer: usize,

    /// Comma-separated system-managed field names.
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_SYSTEM_FIELDS.iter().map(|s| s.to_string()).collect::<Vec<_>>())]
    pub system_fields: Vec<String>,
}

impl Args {
    /// Convert command-line arguments to node configuration.
    pub fn into_config(self) -> ServerConfig {
        let collect_interval = if self.collect_interval == 0 {
            None
        } else {
            Some(Duration::from_secs(self.collect_interval))
        };

        let registrar = RegistrarConfig::new()
            .with_listener_ttl(Duration::from_secs(self.listener_ttl))
            .with_stale_after(Duration::from_secs(self.stale_after))
            .with_system_fields(self.system_fields);

        ServerConfig {
            registrar,
            collect_interval,
            save_buffer: self.save_buffer.max(1),
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
        }
    }
}

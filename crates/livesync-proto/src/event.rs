//! Event names and entity addressing.
//!
//! Every event that crosses the messaging transport is named after the
//! operation and the entity type it concerns:
//!
//! | Event | Direction |
//! |---|---|
//! | `model.listen.<type>` | client to server call |
//! | `model.deafen.<type>` | client to server call |
//! | `model.refresh.<type>` | client to server call |
//! | `model.update.<type>.<id>` | server to one session |
//!
//! Entity type names are lowercased before they are used in an event name or
//! a store key, so `User` and `user` address the same listeners.

use std::fmt;

/// Endpoint name for subscribe calls.
pub const LISTEN: &str = "model.listen";

/// Endpoint name for unsubscribe calls.
pub const DEAFEN: &str = "model.deafen";

/// Endpoint name for snapshot requests.
pub const REFRESH: &str = "model.refresh";

/// Prefix of server-pushed update events.
pub const UPDATE: &str = "model.update";

/// Name of the process-local save notification.
pub const SAVE: &str = "model.save";

/// Transport-local event fired whenever the client (re)establishes its connection.
pub const CONNECT: &str = "connect";

/// Prefix of coordination store keys holding listener sets.
pub const LISTEN_KEY_PREFIX: &str = "listen.";

/// Normalize an entity type name for addressing.
pub fn normalize_type(entity_type: &str) -> String {
    entity_type.to_lowercase()
}

/// Name of the subscribe call for an entity type.
pub fn listen(entity_type: &str) -> String {
    format!("{}.{}", LISTEN, normalize_type(entity_type))
}

/// Name of the unsubscribe call for an entity type.
pub fn deafen(entity_type: &str) -> String {
    format!("{}.{}", DEAFEN, normalize_type(entity_type))
}

/// Name of the refresh call for an entity type.
pub fn refresh(entity_type: &str) -> String {
    format!("{}.{}", REFRESH, normalize_type(entity_type))
}

/// Split an event name into the endpoint it targets and the entity type suffix.
///
/// `model.listen.user` splits into `("model.listen", "user")` when
/// `model.listen` is passed as the endpoint.
pub fn strip_endpoint<'a>(event: &'a str, endpoint: &str) -> Option<&'a str> {
    event
        .strip_prefix(endpoint)
        .and_then(|rest| rest.strip_prefix('.'))
        .filter(|suffix| !suffix.is_empty())
}

/// Identity of one observed entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    entity_type: String,
    entity_id: String,
}

impl EntityKey {
    /// Create a key, normalizing the entity type.
    pub fn new(entity_type: &str, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: normalize_type(entity_type),
            entity_id: entity_id.into(),
        }
    }

    /// Parse a coordination store key of the form `listen.<type>.<id>`.
    ///
    /// The entity id may itself contain dots; only the first separator after
    /// the prefix splits type from id.
    pub fn from_store_key(key: &str) -> Option<Self> {
        let rest = key.strip_prefix(LISTEN_KEY_PREFIX)?;
        let (entity_type, entity_id) = rest.split_once('.')?;
        if entity_type.is_empty() || entity_id.is_empty() {
            return None;
        }
        Some(Self::new(entity_type, entity_id))
    }

    /// The normalized entity type.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// The entity id.
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Coordination store key of this entity's listener set.
    pub fn store_key(&self) -> String {
        format!("{}{}.{}", LISTEN_KEY_PREFIX, self.entity_type, self.entity_id)
    }

    /// Event name under which updates for this entity are pushed.
    pub fn update_event(&self) -> String {
        format!("{}.{}.{}", UPDATE, self.entity_type, self.entity_id)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.entity_type, self.entity_id)
    }
}

//! Save events and update envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::EntityKey;
use crate::FieldMap;

/// Process-local notification that an entity was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveEvent {
    /// Entity type that was written.
    pub entity_type: String,
    /// Id of the written entity.
    pub entity_id: String,
    /// Names of the fields the write changed.
    pub updated_fields: Vec<String>,
}

impl SaveEvent {
    /// Create a new save event.
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        updated_fields: Vec<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            updated_fields,
        }
    }

    /// Address of the saved entity.
    pub fn key(&self) -> EntityKey {
        EntityKey::new(&self.entity_type, self.entity_id.clone())
    }

    /// Updated field names with the given system-managed fields removed.
    pub fn user_fields<S: AsRef<str>>(&self, system_fields: &[S]) -> Vec<String> {
        self.updated_fields
            .iter()
            .filter(|field| !system_fields.iter().any(|s| s.as_ref() == field.as_str()))
            .cloned()
            .collect()
    }
}

/// Message pushed to a session when an observed entity is saved.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateEnvelope {
    /// The full sanitized snapshot.
    Full(FieldMap),
    /// Only the fields that changed.
    Atomic(FieldMap),
}

impl UpdateEnvelope {
    /// Pick the envelope a listener should receive.
    pub fn for_listener(atomic: bool, diff: &FieldMap, snapshot: &FieldMap) -> Self {
        if atomic {
            Self::Atomic(diff.clone())
        } else {
            Self::Full(snapshot.clone())
        }
    }

    /// Check whether this is a partial update.
    pub fn is_atomic(&self) -> bool {
        matches!(self, Self::Atomic(_))
    }

    /// The carried fields.
    pub fn fields(&self) -> &FieldMap {
        match self {
            Self::Full(fields) | Self::Atomic(fields) => fields,
        }
    }

    /// Convert into the JSON payload sent on the wire.
    pub fn into_payload(self) -> Value {
        match self {
            Self::Full(fields) | Self::Atomic(fields) => Value::Object(fields),
        }
    }
}

/// Restrict a sanitized snapshot to the changed fields.
///
/// Changed names that the sanitizer does not expose are dropped.
pub fn atomic_diff(sanitized: &FieldMap, changed: &[String]) -> FieldMap {
    sanitized
        .iter()
        .filter(|(key, _)| changed.iter().any(|field| field == *key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

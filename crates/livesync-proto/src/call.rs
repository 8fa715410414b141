//! Argument decoding for client-to-server calls.
//!
//! Calls carry a positional JSON argument list. Entity ids may arrive as
//! strings or numbers; both are normalized to strings.

use serde_json::Value;

use crate::error::Error;

/// Error codes carried by failed call responses.
pub mod error_codes {
    /// The addressed entity or endpoint does not exist.
    pub const NOT_FOUND: u32 = 1;
    /// The call arguments could not be decoded.
    pub const INVALID_REQUEST: u32 = 2;
    /// The coordination store is unavailable or a lock could not be acquired.
    pub const UNAVAILABLE: u32 = 3;
    /// Any other server-side failure.
    pub const INTERNAL: u32 = 100;
}

fn id_arg(args: &[Value], index: usize, name: &str) -> Result<String, Error> {
    match args.get(index) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(Error::InvalidMessage(format!(
            "argument {} ({}) must be a non-empty string or number, got {}",
            index, name, other
        ))),
        None => Err(Error::InvalidMessage(format!(
            "missing argument {} ({})",
            index, name
        ))),
    }
}

/// Arguments of `model.listen.<type>`: `[entity_id, subscription_id, atomic?]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenArgs {
    pub entity_id: String,
    pub subscription_id: String,
    pub atomic: bool,
}

impl ListenArgs {
    /// Create listen arguments.
    pub fn new(entity_id: impl Into<String>, subscription_id: impl Into<String>, atomic: bool) -> Self {
        Self {
            entity_id: entity_id.into(),
            subscription_id: subscription_id.into(),
            atomic,
        }
    }

    /// Decode from a positional argument list. A missing or null `atomic` means `false`.
    pub fn from_args(args: &[Value]) -> Result<Self, Error> {
        let atomic = match args.get(2) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                return Err(Error::InvalidMessage(format!(
                    "argument 2 (atomic) must be a boolean, got {}",
                    other
                )))
            }
        };

        Ok(Self {
            entity_id: id_arg(args, 0, "entity_id")?,
            subscription_id: id_arg(args, 1, "subscription_id")?,
            atomic,
        })
    }

    /// Encode as a positional argument list.
    pub fn to_args(&self) -> Vec<Value> {
        vec![
            Value::String(self.entity_id.clone()),
            Value::String(self.subscription_id.clone()),
            Value::Bool(self.atomic),
        ]
    }
}

/// Arguments of `model.deafen.<type>`: `[entity_id, subscription_id]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeafenArgs {
    pub entity_id: String,
    pub subscription_id: String,
}

impl DeafenArgs {
    /// Create deafen arguments.
    pub fn new(entity_id: impl Into<String>, subscription_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            subscription_id: subscription_id.into(),
        }
    }

    /// Decode from a positional argument list.
    pub fn from_args(args: &[Value]) -> Result<Self, Error> {
        Ok(Self {
            entity_id: id_arg(args, 0, "entity_id")?,
            subscription_id: id_arg(args, 1, "subscription_id")?,
        })
    }

    /// Encode as a positional argument list.
    pub fn to_args(&self) -> Vec<Value> {
        vec![
            Value::String(self.entity_id.clone()),
            Value::String(self.subscription_id.clone()),
        ]
    }
}

/// Arguments of `model.refresh.<type>`: `[entity_id]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshArgs {
    pub entity_id: String,
}

impl RefreshArgs {
    /// Create refresh arguments.
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
        }
    }

    /// Decode from a positional argument list.
    pub fn from_args(args: &[Value]) -> Result<Self, Error> {
        Ok(Self {
            entity_id: id_arg(args, 0, "entity_id")?,
        })
    }

    /// Encode as a positional argument list.
    pub fn to_args(&self) -> Vec<Value> {
        vec![Value::String(self.entity_id.clone())]
    }
}

//! Entity lookup by type name.
//!
//! The registrar never knows concrete entity types. It resolves an
//! [`EntitySource`] from the [`EntityRegistry`] by type name and asks it to
//! load and sanitize one entity.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use livesync_proto::event::normalize_type;
use livesync_proto::FieldMap;

use crate::error::EntityError;

/// Load and sanitize capability for one entity type.
#[async_trait]
pub trait EntitySource: Send + Sync {
    /// Load the current stored representation of an entity.
    async fn load(&self, entity_id: &str) -> Result<FieldMap, EntityError>;

    /// Produce the externally safe field mapping of a loaded entity.
    async fn sanitize(&self, entity: &FieldMap) -> Result<FieldMap, EntityError>;
}

/// Maps entity type names to their sources. Populated at startup.
#[derive(Clone, Default)]
pub struct EntityRegistry {
    sources: HashMap<String, Arc<dyn EntitySource>>,
}

impl EntityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source for an entity type.
    pub fn register(&mut self, entity_type: &str, source: Arc<dyn EntitySource>) {
        self.sources.insert(normalize_type(entity_type), source);
    }

    /// Add a source for an entity type (builder pattern).
    pub fn with_source(mut self, entity_type: &str, source: Arc<dyn EntitySource>) -> Self {
        self.register(entity_type, source);
        self
    }

    /// Resolve the source for an entity type.
    pub fn source(&self, entity_type: &str) -> Result<Arc<dyn EntitySource>, EntityError> {
        self.sources
            .get(&normalize_type(entity_type))
            .cloned()
            .ok_or_else(|| EntityError::UnknownType(entity_type.to_string()))
    }

    /// Check whether a type is registered.
    pub fn contains(&self, entity_type: &str) -> bool {
        self.sources.contains_key(&normalize_type(entity_type))
    }

    /// Registered type names, sorted.
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.sources.keys().cloned().collect();
        types.sort();
        types
    }

    /// Load and sanitize one entity.
    pub async fn snapshot(&self, entity_type: &str, entity_id: &str) -> Result<FieldMap, EntityError> {
        let source = self.source(entity_type)?;
        let entity = source.load(entity_id).await?;
        source.sanitize(&entity).await
    }
}

impl std::fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("types", &self.types())
            .finish()
    }
}

/// Entity source backed by process memory.
///
/// Sanitizing removes the configured hidden fields.
#[derive(Debug, Default)]
pub struct MemoryEntitySource {
    entity_type: String,
    records: DashMap<String, FieldMap>,
    hidden_fields: Vec<String>,
}

impl MemoryEntitySource {
    /// Create an empty source for an entity type.
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            records: DashMap::new(),
            hidden_fields: Vec::new(),
        }
    }

    /// Fields that sanitizing strips.
    pub fn with_hidden_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hidden_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Store an entity, replacing any previous version.
    pub fn insert(&self, entity_id: impl Into<String>, fields: FieldMap) {
        self.records.insert(entity_id.into(), fields);
    }

    /// Merge fields into a stored entity and return the names whose values changed.
    ///
    /// The entity is created if it does not exist.
    pub fn update(&self, entity_id: &str, fields: FieldMap) -> Vec<String> {
        let mut record = self.records.entry(entity_id.to_string()).or_default();
        let mut changed = Vec::new();
        for (key, value) in fields {
            if record.get(&key) != Some(&value) {
                record.insert(key.clone(), value);
                changed.push(key);
            }
        }
        changed
    }

    /// Remove an entity.
    pub fn remove(&self, entity_id: &str) -> Option<FieldMap> {
        self.records.remove(entity_id).map(|(_, fields)| fields)
    }

    /// Read a single stored field.
    pub fn field(&self, entity_id: &str, field: &str) -> Option<Value> {
        self.records
            .get(entity_id)
            .and_then(|record| record.get(field).cloned())
    }
}

#[async_trait]
impl EntitySource for MemoryEntitySource {
    async fn load(&self, entity_id: &str) -> Result<FieldMap, EntityError> {
        self.records
            .get(entity_id)
            .map(|record| record.clone())
            .ok_or_else(|| EntityError::NotFound {
                entity_type: self.entity_type.clone(),
                entity_id: entity_id.to_string(),
            })
    }

    async fn sanitize(&self, entity: &FieldMap) -> Result<FieldMap, EntityError> {
        Ok(entity
            .iter()
            .filter(|(key, _)| !self.hidden_fields.iter().any(|hidden| hidden == *key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

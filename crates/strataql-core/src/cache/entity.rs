//! Data entities: normalised objects keyed by `Type:id`.
//!
//! An entity is any response object whose type carries the configured
//! resource key. Its fields are stored by argument-qualified name so
//! differently-aliased reads share values while differently-argumented
//! reads do not. References to other entities are stored as key strings,
//! never inline copies: cyclic data stays representable and exports stay
//! finite.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Result, StrataQLError};

/// Identity of one entity: type name plus resource-key value.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EntityKey {
    /// Entity type (e.g. "User").
    pub type_name: String,
    /// Resource-key value (e.g. "1").
    pub id: String,
}

impl EntityKey {
    /// Create a key, rejecting empty components.
    ///
    /// # Errors
    ///
    /// Returns [`StrataQLError::Validation`] when either component is empty.
    pub fn new(type_name: &str, id: &str) -> Result<Self> {
        if type_name.is_empty() {
            return Err(StrataQLError::Validation {
                message: "entity type name cannot be empty".to_string(),
                path:    None,
            });
        }
        if id.is_empty() {
            return Err(StrataQLError::Validation {
                message: "entity id cannot be empty".to_string(),
                path:    None,
            });
        }
        Ok(Self {
            type_name: type_name.to_string(),
            id:        id.to_string(),
        })
    }

    /// Serialise as the store key: `"Type:id"`.
    #[must_use]
    pub fn to_store_key(&self) -> String {
        format!("{}:{}", self.type_name, self.id)
    }

    /// Parse a store key.
    ///
    /// # Errors
    ///
    /// Returns [`StrataQLError::Validation`] on anything but `"Type:id"`.
    pub fn from_store_key(key: &str) -> Result<Self> {
        match key.split_once(':') {
            Some((type_name, id)) => Self::new(type_name, id),
            None => Err(StrataQLError::Validation {
                message: format!("invalid entity key '{key}', expected 'Type:id'"),
                path:    None,
            }),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_store_key())
    }
}

/// One stored field value inside an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityFieldValue {
    /// Scalar stored by value.
    Scalar(JsonValue),
    /// Reference to another entity by store key.
    Ref(String),
    /// List of values; entity elements appear as refs.
    List(Vec<EntityFieldValue>),
    /// Non-entity object, fields keyed by argument-qualified name.
    Object(IndexMap<String, EntityFieldValue>),
}

/// A normalised entity record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataEntity {
    /// Entity type name.
    pub type_name: String,
    /// Resource-key value.
    pub id: String,
    /// Fields by argument-qualified name.
    pub fields: IndexMap<String, EntityFieldValue>,
}

impl DataEntity {
    /// Fresh entity with no fields.
    #[must_use]
    pub fn new(key: &EntityKey) -> Self {
        Self {
            type_name: key.type_name.clone(),
            id:        key.id.clone(),
            fields:    IndexMap::new(),
        }
    }

    /// The entity's store key.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.type_name, self.id)
    }

    /// Read a field by argument-qualified name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&EntityFieldValue> {
        self.fields.get(name)
    }

    /// Write a field. Scalars replace; lists replace wholesale: list
    /// contents are never element-merged.
    pub fn set_field(&mut self, name: impl Into<String>, value: EntityFieldValue) {
        self.fields.insert(name.into(), value);
    }

    /// Merge another record for the same entity: last write wins per field.
    pub fn merge(&mut self, incoming: Self) {
        for (name, value) in incoming.fields {
            self.fields.insert(name, value);
        }
    }
}

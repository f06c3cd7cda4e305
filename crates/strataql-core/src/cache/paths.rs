//! Query-path records: what was observed at a specific rooted path.
//!
//! The query-path tier is the index that lets the analyser answer "did we
//! previously see a value at this exact query path?" without scanning
//! entities. Records are keyed by path hash and carry just enough shape to
//! drive the walk: scalar values, entity references, known list lengths,
//! and plain-object markers whose children have their own records.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Value recorded at one query path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum QueryPathValue {
    /// Scalar observed at a leaf (includes whole scalar lists).
    Scalar(JsonValue),
    /// Entity reference; children resolve through the entity tier.
    Entity(String),
    /// Known list length; elements live at `path.0 ... path.n-1`.
    List(usize),
    /// Non-entity object; children have their own path records.
    Object,
}

impl QueryPathValue {
    /// Serialise for the tier store.
    ///
    /// # Errors
    ///
    /// Returns a serialisation error wrapped by the caller into a store
    /// error; in practice these variants always serialise.
    pub fn to_store_value(&self) -> serde_json::Result<JsonValue> {
        serde_json::to_value(self)
    }

    /// Deserialise from the tier store.
    #[must_use]
    pub fn from_store_value(value: &JsonValue) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_store_round_trip() {
        let values = [
            QueryPathValue::Scalar(json!("Ada")),
            QueryPathValue::Entity("User:1".to_string()),
            QueryPathValue::List(3),
            QueryPathValue::Object,
        ];
        for value in values {
            let stored = value.to_store_value().expect("serialises");
            assert_eq!(QueryPathValue::from_store_value(&stored), Some(value));
        }
    }

    #[test]
    fn test_snapshot_format_is_tagged() {
        let stored = QueryPathValue::Entity("User:1".to_string())
            .to_store_value()
            .expect("serialises");
        assert_eq!(stored["kind"], json!("entity"));
        assert_eq!(stored["value"], json!("User:1"));
    }

    #[test]
    fn test_malformed_store_values_read_as_none() {
        assert_eq!(QueryPathValue::from_store_value(&json!({"kind": "nonsense"})), None);
        assert_eq!(QueryPathValue::from_store_value(&json!(42)), None);
    }
}

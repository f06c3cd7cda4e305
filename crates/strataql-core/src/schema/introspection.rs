//! Schema index construction from an introspection result.
//!
//! Accepts the JSON produced by the standard introspection query, either as
//! the bare `{"__schema": ...}` object or wrapped in a `{"data": ...}` response
//! envelope. Only the parts the pipeline consults are read: root operation
//! type names and, per type, its kind and field types.

use std::collections::HashMap;

use serde_json::Value;

use super::{SchemaField, SchemaIndex, SchemaType, TypeKind};
use crate::error::{Result, StrataQLError};

pub(super) fn build(value: &Value, resource_key: &str) -> Result<SchemaIndex> {
    let schema = value
        .get("data")
        .unwrap_or(value)
        .get("__schema")
        .ok_or_else(|| StrataQLError::Config {
            message: "introspection result is missing __schema".to_string(),
        })?;

    let query_type = root_name(schema, "queryType").ok_or_else(|| StrataQLError::Config {
        message: "introspection result defines no query root".to_string(),
    })?;
    let mutation_type = root_name(schema, "mutationType");
    let subscription_type = root_name(schema, "subscriptionType");

    let mut types = HashMap::new();
    let listed = schema
        .get("types")
        .and_then(Value::as_array)
        .ok_or_else(|| StrataQLError::Config {
            message: "introspection result has no type list".to_string(),
        })?;

    for entry in listed {
        let Some(name) = entry.get("name").and_then(Value::as_str) else {
            continue;
        };
        if name.starts_with("__") {
            continue;
        }
        let kind = match entry.get("kind").and_then(Value::as_str) {
            Some("OBJECT") => TypeKind::Object,
            Some("INTERFACE") => TypeKind::Interface,
            Some("UNION") => TypeKind::Union,
            Some("ENUM") => TypeKind::Enum,
            Some("INPUT_OBJECT") => TypeKind::InputObject,
            Some("SCALAR") => TypeKind::Scalar,
            _ => continue,
        };

        let field_source = match kind {
            TypeKind::InputObject => entry.get("inputFields"),
            _ => entry.get("fields"),
        };

        let mut fields = HashMap::new();
        if let Some(list) = field_source.and_then(Value::as_array) {
            for field in list {
                let Some(field_name) = field.get("name").and_then(Value::as_str) else {
                    continue;
                };
                if let Some((type_name, is_list)) = unwrap_type_ref(field.get("type")) {
                    fields.insert(
                        field_name.to_string(),
                        SchemaField {
                            type_name,
                            is_list,
                        },
                    );
                }
            }
        }

        types.insert(
            name.to_string(),
            SchemaType {
                kind,
                fields,
            },
        );
    }

    SchemaIndex::from_parts(
        types,
        query_type,
        mutation_type,
        subscription_type,
        resource_key.to_string(),
    )
}

fn root_name(schema: &Value, key: &str) -> Option<String> {
    schema
        .get(key)
        .and_then(|v| v.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Walk a `NON_NULL`/`LIST` `ofType` chain down to the named type.
fn unwrap_type_ref(type_ref: Option<&Value>) -> Option<(String, bool)> {
    let mut current = type_ref?;
    let mut is_list = false;
    loop {
        match current.get("kind").and_then(Value::as_str) {
            Some("NON_NULL") => current = current.get("ofType")?,
            Some("LIST") => {
                is_list = true;
                current = current.get("ofType")?;
            }
            _ => {
                let name = current.get("name").and_then(Value::as_str)?;
                return Some((name.to_string(), is_list));
            }
        }
    }
}

//! Conversions between GraphQL argument values and JSON.
//!
//! Arguments are serialised canonically (object keys sorted, no whitespace)
//! so that `user(id: "1")` produces the same path segment no matter how the
//! caller spelled the document. Variable inlining goes the other way: JSON
//! values from the caller become literal argument values, with enum-typed
//! strings restored to enum literals so rewritten queries stay valid.

use std::collections::BTreeMap;

use graphql_parser::query::{Number, Value as GqlValue};
use serde_json::Value as JsonValue;

use crate::error::{Result, StrataQLError};
use crate::schema::SchemaIndex;

/// Convert a GraphQL value to JSON.
///
/// # Errors
///
/// Returns [`StrataQLError::Validation`] when a variable reference is still
/// present: the normaliser must have inlined every variable first.
pub fn to_json(value: &GqlValue<'_, String>) -> Result<JsonValue> {
    match value {
        GqlValue::Variable(name) => Err(StrataQLError::Validation {
            message: format!("variable '${name}' was not inlined"),
            path:    None,
        }),
        GqlValue::Int(number) => Ok(JsonValue::from(number.as_i64().unwrap_or_default())),
        GqlValue::Float(f) => Ok(serde_json::json!(f)),
        GqlValue::String(s) => Ok(JsonValue::String(s.clone())),
        GqlValue::Boolean(b) => Ok(JsonValue::Bool(*b)),
        GqlValue::Null => Ok(JsonValue::Null),
        GqlValue::Enum(name) => Ok(JsonValue::String(name.clone())),
        GqlValue::List(items) => Ok(JsonValue::Array(
            items.iter().map(to_json).collect::<Result<Vec<_>>>()?,
        )),
        GqlValue::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, item) in map {
                out.insert(key.clone(), to_json(item)?);
            }
            Ok(JsonValue::Object(out))
        }
    }
}

/// Convert a JSON value to a literal GraphQL value.
///
/// Integers outside the `i32` range degrade to float literals: the GraphQL
/// `Int` type does not cover them anyway.
#[must_use]
pub fn from_json(value: &JsonValue) -> GqlValue<'static, String> {
    match value {
        JsonValue::Null => GqlValue::Null,
        JsonValue::Bool(b) => GqlValue::Boolean(*b),
        JsonValue::Number(n) => {
            if let Some(int) = n.as_i64().and_then(|i| i32::try_from(i).ok()) {
                GqlValue::Int(Number::from(int))
            } else {
                GqlValue::Float(n.as_f64().unwrap_or_default())
            }
        }
        JsonValue::String(s) => GqlValue::String(s.clone()),
        JsonValue::Array(items) => GqlValue::List(items.iter().map(from_json).collect()),
        JsonValue::Object(map) => {
            let converted: BTreeMap<String, GqlValue<'static, String>> = map
                .iter()
                .map(|(key, item)| (key.clone(), from_json(item)))
                .collect();
            GqlValue::Object(converted)
        }
    }
}

/// Convert a JSON value to a literal GraphQL value, guided by the declared
/// type so enum-typed strings become enum literals instead of string
/// literals. Input object fields recurse through the schema index; lists
/// recurse elementwise with the same named type.
#[must_use]
pub fn from_json_typed(
    value: &JsonValue,
    type_name: &str,
    schema: &SchemaIndex,
) -> GqlValue<'static, String> {
    match value {
        JsonValue::String(s) if schema.is_enum(type_name) => GqlValue::Enum(s.clone()),
        JsonValue::Array(items) => GqlValue::List(
            items
                .iter()
                .map(|item| from_json_typed(item, type_name, schema))
                .collect(),
        ),
        JsonValue::Object(map) => {
            let converted: BTreeMap<String, GqlValue<'static, String>> = map
                .iter()
                .map(|(key, item)| {
                    let converted = match schema.field(type_name, key) {
                        Some(field) => from_json_typed(item, &field.type_name, schema),
                        None => from_json(item),
                    };
                    (key.clone(), converted)
                })
                .collect();
            GqlValue::Object(converted)
        }
        _ => from_json(value),
    }
}

/// Canonically serialise a field's arguments: a compact JSON object with
/// sorted keys, e.g. `{"first":10,"id":"1"}`.
///
/// # Errors
///
/// Returns [`StrataQLError::Validation`] when an argument still references a
/// variable.
pub fn serialize_arguments(arguments: &[(String, GqlValue<'_, String>)]) -> Result<String> {
    let mut sorted: BTreeMap<&str, JsonValue> = BTreeMap::new();
    for (name, value) in arguments {
        sorted.insert(name.as_str(), to_json(value)?);
    }
    serde_json::to_string(&sorted).map_err(|e| StrataQLError::Internal {
        message: format!("argument serialisation failed: {e}"),
    })
}

/// The argument-qualified name of a field: `name` when it has no arguments,
/// `name({...})` otherwise. This is the `query_key` path segment.
///
/// # Errors
///
/// Returns [`StrataQLError::Validation`] when an argument still references a
/// variable.
pub fn argument_qualified_name(
    name: &str,
    arguments: &[(String, GqlValue<'_, String>)],
) -> Result<String> {
    if arguments.is_empty() {
        Ok(name.to_string())
    } else {
        Ok(format!("{name}({})", serialize_arguments(arguments)?))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_to_json_scalars() {
        assert_eq!(
            to_json(&GqlValue::String("x".to_string())).expect("scalar"),
            json!("x")
        );
        assert_eq!(to_json(&GqlValue::Boolean(true)).expect("scalar"), json!(true));
        assert_eq!(to_json(&GqlValue::Null).expect("scalar"), JsonValue::Null);
        assert_eq!(
            to_json(&GqlValue::Int(Number::from(42))).expect("scalar"),
            json!(42)
        );
    }

    #[test]
    fn test_to_json_rejects_uninlined_variables() {
        let result = to_json(&GqlValue::Variable("id".to_string()));
        assert!(matches!(result, Err(StrataQLError::Validation { .. })));
    }

    #[test]
    fn test_from_json_round_trip() {
        let source = json!({"id": "1", "limit": 10, "flags": [true, false]});
        let converted = from_json(&source);
        assert_eq!(to_json(&converted).expect("no variables"), source);
    }

    #[test]
    fn test_large_integers_degrade_to_floats() {
        let converted = from_json(&json!(9_000_000_000_i64));
        assert!(matches!(converted, GqlValue::Float(_)));
    }

    #[test]
    fn test_serialize_arguments_sorts_keys() {
        let args = vec![
            ("limit".to_string(), GqlValue::Int(Number::from(10))),
            ("id".to_string(), GqlValue::String("1".to_string())),
        ];
        assert_eq!(
            serialize_arguments(&args).expect("literal args"),
            r#"{"id":"1","limit":10}"#
        );
    }

    #[test]
    fn test_argument_qualified_name() {
        assert_eq!(argument_qualified_name("name", &[]).expect("no args"), "name");

        let args = vec![("id".to_string(), GqlValue::String("1".to_string()))];
        assert_eq!(
            argument_qualified_name("user", &args).expect("literal args"),
            r#"user({"id":"1"})"#
        );
    }

    #[test]
    fn test_enum_restoration_via_schema() {
        let sdl = r"
            type Query { users(role: Role): [User] }
            type User { id: ID! }
            enum Role { ADMIN MEMBER }
        ";
        let schema = SchemaIndex::from_sdl(sdl, "id").expect("valid SDL");
        let converted = from_json_typed(&json!("ADMIN"), "Role", &schema);
        assert!(matches!(converted, GqlValue::Enum(ref name) if name == "ADMIN"));

        // Non-enum strings stay strings.
        let converted = from_json_typed(&json!("ADMIN"), "String", &schema);
        assert!(matches!(converted, GqlValue::String(_)));
    }
}

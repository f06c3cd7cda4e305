//! Schema-guided annotation of a normalised operation.
//!
//! One walk does three jobs the pipeline needs before a document may touch
//! the cache:
//!
//! - **resource-key insertion**: every selection set whose parent type
//!   carries the configured resource key gets that field added when the
//!   caller omitted it, so the resolver can always normalise entities;
//! - **field type recording**: every field's resolved type lands in the
//!   request's field type map, keyed by hash key: the resolver later uses
//!   this to apply per-type cache directives and entity identity;
//! - **validation**: unknown types/fields, scalar fields with selections and
//!   composite fields without them are rejected before any fetch.

use graphql_parser::query::{Field, Selection, SelectionSet};

use crate::ast::AstSelectionSet;
use crate::error::{Result, StrataQLError};
use crate::fingerprint::hash_path;
use crate::request::{FieldType, FieldTypeMap};
use crate::schema::SchemaIndex;

/// Meta field available on every composite type.
const TYPENAME_FIELD: &str = "__typename";

pub(crate) fn annotate(
    set: &mut AstSelectionSet,
    parent_type: &str,
    schema: &SchemaIndex,
    field_type_map: &mut FieldTypeMap,
    name_path: &mut Vec<String>,
) -> Result<()> {
    insert_resource_key(set, parent_type, schema);

    for selection in &mut set.items {
        match selection {
            Selection::Field(field) => {
                annotate_field(field, parent_type, schema, field_type_map, name_path)?;
            }
            Selection::InlineFragment(_) | Selection::FragmentSpread(_) => {
                return Err(StrataQLError::Internal {
                    message: format!(
                        "unresolved fragment in normalised document at '{}'",
                        name_path.join(".")
                    ),
                });
            }
        }
    }
    Ok(())
}

fn annotate_field(
    field: &mut Field<'static, String>,
    parent_type: &str,
    schema: &SchemaIndex,
    field_type_map: &mut FieldTypeMap,
    name_path: &mut Vec<String>,
) -> Result<()> {
    let hash_key = hash_path(&format!("{}.{}", name_path.join("."), field.name));

    if field.name == TYPENAME_FIELD {
        if !field.selection_set.items.is_empty() {
            return Err(StrataQLError::Validation {
                message: "__typename cannot have a selection set".to_string(),
                path:    Some(field_path(name_path, &field.name)),
            });
        }
        field_type_map.insert(
            hash_key,
            FieldType {
                type_name:        "String".to_string(),
                is_list:          false,
                has_resource_key: false,
            },
        );
        return Ok(());
    }

    let Some(schema_field) = schema.field(parent_type, &field.name) else {
        return Err(StrataQLError::UnknownField {
            field:     field.name.clone(),
            type_name: parent_type.to_string(),
        });
    };
    let type_name = schema_field.type_name.clone();
    let is_list = schema_field.is_list;

    field_type_map.insert(
        hash_key,
        FieldType {
            type_name: type_name.clone(),
            is_list,
            has_resource_key: schema.has_resource_key(&type_name),
        },
    );

    if schema.is_composite(&type_name) {
        if field.selection_set.items.is_empty() {
            return Err(StrataQLError::Validation {
                message: format!("field of composite type '{type_name}' requires a selection set"),
                path:    Some(field_path(name_path, &field.name)),
            });
        }
        name_path.push(field.name.clone());
        annotate(&mut field.selection_set, &type_name, schema, field_type_map, name_path)?;
        name_path.pop();
    } else if !field.selection_set.items.is_empty() {
        return Err(StrataQLError::Validation {
            message: format!("field of scalar type '{type_name}' cannot have a selection set"),
            path:    Some(field_path(name_path, &field.name)),
        });
    }

    Ok(())
}

/// Add the resource key to a selection set whose parent type carries it,
/// unless the caller already requested it.
fn insert_resource_key(set: &mut AstSelectionSet, parent_type: &str, schema: &SchemaIndex) {
    if !schema.has_resource_key(parent_type) {
        return;
    }
    let resource_key = schema.resource_key();
    let already_requested = set.items.iter().any(|selection| {
        matches!(selection, Selection::Field(field) if field.name == resource_key)
    });
    if already_requested {
        return;
    }
    set.items.insert(
        0,
        Selection::Field(Field {
            position:      set.span.0,
            alias:         None,
            name:          resource_key.to_string(),
            arguments:     Vec::new(),
            directives:    Vec::new(),
            selection_set: SelectionSet {
                span:  set.span,
                items: Vec::new(),
            },
        }),
    );
}

fn field_path(name_path: &[String], field: &str) -> String {
    if name_path.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", name_path.join("."), field)
    }
}

#[cfg(test)]
mod tests {
    use graphql_parser::query::parse_query;
    use serde_json::json;

    use super::*;
    use crate::ast::{
        operation_definitions, operation_kind, AstSelectionSet, OperationKind,
    };
    use crate::request::normalize::normalize_operation;

    fn schema() -> SchemaIndex {
        SchemaIndex::from_sdl(
            r"
            type Query { user(id: ID!): User, posts: [Post] }
            type User { id: ID!, name: String, friends: [User] }
            type Post { title: String, author: User }
            ",
            "id",
        )
        .expect("valid SDL")
    }

    fn annotated(document: &str) -> (AstSelectionSet, FieldTypeMap) {
        let schema = schema();
        let doc = parse_query::<String>(document).expect("valid document");
        let ops = operation_definitions(&doc);
        let kind = operation_kind(ops[0]);
        assert_eq!(kind, OperationKind::Query);
        let normalized = normalize_operation(ops[0], &doc, Some(&json!({})), &schema)
            .expect("normalises");
        let mut set = crate::ast::operation_selection_set(&normalized).clone();
        let mut map = FieldTypeMap::new();
        let mut name_path = vec![kind.as_str().to_string()];
        annotate(&mut set, "Query", &schema, &mut map, &mut name_path).expect("annotates");
        (set, map)
    }

    fn field_names(set: &AstSelectionSet) -> Vec<String> {
        set.items
            .iter()
            .map(|selection| match selection {
                Selection::Field(f) => f.name.clone(),
                _ => panic!("fields only"),
            })
            .collect()
    }

    #[test]
    fn test_resource_key_inserted_when_missing() {
        let (set, _) = annotated("{ user(id: \"1\") { name } }");
        let Selection::Field(user) = &set.items[0] else {
            panic!("expected field");
        };
        assert_eq!(field_names(&user.selection_set), vec!["id", "name"]);
    }

    #[test]
    fn test_resource_key_not_duplicated() {
        let (set, _) = annotated("{ user(id: \"1\") { id name } }");
        let Selection::Field(user) = &set.items[0] else {
            panic!("expected field");
        };
        assert_eq!(field_names(&user.selection_set), vec!["id", "name"]);
    }

    #[test]
    fn test_no_resource_key_on_plain_objects() {
        let (set, _) = annotated("{ posts { title } }");
        let Selection::Field(posts) = &set.items[0] else {
            panic!("expected field");
        };
        assert_eq!(field_names(&posts.selection_set), vec!["title"]);
    }

    #[test]
    fn test_field_types_recorded_by_hash_key() {
        let (_, map) = annotated("{ user(id: \"1\") { name friends { id } } }");
        let user_key = hash_path("query.user");
        let friends_key = hash_path("query.user.friends");

        let user = map.get(&user_key).expect("user type recorded");
        assert_eq!(user.type_name, "User");
        assert!(user.has_resource_key);
        assert!(!user.is_list);

        let friends = map.get(&friends_key).expect("friends type recorded");
        assert!(friends.is_list);
        assert_eq!(friends.type_name, "User");
    }

    #[test]
    fn test_typename_is_always_valid() {
        let (_, map) = annotated("{ user(id: \"1\") { __typename name } }");
        let key = hash_path("query.user.__typename");
        assert_eq!(map.get(&key).expect("recorded").type_name, "String");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let schema = schema();
        let doc = parse_query::<String>("{ user(id: \"1\") { nonexistent } }")
            .expect("valid document");
        let ops = operation_definitions(&doc);
        let normalized =
            normalize_operation(ops[0], &doc, None, &schema).expect("normalises");
        let mut set = crate::ast::operation_selection_set(&normalized).clone();
        let mut map = FieldTypeMap::new();
        let result = annotate(
            &mut set,
            "Query",
            &schema,
            &mut map,
            &mut vec!["query".to_string()],
        );
        assert!(matches!(result, Err(StrataQLError::UnknownField { ref field, .. }) if field == "nonexistent"));
    }

    #[test]
    fn test_composite_without_selection_rejected() {
        let schema = schema();
        let doc = parse_query::<String>("{ user(id: \"1\") }").expect("valid document");
        let ops = operation_definitions(&doc);
        let normalized =
            normalize_operation(ops[0], &doc, None, &schema).expect("normalises");
        let mut set = crate::ast::operation_selection_set(&normalized).clone();
        let mut map = FieldTypeMap::new();
        let result = annotate(
            &mut set,
            "Query",
            &schema,
            &mut map,
            &mut vec!["query".to_string()],
        );
        assert!(matches!(result, Err(StrataQLError::Validation { .. })));
    }

    #[test]
    fn test_scalar_with_selection_rejected() {
        let schema = schema();
        let doc = parse_query::<String>("{ user(id: \"1\") { name { x } } }")
            .expect("valid document");
        let ops = operation_definitions(&doc);
        let normalized =
            normalize_operation(ops[0], &doc, None, &schema).expect("normalises");
        let mut set = crate::ast::operation_selection_set(&normalized).clone();
        let mut map = FieldTypeMap::new();
        let result = annotate(
            &mut set,
            "Query",
            &schema,
            &mut map,
            &mut vec!["query".to_string()],
        );
        assert!(matches!(result, Err(StrataQLError::Validation { .. })));
    }
}

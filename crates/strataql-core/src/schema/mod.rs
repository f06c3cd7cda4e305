//! Schema index consulted by the request parser and resolver.
//!
//! The index is a flattened view of the configured schema: type name →
//! field table, plus the root operation type names. It answers the three
//! questions the pipeline asks: what type does this field resolve to, is
//! that type composite, and does it carry the configured resource key -
//! without holding on to the full SDL AST.
//!
//! Built either from an SDL string (`from_sdl`) or from an
//! introspection-result JSON ([`from_introspection`](SchemaIndex::from_introspection)).

mod introspection;

use std::collections::HashMap;

use graphql_parser::schema::{parse_schema, Definition, Type, TypeDefinition};

use crate::ast::OperationKind;
use crate::error::{Result, StrataQLError};

/// Classification of a named schema type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// Object type with fields.
    Object,
    /// Interface type with fields.
    Interface,
    /// Union type.
    Union,
    /// Enum type.
    Enum,
    /// Scalar type (built-in or custom).
    Scalar,
    /// Input object type; field table holds input value types.
    InputObject,
}

/// One field of an object-like or input type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    /// Named type the field resolves to, wrappers unwrapped.
    pub type_name: String,
    /// Whether any list wrapper was present.
    pub is_list: bool,
}

/// One named type in the index.
#[derive(Debug, Clone)]
pub struct SchemaType {
    /// Classification.
    pub kind: TypeKind,
    /// Field table. Empty for scalars, enums and unions.
    pub fields: HashMap<String, SchemaField>,
}

/// Flattened schema lookup table.
#[derive(Debug, Clone)]
pub struct SchemaIndex {
    types: HashMap<String, SchemaType>,
    query_type: String,
    mutation_type: Option<String>,
    subscription_type: Option<String>,
    resource_key: String,
}

const BUILTIN_SCALARS: [&str; 5] = ["Int", "Float", "String", "Boolean", "ID"];

impl SchemaIndex {
    /// Build the index from an SDL string.
    ///
    /// # Errors
    ///
    /// Returns [`StrataQLError::Parse`] when the SDL does not parse.
    pub fn from_sdl(sdl: &str, resource_key: &str) -> Result<Self> {
        let document = parse_schema::<String>(sdl).map_err(|e| StrataQLError::Parse {
            message: format!("schema parse failed: {e}"),
        })?;

        let mut types = HashMap::new();
        let mut query_type = "Query".to_string();
        let mut mutation_type = None;
        let mut subscription_type = None;

        for definition in &document.definitions {
            match definition {
                Definition::SchemaDefinition(schema_def) => {
                    if let Some(name) = &schema_def.query {
                        query_type = name.clone();
                    }
                    mutation_type = schema_def.mutation.clone();
                    subscription_type = schema_def.subscription.clone();
                }
                Definition::TypeDefinition(type_def) => {
                    let (name, entry) = index_type_definition(type_def);
                    types.insert(name, entry);
                }
                Definition::TypeExtension(_) | Definition::DirectiveDefinition(_) => {}
            }
        }

        for scalar in BUILTIN_SCALARS {
            types.entry(scalar.to_string()).or_insert_with(|| SchemaType {
                kind:   TypeKind::Scalar,
                fields: HashMap::new(),
            });
        }

        if mutation_type.is_none() && types.contains_key("Mutation") {
            mutation_type = Some("Mutation".to_string());
        }
        if subscription_type.is_none() && types.contains_key("Subscription") {
            subscription_type = Some("Subscription".to_string());
        }

        let index = Self {
            types,
            query_type,
            mutation_type,
            subscription_type,
            resource_key: resource_key.to_string(),
        };
        index.check_roots()?;
        Ok(index)
    }

    /// Build the index from an introspection-result JSON value.
    ///
    /// Accepts either the bare `{"__schema": ...}` object or a full response
    /// envelope `{"data": {"__schema": ...}}`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataQLError::Config`] when the JSON is not an
    /// introspection result.
    pub fn from_introspection(value: &serde_json::Value, resource_key: &str) -> Result<Self> {
        introspection::build(value, resource_key)
    }

    pub(crate) fn from_parts(
        types: HashMap<String, SchemaType>,
        query_type: String,
        mutation_type: Option<String>,
        subscription_type: Option<String>,
        resource_key: String,
    ) -> Result<Self> {
        let index = Self {
            types,
            query_type,
            mutation_type,
            subscription_type,
            resource_key,
        };
        index.check_roots()?;
        Ok(index)
    }

    fn check_roots(&self) -> Result<()> {
        if !self.types.contains_key(&self.query_type) {
            return Err(StrataQLError::UnknownType {
                type_name: self.query_type.clone(),
            });
        }
        Ok(())
    }

    /// The configured resource key (default `"id"`).
    #[must_use]
    pub fn resource_key(&self) -> &str {
        &self.resource_key
    }

    /// Root type name for an operation kind.
    ///
    /// # Errors
    ///
    /// Returns [`StrataQLError::Validation`] when the schema defines no root
    /// for the requested operation.
    pub fn root_type(&self, operation: OperationKind) -> Result<&str> {
        match operation {
            OperationKind::Query => Ok(&self.query_type),
            OperationKind::Mutation => {
                self.mutation_type.as_deref().ok_or_else(|| StrataQLError::Validation {
                    message: "schema defines no mutation root".to_string(),
                    path:    None,
                })
            }
            OperationKind::Subscription => {
                self.subscription_type
                    .as_deref()
                    .ok_or_else(|| StrataQLError::Validation {
                        message: "schema defines no subscription root".to_string(),
                        path:    None,
                    })
            }
        }
    }

    /// Look up a named type.
    #[must_use]
    pub fn type_entry(&self, type_name: &str) -> Option<&SchemaType> {
        self.types.get(type_name)
    }

    /// Look up a field on a named type.
    #[must_use]
    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&SchemaField> {
        self.types.get(type_name).and_then(|t| t.fields.get(field_name))
    }

    /// Whether the named type has a selection-set shape (object, interface
    /// or union).
    #[must_use]
    pub fn is_composite(&self, type_name: &str) -> bool {
        matches!(
            self.types.get(type_name).map(|t| t.kind),
            Some(TypeKind::Object | TypeKind::Interface | TypeKind::Union)
        )
    }

    /// Whether the named type is an enum.
    #[must_use]
    pub fn is_enum(&self, type_name: &str) -> bool {
        matches!(self.types.get(type_name).map(|t| t.kind), Some(TypeKind::Enum))
    }

    /// Whether the named type carries the configured resource key, i.e.
    /// whether its instances normalise into data entities.
    #[must_use]
    pub fn has_resource_key(&self, type_name: &str) -> bool {
        self.types
            .get(type_name)
            .is_some_and(|t| t.fields.contains_key(&self.resource_key))
    }
}

fn index_type_definition(type_def: &TypeDefinition<'_, String>) -> (String, SchemaType) {
    match type_def {
        TypeDefinition::Object(object) => (
            object.name.clone(),
            SchemaType {
                kind:   TypeKind::Object,
                fields: index_fields(object.fields.iter().map(|f| (&f.name, &f.field_type))),
            },
        ),
        TypeDefinition::Interface(interface) => (
            interface.name.clone(),
            SchemaType {
                kind:   TypeKind::Interface,
                fields: index_fields(interface.fields.iter().map(|f| (&f.name, &f.field_type))),
            },
        ),
        TypeDefinition::Union(union) => (
            union.name.clone(),
            SchemaType {
                kind:   TypeKind::Union,
                fields: HashMap::new(),
            },
        ),
        TypeDefinition::Enum(enum_type) => (
            enum_type.name.clone(),
            SchemaType {
                kind:   TypeKind::Enum,
                fields: HashMap::new(),
            },
        ),
        TypeDefinition::Scalar(scalar) => (
            scalar.name.clone(),
            SchemaType {
                kind:   TypeKind::Scalar,
                fields: HashMap::new(),
            },
        ),
        TypeDefinition::InputObject(input) => (
            input.name.clone(),
            SchemaType {
                kind:   TypeKind::InputObject,
                fields: index_fields(input.fields.iter().map(|f| (&f.name, &f.value_type))),
            },
        ),
    }
}

fn index_fields<'r, 'a: 'r>(
    fields: impl Iterator<Item = (&'r String, &'r Type<'a, String>)>,
) -> HashMap<String, SchemaField> {
    fields
        .map(|(name, field_type)| {
            let (type_name, is_list) = unwrap_type(field_type);
            (
                name.clone(),
                SchemaField {
                    type_name,
                    is_list,
                },
            )
        })
        .collect()
}

/// Strip `NonNull` and `List` wrappers, reporting whether a list was seen.
fn unwrap_type(field_type: &Type<'_, String>) -> (String, bool) {
    match field_type {
        Type::NamedType(name) => (name.clone(), false),
        Type::ListType(inner) => (unwrap_type(inner).0, true),
        Type::NonNullType(inner) => unwrap_type(inner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SDL: &str = r"
        type Query {
            user(id: ID!): User
            posts: [Post!]!
        }
        type Mutation {
            updateUser(id: ID!, name: String): User
        }
        type User {
            id: ID!
            name: String
            email: String
            friends: [User]
        }
        type Post {
            title: String
            author: User
        }
        enum Role {
            ADMIN
            MEMBER
        }
    ";

    #[test]
    fn test_index_from_sdl() {
        let index = SchemaIndex::from_sdl(SDL, "id").expect("valid SDL");
        assert_eq!(index.root_type(OperationKind::Query).expect("query root"), "Query");
        assert_eq!(
            index.root_type(OperationKind::Mutation).expect("mutation root"),
            "Mutation"
        );
        assert!(index.root_type(OperationKind::Subscription).is_err());
    }

    #[test]
    fn test_field_lookup_unwraps_wrappers() {
        let index = SchemaIndex::from_sdl(SDL, "id").expect("valid SDL");
        let posts = index.field("Query", "posts").expect("posts field");
        assert_eq!(posts.type_name, "Post");
        assert!(posts.is_list);

        let user = index.field("Query", "user").expect("user field");
        assert_eq!(user.type_name, "User");
        assert!(!user.is_list);
    }

    #[test]
    fn test_resource_key_detection() {
        let index = SchemaIndex::from_sdl(SDL, "id").expect("valid SDL");
        assert!(index.has_resource_key("User"));
        assert!(!index.has_resource_key("Post"));
        assert!(!index.has_resource_key("Role"));
    }

    #[test]
    fn test_composite_classification() {
        let index = SchemaIndex::from_sdl(SDL, "id").expect("valid SDL");
        assert!(index.is_composite("User"));
        assert!(!index.is_composite("String"));
        assert!(index.is_enum("Role"));
    }

    #[test]
    fn test_builtin_scalars_present() {
        let index = SchemaIndex::from_sdl(SDL, "id").expect("valid SDL");
        assert!(index.type_entry("ID").is_some());
        assert!(index.type_entry("Boolean").is_some());
    }

    #[test]
    fn test_invalid_sdl_is_a_parse_error() {
        let result = SchemaIndex::from_sdl("type Query {", "id");
        assert!(matches!(result, Err(StrataQLError::Parse { .. })));
    }

    #[test]
    fn test_custom_resource_key() {
        let sdl = r"
            type Query { node(key: ID!): Node }
            type Node { key: ID!, label: String }
        ";
        let index = SchemaIndex::from_sdl(sdl, "key").expect("valid SDL");
        assert!(index.has_resource_key("Node"));
    }
}

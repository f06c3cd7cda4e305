//! The request parser: raw query string in, canonical document out.
//!
//! Parsing runs once per request and produces everything downstream stages
//! key off: the canonical query string (which the fingerprint hashes), the
//! normalised owned AST, and the field type map recorded into the request
//! context. The normalisation order is observable: later steps depend on
//! earlier shape: and fixed:
//!
//! 1. caller-supplied fragment strings are prepended to the document;
//! 2. the document is parsed exactly once;
//! 3. variables are inlined as literal arguments;
//! 4. fragment spreads are inlined so the AST is a tree of fields;
//! 5. resource keys are inserted where the parent type carries one;
//! 6. every field's resolved type is recorded, validating against the
//!    schema index;
//! 7. the canonical string is printed.

pub(crate) mod normalize;
mod validate;

use std::collections::HashMap;
use std::sync::Arc;

use graphql_parser::query::{parse_query, Definition, Document};
use serde_json::Value as JsonValue;
use tracing::debug;
use uuid::Uuid;

use crate::ast::{
    operation_definitions, operation_kind, operation_name, AstDocument, OperationKind,
};
use crate::error::{Result, StrataQLError};
use crate::schema::SchemaIndex;

/// Caller-facing request options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Values for the document's variables.
    pub variables: Option<JsonValue>,
    /// Fragment strings prepended to the document before parsing.
    pub fragments: Option<Vec<String>>,
    /// Name selecting the operation; must match the document's single
    /// operation when both are present.
    pub operation_name: Option<String>,
    /// Await the cache promise before returning the result.
    pub await_data_cached: bool,
    /// Opaque grouping key stored alongside every cache write; `export` can
    /// filter by it.
    pub tag: Option<JsonValue>,
}

/// Resolved type of one field occurrence, recorded under its hash key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldType {
    /// Named type the field resolves to, wrappers unwrapped.
    pub type_name: String,
    /// Whether the field yields a list.
    pub is_list: bool,
    /// Whether instances normalise into data entities.
    pub has_resource_key: bool,
}

/// Per-request map from field hash key to resolved type.
pub type FieldTypeMap = HashMap<String, FieldType>;

/// Mutable state threaded through one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Opaque id, fresh per request.
    pub request_id: String,
    /// Operation kind, set by the parser.
    pub operation: OperationKind,
    /// Operation name, when the document has one.
    pub operation_name: Option<String>,
    /// Field types recorded during parsing.
    pub field_type_map: FieldTypeMap,
}

impl RequestContext {
    /// Fresh context with a new opaque request id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id:     Uuid::new_v4().to_string(),
            operation:      OperationKind::Query,
            operation_name: None,
            field_type_map: FieldTypeMap::new(),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A parsed, normalised, validated request.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    /// Canonical query string; the request fingerprint hashes this.
    pub query: String,
    /// Normalised owned AST: one operation, fields only.
    pub ast: AstDocument,
    /// Operation kind.
    pub operation: OperationKind,
}

/// Validating request parser bound to one schema index.
#[derive(Debug, Clone)]
pub struct RequestParser {
    schema: Arc<SchemaIndex>,
}

impl RequestParser {
    /// Create a parser over a schema index.
    #[must_use]
    pub fn new(schema: Arc<SchemaIndex>) -> Self {
        Self { schema }
    }

    /// Parse, normalise and validate one request.
    ///
    /// # Errors
    ///
    /// - [`StrataQLError::Parse`] on invalid syntax;
    /// - [`StrataQLError::TooManyOperations`] when the document defines more
    ///   than one operation;
    /// - [`StrataQLError::Validation`] / [`StrataQLError::UnknownField`] /
    ///   [`StrataQLError::UnknownType`] on schema mismatches and malformed
    ///   options.
    pub fn parse(
        &self,
        query: &str,
        options: &RequestOptions,
        ctx: &mut RequestContext,
    ) -> Result<ParsedRequest> {
        let source = match &options.fragments {
            Some(fragments) if !fragments.is_empty() => {
                format!("{}\n{}", fragments.join("\n"), query)
            }
            _ => query.to_string(),
        };

        let document = parse_query::<String>(&source).map_err(|e| StrataQLError::Parse {
            message: e.to_string(),
        })?;

        let operations = operation_definitions(&document);
        let operation = match operations.len() {
            0 => {
                return Err(StrataQLError::Validation {
                    message: "document defines no operation".to_string(),
                    path:    None,
                })
            }
            1 => operations[0],
            count => return Err(StrataQLError::TooManyOperations { count }),
        };

        let document_op_name = operation_name(operation).map(str::to_string);
        if let Some(requested) = &options.operation_name {
            if document_op_name.as_deref() != Some(requested.as_str()) {
                return Err(StrataQLError::Validation {
                    message: format!("document defines no operation named '{requested}'"),
                    path:    None,
                });
            }
        }

        let kind = operation_kind(operation);
        let root_type = self.schema.root_type(kind)?.to_string();

        let mut normalized = normalize::normalize_operation(
            operation,
            &document,
            options.variables.as_ref(),
            &self.schema,
        )?;

        {
            let set = match &mut normalized {
                graphql_parser::query::OperationDefinition::SelectionSet(set) => set,
                graphql_parser::query::OperationDefinition::Query(q) => &mut q.selection_set,
                graphql_parser::query::OperationDefinition::Mutation(m) => &mut m.selection_set,
                graphql_parser::query::OperationDefinition::Subscription(s) => {
                    &mut s.selection_set
                }
            };
            let mut name_path = vec![kind.as_str().to_string()];
            validate::annotate(
                set,
                &root_type,
                &self.schema,
                &mut ctx.field_type_map,
                &mut name_path,
            )?;
        }

        let ast: AstDocument = Document {
            definitions: vec![Definition::Operation(normalized)],
        };
        let canonical = format!("{ast}").trim_end().to_string();

        ctx.operation = kind;
        ctx.operation_name = document_op_name;
        debug!(
            request_id = %ctx.request_id,
            operation = %kind,
            fields = ctx.field_type_map.len(),
            "request parsed"
        );

        Ok(ParsedRequest {
            query: canonical,
            ast,
            operation: kind,
        })
    }
}

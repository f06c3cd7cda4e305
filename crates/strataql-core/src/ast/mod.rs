//! AST traversal helpers over `graphql-parser` documents.
//!
//! The cache pipeline walks query ASTs constantly: the parser normalises
//! them, the analyser reads them against the tiers, the resolver pairs them
//! with response data. This module centralises the shared traversal
//! vocabulary: operation extraction, fragment-aware child-field iteration,
//! and the six field coordinates ([`FieldKeys`]) every walk computes.

pub mod fields;
pub mod keys;
pub mod values;

use std::fmt;

use graphql_parser::query::{Document, Field, OperationDefinition, Selection, SelectionSet};

pub use fields::{child_fields, FragmentTable};
pub use keys::{field_keys, FieldKeys, PathCursor};

/// Owned query document. With the `String` text type every node owns its
/// data, so the lifetime can be re-rooted to `'static` by reconstruction.
pub type AstDocument = Document<'static, String>;

/// Owned field node.
pub type AstField = Field<'static, String>;

/// Owned selection node.
pub type AstSelection = Selection<'static, String>;

/// Owned selection set.
pub type AstSelectionSet = SelectionSet<'static, String>;

/// The three GraphQL operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Read operation; the only kind the response tier serves.
    Query,
    /// Write operation; updates entities and query paths only.
    Mutation,
    /// Long-lived operation; each message resolves like a mutation.
    Subscription,
}

impl OperationKind {
    /// Lowercase name, also used as the root segment of query paths.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation definitions of a document, in document order.
#[must_use]
pub fn operation_definitions<'d, 'a>(
    document: &'d Document<'a, String>,
) -> Vec<&'d OperationDefinition<'a, String>> {
    document
        .definitions
        .iter()
        .filter_map(|definition| match definition {
            graphql_parser::query::Definition::Operation(op) => Some(op),
            graphql_parser::query::Definition::Fragment(_) => None,
        })
        .collect()
}

/// Kind of one operation definition.
#[must_use]
pub fn operation_kind(operation: &OperationDefinition<'_, String>) -> OperationKind {
    match operation {
        OperationDefinition::SelectionSet(_) | OperationDefinition::Query(_) => {
            OperationKind::Query
        }
        OperationDefinition::Mutation(_) => OperationKind::Mutation,
        OperationDefinition::Subscription(_) => OperationKind::Subscription,
    }
}

/// Name of one operation definition, when it has one.
#[must_use]
pub fn operation_name<'d>(operation: &'d OperationDefinition<'_, String>) -> Option<&'d str> {
    match operation {
        OperationDefinition::SelectionSet(_) => None,
        OperationDefinition::Query(q) => q.name.as_deref(),
        OperationDefinition::Mutation(m) => m.name.as_deref(),
        OperationDefinition::Subscription(s) => s.name.as_deref(),
    }
}

/// Selection set of one operation definition.
#[must_use]
pub fn operation_selection_set<'d, 'a>(
    operation: &'d OperationDefinition<'a, String>,
) -> &'d SelectionSet<'a, String> {
    match operation {
        OperationDefinition::SelectionSet(set) => set,
        OperationDefinition::Query(q) => &q.selection_set,
        OperationDefinition::Mutation(m) => &m.selection_set,
        OperationDefinition::Subscription(s) => &s.selection_set,
    }
}

#[cfg(test)]
mod tests {
    use graphql_parser::query::parse_query;

    use super::*;

    #[test]
    fn test_operation_definitions_preserve_document_order() {
        let doc = parse_query::<String>(
            "query First { a } fragment F on T { x } mutation Second { b }",
        )
        .expect("valid document");
        let ops = operation_definitions(&doc);
        assert_eq!(ops.len(), 2);
        assert_eq!(operation_name(ops[0]), Some("First"));
        assert_eq!(operation_name(ops[1]), Some("Second"));
    }

    #[test]
    fn test_operation_kind_classification() {
        let doc = parse_query::<String>("subscription OnMessage { message { id } }")
            .expect("valid document");
        let ops = operation_definitions(&doc);
        assert_eq!(operation_kind(ops[0]), OperationKind::Subscription);
    }

    #[test]
    fn test_bare_selection_set_is_a_query() {
        let doc = parse_query::<String>("{ users { id } }").expect("valid document");
        let ops = operation_definitions(&doc);
        assert_eq!(operation_kind(ops[0]), OperationKind::Query);
        assert_eq!(operation_name(ops[0]), None);
        assert_eq!(operation_selection_set(ops[0]).items.len(), 1);
    }

    #[test]
    fn test_operation_kind_root_segments() {
        assert_eq!(OperationKind::Query.as_str(), "query");
        assert_eq!(OperationKind::Mutation.as_str(), "mutation");
        assert_eq!(OperationKind::Subscription.to_string(), "subscription");
    }
}

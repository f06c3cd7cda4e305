//! The six field coordinates and the path cursor that tracks them.
//!
//! Every walk over a query: analysis against the tiers, resolution of fresh
//! data into them: advances three parallel paths per the cache model:
//!
//! - the **query path** (argument-qualified segments plus list indices),
//!   whose hash keys the query-path tier;
//! - the **cache path** (argument-qualified segments, no indices), keying
//!   [`CacheMetadata`](crate::metadata::CacheMetadata) entries;
//! - the **data path** (alias-aware segments plus indices), locating values
//!   in the response shape.
//!
//! A fourth, the alias- and argument-free **name path**, feeds the hash key
//! under which a field's resolved type is recorded.

use graphql_parser::query::Field;

use super::values::argument_qualified_name;
use crate::error::Result;
use crate::fingerprint::hash_path;

/// The six coordinates of one field occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldKeys {
    /// Cache-metadata path ending in this field, e.g. `user({"id":"1"}).name`.
    pub cache_key: String,
    /// Response-shape key: alias when present, else name.
    pub data_key: String,
    /// Digest of the alias- and argument-free dotted name path; identifies
    /// the field position for type lookup independent of spelling.
    pub hash_key: String,
    /// Field name as written.
    pub name: String,
    /// Index within the enclosing list context, when there is one.
    pub prop_key: Option<usize>,
    /// Argument-qualified name, e.g. `user({"id":"1"})`.
    pub query_key: String,
}

/// Immutable path state carried down a walk. `descend` and `descend_index`
/// return extended copies, so sibling branches never observe each other.
#[derive(Debug, Clone, Default)]
pub struct PathCursor {
    query_path: Vec<String>,
    cache_path: Vec<String>,
    data_path: Vec<String>,
    name_path: Vec<String>,
    current_index: Option<usize>,
}

impl PathCursor {
    /// Cursor at an operation root. The operation kind seeds the query and
    /// name paths (`query....`), while cache and data paths start empty: the
    /// reserved `"query"` metadata path is not a traversal segment.
    #[must_use]
    pub fn root(root_segment: &str) -> Self {
        Self {
            query_path: vec![root_segment.to_string()],
            cache_path: Vec::new(),
            data_path: Vec::new(),
            name_path: vec![root_segment.to_string()],
            current_index: None,
        }
    }

    /// Cursor extended through a field.
    #[must_use]
    pub fn descend(&self, keys: &FieldKeys) -> Self {
        let mut next = self.clone();
        next.query_path.push(keys.query_key.clone());
        next.cache_path.push(keys.query_key.clone());
        next.data_path.push(keys.data_key.clone());
        next.name_path.push(keys.name.clone());
        next.current_index = None;
        next
    }

    /// Cursor extended through a list index. Only the query and data paths
    /// gain a segment: cache metadata is recorded per field, not per
    /// element.
    #[must_use]
    pub fn descend_index(&self, index: usize) -> Self {
        let mut next = self.clone();
        next.query_path.push(index.to_string());
        next.data_path.push(index.to_string());
        next.current_index = Some(index);
        next
    }

    /// The dotted query path, e.g. `query.user({"id":"1"}).friends.0`.
    #[must_use]
    pub fn query_path_string(&self) -> String {
        self.query_path.join(".")
    }

    /// The dotted cache-metadata path, empty at the root.
    #[must_use]
    pub fn cache_path_string(&self) -> String {
        self.cache_path.join(".")
    }

    /// The dotted response-shape path. Diagnostic only.
    #[must_use]
    pub fn data_path_string(&self) -> String {
        self.data_path.join(".")
    }

    /// Hash of the current query path; the query-path tier key.
    #[must_use]
    pub fn path_hash(&self) -> String {
        hash_path(&self.query_path_string())
    }

    /// Index of the enclosing list context, when inside one.
    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }
}

/// Compute the six coordinates of `field` as seen from `cursor`.
///
/// # Errors
///
/// Returns [`StrataQLError::Validation`](crate::error::StrataQLError) when an
/// argument still references a variable (the normaliser inlines variables
/// before any keyed walk).
pub fn field_keys(field: &Field<'_, String>, cursor: &PathCursor) -> Result<FieldKeys> {
    let name = field.name.clone();
    let data_key = field.alias.clone().unwrap_or_else(|| name.clone());
    let query_key = argument_qualified_name(&name, &field.arguments)?;

    let mut name_path = cursor.name_path.join(".");
    name_path.push('.');
    name_path.push_str(&name);

    let cache_key = if cursor.cache_path.is_empty() {
        query_key.clone()
    } else {
        format!("{}.{}", cursor.cache_path_string(), query_key)
    };

    Ok(FieldKeys {
        cache_key,
        data_key,
        hash_key: hash_path(&name_path),
        name,
        prop_key: cursor.current_index(),
        query_key,
    })
}

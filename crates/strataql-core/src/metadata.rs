//! Per-path cache metadata for a response.
//!
//! A [`CacheMetadata`] maps cache-path strings to [`Cacheability`] values.
//! The reserved path `"query"` carries the directive for the whole response;
//! every other path is a `.`-joined traversal from the root response type
//! down to a field. Absence of a path means "inherits parent": the effective
//! cacheability at `a.b.c` is the restrictive merge of every *present*
//! ancestor and the path itself.
//!
//! Metadata is shared by value across returns: callers receive clones and
//! must never observe later cache writes through them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::cacheability::Cacheability;

/// Reserved path naming the whole response.
pub const QUERY_PATH: &str = "query";

/// Mapping from cache-path string to [`Cacheability`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheMetadata {
    entries: IndexMap<String, Cacheability>,
}

/// Serialisable form of [`CacheMetadata`]: directive strings, not parsed
/// objects. This is what response records and snapshots persist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DehydratedCacheMetadata {
    entries: IndexMap<String, DehydratedCacheability>,
}

/// One dehydrated path entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DehydratedCacheability {
    /// Canonical `Cache-Control` string.
    pub cache_control: String,
    /// Unix timestamp (seconds) the value was stored at.
    pub stored_at: u64,
    /// Entity tag, when one was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl CacheMetadata {
    /// Create an empty metadata map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the cacheability observed at `path`, replacing any prior entry.
    pub fn insert(&mut self, path: impl Into<String>, cacheability: Cacheability) {
        self.entries.insert(path.into(), cacheability);
    }

    /// Cacheability recorded exactly at `path`, ancestors not consulted.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Cacheability> {
        self.entries.get(path)
    }

    /// The whole-response cacheability (reserved path `"query"`).
    #[must_use]
    pub fn query(&self) -> Option<&Cacheability> {
        self.entries.get(QUERY_PATH)
    }

    /// Effective cacheability at `path`: the restrictive merge of every
    /// present ancestor (starting at `"query"`) and the path's own entry.
    ///
    /// Returns `None` when neither the path nor any ancestor is present.
    #[must_use]
    pub fn effective(&self, path: &str) -> Option<Cacheability> {
        let mut combined: Option<Cacheability> = self.query().cloned();
        let mut prefix = String::new();
        for segment in path.split('.') {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(segment);
            if let Some(entry) = self.entries.get(&prefix) {
                combined = Some(match combined {
                    Some(ref parent) => parent.merge_restrictive(entry),
                    None => entry.clone(),
                });
            }
        }
        combined
    }

    /// Merge another metadata map into this one. Paths present on both sides
    /// combine restrictively; paths present on one side are kept as-is.
    pub fn merge(&mut self, other: &Self) {
        for (path, incoming) in &other.entries {
            match self.entries.get_mut(path) {
                Some(existing) => *existing = existing.merge_restrictive(incoming),
                None => {
                    self.entries.insert(path.clone(), incoming.clone());
                }
            }
        }
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Cacheability)> {
        self.entries.iter()
    }

    /// Number of recorded paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no path is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialise into directive strings. `rehydrate` of the output restores
    /// an equal map: tested as a round-trip identity.
    #[must_use]
    pub fn dehydrate(&self) -> DehydratedCacheMetadata {
        let entries = self
            .entries
            .iter()
            .map(|(path, cacheability)| {
                (
                    path.clone(),
                    DehydratedCacheability {
                        cache_control: cacheability.print_cache_control(),
                        stored_at:     cacheability.stored_at,
                        etag:          cacheability.etag.clone(),
                    },
                )
            })
            .collect();
        DehydratedCacheMetadata { entries }
    }

    /// Restore a metadata map from its dehydrated form.
    #[must_use]
    pub fn rehydrate(dehydrated: &DehydratedCacheMetadata) -> Self {
        let entries = dehydrated
            .entries
            .iter()
            .map(|(path, entry)| {
                let mut cacheability = Cacheability::parse_cache_control(&entry.cache_control)
                    .with_stored_at(entry.stored_at);
                cacheability.etag = entry.etag.clone();
                (path.clone(), cacheability)
            })
            .collect();
        Self { entries }
    }
}

impl DehydratedCacheMetadata {
    /// Iterate dehydrated entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &DehydratedCacheability)> {
        self.entries.iter()
    }
}

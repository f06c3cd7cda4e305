//! The cache manager: three tiers, two registries, one owner.
//!
//! [`CacheManager`] exclusively owns the response, query-path and
//! data-entity tiers plus the active/pending request registries. The
//! analyse walk lives in [`analysis`], the write-back stage in [`resolve`];
//! this module wires them to the stores and carries the bulk operations
//! (`clear`, `export`, `import`) and per-tier observability.

pub mod analysis;
pub mod entity;
pub mod paths;
pub mod registry;
pub mod resolve;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::warn;

pub use analysis::CacheAnalysis;
pub use entity::{DataEntity, EntityFieldValue, EntityKey};
pub use paths::QueryPathValue;
pub use registry::{Admission, OutcomeResult, RequestRegistry, SharedOutcome};
pub use resolve::{CachePromise, FetchedResponse, RequestResult, ResolveOptions};

use crate::cacheability::Cacheability;
use crate::clock::current_timestamp;
use crate::config::{CacheControls, CachemapOptions, ClientConfig};
use crate::error::{Result, StrataQLError};
use crate::metadata::DehydratedCacheMetadata;
use crate::store::{StoreEntry, StoreMetrics, TierStore};

/// One stored response: dehydrated metadata plus the shaped data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRecord {
    /// Per-path metadata, dehydrated.
    pub cache_metadata: DehydratedCacheMetadata,
    /// The response exactly as delivered to the caller.
    pub data: JsonValue,
}

/// Serialisable snapshot of all three tiers; the `export`/`import` format.
/// Stable across same-major-version instances.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSnapshot {
    /// Response tier entries.
    pub responses: Vec<StoreEntry>,
    /// Query-path tier entries.
    pub query_paths: Vec<StoreEntry>,
    /// Data-entity tier entries.
    pub data_entities: Vec<StoreEntry>,
}

/// Per-tier counters, exposed for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetrics {
    /// Response tier counters.
    pub responses: StoreMetrics,
    /// Query-path tier counters.
    pub query_paths: StoreMetrics,
    /// Data-entity tier counters.
    pub data_entities: StoreMetrics,
}

/// The three-tier cache and its request registries.
#[derive(Debug)]
pub struct CacheManager {
    pub(crate) responses: TierStore,
    pub(crate) query_paths: TierStore,
    pub(crate) entities: TierStore,
    registry: RequestRegistry,
    pub(crate) resource_key: String,
    pub(crate) default_cache_controls: CacheControls,
    pub(crate) type_cache_controls: HashMap<String, String>,
}

impl CacheManager {
    /// Build the manager from client configuration.
    #[must_use]
    pub fn new(config: &ClientConfig) -> Arc<Self> {
        Arc::new(Self::with_options(
            &config.cachemap_options,
            config.resource_key(),
            config.default_cache_controls.clone(),
            config.type_cache_controls.clone(),
        ))
    }

    /// Build the manager from its parts. Exposed for tests that exercise
    /// the manager without a full client.
    #[must_use]
    pub fn with_options(
        cachemap: &CachemapOptions,
        resource_key: &str,
        default_cache_controls: CacheControls,
        type_cache_controls: HashMap<String, String>,
    ) -> Self {
        Self {
            responses: TierStore::new("responses", cachemap.responses.clone()),
            query_paths: TierStore::new("queryPaths", cachemap.query_paths.clone()),
            entities: TierStore::new("dataEntities", cachemap.entities.clone()),
            registry: RequestRegistry::new(),
            resource_key: resource_key.to_string(),
            default_cache_controls,
            type_cache_controls,
        }
    }

    /// The request registries.
    #[must_use]
    pub fn registry(&self) -> &RequestRegistry {
        &self.registry
    }

    /// Whether a cacheability is currently servable.
    #[must_use]
    pub fn is_valid(&self, cacheability: &Cacheability) -> bool {
        cacheability.is_valid_at(current_timestamp())
    }

    /// Drop every entry in every tier and all registry state.
    pub fn clear(&self) {
        self.responses.clear();
        self.query_paths.clear();
        self.entities.clear();
        self.registry.clear();
    }

    /// Export all three tiers, optionally filtered by tag.
    #[must_use]
    pub fn export(&self, tag: Option<&JsonValue>) -> CacheSnapshot {
        CacheSnapshot {
            responses: self.responses.export(tag),
            query_paths: self.query_paths.export(tag),
            data_entities: self.entities.export(tag),
        }
    }

    /// Import a snapshot, preserving entry metadata.
    ///
    /// # Errors
    ///
    /// Returns [`StrataQLError::Store`] when a query-path entry does not
    /// deserialise: a snapshot from an incompatible source.
    pub fn import(&self, snapshot: CacheSnapshot) -> Result<()> {
        for entry in &snapshot.query_paths {
            if QueryPathValue::from_store_value(&entry.value).is_none() {
                warn!(key = %entry.key, "rejecting malformed query-path snapshot entry");
                return Err(StrataQLError::Store {
                    tier:    self.query_paths.name().to_string(),
                    message: format!("snapshot entry '{}' is not a query-path record", entry.key),
                });
            }
        }
        self.responses.import(snapshot.responses);
        self.query_paths.import(snapshot.query_paths);
        self.entities.import(snapshot.data_entities);
        Ok(())
    }

    /// Entry count of the response tier.
    #[must_use]
    pub fn response_cache_size(&self) -> usize {
        self.responses.size()
    }

    /// Entry count of the query-path tier.
    #[must_use]
    pub fn query_path_cache_size(&self) -> usize {
        self.query_paths.size()
    }

    /// Entry count of the data-entity tier.
    #[must_use]
    pub fn entity_cache_size(&self) -> usize {
        self.entities.size()
    }

    /// One response tier entry, snapshot-shaped.
    #[must_use]
    pub fn response_cache_entry(&self, key: &str) -> Option<StoreEntry> {
        entry_of(&self.responses, key)
    }

    /// One query-path tier entry, snapshot-shaped.
    #[must_use]
    pub fn query_path_cache_entry(&self, key: &str) -> Option<StoreEntry> {
        entry_of(&self.query_paths, key)
    }

    /// One data-entity tier entry, snapshot-shaped.
    #[must_use]
    pub fn entity_cache_entry(&self, key: &str) -> Option<StoreEntry> {
        entry_of(&self.entities, key)
    }

    /// Counters for all three tiers.
    #[must_use]
    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            responses: self.responses.metrics(),
            query_paths: self.query_paths.metrics(),
            data_entities: self.entities.metrics(),
        }
    }
}

fn entry_of(store: &TierStore, key: &str) -> Option<StoreEntry> {
    let (value, metadata) = store.get(key)?;
    Some(StoreEntry {
        key: key.to_string(),
        value,
        metadata,
    })
}

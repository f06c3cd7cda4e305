//! Tier stores: bounded LRU maps with per-entry metadata.
//!
//! Each cache tier (responses, query paths, data entities) is one
//! [`TierStore`]: an LRU map behind a mutex, values stored as JSON with
//! `{cache_control, stored_at, tag}` metadata alongside. The store owns
//! eviction only: capacity bounds and an optional store-wide TTL swept on
//! access. Whether an entry is *servable* is the cache manager's question,
//! answered from the entry's own `Cache-Control` directive.
//!
//! `set` is idempotent on identical input and `get` after `set` returns the
//! written value in the same logical time; the pipeline's ordering
//! guarantees are built on those two properties.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::clock::current_timestamp;

/// Per-entry metadata stored alongside every write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Canonical `Cache-Control` directive guarding the entry, when one
    /// applies.
    pub cache_control: Option<String>,

    /// Unix timestamp (seconds) of the write.
    pub stored_at: u64,

    /// Caller-supplied grouping key; `export` can filter by it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<JsonValue>,
}

/// One exported store entry; the unit of the snapshot format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreEntry {
    /// Store key.
    pub key: String,
    /// Stored value.
    pub value: JsonValue,
    /// Entry metadata, dehydrated.
    pub metadata: EntryMetadata,
}

/// Capacity bounds for one tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Hard LRU limit; least-recently-used entries are evicted beyond it.
    pub max_entries: usize,
    /// Store-wide TTL in seconds; entries older than this are dropped on
    /// access regardless of their directive. `None` disables the sweep.
    pub ttl_seconds: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl_seconds: None,
        }
    }
}

/// Hit/miss counters for one tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMetrics {
    /// Reads that returned a value.
    pub hits: u64,
    /// Reads that returned nothing.
    pub misses: u64,
    /// Total entries written across the store's lifetime.
    pub total_stored: u64,
    /// Current entry count.
    pub size: usize,
}

struct CachedEntry {
    value: JsonValue,
    metadata: EntryMetadata,
}

/// One cache tier.
pub struct TierStore {
    name: &'static str,
    inner: Mutex<LruCache<String, CachedEntry>>,
    metrics: Mutex<StoreMetrics>,
    config: StoreConfig,
}

impl TierStore {
    /// Create a tier with the given bounds. A zero `max_entries` is clamped
    /// to one rather than rejected; a cache that can hold nothing is a
    /// configuration mistake, not a reason to fail requests.
    #[must_use]
    pub fn new(name: &'static str, config: StoreConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries.max(1))
            .expect("max(1) is non-zero");
        Self {
            name,
            inner: Mutex::new(LruCache::new(capacity)),
            metrics: Mutex::new(StoreMetrics::default()),
            config,
        }
    }

    /// Tier name, used in logs and store errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Read an entry. Expired entries (store-wide TTL) are removed and
    /// reported as misses.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<(JsonValue, EntryMetadata)> {
        let mut cache = self.inner.lock();
        let hit = match cache.get(key) {
            Some(entry) => {
                if self.expired(&entry.metadata) {
                    cache.pop(key);
                    None
                } else {
                    Some((entry.value.clone(), entry.metadata.clone()))
                }
            }
            None => None,
        };
        drop(cache);

        let mut metrics = self.metrics.lock();
        if hit.is_some() {
            metrics.hits += 1;
        } else {
            metrics.misses += 1;
        }
        hit
    }

    /// Write an entry, replacing any prior value under the key.
    pub fn set(&self, key: impl Into<String>, value: JsonValue, metadata: EntryMetadata) {
        let key = key.into();
        debug!(tier = self.name, key = %key, "store write");
        let mut cache = self.inner.lock();
        cache.put(key, CachedEntry { value, metadata });
        let size = cache.len();
        drop(cache);

        let mut metrics = self.metrics.lock();
        metrics.total_stored += 1;
        metrics.size = size;
    }

    /// Whether a live entry exists under the key. Does not touch LRU order.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        let cache = self.inner.lock();
        cache
            .peek(key)
            .is_some_and(|entry| !self.expired(&entry.metadata))
    }

    /// Current entry count.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.lock().len()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.inner.lock().clear();
        self.metrics.lock().size = 0;
    }

    /// Export entries, optionally filtered by tag. Iteration order is
    /// most-recently-used first; import preserves relative recency well
    /// enough for a freshly started instance.
    #[must_use]
    pub fn export(&self, tag: Option<&JsonValue>) -> Vec<StoreEntry> {
        let cache = self.inner.lock();
        cache
            .iter()
            .filter(|(_, entry)| match tag {
                Some(wanted) => entry.metadata.tag.as_ref() == Some(wanted),
                None => true,
            })
            .map(|(key, entry)| StoreEntry {
                key:      key.clone(),
                value:    entry.value.clone(),
                metadata: entry.metadata.clone(),
            })
            .collect()
    }

    /// Import entries, preserving their recorded metadata (`stored_at`
    /// survives the round trip; validity windows keep their meaning).
    pub fn import(&self, entries: Vec<StoreEntry>) {
        let mut cache = self.inner.lock();
        // Entries arrive most-recent first; insert in reverse so the LRU
        // order after import matches the exporting store.
        for entry in entries.into_iter().rev() {
            cache.put(
                entry.key,
                CachedEntry {
                    value:    entry.value,
                    metadata: entry.metadata,
                },
            );
        }
        let size = cache.len();
        drop(cache);
        self.metrics.lock().size = size;
    }

    /// Snapshot of the tier's counters.
    #[must_use]
    pub fn metrics(&self) -> StoreMetrics {
        let mut metrics = self.metrics.lock().clone();
        metrics.size = self.size();
        metrics
    }

    fn expired(&self, metadata: &EntryMetadata) -> bool {
        match self.config.ttl_seconds {
            Some(ttl) => current_timestamp().saturating_sub(metadata.stored_at) > ttl,
            None => false,
        }
    }
}

impl std::fmt::Debug for TierStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TierStore")
            .field("name", &self.name)
            .field("size", &self.size())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn metadata(tag: Option<JsonValue>) -> EntryMetadata {
        EntryMetadata {
            cache_control: Some("max-age=60".to_string()),
            stored_at: current_timestamp(),
            tag,
        }
    }

    #[test]
    fn test_get_after_set_returns_written_value() {
        let store = TierStore::new("responses", StoreConfig::default());
        store.set("k1", json!({"data": 1}), metadata(None));
        let (value, meta) = store.get("k1").expect("written entry");
        assert_eq!(value, json!({"data": 1}));
        assert_eq!(meta.cache_control.as_deref(), Some("max-age=60"));
    }

    #[test]
    fn test_set_is_idempotent_on_identical_input() {
        let store = TierStore::new("responses", StoreConfig::default());
        let meta = metadata(None);
        store.set("k1", json!(1), meta.clone());
        store.set("k1", json!(1), meta);
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn test_lru_eviction_beyond_capacity() {
        let store = TierStore::new(
            "responses",
            StoreConfig {
                max_entries: 2,
                ttl_seconds: None,
            },
        );
        store.set("a", json!(1), metadata(None));
        store.set("b", json!(2), metadata(None));
        store.set("c", json!(3), metadata(None));
        assert_eq!(store.size(), 2);
        assert!(!store.has("a"));
        assert!(store.has("c"));
    }

    #[test]
    fn test_store_ttl_sweeps_on_access() {
        let store = TierStore::new(
            "queryPaths",
            StoreConfig {
                max_entries: 16,
                ttl_seconds: Some(60),
            },
        );
        let stale = EntryMetadata {
            cache_control: None,
            stored_at: current_timestamp() - 120,
            tag: None,
        };
        store.set("old", json!(1), stale);
        assert!(store.get("old").is_none());
        assert!(!store.has("old"));
    }

    #[test]
    fn test_metrics_track_hits_and_misses() {
        let store = TierStore::new("responses", StoreConfig::default());
        store.set("k", json!(1), metadata(None));
        let _ = store.get("k");
        let _ = store.get("absent");
        let metrics = store.metrics();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.total_stored, 1);
    }

    #[test]
    fn test_export_import_round_trip() {
        let store = TierStore::new("dataEntities", StoreConfig::default());
        store.set("User:1", json!({"name": "Ada"}), metadata(None));
        store.set("User:2", json!({"name": "Grace"}), metadata(None));

        let exported = store.export(None);
        assert_eq!(exported.len(), 2);

        let restored = TierStore::new("dataEntities", StoreConfig::default());
        restored.import(exported);
        assert_eq!(restored.size(), 2);
        let (value, _) = restored.get("User:1").expect("imported entry");
        assert_eq!(value, json!({"name": "Ada"}));
    }

    #[test]
    fn test_export_filters_by_tag() {
        let store = TierStore::new("responses", StoreConfig::default());
        store.set("a", json!(1), metadata(Some(json!("batch-1"))));
        store.set("b", json!(2), metadata(Some(json!("batch-2"))));
        store.set("c", json!(3), metadata(None));

        let exported = store.export(Some(&json!("batch-1")));
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].key, "a");
    }

    #[test]
    fn test_import_preserves_stored_at() {
        let store = TierStore::new("responses", StoreConfig::default());
        let old = EntryMetadata {
            cache_control: Some("max-age=300".to_string()),
            stored_at: 1_700_000_000,
            tag: None,
        };
        store.import(vec![StoreEntry {
            key: "k".to_string(),
            value: json!(1),
            metadata: old.clone(),
        }]);
        let (_, meta) = store.get("k").expect("imported entry");
        assert_eq!(meta.stored_at, 1_700_000_000);
    }

    #[test]
    fn test_clear_empties_the_tier() {
        let store = TierStore::new("responses", StoreConfig::default());
        store.set("k", json!(1), metadata(None));
        store.clear();
        assert_eq!(store.size(), 0);
        assert!(store.get("k").is_none());
    }
}

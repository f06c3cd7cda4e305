//! The resolve stage: write fetched data back into the tiers.
//!
//! For every field in the response the walk computes the path/entity keys,
//! records the observed value into the query-path tier, and merges entities
//! into the data-entity tier. Queries additionally write the shaped response
//! under the original fingerprint: ordered after the path and entity
//! writes. The caller is unblocked as soon as the shaped data is in hand:
//! tier writes happen behind a **cache promise** the caller may await
//! (`await_data_cached`).
//!
//! Field cacheability precedence: executor-supplied per-path metadata, then
//! the configured per-type directive (via the field type map), then the
//! parent's directive. The top level comes from the response `Cache-Control`
//! header, else the operation's default directive.

use std::collections::HashMap;
use std::sync::Arc;

use graphql_parser::query::{Field, Selection};
use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value as JsonValue};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::analysis::entry_cacheability;
use super::entity::{DataEntity, EntityFieldValue, EntityKey};
use super::paths::QueryPathValue;
use super::{CacheManager, ResponseRecord};
use crate::ast::{
    field_keys, operation_definitions, operation_selection_set, AstDocument, AstSelectionSet,
    FieldKeys, OperationKind, PathCursor,
};
use crate::cacheability::Cacheability;
use crate::clock::current_timestamp;
use crate::error::{Result, StrataQLError};
use crate::metadata::{CacheMetadata, QUERY_PATH};
use crate::request::RequestContext;
use crate::store::EntryMetadata;

/// What the external executor (or subscriber, per message) returned.
#[derive(Debug, Clone, Default)]
pub struct FetchedResponse {
    /// Response data, shaped as the caller will see it.
    pub data: JsonValue,
    /// Response headers, lowercase names.
    pub headers: HashMap<String, String>,
    /// Per-path `Cache-Control` directives supplied by the server, keyed by
    /// cache path.
    pub cache_metadata: Option<HashMap<String, String>>,
    /// GraphQL errors delivered alongside partial data.
    pub errors: Option<JsonValue>,
}

/// Handle resolving when every tier write for a request has been applied.
#[derive(Debug)]
pub struct CachePromise {
    receiver: oneshot::Receiver<Result<()>>,
}

impl CachePromise {
    /// Await the tier writes.
    ///
    /// # Errors
    ///
    /// Returns the store error that failed the write batch, or
    /// [`StrataQLError::Internal`] when the write task vanished.
    pub async fn wait(self) -> Result<()> {
        match self.receiver.await {
            Ok(result) => result,
            Err(_) => Err(StrataQLError::Internal {
                message: "cache write task dropped before completion".to_string(),
            }),
        }
    }
}

/// The caller-visible outcome of one request.
#[derive(Debug)]
pub struct RequestResult {
    /// Response data.
    pub data: JsonValue,
    /// Per-path cache metadata.
    pub cache_metadata: CacheMetadata,
    /// Request fingerprint; present for queries.
    pub query_hash: Option<String>,
    /// Pending tier writes; present when this request wrote to the cache.
    pub cache_promise: Option<CachePromise>,
}

/// Options threaded into resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Grouping key stored with every write.
    pub tag: Option<JsonValue>,
}

/// Collected tier writes for one resolution.
#[derive(Debug, Default)]
struct WriteBatch {
    paths: Vec<(String, QueryPathValue, Cacheability)>,
    entities: Vec<(String, DataEntity, Cacheability)>,
}

impl CacheManager {
    /// Resolve a query response into the tiers and produce the composite
    /// result.
    ///
    /// `ast` is the document actually fetched (the rewritten query for
    /// partial hits); `query`/`hash` identify the *original* request whose
    /// response record is written. `cached` carries the partial data and
    /// metadata served during analysis, merged under the fetched data.
    ///
    /// # Errors
    ///
    /// Returns [`StrataQLError::Validation`] when the document and data
    /// shapes disagree in a way the walk cannot skip.
    #[allow(clippy::too_many_arguments)]
    pub fn resolve_query(
        self: Arc<Self>,
        query: &str,
        ast: &AstDocument,
        hash: &str,
        fetched: FetchedResponse,
        cached: Option<(JsonValue, CacheMetadata)>,
        options: &ResolveOptions,
        ctx: &RequestContext,
    ) -> Result<RequestResult> {
        let top = self.top_cacheability(&fetched, OperationKind::Query);
        let mut metadata = CacheMetadata::new();
        let mut batch = WriteBatch::default();

        self.walk_response(ast, OperationKind::Query, &fetched, &top, &mut metadata, &mut batch, ctx)?;

        let (cached_data, cached_metadata) = match cached {
            Some((data, metadata)) => (Some(data), Some(metadata)),
            None => (None, None),
        };

        let merged_data = match cached_data {
            Some(cached) => deep_merge(cached, &fetched.data),
            None => fetched.data.clone(),
        };

        if let Some(cached_metadata) = cached_metadata {
            let mut combined = cached_metadata;
            combined.merge(&metadata);
            metadata = combined;
        }
        // Serving the record serves every field, so its lifetime is the
        // restrictive fold of the header and every recorded path.
        let folded = metadata
            .iter()
            .map(|(_, cacheability)| cacheability.clone())
            .reduce(|a, b| a.merge_restrictive(&b));
        let top = match folded {
            Some(fold) => fold.merge_restrictive(&top),
            None => top,
        };
        metadata.insert(QUERY_PATH, top.clone());

        let record = ResponseRecord {
            cache_metadata: metadata.dehydrate(),
            data: merged_data.clone(),
        };
        debug!(request_id = %ctx.request_id, hash, query_len = query.len(), "query resolved");
        let promise = spawn_writes(
            self,
            batch,
            Some((hash.to_string(), record, top)),
            options.tag.clone(),
        );

        Ok(RequestResult {
            data: merged_data,
            cache_metadata: metadata,
            query_hash: Some(hash.to_string()),
            cache_promise: Some(promise),
        })
    }

    /// Resolve a mutation response: entities and query paths update so
    /// later queries observe the write, but the response tier is never
    /// consulted or written.
    ///
    /// # Errors
    ///
    /// As [`resolve_query`](Self::resolve_query).
    pub fn resolve_mutation(
        self: Arc<Self>,
        ast: &AstDocument,
        fetched: FetchedResponse,
        options: &ResolveOptions,
        ctx: &RequestContext,
    ) -> Result<RequestResult> {
        self.resolve_write_operation(ast, OperationKind::Mutation, fetched, options, ctx)
    }

    /// Resolve one subscription message; cache effects match mutations.
    ///
    /// # Errors
    ///
    /// As [`resolve_query`](Self::resolve_query).
    pub fn resolve_subscription(
        self: Arc<Self>,
        ast: &AstDocument,
        fetched: FetchedResponse,
        options: &ResolveOptions,
        ctx: &RequestContext,
    ) -> Result<RequestResult> {
        self.resolve_write_operation(ast, OperationKind::Subscription, fetched, options, ctx)
    }

    fn resolve_write_operation(
        self: Arc<Self>,
        ast: &AstDocument,
        kind: OperationKind,
        fetched: FetchedResponse,
        options: &ResolveOptions,
        ctx: &RequestContext,
    ) -> Result<RequestResult> {
        let top = self.top_cacheability(&fetched, kind);
        let mut metadata = CacheMetadata::new();
        let mut batch = WriteBatch::default();

        self.walk_response(ast, kind, &fetched, &top, &mut metadata, &mut batch, ctx)?;
        metadata.insert(QUERY_PATH, top);

        debug!(request_id = %ctx.request_id, operation = %kind, "write operation resolved");
        let promise = spawn_writes(self, batch, None, options.tag.clone());

        Ok(RequestResult {
            data: fetched.data,
            cache_metadata: metadata,
            query_hash: None,
            cache_promise: Some(promise),
        })
    }

    /// Write a response record assembled entirely from the lower tiers (the
    /// post-analysis short-circuit).
    pub fn cache_full_hit(
        self: Arc<Self>,
        hash: &str,
        data: &JsonValue,
        metadata: &CacheMetadata,
        tag: Option<JsonValue>,
    ) -> CachePromise {
        let top = metadata
            .query()
            .cloned()
            .unwrap_or_else(|| Cacheability::parse_cache_control(&self.default_cache_controls.query));
        let record = ResponseRecord {
            cache_metadata: metadata.dehydrate(),
            data: data.clone(),
        };
        spawn_writes(self, WriteBatch::default(), Some((hash.to_string(), record, top)), tag)
    }

    fn top_cacheability(&self, fetched: &FetchedResponse, kind: OperationKind) -> Cacheability {
        let directive = fetched
            .headers
            .get("cache-control")
            .cloned()
            .unwrap_or_else(|| match kind {
                OperationKind::Query => self.default_cache_controls.query.clone(),
                OperationKind::Mutation => self.default_cache_controls.mutation.clone(),
                OperationKind::Subscription => self.default_cache_controls.subscription.clone(),
            });
        let mut cacheability = Cacheability::parse_cache_control(&directive);
        cacheability.etag = fetched.headers.get("etag").cloned();
        cacheability
    }

    #[allow(clippy::too_many_arguments)]
    fn walk_response(
        &self,
        ast: &AstDocument,
        kind: OperationKind,
        fetched: &FetchedResponse,
        top: &Cacheability,
        metadata: &mut CacheMetadata,
        batch: &mut WriteBatch,
        ctx: &RequestContext,
    ) -> Result<()> {
        let operations = operation_definitions(ast);
        let Some(operation) = operations.first() else {
            return Err(StrataQLError::Internal {
                message: "resolution requires a document with one operation".to_string(),
            });
        };
        let JsonValue::Object(data) = &fetched.data else {
            return Err(StrataQLError::Validation {
                message: "response data must be an object".to_string(),
                path:    None,
            });
        };

        let set = operation_selection_set(operation);
        let cursor = PathCursor::root(kind.as_str());
        self.resolve_object(set, &cursor, data, top, fetched, metadata, batch, ctx)?;
        Ok(())
    }

    /// Walk one object's selections against its data, returning the entity
    /// field map representation for embedding in a parent entity or object.
    #[allow(clippy::too_many_arguments)]
    fn resolve_object(
        &self,
        set: &AstSelectionSet,
        cursor: &PathCursor,
        data: &JsonMap<String, JsonValue>,
        inherited: &Cacheability,
        fetched: &FetchedResponse,
        metadata: &mut CacheMetadata,
        batch: &mut WriteBatch,
        ctx: &RequestContext,
    ) -> Result<IndexMap<String, EntityFieldValue>> {
        let mut fields_out = IndexMap::new();
        for selection in &set.items {
            let Selection::Field(field) = selection else {
                continue;
            };
            let keys = field_keys(field, cursor)?;
            let Some(value) = data.get(&keys.data_key) else {
                // The executor returned partial data; nothing to record.
                continue;
            };
            let child_cursor = cursor.descend(&keys);
            let (cacheability, own_directive) =
                self.field_cacheability(&keys, inherited, fetched, ctx);
            if own_directive {
                metadata.insert(keys.cache_key.clone(), cacheability.clone());
            }

            let stored = self.resolve_value(
                field,
                &keys,
                &child_cursor,
                value,
                &cacheability,
                fetched,
                metadata,
                batch,
                ctx,
            )?;
            fields_out.insert(keys.query_key.clone(), stored);
        }
        Ok(fields_out)
    }

    /// Record one field's value into the batch, returning its entity-field
    /// representation.
    #[allow(clippy::too_many_arguments)]
    fn resolve_value(
        &self,
        field: &Field<'static, String>,
        keys: &FieldKeys,
        cursor: &PathCursor,
        value: &JsonValue,
        cacheability: &Cacheability,
        fetched: &FetchedResponse,
        metadata: &mut CacheMetadata,
        batch: &mut WriteBatch,
        ctx: &RequestContext,
    ) -> Result<EntityFieldValue> {
        let is_leaf = field.selection_set.items.is_empty();

        match value {
            _ if is_leaf => {
                batch.paths.push((
                    cursor.path_hash(),
                    QueryPathValue::Scalar(value.clone()),
                    cacheability.clone(),
                ));
                Ok(EntityFieldValue::Scalar(value.clone()))
            }
            JsonValue::Object(object) => self.resolve_composite(
                field,
                keys,
                cursor,
                object,
                cacheability,
                fetched,
                metadata,
                batch,
                ctx,
            ),
            JsonValue::Array(elements) => {
                batch.paths.push((
                    cursor.path_hash(),
                    QueryPathValue::List(elements.len()),
                    cacheability.clone(),
                ));
                let mut stored_elements = Vec::with_capacity(elements.len());
                for (index, element) in elements.iter().enumerate() {
                    let element_cursor = cursor.descend_index(index);
                    let stored = match element {
                        JsonValue::Object(object) => self.resolve_composite(
                            field,
                            keys,
                            &element_cursor,
                            object,
                            cacheability,
                            fetched,
                            metadata,
                            batch,
                            ctx,
                        )?,
                        other => {
                            batch.paths.push((
                                element_cursor.path_hash(),
                                QueryPathValue::Scalar(other.clone()),
                                cacheability.clone(),
                            ));
                            EntityFieldValue::Scalar(other.clone())
                        }
                    };
                    stored_elements.push(stored);
                }
                Ok(EntityFieldValue::List(stored_elements))
            }
            JsonValue::Null => {
                batch.paths.push((
                    cursor.path_hash(),
                    QueryPathValue::Scalar(JsonValue::Null),
                    cacheability.clone(),
                ));
                Ok(EntityFieldValue::Scalar(JsonValue::Null))
            }
            other => {
                // Composite selection over a scalar value: the shapes
                // disagree; record nothing for the subtree.
                warn!(path = %cursor.data_path_string(), "scalar data under a composite selection");
                Ok(EntityFieldValue::Scalar(other.clone()))
            }
        }
    }

    /// Record an object value: an entity when its type carries the resource
    /// key and the data holds one, a plain object otherwise.
    #[allow(clippy::too_many_arguments)]
    fn resolve_composite(
        &self,
        field: &Field<'static, String>,
        keys: &FieldKeys,
        cursor: &PathCursor,
        object: &JsonMap<String, JsonValue>,
        cacheability: &Cacheability,
        fetched: &FetchedResponse,
        metadata: &mut CacheMetadata,
        batch: &mut WriteBatch,
        ctx: &RequestContext,
    ) -> Result<EntityFieldValue> {
        let entity_key = self.entity_identity(keys, object, ctx);

        let children = self.resolve_object(
            &field.selection_set,
            cursor,
            object,
            cacheability,
            fetched,
            metadata,
            batch,
            ctx,
        )?;

        match entity_key {
            Some(key) => {
                let store_key = key.to_store_key();
                batch.paths.push((
                    cursor.path_hash(),
                    QueryPathValue::Entity(store_key.clone()),
                    cacheability.clone(),
                ));
                let mut entity = DataEntity::new(&key);
                entity.fields = children;
                batch.entities.push((store_key.clone(), entity, cacheability.clone()));
                Ok(EntityFieldValue::Ref(store_key))
            }
            None => {
                batch.paths.push((
                    cursor.path_hash(),
                    QueryPathValue::Object,
                    cacheability.clone(),
                ));
                Ok(EntityFieldValue::Object(children))
            }
        }
    }

    /// Entity identity of an object value, when its field type carries the
    /// resource key and the data includes one.
    fn entity_identity(
        &self,
        keys: &FieldKeys,
        object: &JsonMap<String, JsonValue>,
        ctx: &RequestContext,
    ) -> Option<EntityKey> {
        let field_type = ctx.field_type_map.get(&keys.hash_key)?;
        if !field_type.has_resource_key {
            return None;
        }
        let id = match object.get(&self.resource_key)? {
            JsonValue::String(s) => s.clone(),
            JsonValue::Number(n) => n.to_string(),
            _ => return None,
        };
        EntityKey::new(&field_type.type_name, &id).ok()
    }

    /// Cacheability of one field: executor path metadata, then the per-type
    /// directive, then inheritance. The flag reports whether the field had
    /// a directive of its own (and so deserves a metadata entry).
    fn field_cacheability(
        &self,
        keys: &FieldKeys,
        inherited: &Cacheability,
        fetched: &FetchedResponse,
        ctx: &RequestContext,
    ) -> (Cacheability, bool) {
        if let Some(directive) = fetched
            .cache_metadata
            .as_ref()
            .and_then(|paths| paths.get(&keys.cache_key))
        {
            return (Cacheability::parse_cache_control(directive), true);
        }
        if let Some(field_type) = ctx.field_type_map.get(&keys.hash_key) {
            if let Some(directive) = self.type_cache_controls.get(&field_type.type_name) {
                return (Cacheability::parse_cache_control(directive), true);
            }
        }
        (inherited.clone(), false)
    }

    fn apply_writes(
        &self,
        batch: WriteBatch,
        response: Option<(String, ResponseRecord, Cacheability)>,
        tag: Option<JsonValue>,
    ) -> Result<()> {
        for (key, value, cacheability) in batch.paths {
            let stored = value.to_store_value().map_err(|e| StrataQLError::Store {
                tier:    self.query_paths.name().to_string(),
                message: e.to_string(),
            })?;
            self.query_paths.set(
                key,
                stored,
                EntryMetadata {
                    cache_control: Some(cacheability.print_cache_control()),
                    stored_at:     cacheability.stored_at,
                    tag:           tag.clone(),
                },
            );
        }

        for (key, entity, cacheability) in batch.entities {
            self.apply_entity_write(&key, entity, &cacheability, tag.clone())?;
        }

        if let Some((hash, record, cacheability)) = response {
            let stored = serde_json::to_value(&record).map_err(|e| StrataQLError::Store {
                tier:    self.responses.name().to_string(),
                message: e.to_string(),
            })?;
            self.responses.set(
                hash,
                stored,
                EntryMetadata {
                    cache_control: Some(cacheability.print_cache_control()),
                    stored_at:     cacheability.stored_at,
                    tag,
                },
            );
        }
        Ok(())
    }

    /// Merge an entity write into the tier. When the incoming directive is
    /// unservable (mutation/subscription defaults), the existing entry's
    /// directive and storage instant are kept: the write refreshes *values*
    /// without making anything newly cacheable.
    fn apply_entity_write(
        &self,
        key: &str,
        incoming: DataEntity,
        cacheability: &Cacheability,
        tag: Option<JsonValue>,
    ) -> Result<()> {
        let existing = self.entities.get(key);
        let (entity, entry_metadata) = match existing {
            Some((value, previous_metadata)) => {
                let mut merged: DataEntity =
                    serde_json::from_value(value).unwrap_or_else(|_| incoming.clone());
                merged.merge(incoming);
                let unservable = cacheability.no_store || cacheability.no_cache;
                let metadata = if unservable && previous_metadata.cache_control.is_some() {
                    EntryMetadata {
                        cache_control: previous_metadata.cache_control,
                        stored_at:     previous_metadata.stored_at,
                        tag,
                    }
                } else {
                    EntryMetadata {
                        cache_control: Some(cacheability.print_cache_control()),
                        stored_at:     cacheability.stored_at,
                        tag,
                    }
                };
                (merged, metadata)
            }
            None => (
                incoming,
                EntryMetadata {
                    cache_control: Some(cacheability.print_cache_control()),
                    stored_at:     cacheability.stored_at,
                    tag,
                },
            ),
        };

        let stored = serde_json::to_value(&entity).map_err(|e| StrataQLError::Store {
            tier:    self.entities.name().to_string(),
            message: e.to_string(),
        })?;
        self.entities.set(key.to_string(), stored, entry_metadata);
        Ok(())
    }

    /// A still-valid response record, shaped for return.
    #[must_use]
    pub fn cached_response(&self, hash: &str) -> Option<RequestResult> {
        let (value, entry_metadata) = self.responses.get(hash)?;
        let cacheability = entry_cacheability(
            entry_metadata.cache_control.as_deref(),
            entry_metadata.stored_at,
        );
        if !cacheability.is_valid_at(current_timestamp()) {
            return None;
        }
        let record: ResponseRecord = serde_json::from_value(value).ok()?;
        Some(RequestResult {
            data: record.data,
            cache_metadata: CacheMetadata::rehydrate(&record.cache_metadata),
            query_hash: Some(hash.to_string()),
            cache_promise: None,
        })
    }
}

/// Apply a write batch on a background task: query paths first, then
/// entities, then the response record. The returned promise resolves when
/// every tier acknowledged.
fn spawn_writes(
    manager: Arc<CacheManager>,
    batch: WriteBatch,
    response: Option<(String, ResponseRecord, Cacheability)>,
    tag: Option<JsonValue>,
) -> CachePromise {
    let (sender, receiver) = oneshot::channel();
    tokio::spawn(async move {
        let result = manager.apply_writes(batch, response, tag);
        if let Err(error) = &result {
            warn!(%error, "cache tier write failed");
        }
        let _ = sender.send(result);
    });
    CachePromise { receiver }
}

/// Merge fetched data over cached data: objects merge recursively, anything
/// else is replaced by the fetched side.
#[must_use]
pub fn deep_merge(base: JsonValue, overlay: &JsonValue) -> JsonValue {
    match (base, overlay) {
        (JsonValue::Object(mut base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value.clone(),
                };
                base_map.insert(key.clone(), merged);
            }
            JsonValue::Object(base_map)
        }
        (_, overlay_value) => overlay_value.clone(),
    }
}

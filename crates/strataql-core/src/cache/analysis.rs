//! The analyse walk: cache hit, miss, or partial synthesis.
//!
//! Given a parsed query, decide whether it can be served from the tiers -
//! fully, partially, or not at all: and when partially, produce a rewritten
//! query requesting only the missing fields.
//!
//! The walk is depth-first with two data sources. At the root, field
//! identity resolves through the **query-path tier**; once an entity
//! reference is crossed, the **entity's own fields** become the source of
//! truth, which is what makes a value written by one query (or a mutation)
//! visible to a differently-shaped later query. A record whose cacheability
//! is invalid is treated as absent, so its subtree is refetched. Lists are
//! all-or-nothing: one missing descendant refetches the whole list field.

use graphql_parser::query::{
    Definition, Document, Field, Mutation, OperationDefinition, Query, Selection, Subscription,
};
use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value as JsonValue};
use tracing::debug;

use super::entity::{DataEntity, EntityFieldValue};
use super::paths::QueryPathValue;
use super::CacheManager;
use crate::ast::{
    field_keys, operation_definitions, operation_selection_set, AstDocument, AstSelection,
    AstSelectionSet, FieldKeys, OperationKind, PathCursor,
};
use crate::cacheability::Cacheability;
use crate::clock::current_timestamp;
use crate::error::{Result, StrataQLError};
use crate::metadata::{CacheMetadata, QUERY_PATH};

/// Meta field served from entity identity without a stored record.
const TYPENAME_FIELD: &str = "__typename";

/// Outcome of analysing one query against the tiers.
#[derive(Debug)]
pub enum CacheAnalysis {
    /// Every requested field was served from cache.
    Hit {
        /// Fully shaped response data.
        data: JsonValue,
        /// Per-path metadata, `"query"` entry included.
        cache_metadata: CacheMetadata,
    },
    /// Some fields were served; the rewritten query fetches the rest.
    Partial {
        /// The served portion, response-shaped.
        data: JsonValue,
        /// Metadata for the served portion.
        cache_metadata: CacheMetadata,
        /// Canonical print of the rewritten query.
        updated_query: String,
        /// The rewritten document.
        updated_ast: AstDocument,
    },
    /// Nothing usable was cached; the original query fetches in full.
    Miss,
}

/// Where field values come from at the current depth.
enum Source<'a> {
    /// Resolve through the query-path tier.
    Paths,
    /// Resolve through a loaded entity's (or nested object's) fields.
    Fields {
        fields: &'a IndexMap<String, EntityFieldValue>,
        type_name: Option<&'a str>,
        cacheability: &'a Cacheability,
    },
}

/// Result of analysing one selection set.
struct SetAnalysis {
    data: JsonMap<String, JsonValue>,
    missing: Vec<AstSelection>,
    served_any: bool,
}

impl SetAnalysis {
    fn complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// What one field resolved to.
enum ResolvedField {
    Missing,
    Scalar(JsonValue, Cacheability),
    Entity(DataEntity, Cacheability),
    Object(IndexMap<String, EntityFieldValue>, Cacheability),
    /// Non-entity object whose children resolve through the path tier.
    PathObject(Cacheability),
    PathList(usize, Cacheability),
    ValueList(Vec<EntityFieldValue>, Cacheability),
}

impl CacheManager {
    /// Analyse a query against the tiers.
    ///
    /// A still-valid response record short-circuits to `Hit` (the
    /// orchestrator checks the response tier before admission too, but a
    /// race may resurface one here).
    ///
    /// # Errors
    ///
    /// Returns [`StrataQLError::Internal`] when the document carries no
    /// operation: the parser never hands such a document over.
    pub fn analyse(&self, hash: &str, ast: &AstDocument) -> Result<CacheAnalysis> {
        if let Some(result) = self.cached_response(hash) {
            debug!(hash, "response record resurfaced during analysis");
            return Ok(CacheAnalysis::Hit {
                data: result.data,
                cache_metadata: result.cache_metadata,
            });
        }

        let operations = operation_definitions(ast);
        let Some(operation) = operations.first() else {
            return Err(StrataQLError::Internal {
                message: "analysis requires a document with one operation".to_string(),
            });
        };
        let set = operation_selection_set(operation);
        let cursor = PathCursor::root(OperationKind::Query.as_str());
        let now = current_timestamp();

        let mut metadata = CacheMetadata::new();
        let outcome = self.analyse_set(set, &cursor, &Source::Paths, &mut metadata, now)?;

        if !outcome.served_any {
            return Ok(CacheAnalysis::Miss);
        }

        // The topmost cacheability is the restrictive fold of everything
        // served; it becomes the reserved "query" entry.
        let query_cacheability = metadata
            .iter()
            .map(|(_, c)| c.clone())
            .reduce(|a, b| a.merge_restrictive(&b));
        if let Some(cacheability) = query_cacheability {
            metadata.insert(QUERY_PATH, cacheability);
        }

        let is_complete = outcome.complete();
        let data = JsonValue::Object(outcome.data);
        if is_complete {
            debug!(hash, "analysis produced a full cache hit");
            return Ok(CacheAnalysis::Hit {
                data,
                cache_metadata: metadata,
            });
        }

        let updated_ast = rewrite_operation(operation, outcome.missing);
        let updated_query = format!("{updated_ast}").trim_end().to_string();
        debug!(hash, "analysis produced a partial hit");
        Ok(CacheAnalysis::Partial {
            data,
            cache_metadata: metadata,
            updated_query,
            updated_ast,
        })
    }

    fn analyse_set(
        &self,
        set: &AstSelectionSet,
        cursor: &PathCursor,
        source: &Source<'_>,
        metadata: &mut CacheMetadata,
        now: u64,
    ) -> Result<SetAnalysis> {
        let mut outcome = SetAnalysis {
            data: JsonMap::new(),
            missing: Vec::new(),
            served_any: false,
        };

        for selection in &set.items {
            let Selection::Field(field) = selection else {
                // Normalised documents contain only fields; anything else
                // cannot be matched against the tiers.
                outcome.missing.push(selection.clone());
                continue;
            };
            let keys = field_keys(field, cursor)?;
            let child_cursor = cursor.descend(&keys);

            if field.name == TYPENAME_FIELD {
                if let Source::Fields {
                    type_name: Some(type_name),
                    cacheability,
                    ..
                } = source
                {
                    outcome
                        .data
                        .insert(keys.data_key.clone(), JsonValue::String((*type_name).to_string()));
                    metadata.insert(keys.cache_key.clone(), (*cacheability).clone());
                    outcome.served_any = true;
                    continue;
                }
            }

            let resolved = self.resolve_source_field(&keys, &child_cursor, source, now);
            self.analyse_field(
                field,
                &keys,
                &child_cursor,
                resolved,
                &mut outcome,
                metadata,
                now,
            )?;
        }

        Ok(outcome)
    }

    #[allow(clippy::too_many_arguments)]
    fn analyse_field(
        &self,
        field: &Field<'static, String>,
        keys: &FieldKeys,
        child_cursor: &PathCursor,
        resolved: ResolvedField,
        outcome: &mut SetAnalysis,
        metadata: &mut CacheMetadata,
        now: u64,
    ) -> Result<()> {
        let is_leaf = field.selection_set.items.is_empty();
        match resolved {
            ResolvedField::Scalar(value, cacheability) if is_leaf => {
                outcome.data.insert(keys.data_key.clone(), value);
                metadata.insert(keys.cache_key.clone(), cacheability);
                outcome.served_any = true;
            }
            // A recorded null under a composite selection is a complete
            // answer: the server said there is no object here.
            ResolvedField::Scalar(JsonValue::Null, cacheability) => {
                outcome.data.insert(keys.data_key.clone(), JsonValue::Null);
                metadata.insert(keys.cache_key.clone(), cacheability);
                outcome.served_any = true;
            }
            ResolvedField::Entity(entity, cacheability) if !is_leaf => {
                let source = Source::Fields {
                    fields: &entity.fields,
                    type_name: Some(&entity.type_name),
                    cacheability: &cacheability,
                };
                let child =
                    self.analyse_set(&field.selection_set, child_cursor, &source, metadata, now)?;
                self.absorb_composite(field, keys, child, cacheability, outcome, metadata);
            }
            ResolvedField::Object(fields, cacheability) if !is_leaf => {
                let source = Source::Fields {
                    fields: &fields,
                    type_name: None,
                    cacheability: &cacheability,
                };
                let child =
                    self.analyse_set(&field.selection_set, child_cursor, &source, metadata, now)?;
                self.absorb_composite(field, keys, child, cacheability, outcome, metadata);
            }
            ResolvedField::PathObject(cacheability) if !is_leaf => {
                let child = self.analyse_set(
                    &field.selection_set,
                    child_cursor,
                    &Source::Paths,
                    metadata,
                    now,
                )?;
                self.absorb_composite(field, keys, child, cacheability, outcome, metadata);
            }
            ResolvedField::PathList(length, cacheability) if !is_leaf => {
                match self.analyse_path_list(field, child_cursor, length, metadata, now)? {
                    Some(elements) => {
                        outcome.data.insert(keys.data_key.clone(), JsonValue::Array(elements));
                        metadata.insert(keys.cache_key.clone(), cacheability);
                        outcome.served_any = true;
                    }
                    None => outcome.missing.push(Selection::Field(field.clone())),
                }
            }
            ResolvedField::ValueList(elements, cacheability) if !is_leaf => {
                match self.analyse_value_list(field, child_cursor, &elements, &cacheability, metadata, now)? {
                    Some(elements) => {
                        outcome.data.insert(keys.data_key.clone(), JsonValue::Array(elements));
                        metadata.insert(keys.cache_key.clone(), cacheability);
                        outcome.served_any = true;
                    }
                    None => outcome.missing.push(Selection::Field(field.clone())),
                }
            }
            _ => outcome.missing.push(Selection::Field(field.clone())),
        }
        Ok(())
    }

    /// Fold a child analysis into its parent: prune served selections, keep
    /// the missing ones (resource key retained), assemble partial data.
    fn absorb_composite(
        &self,
        field: &Field<'static, String>,
        keys: &FieldKeys,
        child: SetAnalysis,
        cacheability: Cacheability,
        outcome: &mut SetAnalysis,
        metadata: &mut CacheMetadata,
    ) {
        if !child.served_any {
            outcome.missing.push(Selection::Field(field.clone()));
            return;
        }
        outcome.served_any = true;
        let is_complete = child.complete();
        outcome
            .data
            .insert(keys.data_key.clone(), JsonValue::Object(child.data));
        metadata.insert(keys.cache_key.clone(), cacheability);
        if !is_complete {
            outcome
                .missing
                .push(self.pruned_field(field, child.missing));
        }
    }

    /// A copy of the field keeping only its missing children, with the
    /// resource key re-attached so the resolver can normalise the refetched
    /// entity.
    fn pruned_field(
        &self,
        field: &Field<'static, String>,
        mut missing: Vec<AstSelection>,
    ) -> AstSelection {
        let has_resource_key = missing.iter().any(|selection| {
            matches!(selection, Selection::Field(f) if f.name == self.resource_key)
        });
        if !has_resource_key {
            let original_key = field.selection_set.items.iter().find(|selection| {
                matches!(selection, Selection::Field(f) if f.name == self.resource_key)
            });
            if let Some(resource_field) = original_key {
                missing.insert(0, resource_field.clone());
            }
        }

        let mut pruned = field.clone();
        pruned.selection_set.items = missing;
        Selection::Field(pruned)
    }

    fn analyse_path_list(
        &self,
        field: &Field<'static, String>,
        list_cursor: &PathCursor,
        length: usize,
        metadata: &mut CacheMetadata,
        now: u64,
    ) -> Result<Option<Vec<JsonValue>>> {
        let mut elements = Vec::with_capacity(length);
        for index in 0..length {
            let element_cursor = list_cursor.descend_index(index);
            let Some((value, cacheability)) = self.read_path(&element_cursor, now) else {
                return Ok(None);
            };
            let element = match value {
                QueryPathValue::Entity(key) => {
                    let Some((entity, entity_cacheability)) = self.load_entity(&key, now) else {
                        return Ok(None);
                    };
                    let merged = cacheability.merge_restrictive(&entity_cacheability);
                    let source = Source::Fields {
                        fields: &entity.fields,
                        type_name: Some(&entity.type_name),
                        cacheability: &merged,
                    };
                    self.analyse_set(&field.selection_set, &element_cursor, &source, metadata, now)?
                }
                QueryPathValue::Object => self.analyse_set(
                    &field.selection_set,
                    &element_cursor,
                    &Source::Paths,
                    metadata,
                    now,
                )?,
                QueryPathValue::Scalar(_) | QueryPathValue::List(_) => return Ok(None),
            };
            if !element.complete() {
                return Ok(None);
            }
            elements.push(JsonValue::Object(element.data));
        }
        Ok(Some(elements))
    }

    fn analyse_value_list(
        &self,
        field: &Field<'static, String>,
        list_cursor: &PathCursor,
        values: &[EntityFieldValue],
        inherited: &Cacheability,
        metadata: &mut CacheMetadata,
        now: u64,
    ) -> Result<Option<Vec<JsonValue>>> {
        let mut elements = Vec::with_capacity(values.len());
        for (index, value) in values.iter().enumerate() {
            let element_cursor = list_cursor.descend_index(index);
            let element = match value {
                EntityFieldValue::Ref(key) => {
                    let Some((entity, entity_cacheability)) = self.load_entity(key, now) else {
                        return Ok(None);
                    };
                    let merged = inherited.merge_restrictive(&entity_cacheability);
                    let source = Source::Fields {
                        fields: &entity.fields,
                        type_name: Some(&entity.type_name),
                        cacheability: &merged,
                    };
                    self.analyse_set(&field.selection_set, &element_cursor, &source, metadata, now)?
                }
                EntityFieldValue::Object(fields) => {
                    let source = Source::Fields {
                        fields,
                        type_name: None,
                        cacheability: inherited,
                    };
                    self.analyse_set(&field.selection_set, &element_cursor, &source, metadata, now)?
                }
                EntityFieldValue::Scalar(_) | EntityFieldValue::List(_) => return Ok(None),
            };
            if !element.complete() {
                return Ok(None);
            }
            elements.push(JsonValue::Object(element.data));
        }
        Ok(Some(elements))
    }

    /// Resolve what the current source knows about one field.
    fn resolve_source_field(
        &self,
        keys: &FieldKeys,
        child_cursor: &PathCursor,
        source: &Source<'_>,
        now: u64,
    ) -> ResolvedField {
        match source {
            Source::Paths => {
                let Some((value, cacheability)) = self.read_path(child_cursor, now) else {
                    return ResolvedField::Missing;
                };
                match value {
                    QueryPathValue::Scalar(scalar) => ResolvedField::Scalar(scalar, cacheability),
                    QueryPathValue::Entity(key) => match self.load_entity(&key, now) {
                        Some((entity, entity_cacheability)) => ResolvedField::Entity(
                            entity,
                            cacheability.merge_restrictive(&entity_cacheability),
                        ),
                        None => ResolvedField::Missing,
                    },
                    QueryPathValue::Object => ResolvedField::PathObject(cacheability),
                    QueryPathValue::List(length) => ResolvedField::PathList(length, cacheability),
                }
            }
            Source::Fields {
                fields,
                cacheability,
                ..
            } => match fields.get(&keys.query_key) {
                None => ResolvedField::Missing,
                Some(EntityFieldValue::Scalar(scalar)) => {
                    ResolvedField::Scalar(scalar.clone(), (*cacheability).clone())
                }
                Some(EntityFieldValue::Ref(key)) => match self.load_entity(key, now) {
                    Some((entity, entity_cacheability)) => ResolvedField::Entity(
                        entity,
                        cacheability.merge_restrictive(&entity_cacheability),
                    ),
                    None => ResolvedField::Missing,
                },
                Some(EntityFieldValue::Object(fields)) => {
                    ResolvedField::Object(fields.clone(), (*cacheability).clone())
                }
                Some(EntityFieldValue::List(items)) => {
                    ResolvedField::ValueList(items.clone(), (*cacheability).clone())
                }
            },
        }
    }

    /// Read a query-path record, treating invalid cacheability as absence.
    fn read_path(&self, cursor: &PathCursor, now: u64) -> Option<(QueryPathValue, Cacheability)> {
        let (value, entry_metadata) = self.query_paths.get(&cursor.path_hash())?;
        let cacheability = entry_cacheability(
            entry_metadata.cache_control.as_deref(),
            entry_metadata.stored_at,
        );
        if !cacheability.is_valid_at(now) {
            return None;
        }
        let value = QueryPathValue::from_store_value(&value)?;
        Some((value, cacheability))
    }

    /// Load an entity record, treating invalid cacheability as absence.
    pub(crate) fn load_entity(&self, key: &str, now: u64) -> Option<(DataEntity, Cacheability)> {
        let (value, entry_metadata) = self.entities.get(key)?;
        let cacheability = entry_cacheability(
            entry_metadata.cache_control.as_deref(),
            entry_metadata.stored_at,
        );
        if !cacheability.is_valid_at(now) {
            return None;
        }
        let entity: DataEntity = serde_json::from_value(value).ok()?;
        Some((entity, cacheability))
    }
}

/// Parse an entry's directive, restoring its storage instant.
pub(crate) fn entry_cacheability(cache_control: Option<&str>, stored_at: u64) -> Cacheability {
    Cacheability::parse_cache_control(cache_control.unwrap_or_default()).with_stored_at(stored_at)
}

/// Rebuild the operation around the missing selections, preserving its kind
/// and name. Variable definitions are gone: the normaliser inlined them.
fn rewrite_operation(
    operation: &OperationDefinition<'static, String>,
    missing: Vec<AstSelection>,
) -> AstDocument {
    let rewritten = match operation {
        OperationDefinition::SelectionSet(set) => {
            let mut set = set.clone();
            set.items = missing;
            OperationDefinition::SelectionSet(set)
        }
        OperationDefinition::Query(q) => OperationDefinition::Query(Query {
            position: q.position,
            name: q.name.clone(),
            variable_definitions: Vec::new(),
            directives: q.directives.clone(),
            selection_set: graphql_parser::query::SelectionSet {
                span:  q.selection_set.span,
                items: missing,
            },
        }),
        OperationDefinition::Mutation(m) => OperationDefinition::Mutation(Mutation {
            position: m.position,
            name: m.name.clone(),
            variable_definitions: Vec::new(),
            directives: m.directives.clone(),
            selection_set: graphql_parser::query::SelectionSet {
                span:  m.selection_set.span,
                items: missing,
            },
        }),
        OperationDefinition::Subscription(s) => OperationDefinition::Subscription(Subscription {
            position: s.position,
            name: s.name.clone(),
            variable_definitions: Vec::new(),
            directives: s.directives.clone(),
            selection_set: graphql_parser::query::SelectionSet {
                span:  s.selection_set.span,
                items: missing,
            },
        }),
    };
    Document {
        definitions: vec![Definition::Operation(rewritten)],
    }
}

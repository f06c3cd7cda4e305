//! Document normalisation: variable inlining, fragment inlining, directive
//! evaluation.
//!
//! The cache must see the same document whether the caller used `$x` or a
//! literal, a named fragment or inline fields. Normalisation rebuilds the
//! parsed operation into an owned tree of plain fields:
//!
//! 1. every variable reference becomes a literal argument value (enum-typed
//!    variables become enum literals, not strings);
//! 2. fragment spreads and inline fragments are flattened into their parent
//!    selection sets, depth-limited and cycle-checked;
//! 3. `@skip`/`@include` with now-literal conditions are evaluated and
//!    consumed;
//! 4. duplicate response keys are merged so the canonical print is stable.
//!
//! The output is rooted at `'static`: with the `String` text type the AST
//! owns all of its data, so reconstruction is the only lifetime cost.

use std::collections::{HashMap, HashSet};

use graphql_parser::query::{
    Directive, Document, Field, Mutation, OperationDefinition, Query, Selection, SelectionSet,
    Subscription, Type, Value as GqlValue,
};
use serde_json::Value as JsonValue;

use crate::ast::values::{from_json, from_json_typed, to_json};
use crate::ast::{AstSelection, AstSelectionSet, FragmentTable};
use crate::error::{Result, StrataQLError};
use crate::schema::SchemaIndex;

/// Fragment inlining depth limit.
const MAX_FRAGMENT_DEPTH: u32 = 16;

/// Owned operation definition produced by normalisation.
pub(crate) type NormalizedOperation = OperationDefinition<'static, String>;

struct NormalizeCx<'d, 'a, 's> {
    fragments: FragmentTable<'d, 'a>,
    variables: HashMap<String, JsonValue>,
    variable_types: HashMap<String, String>,
    schema: &'s SchemaIndex,
}

/// Normalise one operation of a parsed document.
pub(crate) fn normalize_operation<'a>(
    operation: &OperationDefinition<'a, String>,
    document: &Document<'a, String>,
    provided_variables: Option<&JsonValue>,
    schema: &SchemaIndex,
) -> Result<NormalizedOperation> {
    let (variables, variable_types) =
        collect_variables(operation, provided_variables, schema)?;
    let cx = NormalizeCx {
        fragments: FragmentTable::from_document(document),
        variables,
        variable_types,
        schema,
    };

    let mut visited = HashSet::new();
    Ok(match operation {
        OperationDefinition::SelectionSet(set) => OperationDefinition::SelectionSet(
            normalize_set(&cx, set, &mut visited, 0)?,
        ),
        OperationDefinition::Query(q) => OperationDefinition::Query(Query {
            position: q.position,
            name: q.name.clone(),
            variable_definitions: Vec::new(),
            directives: inline_directives(&cx, &q.directives)?,
            selection_set: normalize_set(&cx, &q.selection_set, &mut visited, 0)?,
        }),
        OperationDefinition::Mutation(m) => OperationDefinition::Mutation(Mutation {
            position: m.position,
            name: m.name.clone(),
            variable_definitions: Vec::new(),
            directives: inline_directives(&cx, &m.directives)?,
            selection_set: normalize_set(&cx, &m.selection_set, &mut visited, 0)?,
        }),
        OperationDefinition::Subscription(s) => OperationDefinition::Subscription(Subscription {
            position: s.position,
            name: s.name.clone(),
            variable_definitions: Vec::new(),
            directives: inline_directives(&cx, &s.directives)?,
            selection_set: normalize_set(&cx, &s.selection_set, &mut visited, 0)?,
        }),
    })
}

fn collect_variables(
    operation: &OperationDefinition<'_, String>,
    provided: Option<&JsonValue>,
    schema: &SchemaIndex,
) -> Result<(HashMap<String, JsonValue>, HashMap<String, String>)> {
    let provided_map = match provided {
        None | Some(JsonValue::Null) => None,
        Some(JsonValue::Object(map)) => Some(map),
        Some(_) => {
            return Err(StrataQLError::Validation {
                message: "variables must be a JSON object".to_string(),
                path:    None,
            })
        }
    };

    let definitions = match operation {
        OperationDefinition::SelectionSet(_) => &[][..],
        OperationDefinition::Query(q) => &q.variable_definitions[..],
        OperationDefinition::Mutation(m) => &m.variable_definitions[..],
        OperationDefinition::Subscription(s) => &s.variable_definitions[..],
    };

    let mut variables = HashMap::new();
    let mut variable_types = HashMap::new();
    for definition in definitions {
        let name = definition.name.clone();
        let type_name = named_type(&definition.var_type);
        if schema.type_entry(&type_name).is_none() {
            return Err(StrataQLError::UnknownType {
                type_name,
            });
        }

        let value = provided_map
            .and_then(|map| map.get(&name))
            .cloned()
            .or_else(|| {
                definition
                    .default_value
                    .as_ref()
                    .and_then(|default| to_json(default).ok())
            });
        let value = match value {
            Some(v) => v,
            None if matches!(definition.var_type, Type::NonNullType(_)) => {
                return Err(StrataQLError::Validation {
                    message: format!("missing required variable '${name}'"),
                    path:    None,
                })
            }
            None => JsonValue::Null,
        };

        variable_types.insert(name.clone(), type_name);
        variables.insert(name, value);
    }

    Ok((variables, variable_types))
}

fn named_type(var_type: &Type<'_, String>) -> String {
    match var_type {
        Type::NamedType(name) => name.clone(),
        Type::ListType(inner) | Type::NonNullType(inner) => named_type(inner),
    }
}

fn normalize_set(
    cx: &NormalizeCx<'_, '_, '_>,
    set: &SelectionSet<'_, String>,
    visited: &mut HashSet<String>,
    depth: u32,
) -> Result<AstSelectionSet> {
    if depth > MAX_FRAGMENT_DEPTH {
        return Err(StrataQLError::Validation {
            message: format!("fragment nesting exceeds depth limit of {MAX_FRAGMENT_DEPTH}"),
            path:    None,
        });
    }

    let mut items: Vec<AstSelection> = Vec::new();
    for selection in &set.items {
        match selection {
            Selection::Field(field) => {
                let directives = inline_directives(cx, &field.directives)?;
                let Some(directives) = evaluate_conditions(directives)? else {
                    continue;
                };
                items.push(Selection::Field(Field {
                    position:      field.position,
                    alias:         field.alias.clone(),
                    name:          field.name.clone(),
                    arguments:     inline_arguments(cx, &field.arguments)?,
                    directives,
                    selection_set: normalize_set(cx, &field.selection_set, visited, depth)?,
                }));
            }
            Selection::InlineFragment(inline) => {
                let inner = normalize_set(cx, &inline.selection_set, visited, depth + 1)?;
                items.extend(inner.items);
            }
            Selection::FragmentSpread(spread) => {
                let name = spread.fragment_name.clone();
                if visited.contains(&name) {
                    return Err(StrataQLError::Validation {
                        message: format!("circular reference through fragment '{name}'"),
                        path:    None,
                    });
                }
                let Some(fragment) = cx.fragments.get(&name) else {
                    return Err(StrataQLError::Validation {
                        message: format!("unknown fragment '{name}'"),
                        path:    None,
                    });
                };
                visited.insert(name.clone());
                let inner = normalize_set(cx, &fragment.selection_set, visited, depth + 1)?;
                visited.remove(&name);
                items.extend(inner.items);
            }
        }
    }

    Ok(SelectionSet {
        span:  set.span,
        items: merge_fields(items),
    })
}

/// Merge selections sharing a response key, recursing into subselections.
/// Only same-named fields with identical arguments merge; anything else is
/// left for the server to reject.
fn merge_fields(items: Vec<AstSelection>) -> Vec<AstSelection> {
    let mut merged: Vec<AstSelection> = Vec::new();
    for selection in items {
        let Selection::Field(field) = selection else {
            merged.push(selection);
            continue;
        };
        let response_key = field.alias.as_ref().unwrap_or(&field.name);

        let position = merged.iter().position(|candidate| match candidate {
            Selection::Field(f) => {
                f.alias.as_ref().unwrap_or(&f.name) == response_key
                    && f.name == field.name
                    && f.arguments == field.arguments
            }
            _ => false,
        });

        match position {
            Some(index) => {
                if let Selection::Field(target) = &mut merged[index] {
                    let mut combined = std::mem::take(&mut target.selection_set.items);
                    combined.extend(field.selection_set.items);
                    target.selection_set.items = merge_fields(combined);
                }
            }
            None => merged.push(Selection::Field(field)),
        }
    }
    merged
}

fn inline_arguments(
    cx: &NormalizeCx<'_, '_, '_>,
    arguments: &[(String, GqlValue<'_, String>)],
) -> Result<Vec<(String, GqlValue<'static, String>)>> {
    arguments
        .iter()
        .map(|(name, value)| Ok((name.clone(), inline_value(cx, value)?)))
        .collect()
}

fn inline_directives(
    cx: &NormalizeCx<'_, '_, '_>,
    directives: &[Directive<'_, String>],
) -> Result<Vec<Directive<'static, String>>> {
    directives
        .iter()
        .map(|directive| {
            Ok(Directive {
                position:  directive.position,
                name:      directive.name.clone(),
                arguments: inline_arguments(cx, &directive.arguments)?,
            })
        })
        .collect()
}

/// Apply `@skip`/`@include` with literal conditions. Returns `None` when the
/// field is excluded; otherwise the directive list with both consumed.
fn evaluate_conditions(
    directives: Vec<Directive<'static, String>>,
) -> Result<Option<Vec<Directive<'static, String>>>> {
    let mut remaining = Vec::with_capacity(directives.len());
    for directive in directives {
        let condition = match directive.name.as_str() {
            "skip" | "include" => directive
                .arguments
                .iter()
                .find(|(name, _)| name == "if")
                .map(|(_, value)| value),
            _ => {
                remaining.push(directive);
                continue;
            }
        };
        let Some(GqlValue::Boolean(condition)) = condition else {
            return Err(StrataQLError::Validation {
                message: format!("@{} requires a boolean 'if' argument", directive.name),
                path:    None,
            });
        };
        let excluded = match directive.name.as_str() {
            "skip" => *condition,
            _ => !condition,
        };
        if excluded {
            return Ok(None);
        }
    }
    Ok(Some(remaining))
}

fn inline_value(
    cx: &NormalizeCx<'_, '_, '_>,
    value: &GqlValue<'_, String>,
) -> Result<GqlValue<'static, String>> {
    match value {
        GqlValue::Variable(name) => {
            let Some(json) = cx.variables.get(name) else {
                return Err(StrataQLError::Validation {
                    message: format!("variable '${name}' is not defined"),
                    path:    None,
                });
            };
            Ok(match cx.variable_types.get(name) {
                Some(type_name) => from_json_typed(json, type_name, cx.schema),
                None => from_json(json),
            })
        }
        GqlValue::List(list) => Ok(GqlValue::List(
            list.iter()
                .map(|item| inline_value(cx, item))
                .collect::<Result<Vec<_>>>()?,
        )),
        GqlValue::Object(map) => {
            let converted = map
                .iter()
                .map(|(key, item)| Ok((key.clone(), inline_value(cx, item)?)))
                .collect::<Result<std::collections::BTreeMap<_, _>>>()?;
            Ok(GqlValue::Object(converted))
        }
        // Enum literals must not collapse into strings on the way through JSON.
        GqlValue::Enum(name) => Ok(GqlValue::Enum(name.clone())),
        literal => Ok(from_json(&to_json(literal)?)),
    }
}

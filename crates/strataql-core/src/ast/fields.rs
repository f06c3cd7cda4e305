//! Fragment-aware child field iteration.
//!
//! Yields only field nodes from a selection set: inline fragments are
//! flattened in place and named spreads are resolved through the document's
//! fragment table. Resolution is depth-limited and cycle-safe, matching the
//! guarantees the normaliser enforces when it inlines fragments for real.

use std::collections::{HashMap, HashSet};

use graphql_parser::query::{
    Definition, Document, Field, FragmentDefinition, Selection, SelectionSet,
};
use tracing::debug;

/// Fragment resolution depth limit. Documents nested deeper than this are
/// degenerate and have already been rejected by the normaliser.
const MAX_FRAGMENT_DEPTH: u32 = 16;

/// Lookup table of the fragment definitions in one document.
#[derive(Debug)]
pub struct FragmentTable<'d, 'a> {
    fragments: HashMap<&'d str, &'d FragmentDefinition<'a, String>>,
}

impl<'d, 'a> FragmentTable<'d, 'a> {
    /// Collect the fragment definitions of a document.
    #[must_use]
    pub fn from_document(document: &'d Document<'a, String>) -> Self {
        let fragments = document
            .definitions
            .iter()
            .filter_map(|definition| match definition {
                Definition::Fragment(fragment) => Some((fragment.name.as_str(), fragment)),
                Definition::Operation(_) => None,
            })
            .collect();
        Self { fragments }
    }

    /// Look up a fragment definition by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'d FragmentDefinition<'a, String>> {
        self.fragments.get(name).copied()
    }

    /// Number of fragments in the document.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Whether the document defines no fragments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// The field nodes of a selection set, fragments flattened.
///
/// Spreads naming unknown fragments are skipped (the parser has already
/// rejected such documents; this keeps walks over foreign ASTs total).
#[must_use]
pub fn child_fields<'d, 'a>(
    selection_set: &'d SelectionSet<'a, String>,
    fragments: &FragmentTable<'d, 'a>,
) -> Vec<&'d Field<'a, String>> {
    let mut out = Vec::new();
    let mut visited = HashSet::new();
    collect(selection_set, fragments, &mut out, &mut visited, 0);
    out
}

fn collect<'d, 'a>(
    selection_set: &'d SelectionSet<'a, String>,
    fragments: &FragmentTable<'d, 'a>,
    out: &mut Vec<&'d Field<'a, String>>,
    visited: &mut HashSet<&'d str>,
    depth: u32,
) {
    if depth > MAX_FRAGMENT_DEPTH {
        debug!(depth, "fragment depth limit reached during field iteration");
        return;
    }
    for selection in &selection_set.items {
        match selection {
            Selection::Field(field) => out.push(field),
            Selection::InlineFragment(inline) => {
                collect(&inline.selection_set, fragments, out, visited, depth + 1);
            }
            Selection::FragmentSpread(spread) => {
                let name = spread.fragment_name.as_str();
                if !visited.insert(name) {
                    continue;
                }
                if let Some(fragment) = fragments.get(name) {
                    collect(&fragment.selection_set, fragments, out, visited, depth + 1);
                } else {
                    debug!(fragment = name, "skipping spread of unknown fragment");
                }
                visited.remove(name);
            }
        }
    }
}

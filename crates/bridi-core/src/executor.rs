//! # Query Execution
//!
//! Top-level evaluation of a compiled `Query`:
//!
//! 1. Expand the start selectors into ids (explicit lists, or every id of a
//!    kind read from the existence index)
//! 2. Per start entity: existence check, capability check, top-level filters
//! 3. Evaluate the output map against each surviving entity
//!
//! Entities failing any check are dropped silently; the caller always gets
//! a best-effort row list.

use crate::capability::Capability;
use crate::document::EntityDoc;
use crate::field::FieldResolver;
use crate::index::RelationshipIndex;
use crate::query::{Filter, OutputSpec, Projection, Query, StartSelector};
use crate::resolve::ResolveDirective;
use crate::store::EntityStore;
use crate::traversal::TraversalEngine;
use crate::types::{EntityId, UserId};
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;

/// One output object.
pub type Row = serde_json::Map<String, JsonValue>;

/// Everything a query evaluation reads.
#[derive(Clone, Copy)]
pub struct QueryContext<'a> {
    pub store: &'a EntityStore,
    pub capability: &'a dyn Capability,
    pub user: Option<&'a UserId>,
}

impl<'a> QueryContext<'a> {
    #[must_use]
    pub fn new(
        store: &'a EntityStore,
        capability: &'a dyn Capability,
        user: Option<&'a UserId>,
    ) -> Self {
        Self {
            store,
            capability,
            user,
        }
    }

    #[must_use]
    pub fn can_read(&self, entity: &EntityDoc) -> bool {
        self.capability.can_read(self.user, &entity.access())
    }
}

/// Stateless namespace for query execution.
pub struct Executor;

impl Executor {
    /// Run a compiled query.
    pub fn execute(ctx: &QueryContext<'_>, query: &Query) -> Vec<Row> {
        if query.start.is_empty() {
            tracing::warn!("query selects no starting entities");
        }

        let mut rows = Vec::new();
        for id in Self::start_ids(ctx.store, &query.start) {
            if !RelationshipIndex::exists_entity(ctx.store, &id) {
                tracing::debug!(entity = %id, "start entity not in existence index, skipped");
                continue;
            }
            let Some(entity) = ctx.store.get(&id) else {
                tracing::debug!(entity = %id, "start entity indexed but not stored, skipped");
                continue;
            };
            if !ctx.can_read(entity) {
                tracing::debug!(entity = %id, "start entity not readable, skipped");
                continue;
            }
            if !filters_pass(ctx, entity, &query.filters) {
                continue;
            }
            rows.push(evaluate_map(ctx, entity, &query.map));
        }
        rows
    }

    /// Expand start selectors into ids, first occurrence wins.
    pub fn start_ids(store: &EntityStore, selectors: &[StartSelector]) -> Vec<EntityId> {
        let mut seen = BTreeSet::new();
        let mut ids = Vec::new();
        for selector in selectors {
            let expanded = match selector {
                StartSelector::Ids(ids) => ids.clone(),
                StartSelector::IdsOf(ids, kind) => ids
                    .iter()
                    .filter(|id| {
                        let matches = store.get(id).is_some_and(|doc| doc.kind() == *kind);
                        if !matches {
                            tracing::debug!(
                                entity = %id,
                                kind = %kind,
                                "start id not of selected kind, skipped"
                            );
                        }
                        matches
                    })
                    .cloned()
                    .collect(),
                StartSelector::AllOf(kind) => RelationshipIndex::ids_of_kind(store, *kind),
            };
            for id in expanded {
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
        }
        ids
    }
}

// =============================================================================
// SHARED EVALUATION
// =============================================================================

/// True when every filter holds for `entity`.
pub(crate) fn filters_pass(
    ctx: &QueryContext<'_>,
    entity: &EntityDoc,
    filters: &[Filter],
) -> bool {
    filters.iter().all(|filter| {
        let actual = FieldResolver::resolve_in(ctx.store, entity, &filter.path);
        filter.condition.matches(actual.as_ref())
    })
}

/// Evaluate an output map against one entity.
pub(crate) fn evaluate_map(ctx: &QueryContext<'_>, entity: &EntityDoc, spec: &OutputSpec) -> Row {
    spec.iter()
        .map(|(key, value)| (key.clone(), evaluate_projection(ctx, entity, &value.projection)))
        .collect()
}

/// Evaluate one projection against one entity. Absent values become `null`.
pub(crate) fn evaluate_projection(
    ctx: &QueryContext<'_>,
    entity: &EntityDoc,
    projection: &Projection,
) -> JsonValue {
    match projection {
        Projection::Field(path) => {
            FieldResolver::resolve_in(ctx.store, entity, path).unwrap_or(JsonValue::Null)
        }
        Projection::Map(spec) => JsonValue::Object(evaluate_map(ctx, entity, spec)),
        Projection::Traverse(traversal) => {
            TraversalEngine::traverse(ctx, entity, traversal).into_value()
        }
        Projection::Resolve(resolve) => ResolveDirective::apply(ctx, entity, resolve)
            .map(JsonValue::Object)
            .unwrap_or(JsonValue::Null),
        Projection::BoundId => JsonValue::String(entity.id().0.clone()),
    }
}

// =============================================================================
// TESTS
// =============================================================================

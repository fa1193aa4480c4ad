//! # Traversal Engine
//!
//! Follows relation instances from a source entity through the relationship
//! index. For a `traverse` directive on source `s`:
//!
//! 1. Candidates come from `lookup(relation_type, role, s)`; a miss means
//!    no candidates, never a scan.
//! 2. Each candidate's binding is re-read. A candidate whose relation type
//!    or role binding disagrees with the key is an index inconsistency and
//!    is skipped.
//! 3. `whereRelated` filters are checked against the entities bound at
//!    their places; a missing bound entity fails the filter.
//! 4. Each output key is projected from the entity bound at its `place`.
//!
//! Only non-empty output objects are kept. With `first` cardinality the
//! walk stops at the first kept object, so it always equals element 0 of
//! the `array` result.
//!
//! Traversal targets are not checked against the capability policy; only
//! start entities and `resolve` targets are.

use crate::document::EntityDoc;
use crate::executor::{QueryContext, Row, evaluate_projection, filters_pass};
use crate::index::RelationshipIndex;
use crate::query::{Cardinality, Traversal};
use crate::types::EntityId;
use serde_json::Value as JsonValue;
use std::slice;

/// Output of one traversal, shaped by its cardinality.
#[derive(Debug, Clone, PartialEq)]
pub enum TraversalResult {
    Many(Vec<Row>),
    One(Option<Row>),
}

impl TraversalResult {
    /// JSON form. A `first` result with exactly one key is unwrapped to that
    /// key's value.
    #[must_use]
    pub fn into_value(self) -> JsonValue {
        match self {
            TraversalResult::Many(rows) => {
                JsonValue::Array(rows.into_iter().map(JsonValue::Object).collect())
            }
            TraversalResult::One(None) => JsonValue::Null,
            TraversalResult::One(Some(mut row)) => {
                if row.len() == 1 {
                    let key = row.keys().next().cloned().unwrap_or_default();
                    row.remove(&key).unwrap_or(JsonValue::Null)
                } else {
                    JsonValue::Object(row)
                }
            }
        }
    }
}

/// Stateless namespace for relation traversal.
pub struct TraversalEngine;

impl TraversalEngine {
    pub fn traverse(
        ctx: &QueryContext<'_>,
        source: &EntityDoc,
        traversal: &Traversal,
    ) -> TraversalResult {
        let candidates = RelationshipIndex::lookup(
            ctx.store,
            &traversal.relation_type,
            traversal.role,
            source.id(),
        )
        .unwrap_or_default();

        let mut rows = Vec::new();
        for instance_id in &candidates {
            let Some(row) = Self::project_instance(ctx, source, traversal, instance_id) else {
                continue;
            };
            if row.is_empty() {
                continue;
            }
            if traversal.cardinality == Cardinality::First {
                return TraversalResult::One(Some(row));
            }
            rows.push(row);
        }

        match traversal.cardinality {
            Cardinality::First => TraversalResult::One(None),
            Cardinality::Array => TraversalResult::Many(rows),
        }
    }

    /// Project one relation instance, or `None` when it is skipped.
    fn project_instance(
        ctx: &QueryContext<'_>,
        source: &EntityDoc,
        traversal: &Traversal,
        instance_id: &EntityId,
    ) -> Option<Row> {
        let Some(instance) = ctx.store.get(instance_id) else {
            tracing::warn!(instance = %instance_id, "index refers to a missing relation instance");
            return None;
        };
        let Some(binding) = instance.binding() else {
            tracing::warn!(instance = %instance_id, "indexed relation instance has no binding");
            return None;
        };
        if binding.relation_type != traversal.relation_type
            || binding.bound(traversal.role) != Some(source.id())
        {
            tracing::warn!(
                instance = %instance_id,
                relation_type = %traversal.relation_type,
                role = %traversal.role,
                source = %source.id(),
                "index inconsistency: binding does not match key, skipped"
            );
            return None;
        }

        for related in &traversal.where_related {
            let passes = binding
                .bound(related.place)
                .and_then(|id| ctx.store.get(id))
                .is_some_and(|bound| filters_pass(ctx, bound, slice::from_ref(&related.filter)));
            if !passes {
                return None;
            }
        }

        let row = traversal
            .map
            .iter()
            .map(|(key, spec)| {
                let value = spec
                    .place
                    .and_then(|role| binding.bound(role))
                    .and_then(|id| ctx.store.get(id))
                    .map(|bound| evaluate_projection(ctx, bound, &spec.projection))
                    .unwrap_or(JsonValue::Null);
                (key.clone(), value)
            })
            .collect();
        Some(row)
    }
}

// =============================================================================
// TESTS
// =============================================================================

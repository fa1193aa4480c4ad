//! # Resolve Directive
//!
//! Dereferences an id stored in a field: `resolve { fromField, map }` reads
//! `fromField` on the current entity, treats the string found there as an
//! entity id, and evaluates `map` against that entity.
//!
//! The result is absent when the field is missing or not a string, the id
//! is not in the existence index, or the target is not readable by the
//! acting user.

use crate::document::EntityDoc;
use crate::executor::{QueryContext, Row, evaluate_map};
use crate::field::FieldResolver;
use crate::index::RelationshipIndex;
use crate::query::Resolve;
use crate::types::EntityId;
use serde_json::Value as JsonValue;

/// Stateless namespace for id dereferencing.
pub struct ResolveDirective;

impl ResolveDirective {
    pub fn apply(ctx: &QueryContext<'_>, source: &EntityDoc, resolve: &Resolve) -> Option<Row> {
        let JsonValue::String(raw) = FieldResolver::resolve_in(ctx.store, source, &resolve.from_field)?
        else {
            tracing::debug!(
                entity = %source.id(),
                field = %resolve.from_field,
                "resolve field is not an id string"
            );
            return None;
        };

        let target_id = EntityId(raw);
        if !RelationshipIndex::exists_entity(ctx.store, &target_id) {
            tracing::debug!(target = %target_id, "resolve target does not exist");
            return None;
        }
        let target = ctx.store.get(&target_id)?;
        if !ctx.can_read(target) {
            tracing::debug!(target = %target_id, "resolve target not readable");
            return None;
        }

        Some(evaluate_map(ctx, target, &resolve.map))
    }
}

// =============================================================================
// TESTS
// =============================================================================

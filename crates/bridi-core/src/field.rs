//! # Field Resolver
//!
//! Walks a `FieldPath` into an entity's classification or payload.
//!
//! Descent rules per current value:
//! - map container: the segment is a key
//! - list container: the segment must be an index
//! - text container: a leaf; its string is returned only when the path ends
//! - plain value (scalar or already materialized JSON): ordinary access
//!
//! Any mismatch yields `None`. Containers left at the end of the path are
//! returned as detached JSON snapshots.
//!
//! Entities named through a property relation to a text label must be read
//! through that relation: inside a query their
//! `self.classification.displayName` resolves to `None` with a warning.

use crate::document::{EntityDoc, materialize, value_to_json};
use crate::index::RelationshipIndex;
use crate::path::{FieldPath, PathBase, Segment};
use crate::primitives::PROPERTY_RELATION_TYPE;
use crate::store::EntityStore;
use crate::types::{EntityId, PayloadKind, Role};
use automerge::{AutoCommit, ObjId, ObjType, Prop, ReadDoc, Value};
use serde_json::Value as JsonValue;

/// Position reached while walking a path.
enum Cursor {
    Container(ObjId, ObjType),
    Plain(JsonValue),
}

/// Stateless namespace for path resolution.
pub struct FieldResolver;

impl FieldResolver {
    /// Resolve `path` against `entity`. Never fails; `None` means absent.
    pub fn resolve(entity: &EntityDoc, path: &FieldPath) -> Option<JsonValue> {
        let doc = entity.doc();
        let start = match path.base() {
            PathBase::DocId => return Some(JsonValue::String(entity.id().0.clone())),
            PathBase::Classification => {
                Cursor::Container(entity.classification_obj()?, ObjType::Map)
            }
            PathBase::Payload => {
                let (obj, ty) = entity.payload_obj()?;
                Cursor::Container(obj, ty)
            }
        };

        let mut cursor = start;
        for segment in path.segments() {
            cursor = step(doc, cursor, segment)?;
        }

        Some(match cursor {
            Cursor::Container(obj, ty) => materialize(doc, &obj, ty),
            Cursor::Plain(value) => value,
        })
    }

    /// Resolve `path` against `entity` within `store`, refusing the display
    /// name of an entity that has a name relation.
    pub fn resolve_in(
        store: &EntityStore,
        entity: &EntityDoc,
        path: &FieldPath,
    ) -> Option<JsonValue> {
        let label = path
            .is_display_name()
            .then(|| Self::name_label(store, entity.id()))
            .flatten();
        if let Some(label) = label {
            tracing::warn!(
                entity = %entity.id(),
                label = %label,
                "display name read via classification; traverse to the name relation instead"
            );
            return None;
        }
        Self::resolve(entity, path)
    }

    /// The text label bound at x2 of a property relation on `entity`, when
    /// that label carries a display name.
    pub fn name_label(store: &EntityStore, entity: &EntityId) -> Option<EntityId> {
        let property = EntityId::from(PROPERTY_RELATION_TYPE);
        RelationshipIndex::lookup(store, &property, Role::X1, entity)?
            .iter()
            .filter_map(|instance| store.get(instance)?.binding())
            .filter(|binding| binding.relation_type == property)
            .filter(|binding| binding.bound(Role::X1) == Some(entity))
            .filter_map(|binding| binding.bound(Role::X2).cloned())
            .find(|target| {
                store.get(target).is_some_and(|label| {
                    label.payload_kind() == PayloadKind::Text
                        && label.classification().display_name.is_some()
                })
            })
    }
}

fn step(doc: &AutoCommit, cursor: Cursor, segment: &Segment) -> Option<Cursor> {
    match cursor {
        Cursor::Container(obj, ObjType::Map | ObjType::Table) => {
            child(doc, &obj, Prop::Map(segment.key()))
        }
        Cursor::Container(obj, ObjType::List) => match segment {
            Segment::Index(i) => child(doc, &obj, Prop::Seq(*i)),
            Segment::Field(_) => None,
        },
        Cursor::Container(_, ObjType::Text) => None,
        Cursor::Plain(value) => {
            let next = match (value, segment) {
                (JsonValue::Object(mut map), segment) => map.remove(&segment.key()),
                (JsonValue::Array(mut items), Segment::Index(i)) if *i < items.len() => {
                    Some(items.swap_remove(*i))
                }
                _ => None,
            };
            next.map(Cursor::Plain)
        }
    }
}

fn child(doc: &AutoCommit, obj: &ObjId, prop: Prop) -> Option<Cursor> {
    match doc.get(obj, prop) {
        Ok(Some((Value::Object(ty), id))) => Some(Cursor::Container(id, ty)),
        Ok(Some((value @ Value::Scalar(_), id))) => {
            Some(Cursor::Plain(value_to_json(doc, value, &id)))
        }
        Ok(None) => None,
        Err(e) => {
            tracing::debug!(error = %e, "field lookup failed");
            None
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SemanticGraph;
    use crate::types::{
        Classification, EntityId, Kind, Payload, RelationBinding, Role, TreeNode, UserId,
    };
    use automerge::ActorId;
    use serde_json::json;

    fn entity(id: &str, classification: Classification, payload: Payload) -> EntityDoc {
        EntityDoc::create(
            EntityId::from(id),
            &classification,
            &payload,
            UserId::new("genesis"),
            ActorId::from(vec![7u8; 16]),
        )
        .expect("create")
    }

    fn map_entity() -> EntityDoc {
        let JsonValue::Object(map) = json!({
            "title": "Plan",
            "steps": [{"name": "draft"}, {"name": "review"}],
            "count": 2
        }) else {
            unreachable!()
        };
        entity("@plan", Classification::new(Kind::Concept), Payload::Map(map))
    }

    fn resolve(entity: &EntityDoc, path: &str) -> Option<JsonValue> {
        FieldResolver::resolve(entity, &FieldPath::parse(path).expect("path"))
    }

    #[test]
    fn doc_id_needs_no_payload() {
        let e = entity("@task1", Classification::new(Kind::Concept), Payload::Concept);
        assert_eq!(resolve(&e, "doc.id"), Some(json!("@task1")));
    }

    #[test]
    fn map_keys_and_list_indexes() {
        let e = map_entity();
        assert_eq!(resolve(&e, "self.payload.title"), Some(json!("Plan")));
        assert_eq!(resolve(&e, "self.payload.count"), Some(json!(2)));
        assert_eq!(resolve(&e, "self.payload.steps.1.name"), Some(json!("review")));
    }

    #[test]
    fn mismatches_are_absent() {
        let e = map_entity();
        assert_eq!(resolve(&e, "self.payload.missing"), None);
        assert_eq!(resolve(&e, "self.payload.steps.9"), None);
        assert_eq!(resolve(&e, "self.payload.steps.name"), None);
        assert_eq!(resolve(&e, "self.payload.title.length"), None);
    }

    #[test]
    fn terminal_containers_are_detached() {
        let e = map_entity();
        assert_eq!(
            resolve(&e, "self.payload.steps"),
            Some(json!([{"name": "draft"}, {"name": "review"}]))
        );
        assert_eq!(resolve(&e, "self.payload.steps.0"), Some(json!({"name": "draft"})));
    }

    #[test]
    fn text_is_a_leaf() {
        let e = entity(
            "@person1_name",
            Classification::new(Kind::Concept).with_display_name("Person 1 Name"),
            Payload::Text("Alice".to_string()),
        );
        assert_eq!(resolve(&e, "self.payload"), Some(json!("Alice")));
        assert_eq!(resolve(&e, "self.payload.0"), None);
        assert_eq!(
            resolve(&e, "self.classification.displayName"),
            Some(json!("Person 1 Name"))
        );
    }

    #[test]
    fn unnamed_display_name_is_readable() {
        let e = entity(
            "@person9",
            Classification::new(Kind::Concept).with_display_name("Dana"),
            Payload::Concept,
        );
        assert_eq!(resolve(&e, "self.classification.displayName"), Some(json!("Dana")));
        assert_eq!(resolve(&e, "self.classification.kind"), Some(json!("Concept")));
        assert_eq!(resolve(&e, "self.payload"), None);
    }

    #[test]
    fn named_entity_display_name_is_refused() {
        let mut graph = SemanticGraph::seeded().expect("seed");
        let genesis = UserId::new("genesis");
        graph
            .put_entity(
                EntityId::from("@person9"),
                &Classification::new(Kind::Concept).with_display_name("Dana"),
                &Payload::Concept,
                genesis.clone(),
            )
            .expect("person");
        let display_name = FieldPath::parse("self.classification.displayName").expect("path");
        let store = graph.store();
        let person = store.get(&EntityId::from("@person9")).expect("person");
        assert_eq!(
            FieldResolver::resolve_in(store, person, &display_name),
            Some(json!("Dana"))
        );

        graph
            .put_entity(
                EntityId::from("@person9_name"),
                &Classification::new(Kind::Concept).with_display_name("Person 9 Name"),
                &Payload::Text("Dana".to_string()),
                genesis.clone(),
            )
            .expect("label");
        graph
            .put_relation(
                EntityId::from("@bridi_person9_ckaji_name"),
                &RelationBinding::new("@ckaji")
                    .bind(Role::X1, "@person9")
                    .bind(Role::X2, "@person9_name"),
                genesis,
            )
            .expect("name relation");

        let store = graph.store();
        let person = store.get(&EntityId::from("@person9")).expect("person");
        assert_eq!(
            FieldResolver::name_label(store, person.id()),
            Some(EntityId::from("@person9_name"))
        );
        assert_eq!(FieldResolver::resolve_in(store, person, &display_name), None);
        assert_eq!(
            FieldResolver::resolve_in(
                store,
                person,
                &FieldPath::parse("self.classification.kind").expect("path")
            ),
            Some(json!("Concept"))
        );

        // The label itself is not named and keeps its display name.
        let label = store.get(&EntityId::from("@person9_name")).expect("label");
        assert_eq!(
            FieldResolver::resolve_in(store, label, &display_name),
            Some(json!("Person 9 Name"))
        );
    }

    #[test]
    fn property_values_are_not_names() {
        let graph = SemanticGraph::seeded().expect("seed");
        // @task1's status value has no display name, its label has one.
        assert_eq!(
            FieldResolver::name_label(graph.store(), &EntityId::from("@task1")),
            Some(EntityId::from("@task1_name"))
        );
        assert_eq!(
            FieldResolver::name_label(graph.store(), &EntityId::from("@status_inprogress")),
            None
        );
    }

    #[test]
    fn tree_paths() {
        let tree = TreeNode {
            value: json!("root"),
            children: vec![TreeNode {
                value: json!({"label": "child"}),
                children: vec![],
            }],
        };
        let e = entity("@outline", Classification::new(Kind::Concept), Payload::Tree(tree));
        assert_eq!(resolve(&e, "self.payload.value"), Some(json!("root")));
        assert_eq!(
            resolve(&e, "self.payload.children.0.value.label"),
            Some(json!("child"))
        );
        assert_eq!(resolve(&e, "self.payload.children.1"), None);
    }

    #[test]
    fn relation_binding_paths() {
        let binding = crate::types::RelationBinding::new("@gunka")
            .bind(crate::types::Role::X1, "@person2");
        let e = entity(
            "@bridi_gunka_task1",
            Classification::new(Kind::Relation),
            Payload::binding(&binding),
        );
        assert_eq!(resolve(&e, "self.payload.relationType"), Some(json!("@gunka")));
        assert_eq!(resolve(&e, "self.payload.roles.x1"), Some(json!("@person2")));
        assert_eq!(resolve(&e, "self.payload.roles.x2"), None);
    }
}

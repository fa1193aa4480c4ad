//! # Relationship Index
//!
//! Three derived documents that keep the graph query-ready:
//!
//! - `@index_entities`: entity id -> kind marker
//! - `@index_relation_types`: relation type id -> kind marker
//! - `@index_relations`: `"<relationTypeId>:<role>:<entityId>"` -> list of
//!   relation instance ids binding that entity at that role
//!
//! The index is append-only. Entries are never removed or rewritten; an
//! index miss means "no such relationship" and never falls back to a scan.
//! The only fatal condition is a non-list value under a composite key.

use crate::document::{EntityDoc, get_obj};
use crate::primitives::{ENTITY_INDEX_ID, RELATION_INDEX_ID, RELATION_TYPE_INDEX_ID};
use crate::store::EntityStore;
use crate::types::{Classification, EntityId, GraphError, Kind, Payload, Role, UserId};
use automerge::transaction::Transactable;
use automerge::{AutoCommit, ObjId, ObjType, Prop, ReadDoc, ScalarValue, Value};
use std::collections::BTreeSet;

/// Counts reported by a full index build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub entities: usize,
    pub relation_types: usize,
    pub relation_instances: usize,
    /// Composite-key entries appended (existing entries are not counted).
    pub entries_added: usize,
}

/// Stateless namespace for index operations over an `EntityStore`.
pub struct RelationshipIndex;

impl RelationshipIndex {
    /// The ids of the three index documents.
    #[must_use]
    pub fn document_ids() -> [EntityId; 3] {
        [
            EntityId::from(ENTITY_INDEX_ID),
            EntityId::from(RELATION_TYPE_INDEX_ID),
            EntityId::from(RELATION_INDEX_ID),
        ]
    }

    /// Composite key `"<relationTypeId>:<role>:<entityId>"`.
    #[must_use]
    pub fn composite_key(relation_type: &EntityId, role: Role, entity: &EntityId) -> String {
        format!("{}:{}:{}", relation_type, role, entity)
    }

    /// Create any missing index document. Returns the ids created.
    pub fn install(store: &mut EntityStore, owner: &UserId) -> Result<Vec<EntityId>, GraphError> {
        let mut created = Vec::new();
        for id in Self::document_ids() {
            if !store.contains(&id) {
                store.put(
                    id.clone(),
                    &Classification::new(Kind::Index),
                    &Payload::Map(serde_json::Map::new()),
                    owner.clone(),
                )?;
                created.push(id);
            }
        }
        Ok(created)
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Return the list container at `key`, creating it if absent.
    ///
    /// Fails with `SchemaConflict` when `key` already holds anything else.
    pub fn ensure_list_at(
        doc: &mut AutoCommit,
        map: &ObjId,
        key: &str,
    ) -> Result<ObjId, GraphError> {
        let existing = doc
            .get(map, key)?
            .map(|(value, id)| (matches!(value, Value::Object(ObjType::List)), id));
        match existing {
            Some((true, list)) => Ok(list),
            Some((false, _)) => {
                tracing::error!(key, "index schema conflict: expected list");
                Err(GraphError::SchemaConflict {
                    key: key.to_string(),
                })
            }
            None => Ok(doc.put_object(map, key, ObjType::List)?),
        }
    }

    /// Record an entity in the existence indexes. Returns the index
    /// documents that changed.
    pub fn index_entity(
        store: &mut EntityStore,
        id: &EntityId,
        kind: Kind,
    ) -> Result<Vec<EntityId>, GraphError> {
        let mut changed = Vec::new();
        if kind == Kind::Index {
            return Ok(changed);
        }
        if mark(store, ENTITY_INDEX_ID, id, kind)? {
            changed.push(EntityId::from(ENTITY_INDEX_ID));
        }
        if kind == Kind::RelationType && mark(store, RELATION_TYPE_INDEX_ID, id, kind)? {
            changed.push(EntityId::from(RELATION_TYPE_INDEX_ID));
        }
        Ok(changed)
    }

    /// Append a relation instance under every role it binds.
    ///
    /// Set-like: an id already in a key's list is not appended again.
    /// Returns the number of entries actually appended.
    pub fn index_relation_instance(
        store: &mut EntityStore,
        id: &EntityId,
    ) -> Result<usize, GraphError> {
        let Some(binding) = store.get(id).and_then(EntityDoc::binding) else {
            tracing::warn!(relation = %id, "relation instance has no binding payload, not indexed");
            return Ok(0);
        };

        let (doc, map) = index_map_mut(store, RELATION_INDEX_ID)?;
        let mut added = 0;
        for (role, bound) in &binding.roles {
            let key = Self::composite_key(&binding.relation_type, *role, bound);
            let list = Self::ensure_list_at(doc, &map, &key)?;
            let len = doc.length(&list);
            let present =
                (0..len).any(|i| str_at(doc, &list, i).as_deref() == Some(id.as_str()));
            if !present {
                doc.insert(&list, len, id.as_str())?;
                added += 1;
                tracing::debug!(key = %key, relation = %id, "index entry added");
            }
        }
        Ok(added)
    }

    /// Build the index from every entity in the store.
    ///
    /// O(E + 5R): one existence write per entity, one append per bound role.
    pub fn build(store: &mut EntityStore, owner: &UserId) -> Result<IndexStats, GraphError> {
        Self::install(store, owner)?;

        let mut stats = IndexStats::default();
        let entities: Vec<(EntityId, Kind)> = [Kind::Concept, Kind::RelationType, Kind::Relation]
            .into_iter()
            .flat_map(|kind| {
                store
                    .get_all(kind)
                    .into_iter()
                    .map(move |doc| (doc.id().clone(), kind))
            })
            .collect();

        for (id, kind) in &entities {
            Self::index_entity(store, id, *kind)?;
            stats.entities += 1;
            if *kind == Kind::RelationType {
                stats.relation_types += 1;
            }
        }
        for (id, _) in entities.iter().filter(|(_, kind)| *kind == Kind::Relation) {
            stats.entries_added += Self::index_relation_instance(store, id)?;
            stats.relation_instances += 1;
        }

        tracing::info!(
            entities = stats.entities,
            relation_types = stats.relation_types,
            relation_instances = stats.relation_instances,
            entries_added = stats.entries_added,
            "relationship index built"
        );
        Ok(stats)
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Relation instance ids binding `entity` at `role` under `relation_type`.
    ///
    /// `None` on an index miss.
    pub fn lookup(
        store: &EntityStore,
        relation_type: &EntityId,
        role: Role,
        entity: &EntityId,
    ) -> Option<Vec<EntityId>> {
        let key = Self::composite_key(relation_type, role, entity);
        let (doc, map) = index_map(store, RELATION_INDEX_ID)?;
        match get_obj(doc.doc(), &map, &key) {
            Some((list, ObjType::List)) => {
                let len = doc.doc().length(&list);
                let ids = (0..len)
                    .filter_map(|i| str_at(doc.doc(), &list, i))
                    .map(EntityId)
                    .collect();
                tracing::debug!(key = %key, "index hit");
                Some(ids)
            }
            Some(_) => {
                tracing::warn!(key = %key, "index entry is not a list, treating as miss");
                None
            }
            None => {
                tracing::debug!(key = %key, "index miss");
                None
            }
        }
    }

    #[must_use]
    pub fn exists_entity(store: &EntityStore, id: &EntityId) -> bool {
        marker(store, ENTITY_INDEX_ID, id).is_some()
    }

    #[must_use]
    pub fn exists_relation_type(store: &EntityStore, id: &EntityId) -> bool {
        marker(store, RELATION_TYPE_INDEX_ID, id).is_some()
    }

    /// All ids of a kind, read from the existence indexes only.
    pub fn ids_of_kind(store: &EntityStore, kind: Kind) -> Vec<EntityId> {
        let index_id = if kind == Kind::RelationType {
            RELATION_TYPE_INDEX_ID
        } else {
            ENTITY_INDEX_ID
        };
        let Some((doc, map)) = index_map(store, index_id) else {
            return Vec::new();
        };
        doc.doc()
            .keys(&map)
            .filter(|key| {
                str_at(doc.doc(), &map, key.as_str()).as_deref() == Some(kind.as_str())
            })
            .map(EntityId)
            .collect()
    }

    /// Relation instances of `relation_type` binding `entity` at any role.
    ///
    /// Each instance appears once, with the first role it was found at.
    pub fn find_involving(
        store: &EntityStore,
        relation_type: &EntityId,
        entity: &EntityId,
    ) -> Vec<(EntityId, Role)> {
        let mut seen = BTreeSet::new();
        let mut found = Vec::new();
        for role in Role::ALL {
            for id in Self::lookup(store, relation_type, role, entity).unwrap_or_default() {
                if seen.insert(id.clone()) {
                    found.push((id, role));
                }
            }
        }
        found
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn str_at(doc: &AutoCommit, obj: &ObjId, prop: impl Into<Prop>) -> Option<String> {
    match doc.get(obj, prop) {
        Ok(Some((Value::Scalar(s), _))) => match s.as_ref() {
            ScalarValue::Str(s) => Some(s.to_string()),
            _ => None,
        },
        _ => None,
    }
}

fn index_map<'a>(store: &'a EntityStore, index_id: &str) -> Option<(&'a EntityDoc, ObjId)> {
    let doc = store.get(&EntityId::from(index_id))?;
    match doc.payload_obj() {
        Some((map, ObjType::Map)) => Some((doc, map)),
        _ => None,
    }
}

fn index_map_mut<'a>(
    store: &'a mut EntityStore,
    index_id: &str,
) -> Result<(&'a mut AutoCommit, ObjId), GraphError> {
    let id = EntityId::from(index_id);
    let doc = store
        .get_mut(&id)
        .ok_or_else(|| GraphError::EntityNotFound(id.clone()))?;
    match doc.payload_obj() {
        Some((map, ObjType::Map)) => Ok((doc.doc_mut(), map)),
        _ => Err(GraphError::SchemaConflict {
            key: index_id.to_string(),
        }),
    }
}

fn marker(store: &EntityStore, index_id: &str, id: &EntityId) -> Option<String> {
    let (doc, map) = index_map(store, index_id)?;
    str_at(doc.doc(), &map, id.as_str())
}

/// Set the kind marker of `id`. `false` when it was already set.
fn mark(
    store: &mut EntityStore,
    index_id: &str,
    id: &EntityId,
    kind: Kind,
) -> Result<bool, GraphError> {
    if marker(store, index_id, id).as_deref() == Some(kind.as_str()) {
        return Ok(false);
    }
    let (doc, map) = index_map_mut(store, index_id)?;
    doc.put(&map, id.as_str(), kind.as_str())?;
    Ok(true)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RelationBinding;

    fn genesis() -> UserId {
        UserId::new("genesis")
    }

    fn store_with_index() -> EntityStore {
        let mut store = EntityStore::new();
        RelationshipIndex::install(&mut store, &genesis()).expect("install");
        store
    }

    fn put_relation(store: &mut EntityStore, id: &str, binding: &RelationBinding) {
        store
            .put(
                EntityId::from(id),
                &Classification::new(Kind::Relation),
                &Payload::binding(binding),
                genesis(),
            )
            .expect("put relation");
    }

    fn gunka_task1() -> RelationBinding {
        RelationBinding::new("@gunka")
            .bind(Role::X1, "@person2")
            .bind(Role::X2, "@task1")
            .bind(Role::X3, "@project1")
    }

    #[test]
    fn composite_key_format() {
        let key = RelationshipIndex::composite_key(
            &EntityId::from("@zukte"),
            Role::X1,
            &EntityId::from("@person1"),
        );
        assert_eq!(key, "@zukte:x1:@person1");
    }

    #[test]
    fn install_is_idempotent() {
        let mut store = EntityStore::new();
        assert_eq!(
            RelationshipIndex::install(&mut store, &genesis())
                .expect("install")
                .len(),
            3
        );
        assert!(
            RelationshipIndex::install(&mut store, &genesis())
                .expect("install")
                .is_empty()
        );
    }

    #[test]
    fn indexing_twice_adds_nothing() {
        let mut store = store_with_index();
        put_relation(&mut store, "@bridi_gunka_task1", &gunka_task1());
        let id = EntityId::from("@bridi_gunka_task1");

        assert_eq!(
            RelationshipIndex::index_relation_instance(&mut store, &id).expect("index"),
            3
        );
        assert_eq!(
            RelationshipIndex::index_relation_instance(&mut store, &id).expect("index"),
            0
        );

        let hits = RelationshipIndex::lookup(
            &store,
            &EntityId::from("@gunka"),
            Role::X3,
            &EntityId::from("@project1"),
        )
        .expect("hit");
        assert_eq!(hits, vec![id]);
    }

    #[test]
    fn lookup_miss_is_none() {
        let mut store = store_with_index();
        put_relation(&mut store, "@bridi_gunka_task1", &gunka_task1());
        let id = EntityId::from("@bridi_gunka_task1");
        RelationshipIndex::index_relation_instance(&mut store, &id).expect("index");

        // Right entity, wrong role
        assert!(
            RelationshipIndex::lookup(
                &store,
                &EntityId::from("@gunka"),
                Role::X1,
                &EntityId::from("@project1"),
            )
            .is_none()
        );
    }

    #[test]
    fn ensure_list_at_rejects_scalar() {
        let mut store = store_with_index();
        let (doc, map) = index_map_mut(&mut store, RELATION_INDEX_ID).expect("index map");
        doc.put(&map, "@gunka:x1:@person2", "oops").expect("put scalar");

        let err = RelationshipIndex::ensure_list_at(doc, &map, "@gunka:x1:@person2")
            .expect_err("conflict");
        assert_eq!(
            err,
            GraphError::SchemaConflict {
                key: "@gunka:x1:@person2".to_string()
            }
        );
    }

    #[test]
    fn schema_conflict_aborts_indexing() {
        let mut store = store_with_index();
        {
            let (doc, map) = index_map_mut(&mut store, RELATION_INDEX_ID).expect("index map");
            doc.put(&map, "@gunka:x2:@task1", 1_i64).expect("put scalar");
        }
        put_relation(&mut store, "@bridi_gunka_task1", &gunka_task1());
        let result = RelationshipIndex::index_relation_instance(
            &mut store,
            &EntityId::from("@bridi_gunka_task1"),
        );
        assert!(matches!(result, Err(GraphError::SchemaConflict { .. })));
    }

    #[test]
    fn existence_and_kind_listing() {
        let mut store = store_with_index();
        for (id, kind) in [
            ("@task1", Kind::Concept),
            ("@gunka", Kind::RelationType),
            ("@person1", Kind::Concept),
        ] {
            RelationshipIndex::index_entity(&mut store, &EntityId::from(id), kind).expect("index");
        }

        assert!(RelationshipIndex::exists_entity(&store, &EntityId::from("@task1")));
        assert!(!RelationshipIndex::exists_entity(&store, &EntityId::from("@task9")));
        assert!(RelationshipIndex::exists_relation_type(&store, &EntityId::from("@gunka")));
        assert!(!RelationshipIndex::exists_relation_type(&store, &EntityId::from("@task1")));

        assert_eq!(
            RelationshipIndex::ids_of_kind(&store, Kind::Concept),
            vec![EntityId::from("@person1"), EntityId::from("@task1")]
        );
        assert_eq!(
            RelationshipIndex::ids_of_kind(&store, Kind::RelationType),
            vec![EntityId::from("@gunka")]
        );
    }

    #[test]
    fn find_involving_dedupes_across_roles() {
        let mut store = store_with_index();
        // Self-referential binding: same entity at two roles.
        let binding = RelationBinding::new("@ckaji")
            .bind(Role::X1, "@task1")
            .bind(Role::X2, "@task1");
        put_relation(&mut store, "@bridi_self", &binding);
        let id = EntityId::from("@bridi_self");
        RelationshipIndex::index_relation_instance(&mut store, &id).expect("index");

        let found = RelationshipIndex::find_involving(
            &store,
            &EntityId::from("@ckaji"),
            &EntityId::from("@task1"),
        );
        assert_eq!(found, vec![(EntityId::from("@bridi_self"), Role::X1)]);
    }

    #[test]
    fn build_counts_entities() {
        let mut store = EntityStore::new();
        store
            .put(
                EntityId::from("@gunka"),
                &Classification::new(Kind::RelationType),
                &Payload::role_descriptions([(Role::X1, "worker")]),
                genesis(),
            )
            .expect("put");
        store
            .put(
                EntityId::from("@project1"),
                &Classification::new(Kind::Concept),
                &Payload::Concept,
                genesis(),
            )
            .expect("put");
        put_relation(&mut store, "@bridi_gunka_task1", &gunka_task1());

        let stats = RelationshipIndex::build(&mut store, &genesis()).expect("build");
        assert_eq!(stats.entities, 3);
        assert_eq!(stats.relation_types, 1);
        assert_eq!(stats.relation_instances, 1);
        assert_eq!(stats.entries_added, 3);

        let again = RelationshipIndex::build(&mut store, &genesis()).expect("rebuild");
        assert_eq!(again.entries_added, 0);
    }
}

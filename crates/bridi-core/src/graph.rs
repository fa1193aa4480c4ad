//! # Semantic Graph
//!
//! The facade tying the entity store, the relationship index and the query
//! engine together. Every write goes through here so the index is updated
//! in the same mutation as the entity and both are committed together.
//!
//! ## Storage Backends
//!
//! - `SemanticGraph::new` / `seeded`: in-memory store
//! - `SemanticGraph::open`: redb-backed store, seeded on first open

use crate::capability::{Capability, OwnerPolicy};
use crate::document::EntityDoc;
use crate::executor::{Executor, QueryContext, Row};
use crate::index::RelationshipIndex;
use crate::primitives::{GENESIS_OWNER, RELATION_INDEX_ID};
use crate::query::{Query, QueryDef};
use crate::seed::SeedSet;
use crate::store::EntityStore;
use crate::types::{
    Classification, EntityId, GraphError, Kind, Payload, RelationBinding, Role, UserId,
};
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Counters reported by `status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub entities: usize,
    pub concepts: usize,
    pub relation_types: usize,
    pub relations: usize,
    pub revision: u64,
    pub persistent: bool,
}

/// Entity store, relationship index and read policy.
pub struct SemanticGraph {
    store: EntityStore,
    capability: Box<dyn Capability>,
    genesis_owner: UserId,
}

impl fmt::Debug for SemanticGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemanticGraph")
            .field("store", &self.store)
            .field("genesis_owner", &self.genesis_owner)
            .finish_non_exhaustive()
    }
}

impl SemanticGraph {
    /// Empty in-memory graph with the index documents installed.
    pub fn new() -> Result<Self, GraphError> {
        Self::with_store(EntityStore::new(), UserId::new(GENESIS_OWNER))
    }

    /// In-memory graph populated with the seed set.
    pub fn seeded() -> Result<Self, GraphError> {
        Self::seeded_for(UserId::new(GENESIS_OWNER))
    }

    /// In-memory seeded graph whose shared data belongs to `genesis_owner`.
    pub fn seeded_for(genesis_owner: UserId) -> Result<Self, GraphError> {
        let mut graph = Self::with_store(EntityStore::new(), genesis_owner)?;
        graph.load_seed()?;
        Ok(graph)
    }

    /// Wrap an existing store. Missing index documents are installed and
    /// built from the store's contents.
    pub fn with_store(mut store: EntityStore, genesis_owner: UserId) -> Result<Self, GraphError> {
        let installed = RelationshipIndex::install(&mut store, &genesis_owner)?;
        if !installed.is_empty() {
            RelationshipIndex::build(&mut store, &genesis_owner)?;
            store.commit(&RelationshipIndex::document_ids())?;
        }
        Ok(Self {
            store,
            capability: Box::new(OwnerPolicy::new(genesis_owner.clone())),
            genesis_owner,
        })
    }

    /// Open a persistent graph. A database without entities is seeded.
    pub fn open(path: impl AsRef<Path>, genesis_owner: UserId) -> Result<Self, GraphError> {
        let store = EntityStore::open(path)?;
        let fresh = store.is_empty();
        let mut graph = Self::with_store(store, genesis_owner)?;
        if fresh {
            graph.load_seed()?;
        }
        Ok(graph)
    }

    /// Replace the read policy.
    #[must_use]
    pub fn with_capability(mut self, capability: impl Capability + 'static) -> Self {
        self.capability = Box::new(capability);
        self
    }

    fn load_seed(&mut self) -> Result<(), GraphError> {
        let mut written = SeedSet::load(&mut self.store, &self.genesis_owner)?;
        RelationshipIndex::build(&mut self.store, &self.genesis_owner)?;
        written.extend(RelationshipIndex::document_ids());
        let revision = self.store.commit(&written)?;
        tracing::info!(entities = written.len(), revision, "graph seeded");
        Ok(())
    }

    // =========================================================================
    // READS
    // =========================================================================

    #[must_use]
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    #[must_use]
    pub fn genesis_owner(&self) -> &UserId {
        &self.genesis_owner
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.store.revision()
    }

    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<&EntityDoc> {
        self.store.get(id)
    }

    /// Fetch an entity on behalf of `user`; unreadable entities are absent.
    #[must_use]
    pub fn get_readable(&self, id: &EntityId, user: Option<&UserId>) -> Option<&EntityDoc> {
        self.store
            .get(id)
            .filter(|doc| self.capability.can_read(user, &doc.access()))
    }

    pub fn get_all(&self, kind: Kind) -> Vec<&EntityDoc> {
        self.store.get_all(kind)
    }

    #[must_use]
    pub fn stats(&self) -> GraphStats {
        let concepts = RelationshipIndex::ids_of_kind(&self.store, Kind::Concept).len();
        let relation_types = RelationshipIndex::ids_of_kind(&self.store, Kind::RelationType).len();
        let relations = RelationshipIndex::ids_of_kind(&self.store, Kind::Relation).len();
        GraphStats {
            entities: concepts + relation_types + relations,
            concepts,
            relation_types,
            relations,
            revision: self.store.revision(),
            persistent: self.store.is_persistent(),
        }
    }

    /// Relation instances binding `entity` at `role`; `None` on an index miss.
    pub fn lookup(
        &self,
        relation_type: &EntityId,
        role: Role,
        entity: &EntityId,
    ) -> Option<Vec<EntityId>> {
        RelationshipIndex::lookup(&self.store, relation_type, role, entity)
    }

    /// Relation instances of a type binding `entity` at any role.
    pub fn find_involving(
        &self,
        relation_type: &EntityId,
        entity: &EntityId,
    ) -> Vec<(EntityId, Role)> {
        RelationshipIndex::find_involving(&self.store, relation_type, entity)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    #[must_use]
    pub fn context<'a>(&'a self, user: Option<&'a UserId>) -> QueryContext<'a> {
        QueryContext::new(&self.store, self.capability.as_ref(), user)
    }

    /// Compile and run a query definition.
    pub fn query(&self, def: &QueryDef, user: Option<&UserId>) -> Result<Vec<Row>, GraphError> {
        let query = Query::compile(def)?;
        Ok(self.execute(&query, user))
    }

    /// Run a compiled query.
    pub fn execute(&self, query: &Query, user: Option<&UserId>) -> Vec<Row> {
        Executor::execute(&self.context(user), query)
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Create an entity and index it. Returns the new revision.
    pub fn put_entity(
        &mut self,
        id: EntityId,
        classification: &Classification,
        payload: &Payload,
        owner: UserId,
    ) -> Result<u64, GraphError> {
        if classification.kind == Kind::Index {
            return Err(GraphError::ReadOnly(id));
        }
        if classification.kind == Kind::Relation {
            Self::warn_unknown_relation_type(&self.store, payload);
        }
        self.store.put(id.clone(), classification, payload, owner)?;
        self.reindex_and_commit(&id, classification.kind)
    }

    /// Create a relation instance from a role binding.
    pub fn put_relation(
        &mut self,
        id: EntityId,
        binding: &RelationBinding,
        owner: UserId,
    ) -> Result<u64, GraphError> {
        self.put_entity(
            id,
            &Classification::new(Kind::Relation),
            &Payload::binding(binding),
            owner,
        )
    }

    /// Create a relation type from role descriptions.
    pub fn put_relation_type(
        &mut self,
        id: EntityId,
        roles: &[(Role, &str)],
        owner: UserId,
    ) -> Result<u64, GraphError> {
        self.put_entity(
            id,
            &Classification::new(Kind::RelationType),
            &Payload::role_descriptions(roles.iter().copied()),
            owner,
        )
    }

    /// Replace an entity's payload on behalf of `user`, who must be allowed
    /// to write it. A relation instance's new bindings are appended to the
    /// index; old entries stay.
    pub fn update_payload(
        &mut self,
        id: &EntityId,
        payload: &Payload,
        user: Option<&UserId>,
    ) -> Result<u64, GraphError> {
        EntityStore::validate_payload(payload)?;
        let doc = self
            .store
            .get_mut(id)
            .ok_or_else(|| GraphError::EntityNotFound(id.clone()))?;
        let kind = doc.kind();
        if kind == Kind::Index {
            return Err(GraphError::ReadOnly(id.clone()));
        }
        if !self.capability.can_write(user, &doc.access()) {
            tracing::warn!(entity = %id, user = ?user, "payload update refused");
            return Err(GraphError::Forbidden(id.clone()));
        }
        doc.replace_payload(payload)?;
        tracing::debug!(entity = %id, payload = %payload.kind().as_str(), "payload replaced");
        self.reindex_and_commit(id, kind)
    }

    /// Snapshot bytes of one document, for replication.
    pub fn export_document(&mut self, id: &EntityId) -> Option<Vec<u8>> {
        self.store.export(id)
    }

    /// Merge a remote replica of `id` on behalf of `user`. Unknown documents
    /// are adopted; either way the user must be allowed to write the
    /// document as it stands locally, or as it arrives when it is new.
    pub fn merge_document(
        &mut self,
        id: &EntityId,
        bytes: &[u8],
        user: Option<&UserId>,
    ) -> Result<u64, GraphError> {
        let kind = match self.store.get_mut(id) {
            Some(doc) if doc.kind() == Kind::Index => return Err(GraphError::ReadOnly(id.clone())),
            Some(doc) => {
                if !self.capability.can_write(user, &doc.access()) {
                    tracing::warn!(entity = %id, user = ?user, "merge refused");
                    return Err(GraphError::Forbidden(id.clone()));
                }
                doc.merge_bytes(bytes)?;
                doc.kind()
            }
            None => {
                let peek = EntityDoc::load(bytes, automerge::ActorId::random())?;
                if peek.id() != id {
                    return Err(GraphError::Document(format!(
                        "snapshot holds {}, expected {}",
                        peek.id(),
                        id
                    )));
                }
                if peek.kind() == Kind::Index {
                    return Err(GraphError::ReadOnly(id.clone()));
                }
                if !self.capability.can_write(user, &peek.access()) {
                    tracing::warn!(entity = %id, user = ?user, "adoption refused");
                    return Err(GraphError::Forbidden(id.clone()));
                }
                self.store.adopt(bytes)?;
                peek.kind()
            }
        };
        tracing::info!(entity = %id, kind = %kind, "document merged");
        self.reindex_and_commit(id, kind)
    }

    fn reindex_and_commit(&mut self, id: &EntityId, kind: Kind) -> Result<u64, GraphError> {
        let touched = self.reindex(id, kind)?;
        self.store.commit(&touched)
    }

    /// Index one written entity. Returns it together with the index
    /// documents the write changed, which are all that needs persisting.
    fn reindex(&mut self, id: &EntityId, kind: Kind) -> Result<Vec<EntityId>, GraphError> {
        let mut touched = vec![id.clone()];
        touched.extend(RelationshipIndex::index_entity(&mut self.store, id, kind)?);
        if kind == Kind::Relation
            && RelationshipIndex::index_relation_instance(&mut self.store, id)? > 0
        {
            touched.push(EntityId::from(RELATION_INDEX_ID));
        }
        Ok(touched)
    }

    fn warn_unknown_relation_type(store: &EntityStore, payload: &Payload) {
        let Payload::Map(map) = payload else {
            return;
        };
        if let Some(relation_type) = map.get("relationType").and_then(|v| v.as_str()) {
            let relation_type = EntityId::from(relation_type);
            if !RelationshipIndex::exists_relation_type(store, &relation_type) {
                tracing::warn!(relation_type = %relation_type, "relation instance of unknown type");
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::AllowAll;
    use crate::primitives::ENTITY_INDEX_ID;
    use serde_json::json;
    use tempfile::tempdir;

    fn genesis() -> UserId {
        UserId::new(GENESIS_OWNER)
    }

    #[test]
    fn seeded_graph_counts() {
        let graph = SemanticGraph::seeded().expect("seed");
        let stats = graph.stats();
        assert_eq!(stats.entities, SeedSet::len());
        assert_eq!(stats.relation_types, 4);
        assert_eq!(stats.relations, 24);
        assert!(!stats.persistent);
    }

    #[test]
    fn seed_belongs_to_configured_owner() {
        let graph = SemanticGraph::seeded_for(UserId::new("team")).expect("seed");
        let person = graph.get(&EntityId::from("@person1")).expect("person");
        assert_eq!(person.owner(), &UserId::new("team"));
        assert!(graph.get_readable(&EntityId::from("@person1"), None).is_some());
    }

    #[test]
    fn index_documents_are_read_only() {
        let mut graph = SemanticGraph::seeded().expect("seed");
        let result = graph.put_entity(
            EntityId::from("@index_extra"),
            &Classification::new(Kind::Index),
            &Payload::Concept,
            UserId::new("genesis"),
        );
        assert!(matches!(result, Err(GraphError::ReadOnly(_))));

        let result = graph.update_payload(
            &EntityId::from("@index_relations"),
            &Payload::Concept,
            Some(&genesis()),
        );
        assert!(matches!(result, Err(GraphError::ReadOnly(_))));
    }

    #[test]
    fn put_relation_is_traversable() {
        let mut graph = SemanticGraph::seeded().expect("seed");
        let before = graph.revision();
        let revision = graph
            .put_relation(
                EntityId::from("@bridi_gunka_task4"),
                &RelationBinding::new("@gunka")
                    .bind(Role::X1, "@person3")
                    .bind(Role::X2, "@task1")
                    .bind(Role::X3, "@project1"),
                UserId::new("genesis"),
            )
            .expect("put");
        assert!(revision > before);

        let ids = graph
            .lookup(&EntityId::from("@gunka"), Role::X3, &EntityId::from("@project1"))
            .expect("hit");
        assert_eq!(ids.len(), 4);
        assert_eq!(ids[3], EntityId::from("@bridi_gunka_task4"));
    }

    #[test]
    fn update_payload_appends_new_bindings() {
        let mut graph = SemanticGraph::seeded().expect("seed");
        let id = EntityId::from("@bridi_task1_ckaji_status");
        let binding = RelationBinding::new("@ckaji")
            .bind(Role::X1, "@task1")
            .bind(Role::X2, "@status_completed");
        graph
            .update_payload(&id, &Payload::binding(&binding), Some(&genesis()))
            .expect("update");

        let hits = graph
            .lookup(&EntityId::from("@ckaji"), Role::X2, &EntityId::from("@status_completed"))
            .expect("hit");
        assert_eq!(hits, vec![id.clone()]);

        // The stale entry stays in the index.
        let stale = graph
            .lookup(&EntityId::from("@ckaji"), Role::X2, &EntityId::from("@status_inprogress"))
            .expect("hit");
        assert_eq!(stale, vec![id]);
    }

    #[test]
    fn update_missing_entity_fails() {
        let mut graph = SemanticGraph::seeded().expect("seed");
        let result = graph.update_payload(&EntityId::from("@ghost"), &Payload::Concept, Some(&genesis()));
        assert!(matches!(result, Err(GraphError::EntityNotFound(_))));
    }

    #[test]
    fn writes_need_the_owner() {
        let mut graph = SemanticGraph::seeded().expect("seed");
        let alice = UserId::new("alice");
        let mallory = UserId::new("mallory");
        let id = EntityId::from("@diary");
        graph
            .put_entity(
                id.clone(),
                &Classification::new(Kind::Concept),
                &Payload::Text("dear diary".to_string()),
                alice.clone(),
            )
            .expect("put");
        let before = graph.revision();

        let overwrite = Payload::Text("overwritten".to_string());
        let result = graph.update_payload(&id, &overwrite, Some(&mallory));
        assert_eq!(result, Err(GraphError::Forbidden(id.clone())));
        let result = graph.update_payload(&id, &overwrite, None);
        assert_eq!(result, Err(GraphError::Forbidden(id.clone())));
        assert_eq!(graph.revision(), before);
        assert_eq!(
            graph.get(&id).expect("entity").payload(),
            Payload::Text("dear diary".to_string())
        );

        graph
            .update_payload(&id, &Payload::Text("still mine".to_string()), Some(&alice))
            .expect("owner update");
        assert_eq!(
            graph.get(&id).expect("entity").payload(),
            Payload::Text("still mine".to_string())
        );
    }

    #[test]
    fn shared_documents_are_not_publicly_writable() {
        let mut graph = SemanticGraph::seeded().expect("seed");
        let id = EntityId::from("@person1_name");
        let eve = Payload::Text("Eve".to_string());
        let result = graph.update_payload(&id, &eve, None);
        assert_eq!(result, Err(GraphError::Forbidden(id.clone())));
        let result = graph.update_payload(&id, &eve, Some(&UserId::new("bob")));
        assert_eq!(result, Err(GraphError::Forbidden(id)));
    }

    #[test]
    fn merges_need_the_owner() {
        let mut local = SemanticGraph::seeded().expect("seed");
        let mut remote = SemanticGraph::seeded().expect("seed");
        let mallory = UserId::new("mallory");

        let id = EntityId::from("@task1_name");
        let bytes = remote.export_document(&id).expect("export");
        let result = local.merge_document(&id, &bytes, Some(&mallory));
        assert_eq!(result, Err(GraphError::Forbidden(id)));

        // Adopting a new document needs its incoming owner.
        let note = EntityId::from("@note");
        remote
            .put_entity(
                note.clone(),
                &Classification::new(Kind::Concept),
                &Payload::Text("hello".to_string()),
                UserId::new("alice"),
            )
            .expect("put");
        let bytes = remote.export_document(&note).expect("export");
        let result = local.merge_document(&note, &bytes, Some(&mallory));
        assert_eq!(result, Err(GraphError::Forbidden(note.clone())));
        assert!(local.get(&note).is_none());
        local
            .merge_document(&note, &bytes, Some(&UserId::new("alice")))
            .expect("adopt");
        assert!(local.get(&note).is_some());
    }

    #[test]
    fn writes_persist_only_changed_index_documents() {
        let mut graph = SemanticGraph::seeded().expect("seed");
        let note = EntityId::from("@note");
        graph
            .store
            .put(
                note.clone(),
                &Classification::new(Kind::Concept),
                &Payload::Text("draft".to_string()),
                genesis(),
            )
            .expect("put");
        assert_eq!(
            graph.reindex(&note, Kind::Concept).expect("reindex"),
            vec![note.clone(), EntityId::from(ENTITY_INDEX_ID)]
        );
        // Already marked: a payload edit touches the entity alone.
        assert_eq!(graph.reindex(&note, Kind::Concept).expect("reindex"), vec![note]);

        let relation = EntityId::from("@bridi_prenu_person1");
        graph
            .store
            .put(
                relation.clone(),
                &Classification::new(Kind::Relation),
                &Payload::binding(&RelationBinding::new("@prenu").bind(Role::X1, "@person1")),
                genesis(),
            )
            .expect("put");
        assert_eq!(
            graph.reindex(&relation, Kind::Relation).expect("reindex"),
            vec![
                relation.clone(),
                EntityId::from(ENTITY_INDEX_ID),
                EntityId::from(RELATION_INDEX_ID)
            ]
        );
        assert_eq!(
            graph.reindex(&relation, Kind::Relation).expect("reindex"),
            vec![relation]
        );
    }

    #[test]
    fn merge_between_replicas() {
        let mut local = SemanticGraph::seeded().expect("seed");
        let mut remote = SemanticGraph::seeded().expect("seed");
        let id = EntityId::from("@task1_name");

        // Bring both replicas to a common history first.
        let shared = local.export_document(&id).expect("export");
        remote.merge_document(&id, &shared, Some(&genesis())).expect("sync");
        remote
            .update_payload(
                &id,
                &Payload::Text("Task 1 (renamed)".to_string()),
                Some(&genesis()),
            )
            .expect("update");

        let bytes = remote.export_document(&id).expect("export");
        local.merge_document(&id, &bytes, Some(&genesis())).expect("merge");
        assert_eq!(
            local.get(&id).expect("entity").payload(),
            Payload::Text("Task 1 (renamed)".to_string())
        );
    }

    #[test]
    fn merge_adopts_unknown_documents() {
        let mut local = SemanticGraph::seeded().expect("seed");
        let mut remote = SemanticGraph::seeded().expect("seed");
        let id = EntityId::from("@bridi_prenu_person1");
        remote
            .put_relation(
                id.clone(),
                &RelationBinding::new("@prenu").bind(Role::X1, "@person1"),
                UserId::new("genesis"),
            )
            .expect("put");

        let bytes = remote.export_document(&id).expect("export");
        local.merge_document(&id, &bytes, Some(&genesis())).expect("merge");
        assert!(RelationshipIndex::exists_entity(local.store(), &id));
        assert_eq!(
            local.lookup(&EntityId::from("@prenu"), Role::X1, &EntityId::from("@person1")),
            Some(vec![id])
        );
    }

    #[test]
    fn merge_rejects_mismatched_id() {
        let mut graph = SemanticGraph::seeded().expect("seed");
        let bytes = graph.export_document(&EntityId::from("@task1")).expect("export");
        let result = graph.merge_document(&EntityId::from("@task9"), &bytes, Some(&genesis()));
        assert!(result.is_err());
    }

    #[test]
    fn capability_can_be_replaced() {
        let mut graph = SemanticGraph::seeded().expect("seed");
        graph
            .put_entity(
                EntityId::from("@private"),
                &Classification::new(Kind::Concept),
                &Payload::Concept,
                UserId::new("alice"),
            )
            .expect("put");
        assert!(graph.get_readable(&EntityId::from("@private"), None).is_none());

        let graph = graph.with_capability(AllowAll);
        assert!(graph.get_readable(&EntityId::from("@private"), None).is_some());
    }

    #[test]
    fn persistent_graph_reopens() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("graph.redb");
        let revision = {
            let mut graph = SemanticGraph::open(&path, UserId::new("genesis")).expect("open");
            assert!(graph.stats().persistent);
            graph
                .put_entity(
                    EntityId::from("@note"),
                    &Classification::new(Kind::Concept),
                    &Payload::Text("kept".to_string()),
                    UserId::new("genesis"),
                )
                .expect("put")
        };

        let graph = SemanticGraph::open(&path, UserId::new("genesis")).expect("reopen");
        assert_eq!(graph.revision(), revision);
        assert_eq!(graph.stats().entities, SeedSet::len() + 1);
        let def: QueryDef = serde_json::from_value(json!({
            "from": {"ids": ["@note"]},
            "map": {"text": {"field": "self.payload"}}
        }))
        .expect("definition");
        let rows = graph.query(&def, None).expect("query");
        assert_eq!(rows[0]["text"], json!("kept"));
    }
}

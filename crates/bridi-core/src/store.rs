//! # Entity Store
//!
//! Arena of entity documents keyed by id. The store is an explicit object
//! passed by reference to the index, the resolver and the query engine;
//! several independent stores can live in one process.
//!
//! ## Storage Backends
//!
//! - `InMemory`: documents live only in the arena
//! - `Persistent`: every mutation is also written to a `RedbDocuments` file
//!
//! ## Replica Identity
//!
//! Each store draws one random replica id; every document it creates or
//! loads writes changes under `replica id ++ ordinal`, so two processes
//! editing the same entity never share an actor.

use crate::document::EntityDoc;
use crate::formats::StoredDocument;
use crate::primitives::{KEY_SEPARATOR, MAX_ID_LENGTH, MAX_TEXT_LENGTH, MAX_TREE_NODES};
use crate::storage::RedbDocuments;
use crate::types::{Classification, EntityId, GraphError, Kind, Payload, UserId};
use automerge::ActorId;
use std::collections::BTreeMap;
use std::path::Path;

/// Where the store writes documents besides its in-memory arena.
#[derive(Debug, Default)]
pub enum StorageBackend {
    #[default]
    InMemory,
    Persistent(RedbDocuments),
}

/// Owns one document per entity.
#[derive(Debug)]
pub struct EntityStore {
    docs: BTreeMap<EntityId, EntityDoc>,
    replica: ActorId,
    next_ordinal: u64,
    revision: u64,
    backend: StorageBackend,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    /// Create an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            docs: BTreeMap::new(),
            replica: ActorId::random(),
            next_ordinal: 0,
            revision: 0,
            backend: StorageBackend::InMemory,
        }
    }

    /// Open a persistent store, loading every stored document.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let backend = RedbDocuments::open(path)?;
        let records = backend.load_all()?;
        let revision = backend.revision()?;

        let mut store = Self {
            backend: StorageBackend::Persistent(backend),
            revision,
            ..Self::new()
        };
        for record in records {
            let actor = store.next_actor();
            let doc = EntityDoc::load(&record.snapshot, actor)?;
            if doc.id().as_str() != record.id {
                return Err(GraphError::Document(format!(
                    "record {} holds document {}",
                    record.id,
                    doc.id()
                )));
            }
            store.docs.insert(doc.id().clone(), doc);
        }
        tracing::debug!(documents = store.docs.len(), revision, "entity store opened");
        Ok(store)
    }

    // =========================================================================
    // VALIDATION
    // =========================================================================

    /// Validate an entity id.
    ///
    /// An id is valid if it is non-empty, within `MAX_ID_LENGTH`, has no
    /// whitespace and does not contain the composite-key separator.
    pub fn validate_id(id: &EntityId) -> Result<(), GraphError> {
        let s = id.as_str();
        if s.is_empty()
            || s.len() > MAX_ID_LENGTH
            || s.contains(KEY_SEPARATOR)
            || s.chars().any(char::is_whitespace)
        {
            return Err(GraphError::InvalidId(s.to_string()));
        }
        Ok(())
    }

    /// Validate payload size limits.
    pub fn validate_payload(payload: &Payload) -> Result<(), GraphError> {
        match payload {
            Payload::Text(s) if s.len() > MAX_TEXT_LENGTH => Err(GraphError::InvalidPayload(
                format!("text exceeds {} bytes", MAX_TEXT_LENGTH),
            )),
            Payload::Tree(tree) if tree.size() > MAX_TREE_NODES => Err(
                GraphError::InvalidPayload(format!("tree exceeds {} nodes", MAX_TREE_NODES)),
            ),
            _ => Ok(()),
        }
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Fetch an entity. A missing id is a normal outcome.
    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<&EntityDoc> {
        self.docs.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &EntityId) -> Option<&mut EntityDoc> {
        self.docs.get_mut(id)
    }

    #[must_use]
    pub fn contains(&self, id: &EntityId) -> bool {
        self.docs.contains_key(id)
    }

    /// All entities of a kind, in id order.
    pub fn get_all(&self, kind: Kind) -> Vec<&EntityDoc> {
        self.docs.values().filter(|doc| doc.kind() == kind).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Monotonic mutation counter; bumps on every committed write.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Persistent(_))
    }

    #[must_use]
    pub fn backend(&self) -> &StorageBackend {
        &self.backend
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Create a new entity document.
    ///
    /// Does not touch the index and does not persist; callers commit the
    /// whole mutation with `commit`.
    pub fn put(
        &mut self,
        id: EntityId,
        classification: &Classification,
        payload: &Payload,
        owner: UserId,
    ) -> Result<(), GraphError> {
        Self::validate_id(&id)?;
        Self::validate_payload(payload)?;
        if self.docs.contains_key(&id) {
            return Err(GraphError::EntityExists(id));
        }
        let actor = self.next_actor();
        let doc = EntityDoc::create(id.clone(), classification, payload, owner, actor)?;
        self.docs.insert(id, doc);
        Ok(())
    }

    /// Insert a document received from another replica.
    pub fn adopt(&mut self, bytes: &[u8]) -> Result<EntityId, GraphError> {
        let actor = self.next_actor();
        let doc = EntityDoc::load(bytes, actor)?;
        let id = doc.id().clone();
        Self::validate_id(&id)?;
        if self.docs.contains_key(&id) {
            return Err(GraphError::EntityExists(id));
        }
        self.docs.insert(id.clone(), doc);
        Ok(id)
    }

    /// Bump the revision and persist the touched documents.
    pub fn commit(&mut self, touched: &[EntityId]) -> Result<u64, GraphError> {
        self.revision = self.revision.saturating_add(1);
        if let StorageBackend::Persistent(backend) = &self.backend {
            let mut records = Vec::with_capacity(touched.len());
            for id in touched {
                if let Some(doc) = self.docs.get_mut(id) {
                    records.push(StoredDocument {
                        id: id.0.clone(),
                        owner: doc.owner().0.clone(),
                        snapshot: doc.save(),
                    });
                }
            }
            backend.put_batch(&records, self.revision)?;
        }
        Ok(self.revision)
    }

    /// Snapshot bytes of one document.
    pub fn export(&mut self, id: &EntityId) -> Option<Vec<u8>> {
        self.docs.get_mut(id).map(EntityDoc::save)
    }

    fn next_actor(&mut self) -> ActorId {
        let mut bytes = self.replica.to_bytes().to_vec();
        bytes.extend_from_slice(&self.next_ordinal.to_be_bytes());
        self.next_ordinal = self.next_ordinal.saturating_add(1);
        ActorId::from(bytes)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn concept() -> Classification {
        Classification::new(Kind::Concept)
    }

    #[test]
    fn put_then_get() {
        let mut store = EntityStore::new();
        store
            .put(
                EntityId::from("@task1"),
                &concept(),
                &Payload::Concept,
                UserId::new("genesis"),
            )
            .expect("put");

        assert!(store.get(&EntityId::from("@task1")).is_some());
        assert!(store.get(&EntityId::from("@task9")).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut store = EntityStore::new();
        let id = EntityId::from("@task1");
        store
            .put(id.clone(), &concept(), &Payload::Concept, UserId::new("a"))
            .expect("put");
        let err = store
            .put(id.clone(), &concept(), &Payload::Concept, UserId::new("a"))
            .expect_err("duplicate");
        assert_eq!(err, GraphError::EntityExists(id));
    }

    #[test]
    fn invalid_ids_rejected() {
        let long = "x".repeat(MAX_ID_LENGTH + 1);
        for bad in ["", "@a:b", "has space", long.as_str()] {
            assert!(
                EntityStore::validate_id(&EntityId::from(bad)).is_err(),
                "{bad:?} should be rejected"
            );
        }
        assert!(EntityStore::validate_id(&EntityId::from("@person_1")).is_ok());
    }

    #[test]
    fn oversized_text_rejected() {
        let payload = Payload::Text("x".repeat(MAX_TEXT_LENGTH + 1));
        assert!(EntityStore::validate_payload(&payload).is_err());
    }

    #[test]
    fn get_all_filters_by_kind() {
        let mut store = EntityStore::new();
        let owner = UserId::new("genesis");
        store
            .put(EntityId::from("@b"), &concept(), &Payload::Concept, owner.clone())
            .expect("put");
        store
            .put(
                EntityId::from("@gunka"),
                &Classification::new(Kind::RelationType),
                &Payload::Map(serde_json::Map::new()),
                owner.clone(),
            )
            .expect("put");
        store
            .put(EntityId::from("@a"), &concept(), &Payload::Concept, owner)
            .expect("put");

        let ids: Vec<&str> = store
            .get_all(Kind::Concept)
            .into_iter()
            .map(|doc| doc.id().as_str())
            .collect();
        assert_eq!(ids, vec!["@a", "@b"]);
        assert_eq!(store.get_all(Kind::RelationType).len(), 1);
    }

    #[test]
    fn actors_are_distinct_per_document() {
        let mut store = EntityStore::new();
        let a = store.next_actor();
        let b = store.next_actor();
        assert_ne!(a, b);
    }

    #[test]
    fn commit_bumps_revision() {
        let mut store = EntityStore::new();
        assert_eq!(store.revision(), 0);
        assert_eq!(store.commit(&[]).expect("commit"), 1);
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn persistent_store_reloads_documents() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("store.redb");
        let id = EntityId::from("@person1_name");

        {
            let mut store = EntityStore::open(&path).expect("open");
            store
                .put(
                    id.clone(),
                    &concept(),
                    &Payload::Text("Alice".to_string()),
                    UserId::new("genesis"),
                )
                .expect("put");
            store.commit(std::slice::from_ref(&id)).expect("commit");
        }

        let store = EntityStore::open(&path).expect("reopen");
        assert!(store.is_persistent());
        assert_eq!(store.revision(), 1);
        let doc = store.get(&id).expect("reloaded");
        assert_eq!(doc.payload(), Payload::Text("Alice".to_string()));
    }

    #[test]
    fn adopt_rejects_existing_id() {
        let mut store = EntityStore::new();
        let id = EntityId::from("@task1");
        store
            .put(id.clone(), &concept(), &Payload::Concept, UserId::new("a"))
            .expect("put");
        let bytes = store.export(&id).expect("export");
        assert!(matches!(
            store.adopt(&bytes),
            Err(GraphError::EntityExists(_))
        ));

        let mut other = EntityStore::new();
        assert_eq!(other.adopt(&bytes).expect("adopt"), id);
    }
}

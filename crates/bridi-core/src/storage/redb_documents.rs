//! # redb-backed Document Storage
//!
//! The "persist document" / "fetch document" collaborator of the entity
//! store, implemented on the redb embedded database:
//! - ACID transactions, one write transaction per mutation or batch
//! - Crash safety (copy-on-write B-trees)
//! - Concurrent readers, single writer
//!
//! Records are stored framed by `formats::persistence` and keyed by entity
//! id, so iteration order is the id order.

use crate::formats::{StoredDocument, document_from_bytes, document_to_bytes};
use crate::types::GraphError;
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;

/// Table for documents: entity id -> framed `StoredDocument` bytes
const DOCUMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const REVISION_KEY: &str = "revision";

fn io_err(e: impl std::fmt::Display) -> GraphError {
    GraphError::IoError(e.to_string())
}

/// A disk-backed document store using redb.
pub struct RedbDocuments {
    db: Database,
}

impl std::fmt::Debug for RedbDocuments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbDocuments").finish_non_exhaustive()
    }
}

impl RedbDocuments {
    /// Open or create a document database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        {
            let write_txn = db.begin_write().map_err(io_err)?;
            let _ = write_txn.open_table(DOCUMENTS).map_err(io_err)?;
            let _ = write_txn.open_table(METADATA).map_err(io_err)?;
            write_txn.commit().map_err(io_err)?;
        }

        Ok(Self { db })
    }

    /// Persist one document and the store revision it belongs to.
    pub fn put(&self, record: &StoredDocument, revision: u64) -> Result<(), GraphError> {
        self.put_batch(std::slice::from_ref(record), revision)
    }

    /// Persist several documents in a single transaction.
    pub fn put_batch(&self, records: &[StoredDocument], revision: u64) -> Result<(), GraphError> {
        let encoded = records
            .iter()
            .map(|record| document_to_bytes(record).map(|bytes| (record.id.as_str(), bytes)))
            .collect::<Result<Vec<_>, _>>()?;

        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut documents = write_txn.open_table(DOCUMENTS).map_err(io_err)?;
            for (id, bytes) in &encoded {
                documents.insert(*id, bytes.as_slice()).map_err(io_err)?;
            }
            let mut meta = write_txn.open_table(METADATA).map_err(io_err)?;
            meta.insert(REVISION_KEY, revision).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;
        Ok(())
    }

    /// Fetch one document by id.
    pub fn get(&self, id: &str) -> Result<Option<StoredDocument>, GraphError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let documents = read_txn.open_table(DOCUMENTS).map_err(io_err)?;
        match documents.get(id).map_err(io_err)? {
            Some(bytes) => document_from_bytes(bytes.value()).map(Some),
            None => Ok(None),
        }
    }

    /// All documents in id order.
    pub fn load_all(&self) -> Result<Vec<StoredDocument>, GraphError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let documents = read_txn.open_table(DOCUMENTS).map_err(io_err)?;

        let mut records = Vec::new();
        for entry in documents.iter().map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            records.push(document_from_bytes(value.value())?);
        }
        Ok(records)
    }

    pub fn count(&self) -> Result<usize, GraphError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let documents = read_txn.open_table(DOCUMENTS).map_err(io_err)?;
        let count = documents.len().map_err(io_err)?;
        Ok(count as usize)
    }

    /// Last persisted store revision (0 for a fresh database).
    pub fn revision(&self) -> Result<u64, GraphError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let meta = read_txn.open_table(METADATA).map_err(io_err)?;
        Ok(meta
            .get(REVISION_KEY)
            .map_err(io_err)?
            .map(|v| v.value())
            .unwrap_or(0))
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), GraphError> {
        self.db.compact().map_err(io_err)?;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(id: &str) -> StoredDocument {
        StoredDocument {
            id: id.to_string(),
            owner: "genesis".to_string(),
            snapshot: id.as_bytes().to_vec(),
        }
    }

    #[test]
    fn put_and_get() {
        let temp = tempdir().expect("temp dir");
        let store = RedbDocuments::open(temp.path().join("docs.redb")).expect("open db");

        store.put(&record("@task1"), 1).expect("put");
        assert_eq!(store.get("@task1").expect("get"), Some(record("@task1")));
        assert_eq!(store.get("@task2").expect("get"), None);
        assert_eq!(store.revision().expect("revision"), 1);
    }

    #[test]
    fn put_overwrites_same_id() {
        let temp = tempdir().expect("temp dir");
        let store = RedbDocuments::open(temp.path().join("docs.redb")).expect("open db");

        store.put(&record("@task1"), 1).expect("put");
        let mut updated = record("@task1");
        updated.snapshot = vec![9, 9];
        store.put(&updated, 2).expect("put");

        assert_eq!(store.count().expect("count"), 1);
        assert_eq!(store.get("@task1").expect("get"), Some(updated));
    }

    #[test]
    fn load_all_is_id_ordered_and_survives_reopen() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("docs.redb");

        {
            let store = RedbDocuments::open(&path).expect("open db");
            store
                .put_batch(&[record("@b"), record("@a"), record("@c")], 3)
                .expect("batch");
        }

        let store = RedbDocuments::open(&path).expect("reopen db");
        let ids: Vec<String> = store
            .load_all()
            .expect("load")
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["@a", "@b", "@c"]);
        assert_eq!(store.revision().expect("revision"), 3);
    }
}

//! # Storage Backends
//!
//! Disk persistence for entity documents.

pub mod redb_documents;

pub use redb_documents::RedbDocuments;

//! # Formats
//!
//! Byte-level encodings used by storage backends.

pub mod persistence;

pub use persistence::{
    MAX_PERSISTENCE_PAYLOAD_SIZE, PersistenceHeader, StoredDocument, document_from_bytes,
    document_to_bytes,
};

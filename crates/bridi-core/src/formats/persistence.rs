//! # Persistence Format
//!
//! Binary framing for stored entity documents.
//!
//! Format: Header (5 bytes) + postcard-serialized `StoredDocument`.
//! - 4 bytes: Magic ("BRDI")
//! - 1 byte: Version
//!
//! The document snapshot inside the record is the replicated container's
//! own save format; this module only frames it with the id and owner so a
//! backend can list records without loading every document.
//!
//! ## Validation
//!
//! Size and header are checked before any payload parsing, so corrupted or
//! oversized records are rejected without allocating for them.

use crate::primitives;
use crate::types::GraphError;
use serde::{Deserialize, Serialize};

// =============================================================================
// LIMITS
// =============================================================================

/// Maximum allowed size of one stored record (64 MB).
pub const MAX_PERSISTENCE_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

/// Minimum valid record size (header only).
const MIN_RECORD_SIZE: usize = 5;

// =============================================================================
// RECORD HEADER
// =============================================================================

/// The persistence header precedes every stored record.
#[derive(Debug, Clone, Copy)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl PersistenceHeader {
    /// Create a new header with current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(GraphError::SerializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(GraphError::SerializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; 5] {
        let mut bytes = [0u8; 5];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GraphError> {
        if bytes.len() < MIN_RECORD_SIZE {
            return Err(GraphError::SerializationError(
                "Header too short".to_string(),
            ));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Ok(Self {
            magic,
            version: bytes[4],
        })
    }
}

impl Default for PersistenceHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// STORED DOCUMENT
// =============================================================================

/// One persisted entity document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub owner: String,
    /// Full snapshot of the replicated document.
    pub snapshot: Vec<u8>,
}

/// Serialize a stored document to bytes (header + payload).
pub fn document_to_bytes(record: &StoredDocument) -> Result<Vec<u8>, GraphError> {
    let header = PersistenceHeader::new();
    let payload =
        postcard::to_stdvec(record).map_err(|e| GraphError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(MIN_RECORD_SIZE + payload.len());
    result.extend_from_slice(&header.to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Deserialize a stored document from bytes.
///
/// Validates minimum size, maximum size and header before touching the payload.
pub fn document_from_bytes(bytes: &[u8]) -> Result<StoredDocument, GraphError> {
    if bytes.len() < MIN_RECORD_SIZE {
        return Err(GraphError::SerializationError(
            "Data too short: minimum 5 bytes required".to_string(),
        ));
    }
    if bytes.len() > MAX_PERSISTENCE_PAYLOAD_SIZE {
        return Err(GraphError::SerializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_PERSISTENCE_PAYLOAD_SIZE
        )));
    }

    let header = PersistenceHeader::from_bytes(bytes)?;
    header.validate()?;

    postcard::from_bytes(&bytes[MIN_RECORD_SIZE..]).map_err(|e| {
        GraphError::SerializationError(format!("Failed to deserialize document record: {}", e))
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> StoredDocument {
        StoredDocument {
            id: "@task1".to_string(),
            owner: "genesis".to_string(),
            snapshot: vec![1, 2, 3, 4],
        }
    }

    #[test]
    fn header_roundtrip() {
        let header = PersistenceHeader::new();
        let restored = PersistenceHeader::from_bytes(&header.to_bytes()).expect("parse header");
        assert_eq!(restored.magic, *primitives::MAGIC_BYTES);
        assert_eq!(restored.version, primitives::FORMAT_VERSION);
    }

    #[test]
    fn record_roundtrip_is_bit_exact() {
        let bytes1 = document_to_bytes(&record()).expect("serialize");
        let restored = document_from_bytes(&bytes1).expect("deserialize");
        assert_eq!(restored, record());
        let bytes2 = document_to_bytes(&restored).expect("serialize again");
        assert_eq!(bytes1, bytes2);
    }

    #[test]
    fn invalid_magic_rejected() {
        let mut bytes = document_to_bytes(&record()).expect("serialize");
        bytes[0..4].copy_from_slice(b"KREM");
        assert!(document_from_bytes(&bytes).is_err());
    }

    #[test]
    fn unsupported_version_rejected() {
        let mut bytes = document_to_bytes(&record()).expect("serialize");
        bytes[4] = primitives::FORMAT_VERSION + 1;
        let err = document_from_bytes(&bytes).expect_err("version mismatch");
        assert!(err.to_string().contains("Unsupported version"));
    }

    #[test]
    fn truncated_record_rejected() {
        assert!(document_from_bytes(b"BRD").is_err());
        let bytes = document_to_bytes(&record()).expect("serialize");
        assert!(document_from_bytes(&bytes[..bytes.len() - 2]).is_err());
    }
}

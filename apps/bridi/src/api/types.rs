//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bridi_core::{
    Classification, EntityId, EntitySnapshot, GraphError, GraphStats, Kind, Payload, QueryDef,
    RelationBinding, Role, Row,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Graph status response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub entities: usize,
    pub concepts: usize,
    pub relation_types: usize,
    pub relations: usize,
    pub revision: u64,
    pub persistent: bool,
}

impl From<GraphStats> for StatusResponse {
    fn from(stats: GraphStats) -> Self {
        Self {
            entities: stats.entities,
            concepts: stats.concepts,
            relation_types: stats.relation_types,
            relations: stats.relations,
            revision: stats.revision,
            persistent: stats.persistent,
        }
    }
}

// =============================================================================
// ENTITY RESPONSE
// =============================================================================

/// Single entity lookup response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityResponse {
    pub found: bool,
    pub entity: Option<EntitySnapshot>,
}

impl EntityResponse {
    #[must_use]
    pub fn found(entity: EntitySnapshot) -> Self {
        Self {
            found: true,
            entity: Some(entity),
        }
    }

    #[must_use]
    pub fn not_found() -> Self {
        Self {
            found: false,
            entity: None,
        }
    }
}

// =============================================================================
// WRITE REQUESTS/RESPONSE
// =============================================================================

/// Create a concept or relation type entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEntityRequest {
    pub id: String,
    pub kind: Kind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub payload: Payload,
}

impl CreateEntityRequest {
    /// Id and classification of the new entity.
    pub fn to_parts(&self) -> Result<(EntityId, Classification), GraphError> {
        let id = EntityId::new(self.id.as_str());
        bridi_core::EntityStore::validate_id(&id)?;
        let classification = match &self.display_name {
            Some(name) => Classification::new(self.kind).with_display_name(name.as_str()),
            None => Classification::new(self.kind),
        };
        Ok((id, classification))
    }
}

/// Create a relation instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRelationRequest {
    pub id: String,
    pub relation_type: String,
    pub roles: BTreeMap<Role, String>,
}

impl CreateRelationRequest {
    pub fn to_binding(&self) -> Result<(EntityId, RelationBinding), GraphError> {
        let id = EntityId::new(self.id.as_str());
        bridi_core::EntityStore::validate_id(&id)?;
        if self.roles.is_empty() {
            return Err(GraphError::InvalidPayload(
                "relation binds no roles".to_string(),
            ));
        }
        let binding = self
            .roles
            .iter()
            .fold(RelationBinding::new(self.relation_type.as_str()), |binding, (role, entity)| {
                binding.bind(*role, entity.as_str())
            });
        Ok((id, binding))
    }
}

/// Replace the payload of an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePayloadRequest {
    pub payload: Payload,
}

/// Outcome of any write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteResponse {
    pub success: bool,
    pub revision: Option<u64>,
    pub error: Option<String>,
}

impl WriteResponse {
    #[must_use]
    pub fn success(revision: u64) -> Self {
        Self {
            success: true,
            revision: Some(revision),
            error: None,
        }
    }

    #[must_use]
    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            revision: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// QUERY REQUEST/RESPONSE
// =============================================================================

/// Query request wrapping a query definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: QueryDef,
}

/// Query response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    pub rows: Vec<Row>,
    pub error: Option<String>,
}

impl QueryResponse {
    #[must_use]
    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            success: true,
            rows,
            error: None,
        }
    }

    #[must_use]
    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            rows: Vec::new(),
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// DOCUMENT EXPORT/MERGE
// =============================================================================

/// A document snapshot, base64 encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub success: bool,
    pub id: String,
    pub data: Option<String>,
    pub error: Option<String>,
}

impl DocumentResponse {
    #[must_use]
    pub fn success(id: &EntityId, bytes: &[u8]) -> Self {
        Self {
            success: true,
            id: id.to_string(),
            data: Some(STANDARD.encode(bytes)),
            error: None,
        }
    }

    #[must_use]
    pub fn error(id: &EntityId, msg: impl Into<String>) -> Self {
        Self {
            success: false,
            id: id.to_string(),
            data: None,
            error: Some(msg.into()),
        }
    }

    /// Decoded snapshot bytes.
    pub fn decode(&self) -> Result<Vec<u8>, GraphError> {
        let data = self
            .data
            .as_deref()
            .ok_or_else(|| GraphError::SerializationError("no document data".to_string()))?;
        decode_base64(data)
    }
}

/// Remote replica snapshot to merge, base64 encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    pub data: String,
}

impl MergeRequest {
    #[must_use]
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            data: STANDARD.encode(bytes),
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>, GraphError> {
        decode_base64(&self.data)
    }
}

fn decode_base64(data: &str) -> Result<Vec<u8>, GraphError> {
    STANDARD
        .decode(data)
        .map_err(|e| GraphError::SerializationError(format!("Invalid base64: {}", e)))
}

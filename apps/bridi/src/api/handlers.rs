//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.
//!
//! Reads honour the read capability of the acting user, taken from the
//! `x-bridi-user` header. New entities created without that header are
//! owned by the genesis owner. Payload updates and merges modify an existing
//! document and need its owner in the header.

use super::{
    AppState,
    types::{
        CreateEntityRequest, CreateRelationRequest, DocumentResponse, EntityResponse,
        HealthResponse, MergeRequest, QueryRequest, QueryResponse, StatusResponse,
        UpdatePayloadRequest, WriteResponse,
    },
};
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use bridi_core::{EntityId, GraphError, SemanticGraph, UserId};

/// Header carrying the acting user.
pub const USER_HEADER: &str = "x-bridi-user";

// =============================================================================
// HELPERS
// =============================================================================

/// The acting user of a request, if any.
pub fn acting_user(headers: &HeaderMap) -> Option<UserId> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(UserId::new)
}

/// HTTP status for a failed write or query.
pub fn status_for(error: &GraphError) -> StatusCode {
    match error {
        GraphError::EntityExists(_) => StatusCode::CONFLICT,
        GraphError::EntityNotFound(_) => StatusCode::NOT_FOUND,
        GraphError::ReadOnly(_) | GraphError::Forbidden(_) => StatusCode::FORBIDDEN,
        GraphError::InvalidPath(_)
        | GraphError::InvalidQuery(_)
        | GraphError::InvalidPayload(_)
        | GraphError::InvalidId(_)
        | GraphError::SerializationError(_) => StatusCode::BAD_REQUEST,
        GraphError::SchemaConflict { .. } | GraphError::Document(_) | GraphError::IoError(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn owner_of(headers: &HeaderMap, graph: &SemanticGraph) -> UserId {
    acting_user(headers).unwrap_or_else(|| graph.genesis_owner().clone())
}

/// Publish a committed revision and build the response.
fn written(
    state: &AppState,
    result: Result<u64, GraphError>,
    what: &str,
) -> (StatusCode, Json<WriteResponse>) {
    match result {
        Ok(revision) => {
            state.notify(revision);
            (StatusCode::OK, Json(WriteResponse::success(revision)))
        }
        Err(e) => {
            tracing::debug!(error = %e, "{} rejected", what);
            (
                status_for(&e),
                Json(WriteResponse::error(format!("{} failed: {}", what, e))),
            )
        }
    }
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// STATUS HANDLER
// =============================================================================

/// Get graph status.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let graph = state.graph.read().await;
    (StatusCode::OK, Json(StatusResponse::from(graph.stats())))
}

// =============================================================================
// ENTITY HANDLERS
// =============================================================================

/// Fetch one entity. Unreadable entities are reported as not found.
pub async fn get_entity_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let user = acting_user(&headers);
    let graph = state.graph.read().await;
    match graph.get_readable(&EntityId::new(id), user.as_ref()) {
        Some(entity) => (StatusCode::OK, Json(EntityResponse::found(entity.snapshot()))),
        None => (StatusCode::NOT_FOUND, Json(EntityResponse::not_found())),
    }
}

/// Create a concept or relation type.
pub async fn create_entity_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateEntityRequest>,
) -> impl IntoResponse {
    let (id, classification) = match request.to_parts() {
        Ok(parts) => parts,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(WriteResponse::error(format!("Invalid entity: {}", e))),
            );
        }
    };

    let result = {
        let mut graph = state.graph.write().await;
        let owner = owner_of(&headers, &graph);
        graph.put_entity(id, &classification, &request.payload, owner)
    };
    written(&state, result, "Create entity")
}

/// Create a relation instance and index its role bindings.
pub async fn create_relation_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateRelationRequest>,
) -> impl IntoResponse {
    let (id, binding) = match request.to_binding() {
        Ok(parts) => parts,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(WriteResponse::error(format!("Invalid relation: {}", e))),
            );
        }
    };

    let result = {
        let mut graph = state.graph.write().await;
        let owner = owner_of(&headers, &graph);
        graph.put_relation(id, &binding, owner)
    };
    written(&state, result, "Create relation")
}

/// Replace an entity's payload. Only its owner may.
pub async fn update_payload_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<UpdatePayloadRequest>,
) -> impl IntoResponse {
    let user = acting_user(&headers);
    let result = {
        let mut graph = state.graph.write().await;
        graph.update_payload(&EntityId::new(id), &request.payload, user.as_ref())
    };
    written(&state, result, "Update payload")
}

// =============================================================================
// QUERY HANDLER
// =============================================================================

/// Evaluate a query definition once.
pub async fn query_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<QueryRequest>,
) -> impl IntoResponse {
    let user = acting_user(&headers);
    let graph = state.graph.read().await;
    match graph.query(&request.query, user.as_ref()) {
        Ok(rows) => (StatusCode::OK, Json(QueryResponse::with_rows(rows))),
        Err(e) => (
            status_for(&e),
            Json(QueryResponse::error(format!("Query failed: {}", e))),
        ),
    }
}

// =============================================================================
// DOCUMENT HANDLERS
// =============================================================================

/// Export the replicated document of a readable entity.
pub async fn export_document_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let id = EntityId::new(id);
    let user = acting_user(&headers);
    let mut graph = state.graph.write().await;

    if graph.get_readable(&id, user.as_ref()).is_none() {
        return (
            StatusCode::NOT_FOUND,
            Json(DocumentResponse::error(&id, "Entity not found")),
        );
    }
    match graph.export_document(&id) {
        Some(bytes) => (StatusCode::OK, Json(DocumentResponse::success(&id, &bytes))),
        None => (
            StatusCode::NOT_FOUND,
            Json(DocumentResponse::error(&id, "Entity not found")),
        ),
    }
}

/// Merge a remote replica of a document. Only its owner may.
pub async fn merge_document_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<MergeRequest>,
) -> impl IntoResponse {
    let user = acting_user(&headers);
    let bytes = match request.decode() {
        Ok(bytes) => bytes,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(WriteResponse::error(format!("Invalid document: {}", e))),
            );
        }
    };

    let result = {
        let mut graph = state.graph.write().await;
        graph.merge_document(&EntityId::new(id), &bytes, user.as_ref())
    };
    written(&state, result, "Merge document")
}

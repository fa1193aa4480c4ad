//! # Bridi HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Graph counters and revision
//! - `GET /entities/{id}` - Fetch one readable entity
//! - `POST /entities` - Create a concept or relation type
//! - `POST /relations` - Create a relation instance
//! - `PUT /entities/{id}/payload` - Replace a payload
//! - `POST /query` - Evaluate a query definition
//! - `GET /documents/{id}` - Export a replicated document (base64)
//! - `POST /documents/{id}/merge` - Merge a remote replica
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `BRIDI_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `BRIDI_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `BRIDI_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{API_KEY_ENV, get_api_key_from_env, keys_match};
pub use handlers::{
    USER_HEADER, acting_user, create_entity_handler, create_relation_handler,
    export_document_handler, get_entity_handler, health_handler, merge_document_handler,
    query_handler, status_for, status_handler, update_payload_handler,
};
pub use middleware::{RATE_LIMIT_ENV, create_rate_limiter, get_rate_limit_from_env};
pub use types::{
    CreateEntityRequest, CreateRelationRequest, DocumentResponse, EntityResponse, HealthResponse,
    MergeRequest, QueryRequest, QueryResponse, StatusResponse, UpdatePayloadRequest,
    WriteResponse,
};

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post, put},
};
use bridi_core::{GraphError, LiveQuery, SemanticGraph};
use std::sync::Arc;
use tokio::sync::{RwLock, watch};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Environment variable holding the allowed CORS origins.
pub const CORS_ORIGINS_ENV: &str = "BRIDI_CORS_ORIGINS";

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state: the graph and the revision signal that live
/// queries subscribe to.
#[derive(Clone)]
pub struct AppState {
    pub graph: Arc<RwLock<SemanticGraph>>,
    revisions: watch::Sender<u64>,
}

impl AppState {
    #[must_use]
    pub fn new(graph: SemanticGraph) -> Self {
        let (revisions, _) = watch::channel(graph.revision());
        Self {
            graph: Arc::new(RwLock::new(graph)),
            revisions,
        }
    }

    /// Receiver of the latest committed revision.
    #[must_use]
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.revisions.subscribe()
    }

    /// Announce a committed write.
    pub fn notify(&self, revision: u64) {
        self.revisions.send_replace(revision);
        tracing::debug!(revision, "revision published");
    }

    /// A live query driver over this state's graph.
    #[must_use]
    pub fn live_query(&self) -> LiveQuery {
        LiveQuery::new(self.graph.clone())
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build CORS layer from `BRIDI_CORS_ORIGINS`.
///
/// - "*": allows all origins (development only)
/// - unset: localhost only
/// - otherwise: comma-separated list of allowed origins
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var(CORS_ORIGINS_ENV).ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (BRIDI_CORS_ORIGINS=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in BRIDI_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                restricted_cors(allowed_origins)
            }
        }
        None => {
            tracing::info!("CORS: No BRIDI_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|origin| origin.parse::<HeaderValue>().ok())
    .collect();

    restricted_cors(origins)
}

fn restricted_cors(origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(USER_HEADER),
        ])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Rate Limiting (if enabled)
/// 4. Authentication (if configured)
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer();

    let rate_limit = get_rate_limit_from_env();
    let rate_limiter = create_rate_limiter(rate_limit);
    if rate_limiter.is_some() {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
    } else {
        tracing::info!("Rate limiting disabled");
    }

    let has_auth = get_api_key_from_env().is_some();
    if has_auth {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED - all endpoints are publicly accessible! \
             Set BRIDI_API_KEY environment variable to enable authentication."
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/entities", post(handlers::create_entity_handler))
        .route("/entities/{id}", get(handlers::get_entity_handler))
        .route("/entities/{id}/payload", put(handlers::update_payload_handler))
        .route("/relations", post(handlers::create_relation_handler))
        .route("/query", post(handlers::query_handler))
        .route("/documents/{id}", get(handlers::export_document_handler))
        .route("/documents/{id}/merge", post(handlers::merge_document_handler));

    if has_auth {
        router = router.layer(axum_middleware::from_fn(auth::api_key_auth_middleware));
    }

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Serve the API until the process is stopped.
pub async fn run_server(addr: &str, graph: SemanticGraph) -> Result<(), GraphError> {
    let router = create_router(AppState::new(graph));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| GraphError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("Bridi HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| GraphError::IoError(format!("Server error: {}", e)))
}

// =============================================================================
// TESTS
// =============================================================================

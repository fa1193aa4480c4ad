//! # bridi-core
//!
//! A semantic graph store over replicated documents.
//!
//! Every entity (concept, relation type, relation instance) is one
//! replicated document. A relationship index, itself made of three
//! documents, maps `(relation type, role, entity)` to the relation
//! instances binding that entity at that role, so traversals never scan.
//! Queries are declarative JSON-shaped definitions compiled once and
//! evaluated against the store.
//!
//! ## Layout
//!
//! - `store`, `document`: entity documents and their arena
//! - `index`: the relationship index
//! - `path`, `field`: parsed field paths and their resolution
//! - `query`, `executor`, `traversal`, `resolve`: the query engine
//! - `capability`: read permission checks
//! - `graph`: the facade that keeps store and index in step
//! - `live` (feature `live`): debounced live queries on tokio
//!
//! ## Constraints
//!
//! - Deterministic ordering: `BTreeMap` everywhere, index lists keep
//!   insertion order
//! - Reads never fail: not-found and access-denied degrade to absence
//! - The index is append-only

// =============================================================================
// MODULES
// =============================================================================

pub mod capability;
pub mod document;
pub mod executor;
pub mod field;
pub mod formats;
pub mod graph;
pub mod index;
#[cfg(feature = "live")]
pub mod live;
pub mod path;
pub mod primitives;
pub mod query;
pub mod resolve;
pub mod seed;
pub mod storage;
pub mod store;
pub mod traversal;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    AccessDescriptor, Classification, EntityId, GraphError, Kind, Payload, PayloadKind,
    RelationBinding, Role, TreeNode, UserId,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use capability::{AllowAll, Capability, OwnerPolicy};
pub use document::{EntityDoc, EntitySnapshot};
pub use executor::{Executor, QueryContext, Row};
pub use field::FieldResolver;
pub use graph::{GraphStats, SemanticGraph};
pub use index::{IndexStats, RelationshipIndex};
#[cfg(feature = "live")]
pub use live::{LiveQuery, LiveState};
pub use path::{FieldPath, PathBase, Segment};
pub use query::{Cardinality, Query, QueryDef};
pub use resolve::ResolveDirective;
pub use seed::SeedSet;
pub use store::{EntityStore, StorageBackend};
pub use traversal::{TraversalEngine, TraversalResult};

// =============================================================================
// RE-EXPORTS: Formats and Storage
// =============================================================================

pub use formats::{PersistenceHeader, StoredDocument, document_from_bytes, document_to_bytes};
pub use storage::RedbDocuments;

//! # Innate Primitives
//!
//! Hardcoded runtime constants for the Bridi graph store.
//!
//! These values are compiled into the binary and are immutable at runtime:
//! reserved index ids, the composite-key separator, persistence framing and
//! the bounds that keep every query computationally finite.

// =============================================================================
// INDEX DOCUMENTS
// =============================================================================

/// Id of the entity-existence index (key = entity id, value = kind marker).
pub const ENTITY_INDEX_ID: &str = "@index_entities";

/// Id of the relation-type-existence index (key = relation type id).
pub const RELATION_TYPE_INDEX_ID: &str = "@index_relation_types";

/// Id of the relation-instance index (key = composite key, value = list of ids).
pub const RELATION_INDEX_ID: &str = "@index_relations";

/// Separator of the composite key `"<relationTypeId>:<role>:<entityId>"`.
///
/// Entity ids may not contain it.
pub const KEY_SEPARATOR: char = ':';

/// Relation type binding an entity (x1) to a property value (x2). An
/// instance whose x2 is a text label with a display name is the entity's
/// name relation.
pub const PROPERTY_RELATION_TYPE: &str = "@ckaji";

/// Owner of the seed set and the index documents.
///
/// Documents owned by this identity are readable by everyone.
pub const GENESIS_OWNER: &str = "genesis";

// =============================================================================
// PERSISTENCE
// =============================================================================

/// Magic bytes for the stored-document format header.
///
/// - Header = Magic Bytes ("BRDI") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"BRDI";

/// Current serialization format version.
///
/// Increment this when making breaking changes to the serialization format.
pub const FORMAT_VERSION: u8 = 1;

// =============================================================================
// QUERY LIMITS
// =============================================================================

/// Maximum nesting of `map`, `traverse` and `resolve` blocks in one query.
///
/// Checked when the query is compiled, so evaluation recursion is bounded.
pub const MAX_QUERY_DEPTH: usize = 16;

/// Maximum number of segments in a field path.
pub const MAX_PATH_SEGMENTS: usize = 32;

/// Maximum number of explicit starting ids in one query.
pub const MAX_START_IDS: usize = 10_000;

/// Default debounce delay of the live query driver, in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 50;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for entity ids.
pub const MAX_ID_LENGTH: usize = 256;

/// Maximum length for a text payload (64KB).
pub const MAX_TEXT_LENGTH: usize = 65536;

/// Maximum number of nodes in a tree payload.
pub const MAX_TREE_NODES: usize = 10_000;

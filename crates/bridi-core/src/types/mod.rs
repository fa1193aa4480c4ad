//! # Core Type Definitions
//!
//! This module contains the data model of the semantic graph:
//! - Identifiers (`EntityId`, `UserId`) and role slots (`Role`)
//! - Entity classification (`Kind`, `Classification`)
//! - Payload variants (`Payload`, `PayloadKind`, `TreeNode`)
//! - Relation bindings (`RelationBinding`)
//! - Access descriptors (`AccessDescriptor`)
//! - Error types (`GraphError`)
//!
//! ## Determinism Guarantees
//!
//! Every map in this module is a `BTreeMap`, so iteration order (and therefore
//! index build order and query output order) never depends on hashing.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Globally unique, stable identifier of an entity.
///
/// Ids are immutable for the lifetime of the entity. By convention seed ids
/// start with `@` (e.g. `@person1`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Create a new entity id from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque identity of the acting user.
///
/// Only compared for equality (session changes, ownership checks).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// ROLES
// =============================================================================

/// A role slot ("place") of a relation type or relation instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    X1,
    X2,
    X3,
    X4,
    X5,
}

impl Role {
    /// All role slots in declaration order.
    pub const ALL: [Role; 5] = [Role::X1, Role::X2, Role::X3, Role::X4, Role::X5];

    /// The wire name of the role (`x1`..`x5`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::X1 => "x1",
            Role::X2 => "x2",
            Role::X3 => "x3",
            Role::X4 => "x4",
            Role::X5 => "x5",
        }
    }

    /// Parse a role from its wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.as_str() == s)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// CLASSIFICATION
// =============================================================================

/// The kind of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Kind {
    /// Plain node ("Sumti"), possibly carrying a value payload.
    Concept,
    /// Relation instance ("Bridi").
    Relation,
    /// Relation type ("Selbri").
    RelationType,
    /// One of the three index documents.
    Index,
}

impl Kind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Kind::Concept => "Concept",
            Kind::Relation => "Relation",
            Kind::RelationType => "RelationType",
            Kind::Index => "Index",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        [Kind::Concept, Kind::Relation, Kind::RelationType, Kind::Index]
            .into_iter()
            .find(|kind| kind.as_str() == s)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification record of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub kind: Kind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Classification {
    #[must_use]
    pub const fn new(kind: Kind) -> Self {
        Self {
            kind,
            display_name: None,
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

// =============================================================================
// PAYLOAD
// =============================================================================

/// Discriminator of the payload variant, stored next to the payload container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Concept,
    Text,
    List,
    Map,
    Tree,
}

impl PayloadKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PayloadKind::Concept => "concept",
            PayloadKind::Text => "text",
            PayloadKind::List => "list",
            PayloadKind::Map => "map",
            PayloadKind::Tree => "tree",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        [
            PayloadKind::Concept,
            PayloadKind::Text,
            PayloadKind::List,
            PayloadKind::Map,
            PayloadKind::Tree,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == s)
    }
}

/// A node of a hierarchical tree payload.
///
/// Stored as a map `{ value, children: [...] }` inside the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(default)]
    pub value: JsonValue,
    #[serde(default)]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    #[must_use]
    pub fn leaf(value: impl Into<JsonValue>) -> Self {
        Self {
            value: value.into(),
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including itself.
    #[must_use]
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(TreeNode::size).sum::<usize>()
    }
}

/// Payload of an entity.
///
/// Text, list, map and tree payloads are written into replicated containers;
/// a concept payload is a bare existence marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Payload {
    Concept,
    Text(String),
    List(Vec<JsonValue>),
    Map(serde_json::Map<String, JsonValue>),
    Tree(TreeNode),
}

impl Payload {
    #[must_use]
    pub const fn kind(&self) -> PayloadKind {
        match self {
            Payload::Concept => PayloadKind::Concept,
            Payload::Text(_) => PayloadKind::Text,
            Payload::List(_) => PayloadKind::List,
            Payload::Map(_) => PayloadKind::Map,
            Payload::Tree(_) => PayloadKind::Tree,
        }
    }

    /// Map payload of a relation instance.
    #[must_use]
    pub fn binding(binding: &RelationBinding) -> Self {
        let roles: serde_json::Map<String, JsonValue> = binding
            .roles
            .iter()
            .map(|(role, id)| (role.as_str().to_string(), JsonValue::String(id.0.clone())))
            .collect();
        let mut map = serde_json::Map::new();
        map.insert(
            "relationType".to_string(),
            JsonValue::String(binding.relation_type.0.clone()),
        );
        map.insert("roles".to_string(), JsonValue::Object(roles));
        Payload::Map(map)
    }

    /// Map payload of a relation type: role name to role description.
    #[must_use]
    pub fn role_descriptions<'a>(roles: impl IntoIterator<Item = (Role, &'a str)>) -> Self {
        Payload::Map(
            roles
                .into_iter()
                .map(|(role, desc)| (role.as_str().to_string(), JsonValue::from(desc)))
                .collect(),
        )
    }
}

// =============================================================================
// RELATION BINDING
// =============================================================================

/// Role bindings of a relation instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationBinding {
    pub relation_type: EntityId,
    #[serde(default)]
    pub roles: BTreeMap<Role, EntityId>,
}

impl RelationBinding {
    #[must_use]
    pub fn new(relation_type: impl Into<EntityId>) -> Self {
        Self {
            relation_type: relation_type.into(),
            roles: BTreeMap::new(),
        }
    }

    /// Builder-style role binding.
    #[must_use]
    pub fn bind(mut self, role: Role, entity: impl Into<EntityId>) -> Self {
        self.roles.insert(role, entity.into());
        self
    }

    #[must_use]
    pub fn bound(&self, role: Role) -> Option<&EntityId> {
        self.roles.get(&role)
    }
}

// =============================================================================
// ACCESS
// =============================================================================

/// What the capability predicate sees of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDescriptor {
    pub id: EntityId,
    pub owner: UserId,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the graph store.
///
/// Not-found and access-denied conditions during queries never become
/// errors; they degrade to absent values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// An index key already holds a non-list value.
    #[error("Index schema conflict: expected list at key '{key}'")]
    SchemaConflict { key: String },

    #[error("Invalid field path: {0}")]
    InvalidPath(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid entity id: {0:?}")]
    InvalidId(String),

    #[error("Entity already exists: {0}")]
    EntityExists(EntityId),

    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Index documents are maintained by the store and cannot be written directly.
    #[error("Entity is read-only: {0}")]
    ReadOnly(EntityId),

    /// The acting user may not modify this entity.
    #[error("Write not permitted on {0}")]
    Forbidden(EntityId),

    #[error("Document error: {0}")]
    Document(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<automerge::AutomergeError> for GraphError {
    fn from(e: automerge::AutomergeError) -> Self {
        GraphError::Document(e.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn role_parse_roundtrip() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("x6"), None);
        assert_eq!(Role::parse("X1"), None);
    }

    #[test]
    fn role_serde_is_lowercase() {
        let json = serde_json::to_string(&Role::X3).expect("serialize");
        assert_eq!(json, "\"x3\"");
    }

    #[test]
    fn kind_parse_rejects_unknown() {
        assert_eq!(Kind::parse("RelationType"), Some(Kind::RelationType));
        assert_eq!(Kind::parse("Selbri"), None);
    }

    #[test]
    fn binding_payload_shape() {
        let binding = RelationBinding::new("@gunka")
            .bind(Role::X1, "@person2")
            .bind(Role::X3, "@project1");
        let Payload::Map(map) = Payload::binding(&binding) else {
            panic!("binding payload must be a map");
        };
        assert_eq!(map["relationType"], "@gunka");
        assert_eq!(map["roles"]["x1"], "@person2");
        assert_eq!(map["roles"]["x3"], "@project1");
        assert!(map["roles"].get("x2").is_none());
    }

    #[test]
    fn payload_serde_is_tagged() {
        let payload: Payload =
            serde_json::from_str(r#"{"kind":"text","value":"Alice"}"#).expect("deserialize");
        assert_eq!(payload, Payload::Text("Alice".to_string()));

        let concept: Payload = serde_json::from_str(r#"{"kind":"concept"}"#).expect("deserialize");
        assert_eq!(concept.kind(), PayloadKind::Concept);
    }

    #[test]
    fn tree_size_counts_all_nodes() {
        let tree = TreeNode {
            value: "root".into(),
            children: vec![TreeNode::leaf("a"), TreeNode::leaf("b")],
        };
        assert_eq!(tree.size(), 3);
    }
}

//! # Entity Documents
//!
//! Every entity lives in its own replicated `automerge` document, so two
//! replicas can edit the same entity independently and merge later.
//!
//! Document layout (all keys at the document root):
//!
//! | key              | value                                              |
//! |------------------|----------------------------------------------------|
//! | `id`             | scalar string, the entity id                       |
//! | `owner`          | scalar string, the owning user                     |
//! | `classification` | map `{ kind, displayName? }`                       |
//! | `payloadKind`    | scalar string: concept, text, list, map or tree    |
//! | `payload`        | text / list / map container (absent for concepts)  |
//!
//! Tree payloads are maps `{ value, children: [ <tree>, ... ] }`.

use crate::types::{
    AccessDescriptor, Classification, EntityId, GraphError, Kind, Payload, PayloadKind,
    RelationBinding, Role, TreeNode, UserId,
};
use automerge::transaction::Transactable;
use automerge::{ActorId, AutoCommit, ObjId, ObjType, ROOT, ReadDoc, ScalarValue, Value};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub(crate) const KEY_ID: &str = "id";
pub(crate) const KEY_OWNER: &str = "owner";
pub(crate) const KEY_CLASSIFICATION: &str = "classification";
pub(crate) const KEY_KIND: &str = "kind";
pub(crate) const KEY_DISPLAY_NAME: &str = "displayName";
pub(crate) const KEY_PAYLOAD_KIND: &str = "payloadKind";
pub(crate) const KEY_PAYLOAD: &str = "payload";

const KEY_RELATION_TYPE: &str = "relationType";
const KEY_ROLES: &str = "roles";
const KEY_TREE_VALUE: &str = "value";
const KEY_TREE_CHILDREN: &str = "children";

// =============================================================================
// ENTITY DOCUMENT
// =============================================================================

/// One entity backed by one replicated document.
///
/// Id, kind and owner are fixed at creation and cached outside the document.
pub struct EntityDoc {
    id: EntityId,
    kind: Kind,
    owner: UserId,
    doc: AutoCommit,
}

impl std::fmt::Debug for EntityDoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityDoc")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

impl EntityDoc {
    /// Create a new document for an entity.
    pub fn create(
        id: EntityId,
        classification: &Classification,
        payload: &Payload,
        owner: UserId,
        actor: ActorId,
    ) -> Result<Self, GraphError> {
        let mut doc = AutoCommit::new().with_actor(actor);
        doc.put(ROOT, KEY_ID, id.as_str())?;
        doc.put(ROOT, KEY_OWNER, owner.as_str())?;

        let class = doc.put_object(ROOT, KEY_CLASSIFICATION, ObjType::Map)?;
        doc.put(&class, KEY_KIND, classification.kind.as_str())?;
        if let Some(name) = &classification.display_name {
            doc.put(&class, KEY_DISPLAY_NAME, name.as_str())?;
        }

        write_payload(&mut doc, payload)?;

        Ok(Self {
            id,
            kind: classification.kind,
            owner,
            doc,
        })
    }

    /// Load a document from snapshot bytes, writing future changes as `actor`.
    pub fn load(bytes: &[u8], actor: ActorId) -> Result<Self, GraphError> {
        let doc = AutoCommit::load(bytes)?.with_actor(actor);

        let id = get_str(&doc, &ROOT, KEY_ID)
            .ok_or_else(|| GraphError::Document("document has no id".to_string()))?;
        let owner = get_str(&doc, &ROOT, KEY_OWNER)
            .ok_or_else(|| GraphError::Document(format!("document {} has no owner", id)))?;
        let kind = get_obj(&doc, &ROOT, KEY_CLASSIFICATION)
            .and_then(|(class, _)| get_str(&doc, &class, KEY_KIND))
            .and_then(|k| Kind::parse(&k))
            .ok_or_else(|| GraphError::Document(format!("document {} has no kind", id)))?;

        Ok(Self {
            id: EntityId(id),
            kind,
            owner: UserId(owner),
            doc,
        })
    }

    #[must_use]
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    #[must_use]
    pub fn owner(&self) -> &UserId {
        &self.owner
    }

    /// The descriptor handed to the capability predicate.
    #[must_use]
    pub fn access(&self) -> AccessDescriptor {
        AccessDescriptor {
            id: self.id.clone(),
            owner: self.owner.clone(),
        }
    }

    /// Current classification record (display name may come from a merge).
    #[must_use]
    pub fn classification(&self) -> Classification {
        let display_name = self
            .classification_obj()
            .and_then(|class| get_str(&self.doc, &class, KEY_DISPLAY_NAME));
        Classification {
            kind: self.kind,
            display_name,
        }
    }

    #[must_use]
    pub fn payload_kind(&self) -> PayloadKind {
        get_str(&self.doc, &ROOT, KEY_PAYLOAD_KIND)
            .and_then(|k| PayloadKind::parse(&k))
            .unwrap_or(PayloadKind::Concept)
    }

    /// Detached copy of the payload.
    #[must_use]
    pub fn payload(&self) -> Payload {
        let kind = self.payload_kind();
        let Some((obj, ty)) = self.payload_obj() else {
            return Payload::Concept;
        };
        match (kind, materialize(&self.doc, &obj, ty)) {
            (PayloadKind::Concept, _) => Payload::Concept,
            (PayloadKind::Text, JsonValue::String(s)) => Payload::Text(s),
            (PayloadKind::List, JsonValue::Array(items)) => Payload::List(items),
            (PayloadKind::Map, JsonValue::Object(map)) => Payload::Map(map),
            (PayloadKind::Tree, value) => serde_json::from_value(value)
                .map(Payload::Tree)
                .unwrap_or_else(|_| Payload::Tree(TreeNode::leaf(JsonValue::Null))),
            (_, _) => Payload::Concept,
        }
    }

    /// Role bindings, when the payload has the relation-instance shape.
    #[must_use]
    pub fn binding(&self) -> Option<RelationBinding> {
        let (payload, ty) = self.payload_obj()?;
        if !matches!(ty, ObjType::Map | ObjType::Table) {
            return None;
        }
        let relation_type = get_str(&self.doc, &payload, KEY_RELATION_TYPE)?;
        let mut binding = RelationBinding::new(EntityId(relation_type));
        if let Some((roles, _)) = get_obj(&self.doc, &payload, KEY_ROLES) {
            for role in Role::ALL {
                if let Some(bound) = get_str(&self.doc, &roles, role.as_str()) {
                    binding.roles.insert(role, EntityId(bound));
                }
            }
        }
        Some(binding)
    }

    /// Replace the payload inside the document.
    pub fn replace_payload(&mut self, payload: &Payload) -> Result<(), GraphError> {
        write_payload(&mut self.doc, payload)
    }

    /// Full snapshot of the document.
    pub fn save(&mut self) -> Vec<u8> {
        self.doc.save()
    }

    /// Merge a remote replica's snapshot into this document.
    pub fn merge_bytes(&mut self, bytes: &[u8]) -> Result<(), GraphError> {
        let mut remote = AutoCommit::load(bytes)?;
        match get_str(&remote, &ROOT, KEY_ID) {
            Some(id) if id == self.id.0 => {}
            Some(id) => {
                return Err(GraphError::Document(format!(
                    "cannot merge document {} into {}",
                    id, self.id
                )));
            }
            None => {
                return Err(GraphError::Document("document has no id".to_string()));
            }
        }
        self.doc.merge(&mut remote)?;
        Ok(())
    }

    /// Plain, serializable view of the entity.
    #[must_use]
    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            id: self.id.clone(),
            owner: self.owner.clone(),
            classification: self.classification(),
            payload: self.payload(),
        }
    }

    pub(crate) fn doc(&self) -> &AutoCommit {
        &self.doc
    }

    pub(crate) fn doc_mut(&mut self) -> &mut AutoCommit {
        &mut self.doc
    }

    pub(crate) fn classification_obj(&self) -> Option<ObjId> {
        get_obj(&self.doc, &ROOT, KEY_CLASSIFICATION).map(|(obj, _)| obj)
    }

    pub(crate) fn payload_obj(&self) -> Option<(ObjId, ObjType)> {
        get_obj(&self.doc, &ROOT, KEY_PAYLOAD)
    }
}

/// Detached view of an entity, as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub owner: UserId,
    pub classification: Classification,
    pub payload: Payload,
}

// =============================================================================
// READ HELPERS
// =============================================================================

pub(crate) fn get_str(doc: &AutoCommit, obj: &ObjId, key: &str) -> Option<String> {
    match doc.get(obj, key) {
        Ok(Some((Value::Scalar(s), _))) => match s.as_ref() {
            ScalarValue::Str(s) => Some(s.to_string()),
            _ => None,
        },
        _ => None,
    }
}

pub(crate) fn get_obj(doc: &AutoCommit, obj: &ObjId, key: &str) -> Option<(ObjId, ObjType)> {
    match doc.get(obj, key) {
        Ok(Some((Value::Object(ty), id))) => Some((id, ty)),
        _ => None,
    }
}

/// Plain JSON for a scalar.
pub(crate) fn scalar_to_json(scalar: &ScalarValue) -> JsonValue {
    match scalar {
        ScalarValue::Str(s) => JsonValue::String(s.to_string()),
        ScalarValue::Int(i) => JsonValue::from(*i),
        ScalarValue::Uint(u) => JsonValue::from(*u),
        ScalarValue::F64(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ScalarValue::Boolean(b) => JsonValue::Bool(*b),
        ScalarValue::Timestamp(t) => JsonValue::from(*t),
        _ => JsonValue::Null,
    }
}

/// Detached JSON copy of a container and everything below it.
pub(crate) fn materialize(doc: &AutoCommit, obj: &ObjId, ty: ObjType) -> JsonValue {
    match ty {
        ObjType::Map | ObjType::Table => {
            let mut out = serde_json::Map::new();
            for key in doc.keys(obj) {
                if let Ok(Some((value, id))) = doc.get(obj, key.as_str()) {
                    let json = value_to_json(doc, value, &id);
                    out.insert(key, json);
                }
            }
            JsonValue::Object(out)
        }
        ObjType::List => JsonValue::Array(
            (0..doc.length(obj))
                .filter_map(|i| doc.get(obj, i).ok().flatten())
                .map(|(value, id)| value_to_json(doc, value, &id))
                .collect(),
        ),
        ObjType::Text => doc
            .text(obj)
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null),
    }
}

pub(crate) fn value_to_json(doc: &AutoCommit, value: Value<'_>, id: &ObjId) -> JsonValue {
    match value {
        Value::Object(ty) => materialize(doc, id, ty),
        Value::Scalar(s) => scalar_to_json(&s),
    }
}

// =============================================================================
// WRITE HELPERS
// =============================================================================

fn write_payload(doc: &mut AutoCommit, payload: &Payload) -> Result<(), GraphError> {
    doc.put(ROOT, KEY_PAYLOAD_KIND, payload.kind().as_str())?;
    match payload {
        Payload::Concept => {
            if doc.get(ROOT, KEY_PAYLOAD)?.is_some() {
                doc.delete(ROOT, KEY_PAYLOAD)?;
            }
        }
        Payload::Text(s) => {
            let text = doc.put_object(ROOT, KEY_PAYLOAD, ObjType::Text)?;
            doc.splice_text(&text, 0, 0, s)?;
        }
        Payload::List(items) => {
            let list = doc.put_object(ROOT, KEY_PAYLOAD, ObjType::List)?;
            for (i, item) in items.iter().enumerate() {
                insert_json(doc, &list, i, item)?;
            }
        }
        Payload::Map(map) => {
            let obj = doc.put_object(ROOT, KEY_PAYLOAD, ObjType::Map)?;
            for (key, value) in map {
                put_json(doc, &obj, key, value)?;
            }
        }
        Payload::Tree(node) => {
            let obj = doc.put_object(ROOT, KEY_PAYLOAD, ObjType::Map)?;
            write_tree(doc, &obj, node)?;
        }
    }
    Ok(())
}

fn write_tree(doc: &mut AutoCommit, obj: &ObjId, node: &TreeNode) -> Result<(), GraphError> {
    put_json(doc, obj, KEY_TREE_VALUE, &node.value)?;
    let children = doc.put_object(obj, KEY_TREE_CHILDREN, ObjType::List)?;
    for (i, child) in node.children.iter().enumerate() {
        let child_obj = doc.insert_object(&children, i, ObjType::Map)?;
        write_tree(doc, &child_obj, child)?;
    }
    Ok(())
}

fn json_to_scalar(value: &JsonValue) -> ScalarValue {
    match value {
        JsonValue::Bool(b) => ScalarValue::Boolean(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                ScalarValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                ScalarValue::Uint(u)
            } else {
                n.as_f64().map(ScalarValue::F64).unwrap_or(ScalarValue::Null)
            }
        }
        JsonValue::String(s) => ScalarValue::Str(s.as_str().into()),
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => ScalarValue::Null,
    }
}

/// Write a JSON value under `key` of a map container.
pub(crate) fn put_json(
    doc: &mut AutoCommit,
    obj: &ObjId,
    key: &str,
    value: &JsonValue,
) -> Result<(), GraphError> {
    match value {
        JsonValue::Object(map) => {
            let child = doc.put_object(obj, key, ObjType::Map)?;
            for (k, v) in map {
                put_json(doc, &child, k, v)?;
            }
        }
        JsonValue::Array(items) => {
            let child = doc.put_object(obj, key, ObjType::List)?;
            for (i, item) in items.iter().enumerate() {
                insert_json(doc, &child, i, item)?;
            }
        }
        scalar => doc.put(obj, key, json_to_scalar(scalar))?,
    }
    Ok(())
}

/// Insert a JSON value at `index` of a list container.
pub(crate) fn insert_json(
    doc: &mut AutoCommit,
    obj: &ObjId,
    index: usize,
    value: &JsonValue,
) -> Result<(), GraphError> {
    match value {
        JsonValue::Object(map) => {
            let child = doc.insert_object(obj, index, ObjType::Map)?;
            for (k, v) in map {
                put_json(doc, &child, k, v)?;
            }
        }
        JsonValue::Array(items) => {
            let child = doc.insert_object(obj, index, ObjType::List)?;
            for (i, item) in items.iter().enumerate() {
                insert_json(doc, &child, i, item)?;
            }
        }
        scalar => doc.insert(obj, index, json_to_scalar(scalar))?,
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

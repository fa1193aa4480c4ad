//! # Query Definitions
//!
//! Two layers:
//! - `QueryDef` and friends: the serde surface, as written by callers
//!   (JSON over HTTP, query files on the CLI, in-process structs)
//! - `Query` and friends: the compiled form, with parsed paths, resolved
//!   roles and a bounded nesting depth
//!
//! Compilation is the only place a query can fail. Evaluation of a
//! compiled query never returns an error.
//!
//! ## Example
//!
//! ```json
//! {
//!   "from": { "ids": ["@project1"] },
//!   "map": {
//!     "tasks": {
//!       "traverse": {
//!         "relationType": "@gunka",
//!         "role": "x3",
//!         "map": {
//!           "worker": { "place": "x1", "field": "doc.id" },
//!           "task":   { "place": "x2", "field": "doc.id" }
//!         }
//!       }
//!     }
//!   }
//! }
//! ```

use crate::path::FieldPath;
use crate::primitives::{MAX_QUERY_DEPTH, MAX_START_IDS};
use crate::types::{EntityId, GraphError, Kind, Role};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

// =============================================================================
// DEFINITION SURFACE
// =============================================================================

/// Output specification as written: output key -> value definition.
pub type MapDef = BTreeMap<String, ValueDef>;

/// A query as written by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryDef {
    pub from: FromDef,
    #[serde(default)]
    pub map: MapDef,
    #[serde(default, rename = "where", skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<WhereDef>,
}

/// Starting-entity selectors.
///
/// `ids` lists explicit entities of any kind. For the per-kind selectors a
/// non-empty list is explicit and keeps only the listed ids of that kind,
/// and an empty list means "every known id of that kind".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FromDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<EntityId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept: Option<Vec<EntityId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_type: Option<Vec<EntityId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<Vec<EntityId>>,
}

/// How one output key gets its value.
///
/// When several sources are given, the first of `field`, `map`, `traverse`,
/// `resolve` wins. `place` is only valid inside a traversal map, where it is
/// required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ValueDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<MapDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traverse: Option<Box<TraverseDef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolve: Option<Box<ResolveDef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<Role>,
}

/// Result shape of a traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    #[default]
    Array,
    First,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TraverseDef {
    pub relation_type: EntityId,
    /// Role the source entity occupies in the relation instance.
    pub role: Role,
    #[serde(default, rename = "return")]
    pub cardinality: Cardinality,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub where_related: Vec<WhereRelatedDef>,
    #[serde(default)]
    pub map: MapDef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResolveDef {
    pub from_field: String,
    #[serde(default)]
    pub map: MapDef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WhereDef {
    pub field: String,
    pub condition: Condition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WhereRelatedDef {
    pub place: Role,
    pub field: String,
    pub condition: Condition,
}

/// Filter condition; all given parts must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<JsonValue>,
    #[serde(default, rename = "in", skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<JsonValue>>,
}

impl Condition {
    /// Evaluate against a resolved value. An absent value never matches.
    #[must_use]
    pub fn matches(&self, actual: Option<&JsonValue>) -> bool {
        let Some(actual) = actual else {
            return self.equals.is_none() && self.one_of.is_none();
        };
        let equals_ok = self.equals.as_ref().is_none_or(|expected| expected == actual);
        let member_ok = self.one_of.as_ref().is_none_or(|set| set.contains(actual));
        equals_ok && member_ok
    }
}

// =============================================================================
// COMPILED FORM
// =============================================================================

/// Compiled output specification, in key order.
pub type OutputSpec = BTreeMap<String, ValueSpec>;

#[derive(Debug, Clone, PartialEq)]
pub enum StartSelector {
    Ids(Vec<EntityId>),
    /// Listed ids, kept only when their entity is of the kind.
    IdsOf(Vec<EntityId>, Kind),
    AllOf(Kind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub path: FieldPath,
    pub condition: Condition,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelatedFilter {
    pub place: Role,
    pub filter: Filter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueSpec {
    /// Role whose bound entity the projection applies to (traversal maps only).
    pub place: Option<Role>,
    pub projection: Projection,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Field(FieldPath),
    Map(OutputSpec),
    Traverse(Box<Traversal>),
    Resolve(Box<Resolve>),
    /// `place` given alone: the bound entity's id.
    BoundId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Traversal {
    pub relation_type: EntityId,
    pub role: Role,
    pub cardinality: Cardinality,
    pub where_related: Vec<RelatedFilter>,
    pub map: OutputSpec,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolve {
    pub from_field: FieldPath,
    pub map: OutputSpec,
}

/// A compiled query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub start: Vec<StartSelector>,
    pub map: OutputSpec,
    pub filters: Vec<Filter>,
}

/// Where a map is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Against one entity (top level, nested `map`, `resolve`).
    Entity,
    /// Against a relation instance inside `traverse`.
    Relation,
}

impl Query {
    /// Compile a definition, rejecting malformed paths and shapes.
    pub fn compile(def: &QueryDef) -> Result<Self, GraphError> {
        let start = compile_from(&def.from)?;
        let filters = def
            .filters
            .iter()
            .map(|w| compile_filter(&w.field, &w.condition))
            .collect::<Result<Vec<_>, _>>()?;
        let map = compile_map(&def.map, Scope::Entity, 1)?;
        Ok(Self {
            start,
            map,
            filters,
        })
    }
}

impl TryFrom<&QueryDef> for Query {
    type Error = GraphError;

    fn try_from(def: &QueryDef) -> Result<Self, Self::Error> {
        Self::compile(def)
    }
}

fn compile_from(from: &FromDef) -> Result<Vec<StartSelector>, GraphError> {
    let mut start = Vec::new();
    let mut explicit = 0usize;

    if let Some(ids) = &from.ids {
        explicit += ids.len();
        if !ids.is_empty() {
            start.push(StartSelector::Ids(ids.clone()));
        }
    }
    for (selector, kind) in [
        (&from.concept, Kind::Concept),
        (&from.relation_type, Kind::RelationType),
        (&from.relation, Kind::Relation),
    ] {
        match selector {
            Some(ids) if ids.is_empty() => start.push(StartSelector::AllOf(kind)),
            Some(ids) => {
                explicit += ids.len();
                start.push(StartSelector::IdsOf(ids.clone(), kind));
            }
            None => {}
        }
    }

    if explicit > MAX_START_IDS {
        return Err(GraphError::InvalidQuery(format!(
            "from lists {} ids, maximum is {}",
            explicit, MAX_START_IDS
        )));
    }
    Ok(start)
}

fn compile_filter(field: &str, condition: &Condition) -> Result<Filter, GraphError> {
    Ok(Filter {
        path: FieldPath::parse(field)?,
        condition: condition.clone(),
    })
}

fn compile_map(map: &MapDef, scope: Scope, depth: usize) -> Result<OutputSpec, GraphError> {
    if depth > MAX_QUERY_DEPTH {
        return Err(GraphError::InvalidQuery(format!(
            "nesting exceeds maximum depth {}",
            MAX_QUERY_DEPTH
        )));
    }
    map.iter()
        .map(|(key, def)| compile_value(key, def, scope, depth).map(|spec| (key.clone(), spec)))
        .collect()
}

fn compile_value(
    key: &str,
    def: &ValueDef,
    scope: Scope,
    depth: usize,
) -> Result<ValueSpec, GraphError> {
    match (scope, def.place) {
        (Scope::Entity, Some(_)) => {
            return Err(GraphError::InvalidQuery(format!(
                "key {:?}: place is only valid inside a traverse map",
                key
            )));
        }
        (Scope::Relation, None) => {
            return Err(GraphError::InvalidQuery(format!(
                "key {:?}: traverse map entries need a place",
                key
            )));
        }
        _ => {}
    }

    let projection = if let Some(field) = &def.field {
        Projection::Field(FieldPath::parse(field)?)
    } else if let Some(map) = &def.map {
        Projection::Map(compile_map(map, Scope::Entity, depth + 1)?)
    } else if let Some(traverse) = &def.traverse {
        Projection::Traverse(Box::new(compile_traversal(traverse, depth + 1)?))
    } else if let Some(resolve) = &def.resolve {
        Projection::Resolve(Box::new(Resolve {
            from_field: FieldPath::parse(&resolve.from_field)?,
            map: compile_map(&resolve.map, Scope::Entity, depth + 1)?,
        }))
    } else if scope == Scope::Relation {
        Projection::BoundId
    } else {
        return Err(GraphError::InvalidQuery(format!(
            "key {:?} needs field, map, traverse or resolve",
            key
        )));
    };

    Ok(ValueSpec {
        place: def.place,
        projection,
    })
}

fn compile_traversal(def: &TraverseDef, depth: usize) -> Result<Traversal, GraphError> {
    let where_related = def
        .where_related
        .iter()
        .map(|w| {
            compile_filter(&w.field, &w.condition).map(|filter| RelatedFilter {
                place: w.place,
                filter,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Traversal {
        relation_type: def.relation_type.clone(),
        role: def.role,
        cardinality: def.cardinality,
        where_related,
        map: compile_map(&def.map, Scope::Relation, depth)?,
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn def(value: JsonValue) -> QueryDef {
        serde_json::from_value(value).expect("query definition")
    }

    #[test]
    fn compiles_gunka_traversal() {
        let query = Query::compile(&def(json!({
            "from": {"ids": ["@project1"]},
            "map": {
                "tasks": {"traverse": {
                    "relationType": "@gunka",
                    "role": "x3",
                    "map": {
                        "worker": {"place": "x1", "field": "doc.id"},
                        "task": {"place": "x2", "field": "doc.id"}
                    }
                }}
            }
        })))
        .expect("compile");

        assert_eq!(
            query.start,
            vec![StartSelector::Ids(vec![EntityId::from("@project1")])]
        );
        let Projection::Traverse(traversal) = &query.map["tasks"].projection else {
            panic!("expected traversal");
        };
        assert_eq!(traversal.role, Role::X3);
        assert_eq!(traversal.cardinality, Cardinality::Array);
        assert_eq!(traversal.map["worker"].place, Some(Role::X1));
    }

    #[test]
    fn empty_kind_selector_means_all() {
        let query = Query::compile(&def(json!({"from": {"relationType": []}, "map": {}})))
            .expect("compile");
        assert_eq!(query.start, vec![StartSelector::AllOf(Kind::RelationType)]);
    }

    #[test]
    fn empty_ids_selects_nothing() {
        let query =
            Query::compile(&def(json!({"from": {"ids": []}, "map": {}}))).expect("compile");
        assert!(query.start.is_empty());
    }

    #[test]
    fn traverse_map_requires_place() {
        let err = Query::compile(&def(json!({
            "from": {"ids": ["@project1"]},
            "map": {"t": {"traverse": {
                "relationType": "@gunka", "role": "x3",
                "map": {"worker": {"field": "doc.id"}}
            }}}
        })))
        .expect_err("place missing");
        assert!(matches!(err, GraphError::InvalidQuery(_)));
    }

    #[test]
    fn place_rejected_outside_traversal() {
        let err = Query::compile(&def(json!({
            "from": {"ids": ["@project1"]},
            "map": {"id": {"place": "x1", "field": "doc.id"}}
        })))
        .expect_err("place at top level");
        assert!(matches!(err, GraphError::InvalidQuery(_)));
    }

    #[test]
    fn place_alone_projects_bound_id() {
        let query = Query::compile(&def(json!({
            "from": {"ids": ["@project1"]},
            "map": {"t": {"traverse": {
                "relationType": "@gunka", "role": "x3",
                "map": {"worker": {"place": "x1"}}
            }}}
        })))
        .expect("compile");
        let Projection::Traverse(traversal) = &query.map["t"].projection else {
            panic!("expected traversal");
        };
        assert_eq!(traversal.map["worker"].projection, Projection::BoundId);
    }

    #[test]
    fn malformed_path_rejected_at_compile_time() {
        let err = Query::compile(&def(json!({
            "from": {"ids": ["@task1"]},
            "map": {"name": {"field": "self.ckaji.cmene"}}
        })))
        .expect_err("bad path");
        assert!(matches!(err, GraphError::InvalidPath(_)));
    }

    #[test]
    fn field_wins_over_traverse() {
        let query = Query::compile(&def(json!({
            "from": {"ids": ["@task1"]},
            "map": {"id": {
                "field": "doc.id",
                "traverse": {"relationType": "@ckaji", "role": "x1", "map": {}}
            }}
        })))
        .expect("compile");
        assert!(matches!(query.map["id"].projection, Projection::Field(_)));
    }

    #[test]
    fn depth_is_bounded() {
        let mut map = json!({"id": {"field": "doc.id"}});
        for _ in 0..=MAX_QUERY_DEPTH {
            map = json!({"nested": {"map": map}});
        }
        let err = Query::compile(&def(json!({"from": {"ids": ["@a"]}, "map": map})))
            .expect_err("too deep");
        assert!(matches!(err, GraphError::InvalidQuery(_)));
    }

    #[test]
    fn unknown_keys_rejected() {
        let result: Result<QueryDef, _> =
            serde_json::from_value(json!({"from": {"sumti": []}, "map": {}}));
        assert!(result.is_err());
    }

    #[test]
    fn condition_semantics() {
        let equals = Condition {
            equals: Some(json!("high")),
            one_of: None,
        };
        assert!(equals.matches(Some(&json!("high"))));
        assert!(!equals.matches(Some(&json!("low"))));
        assert!(!equals.matches(None));

        let member = Condition {
            equals: None,
            one_of: Some(vec![json!("a"), json!("b")]),
        };
        assert!(member.matches(Some(&json!("b"))));
        assert!(!member.matches(Some(&json!("c"))));

        let both = Condition {
            equals: Some(json!("a")),
            one_of: Some(vec![json!("b")]),
        };
        assert!(!both.matches(Some(&json!("a"))));
    }
}

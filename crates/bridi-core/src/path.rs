//! # Field Paths
//!
//! Parsed form of the dot-separated paths used by `field`, `where` and
//! `fromField`. Paths are parsed once when a query is compiled; a malformed
//! path rejects the query instead of failing per entity at evaluation time.
//!
//! Grammar:
//!
//! ```text
//! path     = "doc.id"
//!          | "self.classification" { "." segment }
//!          | "self.payload" { "." segment }
//! segment  = index | name
//! index    = "0" | [1-9][0-9]*
//! ```

use crate::primitives::MAX_PATH_SEGMENTS;
use crate::types::GraphError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Which record a path starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathBase {
    /// The entity's own id; takes no further segments.
    DocId,
    Classification,
    Payload,
}

/// One step below the base record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Field(String),
    Index(usize),
}

impl Segment {
    fn parse(s: &str) -> Self {
        let canonical = s == "0" || (!s.starts_with('0') && s.bytes().all(|b| b.is_ascii_digit()));
        match s.parse::<usize>() {
            Ok(i) if canonical => Segment::Index(i),
            _ => Segment::Field(s.to_string()),
        }
    }

    /// The segment as a map key.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Segment::Field(name) => name.clone(),
            Segment::Index(i) => i.to_string(),
        }
    }
}

/// A validated field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    base: PathBase,
    segments: Vec<Segment>,
    source: String,
}

impl FieldPath {
    /// The `doc.id` path.
    #[must_use]
    pub fn doc_id() -> Self {
        Self {
            base: PathBase::DocId,
            segments: Vec::new(),
            source: "doc.id".to_string(),
        }
    }

    pub fn parse(s: &str) -> Result<Self, GraphError> {
        if s == "doc.id" {
            return Ok(Self::doc_id());
        }

        let mut parts = s.split('.');
        let base = match (parts.next(), parts.next()) {
            (Some("self"), Some("classification")) => PathBase::Classification,
            (Some("self"), Some("payload")) => PathBase::Payload,
            _ => {
                return Err(GraphError::InvalidPath(format!(
                    "{:?} must be doc.id or start with self.classification or self.payload",
                    s
                )));
            }
        };

        let mut segments = Vec::new();
        for part in parts {
            if part.is_empty() {
                return Err(GraphError::InvalidPath(format!("{:?} has an empty segment", s)));
            }
            segments.push(Segment::parse(part));
        }
        if segments.len() > MAX_PATH_SEGMENTS {
            return Err(GraphError::InvalidPath(format!(
                "{:?} exceeds {} segments",
                s, MAX_PATH_SEGMENTS
            )));
        }

        Ok(Self {
            base,
            segments,
            source: s.to_string(),
        })
    }

    #[must_use]
    pub fn base(&self) -> PathBase {
        self.base
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// `self.classification.displayName`
    #[must_use]
    pub fn is_display_name(&self) -> bool {
        self.base == PathBase::Classification
            && matches!(self.segments.as_slice(), [Segment::Field(name)] if name == "displayName")
    }
}

impl FromStr for FieldPath {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_doc_id() {
        let path = FieldPath::parse("doc.id").expect("parse");
        assert_eq!(path.base(), PathBase::DocId);
        assert!(path.segments().is_empty());
    }

    #[test]
    fn parses_payload_segments() {
        let path = FieldPath::parse("self.payload.steps.0.title").expect("parse");
        assert_eq!(path.base(), PathBase::Payload);
        assert_eq!(
            path.segments(),
            &[
                Segment::Field("steps".to_string()),
                Segment::Index(0),
                Segment::Field("title".to_string()),
            ]
        );
    }

    #[test]
    fn leading_zero_is_a_name() {
        let path = FieldPath::parse("self.payload.01").expect("parse");
        assert_eq!(path.segments(), &[Segment::Field("01".to_string())]);
    }

    #[test]
    fn bare_base_has_no_segments() {
        let path = FieldPath::parse("self.classification").expect("parse");
        assert_eq!(path.base(), PathBase::Classification);
        assert!(path.segments().is_empty());
    }

    #[test]
    fn rejects_malformed_paths() {
        for bad in [
            "",
            "doc",
            "doc.id.extra",
            "self",
            "self.ckaji",
            "payload.x",
            "self.payload..x",
            "self.payload.",
        ] {
            assert!(FieldPath::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn rejects_too_many_segments() {
        let long = format!("self.payload{}", ".a".repeat(MAX_PATH_SEGMENTS + 1));
        assert!(FieldPath::parse(&long).is_err());
    }

    #[test]
    fn display_name_detection() {
        assert!(
            FieldPath::parse("self.classification.displayName")
                .expect("parse")
                .is_display_name()
        );
        assert!(
            !FieldPath::parse("self.classification.kind")
                .expect("parse")
                .is_display_name()
        );
    }

    #[test]
    fn serde_uses_source_string() {
        let path: FieldPath = serde_json::from_str("\"self.payload.title\"").expect("deserialize");
        assert_eq!(path.as_str(), "self.payload.title");
        assert!(serde_json::from_str::<FieldPath>("\"nope\"").is_err());
    }
}

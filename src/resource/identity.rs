//! Identities, realms and references between resources.

use super::coerce;
use super::kind::ResourceKind;
use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::fmt;

/// Identity of a resource within its type.
///
/// Most types are keyed by a single `id`; some (grades) by several fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(Vec<i64>);

impl Identity {
    pub fn single(id: i64) -> Self {
        Identity(vec![id])
    }

    pub fn composite(parts: impl Into<Vec<i64>>) -> Self {
        Identity(parts.into())
    }

    pub fn parts(&self) -> &[i64] {
        &self.0
    }

    /// The id of a single-field identity
    pub fn as_single(&self) -> Option<i64> {
        match self.0.as_slice() {
            [id] => Some(*id),
            _ => None,
        }
    }

    /// Derive an identity from the fields already present in `data`
    pub fn from_payload(fields: &[String], data: &Map<String, Value>) -> Result<Self> {
        let parts = fields
            .iter()
            .map(|field| match data.get(field) {
                Some(value) if !value.is_null() => coerce::to_int(value),
                _ => Err(Error::decode(format!("identity field `{}`", field), "missing value")),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Identity(parts))
    }

    /// Write the identity fields back into `data` where missing
    pub(crate) fn fill(&self, fields: &[String], data: &mut Map<String, Value>) {
        for (field, part) in fields.iter().zip(&self.0) {
            data.entry(field.clone()).or_insert_with(|| Value::from(*part));
        }
    }

    /// Parse `"7"` or `"5,9"`
    pub fn parse(s: &str) -> Result<Self> {
        let parts = s
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<i64>()
                    .map_err(|_| Error::decode("identifier", part))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Identity(parts))
    }
}

impl From<i64> for Identity {
    fn from(id: i64) -> Self {
        Identity::single(id)
    }
}

impl From<(i64, i64)> for Identity {
    fn from((a, b): (i64, i64)) -> Self {
        Identity(vec![a, b])
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(i64::to_string).collect();
        f.write_str(&parts.join(","))
    }
}

/// The parent resource a child was fetched relative to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Realm {
    kind: ResourceKind,
    identity: Identity,
    path: String,
}

impl Realm {
    pub fn new(kind: ResourceKind, identity: Identity, path: String) -> Self {
        Self {
            kind,
            identity,
            path,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Tag substituted for `{realm_type}`
    pub fn tag(&self) -> &'static str {
        self.kind.realm_tag().unwrap_or(self.kind.name())
    }

    /// Resolved REST path of the realm itself
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// What a [`ResourceRef`] points at
#[derive(Debug, Clone, PartialEq)]
pub enum RefTarget {
    Id(Identity),
    /// Full payload embedded in the parent document
    Inline(Map<String, Value>),
}

/// Unresolved reference to another resource.
///
/// Resolve through [`ResourceRegistry::resolve`](super::ResourceRegistry::resolve).
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub target: RefTarget,
    pub realm: Option<Realm>,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, identity: impl Into<Identity>) -> Self {
        Self {
            kind,
            target: RefTarget::Id(identity.into()),
            realm: None,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        match &self.target {
            RefTarget::Id(identity) => Some(identity),
            RefTarget::Inline(_) => None,
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            RefTarget::Id(identity) => write!(f, "{}#{}", self.kind, identity),
            RefTarget::Inline(data) => match data.get("id") {
                Some(id) => write!(f, "{}#{}", self.kind, id),
                None => write!(f, "{}#?", self.kind),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_identity_from_string_id() {
        let data = json!({ "id": "42", "title": "x" });
        let id = Identity::from_payload(&fields(&["id"]), data.as_object().unwrap()).unwrap();
        assert_eq!(id, Identity::single(42));
    }

    #[test]
    fn test_composite_identity() {
        let data = json!({ "assignment_id": 5, "enrollment_id": "9" });
        let id = Identity::from_payload(
            &fields(&["assignment_id", "enrollment_id"]),
            data.as_object().unwrap(),
        )
        .unwrap();
        assert_eq!(id, Identity::from((5, 9)));
        assert_eq!(id.to_string(), "5,9");
        assert_eq!(id.as_single(), None);
    }

    #[test]
    fn test_missing_identity_is_decode_error() {
        let data = json!({ "title": "x" });
        let err = Identity::from_payload(&fields(&["id"]), data.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));

        let data = json!({ "id": "abc" });
        assert!(Identity::from_payload(&fields(&["id"]), data.as_object().unwrap()).is_err());
    }

    #[test]
    fn test_parse() {
        assert_eq!(Identity::parse("7").unwrap(), Identity::single(7));
        assert_eq!(Identity::parse("5, 9").unwrap(), Identity::from((5, 9)));
        assert!(Identity::parse("x").is_err());
    }

    #[test]
    fn test_fill_keeps_existing_fields() {
        let mut data = json!({ "id": "7" }).as_object().unwrap().clone();
        Identity::single(7).fill(&fields(&["id"]), &mut data);
        assert_eq!(data["id"], "7");

        let mut data = Map::new();
        Identity::from((5, 9)).fill(&fields(&["assignment_id", "enrollment_id"]), &mut data);
        assert_eq!(data["assignment_id"], 5);
        assert_eq!(data["enrollment_id"], 9);
    }
}

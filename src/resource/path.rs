//! Path Resolver
//!
//! Templates such as `sections/{id}` or `messages/{folder}/{id}` are parsed
//! once when a type is registered; unknown placeholders fail there. A realm's
//! own path is prepended unless the template places `{realm_type}` and
//! `{realm_id}` itself.

use super::identity::{Identity, Realm};
use crate::error::{Error, Result};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// Index into the identity parts
    Id(usize),
    RealmType,
    RealmId,
    /// Extra value read from the backing data
    Field(String),
}

/// Parsed REST path template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parse `source`, accepting only identity fields, realm placeholders and
    /// the declared `path_fields`.
    pub fn parse(source: &str, id_fields: &[String], path_fields: &[String]) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = source.trim_start_matches('/');

        while !rest.is_empty() {
            match rest.find(['{', '}']) {
                None => {
                    segments.push(Segment::Literal(rest.to_string()));
                    rest = "";
                }
                Some(pos) if rest[pos..].starts_with('}') => {
                    return Err(Error::config(format!("unbalanced `}}` in path `{}`", source)));
                }
                Some(pos) => {
                    if pos > 0 {
                        segments.push(Segment::Literal(rest[..pos].to_string()));
                    }
                    let after = &rest[pos + 1..];
                    let end = after.find('}').ok_or_else(|| {
                        Error::config(format!("unclosed placeholder in path `{}`", source))
                    })?;
                    let name = &after[..end];
                    segments.push(Self::placeholder(name, source, id_fields, path_fields)?);
                    rest = &after[end + 1..];
                }
            }
        }

        if segments.is_empty() {
            return Err(Error::config("empty path template"));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    fn placeholder(
        name: &str,
        source: &str,
        id_fields: &[String],
        path_fields: &[String],
    ) -> Result<Segment> {
        if let Some(index) = id_fields.iter().position(|f| f == name) {
            return Ok(Segment::Id(index));
        }
        match name {
            "realm_type" => Ok(Segment::RealmType),
            "realm_id" => Ok(Segment::RealmId),
            _ if path_fields.iter().any(|f| f == name) => Ok(Segment::Field(name.to_string())),
            _ => Err(Error::config(format!(
                "unknown placeholder `{{{}}}` in path `{}`",
                name, source
            ))),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the template positions the realm itself
    pub fn uses_realm(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::RealmType | Segment::RealmId))
    }

    /// Names of the data fields the template reads
    pub fn data_fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Substitute placeholders without any realm prefix
    pub fn render(
        &self,
        identity: &Identity,
        realm: Option<&Realm>,
        data: Option<&Map<String, Value>>,
    ) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Id(index) => {
                    let part = identity.parts().get(*index).ok_or_else(|| {
                        Error::decode(format!("identity for `{}`", self.source), identity)
                    })?;
                    out.push_str(&part.to_string());
                }
                Segment::RealmType => out.push_str(self.realm(realm)?.tag()),
                Segment::RealmId => out.push_str(&self.realm(realm)?.identity().to_string()),
                Segment::Field(name) => {
                    let value = data.and_then(|d| d.get(name)).ok_or_else(|| {
                        Error::decode(format!("path field `{}`", name), "missing value")
                    })?;
                    match value {
                        Value::String(s) => out.push_str(s),
                        Value::Number(n) => out.push_str(&n.to_string()),
                        other => return Err(Error::decode(format!("path field `{}`", name), other)),
                    }
                }
            }
        }
        Ok(out)
    }

    fn realm<'a>(&self, realm: Option<&'a Realm>) -> Result<&'a Realm> {
        realm.ok_or_else(|| Error::InvalidRealm {
            kind: self.source.clone(),
            detail: "without a realm".to_string(),
        })
    }
}

/// Resolve the full path of a resource, prepending the realm's path when the
/// template does not place the realm itself.
pub fn resolve(
    template: &PathTemplate,
    identity: &Identity,
    realm: Option<&Realm>,
    data: Option<&Map<String, Value>>,
) -> Result<String> {
    let own = template.render(identity, realm, data)?;
    match realm {
        Some(realm) if !template.uses_realm() => Ok(join(realm.path(), &own)),
        _ => Ok(own),
    }
}

/// Join two path pieces with exactly one `/`
pub fn join(base: &str, child: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        child.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::kind::ResourceKind;
    use serde_json::json;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn section(id: i64) -> Realm {
        Realm::new(ResourceKind::Section, Identity::single(id), format!("sections/{}", id))
    }

    #[test]
    fn test_plain_template() {
        let t = PathTemplate::parse("schools/{id}", &ids(&["id"]), &[]).unwrap();
        assert_eq!(resolve(&t, &Identity::single(3), None, None).unwrap(), "schools/3");
    }

    #[test]
    fn test_realm_prefix() {
        let t = PathTemplate::parse("enrollments/{id}", &ids(&["id"]), &[]).unwrap();
        let path = resolve(&t, &Identity::single(7), Some(&section(42)), None).unwrap();
        assert_eq!(path, "sections/42/enrollments/7");
    }

    #[test]
    fn test_realm_placeholders_are_not_prefixed() {
        let t = PathTemplate::parse("/{realm_type}s/{realm_id}/enrollments/{id}", &ids(&["id"]), &[]).unwrap();
        assert!(t.uses_realm());
        let path = resolve(&t, &Identity::single(7), Some(&section(42)), None).unwrap();
        assert_eq!(path, "sections/42/enrollments/7");

        let err = resolve(&t, &Identity::single(7), None, None).unwrap_err();
        assert!(matches!(err, Error::InvalidRealm { .. }));
    }

    #[test]
    fn test_composite_identity_placeholders() {
        let t = PathTemplate::parse(
            "grades/{assignment_id}/{enrollment_id}",
            &ids(&["assignment_id", "enrollment_id"]),
            &[],
        )
        .unwrap();
        let path = resolve(&t, &Identity::from((5, 9)), Some(&section(1)), None).unwrap();
        assert_eq!(path, "sections/1/grades/5/9");
    }

    #[test]
    fn test_data_field_placeholder() {
        let t = PathTemplate::parse("messages/{folder}/{id}", &ids(&["id"]), &ids(&["folder"])).unwrap();
        let data = json!({ "folder": "sent" });
        let path = resolve(&t, &Identity::single(8), None, data.as_object()).unwrap();
        assert_eq!(path, "messages/sent/8");
        assert_eq!(t.data_fields().collect::<Vec<_>>(), vec!["folder"]);

        assert!(resolve(&t, &Identity::single(8), None, None).is_err());
    }

    #[test]
    fn test_unknown_placeholder_fails_at_parse() {
        let err = PathTemplate::parse("users/{uid}", &ids(&["id"]), &[]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(PathTemplate::parse("users/{id", &ids(&["id"]), &[]).is_err());
        assert!(PathTemplate::parse("users/id}", &ids(&["id"]), &[]).is_err());
        assert!(PathTemplate::parse("", &ids(&["id"]), &[]).is_err());
    }

    #[test]
    fn test_join() {
        assert_eq!(join("sections/1/", "/grades"), "sections/1/grades");
    }
}

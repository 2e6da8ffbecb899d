//! Type Registry - Load resource-type declarations from JSON
//!
//! Every resource type is declared in embedded JSON files and compiled into a
//! [`TypeDef`] once. Everything that can be checked without the network is
//! checked here: unknown placeholders, coercion names, references to
//! undeclared types, realm cycles. Failures are [`Error::Configuration`].

use super::coerce::{compile_chain, Coercion, CoercionDef};
use super::kind::ResourceKind;
use super::path::PathTemplate;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Embedded declaration files (compiled into the binary)
const RESOURCE_FILES: &[&str] = &[
    include_str!("../resources/directory.json"),
    include_str!("../resources/courses.json"),
    include_str!("../resources/messages.json"),
];

/// Listing endpoint as written in JSON
#[derive(Debug, Clone, Deserialize)]
struct ListConfig {
    path: String,
    field: String,
    #[serde(default)]
    paginate: bool,
}

/// Named child listing as written in JSON
#[derive(Debug, Clone, Deserialize)]
struct RelationConfig {
    kind: String,
    path: String,
    field: String,
    /// Children are constructed with the parent as their realm
    #[serde(default)]
    in_realm: bool,
    #[serde(default)]
    paginate: bool,
}

/// A property is either a bare chain over the field of the same name, or a
/// chain over a differently named backing field.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PropertyConfig {
    Chain(Vec<CoercionDef>),
    Mapped {
        field: String,
        #[serde(default)]
        chain: Vec<CoercionDef>,
    },
}

fn default_id_fields() -> Vec<String> {
    vec!["id".to_string()]
}

/// Resource type as written in JSON
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct TypeConfig {
    #[serde(default)]
    path: Option<String>,
    /// Reuse another type's path template
    #[serde(default)]
    path_alias: Option<String>,
    #[serde(default = "default_id_fields")]
    id_fields: Vec<String>,
    #[serde(default)]
    realms: Vec<String>,
    #[serde(default)]
    realm_required: bool,
    #[serde(default)]
    path_fields: Vec<String>,
    #[serde(default)]
    list: Option<ListConfig>,
    #[serde(default)]
    relations: BTreeMap<String, RelationConfig>,
    #[serde(default)]
    properties: BTreeMap<String, PropertyConfig>,
}

/// Root structure of resources/*.json
#[derive(Debug, Deserialize)]
struct ResourceConfig {
    #[serde(default)]
    resources: BTreeMap<String, TypeConfig>,
}

/// A declared property: backing field plus coercion chain
#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub field: String,
    pub chain: Vec<Coercion>,
}

/// Listing endpoint of a type
#[derive(Debug, Clone)]
pub struct ListDef {
    pub path: String,
    pub field: String,
    pub paginate: bool,
}

/// Child listing reachable from an instance
#[derive(Debug, Clone)]
pub struct Relation {
    pub name: String,
    pub kind: ResourceKind,
    /// Path relative to the parent's own path
    pub path: String,
    /// Dot-separated path of the item array in the response
    pub field: String,
    pub in_realm: bool,
    pub paginate: bool,
}

/// Compiled declaration of one resource type
#[derive(Debug, Clone)]
pub struct TypeDef {
    kind: ResourceKind,
    id_fields: Vec<String>,
    path: Option<PathTemplate>,
    realms: Vec<ResourceKind>,
    realm_required: bool,
    list: Option<ListDef>,
    relations: BTreeMap<String, Relation>,
    properties: BTreeMap<String, Property>,
}

impl TypeDef {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Fields that together form an instance's identity
    pub fn id_fields(&self) -> &[String] {
        &self.id_fields
    }

    /// Detail path template; `None` when the type has no detail endpoint
    pub fn path(&self) -> Option<&PathTemplate> {
        self.path.as_ref()
    }

    pub fn realms(&self) -> &[ResourceKind] {
        &self.realms
    }

    pub fn accepts_realm(&self, kind: ResourceKind) -> bool {
        self.realms.contains(&kind)
    }

    /// Instances only exist relative to a realm
    pub fn realm_required(&self) -> bool {
        self.realm_required
    }

    pub fn list(&self) -> Option<&ListDef> {
        self.list.as_ref()
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.values()
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    /// Declared properties in name order
    pub fn properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.values()
    }
}

/// Validated set of resource-type declarations
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: HashMap<ResourceKind, Arc<TypeDef>>,
}

impl TypeRegistry {
    /// Build from the embedded declarations. Every known type must be declared.
    pub fn builtin() -> Result<Self> {
        let registry = Self::from_sources(RESOURCE_FILES)?;
        if let Some(missing) = ResourceKind::ALL
            .into_iter()
            .find(|k| !registry.types.contains_key(k))
        {
            return Err(Error::config(format!("no declaration for `{}`", missing)));
        }
        Ok(registry)
    }

    /// Build from JSON sources, each shaped `{"resources": {name: decl}}`
    pub fn from_sources(sources: &[&str]) -> Result<Self> {
        let mut raw: BTreeMap<ResourceKind, TypeConfig> = BTreeMap::new();
        for content in sources {
            let partial: ResourceConfig = serde_json::from_str(content)
                .map_err(|e| Error::config(format!("invalid resource declaration: {}", e)))?;
            for (name, config) in partial.resources {
                let kind = ResourceKind::from_name(&name)
                    .ok_or_else(|| Error::config(format!("unknown resource type `{}`", name)))?;
                if raw.insert(kind, config).is_some() {
                    return Err(Error::config(format!("`{}` is declared twice", name)));
                }
            }
        }

        let mut types = HashMap::new();
        for (kind, config) in &raw {
            let def = compile_type(*kind, config, &raw)?;
            types.insert(*kind, Arc::new(def));
        }

        check_realm_cycles(&types)?;
        check_cross_references(&types)?;

        tracing::debug!("Registered {} resource types", types.len());
        Ok(Self { types })
    }

    pub fn get(&self, kind: ResourceKind) -> Option<&Arc<TypeDef>> {
        self.types.get(&kind)
    }

    /// Like [`get`](Self::get), failing for undeclared types
    pub fn def(&self, kind: ResourceKind) -> Result<&Arc<TypeDef>> {
        self.get(kind).ok_or_else(|| Error::Unsupported {
            kind: kind.to_string(),
            operation: "any operation (type not declared)".to_string(),
        })
    }

    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.types.keys().copied()
    }
}

fn compile_type(
    kind: ResourceKind,
    config: &TypeConfig,
    all: &BTreeMap<ResourceKind, TypeConfig>,
) -> Result<TypeDef> {
    let ctx = |msg: String| Error::config(format!("{}: {}", kind, msg));

    if config.id_fields.is_empty() {
        return Err(ctx("`id_fields` must not be empty".to_string()));
    }

    let source = match (&config.path, &config.path_alias) {
        (Some(_), Some(_)) => {
            return Err(ctx("`path` and `path_alias` are exclusive".to_string()));
        }
        (Some(path), None) => Some(path.clone()),
        (None, Some(alias)) => {
            let target = ResourceKind::from_name(alias)
                .and_then(|k| all.get(&k))
                .ok_or_else(|| ctx(format!("alias of undeclared type `{}`", alias)))?;
            let path = target
                .path
                .clone()
                .ok_or_else(|| ctx(format!("alias target `{}` has no own path", alias)))?;
            Some(path)
        }
        (None, None) => None,
    };
    let path = source
        .map(|s| PathTemplate::parse(&s, &config.id_fields, &config.path_fields))
        .transpose()
        .map_err(|e| ctx(e.to_string()))?;

    let realms = config
        .realms
        .iter()
        .map(|name| {
            let realm = ResourceKind::from_name(name)
                .ok_or_else(|| ctx(format!("unknown realm type `{}`", name)))?;
            if realm.realm_tag().is_none() {
                return Err(ctx(format!("`{}` cannot act as a realm", name)));
            }
            let has_path = all
                .get(&realm)
                .is_some_and(|c| c.path.is_some() || c.path_alias.is_some());
            if !has_path {
                return Err(ctx(format!("realm `{}` has no path", name)));
            }
            Ok(realm)
        })
        .collect::<Result<Vec<_>>>()?;

    let realm_required =
        config.realm_required || path.as_ref().is_some_and(PathTemplate::uses_realm);
    if realm_required && realms.is_empty() {
        return Err(ctx("requires a realm but accepts none".to_string()));
    }

    let list = match &config.list {
        Some(list) => {
            check_plain_path(&list.path).map_err(ctx)?;
            Some(ListDef {
                path: list.path.clone(),
                field: list.field.clone(),
                paginate: list.paginate,
            })
        }
        None => None,
    };

    let mut relations = BTreeMap::new();
    for (name, rel) in &config.relations {
        check_plain_path(&rel.path).map_err(ctx)?;
        let target = ResourceKind::from_name(&rel.kind)
            .ok_or_else(|| ctx(format!("relation `{}` targets unknown type `{}`", name, rel.kind)))?;
        relations.insert(
            name.clone(),
            Relation {
                name: name.clone(),
                kind: target,
                path: rel.path.clone(),
                field: rel.field.clone(),
                in_realm: rel.in_realm,
                paginate: rel.paginate,
            },
        );
    }

    let mut properties = BTreeMap::new();
    for (name, prop) in &config.properties {
        let (field, defs) = match prop {
            PropertyConfig::Chain(chain) => (name.clone(), chain),
            PropertyConfig::Mapped { field, chain } => (field.clone(), chain),
        };
        let chain = compile_chain(defs).map_err(|e| ctx(format!("property `{}`: {}", name, e)))?;
        properties.insert(
            name.clone(),
            Property {
                name: name.clone(),
                field,
                chain,
            },
        );
    }

    Ok(TypeDef {
        kind,
        id_fields: config.id_fields.clone(),
        path,
        realms,
        realm_required,
        list,
        relations,
        properties,
    })
}

fn check_plain_path(path: &str) -> std::result::Result<(), String> {
    if path.is_empty() || path.contains(['{', '}']) {
        Err(format!("invalid relative path `{}`", path))
    } else {
        Ok(())
    }
}

/// A realm's path is resolved through its own realm, so the graph must be acyclic
fn check_realm_cycles(types: &HashMap<ResourceKind, Arc<TypeDef>>) -> Result<()> {
    fn visit(
        kind: ResourceKind,
        types: &HashMap<ResourceKind, Arc<TypeDef>>,
        stack: &mut Vec<ResourceKind>,
        done: &mut HashSet<ResourceKind>,
    ) -> Result<()> {
        if done.contains(&kind) {
            return Ok(());
        }
        if stack.contains(&kind) {
            let cycle: Vec<&str> = stack.iter().map(|k| k.name()).collect();
            return Err(Error::config(format!(
                "realm cycle: {} -> {}",
                cycle.join(" -> "),
                kind
            )));
        }
        stack.push(kind);
        if let Some(def) = types.get(&kind) {
            for realm in def.realms() {
                visit(*realm, types, stack, done)?;
            }
        }
        stack.pop();
        done.insert(kind);
        Ok(())
    }

    let mut done = HashSet::new();
    let mut kinds: Vec<ResourceKind> = types.keys().copied().collect();
    kinds.sort();
    for kind in kinds {
        visit(kind, types, &mut Vec::new(), &mut done)?;
    }
    Ok(())
}

fn check_cross_references(types: &HashMap<ResourceKind, Arc<TypeDef>>) -> Result<()> {
    for def in types.values() {
        for prop in def.properties() {
            for target in prop.chain.iter().flat_map(Coercion::referenced_kinds) {
                if !types.contains_key(&target) {
                    return Err(Error::config(format!(
                        "{}.{} references undeclared type `{}`",
                        def.kind(),
                        prop.name,
                        target
                    )));
                }
            }
        }
        for rel in def.relations() {
            let target = types.get(&rel.kind).ok_or_else(|| {
                Error::config(format!(
                    "{}.{} targets undeclared type `{}`",
                    def.kind(),
                    rel.name,
                    rel.kind
                ))
            })?;
            if rel.in_realm && !target.accepts_realm(def.kind()) {
                return Err(Error::config(format!(
                    "{}.{}: `{}` does not accept `{}` as realm",
                    def.kind(),
                    rel.name,
                    rel.kind,
                    def.kind()
                )));
            }
            if rel.in_realm && def.path().is_none() {
                return Err(Error::config(format!(
                    "{}.{}: parent has no path to act as realm",
                    def.kind(),
                    rel.name
                )));
            }
        }
    }
    Ok(())
}

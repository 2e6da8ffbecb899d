//! Lazy Property Engine
//!
//! A [`Resource`] owns its backing JSON map behind an async mutex. Reading a
//! declared property whose backing field is absent triggers one detail
//! reload; after that the instance counts as loaded and absent fields stay
//! absent until [`Resource::resync`].

use super::coerce::{self, CoerceContext, Field, FromField};
use super::identity::{Identity, Realm, ResourceRef};
use super::kind::ResourceKind;
use super::path;
use super::registry::TypeDef;
use crate::api::ApiClient;
use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug)]
struct State {
    data: Map<String, Value>,
    /// A detail document has been merged; missing fields are known absent
    loaded: bool,
}

/// Locally cached proxy for one remote object.
///
/// Obtain instances through [`ResourceRegistry`](super::ResourceRegistry) so
/// that one identity maps to one instance.
pub struct Resource {
    def: Arc<TypeDef>,
    client: ApiClient,
    identity: Identity,
    realm: Option<Realm>,
    path: Option<String>,
    state: Mutex<State>,
}

impl Resource {
    pub(crate) fn new(
        def: Arc<TypeDef>,
        client: ApiClient,
        identity: Identity,
        realm: Option<Realm>,
        mut data: Map<String, Value>,
        loaded: bool,
    ) -> Result<Self> {
        if realm.is_none() && def.realm_required() {
            return Err(Error::InvalidRealm {
                kind: def.kind().to_string(),
                detail: "without a realm".to_string(),
            });
        }
        let path = def
            .path()
            .map(|template| path::resolve(template, &identity, realm.as_ref(), Some(&data)))
            .transpose()?;
        identity.fill(def.id_fields(), &mut data);

        Ok(Self {
            def,
            client,
            identity,
            realm,
            path,
            state: Mutex::new(State { data, loaded }),
        })
    }

    pub fn kind(&self) -> ResourceKind {
        self.def.kind()
    }

    pub fn def(&self) -> &Arc<TypeDef> {
        &self.def
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Plain id of single-field identities
    pub fn id(&self) -> Option<i64> {
        self.identity.as_single()
    }

    /// Realm this instance was first constructed under
    pub fn realm(&self) -> Option<&Realm> {
        self.realm.as_ref()
    }

    /// Resolved detail path, if the type has one
    pub fn rest_path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// This instance as the realm of its children
    pub fn as_realm(&self) -> Result<Realm> {
        let invalid = |detail: &str| Error::InvalidRealm {
            kind: self.kind().to_string(),
            detail: detail.to_string(),
        };
        if self.kind().realm_tag().is_none() {
            return Err(invalid("as a realm"));
        }
        let path = self.path.clone().ok_or_else(|| invalid("as a realm without a path"))?;
        Ok(Realm::new(self.kind(), self.identity.clone(), path))
    }

    /// Read a declared property, converting it to `T`.
    ///
    /// `Ok(None)` when the field is null or absent after one reload.
    pub async fn get<T: FromField>(&self, name: &str) -> Result<Option<T>> {
        match self.field(name).await? {
            field if field.is_null() => Ok(None),
            field => T::from_field(field).map(Some),
        }
    }

    /// Read a declared property as an untyped [`Field`]
    pub async fn field(&self, name: &str) -> Result<Field> {
        let prop = self.def.property(name).ok_or_else(|| Error::UnknownProperty {
            kind: self.kind().to_string(),
            name: name.to_string(),
        })?;
        let ctx = CoerceContext {
            realm: self.realm.as_ref(),
        };
        match self.raw(&prop.field).await? {
            Some(raw) => coerce::apply(&prop.chain, raw, &ctx),
            None => Ok(Field::Null),
        }
    }

    /// Raw backing value of `field`, reloading once if it is absent
    pub async fn raw(&self, field: &str) -> Result<Option<Value>> {
        let mut state = self.state.lock().await;
        if !state.data.contains_key(field) && !state.loaded {
            tracing::debug!("{} {}: `{}` missing, reloading", self.kind(), self.identity, field);
            self.reload(&mut state).await?;
        }
        Ok(state.data.get(field).cloned())
    }

    /// Merge the detail document into the backing data.
    ///
    /// Only a successful fetch marks the instance loaded.
    async fn reload(&self, state: &mut State) -> Result<()> {
        let Some(path) = &self.path else {
            state.loaded = true;
            return Ok(());
        };
        match self.client.get(path, &[]).await? {
            Value::Object(fresh) => state.data.extend(fresh),
            other => tracing::warn!("{}: ignoring non-object detail document {}", path, other),
        }
        self.identity.fill(self.def.id_fields(), &mut state.data);
        state.loaded = true;
        Ok(())
    }

    /// Discard the backing data and fetch it again.
    ///
    /// Identity, realm and path are kept. An empty document is
    /// [`Error::NotFound`] and leaves the current data untouched.
    pub async fn resync(&self) -> Result<()> {
        let path = self.path.as_deref().ok_or_else(|| Error::Unsupported {
            kind: self.kind().to_string(),
            operation: "resync".to_string(),
        })?;
        let mut fresh = match self.client.get(path, &[]).await {
            Ok(Value::Object(map)) if !map.is_empty() => map,
            Ok(_) => return Err(self.not_found()),
            Err(e) if e.is_not_found() => return Err(self.not_found()),
            Err(e) => return Err(e),
        };

        let mut state = self.state.lock().await;
        if let Some(template) = self.def.path() {
            for name in template.data_fields() {
                if let (false, Some(value)) = (fresh.contains_key(name), state.data.get(name)) {
                    fresh.insert(name.to_string(), value.clone());
                }
            }
        }
        self.identity.fill(self.def.id_fields(), &mut fresh);
        state.data = fresh;
        state.loaded = true;
        tracing::debug!("{} {} resynced", self.kind(), self.identity);
        Ok(())
    }

    /// Merge fields over the backing data, fresh values winning
    pub(crate) async fn merge(&self, fields: Map<String, Value>) {
        let mut state = self.state.lock().await;
        state.data.extend(fields);
    }

    /// Copy of the current backing data; never fetches
    pub async fn snapshot(&self) -> Map<String, Value> {
        self.state.lock().await.data.clone()
    }

    pub async fn is_loaded(&self) -> bool {
        self.state.lock().await.loaded
    }

    /// Reference whose type is named by a realm tag held in another property,
    /// e.g. the owner of a collection.
    pub async fn tagged_ref(&self, tag_property: &str, id_property: &str) -> Result<Option<ResourceRef>> {
        let Some(tag) = self.get::<String>(tag_property).await? else {
            return Ok(None);
        };
        let Some(id) = self.get::<i64>(id_property).await? else {
            return Ok(None);
        };
        let kind = ResourceKind::from_realm_tag(&tag).ok_or_else(|| Error::decode("realm type", &tag))?;
        Ok(Some(ResourceRef::new(kind, id)))
    }

    /// Human readable name
    pub async fn label(&self) -> Result<String> {
        for name in ["name_display", "title", "course_title", "subject"] {
            if self.def.property(name).is_none() {
                continue;
            }
            if let Some(text) = self.get::<String>(name).await? {
                let text = text.trim();
                if !text.is_empty() {
                    return Ok(text.to_string());
                }
            }
        }
        Ok(self.to_string())
    }

    fn not_found(&self) -> Error {
        Error::NotFound {
            kind: self.kind().to_string(),
            id: self.identity.to_string(),
        }
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("kind", &self.kind())
            .field("identity", &self.identity)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}>", self.kind(), self.identity)
    }
}

//! Identity Cache & Resource Registry
//!
//! One identity cache per resource type. Each identity owns a slot holding a
//! [`OnceCell`], so concurrent first lookups share a single detail fetch and
//! a failed or cancelled fetch leaves the slot empty.

use super::identity::{Identity, Realm, RefTarget, ResourceRef};
use super::kind::ResourceKind;
use super::object::Resource;
use super::path;
use super::registry::{Relation, TypeDef, TypeRegistry};
use crate::api::ApiClient;
use crate::error::{Error, Result};
use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;

type Slot = Arc<OnceCell<Arc<Resource>>>;

#[derive(Default)]
struct IdentityCache {
    slots: Mutex<HashMap<Identity, Slot>>,
}

impl IdentityCache {
    fn lock(&self) -> MutexGuard<'_, HashMap<Identity, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, identity: &Identity) -> Slot {
        self.lock().entry(identity.clone()).or_default().clone()
    }

    /// Drop `slot` if it is still empty and nobody else is waiting on it
    fn prune(&self, identity: &Identity, slot: &Slot) {
        let mut slots = self.lock();
        let idle = Arc::strong_count(slot) == 2 && !slot.initialized();
        if idle && slots.get(identity).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            slots.remove(identity);
        }
    }

    fn get(&self, identity: &Identity) -> Option<Arc<Resource>> {
        self.lock().get(identity).and_then(|slot| slot.get().cloned())
    }

    fn len(&self) -> usize {
        self.lock().values().filter(|slot| slot.initialized()).count()
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.lock().len()
    }
}

/// Prunes its slot when dropped, so a failed or cancelled fetch leaves
/// nothing behind.
struct SlotGuard<'a> {
    cache: &'a IdentityCache,
    identity: &'a Identity,
    slot: Slot,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.cache.prune(self.identity, &self.slot);
    }
}

/// Factory and cache for every resource instance of one session.
pub struct ResourceRegistry {
    client: ApiClient,
    types: Arc<TypeRegistry>,
    caches: HashMap<ResourceKind, IdentityCache>,
}

impl ResourceRegistry {
    pub fn new(client: ApiClient, types: Arc<TypeRegistry>) -> Self {
        let caches = types.kinds().map(|k| (k, IdentityCache::default())).collect();
        Self {
            client,
            types,
            caches,
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    fn def(&self, kind: ResourceKind) -> Result<&Arc<TypeDef>> {
        self.types.def(kind)
    }

    fn cache(&self, kind: ResourceKind) -> Result<&IdentityCache> {
        self.caches.get(&kind).ok_or_else(|| Error::Unsupported {
            kind: kind.to_string(),
            operation: "caching".to_string(),
        })
    }

    fn check_realm(def: &TypeDef, realm: Option<&Realm>) -> Result<()> {
        match realm {
            Some(realm) if !def.accepts_realm(realm.kind()) => Err(Error::InvalidRealm {
                kind: def.kind().to_string(),
                detail: format!("within a {}", realm.kind()),
            }),
            None if def.realm_required() => Err(Error::InvalidRealm {
                kind: def.kind().to_string(),
                detail: "without a realm".to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Detail path of `kind` with `identity`, optionally under `realm`
    pub fn resolve_path(
        &self,
        kind: ResourceKind,
        identity: &Identity,
        realm: Option<&Realm>,
    ) -> Result<String> {
        let def = self.def(kind)?;
        Self::check_realm(def, realm)?;
        let template = def.path().ok_or_else(|| Error::Unsupported {
            kind: kind.to_string(),
            operation: "detail paths".to_string(),
        })?;
        if let Some(field) = template.data_fields().next() {
            return Err(Error::Unsupported {
                kind: kind.to_string(),
                operation: format!("lookup by id (path needs `{}`)", field),
            });
        }
        path::resolve(template, identity, realm, None)
    }

    /// Realm handle for a top-level resource, without fetching it
    pub fn realm(&self, kind: ResourceKind, identity: impl Into<Identity>) -> Result<Realm> {
        let identity = identity.into();
        if kind.realm_tag().is_none() {
            return Err(Error::InvalidRealm {
                kind: kind.to_string(),
                detail: "as a realm".to_string(),
            });
        }
        let path = self.resolve_path(kind, &identity, None)?;
        Ok(Realm::new(kind, identity, path))
    }

    /// Cached instance, if one exists
    pub fn cached(&self, kind: ResourceKind, identity: impl Into<Identity>) -> Option<Arc<Resource>> {
        self.caches.get(&kind)?.get(&identity.into())
    }

    /// Number of live instances of `kind`
    pub fn cached_count(&self, kind: ResourceKind) -> usize {
        self.caches.get(&kind).map_or(0, IdentityCache::len)
    }

    /// Return the cached instance or fetch and cache it.
    ///
    /// A hit is returned as-is, even if it was first constructed under a
    /// different realm. The realm must still be one the type accepts.
    pub async fn get_or_fetch(
        &self,
        kind: ResourceKind,
        identity: impl Into<Identity>,
        realm: Option<&Realm>,
    ) -> Result<Arc<Resource>> {
        let identity = identity.into();
        let def = self.def(kind)?;
        if let Some(realm) = realm {
            Self::check_realm(def, Some(realm))?;
        }
        let cache = self.cache(kind)?;
        let guard = SlotGuard {
            cache,
            identity: &identity,
            slot: cache.slot(&identity),
        };

        let resource = guard
            .slot
            .get_or_try_init(|| self.fetch(def.clone(), identity.clone(), realm.cloned()))
            .await?;
        Ok(resource.clone())
    }

    async fn fetch(
        &self,
        def: Arc<TypeDef>,
        identity: Identity,
        realm: Option<Realm>,
    ) -> Result<Arc<Resource>> {
        let kind = def.kind();
        let path = self.resolve_path(kind, &identity, realm.as_ref())?;
        let not_found = || Error::NotFound {
            kind: kind.to_string(),
            id: identity.to_string(),
        };

        let data = match self.client.get(&path, &[]).await {
            Ok(Value::Object(map)) if !map.is_empty() => map,
            Ok(_) => return Err(not_found()),
            Err(e) if e.is_not_found() => return Err(not_found()),
            Err(e) => return Err(e),
        };

        let resource = Resource::new(def, self.client.clone(), identity, realm, data, true)?;
        tracing::debug!("caching {}", resource);
        Ok(Arc::new(resource))
    }

    /// Construct (or update) an instance from a payload that already carries
    /// its fields, e.g. an element of a list response.
    ///
    /// If the identity is already cached, the payload is merged into that
    /// instance, fresh values winning, and the existing instance is returned.
    pub async fn insert_from_payload(
        &self,
        kind: ResourceKind,
        payload: Map<String, Value>,
        realm: Option<&Realm>,
    ) -> Result<Arc<Resource>> {
        let def = self.def(kind)?;
        Self::check_realm(def, realm)?;
        let identity = Identity::from_payload(def.id_fields(), &payload)?;
        let slot = self.cache(kind)?.slot(&identity);

        if let Some(existing) = slot.get() {
            existing.merge(payload).await;
            return Ok(existing.clone());
        }

        let candidate = Arc::new(Resource::new(
            def.clone(),
            self.client.clone(),
            identity,
            realm.cloned(),
            payload,
            false,
        )?);
        let stored = slot
            .get_or_init(|| future::ready(candidate.clone()))
            .await
            .clone();
        if Arc::ptr_eq(&stored, &candidate) {
            tracing::debug!("caching {}", stored);
        } else {
            stored.merge(candidate.snapshot().await).await;
        }
        Ok(stored)
    }

    /// Discard and refetch the backing data of `resource`
    pub async fn resync(&self, resource: &Resource) -> Result<()> {
        resource.resync().await
    }

    /// Every instance of `kind`, optionally listed within `realm`.
    ///
    /// Lazy; pages are fetched as the stream is consumed.
    pub fn list(&self, kind: ResourceKind, realm: Option<&Realm>) -> BoxStream<'_, Result<Arc<Resource>>> {
        let listing = self.def(kind).and_then(|def| {
            Self::check_realm(def, realm)?;
            def.list().cloned().ok_or_else(|| Error::Unsupported {
                kind: kind.to_string(),
                operation: "listing".to_string(),
            })
        });
        let list = match listing {
            Ok(list) => list,
            Err(e) => return failed(e),
        };

        let path = match realm {
            Some(realm) => path::join(realm.path(), &list.path),
            None => list.path.clone(),
        };
        let items = if list.paginate {
            self.client.paginate(&path, &list.field, None, &[])
        } else {
            self.client.list_once(&path, &list.field, &[])
        };
        self.adopt_all(kind, items, realm.cloned())
    }

    /// Children reached through a declared relation of `parent`
    pub fn related<'a>(&'a self, parent: &Resource, name: &str) -> BoxStream<'a, Result<Arc<Resource>>> {
        let (relation, path, realm) = match Self::relation_target(parent, name) {
            Ok(parts) => parts,
            Err(e) => return failed(e),
        };
        let items = if relation.paginate {
            self.client.paginate(&path, &relation.field, None, &[])
        } else {
            self.client.list_once(&path, &relation.field, &[])
        };
        self.adopt_all(relation.kind, items, realm)
    }

    fn relation_target(parent: &Resource, name: &str) -> Result<(Relation, String, Option<Realm>)> {
        let unsupported = |operation: String| Error::Unsupported {
            kind: parent.kind().to_string(),
            operation,
        };
        let relation = parent
            .def()
            .relation(name)
            .cloned()
            .ok_or_else(|| unsupported(format!("relation `{}`", name)))?;
        let base = parent
            .rest_path()
            .ok_or_else(|| unsupported(format!("relation `{}` without a path", name)))?;
        let realm = if relation.in_realm {
            Some(parent.as_realm()?)
        } else {
            None
        };
        let path = path::join(base, &relation.path);
        Ok((relation, path, realm))
    }

    fn adopt_all(
        &self,
        kind: ResourceKind,
        items: BoxStream<'static, Result<Value>>,
        realm: Option<Realm>,
    ) -> BoxStream<'_, Result<Arc<Resource>>> {
        items
            .and_then(move |item| {
                let realm = realm.clone();
                async move {
                    match item {
                        Value::Object(payload) => {
                            self.insert_from_payload(kind, payload, realm.as_ref()).await
                        }
                        other => Err(Error::decode(format!("{} payload", kind), other)),
                    }
                }
            })
            .boxed()
    }

    /// Follow a reference produced by a `ref:`/`realm_ref:` coercion
    pub async fn resolve(&self, reference: &ResourceRef) -> Result<Arc<Resource>> {
        match &reference.target {
            RefTarget::Id(identity) => {
                self.get_or_fetch(reference.kind, identity.clone(), reference.realm.as_ref())
                    .await
            }
            RefTarget::Inline(payload) => {
                self.insert_from_payload(reference.kind, payload.clone(), reference.realm.as_ref())
                    .await
            }
        }
    }

    /// Resolve a reference-valued property of `resource`
    pub async fn resolve_field(&self, resource: &Resource, name: &str) -> Result<Option<Arc<Resource>>> {
        match resource.get::<ResourceRef>(name).await? {
            Some(reference) => self.resolve(&reference).await.map(Some),
            None => Ok(None),
        }
    }

    /// Resolve a list-of-references property, in order
    pub async fn resolve_all(&self, resource: &Resource, name: &str) -> Result<Vec<Arc<Resource>>> {
        let references = resource.get::<Vec<ResourceRef>>(name).await?.unwrap_or_default();
        let mut resolved = Vec::with_capacity(references.len());
        for reference in &references {
            resolved.push(self.resolve(reference).await?);
        }
        Ok(resolved)
    }

    /// Owning realm named by a tag property, e.g. a collection's owner
    pub async fn owner(
        &self,
        resource: &Resource,
        tag_property: &str,
        id_property: &str,
    ) -> Result<Option<Arc<Resource>>> {
        match resource.tagged_ref(tag_property, id_property).await? {
            Some(reference) => self.resolve(&reference).await.map(Some),
            None => Ok(None),
        }
    }
}

fn failed<'a, T: Send + 'a>(error: Error) -> BoxStream<'a, Result<T>> {
    stream::once(future::ready(Err(error))).boxed()
}

//! Schoology session
//!
//! Entry point tying the transport, the type declarations and the identity
//! caches together.

use crate::api::client::extract_items;
use crate::api::http::HttpTransport;
use crate::api::ApiClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::resource::{
    Identity, Realm, Resource, ResourceKind, ResourceRef, ResourceRegistry, TypeRegistry,
};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Default message folder
pub const INBOX: &str = "inbox";

/// One authenticated session against the Schoology API.
pub struct Schoology {
    registry: ResourceRegistry,
    me: OnceCell<Arc<Resource>>,
}

impl Schoology {
    /// Build a session from configuration, using the HTTP transport
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let transport = HttpTransport::new(config.api_root(), config.credentials()?)?;
        let client = ApiClient::new(Arc::new(transport)).with_limit(config.limit());
        Ok(Self::with_client(client)?)
    }

    /// Build a session over an existing client
    pub fn with_client(client: ApiClient) -> Result<Self> {
        let types = Arc::new(TypeRegistry::builtin()?);
        Ok(Self {
            registry: ResourceRegistry::new(client, types),
            me: OnceCell::new(),
        })
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// The authenticated user, fetched once per session
    pub async fn me(&self) -> Result<Arc<Resource>> {
        let me = self
            .me
            .get_or_try_init(|| async {
                let doc = self.registry.client().get("users/me", &[]).await?;
                match doc {
                    Value::Object(data) if !data.is_empty() => {
                        self.registry
                            .insert_from_payload(ResourceKind::User, data, None)
                            .await
                    }
                    _ => Err(Error::NotFound {
                        kind: ResourceKind::User.to_string(),
                        id: "me".to_string(),
                    }),
                }
            })
            .await?;
        Ok(me.clone())
    }

    /// Language code to language name
    pub async fn languages(&self) -> Result<BTreeMap<String, String>> {
        let doc = self.registry.client().get("users/languages", &[]).await?;
        let languages = extract_items(&doc, "language")
            .iter()
            .filter_map(|lang| {
                let code = lang.get("language_code")?.as_str()?;
                let name = lang.get("language_name")?.as_str()?;
                Some((code.to_string(), name.to_string()))
            })
            .collect();
        Ok(languages)
    }

    pub async fn schools(&self) -> Result<Vec<Arc<Resource>>> {
        self.registry.list(ResourceKind::School, None).try_collect().await
    }

    pub async fn collections(&self) -> Result<Vec<Arc<Resource>>> {
        self.registry
            .list(ResourceKind::Collection, None)
            .try_collect()
            .await
    }

    /// Message threads in `folder` (e.g. `inbox`, `sent`)
    pub fn messages(&self, folder: &str) -> BoxStream<'_, Result<Arc<Resource>>> {
        let folder = folder.to_string();
        let path = format!("messages/{}", folder);
        self.registry
            .client()
            .paginate(&path, "message", None, &[])
            .and_then(move |item| {
                let folder = folder.clone();
                async move {
                    let mut data = match item {
                        Value::Object(data) => data,
                        other => return Err(Error::decode("message thread", other)),
                    };
                    data.insert("folder".to_string(), Value::from(folder));
                    // listings carry `"message": null`; drop it so the
                    // thread's messages load on first access
                    if data.get("message").is_some_and(Value::is_null) {
                        data.remove("message");
                    }
                    self.registry
                        .insert_from_payload(ResourceKind::MessageThread, data, None)
                        .await
                }
            })
            .boxed()
    }

    pub async fn for_id(
        &self,
        kind: ResourceKind,
        identity: impl Into<Identity>,
        realm: Option<&Realm>,
    ) -> Result<Arc<Resource>> {
        self.registry.get_or_fetch(kind, identity, realm).await
    }

    pub fn list(&self, kind: ResourceKind, realm: Option<&Realm>) -> BoxStream<'_, Result<Arc<Resource>>> {
        self.registry.list(kind, realm)
    }

    pub fn related<'a>(&'a self, parent: &Resource, name: &str) -> BoxStream<'a, Result<Arc<Resource>>> {
        self.registry.related(parent, name)
    }

    pub async fn resolve(&self, reference: &ResourceRef) -> Result<Arc<Resource>> {
        self.registry.resolve(reference).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeTransport;
    use serde_json::json;

    fn session(fake: &Arc<FakeTransport>) -> Schoology {
        Schoology::with_client(ApiClient::new(fake.clone())).unwrap()
    }

    #[tokio::test]
    async fn test_me_is_fetched_once() {
        let fake = Arc::new(FakeTransport::new());
        fake.respond("users/me", json!({ "id": 12, "name_display": "Ada Lovelace" }));
        let sc = session(&fake);

        let a = sc.me().await.unwrap();
        let b = sc.me().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(fake.count("users/me"), 1);

        // same instance as a lookup by id
        let by_id = sc.for_id(ResourceKind::User, 12, None).await.unwrap();
        assert!(Arc::ptr_eq(&a, &by_id));
        assert_eq!(a.label().await.unwrap(), "Ada Lovelace");
    }

    #[tokio::test]
    async fn test_languages() {
        let fake = Arc::new(FakeTransport::new());
        fake.respond(
            "users/languages",
            json!({ "language": [
                { "language_code": "en", "language_name": "English" },
                { "language_code": "fr", "language_name": "Français" }
            ] }),
        );
        let langs = session(&fake).languages().await.unwrap();
        assert_eq!(langs.len(), 2);
        assert_eq!(langs["fr"], "Français");
    }

    #[tokio::test]
    async fn test_schools() {
        let fake = Arc::new(FakeTransport::new());
        fake.respond("schools", json!({ "school": [{ "id": "1", "title": "North" }, { "id": "2", "title": "South" }] }));
        let schools = session(&fake).schools().await.unwrap();
        let ids: Vec<Option<i64>> = schools.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn test_message_threads_record_folder() {
        let fake = Arc::new(FakeTransport::new());
        fake.respond(
            "messages/sent",
            json!({ "message": [{ "id": 8, "subject": "hi", "message": null, "message_status": "read" }] }),
        );
        fake.respond("messages/sent/8", json!({ "message": [{ "id": 80, "subject": "hi", "message": "body" }] }));
        let sc = session(&fake);

        let threads: Vec<Arc<Resource>> = sc.messages("sent").try_collect().await.unwrap();
        assert_eq!(threads.len(), 1);
        let thread = &threads[0];
        assert_eq!(thread.rest_path(), Some("messages/sent/8"));
        assert_eq!(thread.get::<bool>("unread").await.unwrap(), Some(false));

        let messages = sc.registry().resolve_all(thread, "messages").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].get::<String>("message").await.unwrap().as_deref(), Some("body"));
        assert_eq!(fake.count("messages/sent/8"), 1);
    }
}

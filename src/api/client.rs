//! Schoology Client
//!
//! Issues requests through a [`Transport`] and follows paginated list
//! endpoints as one lazy stream.

use crate::error::{Result, TransportError};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Default `limit` query parameter
pub const DEFAULT_LIMIT: usize = 100;

/// HTTP method of an [`ApiRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// One request handed to the transport
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API root
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: &str) -> Self {
        Self {
            method: Method::Get,
            path: path.to_string(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    /// Value of a query parameter, if present
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Signs and sends requests, returning the raw response body.
///
/// Authentication and retry policy belong to the implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<String, TransportError>;
}

/// How a paginated fetch decides it has seen the last page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Termination {
    /// Stop when `links.next` is absent
    #[default]
    NextLink,
    /// Stop when a page holds fewer items than the page size
    ShortPage,
}

/// Main API client
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    limit: usize,
    termination: Termination,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("limit", &self.limit)
            .field("termination", &self.termination)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            limit: DEFAULT_LIMIT,
            termination: Termination::default(),
        }
    }

    /// Override the default `limit` sent with every request
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn with_termination(mut self, termination: Termination) -> Self {
        self.termination = termination;
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Default query merged with caller params; caller wins on `limit`
    fn query(&self, params: &[(&str, String)]) -> Vec<(String, String)> {
        let mut query: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        if !query.iter().any(|(k, _)| k == "limit") {
            query.push(("limit".to_string(), self.limit.to_string()));
        }
        query
    }

    async fn send(&self, request: ApiRequest) -> Result<Value> {
        let body = self.transport.send(request).await?;
        Ok(decode_document(&body))
    }

    /// GET a single document
    pub async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value> {
        tracing::debug!("GET {}", path);
        self.send(ApiRequest::get(path).with_query(self.query(params)))
            .await
    }

    /// POST a JSON body
    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        tracing::debug!("POST {}", path);
        self.send(ApiRequest {
            method: Method::Post,
            path: path.to_string(),
            query: self.query(&[]),
            body: Some(body.clone()),
        })
        .await
    }

    /// PUT a JSON body
    pub async fn put(&self, path: &str, body: &Value) -> Result<Value> {
        tracing::debug!("PUT {}", path);
        self.send(ApiRequest {
            method: Method::Put,
            path: path.to_string(),
            query: self.query(&[]),
            body: Some(body.clone()),
        })
        .await
    }

    /// DELETE a resource
    pub async fn delete(&self, path: &str) -> Result<()> {
        tracing::debug!("DELETE {}", path);
        self.transport
            .send(ApiRequest {
                method: Method::Delete,
                path: path.to_string(),
                query: Vec::new(),
                body: None,
            })
            .await?;
        Ok(())
    }

    /// Stream every element of the array `field` across all pages.
    ///
    /// Pages are requested on demand, advancing `start` by the page size.
    /// `field` may be a dot-separated path into the page document.
    pub fn paginate(
        &self,
        path: &str,
        field: &str,
        page_size: Option<usize>,
        params: &[(&str, String)],
    ) -> BoxStream<'static, Result<Value>> {
        let cursor = PageCursor {
            client: self.clone(),
            path: path.to_string(),
            field: field.to_string(),
            page_size: page_size.unwrap_or(self.limit).max(1),
            params: params
                .iter()
                .filter(|(k, _)| *k != "start" && *k != "limit")
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            start: 0,
            done: false,
        };

        stream::try_unfold(cursor, |mut cursor| async move {
            if cursor.done {
                return Ok::<_, crate::Error>(None);
            }
            let page = cursor.fetch_page().await?;
            let items = extract_items(&page, &cursor.field);
            cursor.done = !cursor.has_next(&page, items.len());
            cursor.start += cursor.page_size;
            let items = stream::iter(items.into_iter().map(Ok::<Value, crate::Error>));
            Ok(Some((items, cursor)))
        })
        .try_flatten()
        .boxed()
    }

    /// Stream the array `field` of one unpaginated document
    pub fn list_once(
        &self,
        path: &str,
        field: &str,
        params: &[(&str, String)],
    ) -> BoxStream<'static, Result<Value>> {
        let client = self.clone();
        let path = path.to_string();
        let field = field.to_string();
        let query = self.query(params);

        stream::once(async move {
            tracing::debug!("GET {}", path);
            let doc = client
                .send(ApiRequest::get(&path).with_query(query))
                .await?;
            let items = extract_items(&doc, &field);
            Ok::<_, crate::Error>(stream::iter(items.into_iter().map(Ok::<Value, crate::Error>)))
        })
        .try_flatten()
        .boxed()
    }
}

/// Position within a paginated listing
struct PageCursor {
    client: ApiClient,
    path: String,
    field: String,
    page_size: usize,
    params: Vec<(String, String)>,
    start: usize,
    done: bool,
}

impl PageCursor {
    async fn fetch_page(&self) -> Result<Value> {
        let mut query = self.params.clone();
        query.push(("start".to_string(), self.start.to_string()));
        query.push(("limit".to_string(), self.page_size.to_string()));
        tracing::debug!("GET {} (start={})", self.path, self.start);
        self.client
            .send(ApiRequest::get(&self.path).with_query(query))
            .await
    }

    fn has_next(&self, page: &Value, count: usize) -> bool {
        match self.client.termination {
            Termination::NextLink => page
                .get("links")
                .and_then(|links| links.get("next"))
                .is_some_and(|next| !next.is_null()),
            Termination::ShortPage => count >= self.page_size,
        }
    }
}

/// Parse a response body; empty or malformed bodies become an empty document
pub fn decode_document(body: &str) -> Value {
    if body.trim().is_empty() {
        return Value::Object(Map::new());
    }
    match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Undecodable response body treated as empty: {}", e);
            Value::Object(Map::new())
        }
    }
}

/// Extract the array at a dot-separated `path`
pub fn extract_items(document: &Value, path: &str) -> Vec<Value> {
    let mut current = document;
    for part in path.split('.').filter(|p| !p.is_empty()) {
        current = match current.get(part) {
            Some(v) => v,
            None => return vec![],
        };
    }
    current.as_array().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeTransport;
    use serde_json::json;

    fn page(items: &[i64], next: bool) -> Value {
        let items: Vec<Value> = items.iter().map(|id| json!({ "id": id })).collect();
        if next {
            json!({ "enrollment": items, "links": { "self": "x", "next": "y" } })
        } else {
            json!({ "enrollment": items, "links": { "self": "x" } })
        }
    }

    #[tokio::test]
    async fn test_pagination_follows_next_links() {
        let fake = Arc::new(FakeTransport::new());
        fake.respond("sections/1/enrollments", page(&[1, 2], true));
        fake.respond("sections/1/enrollments", page(&[3, 4], true));
        fake.respond("sections/1/enrollments", page(&[5, 6], true));
        fake.respond("sections/1/enrollments", page(&[], false));

        let client = ApiClient::new(fake.clone());
        let items: Vec<Value> = client
            .paginate("sections/1/enrollments", "enrollment", Some(2), &[])
            .try_collect()
            .await
            .unwrap();

        assert_eq!(items.len(), 6);
        assert_eq!(items[5]["id"], 6);
        assert_eq!(fake.count("sections/1/enrollments"), 4);

        let starts: Vec<String> = fake
            .requests()
            .iter()
            .map(|r| r.param("start").unwrap_or_default().to_string())
            .collect();
        assert_eq!(starts, vec!["0", "2", "4", "6"]);
        assert!(fake.requests().iter().all(|r| r.param("limit") == Some("2")));
    }

    #[tokio::test]
    async fn test_short_page_termination() {
        let fake = Arc::new(FakeTransport::new());
        fake.respond("groups", json!({ "group": [{"id": 1}, {"id": 2}] }));
        fake.respond("groups", json!({ "group": [{"id": 3}] }));

        let client = ApiClient::new(fake.clone()).with_termination(Termination::ShortPage);
        let items: Vec<Value> = client
            .paginate("groups", "group", Some(2), &[])
            .try_collect()
            .await
            .unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(fake.count("groups"), 2);
    }

    #[tokio::test]
    async fn test_pagination_is_lazy() {
        let fake = Arc::new(FakeTransport::new());
        fake.respond("collections", json!({ "collection": [{"id": 1}, {"id": 2}], "links": {"next": "n"} }));
        fake.respond("collections", json!({ "collection": [{"id": 3}] }));

        let client = ApiClient::new(fake.clone());
        let mut items = client.paginate("collections", "collection", Some(2), &[]);

        let first = items.next().await.unwrap().unwrap();
        assert_eq!(first["id"], 1);
        assert_eq!(fake.count("collections"), 1);

        // abandon mid-stream
        drop(items);
        assert_eq!(fake.count("collections"), 1);
    }

    #[tokio::test]
    async fn test_malformed_page_ends_listing() {
        let fake = Arc::new(FakeTransport::new());
        fake.respond_raw("messages/inbox", "<html>oops</html>");

        let client = ApiClient::new(fake.clone());
        let items: Vec<Value> = client
            .paginate("messages/inbox", "message", None, &[])
            .try_collect()
            .await
            .unwrap();

        assert!(items.is_empty());
        assert_eq!(fake.count("messages/inbox"), 1);
    }

    #[tokio::test]
    async fn test_transport_errors_propagate() {
        let fake = Arc::new(FakeTransport::new());
        fake.fail("users/9", 403);

        let client = ApiClient::new(fake);
        let err = client.get("users/9", &[]).await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Transport(TransportError::Status { status: 403, .. })
        ));
    }

    #[tokio::test]
    async fn test_default_limit_is_overridable() {
        let fake = Arc::new(FakeTransport::new());
        fake.respond("schools", json!({ "school": [] }));

        let client = ApiClient::new(fake.clone()).with_limit(20);
        client.get("schools", &[]).await.unwrap();
        client.get("schools", &[("limit", "5".to_string())]).await.unwrap();

        let requests = fake.requests();
        assert_eq!(requests[0].param("limit"), Some("20"));
        assert_eq!(requests[1].param("limit"), Some("5"));
    }

    #[test]
    fn test_decode_document_fallback() {
        assert_eq!(decode_document(""), json!({}));
        assert_eq!(decode_document("not json"), json!({}));
        assert_eq!(decode_document("{\"a\":1}"), json!({"a": 1}));
    }

    #[test]
    fn test_extract_items_nested_path() {
        let doc = json!({ "grades": { "grade": [{"id": 1}] } });
        assert_eq!(extract_items(&doc, "grades.grade").len(), 1);
        assert!(extract_items(&doc, "grades.missing").is_empty());
        assert!(extract_items(&doc, "grades").is_empty());
    }
}

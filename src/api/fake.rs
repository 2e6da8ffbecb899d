//! Scripted transport for tests.
//!
//! Responses are queued per path; the last queued response for a path is
//! repeated once the queue is down to one entry. Unknown paths answer 404.
//! An optional delay makes every request yield before it is answered.

use super::client::{ApiRequest, Transport};
use crate::error::TransportError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Clone)]
enum Scripted {
    Body(String),
    Status(u16),
}

#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    requests: Mutex<Vec<ApiRequest>>,
    delay: Option<Duration>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn normalize(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer each request only after `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a JSON document for `path`
    pub fn respond(&self, path: &str, body: Value) {
        self.push(path, Scripted::Body(body.to_string()));
    }

    /// Queue a raw body for `path`
    pub fn respond_raw(&self, path: &str, body: &str) {
        self.push(path, Scripted::Body(body.to_string()));
    }

    /// Queue an HTTP error status for `path`
    pub fn fail(&self, path: &str, status: u16) {
        self.push(path, Scripted::Status(status));
    }

    fn push(&self, path: &str, scripted: Scripted) {
        lock(&self.routes)
            .entry(normalize(path))
            .or_default()
            .push_back(scripted);
    }

    /// Every request received so far, in order
    pub fn requests(&self) -> Vec<ApiRequest> {
        lock(&self.requests).clone()
    }

    /// Number of requests received for `path`
    pub fn count(&self, path: &str) -> usize {
        let path = normalize(path);
        lock(&self.requests)
            .iter()
            .filter(|r| normalize(&r.path) == path)
            .count()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: ApiRequest) -> Result<String, TransportError> {
        let path = normalize(&request.path);
        lock(&self.requests).push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = {
            let mut routes = lock(&self.routes);
            match routes.get_mut(&path) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match scripted {
            Some(Scripted::Body(body)) => Ok(body),
            Some(Scripted::Status(status)) => Err(TransportError::Status {
                status,
                body: String::new(),
            }),
            None => Err(TransportError::Status {
                status: 404,
                body: String::new(),
            }),
        }
    }
}

//! HTTP transport for Schoology REST API calls

use super::auth::Credentials;
use super::client::{ApiRequest, Method, Transport};
use crate::error::{Error, TransportError};
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

/// Default API root
pub const DEFAULT_API_ROOT: &str = "https://api.schoology.com/v1/";

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let total = body.chars().count();
    let truncated = if total > MAX_LOG_BODY_LENGTH {
        let head: String = body.chars().take(MAX_LOG_BODY_LENGTH).collect();
        format!("{}... [truncated, {} bytes total]", head, body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// reqwest-backed transport that signs every request
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    root: Url,
    credentials: Credentials,
}

impl HttpTransport {
    /// Create a transport rooted at `api_root`
    pub fn new(api_root: &str, credentials: Credentials) -> Result<Self, TransportError> {
        // Url::join drops the last segment unless the root ends with '/'
        let root = if api_root.ends_with('/') {
            Url::parse(api_root)?
        } else {
            Url::parse(&format!("{}/", api_root))?
        };

        let client = Client::builder()
            .user_agent(concat!("lms/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            root,
            credentials,
        })
    }

    pub fn root(&self) -> &Url {
        &self.root
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url, TransportError> {
        let mut url = self.root.join(request.path.trim_start_matches('/'))?;
        if !request.query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(request.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<String, TransportError> {
        let url = self.url_for(&request)?;
        tracing::debug!("{} {}", request.method, url);

        let builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Put => self.client.put(url),
            Method::Delete => self.client.delete(url),
        };

        let mut builder = builder
            .header(reqwest::header::AUTHORIZATION, self.credentials.authorization_header())
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::CONTENT_TYPE, "application/json");

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}

/// Format an API error for display
/// Security: Maps status codes to generic messages instead of echoing API bodies
pub fn format_api_error(error: &Error) -> String {
    if let Error::Transport(TransportError::Status { status, .. }) = error {
        return match status {
            401 => "Authentication failed. Check your consumer key and secret.".to_string(),
            403 => "Permission denied.".to_string(),
            404 => "Resource not found.".to_string(),
            429 => "Rate limit exceeded. Please try again later.".to_string(),
            400 => "Invalid request. Check your parameters.".to_string(),
            500 | 503 => "Schoology service temporarily unavailable. Please try again.".to_string(),
            _ => "Request failed. Check your network connection and try again.".to_string(),
        };
    }

    let error_str = error.to_string();
    let sanitized = error_str
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(80)
        .collect::<String>();

    if sanitized.len() < error_str.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(root: &str) -> HttpTransport {
        HttpTransport::new(root, Credentials::new("k", "s").unwrap()).unwrap()
    }

    #[test]
    fn test_url_joins_path_and_query() {
        let t = transport("https://api.schoology.com/v1");
        let request = ApiRequest::get("/sections/42/enrollments")
            .with_query(vec![("start".to_string(), "0".to_string())]);
        let url = t.url_for(&request).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.schoology.com/v1/sections/42/enrollments?start=0"
        );
    }

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let clean = sanitize_for_log(&body);
        assert!(clean.starts_with(&"x".repeat(200)));
        assert!(clean.contains("500 bytes total"));
    }

    #[test]
    fn test_format_status_errors() {
        let err = Error::from(TransportError::Status {
            status: 401,
            body: "{\"secret\":\"leak\"}".to_string(),
        });
        let msg = format_api_error(&err);
        assert!(msg.contains("Authentication failed"));
        assert!(!msg.contains("leak"));
    }
}

//! Schoology Authentication
//!
//! Builds the two-legged OAuth 1.0 `Authorization` header Schoology accepts,
//! using the PLAINTEXT signature method.

use crate::error::TransportError;
use chrono::Utc;
use std::fmt;

/// OAuth realm advertised in every header
const OAUTH_REALM: &str = "Schoology API";

/// Number of digits in the per-request nonce
const NONCE_DIGITS: u32 = 8;

/// Consumer and (optional) access-token credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    consumer_key: String,
    consumer_secret: String,
    access_token: Option<String>,
    access_token_secret: Option<String>,
}

// Secrets never end up in logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"***")
            .field("access_token", &self.access_token)
            .field("access_token_secret", &self.access_token_secret.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Credentials {
    /// Create two-legged credentials from a consumer key and secret
    pub fn new(consumer_key: &str, consumer_secret: &str) -> Result<Self, TransportError> {
        if consumer_key.trim().is_empty() {
            return Err(TransportError::Credentials("consumer key is empty".to_string()));
        }
        if consumer_secret.trim().is_empty() {
            return Err(TransportError::Credentials("consumer secret is empty".to_string()));
        }

        Ok(Self {
            consumer_key: consumer_key.trim().to_string(),
            consumer_secret: consumer_secret.trim().to_string(),
            access_token: None,
            access_token_secret: None,
        })
    }

    /// Attach an access token obtained through the three-legged flow
    pub fn with_access_token(mut self, token: &str, secret: &str) -> Self {
        self.access_token = Some(token.to_string());
        self.access_token_secret = Some(secret.to_string());
        self
    }

    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    /// Whether requests can be signed on behalf of a user
    pub fn has_access_token(&self) -> bool {
        self.access_token.is_some() && self.access_token_secret.is_some()
    }

    /// Build the `Authorization` header for one request.
    ///
    /// Nonce and timestamp are fresh on every call.
    pub fn authorization_header(&self) -> String {
        self.header_with(&nonce(), Utc::now().timestamp())
    }

    fn header_with(&self, nonce: &str, timestamp: i64) -> String {
        let token = self.access_token.as_deref().unwrap_or("");
        let token_secret = self.access_token_secret.as_deref().unwrap_or("");
        let signature = format!(
            "{}%26{}",
            urlencoding::encode(&self.consumer_secret),
            urlencoding::encode(token_secret)
        );

        format!(
            "OAuth realm=\"{}\",oauth_consumer_key=\"{}\",oauth_token=\"{}\",oauth_nonce=\"{}\",oauth_timestamp=\"{}\",oauth_signature_method=\"PLAINTEXT\",oauth_version=\"1.0\",oauth_signature=\"{}\"",
            OAUTH_REALM,
            urlencoding::encode(&self.consumer_key),
            urlencoding::encode(token),
            nonce,
            timestamp,
            signature
        )
    }
}

/// Random decimal nonce
fn nonce() -> String {
    let modulus = 10u128.pow(NONCE_DIGITS);
    format!(
        "{:0width$}",
        uuid::Uuid::new_v4().as_u128() % modulus,
        width = NONCE_DIGITS as usize
    )
}

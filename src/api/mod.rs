//! Schoology API interaction module
//!
//! # Module Structure
//!
//! - [`auth`] - OAuth 1.0 PLAINTEXT request signing
//! - [`client`] - [`ApiClient`](client::ApiClient) with depaginated list fetches
//! - [`http`] - reqwest-backed [`Transport`](client::Transport)
//!
//! # Example
//!
//! ```ignore
//! use lms::api::{auth::Credentials, client::ApiClient, http::HttpTransport};
//!
//! async fn example() -> lms::Result<()> {
//!     let creds = Credentials::new("key", "secret")?;
//!     let transport = HttpTransport::new(lms::api::http::DEFAULT_API_ROOT, creds)?;
//!     let client = ApiClient::new(std::sync::Arc::new(transport));
//!     let me = client.get("users/me", &[]).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
#[doc(hidden)]
pub mod fake;
pub mod http;

pub use client::{ApiClient, ApiRequest, Method, Termination, Transport};

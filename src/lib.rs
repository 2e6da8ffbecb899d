//! Lazy, identity-cached resource objects for the Schoology REST API.
//!
//! - [`api`] - transport, OAuth signing and the depaginating client
//! - [`resource`] - resource types, coercions, paths and identity caches
//! - [`session`] - the [`Schoology`] entry point
//! - [`config`] - credentials and settings on disk

pub mod api;
pub mod config;
pub mod error;
pub mod resource;
pub mod session;

pub use config::Config;
pub use error::{Error, Result, TransportError};
pub use resource::{Resource, ResourceKind, ResourceRef, ResourceRegistry};
pub use session::Schoology;

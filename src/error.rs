//! Error types for the resource layer.

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the resource layer.
#[derive(Debug, Error)]
pub enum Error {
    /// A coercion received a raw value it cannot interpret.
    #[error("cannot decode {expected} from {found}")]
    Decode { expected: String, found: String },

    /// A detail fetch returned no usable document.
    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: String },

    /// Failure reported by the transport collaborator.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Invalid resource-type declaration. Only raised while building a
    /// [`TypeRegistry`](crate::resource::TypeRegistry).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The property name is not declared for this resource type.
    #[error("{kind} has no property `{name}`")]
    UnknownProperty { kind: String, name: String },

    /// The realm is not accepted by the resource type.
    #[error("{kind} cannot be resolved {detail}")]
    InvalidRealm { kind: String, detail: String },

    /// The resource type declares no endpoint for this operation.
    #[error("{kind} does not support {operation}")]
    Unsupported { kind: String, operation: String },
}

impl Error {
    pub(crate) fn decode(expected: impl Into<String>, found: impl ToString) -> Self {
        Error::Decode {
            expected: expected.into(),
            found: found.to_string(),
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// True when the underlying cause is a missing remote object.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Transport(TransportError::Status { status, .. }) => *status == 404,
            _ => false,
        }
    }
}

/// Opaque failures from the transport collaborator.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API request failed: {status}")]
    Status { status: u16, body: String },

    #[error("invalid request URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("missing credentials: {0}")]
    Credentials(String),
}

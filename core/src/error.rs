//! Error types for schema building, URL templating and request execution.
//!
//! # Design
//! Building and calling fail in different places and get different types.
//! `SchemaError` only comes out of `make_api`, before any fetcher exists.
//! Every call failure collapses into one `ApiError`, picked in priority
//! order: the structured `error` field of the response body, then the
//! transport message, then `Unknown`. Callers branch on one shape no matter
//! which transport produced the failure. Cancellation is not an error and
//! has no variant here.

use serde_json::Value;
use thiserror::Error;

use crate::http::HttpMethod;

/// Failures while compiling or rendering a path template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A `:` in the pattern is not followed by a parameter name.
    #[error("missing parameter name at position {position}")]
    MissingName { position: usize },

    /// A required parameter was not supplied.
    #[error("missing required path parameter \"{name}\"")]
    MissingParam { name: String },

    /// A required parameter was supplied as the empty string.
    #[error("path parameter \"{name}\" must not be empty")]
    EmptyParam { name: String },
}

/// A malformed schema, detected before any fetcher is built.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("endpoint {endpoint} declares no methods")]
    EmptyMethods { endpoint: String },

    #[error("endpoint {endpoint} declares {method} more than once")]
    DuplicateMethod { endpoint: String, method: HttpMethod },

    #[error("endpoint {endpoint} is declared more than once")]
    DuplicateEndpoint { endpoint: String },

    #[error("endpoint {endpoint} has an invalid path pattern")]
    InvalidPattern {
        endpoint: String,
        #[source]
        source: TemplateError,
    },

    /// The schema document could not be read.
    #[error("invalid schema document: {0}")]
    Parse(String),
}

/// A network-level failure reported by a transport.
///
/// HTTP error statuses are not transport errors; transports return them as
/// responses. The message may be empty when the underlying failure carries
/// none, in which case the call fails with [`ApiError::Unknown`].
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::with_source(err.to_string(), err)
    }
}

/// The normalized failure of one fetcher call.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The path could not be rendered; raised before any I/O.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// The response body carried a structured `error` field.
    #[error("{}", render_value(.error))]
    Remote { status: u16, error: Value },

    /// The transport failed, or the server answered with an error status
    /// and no structured body.
    #[error("{message}")]
    Transport { status: Option<u16>, message: String },

    /// Neither a structured error nor a message was available.
    #[error("Unknown error")]
    Unknown,

    /// The typed request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The reply could not be deserialized into the route's reply type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),
}

impl ApiError {
    /// Picks the error value for a failed call by priority.
    pub(crate) fn normalize(status: Option<u16>, body: Option<&Value>, message: &str) -> Self {
        if let Some(error) = body.and_then(|b| b.get("error")).filter(|e| !e.is_null()) {
            return ApiError::Remote {
                status: status.unwrap_or_default(),
                error: error.clone(),
            };
        }
        if !message.is_empty() {
            return ApiError::Transport {
                status,
                message: message.to_string(),
            };
        }
        ApiError::Unknown
    }

    /// The normalized failure value: the structured `error` payload, the
    /// message, or `"Unknown error"`.
    pub fn value(&self) -> Value {
        match self {
            ApiError::Remote { error, .. } => error.clone(),
            other => Value::String(other.to_string()),
        }
    }

    /// The HTTP status, when the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Remote { status, .. } => Some(*status),
            ApiError::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// Transport failures without a status, 5xx and 429 are worth another
    /// attempt. Everything else will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Remote { status, .. } => *status >= 500 || *status == 429,
            ApiError::Transport { status: None, .. } => true,
            ApiError::Transport {
                status: Some(status),
                ..
            } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

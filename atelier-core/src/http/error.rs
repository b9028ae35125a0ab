//! Transport error types

use thiserror::Error;
use uuid::Uuid;

/// Failures of a single HTTP exchange
///
/// Non-2xx answers are not errors at this layer: the status code travels with
/// the parsed payload so adapters can read provider error bodies.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The request could not be built (bad header, bad MIME type)
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// The request timed out
    #[error("Request timed out [request_id: {request_id}]")]
    Timeout { request_id: Uuid },

    /// Connection or protocol failure
    #[error("Network error: {message}")]
    Network { message: String },

    /// The response body is not JSON
    #[error("Invalid JSON response: {message}")]
    InvalidJson { message: String },

    /// The response is JSON but neither an object nor an array of objects
    #[error("Unexpected response shape: expected object or array of objects, got {found}")]
    UnexpectedShape { found: &'static str },

    /// The response exceeds the configured size limit
    #[error("Response size {size} exceeds maximum {limit}")]
    ResponseTooLarge { size: usize, limit: usize },

    /// A binary download answered with a non-success status
    #[error("Download of {url} failed with HTTP {status_code}")]
    Status { status_code: u16, url: String },

    /// The underlying client could not be constructed
    #[error("Failed to create HTTP client: {0}")]
    ClientBuild(String),
}

impl TransportError {
    /// Map a reqwest failure, keeping the request id for correlation
    pub fn from_reqwest(err: reqwest::Error, request_id: Uuid) -> Self {
        if err.is_timeout() {
            TransportError::Timeout { request_id }
        } else if err.is_connect() {
            TransportError::Network {
                message: format!("Connection failed: {} [request_id: {}]", err, request_id),
            }
        } else if err.is_builder() {
            TransportError::InvalidRequest {
                message: err.to_string(),
            }
        } else {
            TransportError::Network {
                message: format!("{} [request_id: {}]", err, request_id),
            }
        }
    }
}

/// Describe a JSON value's top-level kind for error messages
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

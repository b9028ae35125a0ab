//! HTTP transport for provider calls
//!
//! This module implements the network layer shared by every adapter:
//! - One stateless operation per exchange ([`HttpExecutor::perform`])
//! - JSON or multipart body encoding chosen by the `Content-Type` header
//! - Normalization of the reply into an object-or-array [`Payload`]
//! - Request ID generation and correlation

pub mod client;
pub mod error;

pub use client::HttpClient;
pub use error::TransportError;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Content type that switches body encoding to multipart
pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// HTTP method of a provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => f.write_str("GET"),
            HttpMethod::Post => f.write_str("POST"),
        }
    }
}

/// A binary file uploaded as one multipart part
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Form field name
    pub name: String,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("name", &self.name)
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// One provider call as seen by the transport
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    /// JSON object body, or the scalar form fields of a multipart body
    pub body: Map<String, Value>,
    pub attachments: Vec<Attachment>,
    /// Unique request ID for correlation
    pub request_id: Uuid,
    /// Overrides the client-wide timeout
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: Vec::new(),
            body: Map::new(),
            attachments: Vec::new(),
            request_id: Uuid::new_v4(),
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Map<String, Value>) -> Self {
        self.body = body;
        self
    }

    /// Switch the body to multipart encoding
    pub fn multipart(self) -> Self {
        self.with_header("Content-Type", MULTIPART_FORM_DATA)
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether the `Content-Type` header requests multipart encoding
    pub fn is_multipart(&self) -> bool {
        self.header("content-type")
            .map(|ct| ct.trim().to_ascii_lowercase().starts_with(MULTIPART_FORM_DATA))
            .unwrap_or(false)
    }
}

/// Parsed response body: an object or an array of objects, never both
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Object(Map<String, Value>),
    Array(Vec<Map<String, Value>>),
}

impl Payload {
    /// Discriminate a parsed JSON value, rejecting every other shape
    pub fn from_value(value: Value) -> Result<Self, TransportError> {
        match value {
            Value::Object(map) => Ok(Payload::Object(map)),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => Ok(map),
                    other => Err(TransportError::UnexpectedShape {
                        found: error::json_kind(&other),
                    }),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Payload::Array),
            other => Err(TransportError::UnexpectedShape {
                found: error::json_kind(&other),
            }),
        }
    }

    /// Parse raw response bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TransportError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| TransportError::InvalidJson {
                message: e.to_string(),
            })?;
        Self::from_value(value)
    }

    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            Payload::Object(map) => Some(map),
            Payload::Array(_) => None,
        }
    }
}

/// Status code plus normalized payload of one exchange
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status_code: u16,
    pub payload: Payload,
}

impl TransportResponse {
    pub fn new(status_code: u16, payload: Payload) -> Self {
        Self {
            status_code,
            payload,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Executes provider calls; implementations must be safe for concurrent use
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    /// Execute one request and normalize the JSON reply
    async fn perform(&self, request: HttpRequest) -> Result<TransportResponse, TransportError>;

    /// Download a binary result referenced by URL
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_discrimination() {
        let object = Payload::from_value(json!({"id": "abc"})).unwrap();
        assert!(matches!(object, Payload::Object(_)));

        let array = Payload::from_value(json!([{"url": "a"}, {"url": "b"}])).unwrap();
        match array {
            Payload::Array(items) => assert_eq!(items.len(), 2),
            other => panic!("expected array payload, got {:?}", other),
        }
    }

    #[test]
    fn test_payload_rejects_other_shapes() {
        assert!(matches!(
            Payload::from_value(json!("done")),
            Err(TransportError::UnexpectedShape { found: "string" })
        ));
        assert!(matches!(
            Payload::from_value(json!([{"ok": true}, 3])),
            Err(TransportError::UnexpectedShape { found: "number" })
        ));
        assert!(matches!(
            Payload::from_slice(b"<html>"),
            Err(TransportError::InvalidJson { .. })
        ));
    }

    #[test]
    fn test_multipart_detection_is_case_insensitive() {
        let request = HttpRequest::post("https://example.com")
            .with_header("content-type", "Multipart/Form-Data");
        assert!(request.is_multipart());
        assert!(!HttpRequest::post("https://example.com").is_multipart());
    }
}

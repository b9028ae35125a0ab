//! HTTP client implementation using reqwest

use crate::config::HttpSettings;
use crate::http::{
    Attachment, HttpExecutor, HttpMethod, HttpRequest, Payload, TransportError, TransportResponse,
};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, ClientBuilder, Response};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default maximum response size; base64 video bodies are large
const MAX_RESPONSE_SIZE: usize = 64 * 1024 * 1024;

/// Default user agent
const USER_AGENT: &str = concat!("atelier/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client with connection pooling
#[derive(Clone)]
pub struct HttpClient {
    /// The underlying reqwest client
    client: Arc<Client>,

    /// Maximum response size to prevent OOM
    max_response_size: usize,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Result<Self, TransportError> {
        Self::with_config(Duration::from_secs(10), Duration::from_secs(120), 10)
    }

    /// Create a new HTTP client with custom configuration
    pub fn with_config(
        connect_timeout: Duration,
        request_timeout: Duration,
        max_idle_per_host: usize,
    ) -> Result<Self, TransportError> {
        Self::build(
            connect_timeout,
            request_timeout,
            max_idle_per_host,
            USER_AGENT,
            MAX_RESPONSE_SIZE,
        )
    }

    /// Create a client from the `http` configuration section
    pub fn from_settings(settings: &HttpSettings) -> Result<Self, TransportError> {
        Self::build(
            settings.connect_timeout(),
            settings.request_timeout(),
            settings.max_idle_per_host,
            &settings.user_agent,
            settings.max_response_bytes,
        )
    }

    fn build(
        connect_timeout: Duration,
        request_timeout: Duration,
        max_idle_per_host: usize,
        user_agent: &str,
        max_response_size: usize,
    ) -> Result<Self, TransportError> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .user_agent(user_agent)
            .gzip(true)
            .build()
            .map_err(|e| TransportError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            max_response_size,
        })
    }

    /// Encode scalar body fields and attachments as multipart parts
    fn build_form(
        body: &Map<String, Value>,
        attachments: &[Attachment],
    ) -> Result<Form, TransportError> {
        let mut form = Form::new();

        for (name, value) in body {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => continue,
                Value::Array(_) | Value::Object(_) => {
                    debug!("Skipping non-scalar multipart field '{}'", name);
                    continue;
                }
            };
            form = form.text(name.clone(), text);
        }

        for attachment in attachments {
            let part = Part::bytes(attachment.bytes.clone())
                .file_name(attachment.file_name.clone())
                .mime_str(&attachment.mime_type)
                .map_err(|e| TransportError::InvalidRequest {
                    message: format!(
                        "Invalid MIME type '{}' for part '{}': {}",
                        attachment.mime_type, attachment.name, e
                    ),
                })?;
            form = form.part(attachment.name.clone(), part);
        }

        Ok(form)
    }

    /// Check response size to prevent OOM
    fn check_content_length(&self, response: &Response) -> Result<(), TransportError> {
        if let Some(content_length) = response.content_length() {
            if content_length as usize > self.max_response_size {
                return Err(TransportError::ResponseTooLarge {
                    size: content_length as usize,
                    limit: self.max_response_size,
                });
            }
        }

        Ok(())
    }

    /// Read the whole body, enforcing the size limit after reading as well
    async fn read_body(
        &self,
        response: Response,
        request_id: Uuid,
    ) -> Result<Vec<u8>, TransportError> {
        self.check_content_length(&response)?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network {
                message: format!("Failed to read response body: {} [request_id: {}]", e, request_id),
            })?;

        if bytes.len() > self.max_response_size {
            return Err(TransportError::ResponseTooLarge {
                size: bytes.len(),
                limit: self.max_response_size,
            });
        }

        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl HttpExecutor for HttpClient {
    async fn perform(&self, request: HttpRequest) -> Result<TransportResponse, TransportError> {
        let request_id = request.request_id;
        let multipart = request.is_multipart();

        info!(
            "Executing {} request [request_id: {}]",
            request.method, request_id
        );

        let mut req_builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };

        if let Some(timeout) = request.timeout {
            req_builder = req_builder.timeout(timeout);
        }

        for (name, value) in &request.headers {
            // The multipart encoder sets its own content type with a fresh boundary
            if multipart && name.eq_ignore_ascii_case("content-type") {
                continue;
            }
            req_builder = req_builder.header(name.as_str(), value.as_str());
        }

        // Add request ID header for correlation
        req_builder = req_builder.header("X-Request-ID", request_id.to_string());

        if multipart {
            let form = Self::build_form(&request.body, &request.attachments)?;
            req_builder = req_builder.multipart(form);
        } else if request.method == HttpMethod::Post || !request.body.is_empty() {
            if !request.attachments.is_empty() {
                warn!(
                    "Dropping {} attachment(s) from JSON request [request_id: {}]",
                    request.attachments.len(),
                    request_id
                );
            }
            req_builder = req_builder.json(&request.body);
        }

        let response = req_builder.send().await.map_err(|e| {
            let mapped = TransportError::from_reqwest(e, request_id);
            match &mapped {
                TransportError::Timeout { .. } => {
                    warn!("Request timeout [request_id: {}]", request_id)
                }
                other => error!("Request failed [request_id: {}]: {}", request_id, other),
            }
            mapped
        })?;

        let status = response.status();
        debug!("Response status: {} [request_id: {}]", status, request_id);

        let bytes = self.read_body(response, request_id).await?;

        let payload = Payload::from_slice(&bytes).map_err(|e| {
            error!(
                "Failed to parse response with status {} [request_id: {}]: {}",
                status, request_id, e
            );
            e
        })?;

        Ok(TransportResponse::new(status.as_u16(), payload))
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let request_id = Uuid::new_v4();
        debug!("Downloading result [request_id: {}]", request_id);

        let response = self
            .client
            .get(url)
            .header("X-Request-ID", request_id.to_string())
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, request_id))?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                "Download failed with status {} [request_id: {}]",
                status, request_id
            );
            // Query strings may carry an API key
            let without_query = url.split('?').next().unwrap_or(url);
            return Err(TransportError::Status {
                status_code: status.as_u16(),
                url: without_query.to_string(),
            });
        }

        self.read_body(response, request_id).await
    }
}

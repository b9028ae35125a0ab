//! Test doubles shared by the unit tests

use crate::http::{HttpExecutor, HttpRequest, TransportError, TransportResponse};
use crate::providers::adapter::AdapterContext;
use async_trait::async_trait;
use std::sync::Arc;

/// Transport that refuses API calls and optionally serves downloads
#[derive(Default)]
pub(crate) struct Offline {
    download: Option<Vec<u8>>,
}

impl Offline {
    /// Serve `bytes` for every download
    pub(crate) fn serving(bytes: &[u8]) -> Self {
        Self {
            download: Some(bytes.to_vec()),
        }
    }
}

fn offline() -> TransportError {
    TransportError::Network {
        message: "offline".to_string(),
    }
}

#[async_trait]
impl HttpExecutor for Offline {
    async fn perform(&self, _request: HttpRequest) -> Result<TransportResponse, TransportError> {
        Err(offline())
    }

    async fn fetch_bytes(&self, _url: &str) -> Result<Vec<u8>, TransportError> {
        self.download.clone().ok_or_else(offline)
    }
}

/// Adapter context over an [`Offline`] transport with standard pricing
pub(crate) fn offline_context(base_url: &str) -> AdapterContext {
    AdapterContext::new(Arc::new(Offline::default()), base_url)
}

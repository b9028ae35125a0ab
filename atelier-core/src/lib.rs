//! Atelier Core Library
//!
//! This crate drives generative image and video APIs (Google, Stability AI,
//! Replicate, OpenAI, Black Forest Labs) behind one request/response model:
//!
//! - [`protocol`] provider-agnostic generation requests and responses
//! - [`http`] the transport every adapter sends through
//! - [`providers`] one adapter per model family, polling and pricing
//! - [`queue`] concurrent job tracking with cancellation
//! - [`config`] YAML/JSON configuration of connections and overrides
//!
//! ```no_run
//! use atelier_core::config::load_from_yaml;
//! use atelier_core::http::HttpClient;
//! use atelier_core::protocol::GenerationRequest;
//! use atelier_core::providers::{AdapterRegistry, ModelId};
//! use atelier_core::queue::{JobQueue, UsageLedger};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Arc::new(load_from_yaml("atelier.yaml")?);
//! let transport = Arc::new(HttpClient::from_settings(&config.http)?);
//! let registry = AdapterRegistry::from_config(&config, transport);
//! let queue = JobQueue::new(registry, config, Arc::new(UsageLedger::new()));
//!
//! let item = queue.submit(GenerationRequest::image(ModelId::FluxSchnell).with_prompt("a fox"));
//! let _done = queue.settled(item.id).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod http;
pub mod protocol;
pub mod providers;
pub mod queue;

#[cfg(test)]
pub(crate) mod test_support;

pub use protocol::{GenerationRequest, GenerationResponse};
pub use providers::{AdapterRegistry, ModelId, ProviderAdapter};
pub use queue::{JobQueue, QueueItem, QueueStatus};

/// Returns the version of the Atelier Core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}

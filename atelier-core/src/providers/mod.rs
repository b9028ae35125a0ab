//! Provider adapters and the machinery they share
//!
//! Each provider family gets one module that maps a [`GenerationRequest`]
//! onto its native API. Everything that is the same across providers
//! (validation, dispatch, polling, response-shape matching, pricing) lives
//! next to them and is reached through [`ProviderAdapter`].
//!
//! [`GenerationRequest`]: crate::protocol::GenerationRequest

pub mod adapter;
pub mod aspect;
pub mod bfl;
pub mod catalog;
pub mod error;
pub mod google;
pub mod openai;
pub mod payload;
pub mod polling;
pub mod pricing;
pub mod registry;
pub mod replicate;
pub mod stability;

pub use adapter::{
    AdapterContext, BodyEncoding, Completion, ProviderAdapter, ProviderPayload, Requirements,
};
pub use catalog::{AuthScheme, MediaKind, ModelId, ProviderKind, UnknownModelError};
pub use error::{ProviderError, ProviderResult};
pub use polling::{PollOutcome, PollPolicy, PollState, PollingController};
pub use pricing::{CostInputs, CostQuote, PriceRule, PriceTable};
pub use registry::{build_adapter, AdapterRegistry};

// Re-export concrete adapters
pub use bfl::BflAdapter;
pub use google::GoogleAdapter;
pub use openai::OpenAIAdapter;
pub use replicate::ReplicateAdapter;
pub use stability::StabilityAdapter;

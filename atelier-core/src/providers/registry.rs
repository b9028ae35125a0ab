//! Model-to-adapter lookup
//!
//! The registry is built once and shared read-only; the job queue resolves the
//! adapter for each submitted model here.

use crate::config::AtelierConfig;
use crate::http::HttpExecutor;
use crate::providers::adapter::{AdapterContext, ProviderAdapter};
use crate::providers::bfl::BflAdapter;
use crate::providers::catalog::{ModelId, ProviderKind};
use crate::providers::google::GoogleAdapter;
use crate::providers::openai::OpenAIAdapter;
use crate::providers::pricing::PriceTable;
use crate::providers::replicate::ReplicateAdapter;
use crate::providers::stability::StabilityAdapter;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Instantiate the adapter of `model`'s provider family
pub fn build_adapter(model: ModelId, ctx: AdapterContext) -> Arc<dyn ProviderAdapter> {
    match model.provider() {
        ProviderKind::Google => Arc::new(GoogleAdapter::new(model, ctx)),
        ProviderKind::Stability => Arc::new(StabilityAdapter::new(model, ctx)),
        ProviderKind::Replicate => Arc::new(ReplicateAdapter::new(model, ctx)),
        ProviderKind::OpenAI => Arc::new(OpenAIAdapter::new(model, ctx)),
        ProviderKind::BlackForestLabs => Arc::new(BflAdapter::new(model, ctx)),
    }
}

/// Adapters keyed by model
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ModelId, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every catalog model against the providers' public endpoints
    pub fn with_defaults(transport: Arc<dyn HttpExecutor>) -> Self {
        let pricing = Arc::new(PriceTable::standard());
        let mut registry = Self::new();
        for model in ModelId::ALL {
            let ctx = AdapterContext::new(
                Arc::clone(&transport),
                model.provider().default_base_url(),
            )
            .with_pricing(Arc::clone(&pricing));
            registry.register(model, build_adapter(model, ctx));
        }
        registry
    }

    /// Models of the enabled providers, with configured endpoints, polling
    /// cadence and prices applied
    pub fn from_config(config: &AtelierConfig, transport: Arc<dyn HttpExecutor>) -> Self {
        let pricing = Arc::new(PriceTable::from_config(config));
        let polling: HashMap<ModelId, _> = config
            .model_overrides()
            .filter_map(|(model, overrides)| overrides.polling.map(|p| (model, p.into())))
            .collect();

        let mut registry = Self::new();
        for model in ModelId::ALL {
            let Some(settings) = config.provider(model.provider()) else {
                continue;
            };

            let base_url = settings
                .base_url
                .as_deref()
                .unwrap_or_else(|| model.provider().default_base_url());
            let mut ctx = AdapterContext::new(Arc::clone(&transport), base_url)
                .with_pricing(Arc::clone(&pricing))
                .with_auth_scheme(settings.auth_scheme.unwrap_or_default());
            if let Some(policy) = polling.get(&model) {
                ctx = ctx.with_poll_policy(*policy);
            }

            registry.register(model, build_adapter(model, ctx));
        }

        debug!("Registered {} model adapter(s) from config", registry.len());
        registry
    }

    /// Add or replace the adapter for `model`
    pub fn register(&mut self, model: ModelId, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(model, adapter);
    }

    pub fn get(&self, model: ModelId) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&model).cloned()
    }

    /// Registered models in catalog order
    pub fn models(&self) -> Vec<ModelId> {
        let mut models: Vec<ModelId> = self.adapters.keys().copied().collect();
        models.sort();
        models
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("models", &self.models())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderSettings, SecretString};
    use crate::protocol::GenerationRequest;
    use crate::test_support::Offline;

    fn connection(kind: ProviderKind) -> ProviderSettings {
        ProviderSettings {
            kind,
            api_key: SecretString::new("key"),
            base_url: None,
            auth_scheme: None,
            enabled: true,
        }
    }

    #[test]
    fn test_defaults_cover_catalog() {
        let registry = AdapterRegistry::with_defaults(Arc::new(Offline::default()));
        assert_eq!(registry.len(), ModelId::ALL.len());
        assert_eq!(registry.models(), ModelId::ALL.to_vec());
        for model in ModelId::ALL {
            assert_eq!(registry.get(model).unwrap().model(), model);
        }
    }

    #[test]
    fn test_config_registers_enabled_providers_only() {
        let mut config = AtelierConfig::empty();
        let mut stability = connection(ProviderKind::Stability);
        stability.base_url = Some("https://stability.internal/".to_string());
        let mut openai = connection(ProviderKind::OpenAI);
        openai.enabled = false;
        config.providers = vec![stability, openai];

        let registry = AdapterRegistry::from_config(&config, Arc::new(Offline::default()));
        assert_eq!(registry.len(), 9);
        assert!(registry.get(ModelId::DallE3).is_none());

        let adapter = registry.get(ModelId::StableImageCore).unwrap();
        assert_eq!(adapter.context().base_url, "https://stability.internal");
        let wire = adapter
            .transform_request(
                &GenerationRequest::image(ModelId::StableImageCore)
                    .with_prompt("x")
                    .with_secret("k"),
            )
            .unwrap();
        assert!(wire.url.starts_with("https://stability.internal/v2beta/"));
    }

    #[test]
    fn test_config_applies_replicate_token_scheme() {
        let mut config = AtelierConfig::empty();
        let mut replicate = connection(ProviderKind::Replicate);
        replicate.auth_scheme = Some(crate::providers::catalog::AuthScheme::Token);
        config.providers = vec![replicate];

        let registry = AdapterRegistry::from_config(&config, Arc::new(Offline::default()));
        let adapter = registry.get(ModelId::FluxSchnell).unwrap();
        assert_eq!(
            adapter.context().auth_scheme,
            crate::providers::catalog::AuthScheme::Token
        );
    }
}

//! Configuration schema structures with serde support

use super::error::{ValidationError, ValidationErrorKind};
use super::secrets::SecretString;
use crate::providers::catalog::{AuthScheme, ModelId, ProviderKind};
use crate::providers::pricing::PriceRule;
use crate::providers::polling::PollPolicy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// Root configuration structure for Atelier
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AtelierConfig {
    /// Schema version (required - no default)
    pub version: String,

    /// Transport settings shared by every adapter
    #[serde(default)]
    pub http: HttpSettings,

    /// Provider connections
    #[serde(default)]
    pub providers: Vec<ProviderSettings>,

    /// Per-model overrides keyed by model identifier (e.g. `veo-2`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub models: BTreeMap<String, ModelOverride>,
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HttpSettings {
    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Per-request timeout in milliseconds; uploads and video downloads are slow
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Maximum idle connections per host
    #[serde(default = "default_max_idle")]
    pub max_idle_per_host: usize,

    /// Largest response body accepted, in bytes
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            request_timeout_ms: default_request_timeout(),
            max_idle_per_host: default_max_idle(),
            max_response_bytes: default_max_response_bytes(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// One provider connection
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSettings {
    /// Which provider this connection talks to
    pub kind: ProviderKind,

    /// API key (supports environment variable interpolation)
    pub api_key: SecretString,

    /// Override of the provider's public base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Authorization header form, only meaningful for Replicate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_scheme: Option<AuthScheme>,

    /// Whether this connection is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Per-model tuning
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling: Option<PollingOverride>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<PriceRule>,
}

/// Polling cadence for asynchronous models
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PollingOverride {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

impl From<PollingOverride> for PollPolicy {
    fn from(value: PollingOverride) -> Self {
        PollPolicy::new(Duration::from_millis(value.interval_ms), value.max_attempts)
    }
}

// Default value functions for serde
fn default_true() -> bool { true }
fn default_connect_timeout() -> u64 { 10_000 }
fn default_request_timeout() -> u64 { 120_000 }
fn default_max_idle() -> usize { 10 }
fn default_max_response_bytes() -> usize { 64 * 1024 * 1024 }
fn default_user_agent() -> String { concat!("atelier/", env!("CARGO_PKG_VERSION")).to_string() }

impl AtelierConfig {
    /// Configuration with default transport settings and no providers
    pub fn empty() -> Self {
        Self {
            version: "0.1".to_string(),
            http: HttpSettings::default(),
            providers: Vec::new(),
            models: BTreeMap::new(),
        }
    }

    /// Settings of the enabled connection for `kind`, if any
    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderSettings> {
        self.providers.iter().find(|p| p.kind == kind && p.enabled)
    }

    /// Model overrides with their keys resolved to model identifiers
    ///
    /// Keys that do not name a known model are skipped; [`Self::validate`]
    /// rejects them.
    pub fn model_overrides(&self) -> impl Iterator<Item = (ModelId, &ModelOverride)> {
        self.models
            .iter()
            .filter_map(|(key, value)| key.parse::<ModelId>().ok().map(|id| (id, value)))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.version.is_empty() {
            return Err(ValidationError::required("version"));
        }

        // Currently support only version 0.1
        if self.version != "0.1" {
            return Err(ValidationError::new(
                "version",
                ValidationErrorKind::InvalidVersion {
                    expected: "0.1".to_string(),
                    actual: self.version.clone(),
                },
            ));
        }

        self.http.validate("http")?;

        let mut seen_kinds = HashSet::new();
        for (i, provider) in self.providers.iter().enumerate() {
            if !seen_kinds.insert(provider.kind) {
                return Err(ValidationError::new(
                    format!("providers[{}].kind", i),
                    ValidationErrorKind::DuplicateProvider {
                        provider: provider.kind.as_str().to_string(),
                    },
                ));
            }

            provider.validate(&format!("providers[{}]", i))?;
        }

        for (key, model) in &self.models {
            let path = format!("models.{}", key);
            let id: ModelId = key.parse().map_err(|_| {
                ValidationError::new(
                    path.clone(),
                    ValidationErrorKind::UnknownModel { model: key.clone() },
                )
            })?;
            model.validate(&path, id)?;
        }

        Ok(())
    }
}

impl HttpSettings {
    /// Validate transport settings
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.connect_timeout_ms == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.connect_timeout_ms", path),
                "Must be greater than 0",
            ));
        }

        if self.request_timeout_ms == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.request_timeout_ms", path),
                "Must be greater than 0",
            ));
        }

        if self.max_response_bytes == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.max_response_bytes", path),
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl ProviderSettings {
    /// Validate provider configuration
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.enabled && self.api_key.is_empty() {
            return Err(ValidationError::required(format!("{}.api_key", path)));
        }

        if let Some(base_url) = &self.base_url {
            match url::Url::parse(base_url) {
                Ok(url) => {
                    if url.scheme() != "http" && url.scheme() != "https" {
                        return Err(ValidationError::new(
                            format!("{}.base_url", path),
                            ValidationErrorKind::InvalidUrl {
                                message: format!(
                                    "URL scheme must be http or https, got: {}",
                                    url.scheme()
                                ),
                            },
                        ));
                    }
                }
                Err(e) => {
                    return Err(ValidationError::new(
                        format!("{}.base_url", path),
                        ValidationErrorKind::InvalidUrl {
                            message: e.to_string(),
                        },
                    ));
                }
            }
        }

        if self.auth_scheme.is_some() && self.kind != ProviderKind::Replicate {
            return Err(ValidationError::new(
                format!("{}.auth_scheme", path),
                ValidationErrorKind::AuthSchemeNotSupported {
                    provider: self.kind.as_str().to_string(),
                },
            )
            .with_context("only replicate accepts the Token form"));
        }

        Ok(())
    }
}

impl ModelOverride {
    /// Validate a model override
    pub fn validate(&self, path: &str, model: ModelId) -> Result<(), ValidationError> {
        if let Some(polling) = &self.polling {
            if !model.is_async() {
                return Err(ValidationError::new(
                    format!("{}.polling", path),
                    ValidationErrorKind::SynchronousModel {
                        model: model.as_str().to_string(),
                    },
                ));
            }
            if polling.interval_ms == 0 {
                return Err(ValidationError::out_of_range(
                    format!("{}.polling.interval_ms", path),
                    "Must be greater than 0",
                ));
            }
            if polling.max_attempts == 0 {
                return Err(ValidationError::out_of_range(
                    format!("{}.polling.max_attempts", path),
                    "Must be greater than 0",
                ));
            }
        }

        if let Some(pricing) = &self.pricing {
            if !pricing.is_non_negative() {
                return Err(ValidationError::out_of_range(
                    format!("{}.pricing", path),
                    "Prices must be non-negative",
                ));
            }
        }

        Ok(())
    }
}

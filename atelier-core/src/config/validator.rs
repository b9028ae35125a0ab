//! Configuration validation utilities

use super::env::ENV_VAR_PATTERN;
use super::error::{ValidationError, ValidationErrorKind};
use super::schema::AtelierConfig;
use crate::providers::catalog::MediaKind;
use crate::providers::pricing::PriceRule;
use tracing::warn;

/// Configuration validator with cross-section rules
#[derive(Debug, Default)]
pub struct ConfigValidator;

impl ConfigValidator {
    /// Create a new validator
    pub fn new() -> Self {
        Self
    }

    /// Validate a configuration with extended rules
    pub fn validate(&self, config: &AtelierConfig) -> Result<(), ValidationError> {
        config.validate()?;

        self.validate_placeholders_resolved(config)?;
        self.validate_pricing_units(config)?;
        self.check_override_connections(config);

        Ok(())
    }

    /// Reject secrets that still contain a `${VAR}` placeholder
    fn validate_placeholders_resolved(&self, config: &AtelierConfig) -> Result<(), ValidationError> {
        for (i, provider) in config.providers.iter().enumerate() {
            if let Some(var) = self.extract_env_vars(provider.api_key.expose_secret()).pop() {
                return Err(ValidationError::new(
                    format!("providers[{}].api_key", i),
                    ValidationErrorKind::UnresolvedPlaceholder { var: var.clone() },
                )
                .with_context(format!("export {} before loading", var)));
            }
        }
        Ok(())
    }

    /// Per-second prices only make sense for video models and vice versa
    fn validate_pricing_units(&self, config: &AtelierConfig) -> Result<(), ValidationError> {
        for (model, settings) in config.model_overrides() {
            let Some(rule) = &settings.pricing else {
                continue;
            };
            let matches = match rule {
                PriceRule::PerSecond(_) => model.media() == MediaKind::Video,
                PriceRule::PerImage(_) | PriceRule::PerImageByQuality { .. } => {
                    model.media() == MediaKind::Image
                }
                PriceRule::Flat(_) => true,
            };
            if !matches {
                let hint = match model.media() {
                    MediaKind::Video => "use per_second or flat",
                    MediaKind::Image => "use per_image, per_image_by_quality or flat",
                };
                return Err(ValidationError::new(
                    format!("models.{}.pricing", model),
                    ValidationErrorKind::PriceUnitMismatch {
                        unit: rule.unit().to_string(),
                        media: model.media().as_str().to_string(),
                    },
                )
                .with_context(hint));
            }
        }
        Ok(())
    }

    /// Overrides for providers without a connection are legal but useless
    fn check_override_connections(&self, config: &AtelierConfig) {
        for (model, _) in config.model_overrides() {
            if config.provider(model.provider()).is_none() {
                warn!(
                    "Override for model {} has no enabled {} connection",
                    model,
                    model.provider().as_str()
                );
            }
        }
    }

    /// Extract environment variable names referenced in a string
    pub fn extract_env_vars(&self, text: &str) -> Vec<String> {
        ENV_VAR_PATTERN
            .captures_iter(text)
            .map(|cap| cap[1].to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_extraction() {
        let validator = ConfigValidator::new();

        let text = "api_key: ${STABILITY_API_KEY}, url: ${REPLICATE_BASE_URL}";
        let vars = validator.extract_env_vars(text);

        assert_eq!(vars.len(), 2);
        assert!(vars.contains(&"STABILITY_API_KEY".to_string()));
        assert!(vars.contains(&"REPLICATE_BASE_URL".to_string()));
    }

    #[test]
    fn test_per_second_price_on_image_model_rejected() {
        let yaml = r#"
version: "0.1"
models:
  dall-e-3:
    pricing:
      per_second: 0.5
"#;
        let config: AtelierConfig = serde_yaml::from_str(yaml).unwrap();
        let err = ConfigValidator::new().validate(&config).unwrap_err();
        assert_eq!(err.field_path, "models.dall-e-3.pricing");
        assert!(matches!(err.kind, ValidationErrorKind::PriceUnitMismatch { .. }));
        assert_eq!(
            err.context.as_deref(),
            Some("use per_image, per_image_by_quality or flat")
        );
    }

    #[test]
    fn test_unresolved_placeholder_names_variable() {
        let yaml = r#"
version: "0.1"
providers:
  - kind: openai
    api_key: "${OPENAI_API_KEY}"
"#;
        let config: AtelierConfig = serde_yaml::from_str(yaml).unwrap();
        let err = ConfigValidator::new().validate(&config).unwrap_err();
        assert_eq!(err.field_path, "providers[0].api_key");
        match err.kind {
            ValidationErrorKind::UnresolvedPlaceholder { var } => {
                assert_eq!(var, "OPENAI_API_KEY")
            }
            other => panic!("unexpected kind: {:?}", other),
        }
        assert_eq!(err.context.as_deref(), Some("export OPENAI_API_KEY before loading"));
    }
}

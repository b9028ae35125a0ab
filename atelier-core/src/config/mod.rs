//! Configuration module for Atelier
//!
//! This module provides the configuration schema and validation for provider
//! connections, transport settings and per-model polling/pricing overrides.

mod env;
mod error;
mod schema;
mod secrets;
mod validator;

pub use error::{ConfigError, ConfigResult, ValidationError, ValidationErrorKind};
pub use schema::{
    AtelierConfig, HttpSettings, ModelOverride, PollingOverride, ProviderSettings,
};
pub use secrets::SecretString;
pub use validator::ConfigValidator;

use std::fs;
use std::path::Path;
use tracing::debug;

/// Load a configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<AtelierConfig, ConfigError> {
    let path = path.as_ref();
    let content = read_config(path)?;

    let interpolated = env::interpolate_env_vars(&content)?;

    let mut config: AtelierConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::ParseError {
            path: path.to_string_lossy().to_string(),
            line: e.location().map(|l| l.line()),
            column: e.location().map(|l| l.column()),
            message: e.to_string(),
        })?;

    finish_loading(&mut config)?;
    Ok(config)
}

/// Load a configuration from a JSON file
pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<AtelierConfig, ConfigError> {
    let path = path.as_ref();
    let content = read_config(path)?;

    let interpolated = env::interpolate_env_vars(&content)?;

    let mut config: AtelierConfig =
        serde_json::from_str(&interpolated).map_err(|e| ConfigError::ParseError {
            path: path.to_string_lossy().to_string(),
            line: Some(e.line()),
            column: Some(e.column()),
            message: e.to_string(),
        })?;

    finish_loading(&mut config)?;
    Ok(config)
}

fn read_config(path: &Path) -> Result<String, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_string_lossy().to_string(),
        source: e,
    })?;

    let validator = ConfigValidator::new();
    let vars = validator.extract_env_vars(&content);
    if !vars.is_empty() {
        debug!("Config {} references env vars: {:?}", path.display(), vars);
    }
    Ok(content)
}

fn finish_loading(config: &mut AtelierConfig) -> Result<(), ConfigError> {
    env::interpolate_config_env_vars(config)?;

    let validator = ConfigValidator::new();
    validator.validate(config)?;

    for provider in &config.providers {
        debug!(
            "Loaded {} connection (key {})",
            provider.kind.as_str(),
            provider.api_key.partial_redact()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_yaml() {
        let yaml = r#"
version: "0.1"
http:
  request_timeout_ms: 300000
providers:
  - kind: stability
    api_key: sk-test
  - kind: replicate
    api_key: r8_test
    auth_scheme: token
models:
  veo-2:
    polling:
      interval_ms: 10000
      max_attempts: 60
    pricing:
      per_second: 0.35
"#;
        let config: AtelierConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.http.request_timeout_ms, 300_000);
        assert_eq!(config.http.connect_timeout_ms, 10_000);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.model_overrides().count(), 1);
    }
}

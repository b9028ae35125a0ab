//! Environment variable interpolation for configuration

use super::error::ConfigError;
use super::secrets::SecretString;
use regex::Regex;
use std::env;
use std::sync::LazyLock;

/// `${VAR_NAME}` placeholders, upper-case names only
pub(crate) static ENV_VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var pattern"));

/// Interpolate environment variables in a configuration string
pub fn interpolate_env_vars(content: &str) -> Result<String, ConfigError> {
    let mut result = content.to_string();
    let mut missing_vars = Vec::new();

    for cap in ENV_VAR_PATTERN.captures_iter(content) {
        let full_match = &cap[0];
        let var_name = &cap[1];

        match env::var(var_name) {
            Ok(value) => {
                result = result.replace(full_match, &value);
            }
            Err(_) => {
                missing_vars.push(var_name.to_string());
            }
        }
    }

    if let Some(var) = missing_vars.first() {
        return Err(ConfigError::EnvVarNotFound { var: var.clone() });
    }

    Ok(result)
}

/// Interpolate environment variables left in provider fields after loading
pub fn interpolate_config_env_vars(
    config: &mut super::schema::AtelierConfig,
) -> Result<(), ConfigError> {
    for provider in &mut config.providers {
        let api_key_str = provider.api_key.expose_secret();
        if ENV_VAR_PATTERN.is_match(api_key_str) {
            let interpolated = interpolate_single_value(api_key_str)?;
            provider.api_key = SecretString::new(interpolated);
        }

        if let Some(base_url) = &provider.base_url {
            if ENV_VAR_PATTERN.is_match(base_url) {
                provider.base_url = Some(interpolate_single_value(base_url)?);
            }
        }
    }

    Ok(())
}

/// Interpolate a single value that may contain environment variables
fn interpolate_single_value(value: &str) -> Result<String, ConfigError> {
    let mut result = value.to_string();
    for cap in ENV_VAR_PATTERN.captures_iter(value) {
        let var_name = &cap[1];
        let env_value = env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound {
            var: var_name.to_string(),
        })?;
        result = result.replace(&cap[0], &env_value);
    }
    Ok(result)
}

//! Integration tests for configuration loading and validation

use atelier_core::config::{load_from_json, load_from_yaml, ConfigError, ValidationErrorKind};
use atelier_core::providers::{AuthScheme, ModelId, PriceRule, PriceTable, ProviderKind};
use atelier_core::queue::SecretLookup;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Helper to create a test config file
fn create_test_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_valid_yaml_config() {
    std::env::set_var("ATELIER_TEST_STABILITY_KEY", "sk-from-env");

    let yaml = r#"
version: "0.1"
http:
  request_timeout_ms: 300000
providers:
  - kind: stability
    api_key: ${ATELIER_TEST_STABILITY_KEY}
  - kind: replicate
    api_key: r8_inline
    auth_scheme: token
    base_url: https://replicate.internal/v1
models:
  veo-3:
    polling:
      interval_ms: 15000
      max_attempts: 40
  flux-schnell:
    pricing:
      per_image: 0.005
"#;

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "atelier.yaml", yaml);
    let config = load_from_yaml(&path).unwrap();

    assert_eq!(config.http.request_timeout_ms, 300_000);
    assert_eq!(
        config.secret_for(ProviderKind::Stability).unwrap().expose_secret(),
        "sk-from-env"
    );
    assert!(config.secret_for(ProviderKind::OpenAI).is_none());

    let replicate = config.provider(ProviderKind::Replicate).unwrap();
    assert_eq!(replicate.auth_scheme, Some(AuthScheme::Token));
    assert_eq!(
        replicate.base_url.as_deref(),
        Some("https://replicate.internal/v1")
    );

    let prices = PriceTable::from_config(&config);
    assert_eq!(prices.rule(ModelId::FluxSchnell), Some(&PriceRule::PerImage(0.005)));
    assert_eq!(prices.rule(ModelId::Veo3), Some(&PriceRule::PerSecond(0.40)));
}

#[test]
fn test_load_valid_json_config() {
    let json = r#"{
        "version": "0.1",
        "providers": [
            {"kind": "openai", "api_key": "sk-json-key"},
            {"kind": "bfl", "api_key": "bfl-key", "enabled": false}
        ]
    }"#;

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "atelier.json", json);
    let config = load_from_json(&path).unwrap();

    assert_eq!(config.providers.len(), 2);
    assert!(config.provider(ProviderKind::OpenAI).is_some());
    assert!(config.provider(ProviderKind::BlackForestLabs).is_none());
}

#[test]
fn test_missing_env_var() {
    let yaml = r#"
version: "0.1"
providers:
  - kind: openai
    api_key: ${ATELIER_TEST_UNSET_VARIABLE}
"#;

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "atelier.yaml", yaml);

    match load_from_yaml(&path) {
        Err(ConfigError::EnvVarNotFound { var }) => {
            assert_eq!(var, "ATELIER_TEST_UNSET_VARIABLE")
        }
        other => panic!("expected missing env var, got {:?}", other),
    }
}

#[test]
fn test_duplicate_provider_rejected() {
    let yaml = r#"
version: "0.1"
providers:
  - kind: openai
    api_key: sk-one
  - kind: openai
    api_key: sk-two
"#;

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "atelier.yaml", yaml);

    match load_from_yaml(&path) {
        Err(ConfigError::ValidationError(err)) => {
            assert_eq!(err.field_path, "providers[1].kind");
            assert!(matches!(err.kind, ValidationErrorKind::DuplicateProvider { .. }));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn test_unknown_model_override_rejected() {
    let yaml = r#"
version: "0.1"
models:
  midjourney-v6:
    pricing:
      per_image: 0.1
"#;

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "atelier.yaml", yaml);

    match load_from_yaml(&path) {
        Err(ConfigError::ValidationError(err)) => {
            assert!(matches!(err.kind, ValidationErrorKind::UnknownModel { .. }));
        }
        other => panic!("expected unknown model, got {:?}", other),
    }
}

#[test]
fn test_polling_on_synchronous_model_rejected() {
    let yaml = r#"
version: "0.1"
models:
  dall-e-3:
    polling:
      interval_ms: 1000
      max_attempts: 5
"#;

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "atelier.yaml", yaml);

    match load_from_yaml(&path) {
        Err(ConfigError::ValidationError(err)) => {
            assert_eq!(err.field_path, "models.dall-e-3.polling");
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn test_invalid_base_url_and_version() {
    let dir = TempDir::new().unwrap();

    let bad_url = create_test_file(
        &dir,
        "url.yaml",
        r#"
version: "0.1"
providers:
  - kind: google
    api_key: g-key
    base_url: ftp://example.com
"#,
    );
    match load_from_yaml(&bad_url) {
        Err(ConfigError::ValidationError(err)) => {
            assert!(matches!(err.kind, ValidationErrorKind::InvalidUrl { .. }));
        }
        other => panic!("expected invalid URL, got {:?}", other),
    }

    let bad_version = create_test_file(&dir, "version.yaml", "version: \"2.0\"\n");
    match load_from_yaml(&bad_version) {
        Err(ConfigError::ValidationError(err)) => {
            assert!(matches!(err.kind, ValidationErrorKind::InvalidVersion { .. }));
        }
        other => panic!("expected invalid version, got {:?}", other),
    }
}

#[test]
fn test_parse_error_reports_location() {
    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "broken.json", "{\"version\": \"0.1\",\n  \"providers\": [}");

    match load_from_json(&path) {
        Err(ConfigError::ParseError { line, .. }) => assert_eq!(line, Some(2)),
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[test]
fn test_missing_file() {
    let result = load_from_yaml("/nonexistent/atelier.yaml");
    assert!(matches!(result, Err(ConfigError::IoError { .. })));
}

//! Configuration error types

use std::fmt;
use thiserror::Error;

/// Failure to load a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading config from '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in '{path}' at line {}, column {}: {message}",
            .line.unwrap_or(0), .column.unwrap_or(0))]
    ParseError {
        path: String,
        line: Option<usize>,
        column: Option<usize>,
        message: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Environment variable '{var}' not found")]
    EnvVarNotFound { var: String },
}

/// A rejected setting, located by its path (e.g. `models.veo-3.polling`)
#[derive(Debug, Error)]
pub struct ValidationError {
    pub field_path: String,
    pub kind: ValidationErrorKind,
    /// Hint for fixing the setting
    pub context: Option<String>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validation failed at '{}': {}", self.field_path, self.kind)?;
        if let Some(ctx) = &self.context {
            write!(f, " ({})", ctx)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ValidationErrorKind {
    #[error("required field is missing")]
    RequiredFieldMissing,

    #[error("value out of range: {message}")]
    OutOfRange { message: String },

    #[error("provider {provider} is configured more than once")]
    DuplicateProvider { provider: String },

    #[error("invalid URL: {message}")]
    InvalidUrl { message: String },

    #[error("invalid version: expected {expected}, got {actual}")]
    InvalidVersion { expected: String, actual: String },

    #[error("unknown model: {model}")]
    UnknownModel { model: String },

    #[error("{provider} does not take an auth_scheme")]
    AuthSchemeNotSupported { provider: String },

    #[error("{model} answers synchronously and is never polled")]
    SynchronousModel { model: String },

    #[error("{unit} pricing does not fit a {media} model")]
    PriceUnitMismatch { unit: String, media: String },

    #[error("secret still holds the placeholder for ${{{var}}}")]
    UnresolvedPlaceholder { var: String },
}

impl ValidationError {
    pub fn new(field_path: impl Into<String>, kind: ValidationErrorKind) -> Self {
        Self {
            field_path: field_path.into(),
            kind,
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn required(field_path: impl Into<String>) -> Self {
        Self::new(field_path, ValidationErrorKind::RequiredFieldMissing)
    }

    pub fn out_of_range(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            field_path,
            ValidationErrorKind::OutOfRange {
                message: message.into(),
            },
        )
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_path_and_hint() {
        let err = ValidationError::new(
            "providers[0].api_key",
            ValidationErrorKind::UnresolvedPlaceholder {
                var: "STABILITY_API_KEY".to_string(),
            },
        )
        .with_context("export STABILITY_API_KEY before loading");

        assert_eq!(
            err.to_string(),
            "Validation failed at 'providers[0].api_key': secret still holds the placeholder \
             for ${STABILITY_API_KEY} (export STABILITY_API_KEY before loading)"
        );
    }
}

//! Provider error types and handling

use crate::http::TransportError;
use crate::protocol::{AssetKind, ErrorKind};
use thiserror::Error;

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors raised while driving a provider call
///
/// None of these escape [`make_request`](super::ProviderAdapter::make_request);
/// each one is folded into a failed response of the matching [`ErrorKind`].
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// A local precondition failed before any network call
    #[error("{0}")]
    Adapter(String),

    /// The provider reported a failure
    #[error("{0}")]
    Model(String),

    /// A success-shaped payload could not be decoded
    #[error("{0}")]
    TransformResponse(String),

    /// Polling ran out of attempts
    #[error("Generation did not finish after {attempts} status checks")]
    Timeout { attempts: u32 },

    /// The job's cancellation token fired
    #[error("Cancelled by user")]
    Cancelled,

    /// The HTTP exchange failed
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ProviderError {
    /// Error kind reported on the failed response
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Adapter(_) => ErrorKind::AdapterError,
            ProviderError::Model(_) => ErrorKind::ModelError,
            ProviderError::TransformResponse(_) => ErrorKind::TransformResponseError,
            ProviderError::Timeout { .. } => ErrorKind::Timeout,
            ProviderError::Cancelled => ErrorKind::Cancelled,
            ProviderError::Transport(_) => ErrorKind::TransportError,
        }
    }

    pub fn missing_asset(kind: AssetKind) -> Self {
        ProviderError::Adapter(format!("Missing required {}", kind.label()))
    }

    pub fn invalid_asset(kind: AssetKind, err: base64::DecodeError) -> Self {
        ProviderError::Adapter(format!("The {} is not valid base64: {}", kind.label(), err))
    }

    /// The adapter was asked to serve a model outside its family
    pub fn unsupported_model(model: impl std::fmt::Display, provider: &str) -> Self {
        ProviderError::Adapter(format!("Model {} is not served by {}", model, provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ProviderError::missing_asset(AssetKind::Mask).kind(),
            ErrorKind::AdapterError
        );
        assert_eq!(ProviderError::Timeout { attempts: 3 }.kind(), ErrorKind::Timeout);
        assert_eq!(ProviderError::Cancelled.to_string(), "Cancelled by user");

        let transport: ProviderError = TransportError::Network {
            message: "reset".to_string(),
        }
        .into();
        assert_eq!(transport.kind(), ErrorKind::TransportError);
    }

    #[test]
    fn test_missing_asset_message() {
        assert_eq!(
            ProviderError::missing_asset(AssetKind::SourceImage).to_string(),
            "Missing required image"
        );
    }
}

//! Static catalog of supported providers and models
//!
//! Every model the crate can drive has one [`ModelId`] variant. The catalog is
//! closed: adding a model means adding a variant here, a wire mapping in its
//! provider module and a row in the price table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Third-party services the adapters talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Google,
    Stability,
    Replicate,
    OpenAI,
    #[serde(rename = "bfl")]
    BlackForestLabs,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::Stability => "stability",
            ProviderKind::Replicate => "replicate",
            ProviderKind::OpenAI => "openai",
            ProviderKind::BlackForestLabs => "bfl",
        }
    }

    /// Public API root used when configuration does not override it
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::Google => "https://generativelanguage.googleapis.com/v1beta",
            ProviderKind::Stability => "https://api.stability.ai",
            ProviderKind::Replicate => "https://api.replicate.com/v1",
            ProviderKind::OpenAI => "https://api.openai.com/v1",
            ProviderKind::BlackForestLabs => "https://api.bfl.ai/v1",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the secret is placed in the `Authorization` header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    /// `Authorization: Bearer <secret>`
    #[default]
    Bearer,
    /// `Authorization: Token <secret>` (legacy Replicate form)
    Token,
}

impl AuthScheme {
    pub fn header_value(&self, secret: &str) -> String {
        match self {
            AuthScheme::Bearer => format!("Bearer {}", secret),
            AuthScheme::Token => format!("Token {}", secret),
        }
    }
}

/// What a model produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

/// Closed set of (provider, model) pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelId {
    #[serde(rename = "imagen-3")]
    Imagen3,
    #[serde(rename = "gemini-flash-image")]
    GeminiFlashImage,
    #[serde(rename = "veo-2")]
    Veo2,
    #[serde(rename = "veo-3")]
    Veo3,
    #[serde(rename = "stable-image-ultra")]
    StableImageUltra,
    #[serde(rename = "stable-image-core")]
    StableImageCore,
    #[serde(rename = "sd3-large")]
    Sd3Large,
    #[serde(rename = "stability-inpaint")]
    StabilityInpaint,
    #[serde(rename = "stability-erase")]
    StabilityErase,
    #[serde(rename = "stability-search-and-replace")]
    StabilitySearchAndReplace,
    #[serde(rename = "stability-remove-background")]
    StabilityRemoveBackground,
    #[serde(rename = "stability-upscale-fast")]
    StabilityUpscaleFast,
    #[serde(rename = "stability-image-to-video")]
    StabilityImageToVideo,
    #[serde(rename = "flux-schnell")]
    FluxSchnell,
    #[serde(rename = "flux-1.1-pro")]
    Flux11Pro,
    #[serde(rename = "flux-fill-pro")]
    FluxFillPro,
    #[serde(rename = "recraft-v3")]
    RecraftV3,
    #[serde(rename = "minimax-video-01")]
    MinimaxVideo01,
    #[serde(rename = "kling-video")]
    KlingVideo,
    #[serde(rename = "dall-e-3")]
    DallE3,
    #[serde(rename = "gpt-image-1")]
    GptImage1,
    #[serde(rename = "flux-kontext-pro")]
    FluxKontextPro,
}

impl ModelId {
    /// Every supported model, grouped by provider
    pub const ALL: [ModelId; 22] = [
        ModelId::Imagen3,
        ModelId::GeminiFlashImage,
        ModelId::Veo2,
        ModelId::Veo3,
        ModelId::StableImageUltra,
        ModelId::StableImageCore,
        ModelId::Sd3Large,
        ModelId::StabilityInpaint,
        ModelId::StabilityErase,
        ModelId::StabilitySearchAndReplace,
        ModelId::StabilityRemoveBackground,
        ModelId::StabilityUpscaleFast,
        ModelId::StabilityImageToVideo,
        ModelId::FluxSchnell,
        ModelId::Flux11Pro,
        ModelId::FluxFillPro,
        ModelId::RecraftV3,
        ModelId::MinimaxVideo01,
        ModelId::KlingVideo,
        ModelId::DallE3,
        ModelId::GptImage1,
        ModelId::FluxKontextPro,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::Imagen3 => "imagen-3",
            ModelId::GeminiFlashImage => "gemini-flash-image",
            ModelId::Veo2 => "veo-2",
            ModelId::Veo3 => "veo-3",
            ModelId::StableImageUltra => "stable-image-ultra",
            ModelId::StableImageCore => "stable-image-core",
            ModelId::Sd3Large => "sd3-large",
            ModelId::StabilityInpaint => "stability-inpaint",
            ModelId::StabilityErase => "stability-erase",
            ModelId::StabilitySearchAndReplace => "stability-search-and-replace",
            ModelId::StabilityRemoveBackground => "stability-remove-background",
            ModelId::StabilityUpscaleFast => "stability-upscale-fast",
            ModelId::StabilityImageToVideo => "stability-image-to-video",
            ModelId::FluxSchnell => "flux-schnell",
            ModelId::Flux11Pro => "flux-1.1-pro",
            ModelId::FluxFillPro => "flux-fill-pro",
            ModelId::RecraftV3 => "recraft-v3",
            ModelId::MinimaxVideo01 => "minimax-video-01",
            ModelId::KlingVideo => "kling-video",
            ModelId::DallE3 => "dall-e-3",
            ModelId::GptImage1 => "gpt-image-1",
            ModelId::FluxKontextPro => "flux-kontext-pro",
        }
    }

    pub fn provider(&self) -> ProviderKind {
        match self {
            ModelId::Imagen3 | ModelId::GeminiFlashImage | ModelId::Veo2 | ModelId::Veo3 => {
                ProviderKind::Google
            }
            ModelId::StableImageUltra
            | ModelId::StableImageCore
            | ModelId::Sd3Large
            | ModelId::StabilityInpaint
            | ModelId::StabilityErase
            | ModelId::StabilitySearchAndReplace
            | ModelId::StabilityRemoveBackground
            | ModelId::StabilityUpscaleFast
            | ModelId::StabilityImageToVideo => ProviderKind::Stability,
            ModelId::FluxSchnell
            | ModelId::Flux11Pro
            | ModelId::FluxFillPro
            | ModelId::RecraftV3
            | ModelId::MinimaxVideo01
            | ModelId::KlingVideo => ProviderKind::Replicate,
            ModelId::DallE3 | ModelId::GptImage1 => ProviderKind::OpenAI,
            ModelId::FluxKontextPro => ProviderKind::BlackForestLabs,
        }
    }

    pub fn media(&self) -> MediaKind {
        match self {
            ModelId::Veo2
            | ModelId::Veo3
            | ModelId::StabilityImageToVideo
            | ModelId::MinimaxVideo01
            | ModelId::KlingVideo => MediaKind::Video,
            _ => MediaKind::Image,
        }
    }

    /// Clip length used when a video request does not name one
    pub fn default_duration_seconds(&self) -> Option<u32> {
        match self {
            ModelId::Veo2 | ModelId::Veo3 => Some(8),
            ModelId::StabilityImageToVideo => Some(4),
            ModelId::MinimaxVideo01 => Some(6),
            ModelId::KlingVideo => Some(5),
            _ => None,
        }
    }

    /// Whether the provider answers with a job to poll instead of a result
    pub fn is_async(&self) -> bool {
        matches!(
            self,
            ModelId::Veo2
                | ModelId::Veo3
                | ModelId::StabilityImageToVideo
                | ModelId::FluxKontextPro
        ) || self.provider() == ProviderKind::Replicate
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a catalog model
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown model identifier '{0}'")]
pub struct UnknownModelError(pub String);

impl FromStr for ModelId {
    type Err = UnknownModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ModelId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == wanted)
            .ok_or_else(|| UnknownModelError(s.to_string()))
    }
}

//! Core protocol types for generation jobs
//!
//! A [`GenerationRequest`] describes one image or video job independently of
//! the provider that will run it; a [`GenerationResponse`] is the normalized
//! outcome every adapter produces. The design prioritizes:
//! - Invariants enforced by the type system (image XOR video parameters,
//!   generated XOR failed outcomes)
//! - Assets kept as opaque base64 blobs until an adapter needs them
//! - Builder-style construction for callers

use crate::config::SecretString;
use crate::providers::catalog::ModelId;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Pixel dimensions written as `WxH` on the wire (e.g. `1024x768`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width divided by height
    pub fn ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Error returned when a `WxH` dimension string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid dimensions '{input}': expected WIDTHxHEIGHT with non-zero sides")]
pub struct ParseDimensionsError {
    pub input: String,
}

impl FromStr for Dimensions {
    type Err = ParseDimensionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseDimensionsError {
            input: s.to_string(),
        };
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(err)?;
        let width: u32 = w.trim().parse().map_err(|_| err())?;
        let height: u32 = h.trim().parse().map_err(|_| err())?;
        if width == 0 || height == 0 {
            return Err(err());
        }
        Ok(Self { width, height })
    }
}

impl TryFrom<String> for Dimensions {
    type Error = ParseDimensionsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Dimensions> for String {
    fn from(value: Dimensions) -> Self {
        value.to_string()
    }
}

/// Model variant flag used by providers that sell a faster, cheaper tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    #[default]
    Standard,
    Turbo,
}

/// Requested output quality; also selects the price tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Draft,
    #[default]
    Standard,
    Premium,
}

/// Output modalities requested from multimodal models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseModality {
    Text,
    Image,
}

/// Strip a `data:<mime>;base64,` prefix, returning the bare base64 text
pub(crate) fn strip_data_uri(encoded: &str) -> &str {
    let trimmed = encoded.trim();
    if trimmed.starts_with("data:") {
        if let Some((_, data)) = trimmed.split_once(',') {
            return data;
        }
    }
    trimmed
}

/// An input blob (image, mask, frame, video) kept base64-encoded
///
/// The encoded text may carry a data-URI prefix; adapters always go through
/// [`Asset::base64`] or [`Asset::data_uri`] so the prefix never leaks onto a
/// wire that expects bare base64.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Asset {
    encoded: String,
}

impl Asset {
    /// Wrap already-encoded base64 text, with or without a data-URI prefix
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self {
            encoded: encoded.into(),
        }
    }

    /// Encode raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            encoded: STANDARD.encode(bytes),
        }
    }

    /// Bare base64 text, data-URI prefix removed
    pub fn base64(&self) -> &str {
        strip_data_uri(&self.encoded)
    }

    /// Decode to raw bytes
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.base64())
    }

    /// MIME type from the data-URI prefix, else sniffed from the bytes
    pub fn mime_type(&self) -> String {
        let trimmed = self.encoded.trim();
        if let Some(rest) = trimmed.strip_prefix("data:") {
            if let Some((mime, _)) = rest.split_once(';') {
                if !mime.is_empty() {
                    return mime.to_string();
                }
            }
        }
        self.decode()
            .ok()
            .and_then(|bytes| infer::get(&bytes).map(|kind| kind.mime_type().to_string()))
            .unwrap_or_else(|| "image/png".to_string())
    }

    /// `data:<mime>;base64,<data>` form expected by URL-style inputs
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type(), self.base64())
    }
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Asset({} base64 chars)", self.base64().len())
    }
}

/// Which input asset a request slot refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    SourceImage,
    Mask,
    LastFrame,
    SourceVideo,
}

impl AssetKind {
    /// Human-readable name used in validation messages
    pub fn label(&self) -> &'static str {
        match self {
            AssetKind::SourceImage => "image",
            AssetKind::Mask => "mask",
            AssetKind::LastFrame => "last frame",
            AssetKind::SourceVideo => "video",
        }
    }
}

/// Input assets attached to a request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_image: Option<Asset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<Asset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_frame: Option<Asset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_video: Option<Asset>,
}

impl Assets {
    pub fn get(&self, kind: AssetKind) -> Option<&Asset> {
        match kind {
            AssetKind::SourceImage => self.source_image.as_ref(),
            AssetKind::Mask => self.mask.as_ref(),
            AssetKind::LastFrame => self.last_frame.as_ref(),
            AssetKind::SourceVideo => self.source_video.as_ref(),
        }
    }
}

/// Reference to the externally persisted usage record of a connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageRecordRef(pub String);

impl UsageRecordRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for UsageRecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Provider secret plus the usage record it is billed against
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub secret: SecretString,
    #[serde(default)]
    pub usage_record: UsageRecordRef,
}

/// Knobs for image jobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    #[serde(default)]
    pub variant: ModelVariant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<Quality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Number of images to generate
    #[serde(default = "default_count")]
    pub count: u32,
    /// Image-to-image strength, 0.0 keeps the source, 1.0 ignores it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_modalities: Vec<ResponseModality>,
}

impl Default for ImageParameters {
    fn default() -> Self {
        Self {
            dimensions: None,
            variant: ModelVariant::Standard,
            quality: None,
            style: None,
            count: 1,
            strength: None,
            response_modalities: Vec::new(),
        }
    }
}

fn default_count() -> u32 {
    1
}

/// Knobs for video jobs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u32>,
    /// Provider resolution label such as `720p`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<u32>,
    #[serde(default)]
    pub generate_audio: bool,
    /// Amount of motion (Stability motion bucket, 1-255)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motion: Option<u32>,
    /// How closely the video sticks to the source image (cfg scale)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stickiness: Option<f32>,
}

/// Exactly one family of job-specific fields is populated per request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JobParameters {
    Image(ImageParameters),
    Video(VideoParameters),
}

/// Provider-agnostic description of one generation job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub model: ModelId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    /// Object to look for in search-and-replace edits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_prompt: Option<String>,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub assets: Assets,
    pub job: JobParameters,
}

impl GenerationRequest {
    /// Start an image job for `model`
    pub fn image(model: ModelId) -> Self {
        Self::with_job(model, JobParameters::Image(ImageParameters::default()))
    }

    /// Start a video job for `model`
    pub fn video(model: ModelId) -> Self {
        Self::with_job(model, JobParameters::Video(VideoParameters::default()))
    }

    fn with_job(model: ModelId, job: JobParameters) -> Self {
        Self {
            model,
            prompt: None,
            negative_prompt: None,
            search_prompt: None,
            credentials: Credentials::default(),
            assets: Assets::default(),
            job,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_negative_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.negative_prompt = Some(prompt.into());
        self
    }

    pub fn with_search_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.search_prompt = Some(prompt.into());
        self
    }

    pub fn with_secret(mut self, secret: impl Into<SecretString>) -> Self {
        self.credentials.secret = secret.into();
        self
    }

    pub fn with_usage_record(mut self, record: UsageRecordRef) -> Self {
        self.credentials.usage_record = record;
        self
    }

    pub fn with_source_image(mut self, asset: Asset) -> Self {
        self.assets.source_image = Some(asset);
        self
    }

    pub fn with_mask(mut self, asset: Asset) -> Self {
        self.assets.mask = Some(asset);
        self
    }

    pub fn with_last_frame(mut self, asset: Asset) -> Self {
        self.assets.last_frame = Some(asset);
        self
    }

    pub fn with_source_video(mut self, asset: Asset) -> Self {
        self.assets.source_video = Some(asset);
        self
    }

    /// Set the art dimensions for either job kind
    pub fn with_dimensions(mut self, dimensions: Dimensions) -> Self {
        match &mut self.job {
            JobParameters::Image(params) => params.dimensions = Some(dimensions),
            JobParameters::Video(params) => params.dimensions = Some(dimensions),
        }
        self
    }

    /// Adjust image parameters; no effect on video jobs
    pub fn with_image_parameters(mut self, f: impl FnOnce(&mut ImageParameters)) -> Self {
        if let JobParameters::Image(params) = &mut self.job {
            f(params);
        }
        self
    }

    /// Adjust video parameters; no effect on image jobs
    pub fn with_video_parameters(mut self, f: impl FnOnce(&mut VideoParameters)) -> Self {
        if let JobParameters::Video(params) = &mut self.job {
            f(params);
        }
        self
    }

    pub fn image_parameters(&self) -> Option<&ImageParameters> {
        match &self.job {
            JobParameters::Image(params) => Some(params),
            JobParameters::Video(_) => None,
        }
    }

    pub fn video_parameters(&self) -> Option<&VideoParameters> {
        match &self.job {
            JobParameters::Video(params) => Some(params),
            JobParameters::Image(_) => None,
        }
    }

    pub fn dimensions(&self) -> Option<Dimensions> {
        match &self.job {
            JobParameters::Image(params) => params.dimensions,
            JobParameters::Video(params) => params.dimensions,
        }
    }

    /// Requested image count; video jobs always produce one clip
    pub fn count(&self) -> u32 {
        self.image_parameters().map(|p| p.count.max(1)).unwrap_or(1)
    }

    /// Prompt with surrounding whitespace removed, `None` when blank
    pub fn prompt_text(&self) -> Option<&str> {
        self.prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

/// Error taxonomy carried by failed responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// A local precondition was not met (missing asset, missing credential)
    AdapterError,
    /// The provider reported a failure or answered with an unknown shape
    ModelError,
    /// A success-shaped payload could not be decoded
    TransformResponseError,
    /// Polling ran out of attempts before a terminal remote state
    Timeout,
    /// The HTTP exchange itself failed
    TransportError,
    /// The job observed cooperative cancellation
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AdapterError => "ADAPTER_ERROR",
            ErrorKind::ModelError => "MODEL_ERROR",
            ErrorKind::TransformResponseError => "TRANSFORM_RESPONSE_ERROR",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::TransportError => "TRANSPORT_ERROR",
            ErrorKind::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One generated image or video, base64-encoded
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedPayload(String);

impl EncodedPayload {
    /// Wrap base64 text, dropping any data-URI prefix
    pub fn from_base64(encoded: &str) -> Self {
        Self(strip_data_uri(encoded).to_string())
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(STANDARD.encode(bytes))
    }

    pub fn as_base64(&self) -> &str {
        &self.0
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.0)
    }
}

impl fmt::Debug for EncodedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodedPayload({} base64 chars)", self.0.len())
    }
}

/// Successful outcome of a generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedOutput {
    pub payloads: Vec<EncodedPayload>,
    pub cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
}

/// Failed outcome of a generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationFailure {
    pub kind: ErrorKind,
    pub message: String,
}

/// Coarse status of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationStatus {
    Generated,
    Failed,
}

/// Normalized outcome of one adapter call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationResponse {
    Generated(GeneratedOutput),
    Failed(GenerationFailure),
}

impl GenerationResponse {
    pub fn generated(
        payloads: Vec<EncodedPayload>,
        cost: f64,
        revised_prompt: Option<String>,
    ) -> Self {
        Self::Generated(GeneratedOutput {
            payloads,
            cost,
            revised_prompt,
        })
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Failed(GenerationFailure {
            kind,
            message: message.into(),
        })
    }

    /// Shorthand for a provider-reported failure
    pub fn model_error(message: impl Into<String>) -> Self {
        Self::failed(ErrorKind::ModelError, message)
    }

    pub fn status(&self) -> GenerationStatus {
        match self {
            Self::Generated(_) => GenerationStatus::Generated,
            Self::Failed(_) => GenerationStatus::Failed,
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, Self::Generated(_))
    }

    pub fn output(&self) -> Option<&GeneratedOutput> {
        match self {
            Self::Generated(output) => Some(output),
            Self::Failed(_) => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Generated(_) => None,
            Self::Failed(failure) => Some(failure.kind),
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Generated(_) => None,
            Self::Failed(failure) => Some(&failure.message),
        }
    }

    /// Cost charged for this call; failures cost nothing
    pub fn cost(&self) -> f64 {
        self.output().map(|o| o.cost).unwrap_or(0.0)
    }
}

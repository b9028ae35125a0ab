//! Replicate predictions API
//!
//! A prediction is created on the model's `predictions` endpoint and then
//! fetched from its `urls.get` link until the status is `succeeded`, `failed`
//! or `canceled`. Outputs are URLs, either a single string or a list.

use crate::http::{HttpMethod, HttpRequest, TransportResponse};
use crate::protocol::{AssetKind, GenerationRequest, GenerationResponse};
use crate::providers::adapter::{
    AdapterContext, Completion, ProviderAdapter, ProviderPayload, Requirements,
};
use crate::providers::aspect::{ratio_label, AspectRatio};
use crate::providers::catalog::{MediaKind, ModelId};
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::payload::{
    ensure_success, error_message, extract_media, str_at, MediaFields,
};
use crate::providers::polling::{PollPolicy, PollState};
use crate::providers::pricing::CostInputs;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

const FLUX_RATIOS: [AspectRatio; 11] = [
    AspectRatio::new(1, 1),
    AspectRatio::new(16, 9),
    AspectRatio::new(21, 9),
    AspectRatio::new(3, 2),
    AspectRatio::new(2, 3),
    AspectRatio::new(4, 5),
    AspectRatio::new(5, 4),
    AspectRatio::new(3, 4),
    AspectRatio::new(4, 3),
    AspectRatio::new(9, 16),
    AspectRatio::new(9, 21),
];

const KLING_RATIOS: [AspectRatio; 3] = [
    AspectRatio::new(16, 9),
    AspectRatio::new(9, 16),
    AspectRatio::new(1, 1),
];

const OUTPUT_FIELDS: MediaFields = MediaFields {
    inline: &[],
    url: &["output"],
};

const TERMINAL_STATUSES: [&str; 3] = ["succeeded", "failed", "canceled"];

/// Adapter for the models hosted on Replicate
pub struct ReplicateAdapter {
    model: ModelId,
    ctx: AdapterContext,
}

impl ReplicateAdapter {
    pub fn new(model: ModelId, ctx: AdapterContext) -> Self {
        Self { model, ctx }
    }

    /// `owner/name` of the hosted model
    fn slug(&self) -> ProviderResult<&'static str> {
        match self.model {
            ModelId::FluxSchnell => Ok("black-forest-labs/flux-schnell"),
            ModelId::Flux11Pro => Ok("black-forest-labs/flux-1.1-pro"),
            ModelId::FluxFillPro => Ok("black-forest-labs/flux-fill-pro"),
            ModelId::RecraftV3 => Ok("recraft-ai/recraft-v3"),
            ModelId::MinimaxVideo01 => Ok("minimax/video-01"),
            ModelId::KlingVideo => Ok("kwaivgi/kling-v1.6-standard"),
            other => Err(ProviderError::unsupported_model(other, "replicate")),
        }
    }

    fn authorized(&self, request: &GenerationRequest, wire: HttpRequest) -> HttpRequest {
        let secret = request.credentials.secret.expose_secret();
        wire.with_header("Authorization", self.ctx.auth_scheme.header_value(secret))
    }

    /// Outputs per prediction; only flux-schnell takes `num_outputs`
    fn output_count(&self, request: &GenerationRequest) -> u32 {
        match self.model {
            ModelId::FluxSchnell => request.count().min(4),
            _ => 1,
        }
    }

    /// Kling sells 5 and 10 second clips only
    fn kling_duration(request: &GenerationRequest) -> u32 {
        match request.video_parameters().and_then(|p| p.duration_seconds) {
            Some(seconds) if seconds > 7 => 10,
            _ => 5,
        }
    }

    fn input(&self, request: &GenerationRequest) -> Map<String, Value> {
        let mut input = Map::new();
        input.insert("prompt".into(), json!(request.prompt_text()));

        let image = request.image_parameters();
        let dims = request.dimensions();

        match self.model {
            ModelId::FluxSchnell => {
                input.insert(
                    "aspect_ratio".into(),
                    json!(ratio_label(dims, &FLUX_RATIOS, AspectRatio::new(1, 1))),
                );
                input.insert("num_outputs".into(), json!(self.output_count(request)));
                input.insert("output_format".into(), json!("png"));
            }
            ModelId::Flux11Pro => {
                input.insert(
                    "aspect_ratio".into(),
                    json!(ratio_label(dims, &FLUX_RATIOS, AspectRatio::new(1, 1))),
                );
                input.insert("output_format".into(), json!("png"));
                if let Some(source) = &request.assets.source_image {
                    input.insert("image_prompt".into(), json!(source.data_uri()));
                }
            }
            ModelId::FluxFillPro => {
                if let Some(source) = &request.assets.source_image {
                    input.insert("image".into(), json!(source.data_uri()));
                }
                if let Some(mask) = &request.assets.mask {
                    input.insert("mask".into(), json!(mask.data_uri()));
                }
                input.insert("output_format".into(), json!("png"));
            }
            ModelId::RecraftV3 => {
                if let Some(dims) = dims {
                    input.insert(
                        "aspect_ratio".into(),
                        json!(ratio_label(Some(dims), &FLUX_RATIOS, AspectRatio::new(1, 1))),
                    );
                }
                if let Some(style) = image.and_then(|p| p.style.as_ref()) {
                    input.insert("style".into(), json!(style));
                }
            }
            ModelId::MinimaxVideo01 => {
                input.insert("prompt_optimizer".into(), json!(true));
                if let Some(source) = &request.assets.source_image {
                    input.insert("first_frame_image".into(), json!(source.data_uri()));
                }
            }
            ModelId::KlingVideo => {
                let video = request.video_parameters();
                input.insert("duration".into(), json!(Self::kling_duration(request)));
                input.insert(
                    "aspect_ratio".into(),
                    json!(ratio_label(dims, &KLING_RATIOS, AspectRatio::new(16, 9))),
                );
                if let Some(negative) = &request.negative_prompt {
                    input.insert("negative_prompt".into(), json!(negative));
                }
                if let Some(cfg) = video.and_then(|p| p.stickiness) {
                    input.insert("cfg_scale".into(), json!(cfg.clamp(0.0, 1.0)));
                }
                if let Some(source) = &request.assets.source_image {
                    input.insert("start_image".into(), json!(source.data_uri()));
                }
            }
            _ => {}
        }

        input
    }

    fn status_of(response: &TransportResponse) -> Option<&str> {
        str_at(&response.payload, &["status"])
    }
}

#[async_trait]
impl ProviderAdapter for ReplicateAdapter {
    fn model(&self) -> ModelId {
        self.model
    }

    fn context(&self) -> &AdapterContext {
        &self.ctx
    }

    fn wire_quantities(&self, request: &GenerationRequest) -> CostInputs {
        let duration_seconds = match self.model {
            ModelId::KlingVideo => Some(Self::kling_duration(request)),
            _ => None,
        };
        CostInputs {
            count: self.output_count(request),
            duration_seconds,
            ..CostInputs::from_request(request)
        }
    }

    fn requirements(&self) -> Requirements {
        match self.model {
            ModelId::FluxFillPro => {
                Requirements::new(true, &[AssetKind::SourceImage, AssetKind::Mask])
            }
            _ => Requirements::TEXT,
        }
    }

    fn completion(&self) -> Completion {
        let default = match self.model.media() {
            MediaKind::Image => PollPolicy::fast_image(),
            MediaKind::Video => PollPolicy::long_video(),
        };
        Completion::Polled(self.ctx.poll_policy(default))
    }

    fn transform_request(&self, request: &GenerationRequest) -> ProviderResult<ProviderPayload> {
        let url = self.ctx.url(&format!("models/{}/predictions", self.slug()?));
        let mut body = Map::new();
        body.insert("input".into(), Value::Object(self.input(request)));

        Ok(self
            .authorized(request, self.wire_request(request, HttpMethod::Post, url))
            .with_body(body))
    }

    fn status_request(
        &self,
        request: &GenerationRequest,
        submitted: &TransportResponse,
    ) -> ProviderResult<HttpRequest> {
        let url = match str_at(&submitted.payload, &["urls", "get"]) {
            Some(url) => url.to_string(),
            None => {
                let id = str_at(&submitted.payload, &["id"]).ok_or_else(|| {
                    ProviderError::Model("Prediction id missing from provider response".to_string())
                })?;
                self.ctx.url(&format!("predictions/{}", id))
            }
        };
        Ok(self.authorized(request, HttpRequest::get(url)))
    }

    fn poll_state(&self, status: TransportResponse) -> ProviderResult<PollState<TransportResponse>> {
        ensure_success(&status)?;
        let state = Self::status_of(&status).map(str::to_string);
        match state {
            Some(state) if TERMINAL_STATUSES.contains(&state.as_str()) => {
                Ok(PollState::Done(status))
            }
            state => {
                debug!("{} prediction status {:?}", self.model, state);
                Ok(PollState::Pending)
            }
        }
    }

    async fn transform_response(
        &self,
        request: &GenerationRequest,
        response: TransportResponse,
    ) -> ProviderResult<GenerationResponse> {
        match Self::status_of(&response) {
            Some("failed") => {
                let message = error_message(&response.payload)
                    .unwrap_or_else(|| "Prediction failed".to_string());
                Err(ProviderError::Model(message))
            }
            Some("canceled") => Err(ProviderError::Model("Prediction was canceled".to_string())),
            _ => {
                let payloads =
                    extract_media(&response.payload, &OUTPUT_FIELDS, self.transport()).await?;
                Ok(self.generated(request, payloads, None))
            }
        }
    }
}

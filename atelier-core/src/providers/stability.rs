//! Stability AI v2beta image and video endpoints
//!
//! Every call is multipart/form-data with `Authorization: Bearer` and
//! `Accept: application/json`, so results come back as base64 in `image` or
//! `video`. Image-to-video returns a generation id whose result endpoint
//! answers 202 until the clip is ready.

use crate::http::{HttpMethod, HttpRequest, TransportResponse};
use crate::protocol::{AssetKind, GenerationRequest, GenerationResponse, ModelVariant};
use crate::providers::adapter::{
    asset_attachment, validate_common, AdapterContext, BodyEncoding, Completion,
    ProviderAdapter, ProviderPayload, Requirements,
};
use crate::providers::aspect::{ratio_label, AspectRatio};
use crate::providers::catalog::ModelId;
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::payload::{ensure_success, extract_media, str_at, MediaFields};
use crate::providers::polling::{PollPolicy, PollState};
use crate::providers::pricing::CostInputs;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

const RATIOS: [AspectRatio; 9] = [
    AspectRatio::new(16, 9),
    AspectRatio::new(1, 1),
    AspectRatio::new(21, 9),
    AspectRatio::new(2, 3),
    AspectRatio::new(3, 2),
    AspectRatio::new(4, 5),
    AspectRatio::new(5, 4),
    AspectRatio::new(9, 16),
    AspectRatio::new(9, 21),
];

const STABILITY_FIELDS: MediaFields = MediaFields {
    inline: &["image", "video"],
    url: &[],
};

const DEFAULT_STRENGTH: f32 = 0.7;
const DEFAULT_CFG_SCALE: f32 = 1.8;
const DEFAULT_MOTION_BUCKET: u32 = 127;

/// Adapter for the Stability AI models
pub struct StabilityAdapter {
    model: ModelId,
    ctx: AdapterContext,
}

impl StabilityAdapter {
    pub fn new(model: ModelId, ctx: AdapterContext) -> Self {
        Self { model, ctx }
    }

    fn path(&self) -> ProviderResult<&'static str> {
        match self.model {
            ModelId::StableImageUltra => Ok("v2beta/stable-image/generate/ultra"),
            ModelId::StableImageCore => Ok("v2beta/stable-image/generate/core"),
            ModelId::Sd3Large => Ok("v2beta/stable-image/generate/sd3"),
            ModelId::StabilityInpaint => Ok("v2beta/stable-image/edit/inpaint"),
            ModelId::StabilityErase => Ok("v2beta/stable-image/edit/erase"),
            ModelId::StabilitySearchAndReplace => Ok("v2beta/stable-image/edit/search-and-replace"),
            ModelId::StabilityRemoveBackground => Ok("v2beta/stable-image/edit/remove-background"),
            ModelId::StabilityUpscaleFast => Ok("v2beta/stable-image/upscale/fast"),
            ModelId::StabilityImageToVideo => Ok("v2beta/image-to-video"),
            other => Err(ProviderError::unsupported_model(other, "stability")),
        }
    }

    fn authorized(&self, request: &GenerationRequest, wire: HttpRequest) -> HttpRequest {
        wire.with_header(
            "Authorization",
            format!("Bearer {}", request.credentials.secret.expose_secret()),
        )
        .with_header("Accept", "application/json")
    }

    /// Text fields of the form, by model
    fn fields(&self, request: &GenerationRequest) -> Map<String, Value> {
        let mut fields = Map::new();
        let image = request.image_parameters();
        let has_source = request.assets.source_image.is_some();

        let mut put = |key: &str, value: Value| {
            fields.insert(key.to_string(), value);
        };

        match self.model {
            ModelId::StableImageUltra | ModelId::StableImageCore | ModelId::Sd3Large => {
                put("prompt", json!(request.prompt_text()));
                if let Some(negative) = &request.negative_prompt {
                    put("negative_prompt", json!(negative));
                }
                put("output_format", json!("png"));

                if has_source && self.model != ModelId::StableImageCore {
                    let strength = image.and_then(|p| p.strength).unwrap_or(DEFAULT_STRENGTH);
                    put("strength", json!(strength));
                    if self.model == ModelId::Sd3Large {
                        put("mode", json!("image-to-image"));
                    }
                } else {
                    put(
                        "aspect_ratio",
                        json!(ratio_label(request.dimensions(), &RATIOS, AspectRatio::new(1, 1))),
                    );
                }

                if self.model == ModelId::StableImageCore {
                    if let Some(style) = image.and_then(|p| p.style.as_ref()) {
                        put("style_preset", json!(style));
                    }
                }

                if self.model == ModelId::Sd3Large {
                    let variant = image.map(|p| p.variant).unwrap_or_default();
                    let wire_model = match variant {
                        ModelVariant::Standard => "sd3.5-large",
                        ModelVariant::Turbo => "sd3.5-large-turbo",
                    };
                    put("model", json!(wire_model));
                }
            }
            ModelId::StabilityInpaint => {
                put("prompt", json!(request.prompt_text()));
                if let Some(negative) = &request.negative_prompt {
                    put("negative_prompt", json!(negative));
                }
                put("output_format", json!("png"));
            }
            ModelId::StabilitySearchAndReplace => {
                put("prompt", json!(request.prompt_text()));
                put("search_prompt", json!(request.search_prompt));
                put("output_format", json!("png"));
            }
            ModelId::StabilityErase
            | ModelId::StabilityRemoveBackground
            | ModelId::StabilityUpscaleFast => {
                put("output_format", json!("png"));
            }
            ModelId::StabilityImageToVideo => {
                let video = request.video_parameters();
                let cfg_scale = video
                    .and_then(|p| p.stickiness)
                    .unwrap_or(DEFAULT_CFG_SCALE)
                    .clamp(0.0, 10.0);
                let motion = video
                    .and_then(|p| p.motion)
                    .unwrap_or(DEFAULT_MOTION_BUCKET)
                    .clamp(1, 255);
                put("cfg_scale", json!(cfg_scale));
                put("motion_bucket_id", json!(motion));
            }
            _ => {}
        }

        fields
    }
}

#[async_trait]
impl ProviderAdapter for StabilityAdapter {
    fn model(&self) -> ModelId {
        self.model
    }

    fn context(&self) -> &AdapterContext {
        &self.ctx
    }

    // The form has no count field; each call yields one image or clip
    fn wire_quantities(&self, request: &GenerationRequest) -> CostInputs {
        CostInputs {
            count: 1,
            ..CostInputs::from_request(request)
        }
    }

    fn requirements(&self) -> Requirements {
        match self.model {
            ModelId::StabilityInpaint => {
                Requirements::new(true, &[AssetKind::SourceImage, AssetKind::Mask])
            }
            ModelId::StabilitySearchAndReplace => {
                Requirements::new(true, &[AssetKind::SourceImage])
            }
            ModelId::StabilityErase
            | ModelId::StabilityRemoveBackground
            | ModelId::StabilityUpscaleFast
            | ModelId::StabilityImageToVideo => Requirements::new(false, &[AssetKind::SourceImage]),
            _ => Requirements::TEXT,
        }
    }

    fn validate(&self, request: &GenerationRequest) -> ProviderResult<()> {
        validate_common(self, request)?;

        if self.model == ModelId::StabilitySearchAndReplace
            && request
                .search_prompt
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .is_empty()
        {
            return Err(ProviderError::Adapter(
                "A search prompt is required".to_string(),
            ));
        }
        Ok(())
    }

    fn encoding(&self, _request: &GenerationRequest) -> BodyEncoding {
        BodyEncoding::Multipart
    }

    fn completion(&self) -> Completion {
        match self.model {
            ModelId::StabilityImageToVideo => {
                Completion::Polled(self.ctx.poll_policy(PollPolicy::standard()))
            }
            _ => Completion::Immediate,
        }
    }

    fn transform_request(&self, request: &GenerationRequest) -> ProviderResult<ProviderPayload> {
        let url = self.ctx.url(self.path()?);
        let mut wire = self
            .authorized(request, self.wire_request(request, HttpMethod::Post, url))
            .with_body(self.fields(request));

        if self.model != ModelId::StableImageCore {
            if let Some(part) = asset_attachment(request, AssetKind::SourceImage, "image")? {
                wire = wire.with_attachment(part);
            }
        }
        if matches!(self.model, ModelId::StabilityInpaint | ModelId::StabilityErase) {
            if let Some(part) = asset_attachment(request, AssetKind::Mask, "mask")? {
                wire = wire.with_attachment(part);
            }
        }

        Ok(wire)
    }

    fn status_request(
        &self,
        request: &GenerationRequest,
        submitted: &TransportResponse,
    ) -> ProviderResult<HttpRequest> {
        let id = str_at(&submitted.payload, &["id"]).ok_or_else(|| {
            ProviderError::Model("Generation id missing from provider response".to_string())
        })?;
        let url = self.ctx.url(&format!("v2beta/image-to-video/result/{}", id));
        Ok(self.authorized(request, HttpRequest::get(url)))
    }

    fn poll_state(&self, status: TransportResponse) -> ProviderResult<PollState<TransportResponse>> {
        if status.status_code == 202 {
            return Ok(PollState::Pending);
        }
        ensure_success(&status)?;
        Ok(PollState::Done(status))
    }

    async fn transform_response(
        &self,
        request: &GenerationRequest,
        response: TransportResponse,
    ) -> ProviderResult<GenerationResponse> {
        if let Some(reason) = str_at(&response.payload, &["finish_reason"]) {
            if reason == "CONTENT_FILTERED" {
                return Err(ProviderError::Model(
                    "The result was blocked by the provider's content filter".to_string(),
                ));
            }
        }

        let payloads = extract_media(&response.payload, &STABILITY_FIELDS, self.transport()).await?;
        Ok(self.generated(request, payloads, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Payload;
    use crate::protocol::{Asset, Dimensions};
    use crate::test_support::offline_context;
    use test_case::test_case;

    fn adapter(model: ModelId) -> StabilityAdapter {
        StabilityAdapter::new(model, offline_context("https://stability.test"))
    }

    #[test]
    fn test_sd3_turbo_variant_and_ratio() {
        let request = GenerationRequest::image(ModelId::Sd3Large)
            .with_prompt("a fox")
            .with_secret("sk-test")
            .with_dimensions(Dimensions::new(1000, 500))
            .with_image_parameters(|p| p.variant = ModelVariant::Turbo);

        let wire = adapter(ModelId::Sd3Large).transform_request(&request).unwrap();
        assert!(wire.is_multipart());
        assert_eq!(wire.url, "https://stability.test/v2beta/stable-image/generate/sd3");
        assert_eq!(wire.body["model"], "sd3.5-large-turbo");
        assert_eq!(wire.body["aspect_ratio"], "16:9");
        assert_eq!(wire.header("authorization"), Some("Bearer sk-test"));
        assert_eq!(wire.header("accept"), Some("application/json"));
    }

    #[test_case(ModelId::StableImageUltra, 0.08; "ultra")]
    #[test_case(ModelId::StableImageCore, 0.03; "core")]
    #[test_case(ModelId::Sd3Large, 0.065; "sd3")]
    fn test_one_image_charged_whatever_the_count(model: ModelId, price: f64) {
        let request = GenerationRequest::image(model)
            .with_prompt("a fox")
            .with_secret("sk-test")
            .with_image_parameters(|p| p.count = 4);

        let stability = adapter(model);
        let wire = stability.transform_request(&request).unwrap();
        assert!(wire.body.get("samples").is_none());
        assert!(wire.body.get("count").is_none());
        assert_eq!(stability.credits_used(&request), price);
    }

    #[test]
    fn test_inpaint_attaches_image_and_mask() {
        let request = GenerationRequest::image(ModelId::StabilityInpaint)
            .with_prompt("a red door")
            .with_secret("sk-test")
            .with_source_image(Asset::from_encoded("data:image/png;base64,aGVsbG8="))
            .with_mask(Asset::from_encoded("aGVsbG8="));

        let wire = adapter(ModelId::StabilityInpaint)
            .transform_request(&request)
            .unwrap();
        let names: Vec<&str> = wire.attachments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["image", "mask"]);
        assert_eq!(wire.attachments[0].bytes, b"hello");
        assert_eq!(wire.attachments[0].mime_type, "image/png");
    }

    #[test]
    fn test_search_prompt_required() {
        let request = GenerationRequest::image(ModelId::StabilitySearchAndReplace)
            .with_prompt("a cat")
            .with_secret("sk-test")
            .with_source_image(Asset::from_encoded("aGVsbG8="));

        let err = adapter(ModelId::StabilitySearchAndReplace)
            .validate(&request)
            .unwrap_err();
        assert_eq!(err.to_string(), "A search prompt is required");
    }

    #[test]
    fn test_video_result_pending_on_202() {
        let pending = TransportResponse::new(
            202,
            Payload::from_value(json!({"id": "gen1", "status": "in-progress"})).unwrap(),
        );
        let state = adapter(ModelId::StabilityImageToVideo)
            .poll_state(pending)
            .unwrap();
        assert_eq!(state, PollState::Pending);
    }

    #[tokio::test]
    async fn test_content_filter_is_model_error() {
        let request = GenerationRequest::image(ModelId::StableImageCore)
            .with_prompt("x")
            .with_secret("sk-test");
        let response = TransportResponse::new(
            200,
            Payload::from_value(json!({"image": "aGVsbG8=", "finish_reason": "CONTENT_FILTERED"}))
                .unwrap(),
        );
        let err = adapter(ModelId::StableImageCore)
            .transform_response(&request, response)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Model(_)));
    }
}

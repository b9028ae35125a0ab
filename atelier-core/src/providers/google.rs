//! Google Generative Language API: Imagen, Gemini image and Veo
//!
//! The key travels as a `key` query parameter. Imagen and Gemini answer
//! synchronously; Veo returns a long-running operation whose `name` is polled
//! until `done` is true.

use crate::http::{HttpMethod, HttpRequest, Payload, TransportResponse};
use crate::protocol::{GenerationRequest, GenerationResponse, ResponseModality};
use crate::providers::adapter::{
    AdapterContext, Completion, ProviderAdapter, ProviderPayload,
};
use crate::providers::aspect::{ratio_label, AspectRatio};
use crate::providers::catalog::ModelId;
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::payload::{
    self, ensure_success, extract_media, nested, resolve, str_at, MediaFields, MediaRef,
};
use crate::providers::polling::{PollPolicy, PollState};
use crate::providers::pricing::CostInputs;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;
use url::Url;

const IMAGEN_RATIOS: [AspectRatio; 5] = [
    AspectRatio::new(1, 1),
    AspectRatio::new(3, 4),
    AspectRatio::new(4, 3),
    AspectRatio::new(9, 16),
    AspectRatio::new(16, 9),
];

const GEMINI_RATIOS: [AspectRatio; 10] = [
    AspectRatio::new(1, 1),
    AspectRatio::new(2, 3),
    AspectRatio::new(3, 2),
    AspectRatio::new(3, 4),
    AspectRatio::new(4, 3),
    AspectRatio::new(4, 5),
    AspectRatio::new(5, 4),
    AspectRatio::new(9, 16),
    AspectRatio::new(16, 9),
    AspectRatio::new(21, 9),
];

const VEO_RATIOS: [AspectRatio; 2] = [AspectRatio::new(16, 9), AspectRatio::new(9, 16)];

const IMAGEN_FIELDS: MediaFields = MediaFields {
    inline: &["bytesBase64Encoded"],
    url: &[],
};

/// Adapter for the Google models
pub struct GoogleAdapter {
    model: ModelId,
    ctx: AdapterContext,
}

impl GoogleAdapter {
    pub fn new(model: ModelId, ctx: AdapterContext) -> Self {
        Self { model, ctx }
    }

    fn wire_model(&self) -> ProviderResult<&'static str> {
        match self.model {
            ModelId::Imagen3 => Ok("imagen-3.0-generate-002"),
            ModelId::GeminiFlashImage => Ok("gemini-2.5-flash-image"),
            ModelId::Veo2 => Ok("veo-2.0-generate-001"),
            ModelId::Veo3 => Ok("veo-3.0-generate-001"),
            other => Err(ProviderError::unsupported_model(other, "google")),
        }
    }

    /// Append the API key to an endpoint or download URL
    fn keyed(raw: &str, secret: &str) -> ProviderResult<String> {
        let mut url = Url::parse(raw)
            .map_err(|e| ProviderError::Adapter(format!("Invalid Google URL: {}", e)))?;
        url.query_pairs_mut().append_pair("key", secret);
        Ok(url.into())
    }

    fn endpoint(&self, request: &GenerationRequest, method: &str) -> ProviderResult<String> {
        let path = format!("models/{}:{}", self.wire_model()?, method);
        Self::keyed(
            &self.ctx.url(&path),
            request.credentials.secret.expose_secret(),
        )
    }

    /// Images per call; Imagen caps `sampleCount` at 4, the others make one
    fn sample_count(&self, request: &GenerationRequest) -> u32 {
        match self.model {
            ModelId::Imagen3 => request.count().min(4),
            _ => 1,
        }
    }

    /// Veo 2 accepts 5 to 8 seconds; Veo 3 clips are always 8
    fn veo_duration(&self, request: &GenerationRequest) -> u32 {
        match self.model {
            ModelId::Veo2 => request
                .video_parameters()
                .and_then(|p| p.duration_seconds)
                .unwrap_or(8)
                .clamp(5, 8),
            _ => 8,
        }
    }

    fn imagen_body(&self, request: &GenerationRequest) -> Map<String, Value> {
        let mut instance = Map::new();
        instance.insert("prompt".into(), json!(request.prompt_text()));

        let parameters = json!({
            "sampleCount": self.sample_count(request),
            "aspectRatio": ratio_label(request.dimensions(), &IMAGEN_RATIOS, AspectRatio::new(1, 1)),
        });

        let mut body = Map::new();
        body.insert("instances".into(), json!([instance]));
        body.insert("parameters".into(), parameters);
        body
    }

    fn gemini_body(&self, request: &GenerationRequest) -> Map<String, Value> {
        let mut parts = vec![json!({ "text": request.prompt_text() })];
        if let Some(image) = &request.assets.source_image {
            parts.push(json!({
                "inlineData": {
                    "mimeType": image.mime_type(),
                    "data": image.base64(),
                }
            }));
        }

        let modalities: Vec<ResponseModality> = request
            .image_parameters()
            .map(|p| p.response_modalities.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| vec![ResponseModality::Text, ResponseModality::Image]);

        let mut generation_config = Map::new();
        generation_config.insert("responseModalities".into(), json!(modalities));
        if let Some(dims) = request.dimensions() {
            generation_config.insert(
                "imageConfig".into(),
                json!({ "aspectRatio": ratio_label(Some(dims), &GEMINI_RATIOS, AspectRatio::new(1, 1)) }),
            );
        }

        let mut body = Map::new();
        body.insert("contents".into(), json!([{ "parts": parts }]));
        body.insert("generationConfig".into(), Value::Object(generation_config));
        body
    }

    fn veo_body(&self, request: &GenerationRequest) -> Map<String, Value> {
        let video = request.video_parameters().cloned().unwrap_or_default();

        let mut instance = Map::new();
        instance.insert("prompt".into(), json!(request.prompt_text()));
        if let Some(image) = &request.assets.source_image {
            instance.insert(
                "image".into(),
                json!({
                    "bytesBase64Encoded": image.base64(),
                    "mimeType": image.mime_type(),
                }),
            );
        }

        let mut parameters = Map::new();
        parameters.insert(
            "aspectRatio".into(),
            json!(ratio_label(video.dimensions, &VEO_RATIOS, AspectRatio::new(16, 9))),
        );
        parameters.insert("durationSeconds".into(), json!(self.veo_duration(request)));
        parameters.insert("sampleCount".into(), json!(1));
        if let Some(negative) = &request.negative_prompt {
            parameters.insert("negativePrompt".into(), json!(negative));
        }
        if self.model == ModelId::Veo3 {
            parameters.insert("generateAudio".into(), json!(video.generate_audio));
            if let Some(resolution) = &video.resolution {
                parameters.insert("resolution".into(), json!(resolution));
            }
        }

        let mut body = Map::new();
        body.insert("instances".into(), json!([instance]));
        body.insert("parameters".into(), Value::Object(parameters));
        body
    }

    fn gemini_response(
        &self,
        request: &GenerationRequest,
        response: &TransportResponse,
    ) -> ProviderResult<GenerationResponse> {
        let mut payloads = Vec::new();
        let mut texts = Vec::new();

        if let Some(Payload::Array(parts)) =
            nested(&response.payload, &["candidates", "0", "content", "parts"])
        {
            for part in &parts {
                if let Some(data) = part
                    .get("inlineData")
                    .and_then(|d| d.get("data"))
                    .and_then(Value::as_str)
                {
                    payloads.push(payload::decode_inline(data)?);
                } else if let Some(text) = part.get("text").and_then(Value::as_str) {
                    texts.push(text.trim().to_string());
                }
            }
        }

        if payloads.is_empty() {
            if let Some(reason) = str_at(&response.payload, &["promptFeedback", "blockReason"]) {
                return Err(ProviderError::Model(format!("Prompt blocked: {}", reason)));
            }
            if let Some(message) = payload::error_message(&response.payload) {
                return Err(ProviderError::Model(message));
            }
            if !texts.is_empty() {
                return Err(ProviderError::Model(format!(
                    "Model returned no image: {}",
                    texts.join(" ")
                )));
            }
            return Err(ProviderError::Model(payload::INVALID_RESPONSE.to_string()));
        }

        let revised = Some(texts.join("\n")).filter(|t| !t.is_empty());
        Ok(self.generated(request, payloads, revised))
    }

    async fn veo_response(
        &self,
        request: &GenerationRequest,
        response: &TransportResponse,
    ) -> ProviderResult<GenerationResponse> {
        ensure_success(response)?;
        if let Some(message) = response
            .payload
            .as_object()
            .and_then(|op| op.get("error"))
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
        {
            return Err(ProviderError::Model(message.to_string()));
        }

        if let Some(reason) = str_at(
            &response.payload,
            &["response", "generateVideoResponse", "raiMediaFilteredReasons", "0"],
        ) {
            return Err(ProviderError::Model(reason.to_string()));
        }

        let Some(Payload::Array(samples)) = nested(
            &response.payload,
            &["response", "generateVideoResponse", "generatedSamples"],
        ) else {
            return Err(ProviderError::Model(payload::INVALID_RESPONSE.to_string()));
        };

        let secret = request.credentials.secret.expose_secret();
        let mut refs = Vec::new();
        for sample in &samples {
            let Some(video) = sample.get("video").and_then(Value::as_object) else {
                continue;
            };
            if let Some(encoded) = video.get("bytesBase64Encoded").and_then(Value::as_str) {
                refs.push(MediaRef::Inline(encoded.to_string()));
            } else if let Some(uri) = video.get("uri").and_then(Value::as_str) {
                refs.push(MediaRef::Url(Self::keyed(uri, secret)?));
            }
        }

        if refs.is_empty() {
            return Err(ProviderError::Model(payload::INVALID_RESPONSE.to_string()));
        }

        let payloads = resolve(refs, self.transport()).await?;
        Ok(self.generated(request, payloads, None))
    }
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    fn model(&self) -> ModelId {
        self.model
    }

    fn context(&self) -> &AdapterContext {
        &self.ctx
    }

    fn wire_quantities(&self, request: &GenerationRequest) -> CostInputs {
        let duration_seconds = match self.model {
            ModelId::Veo2 | ModelId::Veo3 => Some(self.veo_duration(request)),
            _ => None,
        };
        CostInputs {
            count: self.sample_count(request),
            duration_seconds,
            ..CostInputs::from_request(request)
        }
    }

    fn completion(&self) -> Completion {
        match self.model {
            ModelId::Veo2 | ModelId::Veo3 => {
                Completion::Polled(self.ctx.poll_policy(PollPolicy::long_video()))
            }
            _ => Completion::Immediate,
        }
    }

    fn transform_request(&self, request: &GenerationRequest) -> ProviderResult<ProviderPayload> {
        let (method, body) = match self.model {
            ModelId::Imagen3 => ("predict", self.imagen_body(request)),
            ModelId::GeminiFlashImage => ("generateContent", self.gemini_body(request)),
            ModelId::Veo2 | ModelId::Veo3 => ("predictLongRunning", self.veo_body(request)),
            other => return Err(ProviderError::unsupported_model(other, "google")),
        };

        let url = self.endpoint(request, method)?;
        Ok(self
            .wire_request(request, HttpMethod::Post, url)
            .with_body(body))
    }

    fn status_request(
        &self,
        request: &GenerationRequest,
        submitted: &TransportResponse,
    ) -> ProviderResult<HttpRequest> {
        let name = str_at(&submitted.payload, &["name"]).ok_or_else(|| {
            ProviderError::Model("Operation name missing from provider response".to_string())
        })?;
        let url = Self::keyed(
            &self.ctx.url(name),
            request.credentials.secret.expose_secret(),
        )?;
        Ok(HttpRequest::get(url))
    }

    fn poll_state(&self, status: TransportResponse) -> ProviderResult<PollState<TransportResponse>> {
        ensure_success(&status)?;
        let done = status
            .payload
            .as_object()
            .and_then(|op| op.get("done"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if done {
            Ok(PollState::Done(status))
        } else {
            debug!("{} operation still running", self.model);
            Ok(PollState::Pending)
        }
    }

    async fn transform_response(
        &self,
        request: &GenerationRequest,
        response: TransportResponse,
    ) -> ProviderResult<GenerationResponse> {
        match self.model {
            ModelId::Imagen3 => {
                let predictions = nested(&response.payload, &["predictions"]);
                if matches!(&predictions, Some(Payload::Array(items)) if items.is_empty()) {
                    return Err(ProviderError::Model(
                        "No images returned; the prompt may have been filtered".to_string(),
                    ));
                }
                let target = predictions.unwrap_or_else(|| response.payload.clone());
                let payloads = extract_media(&target, &IMAGEN_FIELDS, self.transport()).await?;
                Ok(self.generated(request, payloads, None))
            }
            ModelId::GeminiFlashImage => self.gemini_response(request, &response),
            ModelId::Veo2 | ModelId::Veo3 => self.veo_response(request, &response).await,
            other => Err(ProviderError::unsupported_model(other, "google")),
        }
    }
}

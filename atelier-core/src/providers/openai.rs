//! OpenAI Images API: DALL·E 3 and gpt-image-1
//!
//! Both models answer synchronously with base64 results in `data[].b64_json`.
//! gpt-image-1 switches to the multipart `images/edits` endpoint when a source
//! image is attached.

use crate::http::{HttpMethod, TransportResponse};
use crate::protocol::{AssetKind, Dimensions, GenerationRequest, GenerationResponse, Quality};
use crate::providers::adapter::{
    asset_attachment, AdapterContext, BodyEncoding, ProviderAdapter, ProviderPayload,
};
use crate::providers::aspect::closest_size;
use crate::providers::catalog::ModelId;
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::payload::{extract_media, nested, str_at, MediaFields};
use crate::providers::pricing::CostInputs;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

const DALL_E_3_SIZES: [Dimensions; 3] = [
    Dimensions {
        width: 1024,
        height: 1024,
    },
    Dimensions {
        width: 1792,
        height: 1024,
    },
    Dimensions {
        width: 1024,
        height: 1792,
    },
];

const GPT_IMAGE_SIZES: [Dimensions; 3] = [
    Dimensions {
        width: 1024,
        height: 1024,
    },
    Dimensions {
        width: 1536,
        height: 1024,
    },
    Dimensions {
        width: 1024,
        height: 1536,
    },
];

const DALL_E_STYLES: [&str; 2] = ["vivid", "natural"];

const IMAGE_FIELDS: MediaFields = MediaFields {
    inline: &["b64_json"],
    url: &["url"],
};

/// Adapter for the OpenAI image models
pub struct OpenAIAdapter {
    model: ModelId,
    ctx: AdapterContext,
}

impl OpenAIAdapter {
    pub fn new(model: ModelId, ctx: AdapterContext) -> Self {
        Self { model, ctx }
    }

    fn is_edit(&self, request: &GenerationRequest) -> bool {
        self.model == ModelId::GptImage1 && request.assets.source_image.is_some()
    }

    fn size(&self, request: &GenerationRequest) -> String {
        let sizes: &[Dimensions] = match self.model {
            ModelId::DallE3 => &DALL_E_3_SIZES,
            _ => &GPT_IMAGE_SIZES,
        };
        request
            .dimensions()
            .and_then(|dims| closest_size(dims, sizes))
            .unwrap_or(sizes[0])
            .to_string()
    }

    /// Images per call; DALL·E 3 only generates one
    fn image_count(&self, request: &GenerationRequest) -> u32 {
        match self.model {
            ModelId::DallE3 => 1,
            _ => request.count().min(10),
        }
    }

    fn quality(&self, request: &GenerationRequest) -> &'static str {
        let quality = request
            .image_parameters()
            .and_then(|p| p.quality)
            .unwrap_or_default();
        match (self.model, quality) {
            (ModelId::DallE3, Quality::Premium) => "hd",
            (ModelId::DallE3, _) => "standard",
            (_, Quality::Draft) => "low",
            (_, Quality::Standard) => "medium",
            (_, Quality::Premium) => "high",
        }
    }

    fn body(&self, request: &GenerationRequest) -> ProviderResult<Map<String, Value>> {
        let mut body = Map::new();
        body.insert("prompt".into(), json!(request.prompt_text()));
        body.insert("size".into(), json!(self.size(request)));
        body.insert("quality".into(), json!(self.quality(request)));

        match self.model {
            ModelId::DallE3 => {
                body.insert("model".into(), json!("dall-e-3"));
                body.insert("n".into(), json!(self.image_count(request)));
                body.insert("response_format".into(), json!("b64_json"));
                let style = request
                    .image_parameters()
                    .and_then(|p| p.style.as_deref())
                    .filter(|s| DALL_E_STYLES.contains(s));
                if let Some(style) = style {
                    body.insert("style".into(), json!(style));
                }
            }
            ModelId::GptImage1 => {
                body.insert("model".into(), json!("gpt-image-1"));
                body.insert("n".into(), json!(self.image_count(request)));
            }
            other => return Err(ProviderError::unsupported_model(other, "openai")),
        }

        Ok(body)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAIAdapter {
    fn model(&self) -> ModelId {
        self.model
    }

    fn context(&self) -> &AdapterContext {
        &self.ctx
    }

    fn encoding(&self, request: &GenerationRequest) -> BodyEncoding {
        if self.is_edit(request) {
            BodyEncoding::Multipart
        } else {
            BodyEncoding::Json
        }
    }

    fn wire_quantities(&self, request: &GenerationRequest) -> CostInputs {
        CostInputs {
            count: self.image_count(request),
            ..CostInputs::from_request(request)
        }
    }

    fn transform_request(&self, request: &GenerationRequest) -> ProviderResult<ProviderPayload> {
        let path = if self.is_edit(request) {
            "images/edits"
        } else {
            "images/generations"
        };

        let mut wire = self
            .wire_request(request, HttpMethod::Post, self.ctx.url(path))
            .with_header(
                "Authorization",
                format!("Bearer {}", request.credentials.secret.expose_secret()),
            )
            .with_body(self.body(request)?);

        if self.is_edit(request) {
            if let Some(part) = asset_attachment(request, AssetKind::SourceImage, "image")? {
                wire = wire.with_attachment(part);
            }
            if let Some(part) = asset_attachment(request, AssetKind::Mask, "mask")? {
                wire = wire.with_attachment(part);
            }
        }

        Ok(wire)
    }

    async fn transform_response(
        &self,
        request: &GenerationRequest,
        response: TransportResponse,
    ) -> ProviderResult<GenerationResponse> {
        let revised = str_at(&response.payload, &["data", "0", "revised_prompt"])
            .map(str::to_string);
        let target = nested(&response.payload, &["data"]).unwrap_or_else(|| response.payload.clone());
        let payloads = extract_media(&target, &IMAGE_FIELDS, self.transport()).await?;
        Ok(self.generated(request, payloads, revised))
    }
}

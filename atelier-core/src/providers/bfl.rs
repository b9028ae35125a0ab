//! Black Forest Labs API: FLUX.1 Kontext
//!
//! The key goes in an `x-key` header. Submission returns an id and a
//! `polling_url`; the result is ready when `status` becomes `Ready`, with a
//! signed image URL in `result.sample`.

use crate::http::{HttpMethod, HttpRequest, TransportResponse};
use crate::protocol::{GenerationRequest, GenerationResponse};
use crate::providers::adapter::{AdapterContext, Completion, ProviderAdapter, ProviderPayload};
use crate::providers::aspect::{ratio_label, AspectRatio};
use crate::providers::catalog::ModelId;
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::payload::{
    ensure_success, error_message, extract_media, nested, str_at, MediaFields, INVALID_RESPONSE,
};
use crate::providers::polling::{PollPolicy, PollState};
use crate::providers::pricing::CostInputs;
use async_trait::async_trait;
use serde_json::{json, Map};

const RATIOS: [AspectRatio; 9] = [
    AspectRatio::new(1, 1),
    AspectRatio::new(16, 9),
    AspectRatio::new(9, 16),
    AspectRatio::new(4, 3),
    AspectRatio::new(3, 4),
    AspectRatio::new(3, 2),
    AspectRatio::new(2, 3),
    AspectRatio::new(21, 9),
    AspectRatio::new(9, 21),
];

const SAMPLE_FIELDS: MediaFields = MediaFields {
    inline: &[],
    url: &["sample"],
};

/// Adapter for the Black Forest Labs models
pub struct BflAdapter {
    model: ModelId,
    ctx: AdapterContext,
}

impl BflAdapter {
    pub fn new(model: ModelId, ctx: AdapterContext) -> Self {
        Self { model, ctx }
    }

    fn keyed(&self, request: &GenerationRequest, wire: HttpRequest) -> HttpRequest {
        wire.with_header("x-key", request.credentials.secret.expose_secret())
            .with_header("accept", "application/json")
    }

    fn is_terminal(status: &str) -> bool {
        matches!(status, "Ready" | "Error" | "Failed" | "Task not found") || status.ends_with("Moderated")
    }
}

#[async_trait]
impl ProviderAdapter for BflAdapter {
    fn model(&self) -> ModelId {
        self.model
    }

    fn context(&self) -> &AdapterContext {
        &self.ctx
    }

    // The task API produces a single image per submission
    fn wire_quantities(&self, request: &GenerationRequest) -> CostInputs {
        CostInputs {
            count: 1,
            ..CostInputs::from_request(request)
        }
    }

    fn completion(&self) -> Completion {
        Completion::Polled(self.ctx.poll_policy(PollPolicy::fast_image()))
    }

    fn transform_request(&self, request: &GenerationRequest) -> ProviderResult<ProviderPayload> {
        if self.model != ModelId::FluxKontextPro {
            return Err(ProviderError::unsupported_model(self.model, "bfl"));
        }

        let mut body = Map::new();
        body.insert("prompt".into(), json!(request.prompt_text()));
        body.insert(
            "aspect_ratio".into(),
            json!(ratio_label(request.dimensions(), &RATIOS, AspectRatio::new(1, 1))),
        );
        body.insert("output_format".into(), json!("png"));
        if let Some(source) = &request.assets.source_image {
            body.insert("input_image".into(), json!(source.base64()));
        }

        let url = self.ctx.url("flux-kontext-pro");
        Ok(self
            .keyed(request, self.wire_request(request, HttpMethod::Post, url))
            .with_body(body))
    }

    fn status_request(
        &self,
        request: &GenerationRequest,
        submitted: &TransportResponse,
    ) -> ProviderResult<HttpRequest> {
        let url = match str_at(&submitted.payload, &["polling_url"]) {
            Some(url) => url.to_string(),
            None => {
                let id = str_at(&submitted.payload, &["id"]).ok_or_else(|| {
                    ProviderError::Model("Task id missing from provider response".to_string())
                })?;
                let mut url = url::Url::parse(&self.ctx.url("get_result")).map_err(|e| {
                    ProviderError::Adapter(format!("Invalid Black Forest Labs URL: {}", e))
                })?;
                url.query_pairs_mut().append_pair("id", id);
                url.into()
            }
        };
        Ok(self.keyed(request, HttpRequest::get(url)))
    }

    fn poll_state(&self, status: TransportResponse) -> ProviderResult<PollState<TransportResponse>> {
        ensure_success(&status)?;
        let terminal = str_at(&status.payload, &["status"])
            .map(Self::is_terminal)
            .unwrap_or(false);
        if terminal {
            Ok(PollState::Done(status))
        } else {
            Ok(PollState::Pending)
        }
    }

    async fn transform_response(
        &self,
        request: &GenerationRequest,
        response: TransportResponse,
    ) -> ProviderResult<GenerationResponse> {
        match str_at(&response.payload, &["status"]) {
            Some("Ready") => {
                let result = nested(&response.payload, &["result"])
                    .ok_or_else(|| ProviderError::Model(INVALID_RESPONSE.to_string()))?;
                let payloads = extract_media(&result, &SAMPLE_FIELDS, self.transport()).await?;
                Ok(self.generated(request, payloads, None))
            }
            Some(status) => {
                let message = error_message(&response.payload)
                    .map(|detail| format!("{}: {}", status, detail))
                    .unwrap_or_else(|| format!("Generation ended with status {}", status));
                Err(ProviderError::Model(message))
            }
            None => {
                let payloads =
                    extract_media(&response.payload, &SAMPLE_FIELDS, self.transport()).await?;
                Ok(self.generated(request, payloads, None))
            }
        }
    }
}

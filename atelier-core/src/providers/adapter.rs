//! Provider adapter trait
//!
//! An adapter owns everything provider-specific about one model: the request
//! shape, where the secret goes, how completion is detected and how results
//! are pulled out of the response. The shared orchestration (validate,
//! transform, dispatch, poll, normalize) lives once in the provided
//! [`ProviderAdapter::make_request`].

use crate::http::{Attachment, HttpExecutor, HttpMethod, HttpRequest, TransportResponse};
use crate::protocol::{
    AssetKind, EncodedPayload, GenerationRequest, GenerationResponse, JobParameters,
};
use crate::providers::catalog::{AuthScheme, MediaKind, ModelId};
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::polling::{PollPolicy, PollState, PollingController};
use crate::providers::pricing::{CostInputs, PriceTable};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How the request body goes on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    Json,
    Multipart,
}

/// How the adapter learns that a job finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The submission response carries the result
    Immediate,
    /// The submission returns a job handle that is polled
    Polled(PollPolicy),
}

/// Inputs a model needs before any network call is made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirements {
    pub prompt: bool,
    pub assets: &'static [AssetKind],
}

impl Requirements {
    pub const TEXT: Requirements = Requirements {
        prompt: true,
        assets: &[],
    };

    pub const fn new(prompt: bool, assets: &'static [AssetKind]) -> Self {
        Self { prompt, assets }
    }
}

/// Wire request produced by [`ProviderAdapter::transform_request`]
pub type ProviderPayload = HttpRequest;

/// Collaborators and connection settings shared by every adapter
#[derive(Clone)]
pub struct AdapterContext {
    pub transport: Arc<dyn HttpExecutor>,
    pub pricing: Arc<PriceTable>,
    /// API root without a trailing slash
    pub base_url: String,
    pub auth_scheme: AuthScheme,
    /// Replaces the adapter's own polling cadence
    pub poll_override: Option<PollPolicy>,
}

impl AdapterContext {
    pub fn new(transport: Arc<dyn HttpExecutor>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            transport,
            pricing: Arc::new(PriceTable::standard()),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_scheme: AuthScheme::Bearer,
            poll_override: None,
        }
    }

    pub fn with_pricing(mut self, pricing: Arc<PriceTable>) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_auth_scheme(mut self, scheme: AuthScheme) -> Self {
        self.auth_scheme = scheme;
        self
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_override = Some(policy);
        self
    }

    /// Absolute URL for an API path
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn poll_policy(&self, default: PollPolicy) -> PollPolicy {
        self.poll_override.unwrap_or(default)
    }
}

/// One model's view of its provider
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn model(&self) -> ModelId;

    fn context(&self) -> &AdapterContext;

    fn transport(&self) -> &dyn HttpExecutor {
        self.context().transport.as_ref()
    }

    /// Prompt and assets the model cannot run without
    fn requirements(&self) -> Requirements {
        Requirements::TEXT
    }

    fn encoding(&self, _request: &GenerationRequest) -> BodyEncoding {
        BodyEncoding::Json
    }

    fn completion(&self) -> Completion {
        Completion::Immediate
    }

    /// Check local preconditions; no network traffic happens before this passes
    fn validate(&self, request: &GenerationRequest) -> ProviderResult<()> {
        validate_common(self, request)
    }

    /// Build the provider's native request
    fn transform_request(&self, request: &GenerationRequest) -> ProviderResult<ProviderPayload>;

    /// Status check for a submitted job; only called for polled models
    fn status_request(
        &self,
        _request: &GenerationRequest,
        _submitted: &TransportResponse,
    ) -> ProviderResult<HttpRequest> {
        Err(ProviderError::Adapter(format!(
            "{} does not poll for results",
            self.model()
        )))
    }

    /// Classify a status response
    fn poll_state(&self, status: TransportResponse) -> ProviderResult<PollState<TransportResponse>> {
        Ok(PollState::Done(status))
    }

    /// Normalize the final provider response
    async fn transform_response(
        &self,
        request: &GenerationRequest,
        response: TransportResponse,
    ) -> ProviderResult<GenerationResponse>;

    /// Quantities the wire request actually asks the provider for
    ///
    /// Adapters that cap, snap or ignore the requested count or duration
    /// override this so the charge matches what was generated.
    fn wire_quantities(&self, request: &GenerationRequest) -> CostInputs {
        CostInputs::from_request(request)
    }

    /// Credits charged for a successful call
    fn credits_used(&self, request: &GenerationRequest) -> f64 {
        self.context()
            .pricing
            .estimate(self.model(), &self.wire_quantities(request))
    }

    /// Successful response priced for `request`
    fn generated(
        &self,
        request: &GenerationRequest,
        payloads: Vec<EncodedPayload>,
        revised_prompt: Option<String>,
    ) -> GenerationResponse {
        GenerationResponse::generated(payloads, self.credits_used(request), revised_prompt)
    }

    /// Empty request of the adapter's encoding for `request`
    fn wire_request(
        &self,
        request: &GenerationRequest,
        method: HttpMethod,
        url: String,
    ) -> HttpRequest {
        let wire = HttpRequest::new(method, url);
        match self.encoding(request) {
            BodyEncoding::Json => wire.with_header("Content-Type", "application/json"),
            BodyEncoding::Multipart => wire.multipart(),
        }
    }

    /// Run the whole call; never fails, errors become FAILED responses
    async fn make_request(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> GenerationResponse {
        let model = self.model();
        let started = Instant::now();

        match drive(self, request, cancel).await {
            Ok(response) => {
                match &response {
                    GenerationResponse::Generated(output) => info!(
                        "{} generated {} payload(s) in {:?}",
                        model,
                        output.payloads.len(),
                        started.elapsed()
                    ),
                    GenerationResponse::Failed(failure) => warn!(
                        "{} failed with {}: {}",
                        model, failure.kind, failure.message
                    ),
                }
                response
            }
            Err(err) => {
                warn!("{} failed with {}: {}", model, err.kind(), err);
                GenerationResponse::failed(err.kind(), err.to_string())
            }
        }
    }
}

/// Checks every model shares: model and job kind match, a secret is present,
/// and the prompt and assets named by [`ProviderAdapter::requirements`] exist
pub fn validate_common<A>(adapter: &A, request: &GenerationRequest) -> ProviderResult<()>
where
    A: ProviderAdapter + ?Sized,
{
    let model = adapter.model();
    if request.model != model {
        return Err(ProviderError::Adapter(format!(
            "Request for {} sent to the {} adapter",
            request.model, model
        )));
    }

    let job_media = match request.job {
        JobParameters::Image(_) => MediaKind::Image,
        JobParameters::Video(_) => MediaKind::Video,
    };
    if job_media != model.media() {
        return Err(ProviderError::Adapter(format!(
            "{} produces {} but the request describes a {} job",
            model,
            model.media().as_str(),
            job_media.as_str()
        )));
    }

    if request.credentials.secret.is_empty() {
        return Err(ProviderError::Adapter(format!(
            "Missing API key for {}",
            model.provider()
        )));
    }

    let requirements = adapter.requirements();
    if requirements.prompt && request.prompt_text().is_none() {
        return Err(ProviderError::Adapter("A prompt is required".to_string()));
    }
    for kind in requirements.assets {
        if request.assets.get(*kind).is_none() {
            return Err(ProviderError::missing_asset(*kind));
        }
    }

    Ok(())
}

/// Decode a request asset into a multipart file part named `field`
pub fn asset_attachment(
    request: &GenerationRequest,
    kind: AssetKind,
    field: &str,
) -> ProviderResult<Option<Attachment>> {
    let Some(asset) = request.assets.get(kind) else {
        return Ok(None);
    };
    let bytes = asset
        .decode()
        .map_err(|e| ProviderError::invalid_asset(kind, e))?;
    let mime_type = asset.mime_type();
    let extension = mime_type.rsplit('/').next().unwrap_or("bin");
    Ok(Some(Attachment::new(
        field,
        format!("{}.{}", field, extension),
        mime_type.clone(),
        bytes,
    )))
}

async fn perform_cancellable(
    transport: &dyn HttpExecutor,
    wire: HttpRequest,
    cancel: &CancellationToken,
) -> ProviderResult<TransportResponse> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ProviderError::Cancelled),
        response = transport.perform(wire) => Ok(response?),
    }
}

async fn drive<A>(
    adapter: &A,
    request: &GenerationRequest,
    cancel: &CancellationToken,
) -> ProviderResult<GenerationResponse>
where
    A: ProviderAdapter + ?Sized,
{
    adapter.validate(request)?;

    if cancel.is_cancelled() {
        return Err(ProviderError::Cancelled);
    }

    let wire = adapter.transform_request(request)?;
    info!(
        "Submitting {} job [request_id: {}]",
        adapter.model(),
        wire.request_id
    );

    let transport = adapter.transport();
    let submitted = perform_cancellable(transport, wire, cancel).await?;

    let final_response = match adapter.completion() {
        Completion::Immediate => submitted,
        Completion::Polled(policy) => {
            crate::providers::payload::ensure_success(&submitted)?;

            let controller = PollingController::new(policy);
            let submitted = &submitted;
            let outcome = controller
                .poll(cancel, |_attempt| async move {
                    let status = adapter.status_request(request, submitted)?;
                    let response = perform_cancellable(transport, status, cancel).await?;
                    adapter.poll_state(response)
                })
                .await?;

            debug!(
                "{} finished after {} status check(s) in {:?}",
                adapter.model(),
                outcome.attempts,
                outcome.elapsed
            );
            outcome.value
        }
    };

    adapter.transform_response(request, final_response).await
}

//! Concurrent job queue
//!
//! [`JobQueue::submit`] records an item synchronously and runs the adapter on
//! its own tokio task. All item state lives in one `watch` channel; every
//! mutation goes through `send_if_modified`, which serializes completions,
//! cancellations and removals and notifies observers.
//!
//! A completion only lands while its item is still in progress. After
//! [`JobQueue::cancel`] the job may keep running until it observes the token,
//! but whatever it produces is discarded.

mod capabilities;
mod item;

pub use capabilities::{SecretLookup, UsageDelta, UsageLedger, UsageRecord, UsageSink};
pub use item::{QueueItem, QueueStatus};

use crate::protocol::{ErrorKind, GenerationRequest, GenerationResponse};
use crate::providers::registry::AdapterRegistry;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct Shared {
    registry: AdapterRegistry,
    secrets: Arc<dyn SecretLookup>,
    usage: Arc<dyn UsageSink>,
    items: watch::Sender<Vec<QueueItem>>,
}

/// Queue of generation jobs, newest first
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct JobQueue {
    shared: Arc<Shared>,
}

impl JobQueue {
    pub fn new(
        registry: AdapterRegistry,
        secrets: Arc<dyn SecretLookup>,
        usage: Arc<dyn UsageSink>,
    ) -> Self {
        let (items, _) = watch::channel(Vec::new());
        Self {
            shared: Arc::new(Shared {
                registry,
                secrets,
                usage,
                items,
            }),
        }
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.shared.registry
    }

    /// Record a job and start it
    ///
    /// The returned item is already visible through [`Self::items`]. Must be
    /// called from within a tokio runtime.
    pub fn submit(&self, mut request: GenerationRequest) -> QueueItem {
        let model = request.model;
        let mut item = QueueItem::new(model, request.prompt.clone());

        let Some(adapter) = self.shared.registry.get(model) else {
            item.fail(
                ErrorKind::AdapterError,
                format!("No adapter registered for {}", model),
            );
            warn!("Rejected {} job [item: {}]: no adapter", model, item.id);
            self.insert(item.clone());
            return item;
        };

        if request.credentials.secret.is_empty() {
            if let Some(secret) = self.shared.secrets.secret_for(model.provider()) {
                request.credentials.secret = secret;
            }
        }

        self.insert(item.clone());
        info!("Queued {} job [item: {}]", model, item.id);

        let queue = self.clone();
        let id = item.id;
        let cancel = item.cancellation_token();
        tokio::spawn(async move {
            let response = adapter.make_request(&request, &cancel).await;
            let delta = UsageDelta::for_response(&response);
            if queue.complete(id, response) {
                if let Some(delta) = delta {
                    queue
                        .shared
                        .usage
                        .record(&request.credentials.usage_record, delta);
                }
            }
        });

        item
    }

    /// Cancel an in-progress job; returns false when it already finished
    pub fn cancel(&self, id: Uuid) -> bool {
        let cancelled = self.shared.items.send_if_modified(|items| {
            match items.iter_mut().find(|item| item.id == id) {
                Some(item) if item.is_in_progress() => {
                    item.cancel();
                    true
                }
                _ => false,
            }
        });
        if cancelled {
            info!("Cancelled job [item: {}]", id);
        }
        cancelled
    }

    /// Snapshot of every item, newest first
    pub fn items(&self) -> Vec<QueueItem> {
        self.shared.items.borrow().clone()
    }

    pub fn in_progress(&self) -> Vec<QueueItem> {
        self.with_status(QueueStatus::InProgress)
    }

    pub fn successful(&self) -> Vec<QueueItem> {
        self.with_status(QueueStatus::Successful)
    }

    pub fn failed(&self) -> Vec<QueueItem> {
        self.with_status(QueueStatus::Failed)
    }

    pub fn item(&self, id: Uuid) -> Option<QueueItem> {
        self.shared
            .items
            .borrow()
            .iter()
            .find(|item| item.id == id)
            .cloned()
    }

    /// Receiver notified after every change to the item list
    pub fn subscribe(&self) -> watch::Receiver<Vec<QueueItem>> {
        self.shared.items.subscribe()
    }

    /// Wait until `id` leaves the in-progress state
    ///
    /// Returns `None` if the item is not (or no longer) in the queue.
    pub async fn settled(&self, id: Uuid) -> Option<QueueItem> {
        let mut rx = self.subscribe();
        let items = rx
            .wait_for(|items| {
                items
                    .iter()
                    .find(|item| item.id == id)
                    .map_or(true, |item| item.status.is_terminal())
            })
            .await
            .ok()?;
        let found = items.iter().find(|item| item.id == id).cloned();
        found
    }

    /// Drop an item; a job still running is cancelled and its result discarded
    pub fn remove(&self, id: Uuid) -> Option<QueueItem> {
        let mut removed = None;
        self.shared.items.send_if_modified(|items| {
            let Some(index) = items.iter().position(|item| item.id == id) else {
                return false;
            };
            let item = items.remove(index);
            item.abandon();
            removed = Some(item);
            true
        });
        removed
    }

    /// Remove every successful item, returning how many went
    pub fn clear_successful(&self) -> usize {
        self.clear(QueueStatus::Successful)
    }

    /// Remove every failed item, returning how many went
    pub fn clear_failed(&self) -> usize {
        self.clear(QueueStatus::Failed)
    }

    fn with_status(&self, status: QueueStatus) -> Vec<QueueItem> {
        self.shared
            .items
            .borrow()
            .iter()
            .filter(|item| item.status == status)
            .cloned()
            .collect()
    }

    fn clear(&self, status: QueueStatus) -> usize {
        let mut cleared = 0;
        self.shared.items.send_if_modified(|items| {
            let before = items.len();
            items.retain(|item| item.status != status);
            cleared = before - items.len();
            cleared > 0
        });
        debug!("Cleared {} {} item(s)", cleared, status);
        cleared
    }

    fn insert(&self, item: QueueItem) {
        self.shared.items.send_modify(|items| items.insert(0, item));
    }

    /// Settle an in-progress item; false when the result was discarded
    fn complete(&self, id: Uuid, response: GenerationResponse) -> bool {
        let status = response.status();
        let applied = self.shared.items.send_if_modified(|items| {
            match items.iter_mut().find(|item| item.id == id) {
                Some(item) if item.is_in_progress() => {
                    item.settle(response);
                    true
                }
                _ => false,
            }
        });

        if applied {
            info!("Job finished as {:?} [item: {}]", status, id);
        } else {
            debug!("Discarded late {:?} result [item: {}]", status, id);
        }
        applied
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("registry", &self.shared.registry)
            .field("items", &self.shared.items.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecretString;
    use crate::http::{HttpRequest, TransportResponse};
    use crate::protocol::{EncodedPayload, UsageRecordRef};
    use crate::providers::adapter::{AdapterContext, ProviderAdapter, ProviderPayload};
    use crate::providers::catalog::{ModelId, ProviderKind};
    use crate::providers::error::ProviderResult;
    use crate::test_support::offline_context;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    /// Adapter that answers once its gate opens and ignores cancellation
    struct Gated {
        model: ModelId,
        ctx: AdapterContext,
        gate: CancellationToken,
        /// Cancelled once `make_request` has produced its answer
        returned: CancellationToken,
        response: GenerationResponse,
        secrets_seen: Mutex<Vec<String>>,
    }

    impl Gated {
        fn new(model: ModelId, response: GenerationResponse) -> Self {
            Self {
                model,
                ctx: offline_context("https://gated.test"),
                gate: CancellationToken::new(),
                returned: CancellationToken::new(),
                response,
                secrets_seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for Gated {
        fn model(&self) -> ModelId {
            self.model
        }

        fn context(&self) -> &AdapterContext {
            &self.ctx
        }

        fn transform_request(&self, _request: &GenerationRequest) -> ProviderResult<ProviderPayload> {
            Ok(HttpRequest::post(self.ctx.url("run")))
        }

        async fn transform_response(
            &self,
            _request: &GenerationRequest,
            _response: TransportResponse,
        ) -> ProviderResult<GenerationResponse> {
            Ok(self.response.clone())
        }

        async fn make_request(
            &self,
            request: &GenerationRequest,
            _cancel: &CancellationToken,
        ) -> GenerationResponse {
            self.secrets_seen
                .lock()
                .unwrap()
                .push(request.credentials.secret.expose_secret().to_string());
            self.gate.cancelled().await;
            self.returned.cancel();
            self.response.clone()
        }
    }

    fn image() -> GenerationResponse {
        GenerationResponse::generated(vec![EncodedPayload::from_bytes(b"img")], 0.003, None)
    }

    fn queue_with(adapter: Arc<Gated>) -> (JobQueue, Arc<UsageLedger>) {
        let mut registry = AdapterRegistry::new();
        registry.register(adapter.model, adapter);
        let ledger = Arc::new(UsageLedger::new());
        let secrets = |provider: ProviderKind| {
            (provider == ProviderKind::Replicate).then(|| SecretString::new("r8_lookup"))
        };
        let queue = JobQueue::new(registry, Arc::new(secrets), ledger.clone());
        (queue, ledger)
    }

    #[tokio::test]
    async fn test_success_mints_result_and_reports_usage() {
        let adapter = Arc::new(Gated::new(ModelId::FluxSchnell, image()));
        let (queue, ledger) = queue_with(adapter.clone());

        let record = UsageRecordRef::new("conn-1");
        let item = queue.submit(
            GenerationRequest::image(ModelId::FluxSchnell)
                .with_prompt("fox")
                .with_usage_record(record.clone()),
        );
        assert_eq!(item.status, QueueStatus::InProgress);
        assert_eq!(queue.in_progress().len(), 1);

        adapter.gate.cancel();
        let done = queue.settled(item.id).await.unwrap();
        assert_eq!(done.status, QueueStatus::Successful);
        assert!(done.result_id.is_some());
        assert!(done.error_message.is_none());

        let usage = ledger.get(&record);
        assert_eq!(usage.total_requests, 1);
        assert!((usage.credits_used - 0.003).abs() < 1e-9);
        assert_eq!(
            adapter.secrets_seen.lock().unwrap().as_slice(),
            ["r8_lookup".to_string()]
        );
    }

    #[tokio::test]
    async fn test_cancel_then_late_completion_is_discarded() {
        let adapter = Arc::new(Gated::new(ModelId::FluxSchnell, image()));
        let (queue, ledger) = queue_with(adapter.clone());

        let item = queue.submit(GenerationRequest::image(ModelId::FluxSchnell).with_prompt("fox"));
        assert!(queue.cancel(item.id));
        assert!(!queue.cancel(item.id));

        let cancelled = queue.item(item.id).unwrap();
        assert_eq!(cancelled.status, QueueStatus::Failed);
        assert_eq!(cancelled.error_message.as_deref(), Some("Cancelled by user"));
        assert!(item.cancellation_token().is_cancelled());

        // Let the job finish anyway; its result and charge must not land
        adapter.gate.cancel();
        adapter.returned.cancelled().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let after = queue.item(item.id).unwrap();
        assert_eq!(after.status, QueueStatus::Failed);
        assert!(after.result_id.is_none());
        assert_eq!(after.error_message.as_deref(), Some("Cancelled by user"));
        assert!(ledger.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_failed_job_is_not_charged() {
        let adapter = Arc::new(Gated::new(
            ModelId::FluxSchnell,
            GenerationResponse::failed(ErrorKind::AdapterError, "Missing required source image"),
        ));
        let (queue, ledger) = queue_with(adapter.clone());

        let item = queue.submit(GenerationRequest::image(ModelId::FluxSchnell).with_prompt("fox"));
        adapter.gate.cancel();
        let done = queue.settled(item.id).await.unwrap();

        assert_eq!(done.status, QueueStatus::Failed);
        assert_eq!(done.error_kind, Some(ErrorKind::AdapterError));
        assert!(ledger.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_model_fails_without_spawning() {
        let adapter = Arc::new(Gated::new(ModelId::FluxSchnell, image()));
        let (queue, ledger) = queue_with(adapter.clone());

        let item = queue.submit(GenerationRequest::image(ModelId::DallE3).with_prompt("cat"));
        assert_eq!(item.status, QueueStatus::Failed);
        assert_eq!(item.error_kind, Some(ErrorKind::AdapterError));
        assert_eq!(queue.failed().len(), 1);
        assert!(adapter.secrets_seen.lock().unwrap().is_empty());
        assert!(ledger.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_views_and_bulk_removal() {
        let adapter = Arc::new(Gated::new(ModelId::FluxSchnell, image()));
        let (queue, _) = queue_with(adapter.clone());

        let first = queue.submit(GenerationRequest::image(ModelId::FluxSchnell).with_prompt("a"));
        let second = queue.submit(GenerationRequest::image(ModelId::FluxSchnell).with_prompt("b"));
        let ids: Vec<Uuid> = queue.items().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);

        queue.cancel(second.id);
        adapter.gate.cancel();
        queue.settled(first.id).await.unwrap();

        assert_eq!(queue.successful().len(), 1);
        assert_eq!(queue.failed().len(), 1);
        assert_eq!(queue.clear_failed(), 1);
        assert_eq!(queue.clear_failed(), 0);
        assert_eq!(queue.clear_successful(), 1);
        assert!(queue.items().is_empty());
        assert!(queue.remove(first.id).is_none());
    }

    #[tokio::test]
    async fn test_remove_cancels_running_job() {
        let adapter = Arc::new(Gated::new(ModelId::FluxSchnell, image()));
        let (queue, _) = queue_with(adapter);

        let item = queue.submit(GenerationRequest::image(ModelId::FluxSchnell).with_prompt("a"));
        let removed = queue.remove(item.id).unwrap();
        assert_eq!(removed.id, item.id);
        assert!(item.cancellation_token().is_cancelled());
        assert!(queue.settled(item.id).await.is_none());
    }
}

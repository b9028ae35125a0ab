//! Job queue driving real adapters over HTTP

use atelier_core::config::{AtelierConfig, ProviderSettings, SecretString};
use atelier_core::http::HttpClient;
use atelier_core::protocol::{ErrorKind, GenerationRequest, UsageRecordRef};
use atelier_core::providers::{AdapterRegistry, ModelId, ProviderKind};
use atelier_core::queue::{JobQueue, QueueStatus, UsageLedger};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> AtelierConfig {
    let mut config = AtelierConfig::empty();
    config.providers = vec![
        ProviderSettings {
            kind: ProviderKind::Stability,
            api_key: SecretString::new("sk-stability"),
            base_url: Some(server.uri()),
            auth_scheme: None,
            enabled: true,
        },
        ProviderSettings {
            kind: ProviderKind::OpenAI,
            api_key: SecretString::new("sk-openai"),
            base_url: Some(format!("{}/v1", server.uri())),
            auth_scheme: None,
            enabled: true,
        },
    ];
    config
}

fn queue_for(config: AtelierConfig) -> (JobQueue, Arc<UsageLedger>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let config = Arc::new(config);
    let transport = Arc::new(HttpClient::from_settings(&config.http).unwrap());
    let registry = AdapterRegistry::from_config(&config, transport);
    let ledger = Arc::new(UsageLedger::new());
    (JobQueue::new(registry, config, ledger.clone()), ledger)
}

#[tokio::test]
async fn test_submit_fills_secret_and_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2beta/stable-image/generate/core"))
        .and(header("Authorization", "Bearer sk-stability"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"image": "aGVsbG8=", "finish_reason": "SUCCESS"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (queue, ledger) = queue_for(config_for(&server));
    let record = UsageRecordRef::new("stability-connection");

    let item = queue.submit(
        GenerationRequest::image(ModelId::StableImageCore)
            .with_prompt("a ceramic teapot")
            .with_usage_record(record.clone()),
    );
    assert_eq!(item.status, QueueStatus::InProgress);
    assert_eq!(queue.items()[0].id, item.id);

    let done = queue.settled(item.id).await.unwrap();
    assert_eq!(done.status, QueueStatus::Successful);
    assert!(done.result_id.is_some());
    assert_eq!(
        done.output.as_ref().unwrap().payloads[0].decode().unwrap(),
        b"hello"
    );

    let usage = ledger.get(&record);
    assert_eq!(usage.total_requests, 1);
    assert!((usage.credits_used - 0.03).abs() < 1e-9);
}

#[tokio::test]
async fn test_provider_failure_lands_in_failed_view() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"error": {"message": "Your request was rejected"}})),
        )
        .mount(&server)
        .await;

    let (queue, ledger) = queue_for(config_for(&server));

    let item = queue.submit(GenerationRequest::image(ModelId::DallE3).with_prompt("a cat"));
    let done = queue.settled(item.id).await.unwrap();

    assert_eq!(done.status, QueueStatus::Failed);
    assert_eq!(done.error_kind, Some(ErrorKind::ModelError));
    assert_eq!(done.error_message.as_deref(), Some("Your request was rejected"));
    assert!(done.result_id.is_none());
    assert_eq!(queue.failed().len(), 1);

    // only successful generations are charged
    assert!(ledger.snapshot().is_empty());
}

#[tokio::test]
async fn test_cancel_discards_slow_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2beta/stable-image/generate/ultra"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"image": "aGVsbG8="}))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let (queue, ledger) = queue_for(config_for(&server));

    let item = queue.submit(GenerationRequest::image(ModelId::StableImageUltra).with_prompt("dunes"));
    assert!(queue.cancel(item.id));

    let cancelled = queue.item(item.id).unwrap();
    assert_eq!(cancelled.status, QueueStatus::Failed);
    assert_eq!(cancelled.error_message.as_deref(), Some("Cancelled by user"));

    // Outlive the delayed provider answer; nothing it carries may land
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(ledger.snapshot().is_empty());

    let after = queue.item(item.id).unwrap();
    assert_eq!(after.status, QueueStatus::Failed);
    assert_eq!(after.error_message.as_deref(), Some("Cancelled by user"));
    assert!(after.output.is_none());
}

#[tokio::test]
async fn test_unregistered_model_fails_immediately() {
    let server = MockServer::start().await;
    let (queue, ledger) = queue_for(config_for(&server));

    let item = queue.submit(GenerationRequest::video(ModelId::Veo3).with_prompt("surf"));
    assert_eq!(item.status, QueueStatus::Failed);
    assert_eq!(item.error_kind, Some(ErrorKind::AdapterError));
    assert!(server.received_requests().await.unwrap().is_empty());
    assert!(ledger.snapshot().is_empty());
}

#[tokio::test]
async fn test_concurrent_jobs_settle_independently() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2beta/stable-image/generate/core"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"image": "aGVsbG8="}))
                .set_delay(Duration::from_millis(50)),
        )
        .expect(5)
        .mount(&server)
        .await;

    let (queue, _) = queue_for(config_for(&server));

    let ids: Vec<_> = (0..5)
        .map(|i| {
            queue
                .submit(
                    GenerationRequest::image(ModelId::StableImageCore)
                        .with_prompt(format!("teapot #{}", i)),
                )
                .id
        })
        .collect();

    let listed: Vec<_> = queue.items().iter().map(|item| item.id).collect();
    let mut newest_first = ids.clone();
    newest_first.reverse();
    assert_eq!(listed, newest_first);

    for id in &ids {
        let done = queue.settled(*id).await.unwrap();
        assert_eq!(done.status, QueueStatus::Successful);
    }
    assert_eq!(queue.successful().len(), 5);
    assert_eq!(queue.clear_successful(), 5);
    assert!(queue.items().is_empty());
}

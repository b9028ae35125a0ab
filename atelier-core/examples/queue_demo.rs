//! Queue Demo - submit one job and watch it settle
//!
//! Reads provider connections from a config file, quotes the job, submits it
//! and prints every queue transition until the item is terminal.
//!
//! Run with: cargo run --example queue_demo -- atelier.yaml flux-schnell "a red fox in snow"

use atelier_core::config::load_from_yaml;
use atelier_core::http::HttpClient;
use atelier_core::protocol::GenerationRequest;
use atelier_core::providers::{
    AdapterRegistry, CostInputs, MediaKind, ModelId, PriceTable, ProviderAdapter,
};
use atelier_core::queue::{JobQueue, QueueStatus, UsageLedger};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "atelier.yaml".to_string());
    let model: ModelId = args
        .next()
        .unwrap_or_else(|| "flux-schnell".to_string())
        .parse()?;
    let prompt = args
        .next()
        .unwrap_or_else(|| "a red fox in fresh snow, golden hour".to_string());

    let config = Arc::new(load_from_yaml(&config_path)?);
    let transport = Arc::new(HttpClient::from_settings(&config.http)?);
    let registry = AdapterRegistry::from_config(&config, transport);
    println!("Registered models: {:?}", registry.models());

    let request = match model.media() {
        MediaKind::Image => GenerationRequest::image(model),
        MediaKind::Video => GenerationRequest::video(model),
    }
    .with_prompt(prompt);

    let inputs = registry
        .get(model)
        .map(|adapter| adapter.wire_quantities(&request))
        .unwrap_or_else(|| CostInputs::from_request(&request));
    let quote = PriceTable::from_config(&config).quote(model, &inputs);
    println!("Estimated cost: {:.4} credits", quote.credits);
    if quote.diverges() {
        println!("  (legacy charge was {:.4})", quote.legacy_credits.unwrap_or_default());
    }

    let ledger = Arc::new(UsageLedger::new());
    let queue = JobQueue::new(registry, config.clone(), ledger.clone());

    let mut updates = queue.subscribe();
    let item = queue.submit(request);
    println!("Submitted {} as {}", model, item.id);

    loop {
        let current = queue.item(item.id);
        match current {
            Some(item) if item.status == QueueStatus::InProgress => {}
            Some(item) => {
                match item.status {
                    QueueStatus::Successful => {
                        let output = item.output.as_deref();
                        println!(
                            "Done: result {} with {} payload(s), cost {:.4}",
                            item.result_id.map(|id| id.to_string()).unwrap_or_default(),
                            output.map(|o| o.payloads.len()).unwrap_or(0),
                            output.map(|o| o.cost).unwrap_or(0.0)
                        );
                        if let Some(revised) = output.and_then(|o| o.revised_prompt.as_deref()) {
                            println!("Revised prompt: {}", revised);
                        }
                    }
                    _ => println!(
                        "Failed: {} ({})",
                        item.error_message.unwrap_or_default(),
                        item.error_kind.map(|k| k.to_string()).unwrap_or_default()
                    ),
                }
                break;
            }
            None => break,
        }
        updates.changed().await?;
    }

    println!("Usage: {:?}", ledger.snapshot());
    Ok(())
}

//! Capabilities the queue borrows from its host
//!
//! The queue never stores secrets or usage totals itself. Both are injected:
//! a [`SecretLookup`] fills in keys that a request leaves empty, and a
//! [`UsageSink`] receives one [`UsageDelta`] per job that lands as successful.

use crate::config::{AtelierConfig, SecretString};
use crate::protocol::{GenerationResponse, UsageRecordRef};
use crate::providers::catalog::ProviderKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Source of provider secrets
pub trait SecretLookup: Send + Sync {
    fn secret_for(&self, provider: ProviderKind) -> Option<SecretString>;
}

impl<F> SecretLookup for F
where
    F: Fn(ProviderKind) -> Option<SecretString> + Send + Sync,
{
    fn secret_for(&self, provider: ProviderKind) -> Option<SecretString> {
        self(provider)
    }
}

impl SecretLookup for AtelierConfig {
    fn secret_for(&self, provider: ProviderKind) -> Option<SecretString> {
        self.provider(provider)
            .map(|settings| settings.api_key.clone())
            .filter(|key| !key.is_empty())
    }
}

/// Change to one usage record caused by a successful generation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UsageDelta {
    pub requests: u64,
    pub credits: f64,
}

impl UsageDelta {
    /// One request at the response's cost; failures are not counted
    pub fn for_response(response: &GenerationResponse) -> Option<Self> {
        response.is_generated().then(|| Self {
            requests: 1,
            credits: response.cost(),
        })
    }
}

/// Receiver of usage deltas
pub trait UsageSink: Send + Sync {
    fn record(&self, record: &UsageRecordRef, delta: UsageDelta);
}

/// Running totals of one usage record
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UsageRecord {
    pub credits_used: f64,
    pub total_requests: u64,
}

impl UsageRecord {
    pub fn apply(&mut self, delta: UsageDelta) {
        self.credits_used += delta.credits;
        self.total_requests += delta.requests;
    }
}

/// In-memory [`UsageSink`] keyed by usage record
#[derive(Debug, Default)]
pub struct UsageLedger {
    records: Mutex<HashMap<UsageRecordRef, UsageRecord>>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Totals for `record`; zero when nothing was reported yet
    pub fn get(&self, record: &UsageRecordRef) -> UsageRecord {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(record)
            .copied()
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> HashMap<UsageRecordRef, UsageRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl UsageSink for UsageLedger {
    fn record(&self, record: &UsageRecordRef, delta: UsageDelta) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.entry(record.clone()).or_default().apply(delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;
    use crate::protocol::{EncodedPayload, ErrorKind};

    #[test]
    fn test_closure_lookup() {
        let lookup = |provider: ProviderKind| match provider {
            ProviderKind::Stability => Some(SecretString::new("sk-stability")),
            _ => None,
        };
        assert_eq!(
            lookup.secret_for(ProviderKind::Stability),
            Some(SecretString::new("sk-stability"))
        );
        assert_eq!(lookup.secret_for(ProviderKind::OpenAI), None);
    }

    #[test]
    fn test_config_lookup_skips_disabled() {
        let mut config = AtelierConfig::empty();
        config.providers = vec![ProviderSettings {
            kind: ProviderKind::OpenAI,
            api_key: SecretString::new("sk-openai"),
            base_url: None,
            auth_scheme: None,
            enabled: false,
        }];
        assert_eq!(config.secret_for(ProviderKind::OpenAI), None);

        config.providers[0].enabled = true;
        assert_eq!(
            config.secret_for(ProviderKind::OpenAI),
            Some(SecretString::new("sk-openai"))
        );
    }

    #[test]
    fn test_failures_carry_no_delta() {
        assert_eq!(
            UsageDelta::for_response(&GenerationResponse::model_error("nope")),
            None
        );
        assert_eq!(
            UsageDelta::for_response(&GenerationResponse::failed(
                ErrorKind::Cancelled,
                "Cancelled by user"
            )),
            None
        );
    }

    #[test]
    fn test_ledger_accumulates() {
        let ledger = UsageLedger::new();
        let record = UsageRecordRef::new("conn-1");

        let generated =
            GenerationResponse::generated(vec![EncodedPayload::from_bytes(b"x")], 0.04, None);
        for _ in 0..2 {
            if let Some(delta) = UsageDelta::for_response(&generated) {
                ledger.record(&record, delta);
            }
        }

        let totals = ledger.get(&record);
        assert_eq!(totals.total_requests, 2);
        assert!((totals.credits_used - 0.08).abs() < 1e-9);
        assert_eq!(ledger.get(&UsageRecordRef::new("other")), UsageRecord::default());
    }
}

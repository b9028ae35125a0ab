//! Shared response-shape parsing
//!
//! Providers answer in many shapes. After a provider module has navigated to
//! the part of the payload that carries results, the helpers here match it in
//! a fixed priority order:
//!
//! 1. an inline base64 field
//! 2. a URL reference, downloaded through the transport
//! 3. a top-level array whose elements carry either of the above
//! 4. an error object, with a singular message or a list of errors
//!
//! Anything else is reported as "Invalid response from provider".

use crate::http::{HttpExecutor, Payload, TransportResponse};
use crate::protocol::EncodedPayload;
use crate::providers::error::ProviderError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Value};
use tracing::debug;

/// Message used when no known shape matches
pub const INVALID_RESPONSE: &str = "Invalid response from provider";

/// Field names searched for results
#[derive(Debug, Clone, Copy)]
pub struct MediaFields {
    /// Fields holding base64 text
    pub inline: &'static [&'static str],
    /// Fields holding a URL or a list of URLs
    pub url: &'static [&'static str],
}

impl MediaFields {
    pub const DEFAULT: MediaFields = MediaFields {
        inline: &["image", "video", "b64_json", "bytesBase64Encoded", "base64"],
        url: &["output", "url", "sample", "uri"],
    };
}

impl Default for MediaFields {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Where a single result lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaRef {
    Inline(String),
    Url(String),
}

fn is_url(text: &str) -> bool {
    text.starts_with("https://") || text.starts_with("http://")
}

fn strings(value: &Value) -> Vec<&str> {
    match value {
        Value::String(s) if !s.trim().is_empty() => vec![s.as_str()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Results carried by one object, inline fields first
pub fn refs_in(map: &Map<String, Value>, fields: &MediaFields) -> Vec<MediaRef> {
    for key in fields.inline {
        if let Some(value) = map.get(*key) {
            let found: Vec<MediaRef> = strings(value)
                .into_iter()
                .map(|s| MediaRef::Inline(s.to_string()))
                .collect();
            if !found.is_empty() {
                return found;
            }
        }
    }

    for key in fields.url {
        if let Some(value) = map.get(*key) {
            let found: Vec<MediaRef> = strings(value)
                .into_iter()
                .filter(|s| is_url(s))
                .map(|s| MediaRef::Url(s.to_string()))
                .collect();
            if !found.is_empty() {
                return found;
            }
        }
    }

    Vec::new()
}

/// Match a payload against the known result and error shapes
pub fn locate(payload: &Payload, fields: &MediaFields) -> Result<Vec<MediaRef>, ProviderError> {
    let refs = match payload {
        Payload::Object(map) => refs_in(map, fields),
        Payload::Array(items) => items.iter().flat_map(|item| refs_in(item, fields)).collect(),
    };

    if !refs.is_empty() {
        return Ok(refs);
    }

    match error_message(payload) {
        Some(message) => Err(ProviderError::Model(message)),
        None => Err(ProviderError::Model(INVALID_RESPONSE.to_string())),
    }
}

/// Turn located results into encoded payloads, downloading URLs
pub async fn resolve(
    refs: Vec<MediaRef>,
    transport: &dyn HttpExecutor,
) -> Result<Vec<EncodedPayload>, ProviderError> {
    let mut payloads = Vec::with_capacity(refs.len());

    for media in refs {
        match media {
            MediaRef::Inline(encoded) => payloads.push(decode_inline(&encoded)?),
            MediaRef::Url(url) => {
                debug!("Fetching generated media by reference");
                let bytes = transport.fetch_bytes(&url).await?;
                if bytes.is_empty() {
                    return Err(ProviderError::TransformResponse(
                        "Downloaded result is empty".to_string(),
                    ));
                }
                payloads.push(EncodedPayload::from_bytes(&bytes));
            }
        }
    }

    Ok(payloads)
}

/// Validate inline base64 text
pub fn decode_inline(encoded: &str) -> Result<EncodedPayload, ProviderError> {
    let payload = EncodedPayload::from_base64(encoded);
    match STANDARD.decode(payload.as_base64()) {
        Ok(bytes) if !bytes.is_empty() => Ok(payload),
        Ok(_) => Err(ProviderError::TransformResponse(
            "Provider returned empty media data".to_string(),
        )),
        Err(e) => Err(ProviderError::TransformResponse(format!(
            "Provider returned undecodable media data: {}",
            e
        ))),
    }
}

/// [`locate`] followed by [`resolve`]
pub async fn extract_media(
    payload: &Payload,
    fields: &MediaFields,
    transport: &dyn HttpExecutor,
) -> Result<Vec<EncodedPayload>, ProviderError> {
    let refs = locate(payload, fields)?;
    resolve(refs, transport).await
}

fn message_of(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map
            .get("message")
            .or_else(|| map.get("msg"))
            .and_then(Value::as_str),
        _ => None,
    }?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn first_message(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.first().and_then(message_of),
        other => message_of(other),
    }
}

/// Error text of one object, if it is shaped like a provider error
pub fn error_in(map: &Map<String, Value>) -> Option<String> {
    map.get("error")
        .and_then(message_of)
        .or_else(|| map.get("errors").and_then(first_message))
        .or_else(|| map.get("message").and_then(message_of))
        .or_else(|| map.get("detail").and_then(first_message))
}

/// Error text of a payload; for arrays, the first element that has one
pub fn error_message(payload: &Payload) -> Option<String> {
    match payload {
        Payload::Object(map) => error_in(map),
        Payload::Array(items) => items.iter().find_map(error_in),
    }
}

/// Fail with the provider's error text on a non-2xx status
pub fn ensure_success(response: &TransportResponse) -> Result<(), ProviderError> {
    if response.is_success() {
        return Ok(());
    }

    let message = error_message(&response.payload)
        .unwrap_or_else(|| format!("Provider returned HTTP {}", response.status_code));
    Err(ProviderError::Model(message))
}

/// Follow a path of object keys and array indexes
pub fn value_at<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(*segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Nested object or array of objects under `path`, as a payload of its own
pub fn nested(payload: &Payload, path: &[&str]) -> Option<Payload> {
    let (first, rest) = path.split_first()?;
    let start = payload.as_object()?.get(*first)?;
    Payload::from_value(value_at(start, rest)?.clone()).ok()
}

/// String at `path` inside an object payload
pub fn str_at<'a>(payload: &'a Payload, path: &[&str]) -> Option<&'a str> {
    let (first, rest) = path.split_first()?;
    let start = payload.as_object()?.get(*first)?;
    value_at(start, rest).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        Payload::from_value(value).unwrap()
    }

    #[test]
    fn test_inline_field_wins_over_url() {
        let refs = locate(
            &payload(json!({"image": "aGVsbG8=", "url": "https://cdn.example.com/a.png"})),
            &MediaFields::DEFAULT,
        )
        .unwrap();
        assert_eq!(refs, vec![MediaRef::Inline("aGVsbG8=".to_string())]);
    }

    #[test]
    fn test_url_list() {
        let refs = locate(
            &payload(json!({"output": ["https://a.example/1.png", "https://a.example/2.png"]})),
            &MediaFields::DEFAULT,
        )
        .unwrap();
        assert_eq!(refs.len(), 2);
        assert!(matches!(&refs[0], MediaRef::Url(u) if u.ends_with("1.png")));
    }

    #[test]
    fn test_top_level_array() {
        let refs = locate(
            &payload(json!([{"b64_json": "aGVsbG8="}, {"url": "https://a.example/x"}])),
            &MediaFields::DEFAULT,
        )
        .unwrap();
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn test_error_shapes() {
        let single = locate(&payload(json!({"error": "rate limited"})), &MediaFields::DEFAULT);
        assert!(matches!(single, Err(ProviderError::Model(m)) if m == "rate limited"));

        let nested = locate(
            &payload(json!({"error": {"message": "bad prompt", "code": 400}})),
            &MediaFields::DEFAULT,
        );
        assert!(matches!(nested, Err(ProviderError::Model(m)) if m == "bad prompt"));

        let listed = locate(
            &payload(json!({"name": "bad_request", "errors": ["prompt: required", "other"]})),
            &MediaFields::DEFAULT,
        );
        assert!(matches!(listed, Err(ProviderError::Model(m)) if m == "prompt: required"));
    }

    #[test]
    fn test_unknown_shape() {
        let result = locate(&payload(json!({"status": "ok"})), &MediaFields::DEFAULT);
        assert!(matches!(result, Err(ProviderError::Model(m)) if m == INVALID_RESPONSE));

        let not_a_url = locate(&payload(json!({"output": "done"})), &MediaFields::DEFAULT);
        assert!(matches!(not_a_url, Err(ProviderError::Model(m)) if m == INVALID_RESPONSE));
    }

    #[test]
    fn test_undecodable_inline() {
        let result = decode_inline("not base64 at all!");
        assert!(matches!(result, Err(ProviderError::TransformResponse(_))));

        let prefixed = decode_inline("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(prefixed.as_base64(), "aGVsbG8=");
    }

    #[test]
    fn test_ensure_success_uses_error_text() {
        let response = TransportResponse::new(429, payload(json!({"detail": "slow down"})));
        assert!(matches!(ensure_success(&response), Err(ProviderError::Model(m)) if m == "slow down"));

        let bare = TransportResponse::new(500, payload(json!({})));
        assert!(matches!(
            ensure_success(&bare),
            Err(ProviderError::Model(m)) if m == "Provider returned HTTP 500"
        ));
    }

    #[test]
    fn test_paths() {
        let value = json!({"a": {"b": [{"c": "found"}]}});
        assert_eq!(value_at(&value, &["a", "b", "0", "c"]), Some(&json!("found")));
        let root = payload(value);
        assert_eq!(str_at(&root, &["a", "b", "0", "c"]), Some("found"));
        assert!(matches!(nested(&root, &["a", "b"]), Some(Payload::Array(items)) if items.len() == 1));
        assert_eq!(nested(&root, &["a", "b", "0", "c"]), None);
    }
}

//! Tolerant provider payload normalization.
//!
//! Provider payloads arrive in three shapes: a top-level array of entries,
//! an object with an `events` array, or a single entry object. Field names
//! drift across provider versions, so extraction probes a small set of
//! common keys. Entries that cannot be normalized are dropped silently;
//! only an unparseable body is an error.

use serde_json::Value;

use escrowd_core::{compute_webhook_id, DealId, NormalizedEvent, WebhookEffect};

/// Intake boundary error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntakeError {
    #[error("malformed json")]
    MalformedJson,
}

const SIG_KEYS: &[&str] = &["signature", "sig", "txSignature"];
const TIME_KEYS: &[&str] = &["timestamp", "blockTime"];
const DEAL_KEYS: &[&str] = &["dealId", "deal_id", "deal"];

/// Parse and normalize a raw webhook body into ordered internal events.
///
/// `webhook_id` is the optional `X-Webhook-Id` header; it seeds the replay
/// digest together with each entry's transaction signature and index.
pub fn normalize_events(
    body: &[u8],
    webhook_id: Option<&str>,
) -> Result<Vec<NormalizedEvent>, IntakeError> {
    let root: Value = serde_json::from_slice(body).map_err(|_| IntakeError::MalformedJson)?;

    let entries: Vec<Value> = match root {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("events") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                obj.insert("events".to_string(), other);
                vec![Value::Object(obj)]
            }
            None => vec![Value::Object(obj)],
        },
        _ => Vec::new(),
    };

    let mut events = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        match normalize_entry(entry, webhook_id, index as u64) {
            Some(event) => events.push(event),
            None => {
                tracing::debug!(index, "dropping unusable webhook entry");
            }
        }
    }
    Ok(events)
}

fn normalize_entry(entry: &Value, webhook_id: Option<&str>, index: u64) -> Option<NormalizedEvent> {
    let obj = entry.as_object()?;

    // Entries lacking a transaction signature carry nothing we can act on.
    let sig = probe_str(obj, SIG_KEYS)?;
    if sig.is_empty() {
        return None;
    }

    let type_code = obj.get("type").and_then(Value::as_str)?;
    let deal_id = DealId::new(probe_str(obj, DEAL_KEYS)?).ok()?;
    let effect = map_effect(type_code, deal_id)?;

    let when = probe_i64(obj, TIME_KEYS)?;
    let slot = obj.get("slot").and_then(Value::as_u64).unwrap_or(0);

    let event = NormalizedEvent {
        id: compute_webhook_id(webhook_id, Some(sig), Some(index)),
        sig: sig.to_string(),
        slot,
        when,
        effect,
    };
    event.validate().ok()?;
    Some(event)
}

/// Map a provider type code onto the internal effect sum.
///
/// Codes are matched case-insensitively with `-`/`_` treated alike; unknown
/// codes are dropped, not errors, so providers can add types without
/// breaking intake.
fn map_effect(type_code: &str, deal_id: DealId) -> Option<WebhookEffect> {
    let canon = type_code.trim().to_ascii_uppercase().replace('-', "_");
    match canon.as_str() {
        "DEAL_FUNDED" => Some(WebhookEffect::DealFunded { deal_id }),
        "DEAL_DELIVERED" => Some(WebhookEffect::DealDelivered { deal_id }),
        "DEAL_DISPUTED" => Some(WebhookEffect::DealDisputed { deal_id }),
        "DEAL_RELEASED" => Some(WebhookEffect::DealReleased { deal_id }),
        "DEAL_REFUNDED" => Some(WebhookEffect::DealRefunded { deal_id }),
        _ => None,
    }
}

fn probe_str<'a>(obj: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| obj.get(*k).and_then(Value::as_str))
}

fn probe_i64(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|k| obj.get(*k).and_then(Value::as_i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(sig: &str, kind: &str, deal: &str) -> Value {
        json!({
            "signature": sig,
            "type": kind,
            "dealId": deal,
            "timestamp": 1_700_000_000,
            "slot": 321,
        })
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert_eq!(
            normalize_events(b"{not json", None).unwrap_err(),
            IntakeError::MalformedJson
        );
    }

    #[test]
    fn accepts_top_level_array() {
        let body = serde_json::to_vec(&json!([entry("s1", "DEAL_FUNDED", "D-1")])).unwrap();
        let events = normalize_events(&body, Some("wh-1")).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].effect,
            WebhookEffect::DealFunded { deal_id: DealId::new("D-1").unwrap() }
        );
        assert_eq!(events[0].slot, 321);
    }

    #[test]
    fn accepts_events_object_and_single_object() {
        let wrapped = serde_json::to_vec(&json!({
            "events": [entry("s1", "DEAL_DELIVERED", "D-2")]
        }))
        .unwrap();
        let single = serde_json::to_vec(&entry("s1", "DEAL_DELIVERED", "D-2")).unwrap();

        let a = normalize_events(&wrapped, None).unwrap();
        let b = normalize_events(&single, None).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn probes_alternate_field_names() {
        let body = serde_json::to_vec(&json!([{
            "txSignature": "s9",
            "type": "deal-refunded",
            "deal_id": "D-3",
            "blockTime": 1_700_000_001,
        }]))
        .unwrap();
        let events = normalize_events(&body, None).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sig, "s9");
        assert_eq!(events[0].when, 1_700_000_001);
        assert_eq!(events[0].slot, 0);
        assert_eq!(
            events[0].effect,
            WebhookEffect::DealRefunded { deal_id: DealId::new("D-3").unwrap() }
        );
    }

    #[test]
    fn drops_entries_without_signature() {
        let body = serde_json::to_vec(&json!([
            {"type": "DEAL_FUNDED", "dealId": "D-1", "timestamp": 1},
            entry("s1", "DEAL_FUNDED", "D-1"),
        ]))
        .unwrap();
        let events = normalize_events(&body, None).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sig, "s1");
    }

    #[test]
    fn drops_unknown_type_codes() {
        let body = serde_json::to_vec(&json!([
            entry("s1", "NFT_SALE", "D-1"),
            entry("s2", "DEAL_DISPUTED", "D-1"),
        ]))
        .unwrap();
        let events = normalize_events(&body, None).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].effect,
            WebhookEffect::DealDisputed { deal_id: DealId::new("D-1").unwrap() }
        );
    }

    #[test]
    fn preserves_input_order_and_indices() {
        let body = serde_json::to_vec(&json!([
            entry("s1", "DEAL_FUNDED", "D-1"),
            entry("s2", "DEAL_DELIVERED", "D-1"),
        ]))
        .unwrap();
        let events = normalize_events(&body, Some("wh")).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, compute_webhook_id(Some("wh"), Some("s1"), Some(0)));
        assert_eq!(events[1].id, compute_webhook_id(Some("wh"), Some("s2"), Some(1)));
        assert_ne!(events[0].id, events[1].id);
    }

    #[test]
    fn indices_stay_stable_when_entries_drop() {
        // The second entry survives with its original index, not a compacted one.
        let body = serde_json::to_vec(&json!([
            {"type": "DEAL_FUNDED"},
            entry("s2", "DEAL_FUNDED", "D-1"),
        ]))
        .unwrap();
        let events = normalize_events(&body, Some("wh")).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, compute_webhook_id(Some("wh"), Some("s2"), Some(1)));
    }

    #[test]
    fn non_positive_timestamps_are_dropped() {
        let body = serde_json::to_vec(&json!([{
            "signature": "s1",
            "type": "DEAL_FUNDED",
            "dealId": "D-1",
            "timestamp": 0,
        }]))
        .unwrap();
        assert!(normalize_events(&body, None).unwrap().is_empty());
    }

    #[test]
    fn scalar_bodies_normalize_to_nothing() {
        assert!(normalize_events(b"42", None).unwrap().is_empty());
        assert!(normalize_events(b"\"hello\"", None).unwrap().is_empty());
    }
}

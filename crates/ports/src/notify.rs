//! Notification port: reviewer, parties, reminders.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use escrowd_core::{DealId, EscalationReason, ReminderAudience, ReminderReason, SuggestedAction};

use crate::error::PortError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(6);

/// Reminder sent to a deal party ahead of a deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderNote {
    pub deal_id: DealId,
    /// Unix seconds the reminder was emitted.
    pub when: i64,
    pub audience: ReminderAudience,
    pub reason: ReminderReason,
    /// Deadline context: `{deliveryBy, disputeUntil}`.
    pub context: serde_json::Value,
}

/// Operator-facing escalation notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewerNote {
    pub deal_id: DealId,
    pub reason: EscalationReason,
    pub suggested: SuggestedAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blink_url: Option<String>,
}

/// Notification to both deal parties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyNote {
    pub deal_id: DealId,
    /// Event tag, e.g. `finalize-prepared`.
    pub event: String,
    pub context: serde_json::Value,
}

/// Outbound notification transport.
///
/// Every method must be idempotent: the substrate deduplicates enqueues, but
/// a retried job re-sends, so the transport keys deliveries on a stable hash
/// of the payload.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_reviewer(&self, note: &ReviewerNote) -> Result<(), PortError>;
    async fn notify_parties(&self, note: &PartyNote) -> Result<(), PortError>;
    async fn send_reminder(&self, note: &ReminderNote) -> Result<(), PortError>;
}

/// Stable idempotency key: hex SHA-256 of the serialized payload.
fn idempotency_key<T: Serialize>(kind: &str, note: &T) -> String {
    let payload = serde_json::to_string(note).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update(b"|");
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

/// Discards everything; the default when no driver is configured.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify_reviewer(&self, note: &ReviewerNote) -> Result<(), PortError> {
        tracing::debug!(deal_id = %note.deal_id, suggested = %note.suggested, "noop reviewer notification");
        Ok(())
    }

    async fn notify_parties(&self, note: &PartyNote) -> Result<(), PortError> {
        tracing::debug!(deal_id = %note.deal_id, event = %note.event, "noop party notification");
        Ok(())
    }

    async fn send_reminder(&self, note: &ReminderNote) -> Result<(), PortError> {
        tracing::debug!(deal_id = %note.deal_id, reason = %note.reason, "noop reminder");
        Ok(())
    }
}

/// Dialect-backed notifier (`NOTIFY_DRIVER=dialect`).
///
/// No `Debug` impl: the struct holds the api key.
#[derive(Clone)]
pub struct DialectNotifier {
    client: reqwest::Client,
    base_url: String,
    key: String,
}

impl DialectNotifier {
    /// `base_url` must end with `/`; the key is never logged.
    pub fn new(base_url: impl Into<String>, key: impl Into<String>) -> Result<Self, PortError> {
        let base_url = base_url.into();
        if !base_url.ends_with('/') {
            return Err(PortError::Config(
                "NOTIFY_DIALECT_BASEURL must end with '/'".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PortError::Config(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            key: key.into(),
        })
    }

    async fn post<T: Serialize>(&self, path: &str, kind: &str, note: &T) -> Result<(), PortError> {
        let url = format!("{}{}", self.base_url, path);

        // Log the outbound payload with token/key fields scrubbed; the api
        // key itself only travels in the header.
        let mut logged = serde_json::to_value(note).unwrap_or_default();
        escrowd_observability::redact_context(&mut logged);
        tracing::debug!(url = %url, payload = %logged, "dispatching notification");

        self.client
            .post(&url)
            .header("x-dialect-api-key", &self.key)
            .header("x-idempotency-key", idempotency_key(kind, note))
            .json(note)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for DialectNotifier {
    async fn notify_reviewer(&self, note: &ReviewerNote) -> Result<(), PortError> {
        self.post("notify/reviewer", "reviewer", note).await
    }

    async fn notify_parties(&self, note: &PartyNote) -> Result<(), PortError> {
        self.post("notify/parties", "parties", note).await
    }

    async fn send_reminder(&self, note: &ReminderNote) -> Result<(), PortError> {
        self.post("notify/reminder", "reminder", note).await
    }
}

/// Records every notification; for tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub reviewer: Mutex<Vec<ReviewerNote>>,
    pub parties: Mutex<Vec<PartyNote>>,
    pub reminders: Mutex<Vec<ReminderNote>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reviewer_notes(&self) -> Vec<ReviewerNote> {
        self.reviewer.lock().unwrap().clone()
    }

    pub fn party_notes(&self) -> Vec<PartyNote> {
        self.parties.lock().unwrap().clone()
    }

    pub fn reminder_notes(&self) -> Vec<ReminderNote> {
        self.reminders.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_reviewer(&self, note: &ReviewerNote) -> Result<(), PortError> {
        self.reviewer.lock().unwrap().push(note.clone());
        Ok(())
    }

    async fn notify_parties(&self, note: &PartyNote) -> Result<(), PortError> {
        self.parties.lock().unwrap().push(note.clone());
        Ok(())
    }

    async fn send_reminder(&self, note: &ReminderNote) -> Result<(), PortError> {
        self.reminders.lock().unwrap().push(note.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_baseurl_must_end_with_slash() {
        assert!(DialectNotifier::new("https://dialect.test/api", "k").is_err());
        assert!(DialectNotifier::new("https://dialect.test/api/", "k").is_ok());
    }

    #[test]
    fn idempotency_key_is_stable_per_payload() {
        let note = PartyNote {
            deal_id: DealId::new("D-1").unwrap(),
            event: "finalize-prepared".into(),
            context: serde_json::json!({"action": "RELEASE"}),
        };
        let a = idempotency_key("parties", &note);
        let b = idempotency_key("parties", &note);
        assert_eq!(a, b);

        let mut other = note.clone();
        other.event = "finalize-failed".into();
        assert_ne!(a, idempotency_key("parties", &other));

        // Same payload through a different channel keys differently.
        assert_ne!(a, idempotency_key("reviewer", &note));
    }
}

//! Normalized webhook events and their effect sum.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::DealId;

/// The closed set of effects a provider event can have on a deal.
///
/// Exhaustiveness is checked at the router dispatch site; adding a variant
/// here without a router case must fail to compile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum WebhookEffect {
    DealFunded { deal_id: DealId },
    DealDelivered { deal_id: DealId },
    DealDisputed { deal_id: DealId },
    DealReleased { deal_id: DealId },
    DealRefunded { deal_id: DealId },
}

impl WebhookEffect {
    pub fn deal_id(&self) -> &DealId {
        match self {
            Self::DealFunded { deal_id }
            | Self::DealDelivered { deal_id }
            | Self::DealDisputed { deal_id }
            | Self::DealReleased { deal_id }
            | Self::DealRefunded { deal_id } => deal_id,
        }
    }
}

/// A provider webhook entry after verification and normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEvent {
    /// Replay-suppression digest, see [`crate::identity::compute_webhook_id`].
    pub id: String,
    /// Transaction signature the entry was extracted from.
    pub sig: String,
    pub slot: u64,
    /// Unix seconds the transaction landed.
    pub when: i64,
    #[serde(flatten)]
    pub effect: WebhookEffect,
}

impl NormalizedEvent {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.id.len() != 64 || !self.id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::validation("event id must be a sha-256 hex digest"));
        }
        if self.sig.is_empty() {
            return Err(DomainError::validation("event sig must not be empty"));
        }
        if self.when <= 0 {
            return Err(DomainError::validation(format!(
                "event timestamp must be positive, got {}",
                self.when
            )));
        }
        Ok(())
    }
}

//! Deal snapshot: the read-only view of an escrow consumed by processors.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::DealId;

/// Deal lifecycle state as reported by the deals API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DealState {
    Init,
    Funded,
    Delivered,
    Disputed,
    Resolved,
    Released,
    Refunded,
}

impl DealState {
    /// Terminal states suppress all scheduled work for the deal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Released | Self::Refunded)
    }
}

/// Read-only snapshot of a deal at a point in time.
///
/// Processors never cache snapshots: every timer firing fetches a fresh one,
/// and all decisions are functions of `(payload, snapshot, now, policy)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealSnapshot {
    pub id: DealId,
    pub state: DealState,
    /// Unix-seconds deadline for delivery confirmation, if one is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_by: Option<i64>,
    /// Unix-seconds close of the dispute window, if one is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispute_until: Option<i64>,
}

impl DealSnapshot {
    /// Validate snapshot invariants: timestamps are positive unix seconds.
    pub fn validate(&self) -> Result<(), DomainError> {
        for (name, ts) in [
            ("deliveryBy", self.delivery_by),
            ("disputeUntil", self.dispute_until),
        ] {
            if let Some(ts) = ts {
                if ts <= 0 {
                    return Err(DomainError::validation(format!(
                        "{name} must be a positive unix timestamp, got {ts}"
                    )));
                }
            }
        }
        Ok(())
    }
}

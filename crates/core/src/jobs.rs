//! Timer job payloads and their deterministic identities.
//!
//! The identity string is the sole dedup key for a pending job, so the wire
//! tokens below (`delivery`, `deadline-upcoming`, `RELEASE`, ...) are part of
//! the persistence format. Any change to token spelling or identity
//! composition is a breaking change.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::DealId;

/// Which deadline a deadline job guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeadlineKind {
    Delivery,
    Dispute,
}

impl DeadlineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivery => "delivery",
            Self::Dispute => "dispute",
        }
    }
}

impl core::fmt::Display for DeadlineKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a reminder addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderAudience {
    Buyer,
    Seller,
    Both,
}

impl ReminderAudience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Seller => "seller",
            Self::Both => "both",
        }
    }
}

impl core::fmt::Display for ReminderAudience {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a reminder fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReminderReason {
    DeadlineUpcoming,
    DisputeWindowClosing,
}

impl ReminderReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeadlineUpcoming => "deadline-upcoming",
            Self::DisputeWindowClosing => "dispute-window-closing",
        }
    }
}

impl core::fmt::Display for ReminderReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an escalation was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EscalationReason {
    DeadlineExpired,
    NoAck,
    NoDelivery,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeadlineExpired => "deadline-expired",
            Self::NoAck => "no-ack",
            Self::NoDelivery => "no-delivery",
        }
    }
}

impl core::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action an escalation suggests to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SuggestedAction {
    Release,
    Refund,
    Review,
}

impl SuggestedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Release => "RELEASE",
            Self::Refund => "REFUND",
            Self::Review => "REVIEW",
        }
    }

    /// Whether this suggestion would finalize funds (and therefore needs the
    /// policy gate's consent).
    pub fn is_finalize(&self) -> bool {
        matches!(self, Self::Release | Self::Refund)
    }
}

impl core::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a deadline timer.
///
/// `nonce` lets a producer supersede an earlier schedule for the same
/// deadline deterministically: the engine bumps it on reschedule after
/// cancelling the prior identities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadlineJob {
    pub deal_id: DealId,
    /// Unix seconds at which the deadline elapses.
    pub deadline_at: i64,
    pub kind: DeadlineKind,
    #[serde(default)]
    pub nonce: u32,
}

impl DeadlineJob {
    /// `deadline:<dealId>:<deadlineAt>:<kind>:<nonce>`
    pub fn job_id(&self) -> String {
        format!(
            "deadline:{}:{}:{}:{}",
            self.deal_id, self.deadline_at, self.kind, self.nonce
        )
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.deadline_at <= 0 {
            return Err(DomainError::validation(format!(
                "deadlineAt must be a positive unix timestamp, got {}",
                self.deadline_at
            )));
        }
        Ok(())
    }
}

/// Payload of a reminder timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderJob {
    pub deal_id: DealId,
    /// Unix seconds at which the reminder should be sent.
    pub notify_at: i64,
    pub audience: ReminderAudience,
    pub reason: ReminderReason,
}

impl ReminderJob {
    /// `reminder:<dealId>:<notifyAt>:<audience>:<reason>`
    pub fn job_id(&self) -> String {
        format!(
            "reminder:{}:{}:{}:{}",
            self.deal_id, self.notify_at, self.audience, self.reason
        )
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.notify_at <= 0 {
            return Err(DomainError::validation(format!(
                "notifyAt must be a positive unix timestamp, got {}",
                self.notify_at
            )));
        }
        Ok(())
    }
}

/// Payload of an escalation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationJob {
    pub deal_id: DealId,
    pub reason: EscalationReason,
    pub suggested: SuggestedAction,
}

impl EscalationJob {
    /// `escalation:<dealId>:<reason>:<suggested>`
    pub fn job_id(&self) -> String {
        format!(
            "escalation:{}:{}:{}",
            self.deal_id, self.reason, self.suggested
        )
    }
}

/// Identity prefix shared by every job of a deal in a given family.
///
/// Used by the terminal-state sweep and by nonce supersession to find all
/// pending timers belonging to one deal.
pub fn deal_prefix(family: &str, deal_id: &DealId) -> String {
    format!("{family}:{deal_id}:")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deal(id: &str) -> DealId {
        DealId::new(id).unwrap()
    }

    #[test]
    fn deadline_identity_matches_wire_format() {
        let job = DeadlineJob {
            deal_id: deal("D-123"),
            deadline_at: 1_700_000_000,
            kind: DeadlineKind::Delivery,
            nonce: 1,
        };
        assert_eq!(job.job_id(), "deadline:D-123:1700000000:delivery:1");
    }

    #[test]
    fn reminder_identity_matches_wire_format() {
        let job = ReminderJob {
            deal_id: deal("D-123"),
            notify_at: 1_700_000_000,
            audience: ReminderAudience::Seller,
            reason: ReminderReason::DeadlineUpcoming,
        };
        assert_eq!(
            job.job_id(),
            "reminder:D-123:1700000000:seller:deadline-upcoming"
        );
    }

    #[test]
    fn escalation_identity_matches_wire_format() {
        let job = EscalationJob {
            deal_id: deal("D-123"),
            reason: EscalationReason::NoDelivery,
            suggested: SuggestedAction::Review,
        };
        assert_eq!(job.job_id(), "escalation:D-123:no-delivery:REVIEW");
    }

    #[test]
    fn identity_changes_with_every_field() {
        let base = DeadlineJob {
            deal_id: deal("D-1"),
            deadline_at: 100,
            kind: DeadlineKind::Delivery,
            nonce: 0,
        };
        let mut other = base.clone();
        other.deadline_at = 101;
        assert_ne!(base.job_id(), other.job_id());

        let mut other = base.clone();
        other.kind = DeadlineKind::Dispute;
        assert_ne!(base.job_id(), other.job_id());

        let mut other = base.clone();
        other.nonce = 1;
        assert_ne!(base.job_id(), other.job_id());

        let mut other = base.clone();
        other.deal_id = deal("D-2");
        assert_ne!(base.job_id(), other.job_id());
    }

    #[test]
    fn identity_is_deterministic_for_equal_payloads() {
        let a = EscalationJob {
            deal_id: deal("D-42"),
            reason: EscalationReason::DeadlineExpired,
            suggested: SuggestedAction::Release,
        };
        let b = a.clone();
        assert_eq!(a.job_id(), b.job_id());
        assert_eq!(a.job_id(), "escalation:D-42:deadline-expired:RELEASE");
    }

    #[test]
    fn payloads_round_trip_with_camel_case_keys() {
        let job = DeadlineJob {
            deal_id: deal("D-1"),
            deadline_at: 42,
            kind: DeadlineKind::Dispute,
            nonce: 2,
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["dealId"], "D-1");
        assert_eq!(json["deadlineAt"], 42);
        assert_eq!(json["kind"], "dispute");
        let back: DeadlineJob = serde_json::from_value(json).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn nonce_defaults_to_zero() {
        let job: DeadlineJob = serde_json::from_value(serde_json::json!({
            "dealId": "D-1",
            "deadlineAt": 7,
            "kind": "delivery",
        }))
        .unwrap();
        assert_eq!(job.nonce, 0);
    }

    #[test]
    fn deal_prefix_covers_family() {
        let id = deal("D-9");
        assert_eq!(deal_prefix("deadline", &id), "deadline:D-9:");
        let job = DeadlineJob {
            deal_id: id.clone(),
            deadline_at: 5,
            kind: DeadlineKind::Delivery,
            nonce: 0,
        };
        assert!(job.job_id().starts_with(&deal_prefix("deadline", &id)));
    }
}

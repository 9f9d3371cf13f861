//! The scheduling engine: event-derived timer emission and cancellation.
//!
//! The engine owns the timer set for each deal. Every emission goes through
//! the identity-keyed `add` of the substrate, so re-applying the same event
//! against the same snapshot is a no-op.

use std::sync::Arc;

use escrowd_core::{
    jobs::deal_prefix, DeadlineJob, DeadlineKind, DealId, DealSnapshot, DomainError, ReminderAudience,
    ReminderJob, ReminderReason, WebhookEffect,
};
use escrowd_queue::{AddOptions, DelayedJobStore, QueueError, QueueName};

/// Reminder lead before a delivery deadline.
pub const DELIVERY_REMINDER_LEAD_SECS: i64 = 24 * 3600;
/// Reminder lead before the dispute window closes.
pub const DISPUTE_REMINDER_LEAD_SECS: i64 = 2 * 3600;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// What a scheduling call did, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleOutcome {
    pub scheduled: usize,
    pub cancelled: usize,
}

/// Milliseconds until `target` (unix seconds), floored at zero so past
/// targets fire immediately rather than producing a negative delay.
pub fn delay_ms_until(target: i64, now: i64) -> u64 {
    (target - now).max(0) as u64 * 1000
}

pub struct SchedulingEngine {
    store: Arc<dyn DelayedJobStore>,
}

impl SchedulingEngine {
    pub fn new(store: Arc<dyn DelayedJobStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DelayedJobStore> {
        &self.store
    }

    /// React to a normalized webhook effect given a fresh deal snapshot.
    ///
    /// This is the exhaustive dispatch site for the effect sum: adding a
    /// variant to [`WebhookEffect`] must fail to compile here until a case
    /// is written for it.
    pub fn apply_event(
        &self,
        effect: &WebhookEffect,
        snapshot: &DealSnapshot,
        now: i64,
    ) -> Result<ScheduleOutcome, EngineError> {
        snapshot.validate()?;

        // A terminal snapshot suppresses all scheduled work, whatever the
        // event that brought it in.
        if snapshot.state.is_terminal() {
            let cancelled = self.cancel_all_for_deal(&snapshot.id)?;
            return Ok(ScheduleOutcome {
                scheduled: 0,
                cancelled,
            });
        }

        match effect {
            WebhookEffect::DealFunded { .. } => self.schedule_delivery_timers(snapshot, now),
            WebhookEffect::DealDelivered { .. } => self.schedule_dispute_timers(snapshot, now),
            WebhookEffect::DealDisputed { .. }
            | WebhookEffect::DealReleased { .. }
            | WebhookEffect::DealRefunded { .. } => Ok(ScheduleOutcome::default()),
        }
    }

    /// On funding: delivery deadline at `deliveryBy`, reminder 24h ahead.
    pub fn schedule_delivery_timers(
        &self,
        snapshot: &DealSnapshot,
        now: i64,
    ) -> Result<ScheduleOutcome, EngineError> {
        let Some(delivery_by) = snapshot.delivery_by else {
            return Ok(ScheduleOutcome::default());
        };
        if delivery_by <= now {
            return Ok(ScheduleOutcome::default());
        }

        let mut outcome = ScheduleOutcome::default();
        let (nonce, superseded) =
            self.supersede_deadlines(&snapshot.id, DeadlineKind::Delivery, delivery_by)?;
        outcome.cancelled += superseded;

        let deadline = DeadlineJob {
            deal_id: snapshot.id.clone(),
            deadline_at: delivery_by,
            kind: DeadlineKind::Delivery,
            nonce,
        };
        outcome.scheduled += self.add_deadline(&deadline, now)?;

        let notify_at = delivery_by - DELIVERY_REMINDER_LEAD_SECS;
        if notify_at > now {
            let reminder = ReminderJob {
                deal_id: snapshot.id.clone(),
                notify_at,
                audience: ReminderAudience::Seller,
                reason: ReminderReason::DeadlineUpcoming,
            };
            outcome.scheduled += self.add_reminder(&reminder, now)?;
        }
        Ok(outcome)
    }

    /// On delivery: dispute deadline at `disputeUntil`, reminder 2h ahead.
    pub fn schedule_dispute_timers(
        &self,
        snapshot: &DealSnapshot,
        now: i64,
    ) -> Result<ScheduleOutcome, EngineError> {
        let Some(dispute_until) = snapshot.dispute_until else {
            return Ok(ScheduleOutcome::default());
        };
        if dispute_until <= now {
            return Ok(ScheduleOutcome::default());
        }

        let mut outcome = ScheduleOutcome::default();
        let (nonce, superseded) =
            self.supersede_deadlines(&snapshot.id, DeadlineKind::Dispute, dispute_until)?;
        outcome.cancelled += superseded;

        let deadline = DeadlineJob {
            deal_id: snapshot.id.clone(),
            deadline_at: dispute_until,
            kind: DeadlineKind::Dispute,
            nonce,
        };
        outcome.scheduled += self.add_deadline(&deadline, now)?;

        let notify_at = dispute_until - DISPUTE_REMINDER_LEAD_SECS;
        if notify_at > now {
            let reminder = ReminderJob {
                deal_id: snapshot.id.clone(),
                notify_at,
                audience: ReminderAudience::Buyer,
                reason: ReminderReason::DisputeWindowClosing,
            };
            outcome.scheduled += self.add_reminder(&reminder, now)?;
        }
        Ok(outcome)
    }

    /// Cancel every pending timer whose identity prefix names the deal.
    pub fn cancel_all_for_deal(&self, deal_id: &DealId) -> Result<usize, EngineError> {
        let mut cancelled = 0;
        for (queue, family) in [
            (QueueName::Deadlines, "deadline"),
            (QueueName::Reminders, "reminder"),
            (QueueName::Escalation, "escalation"),
        ] {
            let prefix = deal_prefix(family, deal_id);
            for id in self.store.pending_ids(queue, &prefix)? {
                if self.store.cancel(queue, &id)? {
                    cancelled += 1;
                }
            }
        }
        if cancelled > 0 {
            tracing::info!(deal_id = %deal_id, cancelled, "cancelled timers for terminal deal");
        }
        Ok(cancelled)
    }

    /// Cancel pending deadlines of `kind` for the deal whose fire time
    /// differs from `target_at`, and return the nonce the new timer must
    /// carry. A pending deadline at the same time keeps its nonce, so
    /// re-emitting the identical logical timer deduplicates instead of
    /// superseding; a moved deadline gets one past the highest cancelled
    /// nonce.
    fn supersede_deadlines(
        &self,
        deal_id: &DealId,
        kind: DeadlineKind,
        target_at: i64,
    ) -> Result<(u32, usize), EngineError> {
        let prefix = deal_prefix("deadline", deal_id);
        let mut next_nonce = 0u32;
        let mut keep_nonce = None;
        let mut cancelled = 0;

        for id in self.store.pending_ids(QueueName::Deadlines, &prefix)? {
            let Some((at, id_kind, nonce)) = parse_deadline_id(&id) else {
                continue;
            };
            if id_kind != kind.as_str() {
                continue;
            }
            if at == target_at {
                keep_nonce = Some(nonce);
                continue;
            }
            if self.store.cancel(QueueName::Deadlines, &id)? {
                cancelled += 1;
                next_nonce = next_nonce.max(nonce.saturating_add(1));
            }
        }
        Ok((keep_nonce.unwrap_or(next_nonce), cancelled))
    }

    fn add_deadline(&self, job: &DeadlineJob, now: i64) -> Result<usize, EngineError> {
        job.validate()?;
        let payload = serde_json::to_value(job)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;
        let opts = AddOptions::new(job.job_id())
            .with_delay_ms(delay_ms_until(job.deadline_at, now));
        let outcome = self.store.add(QueueName::Deadlines, &payload, &opts)?;
        tracing::debug!(job_id = %job.job_id(), ?outcome, "deadline scheduled");
        Ok(usize::from(outcome == escrowd_queue::AddOutcome::Enqueued))
    }

    fn add_reminder(&self, job: &ReminderJob, now: i64) -> Result<usize, EngineError> {
        job.validate()?;
        let payload = serde_json::to_value(job)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;
        let opts =
            AddOptions::new(job.job_id()).with_delay_ms(delay_ms_until(job.notify_at, now));
        let outcome = self.store.add(QueueName::Reminders, &payload, &opts)?;
        tracing::debug!(job_id = %job.job_id(), ?outcome, "reminder scheduled");
        Ok(usize::from(outcome == escrowd_queue::AddOutcome::Enqueued))
    }
}

/// Parse `(at, kind, nonce)` out of `deadline:<dealId>:<at>:<kind>:<nonce>`.
///
/// Deal ids cannot contain `:`, so a plain split is unambiguous.
fn parse_deadline_id(id: &str) -> Option<(i64, &str, u32)> {
    let mut parts = id.split(':');
    if parts.next()? != "deadline" {
        return None;
    }
    let _deal = parts.next()?;
    let at: i64 = parts.next()?.parse().ok()?;
    let kind = parts.next()?;
    let nonce: u32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((at, kind, nonce))
}

//! Full-plan scheduling: enumerate a deal's complete timer set in one call.
//!
//! Deployment profiles that cannot react to individual events (e.g. a
//! backfill or a poll-driven profile) compute the whole plan from a single
//! snapshot. The plan reuses the same payload types and identity functions
//! as the event-derived path, so both modes converge on identical job ids
//! and re-invocation stays idempotent.

use escrowd_core::{
    DeadlineJob, DeadlineKind, DealSnapshot, EscalationJob, EscalationReason, ReminderAudience,
    ReminderJob, ReminderReason, SuggestedAction,
};
use escrowd_queue::{AddOptions, QueueName};

use crate::scheduler::{delay_ms_until, EngineError, ScheduleOutcome, SchedulingEngine};

/// Configuration for full-plan enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanConfig {
    /// Reminder offsets in minutes before the delivery deadline.
    pub reminder_offsets_min: Vec<u32>,
    /// Dispute window appended after the delivery deadline; the plan's
    /// escalation fires when it closes without an acknowledgement.
    pub dispute_window_secs: i64,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            reminder_offsets_min: vec![24 * 60],
            dispute_window_secs: 48 * 3600,
        }
    }
}

/// An escalation with the wall-clock time it should fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEscalation {
    pub job: EscalationJob,
    pub at: i64,
}

/// The complete timer set for one deal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerPlan {
    pub deadline: Option<DeadlineJob>,
    pub reminders: Vec<ReminderJob>,
    pub escalation: Option<PlannedEscalation>,
}

impl TimerPlan {
    /// Enumerate the plan for a snapshot. Terminal deals and deals without
    /// a delivery deadline plan nothing; reminder offsets already in the
    /// past are skipped.
    pub fn for_snapshot(snapshot: &DealSnapshot, config: &PlanConfig, now: i64) -> Self {
        if snapshot.state.is_terminal() {
            return Self::default();
        }
        let Some(delivery_by) = snapshot.delivery_by else {
            return Self::default();
        };
        if delivery_by <= now {
            return Self::default();
        }

        let deadline = DeadlineJob {
            deal_id: snapshot.id.clone(),
            deadline_at: delivery_by,
            kind: DeadlineKind::Delivery,
            nonce: 0,
        };

        let mut reminders = Vec::new();
        for offset_min in &config.reminder_offsets_min {
            let notify_at = delivery_by - i64::from(*offset_min) * 60;
            if notify_at <= now {
                continue;
            }
            reminders.push(ReminderJob {
                deal_id: snapshot.id.clone(),
                notify_at,
                audience: ReminderAudience::Seller,
                reason: ReminderReason::DeadlineUpcoming,
            });
        }

        let escalation = PlannedEscalation {
            job: EscalationJob {
                deal_id: snapshot.id.clone(),
                reason: EscalationReason::NoAck,
                suggested: SuggestedAction::Review,
            },
            at: delivery_by + config.dispute_window_secs,
        };

        Self {
            deadline: Some(deadline),
            reminders,
            escalation: Some(escalation),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.deadline.is_none() && self.reminders.is_empty() && self.escalation.is_none()
    }
}

impl SchedulingEngine {
    /// Schedule a deal's full timer plan. Deadline supersession applies the
    /// same nonce rule as the event-derived path, so the two modes emit
    /// identical identities for identical logical timers.
    pub fn schedule_plan(
        &self,
        snapshot: &DealSnapshot,
        config: &PlanConfig,
        now: i64,
    ) -> Result<ScheduleOutcome, EngineError> {
        snapshot.validate()?;

        if snapshot.state.is_terminal() {
            let cancelled = self.cancel_all_for_deal(&snapshot.id)?;
            return Ok(ScheduleOutcome {
                scheduled: 0,
                cancelled,
            });
        }

        let plan = TimerPlan::for_snapshot(snapshot, config, now);
        let mut outcome = ScheduleOutcome::default();

        if let Some(deadline) = plan.deadline {
            outcome = self.schedule_delivery_timers(
                &DealSnapshot {
                    delivery_by: Some(deadline.deadline_at),
                    ..snapshot.clone()
                },
                now,
            )?;
        }

        // The 24h reminder is already covered by the delivery path; add the
        // remaining configured offsets.
        for reminder in &plan.reminders {
            let payload = serde_json::to_value(reminder)
                .map_err(|e| escrowd_queue::QueueError::Serialization(e.to_string()))?;
            let opts = AddOptions::new(reminder.job_id())
                .with_delay_ms(delay_ms_until(reminder.notify_at, now));
            if self.store().add(QueueName::Reminders, &payload, &opts)?
                == escrowd_queue::AddOutcome::Enqueued
            {
                outcome.scheduled += 1;
            }
        }

        if let Some(escalation) = &plan.escalation {
            let payload = serde_json::to_value(&escalation.job)
                .map_err(|e| escrowd_queue::QueueError::Serialization(e.to_string()))?;
            let opts = AddOptions::new(escalation.job.job_id())
                .with_delay_ms(delay_ms_until(escalation.at, now));
            if self.store().add(QueueName::Escalation, &payload, &opts)?
                == escrowd_queue::AddOutcome::Enqueued
            {
                outcome.scheduled += 1;
            }
        }

        Ok(outcome)
    }
}

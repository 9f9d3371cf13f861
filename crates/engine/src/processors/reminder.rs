//! Reminder processor: gate-and-send notifications ahead of deadlines.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use escrowd_core::{ReminderJob, ReminderReason};
use escrowd_ports::{DealApi, Notifier, ReminderNote};
use escrowd_queue::{QueueJob, QueueName};

use super::{decode_payload, JobProcessor, ProcessAction, ProcessOutcome, ProcessorError};

pub struct ReminderProcessor {
    api: Arc<dyn DealApi>,
    notifier: Arc<dyn Notifier>,
}

impl ReminderProcessor {
    pub fn new(api: Arc<dyn DealApi>, notifier: Arc<dyn Notifier>) -> Self {
        Self { api, notifier }
    }
}

#[async_trait]
impl JobProcessor for ReminderProcessor {
    fn queue(&self) -> QueueName {
        QueueName::Reminders
    }

    async fn process(&self, job: &QueueJob) -> Result<ProcessOutcome, ProcessorError> {
        let payload: ReminderJob = decode_payload(job)?;
        payload.validate()?;

        let snapshot = self.api.get_deal_snapshot(&payload.deal_id).await?;
        let now = Utc::now().timestamp();

        // A reminder that arrives after its deadline, or for a settled deal,
        // would only confuse the recipient.
        let stale = match payload.reason {
            ReminderReason::DeadlineUpcoming => {
                matches!(snapshot.delivery_by, Some(by) if now >= by)
            }
            ReminderReason::DisputeWindowClosing => {
                matches!(snapshot.dispute_until, Some(until) if now >= until)
            }
        };
        if snapshot.state.is_terminal() || stale {
            tracing::debug!(
                deal_id = %payload.deal_id,
                reason = %payload.reason,
                state = ?snapshot.state,
                "reminder suppressed"
            );
            return Ok(ProcessOutcome::noop(payload.deal_id));
        }

        self.notifier
            .send_reminder(&ReminderNote {
                deal_id: payload.deal_id.clone(),
                when: now,
                audience: payload.audience,
                reason: payload.reason,
                context: serde_json::json!({
                    "deliveryBy": snapshot.delivery_by,
                    "disputeUntil": snapshot.dispute_until,
                }),
            })
            .await?;

        tracing::info!(
            deal_id = %payload.deal_id,
            audience = %payload.audience,
            reason = %payload.reason,
            "reminder sent"
        );
        Ok(ProcessOutcome {
            action: ProcessAction::Sent,
            deal_id: payload.deal_id,
            reason: None,
            suggested: None,
        })
    }
}

//! Escalation processor: prepare finalize or route to a human reviewer.

use std::sync::Arc;

use async_trait::async_trait;

use escrowd_core::{EscalationJob, FinalizePolicy, SuggestedAction};
use escrowd_ports::{DealApi, FinalizePrepared, Notifier, PartyNote, ReviewerNote};
use escrowd_queue::{QueueJob, QueueName};

use super::{decode_payload, JobProcessor, ProcessAction, ProcessOutcome, ProcessorError};

pub struct EscalationProcessor {
    api: Arc<dyn DealApi>,
    notifier: Arc<dyn Notifier>,
    policy: FinalizePolicy,
}

impl EscalationProcessor {
    pub fn new(api: Arc<dyn DealApi>, notifier: Arc<dyn Notifier>, policy: FinalizePolicy) -> Self {
        Self {
            api,
            notifier,
            policy,
        }
    }
}

#[async_trait]
impl JobProcessor for EscalationProcessor {
    fn queue(&self) -> QueueName {
        QueueName::Escalation
    }

    async fn process(&self, job: &QueueJob) -> Result<ProcessOutcome, ProcessorError> {
        let payload: EscalationJob = decode_payload(job)?;

        let mut prepared: Option<FinalizePrepared> = None;
        if payload.suggested.is_finalize() && self.policy.allows_auto_finalize(payload.suggested) {
            // A failed preparation downgrades to review rather than retrying:
            // the reviewer must hear about the escalation either way.
            match self
                .api
                .prepare_finalize(&payload.deal_id, payload.suggested)
                .await
            {
                Ok(urls) => prepared = Some(urls),
                Err(err) => {
                    tracing::warn!(
                        deal_id = %payload.deal_id,
                        action = %payload.suggested,
                        error = %err,
                        "finalize preparation failed, routing to review"
                    );
                }
            }
        }

        if let Some(urls) = prepared {
            self.notifier
                .notify_reviewer(&ReviewerNote {
                    deal_id: payload.deal_id.clone(),
                    reason: payload.reason,
                    suggested: payload.suggested,
                    approval_url: urls.approval_url.clone(),
                    blink_url: urls.blink_url.clone(),
                })
                .await?;
            self.notifier
                .notify_parties(&PartyNote {
                    deal_id: payload.deal_id.clone(),
                    event: "finalize-prepared".to_string(),
                    context: serde_json::json!({
                        "action": payload.suggested,
                        "approvalUrl": urls.approval_url,
                    }),
                })
                .await?;

            tracing::info!(
                deal_id = %payload.deal_id,
                action = %payload.suggested,
                "finalize prepared"
            );
            return Ok(ProcessOutcome {
                action: ProcessAction::Prepared,
                deal_id: payload.deal_id,
                reason: Some(payload.reason),
                suggested: Some(payload.suggested),
            });
        }

        self.notifier
            .notify_reviewer(&ReviewerNote {
                deal_id: payload.deal_id.clone(),
                reason: payload.reason,
                suggested: SuggestedAction::Review,
                approval_url: None,
                blink_url: None,
            })
            .await?;

        tracing::info!(deal_id = %payload.deal_id, reason = %payload.reason, "escalation routed to review");
        Ok(ProcessOutcome {
            action: ProcessAction::Review,
            deal_id: payload.deal_id,
            reason: Some(payload.reason),
            suggested: Some(SuggestedAction::Review),
        })
    }
}

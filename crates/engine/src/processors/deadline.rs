//! Deadline processor: decide noop/escalate when a deadline fires.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use escrowd_core::{
    DeadlineJob, DeadlineKind, DealState, EscalationJob, EscalationReason, FinalizePolicy,
    SuggestedAction,
};
use escrowd_ports::{DealApi, Notifier, ReviewerNote};
use escrowd_queue::{AddOptions, DelayedJobStore, QueueJob, QueueName};

use super::{decode_payload, JobProcessor, ProcessAction, ProcessOutcome, ProcessorError};

/// Pure decision for a fired deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineDecision {
    Noop,
    Escalate {
        reason: EscalationReason,
        suggested: SuggestedAction,
    },
}

/// The deadline decision table.
///
/// | kind     | state                                  | elapsed | decision                        |
/// |----------|----------------------------------------|---------|---------------------------------|
/// | delivery | DELIVERED/RELEASED/REFUNDED/RESOLVED   | —       | noop                            |
/// | delivery | other                                  | no      | noop                            |
/// | delivery | other                                  | yes     | escalate no-delivery, REVIEW    |
/// | dispute  | RESOLVED/RELEASED/REFUNDED             | —       | noop                            |
/// | dispute  | other                                  | no      | noop                            |
/// | dispute  | FUNDED/DELIVERED                       | yes     | escalate deadline-expired, RELEASE |
/// | dispute  | other                                  | yes     | escalate deadline-expired, REVIEW  |
pub fn decide(kind: DeadlineKind, state: DealState, elapsed: bool) -> DeadlineDecision {
    match kind {
        DeadlineKind::Delivery => match state {
            DealState::Delivered
            | DealState::Released
            | DealState::Refunded
            | DealState::Resolved => DeadlineDecision::Noop,
            _ if !elapsed => DeadlineDecision::Noop,
            _ => DeadlineDecision::Escalate {
                reason: EscalationReason::NoDelivery,
                suggested: SuggestedAction::Review,
            },
        },
        DeadlineKind::Dispute => match state {
            DealState::Resolved | DealState::Released | DealState::Refunded => {
                DeadlineDecision::Noop
            }
            _ if !elapsed => DeadlineDecision::Noop,
            DealState::Funded | DealState::Delivered => DeadlineDecision::Escalate {
                reason: EscalationReason::DeadlineExpired,
                suggested: SuggestedAction::Release,
            },
            _ => DeadlineDecision::Escalate {
                reason: EscalationReason::DeadlineExpired,
                suggested: SuggestedAction::Review,
            },
        },
    }
}

pub struct DeadlineProcessor {
    store: Arc<dyn DelayedJobStore>,
    api: Arc<dyn DealApi>,
    notifier: Arc<dyn Notifier>,
    policy: FinalizePolicy,
}

impl DeadlineProcessor {
    pub fn new(
        store: Arc<dyn DelayedJobStore>,
        api: Arc<dyn DealApi>,
        notifier: Arc<dyn Notifier>,
        policy: FinalizePolicy,
    ) -> Self {
        Self {
            store,
            api,
            notifier,
            policy,
        }
    }
}

#[async_trait]
impl JobProcessor for DeadlineProcessor {
    fn queue(&self) -> QueueName {
        QueueName::Deadlines
    }

    async fn process(&self, job: &QueueJob) -> Result<ProcessOutcome, ProcessorError> {
        let payload: DeadlineJob = decode_payload(job)?;
        payload.validate()?;

        let snapshot = self.api.get_deal_snapshot(&payload.deal_id).await?;
        let now = Utc::now().timestamp();
        let elapsed = now >= payload.deadline_at;

        let decision = decide(payload.kind, snapshot.state, elapsed);
        let DeadlineDecision::Escalate { reason, mut suggested } = decision else {
            tracing::debug!(deal_id = %payload.deal_id, kind = %payload.kind, "deadline noop");
            return Ok(ProcessOutcome::noop(payload.deal_id));
        };

        if suggested.is_finalize() && !self.policy.allows_auto_finalize(suggested) {
            tracing::info!(
                deal_id = %payload.deal_id,
                from = %suggested,
                "policy disallows auto-finalize, downgrading to REVIEW"
            );
            suggested = SuggestedAction::Review;
        }

        let escalation = EscalationJob {
            deal_id: payload.deal_id.clone(),
            reason,
            suggested,
        };
        let escalation_payload = serde_json::to_value(&escalation)
            .map_err(|e| escrowd_queue::QueueError::Serialization(e.to_string()))?;
        self.store.add(
            QueueName::Escalation,
            &escalation_payload,
            &AddOptions::new(escalation.job_id()),
        )?;

        if suggested == SuggestedAction::Review {
            self.notifier
                .notify_reviewer(&ReviewerNote {
                    deal_id: payload.deal_id.clone(),
                    reason,
                    suggested,
                    approval_url: None,
                    blink_url: None,
                })
                .await?;
        }

        tracing::info!(
            deal_id = %payload.deal_id,
            reason = %reason,
            suggested = %suggested,
            "deadline escalated"
        );
        Ok(ProcessOutcome {
            action: ProcessAction::Escalate,
            deal_id: payload.deal_id,
            reason: Some(reason),
            suggested: Some(suggested),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrowd_core::{DealId, DealSnapshot};
    use escrowd_ports::{InMemoryDealApi, RecordingNotifier};
    use escrowd_queue::InMemoryJobStore;

    fn processor(
        policy: FinalizePolicy,
    ) -> (
        DeadlineProcessor,
        Arc<InMemoryJobStore>,
        Arc<InMemoryDealApi>,
        Arc<RecordingNotifier>,
    ) {
        let store = Arc::new(InMemoryJobStore::new());
        let api = Arc::new(InMemoryDealApi::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let processor =
            DeadlineProcessor::new(store.clone(), api.clone(), notifier.clone(), policy);
        (processor, store, api, notifier)
    }

    fn fired_job(payload: &DeadlineJob) -> QueueJob {
        QueueJob::new(
            QueueName::Deadlines,
            serde_json::to_value(payload).unwrap(),
            &AddOptions::new(payload.job_id()),
            Utc::now(),
        )
    }

    #[test]
    fn decision_table_covers_all_rows() {
        use DealState::*;

        // Delivery deadlines.
        for state in [Delivered, Released, Refunded, Resolved] {
            assert_eq!(decide(DeadlineKind::Delivery, state, true), DeadlineDecision::Noop);
        }
        assert_eq!(decide(DeadlineKind::Delivery, Funded, false), DeadlineDecision::Noop);
        assert_eq!(
            decide(DeadlineKind::Delivery, Funded, true),
            DeadlineDecision::Escalate {
                reason: EscalationReason::NoDelivery,
                suggested: SuggestedAction::Review,
            }
        );

        // Dispute deadlines.
        for state in [Resolved, Released, Refunded] {
            assert_eq!(decide(DeadlineKind::Dispute, state, true), DeadlineDecision::Noop);
        }
        assert_eq!(decide(DeadlineKind::Dispute, Funded, false), DeadlineDecision::Noop);
        for state in [Funded, Delivered] {
            assert_eq!(
                decide(DeadlineKind::Dispute, state, true),
                DeadlineDecision::Escalate {
                    reason: EscalationReason::DeadlineExpired,
                    suggested: SuggestedAction::Release,
                }
            );
        }
        for state in [Init, Disputed] {
            assert_eq!(
                decide(DeadlineKind::Dispute, state, true),
                DeadlineDecision::Escalate {
                    reason: EscalationReason::DeadlineExpired,
                    suggested: SuggestedAction::Review,
                }
            );
        }
    }

    #[tokio::test]
    async fn overdue_delivery_escalates_to_review() {
        let (processor, store, api, notifier) = processor(FinalizePolicy::default());
        let now = Utc::now().timestamp();
        let deal_id = DealId::new("D-123").unwrap();

        api.insert(DealSnapshot {
            id: deal_id.clone(),
            state: DealState::Funded,
            delivery_by: Some(now - 10),
            dispute_until: None,
        });

        let payload = DeadlineJob {
            deal_id: deal_id.clone(),
            deadline_at: now - 10,
            kind: DeadlineKind::Delivery,
            nonce: 1,
        };
        let outcome = processor.process(&fired_job(&payload)).await.unwrap();

        assert_eq!(outcome.action, ProcessAction::Escalate);
        assert_eq!(outcome.reason, Some(EscalationReason::NoDelivery));
        assert_eq!(outcome.suggested, Some(SuggestedAction::Review));

        let pending = store.pending_ids(QueueName::Escalation, "escalation:D-123:").unwrap();
        assert_eq!(pending, vec!["escalation:D-123:no-delivery:REVIEW"]);
        assert_eq!(notifier.reviewer_notes().len(), 1);
    }

    #[tokio::test]
    async fn finalized_deal_is_a_noop() {
        let (processor, store, api, notifier) = processor(FinalizePolicy::default());
        let now = Utc::now().timestamp();
        let deal_id = DealId::new("D-999").unwrap();

        api.insert(DealSnapshot {
            id: deal_id.clone(),
            state: DealState::Released,
            delivery_by: None,
            dispute_until: None,
        });

        let payload = DeadlineJob {
            deal_id,
            deadline_at: now - 100,
            kind: DeadlineKind::Delivery,
            nonce: 0,
        };
        let outcome = processor.process(&fired_job(&payload)).await.unwrap();

        assert_eq!(outcome.action, ProcessAction::Noop);
        assert_eq!(store.stats(QueueName::Escalation).unwrap().waiting, 0);
        assert!(notifier.reviewer_notes().is_empty());
    }

    #[tokio::test]
    async fn expired_dispute_downgrades_release_when_policy_denies() {
        let (processor, store, api, _notifier) = processor(FinalizePolicy::default());
        let now = Utc::now().timestamp();
        let deal_id = DealId::new("D-42").unwrap();

        api.insert(DealSnapshot {
            id: deal_id.clone(),
            state: DealState::Funded,
            delivery_by: None,
            dispute_until: Some(now - 5),
        });

        let payload = DeadlineJob {
            deal_id,
            deadline_at: now - 5,
            kind: DeadlineKind::Dispute,
            nonce: 2,
        };
        let outcome = processor.process(&fired_job(&payload)).await.unwrap();

        assert_eq!(outcome.reason, Some(EscalationReason::DeadlineExpired));
        assert_eq!(outcome.suggested, Some(SuggestedAction::Review));

        let pending = store.pending_ids(QueueName::Escalation, "escalation:D-42:").unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].ends_with("deadline-expired:REVIEW"));
    }

    #[tokio::test]
    async fn expired_dispute_suggests_release_when_policy_allows() {
        let (processor, store, api, notifier) = processor(FinalizePolicy::new(true, false));
        let now = Utc::now().timestamp();
        let deal_id = DealId::new("D-43").unwrap();

        api.insert(DealSnapshot {
            id: deal_id.clone(),
            state: DealState::Delivered,
            delivery_by: None,
            dispute_until: Some(now - 1),
        });

        let payload = DeadlineJob {
            deal_id,
            deadline_at: now - 1,
            kind: DeadlineKind::Dispute,
            nonce: 0,
        };
        let outcome = processor.process(&fired_job(&payload)).await.unwrap();

        assert_eq!(outcome.suggested, Some(SuggestedAction::Release));
        let pending = store.pending_ids(QueueName::Escalation, "escalation:D-43:").unwrap();
        assert_eq!(pending, vec!["escalation:D-43:deadline-expired:RELEASE"]);
        // Not routed to review, so no reviewer ping from this processor.
        assert!(notifier.reviewer_notes().is_empty());
    }

    #[tokio::test]
    async fn duplicate_firing_enqueues_one_escalation() {
        let (processor, store, api, _notifier) = processor(FinalizePolicy::default());
        let now = Utc::now().timestamp();
        let deal_id = DealId::new("D-44").unwrap();

        api.insert(DealSnapshot {
            id: deal_id.clone(),
            state: DealState::Funded,
            delivery_by: Some(now - 10),
            dispute_until: None,
        });

        let payload = DeadlineJob {
            deal_id,
            deadline_at: now - 10,
            kind: DeadlineKind::Delivery,
            nonce: 0,
        };
        processor.process(&fired_job(&payload)).await.unwrap();
        processor.process(&fired_job(&payload)).await.unwrap();

        assert_eq!(store.stats(QueueName::Escalation).unwrap().waiting, 1);
    }

    #[tokio::test]
    async fn malformed_payload_is_not_retryable() {
        let (processor, _store, _api, _notifier) = processor(FinalizePolicy::default());
        let job = QueueJob::new(
            QueueName::Deadlines,
            serde_json::json!({"nope": true}),
            &AddOptions::new("deadline:bad:1:delivery:0"),
            Utc::now(),
        );
        let err = processor.process(&job).await.unwrap_err();
        assert!(!err.is_retryable());
    }
}

//! Timer processors: what runs when a job fires.

use async_trait::async_trait;
use serde::Serialize;

use escrowd_core::{DealId, DomainError, EscalationReason, SuggestedAction};
use escrowd_ports::PortError;
use escrowd_queue::{QueueError, QueueJob, QueueName};

mod deadline;
mod escalation;
mod reminder;

pub use deadline::DeadlineProcessor;
pub use escalation::EscalationProcessor;
pub use reminder::ReminderProcessor;

/// Processor failure.
///
/// Port and queue failures are transient: the substrate retries them with
/// backoff. An invalid payload can never succeed and dead-letters at once.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("invalid payload: {0}")]
    Invalid(String),

    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl ProcessorError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Invalid(_))
    }
}

impl From<DomainError> for ProcessorError {
    fn from(err: DomainError) -> Self {
        Self::Invalid(err.to_string())
    }
}

/// What a processor did with a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessAction {
    /// Nothing to do (deadline satisfied, deal terminal, reminder stale).
    Noop,
    /// A deadline elapsed and an escalation was enqueued.
    Escalate,
    /// A reminder was delivered to the notification port.
    Sent,
    /// An escalation prepared a finalize action.
    Prepared,
    /// An escalation was routed to a human reviewer.
    Review,
}

/// Processor result, returned for logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutcome {
    pub action: ProcessAction,
    pub deal_id: DealId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<EscalationReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested: Option<SuggestedAction>,
}

impl ProcessOutcome {
    pub fn noop(deal_id: DealId) -> Self {
        Self {
            action: ProcessAction::Noop,
            deal_id,
            reason: None,
            suggested: None,
        }
    }
}

/// A worker-dispatchable processor bound to one queue.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    fn queue(&self) -> QueueName;

    async fn process(&self, job: &QueueJob) -> Result<ProcessOutcome, ProcessorError>;
}

/// Decode a job payload, mapping malformed payloads to the non-retryable
/// error class.
fn decode_payload<T: serde::de::DeserializeOwned>(job: &QueueJob) -> Result<T, ProcessorError> {
    serde_json::from_value(job.payload.clone())
        .map_err(|e| ProcessorError::Invalid(format!("job {}: {}", job.id, e)))
}

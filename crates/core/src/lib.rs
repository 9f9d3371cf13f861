//! Core domain: deal snapshots, timer job payloads, identities, policy.

pub mod deal;
pub mod error;
pub mod id;
pub mod identity;
pub mod jobs;
pub mod policy;
pub mod webhook;

pub use deal::{DealSnapshot, DealState};
pub use error::{DomainError, DomainResult};
pub use id::DealId;
pub use identity::compute_webhook_id;
pub use jobs::{
    DeadlineJob, DeadlineKind, EscalationJob, EscalationReason, ReminderAudience, ReminderJob,
    ReminderReason, SuggestedAction,
};
pub use policy::FinalizePolicy;
pub use webhook::{NormalizedEvent, WebhookEffect};

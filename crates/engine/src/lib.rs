//! Scheduling engine, webhook router, and timer processors.

pub mod plan;
pub mod processors;
pub mod router;
pub mod scheduler;

pub use plan::{PlanConfig, TimerPlan};
pub use processors::{
    DeadlineProcessor, EscalationProcessor, JobProcessor, ProcessAction, ProcessOutcome,
    ProcessorError, ReminderProcessor,
};
pub use router::{BatchOutcome, WebhookRouter};
pub use scheduler::{EngineError, ScheduleOutcome, SchedulingEngine};

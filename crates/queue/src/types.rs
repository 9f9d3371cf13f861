//! Core queue types and retry policy.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How long completed job records are retained.
pub const COMPLETED_RETENTION: Duration = Duration::hours(1);
/// How long failed job records are retained for post-mortem.
pub const FAILED_RETENTION: Duration = Duration::hours(24);
/// Maximum completed/failed records retained per queue.
pub const RETENTION_MAX_ENTRIES: usize = 1000;
/// A running job idle longer than this is considered stalled and requeued.
pub const STALL_TIMEOUT: Duration = Duration::minutes(5);

/// The three named queues of the timing engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    Deadlines,
    Reminders,
    Escalation,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deadlines => "deadlines",
            Self::Reminders => "reminders",
            Self::Escalation => "escalation",
        }
    }

    pub fn all() -> [QueueName; 3] {
        [Self::Deadlines, Self::Reminders, Self::Escalation]
    }
}

impl core::fmt::Display for QueueName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry policy: exponential backoff, attempt cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed (first execution included).
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds.
    pub base_delay_ms: u64,
    /// Cap applied to the computed backoff.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before retry number `attempt` (1-indexed): `base * 2^(attempt-1)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::zero();
        }
        let exp = 2u64.saturating_pow(attempt.saturating_sub(1));
        let ms = self.base_delay_ms.saturating_mul(exp).min(self.max_delay_ms);
        Duration::milliseconds(ms as i64)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Options for enqueueing a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOptions {
    /// Deterministic identity: the sole dedup key for a pending job.
    pub job_id: String,
    /// Delay before first delivery. Producers floor past targets to 0.
    pub delay_ms: u64,
    pub retry: RetryPolicy,
}

impl AddOptions {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            delay_ms: 0,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Outcome of an `add` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Enqueued,
    /// A pending job with the same identity already exists; nothing changed.
    Deduplicated,
}

/// Outcome of a `fail` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOutcome {
    /// Rescheduled with backoff.
    Retried { run_at: DateTime<Utc> },
    /// Retries exhausted or failure not retryable; kept in the failed set.
    DeadLettered,
}

/// A job as stored and delivered by the substrate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueJob {
    pub id: String,
    pub queue: QueueName,
    pub payload: serde_json::Value,
    /// Number of times this job has been claimed.
    pub attempt: u32,
    pub retry: RetryPolicy,
    pub run_at: DateTime<Utc>,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueJob {
    pub fn new(
        queue: QueueName,
        payload: serde_json::Value,
        opts: &AddOptions,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: opts.job_id.clone(),
            queue,
            payload,
            attempt: 0,
            retry: opts.retry,
            run_at: now + Duration::milliseconds(opts.delay_ms as i64),
            enqueued_at: now,
        }
    }
}

/// Per-queue counters surfaced for telemetry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

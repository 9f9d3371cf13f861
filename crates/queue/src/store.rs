//! Job storage: the substrate contract and the in-memory implementation.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::types::{
    AddOptions, AddOutcome, FailOutcome, QueueJob, QueueName, QueueStats, COMPLETED_RETENTION,
    FAILED_RETENTION, RETENTION_MAX_ENTRIES, STALL_TIMEOUT,
};

/// Store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueueError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Durable delayed-job store abstraction.
///
/// The identity (`job_id`) is the sole key for at-most-one pending copy
/// across producers: `add` with an identity that is already pending (waiting
/// or in flight) is a no-op, and `cancel` of an unknown identity succeeds.
pub trait DelayedJobStore: Send + Sync {
    /// Enqueue a job unless a pending job with the same identity exists.
    fn add(
        &self,
        queue: QueueName,
        payload: &serde_json::Value,
        opts: &AddOptions,
    ) -> Result<AddOutcome, QueueError>;

    /// Remove a waiting job. Idempotent; returns whether a job was removed.
    fn cancel(&self, queue: QueueName, job_id: &str) -> Result<bool, QueueError>;

    /// Identities of waiting jobs whose id starts with `prefix`.
    fn pending_ids(&self, queue: QueueName, prefix: &str) -> Result<Vec<String>, QueueError>;

    /// Claim the next job due at or before `now`. At most one claimant wins
    /// a given identity; the claim increments the attempt counter.
    fn claim_due(&self, queue: QueueName, now: DateTime<Utc>)
        -> Result<Option<QueueJob>, QueueError>;

    /// Record successful completion (short retention).
    fn complete(&self, queue: QueueName, job: &QueueJob) -> Result<(), QueueError>;

    /// Record a failed attempt: reschedule with backoff while attempts
    /// remain and the failure is retryable, dead-letter otherwise.
    fn fail(
        &self,
        queue: QueueName,
        job: QueueJob,
        error: &str,
        retryable: bool,
    ) -> Result<FailOutcome, QueueError>;

    /// Counters for telemetry.
    fn stats(&self, queue: QueueName) -> Result<QueueStats, QueueError>;

    /// Retention sweep: trim completed/failed records past their windows and
    /// requeue stalled in-flight jobs.
    fn purge_expired(&self, queue: QueueName, now: DateTime<Utc>) -> Result<(), QueueError>;
}

#[derive(Debug, Clone)]
struct CompletedRecord {
    #[allow(dead_code)]
    id: String,
    finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct FailedRecord {
    id: String,
    error: String,
    failed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct QueueSlab {
    waiting: HashMap<String, QueueJob>,
    running: HashMap<String, (QueueJob, DateTime<Utc>)>,
    completed: VecDeque<CompletedRecord>,
    failed: VecDeque<FailedRecord>,
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    queues: Mutex<HashMap<QueueName, QueueSlab>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Error messages recorded for dead-lettered jobs (test helper).
    pub fn failed_errors(&self, queue: QueueName) -> Vec<(String, String)> {
        let queues = self.queues.lock().unwrap();
        queues
            .get(&queue)
            .map(|slab| {
                slab.failed
                    .iter()
                    .map(|r| (r.id.clone(), r.error.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl DelayedJobStore for InMemoryJobStore {
    fn add(
        &self,
        queue: QueueName,
        payload: &serde_json::Value,
        opts: &AddOptions,
    ) -> Result<AddOutcome, QueueError> {
        let mut queues = self.queues.lock().unwrap();
        let slab = queues.entry(queue).or_default();

        if slab.waiting.contains_key(&opts.job_id) || slab.running.contains_key(&opts.job_id) {
            return Ok(AddOutcome::Deduplicated);
        }

        let job = QueueJob::new(queue, payload.clone(), opts, Utc::now());
        slab.waiting.insert(job.id.clone(), job);
        Ok(AddOutcome::Enqueued)
    }

    fn cancel(&self, queue: QueueName, job_id: &str) -> Result<bool, QueueError> {
        let mut queues = self.queues.lock().unwrap();
        let slab = queues.entry(queue).or_default();
        Ok(slab.waiting.remove(job_id).is_some())
    }

    fn pending_ids(&self, queue: QueueName, prefix: &str) -> Result<Vec<String>, QueueError> {
        let queues = self.queues.lock().unwrap();
        let mut ids: Vec<String> = queues
            .get(&queue)
            .map(|slab| {
                slab.waiting
                    .keys()
                    .filter(|id| id.starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        ids.sort();
        Ok(ids)
    }

    fn claim_due(
        &self,
        queue: QueueName,
        now: DateTime<Utc>,
    ) -> Result<Option<QueueJob>, QueueError> {
        let mut queues = self.queues.lock().unwrap();
        let slab = queues.entry(queue).or_default();

        // Oldest due job first (FIFO by fire time, then enqueue time).
        let due = slab
            .waiting
            .values()
            .filter(|j| j.run_at <= now)
            .min_by_key(|j| (j.run_at, j.enqueued_at, j.id.clone()))
            .map(|j| j.id.clone());

        let Some(id) = due else {
            return Ok(None);
        };

        let mut job = slab.waiting.remove(&id).expect("due id came from waiting");
        job.attempt += 1;
        slab.running.insert(id, (job.clone(), now));
        Ok(Some(job))
    }

    fn complete(&self, queue: QueueName, job: &QueueJob) -> Result<(), QueueError> {
        let mut queues = self.queues.lock().unwrap();
        let slab = queues.entry(queue).or_default();
        slab.running.remove(&job.id);
        slab.completed.push_back(CompletedRecord {
            id: job.id.clone(),
            finished_at: Utc::now(),
        });
        while slab.completed.len() > RETENTION_MAX_ENTRIES {
            slab.completed.pop_front();
        }
        Ok(())
    }

    fn fail(
        &self,
        queue: QueueName,
        mut job: QueueJob,
        error: &str,
        retryable: bool,
    ) -> Result<FailOutcome, QueueError> {
        let mut queues = self.queues.lock().unwrap();
        let slab = queues.entry(queue).or_default();
        slab.running.remove(&job.id);

        if retryable && job.retry.should_retry(job.attempt) {
            let run_at = Utc::now() + job.retry.delay_for_attempt(job.attempt);
            job.run_at = run_at;
            slab.waiting.insert(job.id.clone(), job);
            return Ok(FailOutcome::Retried { run_at });
        }

        slab.failed.push_back(FailedRecord {
            id: job.id,
            error: error.to_string(),
            failed_at: Utc::now(),
        });
        while slab.failed.len() > RETENTION_MAX_ENTRIES {
            slab.failed.pop_front();
        }
        Ok(FailOutcome::DeadLettered)
    }

    fn stats(&self, queue: QueueName) -> Result<QueueStats, QueueError> {
        let queues = self.queues.lock().unwrap();
        let stats = queues
            .get(&queue)
            .map(|slab| QueueStats {
                waiting: slab.waiting.len(),
                active: slab.running.len(),
                completed: slab.completed.len(),
                failed: slab.failed.len(),
            })
            .unwrap_or_default();
        Ok(stats)
    }

    fn purge_expired(&self, queue: QueueName, now: DateTime<Utc>) -> Result<(), QueueError> {
        let mut queues = self.queues.lock().unwrap();
        let slab = queues.entry(queue).or_default();

        slab.completed
            .retain(|r| now - r.finished_at <= COMPLETED_RETENTION);
        slab.failed.retain(|r| now - r.failed_at <= FAILED_RETENTION);

        // Requeue stalled in-flight jobs so a crashed worker cannot strand them.
        let stalled: Vec<String> = slab
            .running
            .iter()
            .filter(|(_, (_, claimed_at))| now - *claimed_at > STALL_TIMEOUT)
            .map(|(id, _)| id.clone())
            .collect();
        for id in stalled {
            if let Some((mut job, _)) = slab.running.remove(&id) {
                tracing::warn!(queue = %queue, job_id = %job.id, "requeueing stalled job");
                job.run_at = now;
                slab.waiting.insert(job.id.clone(), job);
            }
        }
        Ok(())
    }
}

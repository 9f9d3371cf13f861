//! Redis-backed delayed-job store.
//!
//! Key layout per queue (prefix `escrowd`):
//! - `escrowd:<queue>:waiting`   ZSET  job id -> fire time (unix ms)
//! - `escrowd:<queue>:running`   ZSET  job id -> claim time (unix ms)
//! - `escrowd:<queue>:jobs`      HASH  job id -> serialized [`QueueJob`]
//! - `escrowd:<queue>:completed` ZSET  job id -> completion time (unix ms)
//! - `escrowd:<queue>:failed`    ZSET  job id -> failure time (unix ms)
//! - `escrowd:<queue>:errors`    HASH  job id -> last error string
//!
//! The `jobs` hash holds every pending payload (waiting or in flight), so
//! `HSETNX` is the dedup point: two producers emitting the same identity
//! converge on one job. Claiming is a `ZRANGEBYSCORE` + `ZREM` pair; the
//! claimant whose `ZREM` removes the member wins, which gives at-most-one
//! concurrent execution per identity without a transaction.
//!
//! Connections are opened on demand from a shared [`redis::Client`] and
//! dropped at the end of each call, so failure paths cannot leak handles.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::store::{DelayedJobStore, QueueError};
use super::types::{
    AddOptions, AddOutcome, FailOutcome, QueueJob, QueueName, QueueStats, COMPLETED_RETENTION,
    FAILED_RETENTION, RETENTION_MAX_ENTRIES, STALL_TIMEOUT,
};

const DEFAULT_KEY_PREFIX: &str = "escrowd";

#[derive(Debug, Clone)]
pub struct RedisJobStore {
    client: Arc<redis::Client>,
    prefix: String,
}

impl RedisJobStore {
    /// Create a store from a Redis connection URL.
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        Ok(Self {
            client: Arc::new(client),
            prefix: DEFAULT_KEY_PREFIX.to_string(),
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn conn(&self) -> Result<redis::Connection, QueueError> {
        self.client
            .get_connection()
            .map_err(|e| QueueError::Connection(e.to_string()))
    }

    fn key(&self, queue: QueueName, part: &str) -> String {
        format!("{}:{}:{}", self.prefix, queue, part)
    }

    fn load_job(
        &self,
        conn: &mut redis::Connection,
        queue: QueueName,
        job_id: &str,
    ) -> Result<Option<QueueJob>, QueueError> {
        let raw: Option<String> = redis::cmd("HGET")
            .arg(self.key(queue, "jobs"))
            .arg(job_id)
            .query(conn)
            .map_err(|e| QueueError::Storage(format!("HGET failed: {e}")))?;
        raw.map(|s| {
            serde_json::from_str(&s).map_err(|e| QueueError::Serialization(e.to_string()))
        })
        .transpose()
    }

    fn store_job(
        &self,
        conn: &mut redis::Connection,
        queue: QueueName,
        job: &QueueJob,
    ) -> Result<(), QueueError> {
        let raw =
            serde_json::to_string(job).map_err(|e| QueueError::Serialization(e.to_string()))?;
        let _: () = redis::cmd("HSET")
            .arg(self.key(queue, "jobs"))
            .arg(&job.id)
            .arg(raw)
            .query(conn)
            .map_err(|e| QueueError::Storage(format!("HSET failed: {e}")))?;
        Ok(())
    }

    /// Trim a retention ZSET by age and cardinality; drop error records for
    /// evicted failed entries.
    fn trim_retention(
        &self,
        conn: &mut redis::Connection,
        queue: QueueName,
        part: &str,
        cutoff_ms: i64,
    ) -> Result<(), QueueError> {
        let key = self.key(queue, part);

        let expired: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&key)
            .arg("-inf")
            .arg(cutoff_ms)
            .query(conn)
            .map_err(|e| QueueError::Storage(format!("ZRANGEBYSCORE failed: {e}")))?;

        let _: u64 = redis::cmd("ZREMRANGEBYSCORE")
            .arg(&key)
            .arg("-inf")
            .arg(cutoff_ms)
            .query(conn)
            .map_err(|e| QueueError::Storage(format!("ZREMRANGEBYSCORE failed: {e}")))?;

        let overflow: Vec<String> = redis::cmd("ZRANGE")
            .arg(&key)
            .arg(0)
            .arg(-(RETENTION_MAX_ENTRIES as i64) - 1)
            .query(conn)
            .map_err(|e| QueueError::Storage(format!("ZRANGE failed: {e}")))?;

        if !overflow.is_empty() {
            let _: u64 = redis::cmd("ZREM")
                .arg(&key)
                .arg(&overflow[..])
                .query(conn)
                .map_err(|e| QueueError::Storage(format!("ZREM failed: {e}")))?;
        }

        if part == "failed" {
            let evicted: Vec<&String> = expired.iter().chain(overflow.iter()).collect();
            if !evicted.is_empty() {
                let mut cmd = redis::cmd("HDEL");
                cmd.arg(self.key(queue, "errors"));
                for id in evicted {
                    cmd.arg(id);
                }
                let _: u64 = cmd
                    .query(conn)
                    .map_err(|e| QueueError::Storage(format!("HDEL failed: {e}")))?;
            }
        }
        Ok(())
    }
}

fn ms(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

impl DelayedJobStore for RedisJobStore {
    fn add(
        &self,
        queue: QueueName,
        payload: &serde_json::Value,
        opts: &AddOptions,
    ) -> Result<AddOutcome, QueueError> {
        let mut conn = self.conn()?;
        let job = QueueJob::new(queue, payload.clone(), opts, Utc::now());
        let raw =
            serde_json::to_string(&job).map_err(|e| QueueError::Serialization(e.to_string()))?;

        // HSETNX is the dedup point: 0 means a pending copy already exists.
        let inserted: bool = redis::cmd("HSETNX")
            .arg(self.key(queue, "jobs"))
            .arg(&job.id)
            .arg(raw)
            .query(&mut conn)
            .map_err(|e| QueueError::Storage(format!("HSETNX failed: {e}")))?;

        if !inserted {
            return Ok(AddOutcome::Deduplicated);
        }

        let _: u64 = redis::cmd("ZADD")
            .arg(self.key(queue, "waiting"))
            .arg(ms(job.run_at))
            .arg(&job.id)
            .query(&mut conn)
            .map_err(|e| QueueError::Storage(format!("ZADD failed: {e}")))?;

        Ok(AddOutcome::Enqueued)
    }

    fn cancel(&self, queue: QueueName, job_id: &str) -> Result<bool, QueueError> {
        let mut conn = self.conn()?;
        let removed: u64 = redis::cmd("ZREM")
            .arg(self.key(queue, "waiting"))
            .arg(job_id)
            .query(&mut conn)
            .map_err(|e| QueueError::Storage(format!("ZREM failed: {e}")))?;

        if removed == 0 {
            return Ok(false);
        }
        let _: u64 = redis::cmd("HDEL")
            .arg(self.key(queue, "jobs"))
            .arg(job_id)
            .query(&mut conn)
            .map_err(|e| QueueError::Storage(format!("HDEL failed: {e}")))?;
        Ok(true)
    }

    fn pending_ids(&self, queue: QueueName, prefix: &str) -> Result<Vec<String>, QueueError> {
        let mut conn = self.conn()?;
        let all: Vec<String> = redis::cmd("ZRANGE")
            .arg(self.key(queue, "waiting"))
            .arg(0)
            .arg(-1)
            .query(&mut conn)
            .map_err(|e| QueueError::Storage(format!("ZRANGE failed: {e}")))?;
        let mut ids: Vec<String> = all.into_iter().filter(|id| id.starts_with(prefix)).collect();
        ids.sort();
        Ok(ids)
    }

    fn claim_due(
        &self,
        queue: QueueName,
        now: DateTime<Utc>,
    ) -> Result<Option<QueueJob>, QueueError> {
        let mut conn = self.conn()?;

        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(self.key(queue, "waiting"))
            .arg("-inf")
            .arg(ms(now))
            .arg("LIMIT")
            .arg(0)
            .arg(1)
            .query(&mut conn)
            .map_err(|e| QueueError::Storage(format!("ZRANGEBYSCORE failed: {e}")))?;

        let Some(id) = due.into_iter().next() else {
            return Ok(None);
        };

        // Only the claimant whose ZREM removes the member wins.
        let won: u64 = redis::cmd("ZREM")
            .arg(self.key(queue, "waiting"))
            .arg(&id)
            .query(&mut conn)
            .map_err(|e| QueueError::Storage(format!("ZREM failed: {e}")))?;
        if won == 0 {
            return Ok(None);
        }

        let Some(mut job) = self.load_job(&mut conn, queue, &id)? else {
            // Cancelled between ZREM and HGET; nothing to run.
            return Ok(None);
        };

        job.attempt += 1;
        self.store_job(&mut conn, queue, &job)?;
        let _: u64 = redis::cmd("ZADD")
            .arg(self.key(queue, "running"))
            .arg(ms(now))
            .arg(&id)
            .query(&mut conn)
            .map_err(|e| QueueError::Storage(format!("ZADD failed: {e}")))?;

        Ok(Some(job))
    }

    fn complete(&self, queue: QueueName, job: &QueueJob) -> Result<(), QueueError> {
        let mut conn = self.conn()?;
        let now = Utc::now();

        let _: u64 = redis::cmd("ZREM")
            .arg(self.key(queue, "running"))
            .arg(&job.id)
            .query(&mut conn)
            .map_err(|e| QueueError::Storage(format!("ZREM failed: {e}")))?;
        let _: u64 = redis::cmd("HDEL")
            .arg(self.key(queue, "jobs"))
            .arg(&job.id)
            .query(&mut conn)
            .map_err(|e| QueueError::Storage(format!("HDEL failed: {e}")))?;
        let _: u64 = redis::cmd("ZADD")
            .arg(self.key(queue, "completed"))
            .arg(ms(now))
            .arg(&job.id)
            .query(&mut conn)
            .map_err(|e| QueueError::Storage(format!("ZADD failed: {e}")))?;

        self.trim_retention(
            &mut conn,
            queue,
            "completed",
            ms(now - COMPLETED_RETENTION),
        )
    }

    fn fail(
        &self,
        queue: QueueName,
        mut job: QueueJob,
        error: &str,
        retryable: bool,
    ) -> Result<FailOutcome, QueueError> {
        let mut conn = self.conn()?;
        let now = Utc::now();

        let _: u64 = redis::cmd("ZREM")
            .arg(self.key(queue, "running"))
            .arg(&job.id)
            .query(&mut conn)
            .map_err(|e| QueueError::Storage(format!("ZREM failed: {e}")))?;

        if retryable && job.retry.should_retry(job.attempt) {
            let run_at = now + job.retry.delay_for_attempt(job.attempt);
            job.run_at = run_at;
            self.store_job(&mut conn, queue, &job)?;
            let _: u64 = redis::cmd("ZADD")
                .arg(self.key(queue, "waiting"))
                .arg(ms(run_at))
                .arg(&job.id)
                .query(&mut conn)
                .map_err(|e| QueueError::Storage(format!("ZADD failed: {e}")))?;
            return Ok(FailOutcome::Retried { run_at });
        }

        let _: u64 = redis::cmd("HDEL")
            .arg(self.key(queue, "jobs"))
            .arg(&job.id)
            .query(&mut conn)
            .map_err(|e| QueueError::Storage(format!("HDEL failed: {e}")))?;
        let _: u64 = redis::cmd("ZADD")
            .arg(self.key(queue, "failed"))
            .arg(ms(now))
            .arg(&job.id)
            .query(&mut conn)
            .map_err(|e| QueueError::Storage(format!("ZADD failed: {e}")))?;
        let _: () = redis::cmd("HSET")
            .arg(self.key(queue, "errors"))
            .arg(&job.id)
            .arg(error)
            .query(&mut conn)
            .map_err(|e| QueueError::Storage(format!("HSET failed: {e}")))?;

        self.trim_retention(&mut conn, queue, "failed", ms(now - FAILED_RETENTION))?;
        Ok(FailOutcome::DeadLettered)
    }

    fn stats(&self, queue: QueueName) -> Result<QueueStats, QueueError> {
        let mut conn = self.conn()?;
        let mut counts = [0usize; 4];
        for (i, part) in ["waiting", "running", "completed", "failed"].iter().enumerate() {
            counts[i] = redis::cmd("ZCARD")
                .arg(self.key(queue, part))
                .query(&mut conn)
                .map_err(|e| QueueError::Storage(format!("ZCARD failed: {e}")))?;
        }
        Ok(QueueStats {
            waiting: counts[0],
            active: counts[1],
            completed: counts[2],
            failed: counts[3],
        })
    }

    fn purge_expired(&self, queue: QueueName, now: DateTime<Utc>) -> Result<(), QueueError> {
        let mut conn = self.conn()?;

        self.trim_retention(&mut conn, queue, "completed", ms(now - COMPLETED_RETENTION))?;
        self.trim_retention(&mut conn, queue, "failed", ms(now - FAILED_RETENTION))?;

        // Requeue stalled in-flight jobs (claimed longer ago than the stall
        // timeout, e.g. by a worker that died mid-job).
        let stall_cutoff = ms(now - STALL_TIMEOUT);
        let stalled: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(self.key(queue, "running"))
            .arg("-inf")
            .arg(stall_cutoff)
            .query(&mut conn)
            .map_err(|e| QueueError::Storage(format!("ZRANGEBYSCORE failed: {e}")))?;

        for id in stalled {
            let removed: u64 = redis::cmd("ZREM")
                .arg(self.key(queue, "running"))
                .arg(&id)
                .query(&mut conn)
                .map_err(|e| QueueError::Storage(format!("ZREM failed: {e}")))?;
            if removed == 0 {
                continue;
            }
            if let Some(mut job) = self.load_job(&mut conn, queue, &id)? {
                tracing::warn!(queue = %queue, job_id = %id, "requeueing stalled job");
                job.run_at = now;
                self.store_job(&mut conn, queue, &job)?;
                let _: u64 = redis::cmd("ZADD")
                    .arg(self.key(queue, "waiting"))
                    .arg(ms(now))
                    .arg(&id)
                    .query(&mut conn)
                    .map_err(|e| QueueError::Storage(format!("ZADD failed: {e}")))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn key_layout_is_prefixed_per_queue() {
        let store = RedisJobStore::new("redis://127.0.0.1:6379").unwrap();
        assert_eq!(store.key(QueueName::Deadlines, "waiting"), "escrowd:deadlines:waiting");
        assert_eq!(store.key(QueueName::Escalation, "jobs"), "escrowd:escalation:jobs");

        let store = store.with_prefix("test");
        assert_eq!(store.key(QueueName::Reminders, "failed"), "test:reminders:failed");
    }

    #[test]
    fn millisecond_conversion_is_utc() {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert_eq!(ms(at), 1_700_000_000_000);
    }
}

//! Durable delayed-job substrate: named queues, dedupe-by-identity, retry.

pub mod redis_store;
pub mod store;
pub mod types;

pub use redis_store::RedisJobStore;
pub use store::{DelayedJobStore, InMemoryJobStore, QueueError};
pub use types::{
    AddOptions, AddOutcome, FailOutcome, QueueJob, QueueName, QueueStats, RetryPolicy,
};

//! Worker runtime: per-queue pools, telemetry, graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use escrowd_engine::JobProcessor;
use escrowd_queue::{DelayedJobStore, FailOutcome, QueueName};

/// How often an idle worker re-polls its queue.
const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// How often the per-queue maintenance task sweeps retention and stats.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30);

/// Handle over all running workers.
pub struct WorkerPool {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Suspend dequeues and wait for in-flight jobs to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
        tracing::info!("worker pool stopped");
    }
}

/// Boot `concurrency` workers per processor plus one maintenance task per
/// queue.
pub fn spawn_workers(
    store: Arc<dyn DelayedJobStore>,
    processors: Vec<Arc<dyn JobProcessor>>,
    concurrency: usize,
) -> WorkerPool {
    let (shutdown, rx) = watch::channel(false);
    let mut handles = Vec::new();

    for processor in processors {
        let queue = processor.queue();
        for index in 0..concurrency {
            handles.push(tokio::spawn(worker_loop(
                store.clone(),
                processor.clone(),
                rx.clone(),
                index,
            )));
        }
        handles.push(tokio::spawn(maintenance_loop(store.clone(), queue, rx.clone())));
        tracing::info!(queue = %queue, concurrency, "workers started");
    }

    WorkerPool { shutdown, handles }
}

async fn worker_loop(
    store: Arc<dyn DelayedJobStore>,
    processor: Arc<dyn JobProcessor>,
    mut shutdown: watch::Receiver<bool>,
    index: usize,
) {
    let queue = processor.queue();

    loop {
        if *shutdown.borrow() {
            break;
        }

        let claimed = {
            let store = store.clone();
            tokio::task::spawn_blocking(move || store.claim_due(queue, Utc::now())).await
        };

        let job = match claimed {
            Ok(Ok(Some(job))) => job,
            Ok(Ok(None)) => {
                // Idle: wait for the next poll or for shutdown.
                tokio::select! {
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            }
            Ok(Err(err)) => {
                tracing::error!(queue = %queue, worker = index, error = %err, "claim failed");
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
            Err(err) => {
                tracing::error!(queue = %queue, worker = index, error = %err, "claim task panicked");
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
        };

        tracing::debug!(queue = %queue, worker = index, job_id = %job.id, attempt = job.attempt, "job active");

        match processor.process(&job).await {
            Ok(outcome) => {
                let store = store.clone();
                let completed_job = job.clone();
                let result = tokio::task::spawn_blocking(move || {
                    store.complete(queue, &completed_job)
                })
                .await;
                if let Ok(Err(err)) = result {
                    tracing::error!(queue = %queue, job_id = %job.id, error = %err, "failed to record completion");
                }
                tracing::info!(
                    queue = %queue,
                    job_id = %job.id,
                    outcome = %serde_json::to_string(&outcome).unwrap_or_default(),
                    "job completed"
                );
            }
            Err(err) => {
                let retryable = err.is_retryable();
                let message = err.to_string();
                let store = store.clone();
                let job_id = job.id.clone();
                let failed_job = job;
                let result = tokio::task::spawn_blocking(move || {
                    store.fail(queue, failed_job, &message, retryable)
                })
                .await;
                match result {
                    Ok(Ok(FailOutcome::Retried { run_at })) => {
                        tracing::warn!(queue = %queue, job_id = %job_id, error = %err, retry_at = %run_at, "job failed, will retry");
                    }
                    Ok(Ok(FailOutcome::DeadLettered)) => {
                        tracing::error!(queue = %queue, job_id = %job_id, error = %err, "job dead-lettered");
                    }
                    Ok(Err(store_err)) => {
                        tracing::error!(queue = %queue, job_id = %job_id, error = %store_err, "failed to record failure");
                    }
                    Err(join_err) => {
                        tracing::error!(queue = %queue, job_id = %job_id, error = %join_err, "failure task panicked");
                    }
                }
            }
        }
    }

    tracing::debug!(queue = %queue, worker = index, "worker stopped");
}

/// Periodic retention purge plus a waiting/active telemetry line.
async fn maintenance_loop(
    store: Arc<dyn DelayedJobStore>,
    queue: QueueName,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(MAINTENANCE_INTERVAL) => {}
            _ = shutdown.changed() => {}
        }
        if *shutdown.borrow() {
            break;
        }

        let sweep = {
            let store = store.clone();
            tokio::task::spawn_blocking(move || {
                store.purge_expired(queue, Utc::now())?;
                store.stats(queue)
            })
            .await
        };
        match sweep {
            Ok(Ok(stats)) => {
                tracing::info!(
                    queue = %queue,
                    waiting = stats.waiting,
                    active = stats.active,
                    completed = stats.completed,
                    failed = stats.failed,
                    "queue stats"
                );
            }
            Ok(Err(err)) => {
                tracing::error!(queue = %queue, error = %err, "maintenance sweep failed");
            }
            Err(err) => {
                tracing::error!(queue = %queue, error = %err, "maintenance task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use escrowd_core::DealId;
    use escrowd_engine::{ProcessOutcome, ProcessorError};
    use escrowd_queue::{AddOptions, InMemoryJobStore, QueueJob};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProcessor {
        processed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl JobProcessor for CountingProcessor {
        fn queue(&self) -> QueueName {
            QueueName::Reminders
        }

        async fn process(&self, _job: &QueueJob) -> Result<ProcessOutcome, ProcessorError> {
            self.processed.fetch_add(1, Ordering::SeqCst);
            Ok(ProcessOutcome::noop(DealId::new("D-1").unwrap()))
        }
    }

    #[tokio::test]
    async fn worker_processes_due_jobs_and_stops_on_shutdown() {
        let store: Arc<dyn DelayedJobStore> = Arc::new(InMemoryJobStore::new());
        let processed = Arc::new(AtomicUsize::new(0));

        store
            .add(
                QueueName::Reminders,
                &serde_json::json!({"dealId": "D-1"}),
                &AddOptions::new("reminder:D-1:1:both:deadline-upcoming"),
            )
            .unwrap();

        let pool = spawn_workers(
            store.clone(),
            vec![Arc::new(CountingProcessor {
                processed: processed.clone(),
            })],
            2,
        );

        // Give the workers a few polls to pick the job up.
        for _ in 0..50 {
            if processed.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(processed.load(Ordering::SeqCst), 1);
        assert_eq!(store.stats(QueueName::Reminders).unwrap().completed, 1);

        pool.shutdown().await;
    }

    struct FailingProcessor;

    #[async_trait]
    impl JobProcessor for FailingProcessor {
        fn queue(&self) -> QueueName {
            QueueName::Escalation
        }

        async fn process(&self, job: &QueueJob) -> Result<ProcessOutcome, ProcessorError> {
            Err(ProcessorError::Invalid(format!("job {}: bad", job.id)))
        }
    }

    #[tokio::test]
    async fn invalid_jobs_dead_letter_without_retry() {
        let store: Arc<dyn DelayedJobStore> = Arc::new(InMemoryJobStore::new());
        store
            .add(
                QueueName::Escalation,
                &serde_json::json!({}),
                &AddOptions::new("escalation:D-2:no-ack:REVIEW"),
            )
            .unwrap();

        let pool = spawn_workers(store.clone(), vec![Arc::new(FailingProcessor)], 1);

        for _ in 0..50 {
            if store.stats(QueueName::Escalation).unwrap().failed > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let stats = store.stats(QueueName::Escalation).unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.waiting, 0);

        pool.shutdown().await;
    }
}

//! Execution side: bounded-concurrency worker applying retry, release and chain semantics.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::dispatcher::{JobQueue, QueueDispatcher, QueuedJob};
use super::{Job, JobOutcome};

/// Executes one job. Gets `&mut` so a job can adjust itself before a release.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn execute(&self, job: &mut Job) -> JobOutcome;

    /// Runs once when a job gives up after its last release or retry.
    async fn on_exhausted(&self, _job: &Job) {}
}

pub struct JobWorker {
    queue: JobQueue,
    handler: Arc<dyn JobHandler>,
    concurrency: usize,
}

impl JobWorker {
    pub fn new(queue: JobQueue, handler: Arc<dyn JobHandler>, concurrency: usize) -> Self {
        Self {
            queue,
            handler,
            concurrency: concurrency.max(1),
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Consumes the queue for the life of the process.
    pub async fn run(self) {
        let JobWorker {
            queue,
            handler,
            concurrency,
        } = self;
        let JobQueue { mut rx, dispatcher } = queue;
        let semaphore = Arc::new(Semaphore::new(concurrency));
        info!(concurrency, "Job worker started");

        while let Some(queued) = rx.recv().await {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let handler = handler.clone();
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                let _permit = permit;
                process(handler.as_ref(), &dispatcher, queued).await;
                dispatcher.finish_one();
            });
        }
        info!("Job worker stopped");
    }
}

async fn process(handler: &dyn JobHandler, dispatcher: &QueueDispatcher, mut queued: QueuedJob) {
    let policy = queued.job.policy();
    queued.attempt += 1;
    let name = queued.job.name();
    let attempt = queued.attempt;

    let outcome = match tokio::time::timeout(policy.timeout, handler.execute(&mut queued.job)).await
    {
        Ok(outcome) => outcome,
        Err(_) => JobOutcome::Retry(format!("timed out after {:?}", policy.timeout)),
    };

    match outcome {
        JobOutcome::Done => {
            debug!(job = name, attempt, "Job done");
            if !queued.chain.is_empty() {
                let next = queued.chain.remove(0);
                dispatcher.enqueue(
                    QueuedJob {
                        job: next,
                        attempt: 0,
                        chain: queued.chain,
                    },
                    Duration::ZERO,
                );
            }
        }
        JobOutcome::Release(delay) => {
            if attempt < policy.tries {
                debug!(job = name, attempt, delay_ms = delay.as_millis() as u64, "Job released");
                dispatcher.enqueue(queued, delay);
            } else {
                warn!(job = name, attempt, "Job released with no attempts left, dropping");
                handler.on_exhausted(&queued.job).await;
            }
        }
        JobOutcome::Retry(reason) => {
            if attempt < policy.tries {
                let delay = policy.backoff_after(attempt);
                warn!(job = name, attempt, reason = %reason, delay_s = delay.as_secs(), "Job failed, retrying");
                dispatcher.enqueue(queued, delay);
            } else {
                error!(job = name, attempt, reason = %reason, "Job failed, attempts exhausted");
                handler.on_exhausted(&queued.job).await;
            }
        }
        JobOutcome::Fail(reason) => {
            warn!(job = name, attempt, reason = %reason, "Job failed permanently");
        }
    }
}

//! Dispatch side: the [`Dispatcher`] seam, the tokio queue behind it and a recording double.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use super::Job;

/// Schedules jobs. Never blocks and never fails; an undeliverable job is logged.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, job: Job, delay: Duration);

    /// Runs the jobs in order; each one is enqueued only after the previous completed.
    fn dispatch_chain(&self, jobs: Vec<Job>);

    fn dispatch_now(&self, job: Job) {
        self.dispatch(job, Duration::ZERO);
    }
}

/// A job in the queue with its attempt count and the chain that follows it.
#[derive(Debug)]
pub struct QueuedJob {
    pub job: Job,
    pub attempt: u32,
    pub chain: Vec<Job>,
}

impl QueuedJob {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            attempt: 0,
            chain: Vec::new(),
        }
    }
}

/// Sender half of the in-process job queue. Cheap to clone.
#[derive(Clone)]
pub struct QueueDispatcher {
    tx: mpsc::UnboundedSender<QueuedJob>,
    pending: Arc<watch::Sender<usize>>,
}

/// Receiver half, consumed by [`super::JobWorker`].
pub struct JobQueue {
    pub(crate) rx: mpsc::UnboundedReceiver<QueuedJob>,
    pub(crate) dispatcher: QueueDispatcher,
}

impl QueueDispatcher {
    pub fn new() -> (Self, JobQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (pending, _) = watch::channel(0usize);
        let dispatcher = Self {
            tx,
            pending: Arc::new(pending),
        };
        let queue = JobQueue {
            rx,
            dispatcher: dispatcher.clone(),
        };
        (dispatcher, queue)
    }

    /// Enqueues after `delay`. The job counts as pending from now until the worker finishes it.
    pub(crate) fn enqueue(&self, queued: QueuedJob, delay: Duration) {
        self.pending.send_modify(|count| *count += 1);
        if delay.is_zero() {
            self.send(queued);
            return;
        }
        let dispatcher = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            dispatcher.send(queued);
        });
    }

    fn send(&self, queued: QueuedJob) {
        if let Err(e) = self.tx.send(queued) {
            warn!(job = e.0.job.name(), "Job queue closed, dropping job");
            self.finish_one();
        }
    }

    pub(crate) fn finish_one(&self) {
        self.pending
            .send_modify(|count| *count = count.saturating_sub(1));
    }

    /// Jobs enqueued, waiting on a delay or running.
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Resolves once no job is pending. Used by one-shot CLI commands and tests.
    pub async fn wait_idle(&self) {
        let mut rx = self.pending.subscribe();
        // The sender lives as long as self, so this cannot fail.
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

impl Dispatcher for QueueDispatcher {
    fn dispatch(&self, job: Job, delay: Duration) {
        debug!(job = job.name(), delay_ms = delay.as_millis() as u64, "Dispatching job");
        self.enqueue(QueuedJob::new(job), delay);
    }

    fn dispatch_chain(&self, jobs: Vec<Job>) {
        let mut jobs = jobs.into_iter();
        let Some(first) = jobs.next() else {
            return;
        };
        debug!(job = first.name(), chained = jobs.len(), "Dispatching job chain");
        self.enqueue(
            QueuedJob {
                job: first,
                attempt: 0,
                chain: jobs.collect(),
            },
            Duration::ZERO,
        );
    }
}

/// Dispatcher double that records instead of running.
#[derive(Default)]
pub struct RecordingDispatcher {
    jobs: Mutex<Vec<(Job, Duration)>>,
    chains: Mutex<Vec<Vec<Job>>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<(Job, Duration)> {
        self.jobs.lock().map(|j| j.clone()).unwrap_or_default()
    }

    pub fn chains(&self) -> Vec<Vec<Job>> {
        self.chains.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Params of recorded `TelegramQuery` jobs for `method`, with their delays.
    pub fn queries(&self, method: &str) -> Vec<(Value, Duration)> {
        self.jobs()
            .into_iter()
            .filter_map(|(job, delay)| match job {
                Job::TelegramQuery { method: m, params } if m == method => Some((params, delay)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.clear();
        }
        if let Ok(mut chains) = self.chains.lock() {
            chains.clear();
        }
    }
}

impl Dispatcher for RecordingDispatcher {
    fn dispatch(&self, job: Job, delay: Duration) {
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.push((job, delay));
        }
    }

    fn dispatch_chain(&self, jobs: Vec<Job>) {
        if let Ok(mut chains) = self.chains.lock() {
            chains.push(jobs);
        }
    }
}

//! Job model: deferred Bot API side effects with per-kind retry policy.
//!
//! Handlers never call the API for side effects directly; they describe a [`Job`] and hand it to
//! a [`Dispatcher`]. The [`JobWorker`] executes jobs through a [`JobHandler`] and applies the
//! [`JobOutcome`]: done (continue the chain), release (re-enqueue after a delay), retry (policy
//! backoff) or fail (drop).

mod dispatcher;
mod executor;
mod worker;

use std::time::Duration;

use serde_json::Value;

use crate::outbound::OutboundMessage;

pub use dispatcher::{Dispatcher, JobQueue, QueueDispatcher, QueuedJob, RecordingDispatcher};
pub use executor::DeskJobHandler;
pub use worker::{JobHandler, JobWorker};

/// How the contact card is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardMode {
    /// Edit the stored card, or send a new one when it is gone.
    Upsert,
    /// Edit the given message in place (callback source).
    EditAt(i64),
    /// Always post a new card and remember it.
    SendNew,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    /// One raw Bot API call; failures are logged and dropped.
    TelegramQuery { method: String, params: Value },
    CreateTopic { customer_id: i64 },
    /// Customer message relayed into the customer's topic.
    DeliverToTopic {
        customer_id: i64,
        message: OutboundMessage,
        source_message_id: Option<i64>,
        /// Set once the topic was (re)created for this delivery; a second loss fails the job.
        topic_recreated: bool,
    },
    /// Manager message relayed from the topic to the customer.
    DeliverToCustomer {
        customer_id: i64,
        message: OutboundMessage,
        source_message_id: Option<i64>,
    },
    BroadcastDelivery {
        batch_id: String,
        customer_id: i64,
        message: OutboundMessage,
    },
    SyncContactCard { customer_id: i64, mode: CardMode },
}

impl Job {
    pub fn query(method: impl Into<String>, params: Value) -> Self {
        Job::TelegramQuery {
            method: method.into(),
            params,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Job::TelegramQuery { .. } => "telegram_query",
            Job::CreateTopic { .. } => "create_topic",
            Job::DeliverToTopic { .. } => "deliver_to_topic",
            Job::DeliverToCustomer { .. } => "deliver_to_customer",
            Job::BroadcastDelivery { .. } => "broadcast_delivery",
            Job::SyncContactCard { .. } => "sync_contact_card",
        }
    }

    pub fn customer_id(&self) -> Option<i64> {
        match self {
            Job::TelegramQuery { .. } => None,
            Job::CreateTopic { customer_id }
            | Job::DeliverToTopic { customer_id, .. }
            | Job::DeliverToCustomer { customer_id, .. }
            | Job::BroadcastDelivery { customer_id, .. }
            | Job::SyncContactCard { customer_id, .. } => Some(*customer_id),
        }
    }

    pub fn policy(&self) -> JobPolicy {
        match self {
            Job::TelegramQuery { .. } => JobPolicy::new(5, 20, &[]),
            Job::CreateTopic { .. } => JobPolicy::new(3, 20, &[60, 180, 300]),
            Job::DeliverToTopic { .. } | Job::DeliverToCustomer { .. } => {
                JobPolicy::new(5, 20, &[])
            }
            Job::BroadcastDelivery { .. } => JobPolicy::new(5, 60, &[]),
            Job::SyncContactCard { .. } => JobPolicy::new(3, 20, &[]),
        }
    }
}

/// Attempt budget, wall-clock limit and retry backoff of a job kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobPolicy {
    pub tries: u32,
    pub timeout: Duration,
    /// Seconds before retry N (1-based); the last entry repeats. Empty means retry immediately.
    pub backoff: &'static [u64],
}

impl JobPolicy {
    pub const fn new(tries: u32, timeout_secs: u64, backoff: &'static [u64]) -> Self {
        Self {
            tries,
            timeout: Duration::from_secs(timeout_secs),
            backoff,
        }
    }

    /// Delay before the retry that follows `attempt` (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        if self.backoff.is_empty() {
            return Duration::ZERO;
        }
        let idx = (attempt.saturating_sub(1) as usize).min(self.backoff.len() - 1);
        Duration::from_secs(self.backoff[idx])
    }
}

/// Result of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Done,
    /// Put the (possibly mutated) job back after the delay; counts as an attempt.
    Release(Duration),
    /// Transient failure; retried with the policy backoff while attempts remain.
    Retry(String),
    /// Permanent failure; dropped.
    Fail(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policies() {
        let create = Job::CreateTopic { customer_id: 1 }.policy();
        assert_eq!(create.tries, 3);
        assert_eq!(create.backoff_after(1), Duration::from_secs(60));
        assert_eq!(create.backoff_after(2), Duration::from_secs(180));
        assert_eq!(create.backoff_after(9), Duration::from_secs(300));

        let query = Job::query("sendMessage", serde_json::json!({})).policy();
        assert_eq!(query.tries, 5);
        assert_eq!(query.timeout, Duration::from_secs(20));
        assert_eq!(query.backoff_after(1), Duration::ZERO);
    }
}

//! Broadcast fan-out: a message posted in the broadcast topic is copied to every eligible
//! customer, one delivery job per recipient.

use std::time::Duration;

use desk_core::{ApiErrorType, DeskError, InboundUpdate};
use serde_json::json;
use storage::BroadcastBatch;
use tracing::{debug, info, warn};

use crate::desk::Desk;
use crate::jobs::{Job, JobOutcome};
use crate::messages;
use crate::outbound::OutboundMessage;

/// Recipients per chunk; chunk N starts N seconds after the first one.
pub const CHUNK_SIZE: usize = 100;
const IDEMPOTENCY_TTL: Duration = Duration::from_secs(60 * 60);
const FALLBACK_RELEASE: Duration = Duration::from_secs(1);

/// Result of [`BroadcastFanout::setup_topic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicSetup {
    /// A topic is already configured; nothing was created.
    Existing(i64),
    Created(i64),
}

impl TopicSetup {
    pub fn topic_id(self) -> i64 {
        match self {
            TopicSetup::Existing(id) | TopicSetup::Created(id) => id,
        }
    }
}

#[derive(Clone)]
pub struct BroadcastFanout {
    desk: Desk,
}

impl BroadcastFanout {
    pub fn new(desk: Desk) -> Self {
        Self { desk }
    }

    /// Human message in the broadcast topic of the support group.
    pub fn is_broadcast(&self, update: &InboundUpdate) -> bool {
        update.is_supergroup()
            && update.chat_id == self.desk.group_id()
            && !update.is_bot()
            && self.desk.settings.broadcast_topic.matches(update.thread_id)
    }

    /// Fans the update out. `None` for duplicates, unsupported content or nobody to send to.
    pub async fn handle(&self, update: &InboundUpdate) -> Result<Option<BroadcastBatch>, DeskError> {
        let message_id = update.message_id.unwrap_or(0);
        let key = format!("broadcast_processed_{}_{}", update.update_id, message_id);
        match self.desk.cache.add(&key, "1", IDEMPOTENCY_TTL).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(update_id = update.update_id, message_id, "Broadcast already processed");
                return Ok(None);
            }
            Err(e) => warn!(update_id = update.update_id, error = %e, "Broadcast dedupe unavailable"),
        }

        if update.media_group_id.is_some() {
            warn!(message_id, "Media group in broadcast, only this item is sent");
        }
        let Some(message) = OutboundMessage::for_broadcast(update) else {
            warn!(update_id = update.update_id, message_id, "Unsupported broadcast content");
            return Ok(None);
        };

        let recipients = self.desk.db.customers.broadcast_recipients().await?;
        if recipients.is_empty() {
            warn!(update_id = update.update_id, "No broadcast recipients");
            return Ok(None);
        }

        let batch = BroadcastBatch::new(
            update.update_id,
            message_id,
            message.method.clone(),
            recipients.len() as i64,
        );
        self.desk.db.broadcasts.create(&batch).await?;

        for (chunk_index, chunk) in recipients.chunks(CHUNK_SIZE).enumerate() {
            let delay = Duration::from_secs(chunk_index as u64);
            for customer in chunk {
                self.desk.jobs.dispatch(
                    Job::BroadcastDelivery {
                        batch_id: batch.id.clone(),
                        customer_id: customer.id,
                        message: message.clone(),
                    },
                    delay,
                );
            }
        }
        info!(
            batch_id = %batch.id,
            update_id = update.update_id,
            method = %batch.method,
            recipients = recipients.len(),
            chunks = recipients.len().div_ceil(CHUNK_SIZE),
            "Broadcast queued"
        );

        if let Some(topic_id) = update.thread_id {
            self.desk
                .send_to_topic(topic_id, &messages::broadcast_queued(recipients.len()));
        }
        Ok(Some(batch))
    }

    /// Executes `BroadcastDelivery` for one recipient.
    pub async fn deliver(
        &self,
        batch_id: &str,
        customer_id: i64,
        message: &mut OutboundMessage,
    ) -> JobOutcome {
        match self.desk.db.broadcasts.is_cancelled(batch_id).await {
            Ok(true) => {
                debug!(batch_id, customer_id, "Batch cancelled, skipping");
                return JobOutcome::Done;
            }
            Ok(false) => {}
            Err(e) => return JobOutcome::Retry(e.to_string()),
        }

        let customer = match self.desk.db.customers.find_by_id(customer_id).await {
            Ok(Some(customer)) => customer,
            Ok(None) => {
                self.record_failed(batch_id).await;
                return JobOutcome::Fail(format!("customer {} not found", customer_id));
            }
            Err(e) => return JobOutcome::Retry(e.to_string()),
        };

        let params = message.params_for(customer.chat_id, None);
        let response = self.desk.api.send_query(&message.method, params).await;
        if response.ok {
            if let Err(e) = self.desk.db.broadcasts.record_delivered(batch_id).await {
                warn!(batch_id, customer_id, error = %e, "Delivered broadcast not counted");
            }
            return JobOutcome::Done;
        }
        if response.is_rate_limited() {
            return JobOutcome::Release(Duration::from_secs(response.retry_after.unwrap_or(3)));
        }
        if response.has_error(ApiErrorType::MarkdownError) && message.fall_back_to_plain() {
            return JobOutcome::Release(FALLBACK_RELEASE);
        }

        self.record_failed(batch_id).await;
        if response.is_forbidden() {
            info!(batch_id, customer_id, "Recipient blocked the bot");
        } else {
            warn!(
                batch_id,
                customer_id,
                code = response.code,
                error = ?response.type_error,
                description = ?response.description,
                "Broadcast delivery failed"
            );
        }
        JobOutcome::Fail(response.description.unwrap_or_else(|| "broadcast delivery failed".into()))
    }

    /// Counts one recipient as failed.
    pub async fn record_failed(&self, batch_id: &str) {
        if let Err(e) = self.desk.db.broadcasts.record_failed(batch_id).await {
            warn!(batch_id, error = %e, "Failed broadcast not counted");
        }
    }

    /// One batch, or the most recent ones.
    pub async fn status(&self, batch_id: Option<&str>, limit: i64) -> Result<Vec<BroadcastBatch>, DeskError> {
        match batch_id {
            Some(id) => Ok(self.desk.db.broadcasts.find(id).await?.into_iter().collect()),
            None => Ok(self.desk.db.broadcasts.list_recent(limit).await?),
        }
    }

    /// Creates the broadcast topic in the support group. A configured topic is kept unless `force`.
    pub async fn setup_topic(&self, name: &str, force: bool) -> Result<TopicSetup, DeskError> {
        match self.desk.settings.broadcast_topic.id() {
            Some(topic_id) if !force => return Ok(TopicSetup::Existing(topic_id)),
            _ => {}
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(DeskError::Validation("topic name is empty".into()));
        }

        let response = self
            .desk
            .api
            .send_query(
                "createForumTopic",
                json!({ "chat_id": self.desk.group_id(), "name": name }),
            )
            .await;
        if !response.ok {
            let description = response
                .description
                .clone()
                .unwrap_or_else(|| "createForumTopic failed".into());
            return Err(if response.is_forbidden() {
                DeskError::Permission(description)
            } else {
                DeskError::TransientApi(description)
            });
        }
        let topic_id = response.message_thread_id.ok_or_else(|| {
            DeskError::Unknown("createForumTopic answered without a thread id".into())
        })?;
        info!(topic_id, name, "Broadcast topic created");
        Ok(TopicSetup::Created(topic_id))
    }

    pub async fn cancel(&self, batch_id: &str) -> Result<bool, DeskError> {
        let cancelled = self.desk.db.broadcasts.cancel(batch_id).await?;
        if cancelled {
            info!(batch_id, "Broadcast cancelled");
        }
        Ok(cancelled)
    }
}

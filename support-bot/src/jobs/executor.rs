//! Maps each [`Job`] onto the desk component that executes it.

use std::time::Duration;

use async_trait::async_trait;
use desk_core::ApiErrorType;
use tracing::{debug, instrument, warn};

use super::{Job, JobHandler, JobOutcome};
use crate::broadcast::BroadcastFanout;
use crate::contact_card::ContactCard;
use crate::delivery::Delivery;
use crate::desk::Desk;
use crate::topic::TopicLifecycle;

pub struct DeskJobHandler {
    desk: Desk,
    topics: TopicLifecycle,
    delivery: Delivery,
    broadcast: BroadcastFanout,
}

impl DeskJobHandler {
    pub fn new(desk: Desk) -> Self {
        Self {
            topics: TopicLifecycle::new(desk.clone()),
            delivery: Delivery::new(desk.clone()),
            broadcast: BroadcastFanout::new(desk.clone()),
            desk,
        }
    }

    async fn query(&self, method: &str, params: serde_json::Value) -> JobOutcome {
        let response = self.desk.api.send_query(method, params).await;
        if response.ok {
            return JobOutcome::Done;
        }
        if response.is_rate_limited() {
            return JobOutcome::Release(Duration::from_secs(response.retry_after.unwrap_or(3)));
        }
        if response.has_error(ApiErrorType::Network) {
            return JobOutcome::Retry(response.description.unwrap_or_default());
        }
        if response.has_error(ApiErrorType::NotModified) {
            debug!(method, "Nothing to change");
            return JobOutcome::Done;
        }
        warn!(
            method,
            code = response.code,
            error = ?response.type_error,
            description = ?response.description,
            "Bot API call failed"
        );
        JobOutcome::Fail(response.description.unwrap_or_else(|| method.to_string()))
    }
}

#[async_trait]
impl JobHandler for DeskJobHandler {
    #[instrument(skip_all, fields(job = job.name(), customer_id = job.customer_id()))]
    async fn execute(&self, job: &mut Job) -> JobOutcome {
        match job {
            Job::TelegramQuery { method, params } => self.query(method, params.clone()).await,
            Job::CreateTopic { customer_id } => self.topics.create(*customer_id).await,
            Job::DeliverToTopic {
                customer_id,
                message,
                source_message_id,
                topic_recreated,
            } => {
                self.delivery
                    .to_topic(*customer_id, message, *source_message_id, *topic_recreated)
                    .await
            }
            Job::DeliverToCustomer {
                customer_id,
                message,
                source_message_id,
            } => {
                self.delivery
                    .to_customer(*customer_id, message, *source_message_id)
                    .await
            }
            Job::BroadcastDelivery {
                batch_id,
                customer_id,
                message,
            } => self.broadcast.deliver(batch_id, *customer_id, message).await,
            Job::SyncContactCard { customer_id, mode } => {
                ContactCard::new(self.desk.clone())
                    .sync(*customer_id, *mode)
                    .await
            }
        }
    }

    async fn on_exhausted(&self, job: &Job) {
        if let Job::BroadcastDelivery {
            batch_id,
            customer_id,
            ..
        } = job
        {
            warn!(batch_id = %batch_id, customer_id, "Broadcast delivery gave up");
            self.broadcast.record_failed(batch_id).await;
        }
    }
}

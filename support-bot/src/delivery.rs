//! Relay of messages between customers and their topics.
//!
//! Both directions share one error policy: 429 releases for `retry_after`, a rejected parse mode
//! switches to the plain fallback and releases, network errors retry, everything else fails.
//! A lost topic is unlinked and recreated once before the message is resent.

use std::time::Duration;

use desk_core::{ApiErrorType, ApiResponse, Platform};
use storage::{Customer, MessageDirection, MessageRecord};
use tracing::{debug, error, info, warn};

use crate::desk::Desk;
use crate::jobs::{CardMode, Job, JobOutcome};
use crate::outbound::OutboundMessage;
use crate::topic::{TopicIcon, TopicLifecycle};

const FALLBACK_RELEASE: Duration = Duration::from_secs(1);
const DEFAULT_RETRY_AFTER: u64 = 3;

pub struct Delivery {
    desk: Desk,
    topics: TopicLifecycle,
}

impl Delivery {
    pub fn new(desk: Desk) -> Self {
        let topics = TopicLifecycle::new(desk.clone());
        Self { desk, topics }
    }

    /// Executes `DeliverToTopic`.
    pub async fn to_topic(
        &self,
        customer_id: i64,
        message: &mut OutboundMessage,
        source_message_id: Option<i64>,
        topic_recreated: bool,
    ) -> JobOutcome {
        let customer = match self.load(customer_id).await {
            Ok(customer) => customer,
            Err(outcome) => return outcome,
        };

        let Some(topic_id) = customer.topic_id else {
            if topic_recreated {
                return JobOutcome::Fail(format!("customer {} still has no topic", customer_id));
            }
            debug!(customer_id, "No topic yet, creating one before delivery");
            self.recreate_then_resend(customer_id, message, source_message_id);
            return JobOutcome::Done;
        };

        let params = message.params_for(self.desk.group_id(), Some(topic_id));
        let response = self.desk.api.send_query(&message.method, params).await;
        if response.ok {
            self.log_message(
                &customer,
                MessageDirection::Incoming,
                message,
                source_message_id,
                response.message_id,
            )
            .await;
            self.topics.update_icon(&customer, TopicIcon::Incoming).await;
            return JobOutcome::Done;
        }

        if response.is_topic_missing() {
            if topic_recreated {
                error!(customer_id, topic_id, "Recreated topic is missing too, giving up");
                return JobOutcome::Fail("topic missing after recreation".into());
            }
            warn!(customer_id, topic_id, error = ?response.type_error, "Topic is gone, recreating");
            if let Err(e) = self.topics.forget_topic(customer_id, topic_id).await {
                return JobOutcome::Retry(e.to_string());
            }
            self.recreate_then_resend(customer_id, message, source_message_id);
            return JobOutcome::Done;
        }

        failure_outcome(customer_id, message, response)
    }

    /// Executes `DeliverToCustomer`.
    pub async fn to_customer(
        &self,
        customer_id: i64,
        message: &mut OutboundMessage,
        source_message_id: Option<i64>,
    ) -> JobOutcome {
        let customer = match self.load(customer_id).await {
            Ok(customer) => customer,
            Err(outcome) => return outcome,
        };
        if customer.platform_kind() != Platform::Telegram {
            info!(customer_id, platform = %customer.platform, "No outbound transport for platform");
            return JobOutcome::Done;
        }

        let params = message.params_for(customer.chat_id, None);
        let response = self.desk.api.send_query(&message.method, params).await;
        if response.ok {
            self.log_message(
                &customer,
                MessageDirection::Outgoing,
                message,
                source_message_id,
                response.message_id,
            )
            .await;
            self.topics.update_icon(&customer, TopicIcon::Outgoing).await;
            return JobOutcome::Done;
        }

        if response.is_forbidden() {
            warn!(customer_id, "Customer blocked the bot, marking as banned");
            if let Err(e) = self.desk.db.customers.set_banned(customer_id, true).await {
                warn!(customer_id, error = %e, "Failed to mark customer as banned");
            }
            self.desk.jobs.dispatch_now(Job::SyncContactCard {
                customer_id,
                mode: CardMode::Upsert,
            });
            return JobOutcome::Fail("bot blocked by customer".into());
        }

        failure_outcome(customer_id, message, response)
    }

    async fn load(&self, customer_id: i64) -> Result<Customer, JobOutcome> {
        match self.desk.db.customers.find_by_id(customer_id).await {
            Ok(Some(customer)) => Ok(customer),
            Ok(None) => Err(JobOutcome::Fail(format!("customer {} not found", customer_id))),
            Err(e) if e.is_retryable() => Err(JobOutcome::Retry(e.to_string())),
            Err(e) => Err(JobOutcome::Fail(e.to_string())),
        }
    }

    fn recreate_then_resend(
        &self,
        customer_id: i64,
        message: &OutboundMessage,
        source_message_id: Option<i64>,
    ) {
        self.desk.jobs.dispatch_chain(vec![
            Job::CreateTopic { customer_id },
            Job::DeliverToTopic {
                customer_id,
                message: message.clone(),
                source_message_id,
                topic_recreated: true,
            },
        ]);
    }

    async fn log_message(
        &self,
        customer: &Customer,
        direction: MessageDirection,
        message: &OutboundMessage,
        source_message_id: Option<i64>,
        delivered_message_id: Option<i64>,
    ) {
        let record = MessageRecord::new(
            customer.id,
            direction,
            message.message_type.clone(),
            message.content.clone(),
            source_message_id,
            delivered_message_id,
        );
        if let Err(e) = self.desk.db.messages.save(&record).await {
            error!(customer_id = customer.id, error = %e, "Message delivered but not logged");
        }
    }
}

/// Outcome for a failed send that is not topic- or recipient-specific.
pub(crate) fn failure_outcome(
    customer_id: i64,
    message: &mut OutboundMessage,
    response: ApiResponse,
) -> JobOutcome {
    if response.is_rate_limited() {
        let retry_after = response.retry_after.unwrap_or(DEFAULT_RETRY_AFTER);
        return JobOutcome::Release(Duration::from_secs(retry_after));
    }
    if response.has_error(ApiErrorType::MarkdownError) && message.fall_back_to_plain() {
        warn!(customer_id, method = %message.method, "Parse mode rejected, resending with entities");
        return JobOutcome::Release(FALLBACK_RELEASE);
    }
    if response.has_error(ApiErrorType::Network) {
        return JobOutcome::Retry(response.description.unwrap_or_default());
    }
    error!(
        customer_id,
        method = %message.method,
        code = response.code,
        error = ?response.type_error,
        description = ?response.description,
        "Delivery failed"
    );
    JobOutcome::Fail(
        response
            .description
            .unwrap_or_else(|| format!("{} failed", message.method)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rich() -> OutboundMessage {
        let mut message = OutboundMessage::html("<b>x</b>");
        let mut fallback = serde_json::Map::new();
        fallback.insert("text".into(), json!("x"));
        message.fallback = Some(fallback);
        message
    }

    #[test]
    fn test_rate_limit_releases_for_retry_after() {
        let mut message = OutboundMessage::text("hi");
        let outcome = failure_outcome(1, &mut message, ApiResponse::rate_limited(7));
        assert_eq!(outcome, JobOutcome::Release(Duration::from_secs(7)));
    }

    #[test]
    fn test_markdown_error_falls_back_once() {
        let mut message = rich();
        let response = ApiResponse::failure(400, "Bad Request: can't parse entities: oops");
        let outcome = failure_outcome(1, &mut message, response.clone());
        assert_eq!(outcome, JobOutcome::Release(FALLBACK_RELEASE));
        assert_eq!(message.params["text"], "x");

        let outcome = failure_outcome(1, &mut message, response);
        assert!(matches!(outcome, JobOutcome::Fail(_)));
    }

    #[test]
    fn test_network_error_retries() {
        let mut message = OutboundMessage::text("hi");
        let outcome = failure_outcome(1, &mut message, ApiResponse::network_error("timeout"));
        assert!(matches!(outcome, JobOutcome::Retry(_)));
    }
}

//! Support group traffic inside customer topics: manager commands, topic renames and relay of
//! manager replies to the customer.

use async_trait::async_trait;
use desk_core::{DeskError, Handler, HandlerResponse, InboundUpdate, Platform, Result, UpdateKind};
use storage::Customer;
use tracing::{debug, info, instrument, warn};

use crate::desk::Desk;
use crate::jobs::{CardMode, Job};
use crate::messages;
use crate::outbound::OutboundMessage;
use crate::registration::contact_request_keyboard;
use crate::topic::TopicLifecycle;

/// Asks the customer for a phone number, or posts the known one into the topic.
pub(crate) fn request_phone(desk: &Desk, customer: &Customer) {
    if let Some(phone) = customer.phone_number() {
        if let Some(topic_id) = customer.topic_id {
            desk.send_to_topic(topic_id, &messages::phone_already_known(phone));
        }
        return;
    }
    if customer.platform_kind() != Platform::Telegram {
        info!(customer_id = customer.id, platform = %customer.platform, "Phone request not supported for platform");
        return;
    }
    desk.send(
        customer.chat_id,
        OutboundMessage::text(messages::REQUEST_PHONE_FROM_GROUP)
            .with_reply_markup(contact_request_keyboard()),
    );
    if let Some(topic_id) = customer.topic_id {
        desk.send_to_topic(topic_id, messages::PHONE_REQUEST_SENT);
    }
    info!(customer_id = customer.id, "Phone requested from customer");
}

pub struct GroupHandler {
    desk: Desk,
    topics: TopicLifecycle,
}

impl GroupHandler {
    pub fn new(desk: Desk) -> Self {
        let topics = TopicLifecycle::new(desk.clone());
        Self { desk, topics }
    }

    async fn topic_edited(&self, update: &InboundUpdate, topic_id: i64, name: &str) -> Result<()> {
        if !update.is_bot() {
            if let Some(customer) = self.desk.db.customers.find_by_topic_id(topic_id).await? {
                self.topics.save_edited_name(&customer, name).await?;
            }
        }
        if let Some(message_id) = update.message_id {
            self.desk.delete_message(self.desk.group_id(), message_id);
        }
        Ok(())
    }

    /// Runs a manager command. False when the text is not one of ours.
    async fn command(&self, update: &InboundUpdate, customer: &Customer, topic_id: i64) -> bool {
        if update.is_command("/contact") {
            self.desk.jobs.dispatch_now(Job::SyncContactCard {
                customer_id: customer.id,
                mode: CardMode::SendNew,
            });
        } else if update.is_command("/request_phone") || update.is_command("/get_phone") {
            request_phone(&self.desk, customer);
        } else if update.is_command("/rename_topic") {
            let requested = update.command_args().unwrap_or_default();
            match self.topics.rename(customer, requested).await {
                Ok(_) => {}
                Err(DeskError::Validation(notice)) => self.desk.send_to_topic(topic_id, &notice),
                Err(e) => warn!(customer_id = customer.id, error = %e, "Topic rename failed"),
            }
        } else if update.is_command("/restore_topic_name") {
            match self.topics.restore_default_name(customer).await {
                Ok(_) => self
                    .desk
                    .send_to_topic(topic_id, messages::TOPIC_NAME_RESTORED),
                Err(e) => warn!(customer_id = customer.id, error = %e, "Topic name not restored"),
            }
        } else {
            return false;
        }
        true
    }
}

#[async_trait]
impl Handler for GroupHandler {
    #[instrument(skip(self, update), fields(thread_id = ?update.thread_id))]
    async fn handle(&self, update: &InboundUpdate) -> Result<HandlerResponse> {
        if !update.is_supergroup()
            || update.kind != UpdateKind::Message
            || update.chat_id != self.desk.group_id()
        {
            return Ok(HandlerResponse::Continue);
        }
        let Some(topic_id) = update.thread_id else {
            debug!("Group message outside topics, ignoring");
            return Ok(HandlerResponse::Stop);
        };

        if let Some(name) = &update.topic_edited_name {
            self.topic_edited(update, topic_id, name).await?;
            return Ok(HandlerResponse::Stop);
        }
        if update.is_bot() {
            return Ok(HandlerResponse::Stop);
        }

        let Some(customer) = self.desk.db.customers.find_by_topic_id(topic_id).await? else {
            debug!(topic_id, "No customer for topic");
            return Ok(HandlerResponse::Stop);
        };

        if self.command(update, &customer, topic_id).await {
            return Ok(HandlerResponse::Stop);
        }
        if update.text().is_some_and(|t| t.starts_with('/')) {
            debug!(topic_id, "Unknown command in topic, ignoring");
            return Ok(HandlerResponse::Stop);
        }

        match customer.platform_kind() {
            Platform::Telegram => {
                let Some(message) = OutboundMessage::from_manager_update(update) else {
                    debug!(topic_id, "Nothing to relay to customer");
                    return Ok(HandlerResponse::Stop);
                };
                self.desk.jobs.dispatch_now(Job::DeliverToCustomer {
                    customer_id: customer.id,
                    message,
                    source_message_id: update.message_id,
                });
            }
            Platform::Vk | Platform::ExternalSource => {
                info!(customer_id = customer.id, platform = %customer.platform, "No outbound transport, reply kept in topic");
            }
            Platform::Ignore => {}
        }
        Ok(HandlerResponse::Stop)
    }
}

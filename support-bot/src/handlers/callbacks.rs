//! Inline keyboard presses: contact card moderation in topics, data editing in private chats.

use async_trait::async_trait;
use desk_core::{Handler, HandlerResponse, InboundUpdate, Platform, Result, UpdateKind};
use serde_json::json;
use storage::Customer;
use tracing::{debug, info, instrument, warn};

use super::group::request_phone;
use super::private::{CANCEL_EDIT, EDIT_EMAIL, EDIT_FULL_NAME, EDIT_PHONE};
use crate::contact_card::{BAN_FALSE, BAN_TRUE, CLOSE_TOPIC, REQUEST_PHONE};
use crate::desk::Desk;
use crate::jobs::{CardMode, Job};
use crate::registration::RegistrationFlow;
use crate::state::ContactField;
use crate::topic::TopicLifecycle;

pub struct CallbackHandler {
    desk: Desk,
    topics: TopicLifecycle,
    registration: RegistrationFlow,
}

impl CallbackHandler {
    pub fn new(desk: Desk) -> Self {
        Self {
            topics: TopicLifecycle::new(desk.clone()),
            registration: RegistrationFlow::new(desk.clone()),
            desk,
        }
    }

    async fn customer_for(&self, update: &InboundUpdate) -> Result<Option<Customer>> {
        if update.is_private() {
            return Ok(self
                .desk
                .db
                .customers
                .find_by_chat(Platform::Telegram, update.chat_id)
                .await?);
        }
        if update.chat_id != self.desk.group_id() {
            return Ok(None);
        }
        match update.thread_id {
            Some(topic_id) => Ok(self.desk.db.customers.find_by_topic_id(topic_id).await?),
            None => Ok(None),
        }
    }

    async fn set_banned(&self, customer: &Customer, banned: bool, message_id: Option<i64>) -> Result<()> {
        let customer = self.desk.db.customers.set_banned(customer.id, banned).await?;
        info!(customer_id = customer.id, banned, "Ban status changed");
        let mode = match message_id {
            Some(message_id) => CardMode::EditAt(message_id),
            None => CardMode::Upsert,
        };
        self.desk.jobs.dispatch_now(Job::SyncContactCard {
            customer_id: customer.id,
            mode,
        });
        Ok(())
    }
}

#[async_trait]
impl Handler for CallbackHandler {
    #[instrument(skip(self, update), fields(chat_id = update.chat_id))]
    async fn handle(&self, update: &InboundUpdate) -> Result<HandlerResponse> {
        if update.kind != UpdateKind::CallbackQuery {
            return Ok(HandlerResponse::Continue);
        }
        let Some(callback) = &update.callback else {
            return Ok(HandlerResponse::Stop);
        };
        self.desk.query(
            "answerCallbackQuery",
            json!({ "callback_query_id": callback.id }),
        );

        let Some(customer) = self.customer_for(update).await? else {
            debug!(data = %callback.data, "Callback without a known customer");
            return Ok(HandlerResponse::Stop);
        };

        let private = update.is_private();
        match callback.data.as_str() {
            BAN_TRUE | BAN_FALSE if !private => {
                self.set_banned(&customer, callback.data == BAN_TRUE, update.message_id)
                    .await?;
            }
            CLOSE_TOPIC if !private => self.topics.close(&customer),
            REQUEST_PHONE if !private => request_phone(&self.desk, &customer),
            EDIT_FULL_NAME if private => {
                self.registration
                    .begin_edit(&customer, ContactField::FullName)
                    .await
            }
            EDIT_PHONE if private => {
                self.registration
                    .begin_edit(&customer, ContactField::Phone)
                    .await
            }
            EDIT_EMAIL if private => {
                self.registration
                    .begin_edit(&customer, ContactField::Email)
                    .await
            }
            CANCEL_EDIT if private => self.registration.cancel(customer.chat_id).await,
            other => warn!(data = %other, private, "Unhandled callback"),
        }
        Ok(HandlerResponse::Stop)
    }
}

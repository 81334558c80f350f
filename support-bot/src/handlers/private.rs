//! Private chat traffic: commands, the registration flow and relay into the customer's topic.

use async_trait::async_trait;
use desk_core::{Handler, HandlerResponse, InboundUpdate, Platform, Result, UpdateKind};
use storage::{Customer, CustomerProfile};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::{debug, info, instrument};

use crate::desk::Desk;
use crate::jobs::Job;
use crate::messages;
use crate::outbound::OutboundMessage;
use crate::registration::{contact_request_keyboard, RegistrationFlow};
use crate::state::ContactField;

pub const EDIT_FULL_NAME: &str = "edit_full_name";
pub const EDIT_PHONE: &str = "edit_phone";
pub const EDIT_EMAIL: &str = "edit_email";
pub const CANCEL_EDIT: &str = "cancel_edit";

/// Profile fields carried by the sender of an update.
pub fn profile_of(update: &InboundUpdate) -> CustomerProfile {
    match &update.from {
        Some(user) => CustomerProfile {
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        },
        None => CustomerProfile::default(),
    }
}

/// `/my_data` menu: one edit button per field plus cancel.
pub fn my_data_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback("Edit name", EDIT_FULL_NAME)],
        vec![InlineKeyboardButton::callback("Edit phone", EDIT_PHONE)],
        vec![InlineKeyboardButton::callback("Edit email", EDIT_EMAIL)],
        vec![InlineKeyboardButton::callback("Cancel", CANCEL_EDIT)],
    ])
}

pub struct PrivateHandler {
    desk: Desk,
    registration: RegistrationFlow,
}

impl PrivateHandler {
    pub fn new(desk: Desk) -> Self {
        let registration = RegistrationFlow::new(desk.clone());
        Self { desk, registration }
    }

    /// Runs a private-chat command. False when the text is not one of ours.
    async fn command(&self, update: &InboundUpdate, customer: &Customer) -> bool {
        let chat_id = customer.chat_id;
        if update.is_command("/start") {
            self.registration.on_start_command(update, customer).await;
        } else if update.is_command("/phone") || update.is_command("/share_phone") {
            self.desk.send(
                chat_id,
                OutboundMessage::text(messages::SHARE_PHONE_PROMPT)
                    .with_reply_markup(contact_request_keyboard()),
            );
        } else if update.is_command("/my_data") {
            let markup = serde_json::to_value(my_data_keyboard()).unwrap_or_default();
            self.desk.send(
                chat_id,
                OutboundMessage::html(messages::my_data(customer)).with_reply_markup(markup),
            );
        } else if update.is_command("/edit_name") {
            self.registration
                .begin_edit(customer, ContactField::FullName)
                .await;
        } else if update.is_command("/edit_phone") {
            self.registration.begin_edit(customer, ContactField::Phone).await;
        } else if update.is_command("/edit_email") {
            self.registration.begin_edit(customer, ContactField::Email).await;
        } else if update.is_command("/cancel") {
            self.registration.cancel(chat_id).await;
        } else {
            return false;
        }
        true
    }
}

#[async_trait]
impl Handler for PrivateHandler {
    #[instrument(skip(self, update), fields(chat_id = update.chat_id))]
    async fn handle(&self, update: &InboundUpdate) -> Result<HandlerResponse> {
        if !update.is_private() || update.kind != UpdateKind::Message || update.is_bot() {
            return Ok(HandlerResponse::Continue);
        }

        let customer = self
            .desk
            .db
            .customers
            .get_or_create(Platform::Telegram, update.chat_id, &profile_of(update))
            .await?;

        if customer.is_banned {
            info!(customer_id = customer.id, "Banned customer wrote, not forwarding");
            self.desk.send_text(customer.chat_id, messages::BANNED);
            return Ok(HandlerResponse::Stop);
        }

        if self.command(update, &customer).await {
            return Ok(HandlerResponse::Stop);
        }

        let state = self.desk.state.get(update.chat_id).await;
        if state.is_none() && customer.needs_registration() && update.text().is_some() {
            self.registration.start_first_contact(&customer).await;
            return Ok(HandlerResponse::Stop);
        }
        if state.is_some() && self.registration.handle(update, &customer).await {
            return Ok(HandlerResponse::Stop);
        }

        if let Some(contact) = &update.contact {
            self.registration
                .save_shared_phone(&customer, &contact.phone_number)
                .await;
        }

        let Some(message) = OutboundMessage::from_customer_update(update) else {
            debug!(customer_id = customer.id, "Nothing to relay");
            return Ok(HandlerResponse::Stop);
        };
        self.desk.jobs.dispatch_now(Job::DeliverToTopic {
            customer_id: customer.id,
            message,
            source_message_id: update.message_id,
            topic_recreated: false,
        });
        Ok(HandlerResponse::Stop)
    }
}

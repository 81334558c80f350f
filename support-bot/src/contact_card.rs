//! Contact card: the pinned-style summary message at the top of each topic, with the moderation
//! keyboard.

use std::time::Duration;

use desk_core::{ApiErrorType, ApiResponse, Platform};
use serde_json::{json, Value};
use storage::Customer;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::{debug, error, info, warn};

use crate::desk::Desk;
use crate::formatting::escape_html;
use crate::jobs::{CardMode, JobOutcome};

pub const BAN_TRUE: &str = "topic_user_ban_true";
pub const BAN_FALSE: &str = "topic_user_ban_false";
pub const REQUEST_PHONE: &str = "request_phone_from_group";
pub const CLOSE_TOPIC: &str = "close_topic";

const NEW_CARD_ICON_DELAY: Duration = Duration::from_secs(1);

/// Card text, HTML. Field values are escaped.
pub fn render(customer: &Customer) -> String {
    let mut text = String::new();
    if customer.is_banned {
        text.push_str("<b>🚫 CUSTOMER BLOCKED 🚫</b>\n\n");
    }
    text.push_str("<b>CONTACT INFORMATION</b>\n");
    text.push_str(&format!("Source: {}\n", escape_html(&customer.platform)));
    text.push_str(&format!("ID: {}\n", customer.chat_id));
    if customer.platform_kind() == Platform::Telegram {
        if let Some(username) = customer.username() {
            text.push_str(&format!(
                "Link: https://t.me/{}\n",
                escape_html(username.trim_start_matches('@'))
            ));
        }
    }
    let fields = [
        ("Name", customer.full_name()),
        ("Phone", customer.phone_number()),
        ("Email", customer.email()),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            text.push_str(&format!("{}: <b>{}</b>\n", label, escape_html(value)));
        }
    }
    text
}

/// Ban toggle, phone request (only while no phone is known) and close.
pub fn keyboard(customer: &Customer) -> InlineKeyboardMarkup {
    let ban = if customer.is_banned {
        InlineKeyboardButton::callback("Unblock", BAN_FALSE)
    } else {
        InlineKeyboardButton::callback("Block", BAN_TRUE)
    };
    let mut rows = vec![vec![ban]];
    if customer.phone_number().is_none() {
        rows.push(vec![InlineKeyboardButton::callback(
            "Request phone",
            REQUEST_PHONE,
        )]);
    }
    rows.push(vec![InlineKeyboardButton::callback("Close topic", CLOSE_TOPIC)]);
    InlineKeyboardMarkup::new(rows)
}

fn keyboard_value(customer: &Customer) -> Value {
    serde_json::to_value(keyboard(customer)).unwrap_or_default()
}

pub struct ContactCard {
    desk: Desk,
}

impl ContactCard {
    pub fn new(desk: Desk) -> Self {
        Self { desk }
    }

    /// Executes `SyncContactCard`.
    pub async fn sync(&self, customer_id: i64, mode: CardMode) -> JobOutcome {
        let customer = match self.desk.db.customers.find_by_id(customer_id).await {
            Ok(Some(customer)) => customer,
            Ok(None) => return JobOutcome::Fail(format!("customer {} not found", customer_id)),
            Err(e) if e.is_retryable() => return JobOutcome::Retry(e.to_string()),
            Err(e) => return JobOutcome::Fail(e.to_string()),
        };
        let Some(topic_id) = customer.topic_id else {
            debug!(customer_id, "No topic yet, contact card skipped");
            return JobOutcome::Done;
        };

        match mode {
            CardMode::EditAt(message_id) => {
                let response = self.edit(&customer, topic_id, message_id).await;
                self.edit_outcome(&customer, response)
            }
            CardMode::SendNew => self.send_new(&customer, topic_id).await,
            CardMode::Upsert => match customer.contact_info_message_id {
                Some(message_id) => {
                    let response = self.edit(&customer, topic_id, message_id).await;
                    if response.has_error(ApiErrorType::MessageNotFound) {
                        warn!(customer_id, message_id, "Contact card is gone, posting a new one");
                        if let Err(e) = self
                            .desk
                            .db
                            .customers
                            .set_contact_message_id(customer_id, None)
                            .await
                        {
                            warn!(customer_id, error = %e, "Failed to clear contact card id");
                        }
                        return self.send_new(&customer, topic_id).await;
                    }
                    self.edit_outcome(&customer, response)
                }
                None => self.send_new(&customer, topic_id).await,
            },
        }
    }

    async fn edit(&self, customer: &Customer, topic_id: i64, message_id: i64) -> ApiResponse {
        self.desk
            .api
            .send_query(
                "editMessageText",
                json!({
                    "chat_id": self.desk.group_id(),
                    "message_thread_id": topic_id,
                    "message_id": message_id,
                    "text": render(customer),
                    "parse_mode": "HTML",
                    "reply_markup": keyboard_value(customer),
                }),
            )
            .await
    }

    fn edit_outcome(&self, customer: &Customer, response: ApiResponse) -> JobOutcome {
        if response.ok || response.has_error(ApiErrorType::NotModified) {
            debug!(customer_id = customer.id, "Contact card updated");
            return JobOutcome::Done;
        }
        failure_outcome(customer.id, "editMessageText", response)
    }

    async fn send_new(&self, customer: &Customer, topic_id: i64) -> JobOutcome {
        let response = self
            .desk
            .api
            .send_query(
                "sendMessage",
                json!({
                    "chat_id": self.desk.group_id(),
                    "message_thread_id": topic_id,
                    "text": render(customer),
                    "parse_mode": "HTML",
                    "reply_markup": keyboard_value(customer),
                }),
            )
            .await;
        if !response.ok {
            return failure_outcome(customer.id, "sendMessage", response);
        }

        if let Some(message_id) = response.message_id {
            if let Err(e) = self
                .desk
                .db
                .customers
                .set_contact_message_id(customer.id, Some(message_id))
                .await
            {
                warn!(customer_id = customer.id, error = %e, "Contact card sent but id not stored");
            }
            info!(customer_id = customer.id, topic_id, message_id, "Contact card posted");
        }

        // A fresh card in a topic nobody wrote to yet gets the incoming icon.
        let has_incoming = self
            .desk
            .db
            .messages
            .has_incoming(customer.id)
            .await
            .unwrap_or(true);
        if !has_incoming {
            if let Some(icon) = &self.desk.settings.icons.incoming {
                self.desk.query_after(
                    "editForumTopic",
                    json!({
                        "chat_id": self.desk.group_id(),
                        "message_thread_id": topic_id,
                        "icon_custom_emoji_id": icon,
                    }),
                    NEW_CARD_ICON_DELAY,
                );
            }
        }
        JobOutcome::Done
    }
}

fn failure_outcome(customer_id: i64, method: &str, response: ApiResponse) -> JobOutcome {
    if response.is_rate_limited() {
        return JobOutcome::Release(Duration::from_secs(response.retry_after.unwrap_or(3)));
    }
    if response.has_error(ApiErrorType::Network) {
        return JobOutcome::Retry(response.description.unwrap_or_default());
    }
    error!(
        customer_id,
        method,
        code = response.code,
        description = ?response.description,
        "Contact card request failed"
    );
    JobOutcome::Fail(response.description.unwrap_or_else(|| method.to_string()))
}

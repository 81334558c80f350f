//! Registration wizard (full name, phone, email) and the single-field edit mode over it.
//!
//! Every step for one chat runs under the chat lock. Without stored state the step is derived
//! from the customer record, so losing the cache never restarts a half-finished registration.

use std::time::Duration;

use desk_core::{DeskError, InboundUpdate};
use serde_json::{json, Value};
use storage::{ContactUpdate, Customer};
use tracing::{debug, error, info, warn};

use crate::desk::Desk;
use crate::jobs::Job;
use crate::messages;
use crate::outbound::OutboundMessage;
use crate::state::{ContactField, ConversationState};
use crate::topic::TopicLifecycle;
use crate::validator::{self, Validation, ValidationCode};

/// Retries after the first failed write, with these delays.
const PERSIST_BACKOFF_MS: [u64; 3] = [100, 200, 300];

/// One-time reply keyboard with a "share phone" contact request button.
pub fn contact_request_keyboard() -> Value {
    json!({
        "keyboard": [[{ "text": messages::SHARE_PHONE_BUTTON, "request_contact": true }]],
        "resize_keyboard": true,
        "one_time_keyboard": true,
    })
}

fn remove_keyboard() -> Value {
    json!({ "remove_keyboard": true })
}

/// Step to continue from: the first missing field, or full name when nothing is missing.
pub fn resume_step(customer: &Customer) -> ConversationState {
    if customer.full_name().is_none() {
        ConversationState::WaitingFullName
    } else if customer.phone_number().is_none() {
        ConversationState::WaitingPhone
    } else if customer.email().is_none() {
        ConversationState::WaitingEmail
    } else {
        ConversationState::WaitingFullName
    }
}

fn validate(field: ContactField, raw: &str) -> Validation {
    match field {
        ContactField::FullName => validator::validate_full_name(raw),
        ContactField::Phone => validator::validate_phone(raw),
        ContactField::Email => validator::validate_email(raw),
    }
}

fn contact_update(field: ContactField, value: String) -> ContactUpdate {
    match field {
        ContactField::FullName => ContactUpdate::full_name(value),
        ContactField::Phone => ContactUpdate::phone_number(value),
        ContactField::Email => ContactUpdate::email(value),
    }
}

fn current_value(customer: &Customer, field: ContactField) -> Option<&str> {
    match field {
        ContactField::FullName => customer.full_name(),
        ContactField::Phone => customer.phone_number(),
        ContactField::Email => customer.email(),
    }
}

#[derive(Clone)]
pub struct RegistrationFlow {
    desk: Desk,
    topics: TopicLifecycle,
}

impl RegistrationFlow {
    pub fn new(desk: Desk) -> Self {
        let topics = TopicLifecycle::new(desk.clone());
        Self { desk, topics }
    }

    /// Starts (or resumes) registration: welcome, then the prompt for the first missing field.
    pub async fn start(&self, customer: &Customer) {
        let step = resume_step(customer);
        if !self.desk.state.set(customer.chat_id, Some(step)).await {
            warn!(chat_id = customer.chat_id, "Registration started without stored state");
        }
        info!(customer_id = customer.id, step = %step, "Registration started");
        self.desk.send_text(customer.chat_id, messages::WELCOME);
        self.ask(customer.chat_id, step.field());
    }

    /// First message from a customer who never began registration. Runs under the chat lock;
    /// when a concurrent delivery already started the flow this one is dropped.
    pub async fn start_first_contact(&self, customer: &Customer) {
        let Some(lock) = self.desk.state.lock(customer.chat_id).await else {
            warn!(chat_id = customer.chat_id, "Chat busy, dropping first contact");
            return;
        };
        if self.desk.state.get(customer.chat_id).await.is_none() {
            self.start(customer).await;
        } else {
            debug!(chat_id = customer.chat_id, "Registration already started");
        }
        self.desk.state.unlock(lock).await;
    }

    /// `/start`: registration for customers that never began it, a greeting otherwise.
    pub async fn on_start_command(&self, update: &InboundUpdate, customer: &Customer) {
        if let Some(message_id) = update.message_id {
            self.desk.delete_message(update.chat_id, message_id);
        }
        if customer.needs_registration() && self.desk.state.get(customer.chat_id).await.is_none() {
            self.start(customer).await;
            return;
        }
        self.desk.send_text(customer.chat_id, messages::START);
    }

    /// Consumes the update when it belongs to a running registration or edit.
    /// Returns false when the update is not part of a flow.
    pub async fn handle(&self, update: &InboundUpdate, customer: &Customer) -> bool {
        if !update.is_private() {
            return false;
        }
        let Some(lock) = self.desk.state.lock(update.chat_id).await else {
            warn!(chat_id = update.chat_id, "Chat busy, dropping update");
            return true;
        };
        let handled = self.handle_locked(update, customer).await;
        self.desk.state.unlock(lock).await;
        handled
    }

    async fn handle_locked(&self, update: &InboundUpdate, customer: &Customer) -> bool {
        let chat_id = update.chat_id;

        if let Some(contact) = &update.contact {
            return match self.desk.state.get(chat_id).await {
                Some(state) if state.field() == ContactField::Phone => {
                    self.submit(customer, state, &contact.phone_number).await;
                    true
                }
                _ => false,
            };
        }

        let Some(text) = update.text() else {
            return false;
        };
        if text.starts_with('/') {
            return false;
        }

        let mut state = self.desk.state.get(chat_id).await;
        if state.is_none() && customer.needs_registration() {
            let step = resume_step(customer);
            debug!(chat_id, step = %step, "Resuming registration from stored data");
            self.desk.state.set(chat_id, Some(step)).await;
            state = Some(step);
        }
        match state {
            Some(state) => {
                self.submit(customer, state, text).await;
                true
            }
            None => false,
        }
    }

    async fn submit(&self, customer: &Customer, state: ConversationState, raw: &str) {
        let chat_id = customer.chat_id;
        let field = state.field();
        let validation = validate(field, raw);
        let Some(value) = validation.normalized.clone().filter(|_| validation.valid) else {
            let code = validation.error.unwrap_or(ValidationCode::Invalid);
            debug!(chat_id, field = ?field, code = ?code, "Rejected contact value");
            self.desk
                .send_text(chat_id, messages::validation_error(field, code));
            return;
        };
        if validation.notice() == Some(ValidationCode::Truncated) {
            self.desk.send_text(chat_id, messages::FULL_NAME_TRUNCATED);
        }

        let updated = match self.persist(customer.id, contact_update(field, value)).await {
            Ok(updated) => updated,
            Err(e) => {
                error!(customer_id = customer.id, field = ?field, error = %e, "Contact field not saved");
                self.desk.send_text(chat_id, messages::SAVE_FAILED);
                return;
            }
        };

        if state.is_editing() {
            self.refresh_topic(&updated).await;
            self.desk.state.clear(chat_id).await;
            info!(customer_id = customer.id, field = ?field, "Contact field edited");
            let message = OutboundMessage::text(messages::EDIT_SUCCESS);
            let message = if field == ContactField::Phone {
                message.with_reply_markup(remove_keyboard())
            } else {
                message
            };
            self.desk.send(chat_id, message);
            return;
        }

        match state.next() {
            Some(next) => {
                self.refresh_topic(&updated).await;
                self.desk.state.set(chat_id, Some(next)).await;
                self.ask(chat_id, next.field());
            }
            None => {
                if updated.topic_id.is_none() {
                    self.desk.jobs.dispatch_now(Job::CreateTopic {
                        customer_id: updated.id,
                    });
                } else {
                    self.refresh_topic(&updated).await;
                }
                self.desk.state.clear(chat_id).await;
                info!(customer_id = customer.id, "Registration complete");
                self.desk.send(
                    chat_id,
                    OutboundMessage::text(messages::REGISTRATION_COMPLETE)
                        .with_reply_markup(remove_keyboard()),
                );
            }
        }
    }

    /// Writes contact fields, retrying busy or conflicting writes with a short backoff.
    pub async fn persist(&self, customer_id: i64, update: ContactUpdate) -> Result<Customer, DeskError> {
        let mut attempt = 0;
        loop {
            match self
                .desk
                .db
                .customers
                .update_contact_fields(customer_id, &update)
                .await
            {
                Ok(customer) => return Ok(customer),
                Err(e) if e.is_retryable() && attempt < PERSIST_BACKOFF_MS.len() => {
                    let delay = PERSIST_BACKOFF_MS[attempt];
                    warn!(customer_id, attempt = attempt + 1, delay_ms = delay, error = %e, "Contact write failed, retrying");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Switches the chat into edit mode for one field.
    pub async fn begin_edit(&self, customer: &Customer, field: ContactField) {
        let chat_id = customer.chat_id;
        self.desk
            .state
            .set(chat_id, Some(ConversationState::editing(field)))
            .await;
        let mut text = messages::edit_prompt(field).to_string();
        if let Some(current) = current_value(customer, field) {
            text.push_str(&format!("\n\nCurrent value: {}", current));
        }
        let message = OutboundMessage::text(text);
        let message = if field == ContactField::Phone {
            message.with_reply_markup(contact_request_keyboard())
        } else {
            message
        };
        self.desk.send(chat_id, message);
    }

    /// `/cancel` and the cancel button: leaves edit mode. A running registration stays.
    pub async fn cancel(&self, chat_id: i64) {
        match self.desk.state.get(chat_id).await {
            Some(state) if state.is_editing() => {
                self.desk.state.clear(chat_id).await;
                self.desk.send(
                    chat_id,
                    OutboundMessage::text(messages::EDIT_CANCELLED)
                        .with_reply_markup(remove_keyboard()),
                );
            }
            _ => self.desk.send_text(chat_id, messages::NOTHING_TO_CANCEL),
        }
    }

    /// Contact shared outside a phone step: stores the phone when valid and refreshes the topic.
    pub async fn save_shared_phone(&self, customer: &Customer, phone: &str) -> Option<Customer> {
        let normalized = validator::validate_phone(phone).normalized?;
        match self
            .persist(customer.id, ContactUpdate::phone_number(normalized))
            .await
        {
            Ok(updated) => {
                self.refresh_topic(&updated).await;
                Some(updated)
            }
            Err(e) => {
                warn!(customer_id = customer.id, error = %e, "Shared phone not saved");
                None
            }
        }
    }

    fn ask(&self, chat_id: i64, field: ContactField) {
        let message = OutboundMessage::text(messages::ask_for(field));
        let message = if field == ContactField::Phone {
            message.with_reply_markup(contact_request_keyboard())
        } else {
            message
        };
        self.desk.send(chat_id, message);
    }

    async fn refresh_topic(&self, customer: &Customer) {
        if customer.topic_id.is_some() {
            self.topics.refresh(customer.id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn customer() -> Customer {
        Customer {
            id: 1,
            platform: "telegram".into(),
            chat_id: 10,
            sequential_number: Some(1),
            username: None,
            first_name: None,
            last_name: None,
            full_name: None,
            phone_number: None,
            email: None,
            registration_completed_at: None,
            topic_id: None,
            contact_info_message_id: None,
            custom_topic_name: None,
            topic_name_edited: false,
            is_banned: false,
            banned_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_resume_step_follows_missing_fields() {
        let mut c = customer();
        assert_eq!(resume_step(&c), ConversationState::WaitingFullName);
        c.full_name = Some("A B".into());
        assert_eq!(resume_step(&c), ConversationState::WaitingPhone);
        c.phone_number = Some("+375291112233".into());
        assert_eq!(resume_step(&c), ConversationState::WaitingEmail);
        c.full_name = Some("  ".into());
        assert_eq!(resume_step(&c), ConversationState::WaitingFullName);
    }

    #[test]
    fn test_contact_request_keyboard_shape() {
        let keyboard = contact_request_keyboard();
        assert_eq!(keyboard["keyboard"][0][0]["request_contact"], true);
        assert_eq!(keyboard["one_time_keyboard"], true);
    }
}

//! Shared service context: Bot API, storage, cache, job dispatcher and settings.

use std::sync::Arc;
use std::time::Duration;

use desk_core::{DeskError, TelegramApi};
use serde_json::{json, Value};
use storage::{Customer, Database};

use crate::cache::KeyValueCache;
use crate::config::DeskSettings;
use crate::jobs::{Dispatcher, Job};
use crate::outbound::OutboundMessage;
use crate::state::StateStore;

/// Everything a handler or job needs. Cheap to clone.
#[derive(Clone)]
pub struct Desk {
    pub api: Arc<dyn TelegramApi>,
    pub db: Database,
    pub cache: Arc<dyn KeyValueCache>,
    pub jobs: Arc<dyn Dispatcher>,
    pub settings: Arc<DeskSettings>,
    pub state: StateStore,
}

impl Desk {
    pub fn new(
        api: Arc<dyn TelegramApi>,
        db: Database,
        cache: Arc<dyn KeyValueCache>,
        jobs: Arc<dyn Dispatcher>,
        settings: DeskSettings,
    ) -> Self {
        let state = StateStore::new(cache.clone());
        Self {
            api,
            db,
            cache,
            jobs,
            settings: Arc::new(settings),
            state,
        }
    }

    pub fn group_id(&self) -> i64 {
        self.settings.group_id
    }

    /// Customer by id, `NotFound` when gone.
    pub async fn customer(&self, customer_id: i64) -> Result<Customer, DeskError> {
        Ok(self.db.customers.get(customer_id).await?)
    }

    /// Schedules one Bot API call now.
    pub fn query(&self, method: &str, params: Value) {
        self.jobs.dispatch_now(Job::query(method, params));
    }

    pub fn query_after(&self, method: &str, params: Value, delay: Duration) {
        self.jobs.dispatch(Job::query(method, params), delay);
    }

    /// Schedules a message to a private chat.
    pub fn send(&self, chat_id: i64, message: OutboundMessage) {
        let params = message.params_for(chat_id, None);
        self.query(&message.method, params);
    }

    pub fn send_text(&self, chat_id: i64, text: &str) {
        self.send(chat_id, OutboundMessage::text(text));
    }

    /// Schedules a service message into a topic of the support group.
    pub fn send_to_topic(&self, topic_id: i64, text: &str) {
        let params = OutboundMessage::text(text).params_for(self.group_id(), Some(topic_id));
        self.query("sendMessage", params);
    }

    pub fn delete_message(&self, chat_id: i64, message_id: i64) {
        self.query(
            "deleteMessage",
            json!({ "chat_id": chat_id, "message_id": message_id }),
        );
    }
}

//! Topic lifecycle: one forum topic per customer in the support group.
//!
//! Creation runs as a job under a per-customer lock so concurrent first contacts yield one
//! topic. Renames, icon changes and closing are scheduled as Bot API jobs. A topic counts as
//! existing unless the API explicitly reports it missing.

use std::time::Duration;

use desk_core::{ApiErrorType, DeskError, Platform};
use serde_json::json;
use storage::Customer;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::CacheLock;
use crate::contact_card::ContactCard;
use crate::desk::Desk;
use crate::formatting::truncate_chars;
use crate::jobs::{CardMode, Job, JobOutcome};
use crate::messages;

/// Telegram limit on forum topic names.
pub const MAX_TOPIC_NAME_LENGTH: usize = 128;
/// Reserved for the `#<id> ` prefix in `/rename_topic`.
pub const RENAME_PREFIX_MARGIN: usize = 15;

const CREATE_LOCK_LEASE: Duration = Duration::from_secs(30);
const CREATE_LOCK_BUSY_RELEASE: Duration = Duration::from_secs(2);
const ICON_LOCK_LEASE: Duration = Duration::from_secs(5);
const ICON_DELAY: Duration = Duration::from_secs(1);
const CLOSE_DELAY: Duration = Duration::from_secs(2);
const CHECK_CLEANUP_DELAY: Duration = Duration::from_millis(500);
const CHECK_TEXT: &str = "\u{200B}";

/// Which side wrote last; picks the topic icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicIcon {
    Incoming,
    Outgoing,
}

/// Cuts a name to [`MAX_TOPIC_NAME_LENGTH`] characters.
pub fn truncate_name(name: &str) -> String {
    truncate_chars(name.trim(), MAX_TOPIC_NAME_LENGTH)
        .trim_end()
        .to_string()
}

/// `<prefix> <rest>` within the limit; only `rest` is shortened.
fn join_within_limit(prefix: &str, rest: &str) -> String {
    let budget = MAX_TOPIC_NAME_LENGTH.saturating_sub(prefix.chars().count() + 1);
    let rest = truncate_chars(rest, budget);
    let rest = rest.trim_end();
    if rest.is_empty() {
        prefix.to_string()
    } else {
        format!("{} {}", prefix, rest)
    }
}

/// Generated name: `#<id> <name> <phone>`, `#<id> (<source>)` for external sources,
/// `#<id> (<platform>)` when nothing else is known.
pub fn default_name(customer: &Customer) -> String {
    let prefix = format!("#{}", customer.display_id());
    if customer.platform_kind() == Platform::ExternalSource {
        let source = customer.username().unwrap_or(Platform::ExternalSource.as_str());
        return join_within_limit(&prefix, &format!("({})", source));
    }
    let name = customer
        .full_name()
        .map(str::to_string)
        .or_else(|| customer.profile_name());
    let parts: Vec<String> = [name, customer.phone_number().map(str::to_string)]
        .into_iter()
        .flatten()
        .collect();
    if parts.is_empty() {
        return join_within_limit(&prefix, &format!("({})", customer.platform));
    }
    join_within_limit(&prefix, &parts.join(" "))
}

/// Name to use for the topic: the custom one when set, else the generated one.
pub fn topic_name(customer: &Customer) -> String {
    match customer.custom_topic_name().filter(|_| customer.has_custom_topic_name()) {
        Some(custom) => truncate_name(custom),
        None => default_name(customer),
    }
}

/// Whether `name` already carries `phone`, with or without the leading `+`.
pub fn contains_phone(name: &str, phone: &str) -> bool {
    let bare = phone.trim_start_matches('+');
    name.contains(phone) || (!bare.is_empty() && name.contains(bare))
}

/// Appends the phone to a custom name, shortening the custom part, never the phone.
pub fn append_phone(custom: &str, phone: &str) -> String {
    let budget = MAX_TOPIC_NAME_LENGTH.saturating_sub(phone.chars().count() + 1);
    let custom = truncate_chars(custom.trim(), budget);
    let custom = custom.trim_end();
    if custom.is_empty() {
        phone.to_string()
    } else {
        format!("{} {}", custom, phone)
    }
}

#[derive(Clone)]
pub struct TopicLifecycle {
    desk: Desk,
}

impl TopicLifecycle {
    pub fn new(desk: Desk) -> Self {
        Self { desk }
    }

    /// Executes `CreateTopic`: creates the topic once, stores it, posts the card and renames when due.
    #[instrument(skip(self), fields(job = "create_topic"))]
    pub async fn create(&self, customer_id: i64) -> JobOutcome {
        match self.desk.db.customers.find_by_id(customer_id).await {
            Ok(Some(customer)) if customer.topic_id.is_some() => {
                debug!(customer_id, "Topic already exists, nothing to create");
                return JobOutcome::Done;
            }
            Ok(Some(_)) => {}
            Ok(None) => return JobOutcome::Fail(format!("customer {} not found", customer_id)),
            Err(e) if e.is_retryable() => return JobOutcome::Retry(e.to_string()),
            Err(e) => return JobOutcome::Fail(e.to_string()),
        }

        let lock_key = format!("topic_create_{}", customer_id);
        let lock = match CacheLock::acquire(self.desk.cache.as_ref(), lock_key, CREATE_LOCK_LEASE)
            .await
        {
            Ok(Some(lock)) => Some(lock),
            Ok(None) => {
                debug!(customer_id, "Topic creation in progress elsewhere, releasing");
                return JobOutcome::Release(CREATE_LOCK_BUSY_RELEASE);
            }
            Err(e) => {
                warn!(customer_id, error = %e, "Topic lock unavailable, creating without it");
                None
            }
        };

        let outcome = match self.create_locked(customer_id).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_transient() => JobOutcome::Retry(e.to_string()),
            Err(e) => JobOutcome::Fail(e.to_string()),
        };

        if let Some(lock) = lock {
            lock.release(self.desk.cache.as_ref()).await;
        }
        outcome
    }

    async fn create_locked(&self, customer_id: i64) -> Result<JobOutcome, DeskError> {
        let mut customer = self.desk.customer(customer_id).await?;
        if customer.topic_id.is_some() {
            debug!(customer_id, "Topic created concurrently, nothing to do");
            return Ok(JobOutcome::Done);
        }
        if customer.platform_kind() == Platform::Ignore {
            debug!(customer_id, "Ignored platform, no topic");
            return Ok(JobOutcome::Done);
        }
        if customer.sequential_number.is_none() {
            self.desk
                .db
                .customers
                .assign_sequential_number(customer_id)
                .await?;
            customer = self.desk.customer(customer_id).await?;
        }

        let name = topic_name(&customer);
        let mut params = json!({ "chat_id": self.desk.group_id(), "name": name });
        if let Some(icon) = &self.desk.settings.icons.incoming {
            params["icon_custom_emoji_id"] = json!(icon);
        }

        let response = self.desk.api.send_query("createForumTopic", params).await;
        if response.ok {
            let Some(topic_id) = response.message_thread_id else {
                error!(customer_id, raw = %response.raw, "createForumTopic answered without a thread id");
                return Ok(JobOutcome::Fail("no message_thread_id".into()));
            };
            self.desk
                .db
                .customers
                .set_topic_id(customer_id, topic_id)
                .await?;
            customer.topic_id = Some(topic_id);
            info!(customer_id, topic_id, name = %name, "Topic created");

            // Card first, so the automatic rename below does not reset the icon.
            let card = ContactCard::new(self.desk.clone())
                .sync(customer_id, CardMode::Upsert)
                .await;
            if card != JobOutcome::Done {
                warn!(customer_id, topic_id, outcome = ?card, "Contact card not posted");
            }

            if customer.is_registration_completed()
                && self
                    .desk
                    .db
                    .messages
                    .has_incoming(customer_id)
                    .await
                    .unwrap_or(false)
            {
                if let Err(e) = self.auto_rename(&customer).await {
                    warn!(customer_id, topic_id, error = %e, "Rename after topic creation failed");
                }
            }
            return Ok(JobOutcome::Done);
        }

        if response.is_rate_limited() {
            let retry_after = response.retry_after.unwrap_or(3);
            return Ok(JobOutcome::Release(Duration::from_secs(retry_after)));
        }
        if response.has_error(ApiErrorType::Network) {
            return Ok(JobOutcome::Retry(
                response.description.unwrap_or_else(|| "network error".into()),
            ));
        }
        error!(
            customer_id,
            code = response.code,
            raw = %response.raw,
            "createForumTopic failed"
        );
        Ok(JobOutcome::Fail(
            response.description.unwrap_or_else(|| "createForumTopic failed".into()),
        ))
    }

    /// Checks the topic with a throwaway message. Only an explicit "topic missing" answer
    /// counts as gone.
    pub async fn exists(&self, customer: &Customer) -> bool {
        let Some(topic_id) = customer.topic_id else {
            return false;
        };
        let response = self
            .desk
            .api
            .send_query(
                "sendMessage",
                json!({
                    "chat_id": self.desk.group_id(),
                    "message_thread_id": topic_id,
                    "text": CHECK_TEXT,
                }),
            )
            .await;
        if response.ok {
            if let Some(message_id) = response.message_id {
                self.desk.query_after(
                    "deleteMessage",
                    json!({ "chat_id": self.desk.group_id(), "message_id": message_id }),
                    CHECK_CLEANUP_DELAY,
                );
            }
            return true;
        }
        if response.is_topic_missing() {
            info!(customer_id = customer.id, topic_id, "Topic is gone");
            return false;
        }
        debug!(customer_id = customer.id, topic_id, code = response.code, "Topic check inconclusive, assuming topic exists");
        true
    }

    /// Unlinks a topic the API reported missing; a newer topic is left alone.
    pub async fn forget_topic(&self, customer_id: i64, topic_id: i64) -> Result<bool, DeskError> {
        let cleared = self
            .desk
            .db
            .customers
            .clear_topic_id(customer_id, Some(topic_id))
            .await?;
        if cleared {
            self.desk
                .db
                .customers
                .set_contact_message_id(customer_id, None)
                .await?;
            info!(customer_id, topic_id, "Topic unlinked");
        }
        Ok(cleared)
    }

    /// Automatic rename after contact data changed. A custom name only ever gains the phone.
    /// Returns whether a rename was scheduled.
    pub async fn auto_rename(&self, customer: &Customer) -> Result<bool, DeskError> {
        let Some(topic_id) = customer.topic_id else {
            return Ok(false);
        };

        let custom = customer
            .custom_topic_name()
            .filter(|_| customer.has_custom_topic_name());
        if let Some(custom) = custom {
            let Some(phone) = customer.phone_number() else {
                return Ok(false);
            };
            if contains_phone(custom, phone) {
                return Ok(false);
            }
            if !self.exists(customer).await {
                self.forget_topic(customer.id, topic_id).await?;
                return Ok(false);
            }
            let name = append_phone(custom, phone);
            self.desk
                .db
                .customers
                .set_custom_topic_name(customer.id, &name)
                .await?;
            info!(customer_id = customer.id, topic_id, name = %name, "Phone appended to custom topic name");
            self.edit_name(topic_id, &name);
            return Ok(true);
        }

        if !self.exists(customer).await {
            self.forget_topic(customer.id, topic_id).await?;
            return Ok(false);
        }
        let name = default_name(customer);
        debug!(customer_id = customer.id, topic_id, name = %name, "Renaming topic");
        self.edit_name(topic_id, &name);
        Ok(true)
    }

    /// Reloads the customer, then renames and refreshes the card. Errors are logged only.
    pub async fn refresh(&self, customer_id: i64) {
        let customer = match self.desk.customer(customer_id).await {
            Ok(customer) => customer,
            Err(e) => {
                warn!(customer_id, error = %e, "Cannot refresh topic, customer not loaded");
                return;
            }
        };
        if customer.topic_id.is_none() {
            return;
        }
        if let Err(e) = self.auto_rename(&customer).await {
            warn!(customer_id, error = %e, "Topic rename failed");
        }
        self.desk.jobs.dispatch_now(Job::SyncContactCard {
            customer_id,
            mode: CardMode::Upsert,
        });
    }

    /// `/rename_topic <name>`: stores `#<id> <name>` as the custom name.
    /// `Validation` errors carry the text to show in the topic.
    pub async fn rename(&self, customer: &Customer, requested: &str) -> Result<String, DeskError> {
        let requested = requested.trim();
        if requested.is_empty() {
            return Err(DeskError::Validation(messages::RENAME_USAGE.to_string()));
        }
        let max = MAX_TOPIC_NAME_LENGTH - RENAME_PREFIX_MARGIN;
        if requested.chars().count() > max {
            return Err(DeskError::Validation(messages::rename_too_long(max)));
        }
        let name = format!("#{} {}", customer.display_id(), requested);
        if name.chars().count() > MAX_TOPIC_NAME_LENGTH {
            return Err(DeskError::Validation(messages::rename_too_long(max)));
        }
        let Some(topic_id) = customer.topic_id else {
            return Err(DeskError::NotFound(format!(
                "customer {} has no topic",
                customer.id
            )));
        };
        self.desk
            .db
            .customers
            .set_custom_topic_name(customer.id, &name)
            .await?;
        info!(customer_id = customer.id, topic_id, name = %name, "Topic renamed manually");
        self.edit_name(topic_id, &name);
        Ok(name)
    }

    /// A human renamed the topic in Telegram; keep that name as custom.
    pub async fn save_edited_name(&self, customer: &Customer, name: &str) -> Result<bool, DeskError> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_TOPIC_NAME_LENGTH {
            warn!(customer_id = customer.id, length = name.chars().count(), "Ignoring edited topic name");
            return Ok(false);
        }
        self.desk
            .db
            .customers
            .set_custom_topic_name(customer.id, name)
            .await?;
        info!(customer_id = customer.id, name = %name, "Edited topic name saved as custom");
        Ok(true)
    }

    /// `/restore_topic_name`: drops the custom name and applies the generated one.
    pub async fn restore_default_name(&self, customer: &Customer) -> Result<String, DeskError> {
        self.desk
            .db
            .customers
            .clear_custom_topic_name(customer.id)
            .await?;
        let customer = self.desk.customer(customer.id).await?;
        let name = default_name(&customer);
        if let Some(topic_id) = customer.topic_id {
            self.edit_name(topic_id, &name);
        }
        info!(customer_id = customer.id, name = %name, "Topic name restored");
        Ok(name)
    }

    /// Notifies the customer, then sets the outgoing icon and closes the topic, in that order.
    pub fn close(&self, customer: &Customer) {
        match customer.platform_kind() {
            Platform::Telegram => self.desk.send_text(customer.chat_id, messages::TOPIC_CLOSED),
            Platform::Vk | Platform::ExternalSource => {
                info!(customer_id = customer.id, platform = %customer.platform, "No transport for close notice");
            }
            Platform::Ignore => {}
        }
        let Some(topic_id) = customer.topic_id else {
            return;
        };
        let group_id = self.desk.group_id();
        if let Some(icon) = &self.desk.settings.icons.outgoing {
            self.desk.query_after(
                "editForumTopic",
                json!({
                    "chat_id": group_id,
                    "message_thread_id": topic_id,
                    "icon_custom_emoji_id": icon,
                }),
                ICON_DELAY,
            );
        }
        self.desk.query_after(
            "closeForumTopic",
            json!({ "chat_id": group_id, "message_thread_id": topic_id }),
            CLOSE_DELAY,
        );
        info!(customer_id = customer.id, topic_id, "Topic close scheduled");
    }

    /// Switches the topic icon, skipping a repeat of the same icon within the lock lease.
    pub async fn update_icon(&self, customer: &Customer, icon: TopicIcon) -> bool {
        let Some(topic_id) = customer.topic_id else {
            return false;
        };
        let icons = &self.desk.settings.icons;
        let target = match icon {
            TopicIcon::Incoming => icons.incoming.as_deref(),
            TopicIcon::Outgoing => icons.outgoing.as_deref(),
        };
        let Some(target) = target else {
            return false;
        };

        let key = format!("topic_icon_update_{}", topic_id);
        let cache = self.desk.cache.as_ref();
        match cache.add(&key, target, ICON_LOCK_LEASE).await {
            Ok(true) => {}
            Ok(false) => {
                if cache.get(&key).await.ok().flatten().as_deref() == Some(target) {
                    debug!(topic_id, "Icon update already scheduled");
                    return false;
                }
                if let Err(e) = cache.put(&key, target, ICON_LOCK_LEASE).await {
                    warn!(topic_id, error = %e, "Icon lock not refreshed");
                }
            }
            Err(e) => warn!(topic_id, error = %e, "Icon lock unavailable"),
        }

        self.desk.query_after(
            "editForumTopic",
            json!({
                "chat_id": self.desk.group_id(),
                "message_thread_id": topic_id,
                "icon_custom_emoji_id": target,
            }),
            ICON_DELAY,
        );
        true
    }

    /// Ops: deletes the topic upstream (best-effort), then unlinks it or removes the customer.
    pub async fn delete(&self, customer: &Customer, cascade: bool) -> Result<(), DeskError> {
        if let Some(topic_id) = customer.topic_id {
            let response = self
                .desk
                .api
                .send_query(
                    "deleteForumTopic",
                    json!({ "chat_id": self.desk.group_id(), "message_thread_id": topic_id }),
                )
                .await;
            if !response.ok {
                warn!(
                    customer_id = customer.id,
                    topic_id,
                    description = ?response.description,
                    "deleteForumTopic failed, unlinking anyway"
                );
            }
        }
        if cascade {
            self.desk.db.customers.delete_cascade(customer.id).await?;
            info!(customer_id = customer.id, "Customer deleted with its messages");
        } else {
            self.desk.db.customers.clear_topic_id(customer.id, None).await?;
            self.desk
                .db
                .customers
                .set_contact_message_id(customer.id, None)
                .await?;
            info!(customer_id = customer.id, "Topic unlinked");
        }
        Ok(())
    }

    /// Ops: delete, then create a fresh topic right away.
    pub async fn recreate(&self, customer: &Customer) -> Result<i64, DeskError> {
        self.delete(customer, false).await?;
        match self.create(customer.id).await {
            JobOutcome::Done => {}
            JobOutcome::Release(delay) => {
                return Err(DeskError::TransientApi(format!(
                    "topic creation deferred for {:?}",
                    delay
                )))
            }
            JobOutcome::Retry(reason) => return Err(DeskError::TransientApi(reason)),
            JobOutcome::Fail(reason) => return Err(DeskError::Unknown(reason)),
        }
        self.desk
            .customer(customer.id)
            .await?
            .topic_id
            .ok_or_else(|| DeskError::NotFound(format!("topic for customer {}", customer.id)))
    }

    /// Ops: schedules topic creation for every customer without one. Returns how many.
    pub async fn restore_missing(&self) -> Result<usize, DeskError> {
        let customers = self.desk.db.customers.without_topic().await?;
        for customer in &customers {
            self.desk.jobs.dispatch_now(Job::CreateTopic {
                customer_id: customer.id,
            });
        }
        info!(count = customers.len(), "Topic creation scheduled for customers without topic");
        Ok(customers.len())
    }

    fn edit_name(&self, topic_id: i64, name: &str) {
        self.desk.query(
            "editForumTopic",
            json!({
                "chat_id": self.desk.group_id(),
                "message_thread_id": topic_id,
                "name": truncate_name(name),
            }),
        );
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
            chat_id: 555,
            sequential_number: Some(42),
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
    fn test_default_name_variants() {
        let mut c = customer();
        assert_eq!(default_name(&c), "#42 (telegram)");

        c.first_name = Some("Ann".into());
        c.last_name = Some("Lee".into());
        assert_eq!(default_name(&c), "#42 Ann Lee");

        c.full_name = Some("Anna Lee".into());
        c.phone_number = Some("+375291112233".into());
        assert_eq!(default_name(&c), "#42 Anna Lee +375291112233");

        c.sequential_number = None;
        assert!(default_name(&c).starts_with("#555 "));
    }

    #[test]
    fn test_external_source_name() {
        let mut c = customer();
        c.platform = "external_source".into();
        c.username = Some("site".into());
        c.full_name = Some("Ignored".into());
        assert_eq!(default_name(&c), "#42 (site)");
    }

    #[test]
    fn test_long_generated_name_keeps_prefix() {
        let mut c = customer();
        c.full_name = Some("x".repeat(300));
        let name = default_name(&c);
        assert_eq!(name.chars().count(), MAX_TOPIC_NAME_LENGTH);
        assert!(name.starts_with("#42 xxx"));
    }

    #[test]
    fn test_custom_name_wins() {
        let mut c = customer();
        c.full_name = Some("Anna".into());
        c.custom_topic_name = Some("VIP".into());
        assert_eq!(topic_name(&c), "#42 Anna");
        c.topic_name_edited = true;
        assert_eq!(topic_name(&c), "VIP");
    }

    #[test]
    fn test_contains_phone_with_and_without_plus() {
        assert!(contains_phone("VIP +375291112233", "+375291112233"));
        assert!(contains_phone("VIP 375291112233", "+375291112233"));
        assert!(!contains_phone("VIP", "+375291112233"));
    }

    #[test]
    fn test_append_phone_truncates_custom_part_only() {
        let phone = "+375291112233";
        let name = append_phone(&"v".repeat(200), phone);
        assert_eq!(name.chars().count(), MAX_TOPIC_NAME_LENGTH);
        assert!(name.ends_with(" +375291112233"));

        assert_eq!(append_phone("VIP", phone), "VIP +375291112233");
    }

    #[test]
    fn test_truncate_name() {
        assert_eq!(truncate_name(&"a".repeat(130)).chars().count(), 128);
        assert_eq!(truncate_name("  short "), "short");
    }
}

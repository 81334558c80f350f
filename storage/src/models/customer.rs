//! Customer model: one row per (platform, external chat id).
//!
//! Maps to the `customers` table and is used by CustomerRepository.

use chrono::{DateTime, Utc};
use desk_core::Platform;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Customer {
    pub id: i64,
    pub platform: String,
    pub chat_id: i64,
    /// Human-facing display id; assigned once, never reused.
    pub sequential_number: Option<i64>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub registration_completed_at: Option<DateTime<Utc>>,
    pub topic_id: Option<i64>,
    pub contact_info_message_id: Option<i64>,
    pub custom_topic_name: Option<String>,
    pub topic_name_edited: bool,
    pub is_banned: bool,
    pub banned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Customer {
    /// Parsed platform; unknown values are treated as external sources.
    pub fn platform_kind(&self) -> Platform {
        self.platform.parse().unwrap_or(Platform::ExternalSource)
    }

    /// True when a human renamed the topic and the name must not be regenerated.
    pub fn has_custom_topic_name(&self) -> bool {
        self.topic_name_edited && non_empty(&self.custom_topic_name).is_some()
    }

    pub fn custom_topic_name(&self) -> Option<&str> {
        non_empty(&self.custom_topic_name)
    }

    pub fn full_name(&self) -> Option<&str> {
        non_empty(&self.full_name)
    }

    pub fn phone_number(&self) -> Option<&str> {
        non_empty(&self.phone_number)
    }

    pub fn email(&self) -> Option<&str> {
        non_empty(&self.email)
    }

    pub fn username(&self) -> Option<&str> {
        non_empty(&self.username)
    }

    /// Any of full name, phone or email is still missing.
    pub fn needs_registration(&self) -> bool {
        !self.is_registration_completed()
    }

    pub fn is_registration_completed(&self) -> bool {
        self.full_name().is_some() && self.phone_number().is_some() && self.email().is_some()
    }

    /// Sequential number when assigned, otherwise the external chat id.
    pub fn display_id(&self) -> i64 {
        self.sequential_number.unwrap_or(self.chat_id)
    }

    /// First and last name from the platform profile, joined.
    pub fn profile_name(&self) -> Option<String> {
        let joined = [non_empty(&self.first_name), non_empty(&self.last_name)]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if joined.is_empty() {
            None
        } else {
            Some(joined)
        }
    }
}

/// Profile data captured from the first inbound update of a chat.
#[derive(Debug, Clone, Default)]
pub struct CustomerProfile {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Contact fields to write; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactUpdate {
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
}

impl ContactUpdate {
    pub fn full_name(value: impl Into<String>) -> Self {
        Self {
            full_name: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn phone_number(value: impl Into<String>) -> Self {
        Self {
            phone_number: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn email(value: impl Into<String>) -> Self {
        Self {
            email: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.phone_number.is_none() && self.email.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer() -> Customer {
        Customer {
            id: 1,
            platform: "telegram".to_string(),
            chat_id: 555,
            sequential_number: None,
            username: None,
            first_name: Some("Anna".to_string()),
            last_name: Some(" ".to_string()),
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
    fn test_custom_name_requires_flag_and_value() {
        let mut c = customer();
        c.custom_topic_name = Some("VIP".to_string());
        assert!(!c.has_custom_topic_name());
        c.topic_name_edited = true;
        assert!(c.has_custom_topic_name());
        c.custom_topic_name = Some("   ".to_string());
        assert!(!c.has_custom_topic_name());
    }

    #[test]
    fn test_registration_completeness() {
        let mut c = customer();
        assert!(c.needs_registration());
        c.full_name = Some("Anna Petrova".to_string());
        c.phone_number = Some("+375291112233".to_string());
        assert!(c.needs_registration());
        c.email = Some("anna@example.com".to_string());
        assert!(c.is_registration_completed());
    }

    #[test]
    fn test_display_id_and_profile_name() {
        let mut c = customer();
        assert_eq!(c.display_id(), 555);
        c.sequential_number = Some(12);
        assert_eq!(c.display_id(), 12);
        assert_eq!(c.profile_name().as_deref(), Some("Anna"));
    }
}

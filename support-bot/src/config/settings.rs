//! Desk settings: support group, broadcast topic, topic icons, webhook secret, worker count.
//!
//! Resolved once at startup and injected; nothing reads the environment after `from_env`.

use anyhow::{Context, Result};
use std::env;
use tracing::warn;

/// Broadcast topic id, normalised to an integer once. Disabled when unset or misconfigured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastTopic(Option<i64>);

impl BroadcastTopic {
    pub fn disabled() -> Self {
        Self(None)
    }

    pub fn new(topic_id: i64) -> Self {
        if topic_id == 0 {
            Self(None)
        } else {
            Self(Some(topic_id))
        }
    }

    /// Parses a raw setting; non-numeric or zero values disable broadcast with a warning.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
            return Self(None);
        };
        match raw.parse::<i64>() {
            Ok(0) => {
                warn!(value = %raw, "TELEGRAM_BROADCAST_TOPIC_ID is 0, broadcast disabled");
                Self(None)
            }
            Ok(id) => Self(Some(id)),
            Err(_) => {
                warn!(value = %raw, "TELEGRAM_BROADCAST_TOPIC_ID is not numeric, broadcast disabled");
                Self(None)
            }
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.0
    }

    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }

    /// True when `thread_id` is the broadcast topic.
    pub fn matches(&self, thread_id: Option<i64>) -> bool {
        match (self.0, thread_id) {
            (Some(configured), Some(thread)) => configured == thread,
            _ => false,
        }
    }
}

/// Custom emoji ids used as forum topic icons. Empty means "do not touch the icon".
#[derive(Debug, Clone, Default)]
pub struct TopicIcons {
    /// ICON_INCOMING: customer wrote last.
    pub incoming: Option<String>,
    /// ICON_OUTGOING: a manager answered last.
    pub outgoing: Option<String>,
    /// ICON_SUCCESSFUL
    pub successful: Option<String>,
}

impl TopicIcons {
    pub fn from_env() -> Self {
        Self {
            incoming: non_empty_var("ICON_INCOMING"),
            outgoing: non_empty_var("ICON_OUTGOING"),
            successful: non_empty_var("ICON_SUCCESSFUL"),
        }
    }
}

/// Desk-level settings shared by handlers, jobs and the webhook server.
#[derive(Debug, Clone)]
pub struct DeskSettings {
    /// TELEGRAM_GROUP_ID: the forum supergroup holding one topic per customer.
    pub group_id: i64,
    pub broadcast_topic: BroadcastTopic,
    /// TELEGRAM_WEBHOOK_SECRET, compared with `X-Telegram-Bot-Api-Secret-Token`.
    pub webhook_secret: Option<String>,
    pub icons: TopicIcons,
    /// JOB_WORKERS: concurrent job executions.
    pub job_workers: usize,
}

impl Default for DeskSettings {
    fn default() -> Self {
        Self {
            group_id: 0,
            broadcast_topic: BroadcastTopic::disabled(),
            webhook_secret: None,
            icons: TopicIcons::default(),
            job_workers: 8,
        }
    }
}

impl DeskSettings {
    pub fn from_env() -> Result<Self> {
        let group_id = match non_empty_var("TELEGRAM_GROUP_ID") {
            Some(raw) => raw
                .parse::<i64>()
                .with_context(|| format!("TELEGRAM_GROUP_ID is not numeric: {}", raw))?,
            None => 0,
        };
        let broadcast_topic =
            BroadcastTopic::parse(env::var("TELEGRAM_BROADCAST_TOPIC_ID").ok().as_deref());
        let job_workers = env::var("JOB_WORKERS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(8);

        Ok(Self {
            group_id,
            broadcast_topic,
            webhook_secret: non_empty_var("TELEGRAM_WEBHOOK_SECRET"),
            icons: TopicIcons::from_env(),
            job_workers,
        })
    }

    /// The service cannot route topic traffic without a group.
    pub fn validate(&self) -> Result<()> {
        if self.group_id == 0 {
            anyhow::bail!("TELEGRAM_GROUP_ID must be set to the support forum group id");
        }
        Ok(())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_topic_parse() {
        assert_eq!(BroadcastTopic::parse(Some(" 42 ")).id(), Some(42));
        assert!(!BroadcastTopic::parse(Some("0")).is_enabled());
        assert!(!BroadcastTopic::parse(Some("abc")).is_enabled());
        assert!(!BroadcastTopic::parse(Some("")).is_enabled());
        assert!(!BroadcastTopic::parse(None).is_enabled());
    }

    #[test]
    fn test_broadcast_topic_matches() {
        let topic = BroadcastTopic::new(42);
        assert!(topic.matches(Some(42)));
        assert!(!topic.matches(Some(43)));
        assert!(!topic.matches(None));
        assert!(!BroadcastTopic::disabled().matches(Some(42)));
    }
}

//! Per-chat conversation state (registration step or edit mode) on top of [`KeyValueCache`].
//!
//! Reads fail open: an unreachable cache means "no guided flow". Writes report failure as
//! `false` and never error.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::cache::{CacheLock, KeyValueCache};

/// Conversation state lifetime.
pub const STATE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Lease of the per-chat lock.
pub const LOCK_LEASE: Duration = Duration::from_secs(10);

/// Contact field collected by the registration flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactField {
    FullName,
    Phone,
    Email,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    WaitingFullName,
    WaitingPhone,
    WaitingEmail,
    EditingFullName,
    EditingPhone,
    EditingEmail,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::WaitingFullName => "waiting_full_name",
            ConversationState::WaitingPhone => "waiting_phone",
            ConversationState::WaitingEmail => "waiting_email",
            ConversationState::EditingFullName => "editing_full_name",
            ConversationState::EditingPhone => "editing_phone",
            ConversationState::EditingEmail => "editing_email",
        }
    }

    pub fn waiting(field: ContactField) -> Self {
        match field {
            ContactField::FullName => ConversationState::WaitingFullName,
            ContactField::Phone => ConversationState::WaitingPhone,
            ContactField::Email => ConversationState::WaitingEmail,
        }
    }

    pub fn editing(field: ContactField) -> Self {
        match field {
            ContactField::FullName => ConversationState::EditingFullName,
            ContactField::Phone => ConversationState::EditingPhone,
            ContactField::Email => ConversationState::EditingEmail,
        }
    }

    pub fn field(&self) -> ContactField {
        match self {
            ConversationState::WaitingFullName | ConversationState::EditingFullName => {
                ContactField::FullName
            }
            ConversationState::WaitingPhone | ConversationState::EditingPhone => {
                ContactField::Phone
            }
            ConversationState::WaitingEmail | ConversationState::EditingEmail => {
                ContactField::Email
            }
        }
    }

    pub fn is_registration(&self) -> bool {
        matches!(
            self,
            ConversationState::WaitingFullName
                | ConversationState::WaitingPhone
                | ConversationState::WaitingEmail
        )
    }

    pub fn is_editing(&self) -> bool {
        !self.is_registration()
    }

    /// Registration step after this one; `None` after email.
    pub fn next(&self) -> Option<Self> {
        match self {
            ConversationState::WaitingFullName => Some(ConversationState::WaitingPhone),
            ConversationState::WaitingPhone => Some(ConversationState::WaitingEmail),
            _ => None,
        }
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting_full_name" => Ok(ConversationState::WaitingFullName),
            "waiting_phone" => Ok(ConversationState::WaitingPhone),
            "waiting_email" => Ok(ConversationState::WaitingEmail),
            "editing_full_name" => Ok(ConversationState::EditingFullName),
            "editing_phone" => Ok(ConversationState::EditingPhone),
            "editing_email" => Ok(ConversationState::EditingEmail),
            other => Err(format!("unknown conversation state: {}", other)),
        }
    }
}

/// Conversation state per chat id, TTL [`STATE_TTL`].
#[derive(Clone)]
pub struct StateStore {
    cache: Arc<dyn KeyValueCache>,
}

impl StateStore {
    pub fn new(cache: Arc<dyn KeyValueCache>) -> Self {
        Self { cache }
    }

    fn state_key(chat_id: i64) -> String {
        format!("registration_state_{}", chat_id)
    }

    fn lock_key(chat_id: i64) -> String {
        format!("registration_lock_{}", chat_id)
    }

    pub fn is_valid_state(raw: &str) -> bool {
        raw.parse::<ConversationState>().is_ok()
    }

    /// Current state; absent on cache failure. An unknown stored value is dropped.
    pub async fn get(&self, chat_id: i64) -> Option<ConversationState> {
        let key = Self::state_key(chat_id);
        let raw = match self.cache.get(&key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(chat_id, error = %e, "State store unavailable, assuming no flow");
                return None;
            }
        };
        match raw.parse() {
            Ok(state) => Some(state),
            Err(_) => {
                warn!(chat_id, value = %raw, "Dropping invalid conversation state");
                if let Err(e) = self.cache.forget(&key).await {
                    warn!(chat_id, error = %e, "Failed to drop invalid conversation state");
                }
                None
            }
        }
    }

    /// Writes (or clears with `None`) the state. Returns false if the cache refused.
    pub async fn set(&self, chat_id: i64, state: Option<ConversationState>) -> bool {
        let key = Self::state_key(chat_id);
        let result = match state {
            Some(state) => self.cache.put(&key, state.as_str(), STATE_TTL).await,
            None => self.cache.forget(&key).await,
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(chat_id, state = ?state, error = %e, "Failed to store conversation state");
                false
            }
        }
    }

    pub async fn clear(&self, chat_id: i64) -> bool {
        self.set(chat_id, None).await
    }

    pub async fn is_in_registration(&self, chat_id: i64) -> bool {
        self.get(chat_id)
            .await
            .map(|s| s.is_registration())
            .unwrap_or(false)
    }

    pub async fn is_editing(&self, chat_id: i64) -> bool {
        self.get(chat_id).await.map(|s| s.is_editing()).unwrap_or(false)
    }

    /// Per-chat lock, one non-blocking attempt with a [`LOCK_LEASE`] lease.
    /// `None` when busy or when the cache cannot be reached.
    pub async fn lock(&self, chat_id: i64) -> Option<CacheLock> {
        match CacheLock::acquire(self.cache.as_ref(), Self::lock_key(chat_id), LOCK_LEASE).await {
            Ok(lock) => lock,
            Err(e) => {
                warn!(chat_id, error = %e, "Chat lock unavailable");
                None
            }
        }
    }

    pub async fn unlock(&self, lock: CacheLock) {
        lock.release(self.cache.as_ref()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheError, MemoryCache};
    use async_trait::async_trait;

    struct DownCache;

    #[async_trait]
    impl KeyValueCache for DownCache {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn put(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn add(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn forget(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn forget_if(&self, _key: &str, _expected: &str) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
    }

    fn store() -> (StateStore, Arc<MemoryCache>) {
        let cache = Arc::new(MemoryCache::new());
        (StateStore::new(cache.clone()), cache)
    }

    #[tokio::test]
    async fn test_set_get_clear() {
        let (store, _) = store();
        assert!(store.set(5, Some(ConversationState::WaitingPhone)).await);
        assert_eq!(store.get(5).await, Some(ConversationState::WaitingPhone));
        assert!(store.is_in_registration(5).await);
        assert!(!store.is_editing(5).await);
        assert!(store.clear(5).await);
        assert_eq!(store.get(5).await, None);
    }

    #[tokio::test]
    async fn test_invalid_stored_state_is_dropped() {
        let (store, cache) = store();
        cache
            .put("registration_state_9", "waiting_for_godot", STATE_TTL)
            .await
            .unwrap();
        assert_eq!(store.get(9).await, None);
        assert!(cache.get("registration_state_9").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_expires_after_ttl() {
        let (store, _) = store();
        store.set(1, Some(ConversationState::EditingEmail)).await;
        tokio::time::advance(STATE_TTL + Duration::from_secs(1)).await;
        assert_eq!(store.get(1).await, None);
    }

    #[tokio::test]
    async fn test_unreachable_cache_fails_open() {
        let store = StateStore::new(Arc::new(DownCache));
        assert_eq!(store.get(1).await, None);
        assert!(!store.set(1, Some(ConversationState::WaitingEmail)).await);
        assert!(!store.is_in_registration(1).await);
        assert!(store.lock(1).await.is_none());
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_per_chat() {
        let (store, _) = store();
        let first = store.lock(1).await.expect("lock");
        assert!(store.lock(1).await.is_none());
        assert!(store.lock(2).await.is_some());
        store.unlock(first).await;
        assert!(store.lock(1).await.is_some());
    }

    #[test]
    fn test_state_names_and_progression() {
        assert!(StateStore::is_valid_state("editing_phone"));
        assert!(!StateStore::is_valid_state("done"));
        assert_eq!(
            ConversationState::WaitingFullName.next(),
            Some(ConversationState::WaitingPhone)
        );
        assert_eq!(ConversationState::WaitingEmail.next(), None);
        assert_eq!(
            ConversationState::editing(ContactField::Phone).field(),
            ContactField::Phone
        );
    }
}

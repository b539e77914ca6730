//! Conversation store with TTL and LRU eviction.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use lru::LruCache;
use thiserror::Error;
use tracing::debug;

use super::types::{Conversation, Message, Role};

/// Limits applied by the cleanup pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationStoreConfig {
    /// Maximum number of live conversations.
    pub max_conversations: usize,
    /// Idle time after which a conversation is dropped.
    pub conversation_timeout: TimeDelta,
}

impl Default for ConversationStoreConfig {
    fn default() -> Self {
        Self {
            max_conversations: 1000,
            conversation_timeout: TimeDelta::hours(24),
        }
    }
}

/// Errors from conversation store operations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No conversation with this id is live.
    #[error("conversation not found: {0}")]
    NotFound(String),
}

/// Result type for conversation store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Thread-safe in-memory conversation store.
///
/// Entries are kept in recency order: every read or append moves a conversation to
/// the most-recently-used end, so the least recently used entry is also the one with
/// the oldest `updated_at`. All operations take a single lock; callers get snapshots.
pub struct ConversationStore {
    config: ConversationStoreConfig,
    entries: Mutex<LruCache<String, Conversation>>,
}

impl ConversationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(config: ConversationStoreConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(LruCache::unbounded()),
        }
    }

    /// Return the conversation with `id`, or start a new one when `id` is absent or
    /// unknown. Expired conversations are purged first, so an expired id also yields
    /// a new conversation.
    pub fn get_or_create(&self, id: Option<&str>) -> Conversation {
        let mut entries = self.lock();
        let now = Utc::now();
        self.evict_expired(&mut entries, now);

        if let Some(id) = id {
            if let Some(conversation) = entries.get_mut(id) {
                conversation.updated_at = now;
                return conversation.clone();
            }
            debug!("Unknown conversation {id}, starting a new one");
        }

        self.insert_new(&mut entries, now)
    }

    /// Start a new conversation regardless of any existing one.
    pub fn create(&self) -> Conversation {
        let mut entries = self.lock();
        let now = Utc::now();
        self.evict_expired(&mut entries, now);
        self.insert_new(&mut entries, now)
    }

    /// Append a message to a conversation and return it.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if the conversation is not live.
    pub fn append(
        &self,
        id: &str,
        role: Role,
        content: impl Into<String>,
        citations: Option<Vec<String>>,
    ) -> StoreResult<Message> {
        let mut entries = self.lock();
        let conversation = entries
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let message = Message::new(role, content, citations);
        conversation.updated_at = message.timestamp;
        conversation.messages.push(message.clone());
        Ok(message)
    }

    /// Snapshot a conversation, refreshing its `updated_at`.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if the conversation is not live.
    pub fn get(&self, id: &str) -> StoreResult<Conversation> {
        let mut entries = self.lock();
        let conversation = entries
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        conversation.updated_at = Utc::now();
        Ok(conversation.clone())
    }

    /// Remove a conversation.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if the conversation is not live.
    pub fn delete(&self, id: &str) -> StoreResult<()> {
        self.lock()
            .pop(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Drop every conversation idle for longer than the timeout as of `now`.
    /// Returns the number removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.lock();
        self.evict_expired(&mut entries, now)
    }

    /// Number of live conversations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Conversation>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn evict_expired(
        &self,
        entries: &mut LruCache<String, Conversation>,
        now: DateTime<Utc>,
    ) -> usize {
        let timeout = self.config.conversation_timeout;
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, c)| now.signed_duration_since(c.updated_at) > timeout)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            entries.pop(id);
        }
        if !expired.is_empty() {
            debug!("Expired {} idle conversations", expired.len());
        }
        expired.len()
    }

    fn insert_new(
        &self,
        entries: &mut LruCache<String, Conversation>,
        now: DateTime<Utc>,
    ) -> Conversation {
        // Leave room for the new entry.
        while entries.len() >= self.config.max_conversations {
            match entries.pop_lru() {
                Some((id, _)) => debug!("Evicted least recently used conversation {id}"),
                None => break,
            }
        }

        let conversation = Conversation::start(now);
        entries.put(conversation.id.clone(), conversation.clone());
        conversation
    }
}

#[cfg(test)]
mod tests {
    use std::thread::sleep;
    use std::time::Duration;

    use super::*;

    fn store_with(max_conversations: usize, timeout: TimeDelta) -> ConversationStore {
        ConversationStore::new(ConversationStoreConfig {
            max_conversations,
            conversation_timeout: timeout,
        })
    }

    #[test]
    fn test_get_or_create_reuses_known_id() {
        let store = ConversationStore::new(ConversationStoreConfig::default());
        let first = store.get_or_create(None);
        let again = store.get_or_create(Some(&first.id));
        assert_eq!(first.id, again.id);
        assert!(again.updated_at >= first.updated_at);

        let other = store.get_or_create(Some("no-such-id"));
        assert_ne!(other.id, "no-such-id");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_append_keeps_order() {
        let store = ConversationStore::new(ConversationStoreConfig::default());
        let conversation = store.create();

        assert!(store.append(&conversation.id, Role::User, "question", None).is_ok());
        assert!(
            store
                .append(
                    &conversation.id,
                    Role::Assistant,
                    "answer",
                    Some(vec!["https://a".to_string()]),
                )
                .is_ok()
        );

        let stored = store.get(&conversation.id);
        let roles: Vec<Role> = stored
            .as_ref()
            .map(|c| c.messages.iter().map(|m| m.role).collect())
            .unwrap_or_default();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(
            stored.map(|c| c.messages[1].citations.clone()),
            Ok(Some(vec!["https://a".to_string()]))
        );
    }

    #[test]
    fn test_append_to_missing_conversation() {
        let store = ConversationStore::new(ConversationStoreConfig::default());
        assert_eq!(
            store.append("ghost", Role::User, "hi", None),
            Err(StoreError::NotFound("ghost".to_string()))
        );
    }

    #[test]
    fn test_delete_twice() {
        let store = ConversationStore::new(ConversationStoreConfig::default());
        let conversation = store.create();
        assert_eq!(store.delete(&conversation.id), Ok(()));
        assert!(store.delete(&conversation.id).is_err());
        assert!(store.get(&conversation.id).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_capacity_evicts_least_recently_updated() {
        let store = store_with(3, TimeDelta::hours(24));
        let ids: Vec<String> = (0..3).map(|_| store.create().id).collect();

        // Touch the oldest so the second one becomes least recently used.
        assert!(store.get(&ids[0]).is_ok());

        let newest = store.create();
        assert_eq!(store.len(), 3);
        assert!(store.get(&ids[1]).is_err());
        assert!(store.get(&ids[0]).is_ok());
        assert!(store.get(&ids[2]).is_ok());
        assert!(store.get(&newest.id).is_ok());
    }

    #[test]
    fn test_max_plus_one_leaves_max() {
        let store = store_with(10, TimeDelta::hours(24));
        let ids: Vec<String> = (0..11).map(|_| store.create().id).collect();
        assert_eq!(store.len(), 10);
        assert!(store.get(&ids[0]).is_err());
        assert!(ids[1..].iter().all(|id| store.get(id).is_ok()));
    }

    #[test]
    fn test_purge_expired() {
        let store = store_with(10, TimeDelta::hours(24));
        let conversation = store.create();

        assert_eq!(store.purge_expired(Utc::now()), 0);
        assert_eq!(store.purge_expired(Utc::now() + TimeDelta::hours(25)), 1);
        assert!(store.get(&conversation.id).is_err());
    }

    #[test]
    fn test_concurrent_creates_evict_oldest_timestamps() {
        let store = store_with(4, TimeDelta::hours(24));
        let created: Vec<Conversation> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| (0..25).map(|_| store.create()).collect::<Vec<_>>()))
                .collect();
            workers
                .into_iter()
                .flat_map(|w| w.join().unwrap_or_default())
                .collect()
        });
        assert_eq!(created.len(), 100);
        assert_eq!(store.len(), 4);

        // Survivors must be the ones stamped last.
        let (live, evicted): (Vec<_>, Vec<_>) =
            created.iter().partition(|c| store.get(&c.id).is_ok());
        assert_eq!(live.len(), 4);
        let newest_evicted = evicted.iter().map(|c| c.updated_at).max();
        let oldest_live = live.iter().map(|c| c.updated_at).min();
        assert!(newest_evicted <= oldest_live);
    }

    #[test]
    fn test_creation_triggers_expiry() {
        let store = store_with(10, TimeDelta::milliseconds(20));
        let stale = store.create();
        sleep(Duration::from_millis(50));

        let fresh = store.get_or_create(Some(&stale.id));
        assert_ne!(fresh.id, stale.id);
        assert_eq!(store.len(), 1);
        assert!(store.get(&stale.id).is_err());
    }
}

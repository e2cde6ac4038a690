//! Decision cache with staleness rules.
//!
//! Entries are keyed by a fingerprint of the inference input: reader,
//! conversation, latest unread message and preference version. An entry is
//! stale after `ttl_hours` or once more than `max_new_messages` messages have
//! arrived in the conversation since it was written.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::HushResult;
use crate::traits::MessageStore;
use crate::types::NotificationDecision;

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries older than this are stale.
    pub ttl_hours: i64,
    /// Entries are stale once more than this many messages arrived since writing.
    pub max_new_messages: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_hours: 24,
            max_new_messages: 10,
        }
    }
}

/// A raw cache row. The payload is the JSON-encoded decision.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub payload: String,
    pub written_at: DateTime<Utc>,
}

/// Key/value persistence for the decision cache.
pub trait DecisionCacheStore: Send + Sync {
    fn get_entry(&self, key: &str) -> HushResult<Option<CacheEntry>>;

    /// Insert or overwrite.
    fn put_entry(&self, entry: &CacheEntry) -> HushResult<()>;

    fn remove_entry(&self, key: &str) -> HushResult<()>;

    /// Delete entries written before `cutoff`. Returns how many were removed.
    fn remove_written_before(&self, cutoff: DateTime<Utc>) -> HushResult<usize>;
}

/// Fingerprint of the inference input.
///
/// The reader is part of the key: two participants of the same conversation
/// share a latest message but not a decision.
pub fn cache_key(
    user_id: &str,
    conversation_id: &str,
    latest_message_id: &str,
    preference_version: u64,
) -> String {
    let mut hasher = Sha256::new();
    for part in [user_id, conversation_id, latest_message_id] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(preference_version.to_le_bytes());
    hex::encode(hasher.finalize())
}

/// A fresh cache hit.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub decision: NotificationDecision,
    /// Messages that arrived in the conversation after the entry was written.
    pub messages_since_cache: usize,
}

/// Decision cache over a [`DecisionCacheStore`].
pub struct DecisionCache {
    store: Arc<dyn DecisionCacheStore>,
    config: CacheConfig,
}

impl DecisionCache {
    pub fn new(store: Arc<dyn DecisionCacheStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a fresh entry.
    ///
    /// Unparseable or inconsistent entries are removed and reported as a miss.
    pub async fn lookup(
        &self,
        key: &str,
        conversation_id: &str,
        messages: &dyn MessageStore,
        now: DateTime<Utc>,
    ) -> HushResult<Option<CacheHit>> {
        let Some(entry) = self.store.get_entry(key)? else {
            debug!(cache_key = %key, "Decision cache miss");
            return Ok(None);
        };

        let decision = match serde_json::from_str::<NotificationDecision>(&entry.payload) {
            Ok(d) if d.is_consistent() && d.cache_key == key => d,
            Ok(_) => {
                warn!(cache_key = %key, "Discarding inconsistent cache entry");
                self.store.remove_entry(key)?;
                return Ok(None);
            }
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Discarding unparseable cache entry");
                self.store.remove_entry(key)?;
                return Ok(None);
            }
        };

        if now - entry.written_at > Duration::hours(self.config.ttl_hours) {
            debug!(cache_key = %key, "Decision cache entry expired");
            return Ok(None);
        }

        let messages_since_cache = messages
            .count_messages_since(conversation_id, entry.written_at)
            .await?;
        if messages_since_cache > self.config.max_new_messages {
            debug!(
                cache_key = %key,
                messages_since_cache,
                "Decision cache entry stale"
            );
            return Ok(None);
        }

        debug!(cache_key = %key, messages_since_cache, "Decision cache hit");
        Ok(Some(CacheHit {
            decision,
            messages_since_cache,
        }))
    }

    /// Store a decision under its own cache key, overwriting any entry.
    /// Entries past the TTL are dropped on the way.
    pub fn store(&self, decision: &NotificationDecision, written_at: DateTime<Utc>) -> HushResult<()> {
        let entry = CacheEntry {
            key: decision.cache_key.clone(),
            payload: serde_json::to_string(decision)?,
            written_at,
        };
        self.store.put_entry(&entry)?;

        let expired = self
            .store
            .remove_written_before(written_at - Duration::hours(self.config.ttl_hours))?;
        if expired > 0 {
            debug!(expired, "Pruned expired decision cache entries");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::{DecisionSource, Verdict};

    #[test]
    fn test_cache_key_depends_on_every_part() {
        let base = cache_key("alice", "conv-1", "m9", 3);
        assert_eq!(base, cache_key("alice", "conv-1", "m9", 3));
        assert_ne!(base, cache_key("bob", "conv-1", "m9", 3));
        assert_ne!(base, cache_key("alice", "conv-2", "m9", 3));
        assert_ne!(base, cache_key("alice", "conv-1", "m10", 3));
        assert_ne!(base, cache_key("alice", "conv-1", "m9", 4));
        assert_eq!(base.len(), 64);
    }

    #[test]
    fn test_cache_key_separates_fields() {
        assert_ne!(cache_key("ab", "c", "m", 0), cache_key("a", "bc", "m", 0));
    }

    fn decision(key: &str, at: DateTime<Utc>) -> NotificationDecision {
        NotificationDecision::from_verdict(
            Verdict::skip("routine"),
            DecisionSource::Heuristic,
            "alice",
            "conv-1",
            vec!["m1".to_string()],
            key,
            at,
        )
    }

    #[test]
    fn test_store_prunes_expired_entries() {
        let sqlite = Arc::new(SqliteStore::in_memory().unwrap());
        let cache = DecisionCache::new(sqlite.clone(), CacheConfig::default());
        let now = Utc::now();

        let old = decision("old", now - Duration::hours(30));
        cache.store(&old, old.generated_at).unwrap();
        assert!(sqlite.get_entry("old").unwrap().is_some());

        let fresh = decision("fresh", now);
        cache.store(&fresh, now).unwrap();
        assert!(sqlite.get_entry("old").unwrap().is_none());
        assert!(sqlite.get_entry("fresh").unwrap().is_some());
    }
}

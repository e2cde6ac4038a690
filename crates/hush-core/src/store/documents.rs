//! JSON documents: preferences, profiles, decisions, feedback and cache entries.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{from_ms, to_ms, SqliteStore};
use crate::cache::{CacheEntry, DecisionCacheStore};
use crate::error::HushResult;
use crate::traits::{DecisionLog, FeedbackStore, PreferenceStore};
use crate::types::{
    FeedbackRecord, NotificationDecision, UserNotificationPreferences, UserNotificationProfile,
};

impl PreferenceStore for SqliteStore {
    fn get_preferences(&self, user_id: &str) -> HushResult<Option<UserNotificationPreferences>> {
        let conn = self.conn()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM preferences WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    fn put_preferences(
        &self,
        preferences: &UserNotificationPreferences,
    ) -> HushResult<UserNotificationPreferences> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let current: Option<i64> = tx
            .query_row(
                "SELECT version FROM preferences WHERE user_id = ?1",
                params![preferences.user_id],
                |row| row.get(0),
            )
            .optional()?;

        let mut stored = preferences.clone();
        stored.version = current.map_or(1, |v| v as u64 + 1);
        tx.execute(
            "INSERT INTO preferences (user_id, data, version) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET data = excluded.data, version = excluded.version",
            params![
                stored.user_id,
                serde_json::to_string(&stored)?,
                stored.version as i64
            ],
        )?;
        tx.commit()?;
        Ok(stored)
    }

    fn get_profile(&self, user_id: &str) -> HushResult<Option<UserNotificationProfile>> {
        let conn = self.conn()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM profiles WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    fn put_profile(&self, profile: &UserNotificationProfile) -> HushResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO profiles (user_id, data, computed_at_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET data = excluded.data,
                                                computed_at_ms = excluded.computed_at_ms",
            params![
                profile.user_id,
                serde_json::to_string(profile)?,
                to_ms(profile.computed_at)
            ],
        )?;
        Ok(())
    }
}

impl DecisionLog for SqliteStore {
    fn append(&self, decision: &NotificationDecision) -> HushResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO decisions (decision_id, user_id, generated_at_ms, data)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                decision.decision_id,
                decision.user_id,
                to_ms(decision.generated_at),
                serde_json::to_string(decision)?
            ],
        )?;
        Ok(())
    }

    fn get(&self, decision_id: &str) -> HushResult<Option<NotificationDecision>> {
        let conn = self.conn()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM decisions WHERE decision_id = ?1",
                params![decision_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    fn list_for_user(&self, user_id: &str, limit: usize) -> HushResult<Vec<NotificationDecision>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT data FROM decisions WHERE user_id = ?1
             ORDER BY generated_at_ms DESC, rowid DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![user_id, limit as i64], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let documents = rows
            .iter()
            .map(|d| serde_json::from_str(d))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(documents)
    }
}

impl FeedbackStore for SqliteStore {
    fn append(&self, record: &FeedbackRecord) -> HushResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO feedback (user_id, decision_id, created_at_ms, data)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.user_id,
                record.decision.decision_id,
                to_ms(record.timestamp),
                serde_json::to_string(record)?
            ],
        )?;
        Ok(())
    }

    fn list_for_user(&self, user_id: &str) -> HushResult<Vec<FeedbackRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT data FROM feedback WHERE user_id = ?1 ORDER BY created_at_ms, id",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let documents = rows
            .iter()
            .map(|d| serde_json::from_str(d))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(documents)
    }

    fn users_with_feedback(&self) -> HushResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT DISTINCT user_id FROM feedback ORDER BY user_id")?;
        let users = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(users)
    }
}

impl DecisionCacheStore for SqliteStore {
    fn get_entry(&self, key: &str) -> HushResult<Option<CacheEntry>> {
        let conn = self.conn()?;
        let entry = conn
            .query_row(
                "SELECT cache_key, payload, written_at_ms FROM decision_cache WHERE cache_key = ?1",
                params![key],
                |row| {
                    Ok(CacheEntry {
                        key: row.get(0)?,
                        payload: row.get(1)?,
                        written_at: from_ms(row.get(2)?),
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    fn put_entry(&self, entry: &CacheEntry) -> HushResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO decision_cache (cache_key, payload, written_at_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT(cache_key) DO UPDATE SET payload = excluded.payload,
                                                  written_at_ms = excluded.written_at_ms",
            params![entry.key, entry.payload, to_ms(entry.written_at)],
        )?;
        Ok(())
    }

    fn remove_entry(&self, key: &str) -> HushResult<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM decision_cache WHERE cache_key = ?1", params![key])?;
        Ok(())
    }

    fn remove_written_before(&self, cutoff: DateTime<Utc>) -> HushResult<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM decision_cache WHERE written_at_ms < ?1",
            params![to_ms(cutoff)],
        )?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DecisionSource, Feedback, Priority, Verdict};
    use chrono::Duration;

    fn decision(user: &str, minutes_ago: i64) -> NotificationDecision {
        NotificationDecision::from_verdict(
            Verdict::notify(Priority::High, "mention", "Bob: review please"),
            DecisionSource::Heuristic,
            user,
            "conv-1",
            vec!["m1".to_string()],
            "key",
            Utc::now() - Duration::minutes(minutes_ago),
        )
    }

    #[test]
    fn test_preference_versions_increase() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.get_preferences("alice").unwrap().is_none());
        assert_eq!(store.preferences_or_default("alice").unwrap().version, 0);

        let prefs = UserNotificationPreferences::defaults_for("alice");
        let first = store.put_preferences(&prefs).unwrap();
        let second = store.put_preferences(&prefs.clone().with_keywords(["urgent"])).unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);

        let stored = store.get_preferences("alice").unwrap().unwrap();
        assert_eq!(stored, second);
    }

    #[test]
    fn test_profile_replace() {
        let store = SqliteStore::in_memory().unwrap();
        let mut profile = UserNotificationProfile::empty("alice", Utc::now());
        store.put_profile(&profile).unwrap();
        profile.suppressed_topics.insert("lunch".to_string());
        store.put_profile(&profile).unwrap();
        assert_eq!(store.get_profile("alice").unwrap().unwrap(), profile);
    }

    #[test]
    fn test_decision_log_is_append_only() {
        let store = SqliteStore::in_memory().unwrap();
        let older = decision("alice", 10);
        let newer = decision("alice", 1);
        DecisionLog::append(&store, &older).unwrap();
        DecisionLog::append(&store, &newer).unwrap();
        DecisionLog::append(&store, &older).unwrap();
        DecisionLog::append(&store, &decision("bob", 0)).unwrap();

        let listed = DecisionLog::list_for_user(&store, "alice", 10).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].decision_id, newer.decision_id);
        assert_eq!(store.get(&older.decision_id).unwrap().unwrap(), older);
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_feedback_history() {
        let store = SqliteStore::in_memory().unwrap();
        let d = decision("alice", 5);
        let later = Utc::now();
        FeedbackStore::append(
            &store,
            &FeedbackRecord::new(d.clone(), Feedback::NotHelpful, later),
        )
        .unwrap();
        FeedbackStore::append(
            &store,
            &FeedbackRecord::new(d, Feedback::Helpful, later - Duration::minutes(1)),
        )
        .unwrap();

        let history = FeedbackStore::list_for_user(&store, "alice").unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].is_helpful());
        assert_eq!(store.users_with_feedback().unwrap(), vec!["alice".to_string()]);
    }

    #[test]
    fn test_cache_entries_overwrite_and_remove() {
        let store = SqliteStore::in_memory().unwrap();
        let entry = CacheEntry {
            key: "k".to_string(),
            payload: "{}".to_string(),
            written_at: from_ms(to_ms(Utc::now())),
        };
        store.put_entry(&entry).unwrap();
        let replaced = CacheEntry {
            payload: "[]".to_string(),
            ..entry.clone()
        };
        store.put_entry(&replaced).unwrap();
        assert_eq!(store.get_entry("k").unwrap().unwrap(), replaced);

        store.remove_entry("k").unwrap();
        assert!(store.get_entry("k").unwrap().is_none());
    }

    #[test]
    fn test_cache_entries_removed_before_cutoff() {
        let store = SqliteStore::in_memory().unwrap();
        let now = from_ms(to_ms(Utc::now()));
        for (key, hours) in [("old", 30), ("edge", 24), ("new", 1)] {
            store
                .put_entry(&CacheEntry {
                    key: key.to_string(),
                    payload: "{}".to_string(),
                    written_at: now - Duration::hours(hours),
                })
                .unwrap();
        }

        let removed = store.remove_written_before(now - Duration::hours(24)).unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_entry("old").unwrap().is_none());
        assert!(store.get_entry("edge").unwrap().is_some());
        assert!(store.get_entry("new").unwrap().is_some());
    }
}

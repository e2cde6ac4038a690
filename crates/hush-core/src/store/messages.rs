//! Conversations, participants and messages.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::{from_ms, to_ms, SqliteStore};
use crate::error::HushResult;
use crate::traits::MessageStore;
use crate::types::{ChatMessage, UserIdentity};

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, sender_id, sender_name, text, created_at_ms, mentions";
const JOINED_MESSAGE_COLUMNS: &str =
    "m.id, m.conversation_id, m.sender_id, m.sender_name, m.text, m.created_at_ms, m.mentions";

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    let mentions: String = row.get(6)?;
    Ok(ChatMessage {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_name: row.get(3)?,
        text: row.get(4)?,
        created_at: from_ms(row.get(5)?),
        mentions: serde_json::from_str(&mentions).unwrap_or_default(),
    })
}

impl SqliteStore {
    /// Insert or update a user identity.
    pub fn upsert_user(&self, identity: &UserIdentity) -> HushResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (user_id, handle, display_name) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET handle = excluded.handle,
                                                display_name = excluded.display_name",
            params![identity.user_id, identity.handle, identity.display_name],
        )?;
        Ok(())
    }

    /// Add a participant to a conversation. Existing participants keep their read marker.
    pub fn add_participant(&self, conversation_id: &str, user_id: &str) -> HushResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO participants (conversation_id, user_id, last_read_ms)
             VALUES (?1, ?2, 0)",
            params![conversation_id, user_id],
        )?;
        Ok(())
    }

    /// Store a message. The sender becomes a participant. Returns `false`
    /// when a message with the same id already exists.
    pub fn insert_message(&self, message: &ChatMessage) -> HushResult<bool> {
        let mentions = serde_json::to_string(&message.mentions)?;
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO messages
                (id, conversation_id, sender_id, sender_name, text, created_at_ms, mentions)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.id,
                message.conversation_id,
                message.sender_id,
                message.sender_name,
                message.text,
                to_ms(message.created_at),
                mentions,
            ],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO participants (conversation_id, user_id, last_read_ms)
             VALUES (?1, ?2, 0)",
            params![message.conversation_id, message.sender_id],
        )?;
        Ok(inserted > 0)
    }

    /// Move a participant's read marker forward to `at`. Never moves it back.
    pub fn mark_read(&self, conversation_id: &str, user_id: &str, at: DateTime<Utc>) -> HushResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE participants SET last_read_ms = MAX(last_read_ms, ?3)
             WHERE conversation_id = ?1 AND user_id = ?2",
            params![conversation_id, user_id, to_ms(at)],
        )?;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn fetch_unread_messages(
        &self,
        conversation_id: &str,
        user_id: &str,
        limit: usize,
    ) -> HushResult<Vec<ChatMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages m
             JOIN participants p ON p.conversation_id = m.conversation_id AND p.user_id = ?2
             WHERE m.conversation_id = ?1
               AND m.sender_id != ?2
               AND m.created_at_ms > p.last_read_ms
             ORDER BY m.created_at_ms DESC, m.seq DESC
             LIMIT ?3",
            JOINED_MESSAGE_COLUMNS
        ))?;
        let mut messages = stmt
            .query_map(params![conversation_id, user_id, limit as i64], row_to_message)?
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn fetch_recent_user_activity(
        &self,
        user_id: &str,
        since_days: u32,
        limit: usize,
    ) -> HushResult<Vec<ChatMessage>> {
        let since = Utc::now() - Duration::days(since_days as i64);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages
             WHERE sender_id = ?1 AND created_at_ms >= ?2
             ORDER BY created_at_ms DESC, seq DESC
             LIMIT ?3",
            MESSAGE_COLUMNS
        ))?;
        let messages = stmt
            .query_map(params![user_id, to_ms(since), limit as i64], row_to_message)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    async fn fetch_messages(&self, message_ids: &[String]) -> HushResult<Vec<ChatMessage>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; message_ids.len()].join(", ");
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages WHERE id IN ({}) ORDER BY created_at_ms, seq",
            MESSAGE_COLUMNS, placeholders
        ))?;
        let messages = stmt
            .query_map(params_from_iter(message_ids.iter()), row_to_message)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    async fn user_conversation_ids(&self, user_id: &str) -> HushResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT conversation_id FROM participants WHERE user_id = ?1 ORDER BY conversation_id",
        )?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    async fn participants(&self, conversation_id: &str) -> HushResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id FROM participants WHERE conversation_id = ?1 ORDER BY user_id",
        )?;
        let ids = stmt
            .query_map(params![conversation_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    async fn is_participant(&self, conversation_id: &str, user_id: &str) -> HushResult<bool> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM participants WHERE conversation_id = ?1 AND user_id = ?2",
                params![conversation_id, user_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn user_identity(&self, user_id: &str) -> HushResult<Option<UserIdentity>> {
        let conn = self.conn()?;
        let identity = conn
            .query_row(
                "SELECT user_id, handle, display_name FROM users WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(UserIdentity {
                        user_id: row.get(0)?,
                        handle: row.get(1)?,
                        display_name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(identity)
    }

    async fn count_messages_since(
        &self,
        conversation_id: &str,
        since: DateTime<Utc>,
    ) -> HushResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1 AND created_at_ms > ?2",
            params![conversation_id, to_ms(since)],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, sender: &str, secs_ago: i64) -> ChatMessage {
        ChatMessage::new(
            id,
            "conv-1",
            sender,
            sender,
            format!("message {}", id),
            Utc::now() - Duration::seconds(secs_ago),
        )
    }

    fn store() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store.add_participant("conv-1", "alice").unwrap();
        store.add_participant("conv-1", "bob").unwrap();
        store
    }

    #[tokio::test]
    async fn test_unread_excludes_own_and_read_messages() {
        let store = store();
        store.insert_message(&message("m1", "bob", 300)).unwrap();
        store.insert_message(&message("m2", "alice", 200)).unwrap();
        store.insert_message(&message("m3", "bob", 100)).unwrap();
        store.insert_message(&message("m4", "bob", 10)).unwrap();

        let unread = store.fetch_unread_messages("conv-1", "alice", 30).await.unwrap();
        let ids: Vec<_> = unread.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m3", "m4"]);

        store
            .mark_read("conv-1", "alice", Utc::now() - Duration::seconds(50))
            .unwrap();
        let unread = store.fetch_unread_messages("conv-1", "alice", 30).await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, "m4");
    }

    #[tokio::test]
    async fn test_unread_limit_keeps_newest() {
        let store = store();
        for i in 0..5 {
            store
                .insert_message(&message(&format!("m{}", i), "bob", 100 - i))
                .unwrap();
        }
        let unread = store.fetch_unread_messages("conv-1", "alice", 2).await.unwrap();
        let ids: Vec<_> = unread.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m3", "m4"]);
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_ignored() {
        let store = store();
        assert!(store.insert_message(&message("m1", "bob", 10)).unwrap());
        assert!(!store.insert_message(&message("m1", "bob", 10)).unwrap());
        assert_eq!(store.fetch_messages(&["m1".to_string()]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mentions_round_trip() {
        let store = store();
        let m = message("m1", "bob", 10).with_mentions(vec!["alice".to_string()]);
        store.insert_message(&m).unwrap();
        let fetched = store.fetch_messages(&["m1".to_string()]).await.unwrap();
        assert_eq!(fetched[0].mentions, vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn test_participants_and_identity() {
        let store = store();
        store.insert_message(&message("m1", "carol", 10)).unwrap();

        assert!(store.is_participant("conv-1", "carol").await.unwrap());
        assert!(!store.is_participant("conv-1", "mallory").await.unwrap());
        assert_eq!(
            store.participants("conv-1").await.unwrap(),
            vec!["alice".to_string(), "bob".to_string(), "carol".to_string()]
        );
        assert_eq!(
            store.user_conversation_ids("alice").await.unwrap(),
            vec!["conv-1".to_string()]
        );

        assert!(store.user_identity("alice").await.unwrap().is_none());
        store
            .upsert_user(&UserIdentity::new("alice", "alice", "Alice Smith"))
            .unwrap();
        let identity = store.user_identity("alice").await.unwrap().unwrap();
        assert_eq!(identity.display_name, "Alice Smith");
    }

    #[tokio::test]
    async fn test_recent_activity_and_counts() {
        let store = store();
        store.insert_message(&message("m1", "alice", 3600)).unwrap();
        store.insert_message(&message("m2", "alice", 60)).unwrap();
        store.insert_message(&message("m3", "bob", 30)).unwrap();

        let activity = store.fetch_recent_user_activity("alice", 7, 100).await.unwrap();
        let ids: Vec<_> = activity.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m2", "m1"]);

        let since = Utc::now() - Duration::seconds(120);
        assert_eq!(store.count_messages_since("conv-1", since).await.unwrap(), 2);
    }
}

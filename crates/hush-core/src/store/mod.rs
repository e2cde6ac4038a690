//! SQLite reference implementation of every store trait.
//!
//! One connection behind a mutex serves messages, embeddings, preference and
//! profile documents, the decision log, feedback and the decision cache.
//! Timestamps are stored as Unix milliseconds.

mod documents;
mod embeddings;
mod messages;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;
use tracing::debug;

use crate::error::{HushError, HushResult};

/// SQLite-backed store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path, creating parent directories.
    pub fn new(path: impl AsRef<Path>) -> HushResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        debug!(path = %path.display(), "Opened SQLite store");
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> HushResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub(crate) fn conn(&self) -> HushResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| HushError::internal("SQLite connection lock poisoned"))
    }

    fn init_schema(&self) -> HushResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                handle TEXT NOT NULL,
                display_name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS participants (
                conversation_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                last_read_ms INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (conversation_id, user_id)
            );

            CREATE INDEX IF NOT EXISTS idx_participants_user ON participants(user_id);

            CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                conversation_id TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                sender_name TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL,
                mentions TEXT NOT NULL DEFAULT '[]'
            );

            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id, created_at_ms);
            CREATE INDEX IF NOT EXISTS idx_messages_sender
                ON messages(sender_id, created_at_ms);

            CREATE TABLE IF NOT EXISTS message_embeddings (
                message_id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                vector BLOB NOT NULL,
                model TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_embeddings_conversation
                ON message_embeddings(conversation_id);

            CREATE TABLE IF NOT EXISTS preferences (
                user_id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                version INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS profiles (
                user_id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                computed_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS decisions (
                decision_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                generated_at_ms INTEGER NOT NULL,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_decisions_user
                ON decisions(user_id, generated_at_ms);

            CREATE TABLE IF NOT EXISTS feedback (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                decision_id TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_feedback_user ON feedback(user_id, created_at_ms);

            CREATE TABLE IF NOT EXISTS decision_cache (
                cache_key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                written_at_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_decision_cache_written ON decision_cache(written_at_ms);
        "#,
        )?;
        Ok(())
    }
}

pub(crate) fn to_ms(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_ms(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{MessageStore, PreferenceStore};
    use crate::types::{ChatMessage, UserNotificationPreferences};

    #[test]
    fn test_in_memory_store() {
        assert!(SqliteStore::in_memory().is_ok());
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("hush.db");

        {
            let store = SqliteStore::new(&path).unwrap();
            store
                .put_preferences(&UserNotificationPreferences::defaults_for("alice"))
                .unwrap();
        }

        let store = SqliteStore::new(&path).unwrap();
        let prefs = store.get_preferences("alice").unwrap().unwrap();
        assert_eq!(prefs.version, 1);
    }

    #[test]
    fn test_file_store_keeps_read_markers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hush.db");
        let sent = Utc::now() - chrono::Duration::seconds(30);

        {
            let store = SqliteStore::new(&path).unwrap();
            store.add_participant("conv-1", "alice").unwrap();
            store
                .insert_message(&ChatMessage::new("m1", "conv-1", "bob", "Bob", "hi", sent))
                .unwrap();
            store.mark_read("conv-1", "alice", Utc::now()).unwrap();
        }

        let store = SqliteStore::new(&path).unwrap();
        let unread =
            tokio_test::block_on(store.fetch_unread_messages("conv-1", "alice", 10)).unwrap();
        assert!(unread.is_empty());
        assert!(tokio_test::block_on(store.is_participant("conv-1", "bob")).unwrap());
    }

    #[test]
    fn test_millisecond_round_trip() {
        let now = Utc::now();
        assert_eq!(to_ms(from_ms(to_ms(now))), to_ms(now));
    }
}

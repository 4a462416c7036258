use std::path::Path;

use chrono::Utc;
use rusqlite::{OptionalExtension, Result as SqlResult, params};
use uuid::Uuid;

use crate::common::ChatMessage;

use super::database::Database;

/// Display name recorded when the sender gives none.
pub const DEFAULT_USER: &str = "Anonymous";

/// Timestamp boundary below which all messages are known to have been
/// delivered to one stream connection.
///
/// Compared strictly greater, `timestamp` first, with `seq` breaking ties
/// between messages written in the same millisecond.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Watermark {
    pub timestamp: i64,
    pub seq: i64,
}

impl Watermark {
    /// Resume point for a client that only knows its last-seen timestamp.
    /// Rows at exactly `timestamp` count as already delivered.
    pub fn from_timestamp(timestamp: i64) -> Self {
        Self {
            timestamp,
            seq: i64::MAX,
        }
    }

    /// Advance to a delivered message.
    pub fn observe(&mut self, message: &ChatMessage) {
        self.timestamp = message.timestamp;
        self.seq = message.seq;
    }
}

/// Append-only message collection backed by SQLite.
pub struct MessageStore {
    db: Database,
}

impl MessageStore {
    /// Open (and initialize) the store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        let store = Self {
            db: Database::new(path)?,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store, mainly for tests.
    pub fn in_memory() -> SqlResult<Self> {
        let store = Self {
            db: Database::in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> SqlResult<()> {
        let conn = self.db.connection();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                user TEXT NOT NULL,
                content TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_timestamp_seq
             ON messages(timestamp, seq)",
            [],
        )?;

        Ok(())
    }

    /// Insert a new message, assigning id, timestamp and sequence.
    pub fn append(&self, content: &str, user: Option<&str>) -> SqlResult<ChatMessage> {
        let conn = self.db.connection();
        let id = Uuid::new_v4().to_string();
        let user = user.unwrap_or(DEFAULT_USER);
        let timestamp = Utc::now().timestamp_millis();

        conn.execute(
            "INSERT INTO messages (id, user, content, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, user, content, timestamp],
        )?;
        let seq = conn.last_insert_rowid();

        Ok(ChatMessage {
            id,
            user: user.to_string(),
            content: content.to_string(),
            timestamp,
            seq,
        })
    }

    /// Get messages strictly past a watermark, oldest first.
    pub fn messages_after(&self, watermark: &Watermark) -> SqlResult<Vec<ChatMessage>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT seq, id, user, content, timestamp
             FROM messages
             WHERE timestamp > ?1 OR (timestamp = ?1 AND seq > ?2)
             ORDER BY timestamp ASC, seq ASC",
        )?;

        let messages = stmt
            .query_map(params![watermark.timestamp, watermark.seq], |row| {
                Ok(ChatMessage {
                    seq: row.get(0)?,
                    id: row.get(1)?,
                    user: row.get(2)?,
                    content: row.get(3)?,
                    timestamp: row.get(4)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(messages)
    }

    /// Watermark of the newest stored message; the zero watermark when empty.
    pub fn latest_watermark(&self) -> SqlResult<Watermark> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT timestamp, seq FROM messages
             ORDER BY timestamp DESC, seq DESC LIMIT 1",
        )?;

        let watermark = stmt
            .query_row([], |row| {
                Ok(Watermark {
                    timestamp: row.get(0)?,
                    seq: row.get(1)?,
                })
            })
            .optional()?;

        Ok(watermark.unwrap_or_default())
    }

    /// Get message count.
    pub fn message_count(&self) -> SqlResult<usize> {
        let conn = self.db.connection();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_assigns_id_timestamp_and_seq() {
        let store = MessageStore::in_memory().unwrap();
        let first = store.append("hi", Some("alice")).unwrap();
        let second = store.append("there", Some("alice")).unwrap();

        assert!(!first.id.is_empty());
        assert_ne!(first.id, second.id);
        assert!(first.timestamp > 0);
        assert!(second.seq > first.seq);
        assert!(second.timestamp >= first.timestamp);
        assert_eq!(store.message_count().unwrap(), 2);
    }

    #[test]
    fn missing_user_defaults_to_placeholder() {
        let store = MessageStore::in_memory().unwrap();
        let message = store.append("hello", None).unwrap();
        assert_eq!(message.user, DEFAULT_USER);
    }

    #[test]
    fn messages_after_returns_only_newer_rows_in_order() {
        let store = MessageStore::in_memory().unwrap();
        let first = store.append("one", None).unwrap();
        store.append("two", None).unwrap();
        store.append("three", None).unwrap();

        let mut watermark = Watermark::default();
        let all = store.messages_after(&watermark).unwrap();
        let contents: Vec<_> = all.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["one", "two", "three"]);

        watermark.observe(&first);
        let rest = store.messages_after(&watermark).unwrap();
        let contents: Vec<_> = rest.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["two", "three"]);
    }

    #[test]
    fn equal_timestamps_are_split_by_seq() {
        // Two appends in the same millisecond share a timestamp; seq still
        // separates observed from unobserved.
        let store = MessageStore::in_memory().unwrap();
        let first = store.append("a", None).unwrap();
        let second = store.append("b", None).unwrap();

        let mut watermark = Watermark::default();
        watermark.observe(&first);
        let rest = store.messages_after(&watermark).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, second.id);
    }

    #[test]
    fn latest_watermark_tracks_newest_row() {
        let store = MessageStore::in_memory().unwrap();
        assert_eq!(store.latest_watermark().unwrap(), Watermark::default());

        let message = store.append("hi", None).unwrap();
        let watermark = store.latest_watermark().unwrap();
        assert_eq!(watermark.timestamp, message.timestamp);
        assert_eq!(watermark.seq, message.seq);
        assert!(store.messages_after(&watermark).unwrap().is_empty());
    }

    #[test]
    fn resume_watermark_is_strictly_greater() {
        let store = MessageStore::in_memory().unwrap();
        let message = store.append("hi", None).unwrap();

        let at = Watermark::from_timestamp(message.timestamp);
        assert!(store.messages_after(&at).unwrap().is_empty());

        let before = Watermark::from_timestamp(message.timestamp - 1);
        assert_eq!(store.messages_after(&before).unwrap().len(), 1);
    }
}

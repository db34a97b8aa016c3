use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::StorageError;
use super::models::UnreadSummary;
use crate::common::{Message, MessageId, Role, UserId, UserProfile};

type StoreResult<T> = Result<T, StorageError>;

/// Database for the chat core (direct messages and the user directory)
pub struct ChatDatabase {
    conn: Connection,
}

impl ChatDatabase {
    /// Open (or create) the chat database at `path`
    pub fn with_path<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        super::ensure_data_dir(&path)?;
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let chat_db = Self { conn };
        chat_db.init_schema()?;
        Ok(chat_db)
    }

    /// Fresh database that lives as long as the process
    pub fn in_memory() -> StoreResult<Self> {
        let chat_db = Self {
            conn: Connection::open_in_memory()?,
        };
        chat_db.init_schema()?;
        Ok(chat_db)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = &self.conn;

        // seq orders messages that share a timestamp
        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                sender_id TEXT NOT NULL,
                receiver_id TEXT NOT NULL,
                content TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                avatar TEXT,
                role TEXT NOT NULL DEFAULT 'student'
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_pair
             ON messages(sender_id, receiver_id, timestamp_ms)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_unread
             ON messages(receiver_id, is_read)",
            [],
        )?;

        Ok(())
    }

    // ========== Messages ==========

    /// Append a message; the returned copy carries the assigned id
    pub fn insert_message(
        &self,
        sender_id: &UserId,
        receiver_id: &UserId,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> StoreResult<Message> {
        let timestamp_ms = timestamp.timestamp_millis();
        let message = Message {
            id: MessageId::generate(),
            sender_id: sender_id.clone(),
            receiver_id: receiver_id.clone(),
            content: content.to_string(),
            timestamp: from_millis(timestamp_ms)?,
            read: false,
            sender: None,
        };

        self.conn.execute(
            "INSERT INTO messages (id, sender_id, receiver_id, content, timestamp_ms, is_read)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            params![
                message.id.as_str(),
                message.sender_id.as_str(),
                message.receiver_id.as_str(),
                message.content,
                timestamp_ms
            ],
        )?;

        Ok(message)
    }

    /// Every message exchanged between two users, oldest first
    pub fn conversation(&self, user_a: &UserId, user_b: &UserId) -> StoreResult<Vec<Message>> {
        let conn = &self.conn;
        let mut stmt = conn.prepare(
            "SELECT id, sender_id, receiver_id, content, timestamp_ms, is_read
             FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)
             ORDER BY timestamp_ms ASC, seq ASC",
        )?;

        let rows = stmt
            .query_map(params![user_a.as_str(), user_b.as_str()], read_message_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(MessageRow::into_message).collect()
    }

    /// Flag everything `from` sent to `to` as read; returns rows changed
    pub fn mark_read(&self, from: &UserId, to: &UserId) -> StoreResult<usize> {
        let updated = self.conn.execute(
            "UPDATE messages SET is_read = 1
             WHERE sender_id = ?1 AND receiver_id = ?2 AND is_read = 0",
            params![from.as_str(), to.as_str()],
        )?;
        Ok(updated)
    }

    /// Unread messages addressed to `receiver`, grouped by sender
    pub fn unread_by_sender(&self, receiver: &UserId) -> StoreResult<HashMap<UserId, UnreadSummary>> {
        let conn = &self.conn;
        let mut stmt = conn.prepare(
            "SELECT id, sender_id, receiver_id, content, timestamp_ms, is_read
             FROM messages
             WHERE receiver_id = ?1 AND is_read = 0
             ORDER BY timestamp_ms DESC, seq DESC",
        )?;

        let rows = stmt
            .query_map(params![receiver.as_str()], read_message_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut summaries: HashMap<UserId, UnreadSummary> = HashMap::new();
        for row in rows {
            let message = row.into_message()?;
            // Rows arrive newest first, so the first one per sender is the latest.
            summaries
                .entry(message.sender_id)
                .and_modify(|summary| summary.unread_count += 1)
                .or_insert(UnreadSummary {
                    last_message: message.content,
                    last_message_time: message.timestamp,
                    unread_count: 1,
                });
        }

        Ok(summaries)
    }

    // ========== Users ==========

    /// Insert or replace a user profile
    pub fn upsert_user(&self, profile: &UserProfile) -> StoreResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO users (id, name, avatar, role) VALUES (?1, ?2, ?3, ?4)",
            params![
                profile.id.as_str(),
                profile.name,
                profile.avatar,
                profile.role.as_str()
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: &UserId) -> StoreResult<Option<UserProfile>> {
        let conn = &self.conn;
        let row = conn
            .query_row(
                "SELECT id, name, avatar, role FROM users WHERE id = ?1",
                params![id.as_str()],
                read_user_row,
            )
            .optional()?;

        row.map(UserRow::into_profile).transpose()
    }

    /// All users except `id`, ordered by name
    pub fn users_except(&self, id: &UserId) -> StoreResult<Vec<UserProfile>> {
        let conn = &self.conn;
        let mut stmt = conn.prepare(
            "SELECT id, name, avatar, role FROM users WHERE id != ?1 ORDER BY name ASC, id ASC",
        )?;

        let rows = stmt
            .query_map(params![id.as_str()], read_user_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(UserRow::into_profile).collect()
    }
}

struct MessageRow {
    id: String,
    sender_id: String,
    receiver_id: String,
    content: String,
    timestamp_ms: i64,
    read: bool,
}

impl MessageRow {
    fn into_message(self) -> StoreResult<Message> {
        Ok(Message {
            id: MessageId::from(self.id),
            sender_id: UserId::from(self.sender_id),
            receiver_id: UserId::from(self.receiver_id),
            content: self.content,
            timestamp: from_millis(self.timestamp_ms)?,
            read: self.read,
            sender: None,
        })
    }
}

fn read_message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        content: row.get(3)?,
        timestamp_ms: row.get(4)?,
        read: row.get::<_, i64>(5)? != 0,
    })
}

struct UserRow {
    id: String,
    name: String,
    avatar: Option<String>,
    role: String,
}

impl UserRow {
    fn into_profile(self) -> StoreResult<UserProfile> {
        let role = self
            .role
            .parse::<Role>()
            .map_err(|err| StorageError::Corrupt(format!("user {}: {err}", self.id)))?;
        Ok(UserProfile {
            id: UserId::from(self.id),
            name: self.name,
            avatar: self.avatar,
            role,
        })
    }
}

fn read_user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        avatar: row.get(2)?,
        role: row.get(3)?,
    })
}

fn from_millis(timestamp_ms: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(timestamp_ms)
        .ok_or_else(|| StorageError::Corrupt(format!("timestamp {timestamp_ms} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    #[test]
    fn insert_assigns_unique_ids_and_starts_unread() {
        let db = ChatDatabase::in_memory().unwrap();
        let first = db.insert_message(&user("a"), &user("b"), "hi", at(0)).unwrap();
        let second = db.insert_message(&user("a"), &user("b"), "hi", at(0)).unwrap();

        assert_ne!(first.id, second.id);
        assert!(!first.read);
        assert_eq!(db.conversation(&user("a"), &user("b")).unwrap().len(), 2);
    }

    #[test]
    fn conversation_is_symmetric_and_ordered() {
        let db = ChatDatabase::in_memory().unwrap();
        let late = db.insert_message(&user("a"), &user("b"), "third", at(20)).unwrap();
        let early = db.insert_message(&user("b"), &user("a"), "first", at(10)).unwrap();
        let tie = db.insert_message(&user("a"), &user("b"), "fourth", at(20)).unwrap();
        db.insert_message(&user("a"), &user("c"), "elsewhere", at(5)).unwrap();

        let ab = db.conversation(&user("a"), &user("b")).unwrap();
        let ba = db.conversation(&user("b"), &user("a")).unwrap();

        assert_eq!(ab, ba);
        let ids: Vec<_> = ab.iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids, vec![early.id, late.id, tie.id]);
    }

    #[test]
    fn timestamps_survive_with_millisecond_precision() {
        let db = ChatDatabase::in_memory().unwrap();
        let now = Utc::now();
        let stored = db.insert_message(&user("a"), &user("b"), "hi", now).unwrap();
        let loaded = db.conversation(&user("a"), &user("b")).unwrap();

        assert_eq!(stored.timestamp.timestamp_millis(), now.timestamp_millis());
        assert_eq!(loaded[0], stored);
    }

    #[test]
    fn mark_read_only_touches_one_direction_and_is_idempotent() {
        let db = ChatDatabase::in_memory().unwrap();
        db.insert_message(&user("a"), &user("b"), "one", at(0)).unwrap();
        db.insert_message(&user("a"), &user("b"), "two", at(1)).unwrap();
        db.insert_message(&user("b"), &user("a"), "reply", at(2)).unwrap();

        assert_eq!(db.mark_read(&user("a"), &user("b")).unwrap(), 2);
        assert_eq!(db.mark_read(&user("a"), &user("b")).unwrap(), 0);

        let history = db.conversation(&user("a"), &user("b")).unwrap();
        for message in history {
            assert_eq!(message.read, message.sender_id == user("a"));
        }
    }

    #[test]
    fn read_flag_never_resets() {
        let db = ChatDatabase::in_memory().unwrap();
        db.insert_message(&user("a"), &user("b"), "one", at(0)).unwrap();
        db.mark_read(&user("a"), &user("b")).unwrap();
        db.insert_message(&user("a"), &user("b"), "two", at(1)).unwrap();

        let history = db.conversation(&user("a"), &user("b")).unwrap();
        assert!(history[0].read);
        assert!(!history[1].read);
    }

    #[test]
    fn unread_summary_counts_and_reports_latest() {
        let db = ChatDatabase::in_memory().unwrap();
        db.insert_message(&user("a"), &user("u"), "a-old", at(0)).unwrap();
        db.insert_message(&user("a"), &user("u"), "a-new", at(5)).unwrap();
        db.insert_message(&user("a"), &user("u"), "a-tie", at(5)).unwrap();
        db.insert_message(&user("b"), &user("u"), "b-only", at(3)).unwrap();
        db.insert_message(&user("c"), &user("u"), "c-read", at(4)).unwrap();
        db.insert_message(&user("u"), &user("a"), "outgoing", at(9)).unwrap();
        db.mark_read(&user("c"), &user("u")).unwrap();

        let summary = db.unread_by_sender(&user("u")).unwrap();

        assert_eq!(summary.len(), 2);
        let from_a = &summary[&user("a")];
        assert_eq!(from_a.unread_count, 3);
        assert_eq!(from_a.last_message, "a-tie");
        assert_eq!(from_a.last_message_time, at(5));
        assert_eq!(summary[&user("b")].unread_count, 1);
        assert!(!summary.contains_key(&user("c")));
    }

    #[test]
    fn users_except_skips_caller_and_sorts_by_name() {
        let db = ChatDatabase::in_memory().unwrap();
        for (id, name, role) in [
            ("u1", "Zoe", Role::Student),
            ("u2", "Acme", Role::Company),
            ("u3", "Mia", Role::Admin),
        ] {
            db.upsert_user(&UserProfile {
                id: user(id),
                name: name.to_string(),
                avatar: None,
                role,
            })
            .unwrap();
        }

        let names: Vec<_> = db
            .users_except(&user("u3"))
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Acme", "Zoe"]);
        assert_eq!(db.get_user(&user("u2")).unwrap().unwrap().role, Role::Company);
        assert!(db.get_user(&user("missing")).unwrap().is_none());
    }
}

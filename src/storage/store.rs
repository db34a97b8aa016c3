use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::StorageError;
use super::chat_db::ChatDatabase;
use super::models::UnreadSummary;
use crate::common::{Message, UserId, UserProfile};

/// Append-only log of direct messages.
///
/// Every call is an I/O boundary; callers must not hold shared locks
/// across it.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(
        &self,
        sender_id: &UserId,
        receiver_id: &UserId,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Message, StorageError>;

    /// Messages between two users in either direction, oldest first.
    async fn history(&self, user_a: &UserId, user_b: &UserId) -> Result<Vec<Message>, StorageError>;

    /// Marks every unread message `from → to` as read.
    async fn mark_read(&self, from: &UserId, to: &UserId) -> Result<usize, StorageError>;

    async fn unread_summary(
        &self,
        for_user: &UserId,
    ) -> Result<HashMap<UserId, UnreadSummary>, StorageError>;
}

/// Read access to the profiles owned by the identity provider.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: &UserId) -> Result<Option<UserProfile>, StorageError>;

    async fn users_except(&self, id: &UserId) -> Result<Vec<UserProfile>, StorageError>;
}

/// SQLite-backed store shared by the gateway and the sync service.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<ChatDatabase>>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        Ok(Self::from_database(ChatDatabase::with_path(path)?))
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        Ok(Self::from_database(ChatDatabase::in_memory()?))
    }

    pub fn from_database(db: ChatDatabase) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    pub async fn upsert_user(&self, profile: UserProfile) -> Result<(), StorageError> {
        self.run(move |db| db.upsert_user(&profile)).await
    }

    /// Runs `op` on the blocking pool with exclusive access to the connection.
    async fn run<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        F: FnOnce(&ChatDatabase) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let guard = db.lock();
            op(&guard)
        })
        .await?
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn append(
        &self,
        sender_id: &UserId,
        receiver_id: &UserId,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Message, StorageError> {
        let (sender_id, receiver_id) = (sender_id.clone(), receiver_id.clone());
        let content = content.to_string();
        self.run(move |db| db.insert_message(&sender_id, &receiver_id, &content, timestamp))
            .await
    }

    async fn history(&self, user_a: &UserId, user_b: &UserId) -> Result<Vec<Message>, StorageError> {
        let (user_a, user_b) = (user_a.clone(), user_b.clone());
        self.run(move |db| db.conversation(&user_a, &user_b)).await
    }

    async fn mark_read(&self, from: &UserId, to: &UserId) -> Result<usize, StorageError> {
        let (from, to) = (from.clone(), to.clone());
        self.run(move |db| db.mark_read(&from, &to)).await
    }

    async fn unread_summary(
        &self,
        for_user: &UserId,
    ) -> Result<HashMap<UserId, UnreadSummary>, StorageError> {
        let for_user = for_user.clone();
        self.run(move |db| db.unread_by_sender(&for_user)).await
    }
}

#[async_trait]
impl UserDirectory for SqliteStore {
    async fn find_user(&self, id: &UserId) -> Result<Option<UserProfile>, StorageError> {
        let id = id.clone();
        self.run(move |db| db.get_user(&id)).await
    }

    async fn users_except(&self, id: &UserId) -> Result<Vec<UserProfile>, StorageError> {
        let id = id.clone();
        self.run(move |db| db.users_except(&id)).await
    }
}

//! Request/response side of messaging: history, chat list, read tracking.
//!
//! Callers are already authenticated; the service only checks that the
//! requester is a party to what it asks for.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use crate::common::{ChatUser, Message, SenderInfo, UserId, UserProfile};
use crate::error::{ChatError, ChatResult};
use crate::network::presence::PresenceRegistry;
use crate::storage::{MessageStore, UnreadSummary, UserDirectory};

pub struct ConversationService {
    store: Arc<dyn MessageStore>,
    directory: Arc<dyn UserDirectory>,
    presence: Arc<PresenceRegistry>,
}

impl ConversationService {
    pub fn new(
        store: Arc<dyn MessageStore>,
        directory: Arc<dyn UserDirectory>,
        presence: Arc<PresenceRegistry>,
    ) -> Self {
        Self {
            store,
            directory,
            presence,
        }
    }

    /// Full conversation between the caller and `counterpart`, oldest first.
    pub async fn get_history(
        &self,
        current: &UserId,
        counterpart: &UserId,
    ) -> ChatResult<Vec<Message>> {
        let counterpart_profile = self.require_user(counterpart).await?;
        let current_profile = self.directory.find_user(current).await?;

        let messages = self.store.history(current, counterpart).await?;
        Ok(with_senders(messages, &[current_profile, Some(counterpart_profile)]))
    }

    /// History of an arbitrary pair, visible only to its two parties.
    pub async fn history_between(
        &self,
        requester: &UserId,
        user_a: &UserId,
        user_b: &UserId,
    ) -> ChatResult<Vec<Message>> {
        if requester != user_a && requester != user_b {
            return Err(ChatError::Unauthorized(format!(
                "{requester} is not a party to this conversation"
            )));
        }
        let profiles = [
            self.directory.find_user(user_a).await?,
            self.directory.find_user(user_b).await?,
        ];
        let messages = self.store.history(user_a, user_b).await?;
        Ok(with_senders(messages, &profiles))
    }

    /// Every other user with live presence and the caller's unread state.
    pub async fn get_chat_list(&self, current: &UserId) -> ChatResult<Vec<ChatUser>> {
        let users = self.directory.users_except(current).await?;
        let mut unread = self.store.unread_summary(current).await?;
        let online_users: HashSet<UserId> = self.presence.online_users().into_iter().collect();

        let chat_users = users
            .into_iter()
            .map(|profile| {
                let summary = unread.remove(&profile.id);
                let online = online_users.contains(&profile.id);
                chat_user(profile, online, summary)
            })
            .collect();

        Ok(chat_users)
    }

    /// Record that `current` has read everything `counterpart` sent them.
    pub async fn mark_read(&self, current: &UserId, counterpart: &UserId) -> ChatResult<usize> {
        let updated = self.store.mark_read(counterpart, current).await?;
        log::debug!("Marked {updated} messages from {counterpart} to {current} as read");
        Ok(updated)
    }

    /// Persist a message without realtime delivery; the receiver picks it
    /// up from history or the chat list.
    pub async fn post_message(
        &self,
        sender: &UserId,
        receiver: &UserId,
        content: &str,
    ) -> ChatResult<Message> {
        if content.trim().is_empty() {
            return Err(ChatError::InvalidRequest("message content is empty".to_string()));
        }
        self.require_user(receiver).await?;
        let sender_profile = self.directory.find_user(sender).await?;

        let mut message = self.store.append(sender, receiver, content, Utc::now()).await?;
        message.sender = sender_profile.as_ref().map(SenderInfo::from);
        log::info!("Stored message {} from {sender} to {receiver}", message.id);
        Ok(message)
    }

    async fn require_user(&self, id: &UserId) -> ChatResult<UserProfile> {
        self.directory
            .find_user(id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("user {id}")))
    }
}

fn with_senders(messages: Vec<Message>, profiles: &[Option<UserProfile>]) -> Vec<Message> {
    messages
        .into_iter()
        .map(|mut message| {
            message.sender = profiles
                .iter()
                .flatten()
                .find(|profile| profile.id == message.sender_id)
                .map(SenderInfo::from);
            message
        })
        .collect()
}

fn chat_user(profile: UserProfile, online: bool, summary: Option<UnreadSummary>) -> ChatUser {
    let unread_count = summary.as_ref().map_or(0, |s| s.unread_count);
    ChatUser {
        id: profile.id,
        name: profile.name,
        avatar: profile.avatar.unwrap_or_default(),
        online,
        kind: profile.role,
        has_new_message: unread_count > 0,
        unread_count,
        last_message: summary
            .as_ref()
            .map(|s| s.last_message.clone())
            .unwrap_or_default(),
        last_message_time: summary.as_ref().map(|s| s.last_message_time),
        is_new_chat: summary.is_none(),
    }
}

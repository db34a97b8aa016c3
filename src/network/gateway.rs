use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use super::identity::is_valid_user_id;
use super::presence::{ConnectionHandle, PresenceRegistry};
use crate::common::{ClientEvent, DraftMessage, SenderInfo, ServerEvent, TempId, UserId};
use crate::storage::{MessageStore, UserDirectory};

const SEND_FAILED: &str = "Failed to send message";

/// Outcome of pushing a persisted message to its receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Pushed,
    /// Receiver not connected; the message waits in history.
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Joined(UserId),
    Closed,
}

/// Shared entry point for realtime connections.
pub struct Gateway {
    presence: Arc<PresenceRegistry>,
    store: Arc<dyn MessageStore>,
    directory: Arc<dyn UserDirectory>,
}

impl Gateway {
    pub fn new(
        presence: Arc<PresenceRegistry>,
        store: Arc<dyn MessageStore>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            presence,
            store,
            directory,
        }
    }

    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.presence
    }

    /// Profile fields shown next to a pushed message. A directory failure
    /// only costs the decoration, never the delivery.
    async fn sender_info(&self, sender_id: &UserId) -> Option<SenderInfo> {
        match self.directory.find_user(sender_id).await {
            Ok(profile) => profile.as_ref().map(SenderInfo::from),
            Err(err) => {
                log::warn!("Profile lookup for sender {sender_id} failed: {err}");
                None
            }
        }
    }

    /// Start a session for a freshly opened connection.
    pub fn open_session(self: &Arc<Self>, sender: mpsc::UnboundedSender<ServerEvent>) -> Session {
        let handle = ConnectionHandle::new(sender);
        log::debug!("Connection {} opened", handle.id());
        Session {
            gateway: Arc::clone(self),
            handle,
            state: SessionState::Unauthenticated,
            verified_user: None,
        }
    }
}

/// Per-connection protocol state. Events must be fed in arrival order.
pub struct Session {
    gateway: Arc<Gateway>,
    handle: ConnectionHandle,
    state: SessionState,
    verified_user: Option<UserId>,
}

impl Session {
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Pin the identity established by the transport; `join` must match it.
    pub fn bind_identity(&mut self, user_id: UserId) {
        self.verified_user = Some(user_id);
    }

    /// Apply one inbound event; a `sendMessage` that got persisted reports
    /// how it was delivered.
    pub async fn handle_event(&mut self, event: ClientEvent) -> Option<Delivery> {
        if self.state == SessionState::Closed {
            log::debug!("Connection {}: event after close ignored", self.handle.id());
            return None;
        }

        match event {
            ClientEvent::Join { user_id } => self.join(user_id),
            ClientEvent::SendMessage {
                receiver_id,
                message,
            } => match self.joined_user() {
                Some(sender_id) => return self.send_message(sender_id, receiver_id, message).await,
                None => self.reject(message.temp_id, "join required"),
            },
            ClientEvent::Typing {
                receiver_id,
                is_typing,
            } => match self.joined_user() {
                Some(sender_id) => self.typing(sender_id, &receiver_id, is_typing),
                None => log::debug!("Connection {}: typing before join ignored", self.handle.id()),
            },
        }
        None
    }

    fn joined_user(&self) -> Option<UserId> {
        match &self.state {
            SessionState::Joined(user_id) => Some(user_id.clone()),
            _ => None,
        }
    }

    fn join(&mut self, user_id: UserId) {
        if !is_valid_user_id(user_id.as_str()) {
            log::warn!(
                "Connection {}: join with malformed user id `{user_id}` ignored",
                self.handle.id()
            );
            return;
        }
        if let Some(verified) = &self.verified_user {
            if verified != &user_id {
                log::warn!(
                    "Connection {}: join as {user_id} rejected, authenticated as {verified}",
                    self.handle.id()
                );
                return;
            }
        }

        self.gateway.presence.register(user_id.clone(), self.handle.clone());
        log::info!(
            "User {user_id} joined on connection {} ({} online)",
            self.handle.id(),
            self.gateway.presence.online_count()
        );
        self.state = SessionState::Joined(user_id);
    }

    /// Persist, push to the receiver if online, then acknowledge the sender.
    async fn send_message(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        draft: DraftMessage,
    ) -> Option<Delivery> {
        let DraftMessage {
            sender_id: claimed_sender,
            content,
            temp_id,
            ..
        } = draft;

        if claimed_sender.is_some_and(|claimed| claimed != sender_id) {
            self.reject(temp_id, "sender does not match joined user");
            return None;
        }
        if content.trim().is_empty() {
            self.reject(temp_id, "message content is empty");
            return None;
        }

        let mut message = match self
            .gateway
            .store
            .append(&sender_id, &receiver_id, &content, Utc::now())
            .await
        {
            Ok(message) => message,
            Err(err) => {
                log::error!("Failed to persist message from {sender_id} to {receiver_id}: {err}");
                self.reject(temp_id, SEND_FAILED);
                return None;
            }
        };

        message.sender = self.gateway.sender_info(&sender_id).await;

        let message_id = message.id.clone();
        let delivery = match self.gateway.presence.lookup(&receiver_id) {
            Some(receiver) => {
                if receiver.push(ServerEvent::receive(message)) {
                    Delivery::Pushed
                } else {
                    Delivery::Offline
                }
            }
            None => Delivery::Offline,
        };
        log::debug!("Message {message_id} to {receiver_id}: {delivery:?}");

        self.handle.push(ServerEvent::MessageDelivered {
            temp_id,
            message_id,
        });
        Some(delivery)
    }

    fn typing(&self, sender_id: UserId, receiver_id: &UserId, is_typing: bool) {
        if let Some(receiver) = self.gateway.presence.lookup(receiver_id) {
            receiver.push(ServerEvent::Typing {
                sender_id,
                is_typing,
            });
        }
    }

    fn reject(&self, temp_id: TempId, reason: &str) {
        self.handle.push(ServerEvent::MessageError {
            temp_id,
            error: reason.to_string(),
        });
    }

    /// Transport went away; returns the user that went offline, if any.
    pub fn close(&mut self) -> Option<UserId> {
        if self.state == SessionState::Closed {
            return None;
        }
        self.state = SessionState::Closed;

        let offline = self.gateway.presence.unregister(&self.handle);
        match &offline {
            Some(user_id) => log::info!(
                "User {user_id} disconnected ({} online)",
                self.gateway.presence.online_count()
            ),
            None => log::debug!("Connection {} closed", self.handle.id()),
        }
        offline
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

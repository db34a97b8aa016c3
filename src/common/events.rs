use serde::{Deserialize, Serialize};

use super::commands::TempId;
use super::types::{Message, MessageId, UserId};

/// A persisted message as pushed to its receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    #[serde(flatten)]
    pub message: Message,
    pub has_new_message: bool,
}

/// Events the server pushes to a realtime connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    ReceiveMessage(IncomingMessage),
    #[serde(rename_all = "camelCase")]
    MessageDelivered {
        temp_id: TempId,
        message_id: MessageId,
    },
    #[serde(rename_all = "camelCase")]
    MessageError { temp_id: TempId, error: String },
    #[serde(rename_all = "camelCase")]
    Typing { sender_id: UserId, is_typing: bool },
    #[serde(rename_all = "camelCase")]
    UserStatus { user_id: UserId, is_online: bool },
}

impl ServerEvent {
    pub fn receive(message: Message) -> Self {
        ServerEvent::ReceiveMessage(IncomingMessage {
            message,
            has_new_message: true,
        })
    }

    pub fn status(user_id: UserId, is_online: bool) -> Self {
        ServerEvent::UserStatus { user_id, is_online }
    }
}

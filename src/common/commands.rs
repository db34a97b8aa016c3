use serde::{Deserialize, Serialize};

use super::types::UserId;

/// Client-chosen correlation id, echoed back verbatim (string or number).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TempId(pub serde_json::Value);

impl From<&str> for TempId {
    fn from(id: &str) -> Self {
        Self(serde_json::Value::String(id.to_string()))
    }
}

/// Message as drafted by the client before the server persists it.
///
/// `timestamp` is accepted on the wire but the server stamps messages with
/// its own clock, so it is not kept here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftMessage {
    #[serde(default)]
    pub sender_id: Option<UserId>,
    #[serde(default)]
    pub receiver_id: Option<UserId>,
    pub content: String,
    #[serde(rename = "id")]
    pub temp_id: TempId,
}

/// Events a client sends over its realtime connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    Join { user_id: UserId },
    #[serde(rename_all = "camelCase")]
    SendMessage {
        receiver_id: UserId,
        message: DraftMessage,
    },
    #[serde(rename_all = "camelCase")]
    Typing { receiver_id: UserId, is_typing: bool },
}

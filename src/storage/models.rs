use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unread state of one counterpart as seen by the receiving user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadSummary {
    pub last_message: String,
    pub last_message_time: DateTime<Utc>,
    pub unread_count: u32,
}

pub mod commands;
pub mod events;
pub mod types;

pub use commands::{ClientEvent, DraftMessage, TempId};
pub use events::{IncomingMessage, ServerEvent};
pub use types::{ChatUser, Message, MessageId, Role, SenderInfo, UserId, UserProfile};

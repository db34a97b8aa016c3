use thiserror::Error;

use crate::storage::StorageError;

/// Failures surfaced by the chat core to its callers.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The message store is unreachable or rejected the write.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StorageError),
    /// The caller is not authenticated or not a party to the conversation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// A referenced user or message does not resolve.
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

pub type ChatResult<T> = Result<T, ChatError>;

//! Realtime direct messaging for the job platform: presence, a WebSocket
//! event gateway, and the history / unread tracking REST surface.

pub mod common;
pub mod config;
pub mod error;
pub mod network;
pub mod storage;
pub mod sync;

pub use error::{ChatError, ChatResult};

use super::types::{ChatMessage, PresenceSet};
use crate::error::ChatError;

/// Sự kiện từ tầng mạng gửi lên UI.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    HistoryLoaded(Vec<ChatMessage>),
    MessageCreated(ChatMessage),
    PresenceSync(PresenceSet),
    UploadStarted(String),
    UploadFinished,
    Failed(ChatError),
    SessionClosed,
}

/// What a realtime transport delivers to its subscriber.
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    MessageCreated(ChatMessage),
    /// Full snapshot of who is online; replaces any earlier one.
    PresenceSync(PresenceSet),
}

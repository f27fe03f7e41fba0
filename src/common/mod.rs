pub mod commands;
pub mod events;
pub mod identity;
pub mod types;

pub use commands::ChatCommand;
pub use events::{ChatEvent, RealtimeEvent};
pub use identity::{Identity, normalize};
pub use types::{ChatMessage, ContentKind, MessageContent, MessageId, MessageRow, NewMessageRow, PresenceSet};

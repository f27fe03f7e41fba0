use std::path::PathBuf;

use super::types::NewMessageRow;

/// Lệnh UI gửi xuống tầng mạng.
#[derive(Debug, Clone)]
pub enum ChatCommand {
    /// Persist a validated text message.
    Send(NewMessageRow),
    /// Upload a local file and post it as an attachment message.
    Upload(PathBuf),
    /// Fetch the history again, after a failed load.
    Reload,
    /// Untrack presence, leave the channels and end the session.
    Logout,
}

use thiserror::Error;

/// Errors surfaced to the user. Payloads are strings so the error can be
/// cloned into UI events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("Invalid user. Please enter \"Leo\" or \"Janice\".")]
    InvalidIdentity(String),

    #[error("message is empty")]
    EmptyMessage,

    #[error("failed to load messages: {0}")]
    FetchFailed(String),

    #[error("failed to send message: {0}")]
    SendFailed(String),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("realtime transport error: {0}")]
    Transport(String),

    #[error("malformed message row: {0}")]
    MalformedRow(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type ChatResult<T> = Result<T, ChatError>;

use crate::chat::{ChatState, Session};
use crate::common::{ChatEvent, Identity};
use crate::error::ChatError;

/// Trạng thái cục bộ của UI.
pub struct AppState {
    pub login_input: String,
    pub login_error: Option<String>,
    pub chat: Option<ChatState>,
    pub input_text: String,
    pub attach_path: String,
    /// File name of the upload in flight; the input bar is disabled meanwhile.
    pub uploading: Option<String>,
    pub notice: Option<String>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            login_input: String::new(),
            login_error: None,
            chat: None,
            input_text: String::new(),
            attach_path: String::new(),
            uploading: None,
            notice: None,
        }
    }

    pub fn begin_session(&mut self, me: Identity) {
        self.chat = Some(ChatState::new(Session::new(me)));
        self.login_input.clear();
        self.login_error = None;
        self.notice = None;
    }

    pub fn end_session(&mut self) {
        self.chat = None;
        self.input_text.clear();
        self.attach_path.clear();
        self.uploading = None;
    }

    /// Applies one client event. Returns `false` once the session has ended.
    pub fn apply(&mut self, event: ChatEvent) -> bool {
        match event {
            ChatEvent::HistoryLoaded(history) => {
                if let Some(chat) = self.chat.as_mut() {
                    chat.load_initial(history);
                }
            }
            ChatEvent::MessageCreated(message) => {
                if let Some(chat) = self.chat.as_mut() {
                    chat.on_message_created(message);
                }
            }
            ChatEvent::PresenceSync(online) => {
                if let Some(chat) = self.chat.as_mut() {
                    chat.on_presence_sync(&online);
                }
            }
            ChatEvent::UploadStarted(name) => self.uploading = Some(name),
            ChatEvent::UploadFinished => self.uploading = None,
            ChatEvent::Failed(err) => {
                if let (ChatError::FetchFailed(_), Some(chat)) = (&err, self.chat.as_mut()) {
                    chat.on_history_failed();
                }
                self.notice = Some(err.to_string());
            }
            ChatEvent::SessionClosed => {
                self.end_session();
                return false;
            }
        }
        true
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::common::{ChatMessage, MessageContent, MessageId, PresenceSet};

    fn message(id: &str, author: Identity) -> ChatMessage {
        ChatMessage {
            id: MessageId::new(id),
            author,
            content: MessageContent::Text("hey".into()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn events_flow_into_the_reconciler() {
        let mut state = AppState::new();
        state.begin_session(Identity::Leo);

        assert!(state.apply(ChatEvent::HistoryLoaded(vec![message("1", Identity::Janice)])));
        assert!(state.apply(ChatEvent::MessageCreated(message("2", Identity::Leo))));
        assert!(state.apply(ChatEvent::MessageCreated(message("2", Identity::Leo))));
        assert!(state.apply(ChatEvent::PresenceSync(PresenceSet::from_iter([Identity::Janice]))));

        let chat = state.chat.as_ref().unwrap();
        assert!(chat.is_ready());
        assert_eq!(chat.messages().len(), 2);
        assert!(chat.counterpart_online());
    }

    #[test]
    fn upload_flag_and_notice_follow_events() {
        let mut state = AppState::new();
        state.begin_session(Identity::Janice);

        state.apply(ChatEvent::UploadStarted("cat.png".into()));
        assert_eq!(state.uploading.as_deref(), Some("cat.png"));
        state.apply(ChatEvent::Failed(ChatError::UploadFailed("quota".into())));
        state.apply(ChatEvent::UploadFinished);
        assert!(state.uploading.is_none());
        assert!(state.notice.as_deref().unwrap_or_default().contains("quota"));
    }

    #[test]
    fn failed_history_does_not_hide_live_messages() {
        let mut state = AppState::new();
        state.begin_session(Identity::Leo);

        assert!(state.apply(ChatEvent::Failed(ChatError::FetchFailed("503".into()))));
        assert!(state.apply(ChatEvent::MessageCreated(message("9", Identity::Janice))));

        let chat = state.chat.as_ref().unwrap();
        assert!(chat.is_ready());
        assert!(chat.history_failed());
        assert_eq!(chat.messages().len(), 1);
        assert!(state.notice.as_deref().unwrap_or_default().contains("503"));
    }

    #[test]
    fn other_failures_leave_history_alone() {
        let mut state = AppState::new();
        state.begin_session(Identity::Leo);

        state.apply(ChatEvent::Failed(ChatError::SendFailed("offline".into())));
        let chat = state.chat.as_ref().unwrap();
        assert!(!chat.is_ready());
        assert!(!chat.history_failed());
    }

    #[test]
    fn session_closed_returns_to_login() {
        let mut state = AppState::new();
        state.begin_session(Identity::Leo);
        state.input_text = "draft".into();

        assert!(!state.apply(ChatEvent::SessionClosed));
        assert!(state.chat.is_none());
        assert!(state.input_text.is_empty());
    }
}

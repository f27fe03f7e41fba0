use std::collections::HashSet;

use crate::common::{ChatMessage, MessageId, NewMessageRow, PresenceSet};
use crate::error::{ChatError, ChatResult};

use super::session::Session;

/// Client-side view of the conversation: the ordered message list and
/// whether the counterpart is online.
///
/// Messages are keyed by id, so the confirmed append after a send and the
/// realtime echo of the same row collapse into one entry whichever arrives
/// first. The list stays sorted by `created_at`; equal timestamps keep
/// arrival order.
#[derive(Debug)]
pub struct ChatState {
    session: Session,
    messages: Vec<ChatMessage>,
    seen: HashSet<MessageId>,
    counterpart_online: bool,
    ready: bool,
    history_failed: bool,
}

impl ChatState {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            messages: Vec::new(),
            seen: HashSet::new(),
            counterpart_online: false,
            ready: false,
            history_failed: false,
        }
    }

    pub fn session(&self) -> Session {
        self.session
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn counterpart_online(&self) -> bool {
        self.counterpart_online
    }

    /// True once the history fetch has finished, successfully or not.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// The last history fetch failed; live messages are still shown.
    pub fn history_failed(&self) -> bool {
        self.history_failed
    }

    pub fn on_history_failed(&mut self) {
        self.ready = true;
        self.history_failed = true;
        log::warn!("History unavailable; showing live messages only");
    }

    /// Applies the one-shot history fetch.
    pub fn load_initial(&mut self, history: Vec<ChatMessage>) {
        let fetched = history.len();
        for message in history {
            self.on_message_created(message);
        }
        self.ready = true;
        self.history_failed = false;
        log::info!(
            "History loaded: {fetched} fetched, {} visible",
            self.messages.len()
        );
    }

    /// Returns `false` when the id is already present.
    pub fn on_message_created(&mut self, message: ChatMessage) -> bool {
        if !self.seen.insert(message.id.clone()) {
            log::debug!("Ignoring duplicate message {}", message.id);
            return false;
        }

        let position = self
            .messages
            .partition_point(|existing| existing.created_at <= message.created_at);
        if position < self.messages.len() {
            log::debug!(
                "Message {} arrived out of order; inserting at {position}",
                message.id
            );
        }
        self.messages.insert(position, message);
        true
    }

    /// Replaces presence knowledge with the snapshot. Returns whether the
    /// counterpart flag changed.
    pub fn on_presence_sync(&mut self, online: &PresenceSet) -> bool {
        let counterpart_online = online.contains(self.session.counterpart());
        let changed = counterpart_online != self.counterpart_online;
        self.counterpart_online = counterpart_online;
        changed
    }

    /// Validates a draft and builds the insert for it. The text is kept
    /// as typed; only the emptiness check trims.
    pub fn send_text(&self, content: &str) -> ChatResult<NewMessageRow> {
        if content.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        Ok(NewMessageRow::text(self.session.me(), content))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::*;
    use crate::common::{ContentKind, Identity, MessageContent};

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(seconds)
    }

    fn text(id: &str, author: Identity, seconds: i64, body: &str) -> ChatMessage {
        ChatMessage {
            id: MessageId::new(id),
            author,
            content: MessageContent::Text(body.to_string()),
            created_at: at(seconds),
        }
    }

    fn ids(state: &ChatState) -> Vec<&str> {
        state.messages().iter().map(|m| m.id.as_str()).collect()
    }

    fn is_sorted(state: &ChatState) -> bool {
        state
            .messages()
            .windows(2)
            .all(|pair| pair[0].created_at <= pair[1].created_at)
    }

    #[test]
    fn history_then_events_stay_sorted() {
        let mut state = ChatState::new(Session::new(Identity::Leo));
        state.load_initial(vec![
            text("1", Identity::Leo, 0, "a"),
            text("2", Identity::Janice, 10, "b"),
        ]);
        assert!(state.is_ready());

        state.on_message_created(text("4", Identity::Janice, 30, "d"));
        state.on_message_created(text("3", Identity::Leo, 20, "c"));
        state.on_message_created(text("0", Identity::Leo, -5, "z"));

        assert_eq!(ids(&state), vec!["0", "1", "2", "3", "4"]);
        assert!(is_sorted(&state));
    }

    #[test]
    fn equal_timestamps_keep_arrival_order() {
        let mut state = ChatState::new(Session::new(Identity::Leo));
        state.on_message_created(text("b", Identity::Leo, 5, "first"));
        state.on_message_created(text("a", Identity::Janice, 5, "second"));
        state.on_message_created(text("c", Identity::Leo, 5, "third"));

        assert_eq!(ids(&state), vec!["b", "a", "c"]);
    }

    #[test]
    fn duplicate_ids_are_applied_once() {
        let mut state = ChatState::new(Session::new(Identity::Leo));
        let message = text("7", Identity::Leo, 1, "hi");

        assert!(state.on_message_created(message.clone()));
        assert!(!state.on_message_created(message.clone()));
        state.load_initial(vec![message]);

        assert_eq!(state.messages().len(), 1);
    }

    #[test]
    fn unsorted_history_is_sorted_on_load() {
        let mut state = ChatState::new(Session::new(Identity::Janice));
        state.load_initial(vec![
            text("3", Identity::Leo, 3, "c"),
            text("1", Identity::Leo, 1, "a"),
            text("2", Identity::Janice, 2, "b"),
        ]);
        assert_eq!(ids(&state), vec!["1", "2", "3"]);
    }

    #[test]
    fn failed_history_still_shows_live_messages_until_reload() {
        let mut state = ChatState::new(Session::new(Identity::Leo));
        state.on_history_failed();
        state.on_message_created(text("9", Identity::Janice, 9, "live"));

        assert!(state.is_ready());
        assert!(state.history_failed());
        assert_eq!(ids(&state), vec!["9"]);

        state.load_initial(vec![
            text("1", Identity::Leo, 1, "old"),
            text("9", Identity::Janice, 9, "live"),
        ]);
        assert!(!state.history_failed());
        assert_eq!(ids(&state), vec!["1", "9"]);
    }

    #[test]
    fn presence_follows_the_counterpart_only() {
        let mut state = ChatState::new(Session::new(Identity::Leo));

        assert!(state.on_presence_sync(&PresenceSet::from_iter([Identity::Janice])));
        assert!(state.counterpart_online());

        assert!(!state.on_presence_sync(&PresenceSet::from_iter([Identity::Janice])));
        assert!(state.counterpart_online());

        assert!(state.on_presence_sync(&PresenceSet::new()));
        assert!(!state.counterpart_online());

        assert!(!state.on_presence_sync(&PresenceSet::from_iter([Identity::Leo])));
        assert!(!state.counterpart_online());
    }

    #[test]
    fn send_text_rejects_blank_drafts() {
        let state = ChatState::new(Session::new(Identity::Leo));
        assert_eq!(state.send_text("   \n\t"), Err(ChatError::EmptyMessage));
        assert_eq!(state.send_text(""), Err(ChatError::EmptyMessage));

        let row = state.send_text("  hi ").unwrap();
        assert_eq!(row.user_name, Identity::Leo);
        assert_eq!(row.kind, ContentKind::Text);
        assert_eq!(row.content, "  hi ");
    }
}

use tokio::sync::mpsc;

use crate::common::{ChatMessage, Identity, RealtimeEvent};
use crate::error::ChatResult;
use crate::network::RealtimeTransport;

/// The logged-in identity and the one it chats with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    me: Identity,
    counterpart: Identity,
}

impl Session {
    pub fn new(me: Identity) -> Self {
        Self {
            me,
            counterpart: me.counterpart(),
        }
    }

    pub fn me(&self) -> Identity {
        self.me
    }

    pub fn counterpart(&self) -> Identity {
        self.counterpart
    }

    pub fn is_own(&self, message: &ChatMessage) -> bool {
        message.author == self.me
    }
}

/// Realtime membership for one login cycle.
///
/// `open` subscribes and tracks; `close` consumes the value, untracks and
/// then leaves, so teardown can only happen once.
pub struct LiveSession {
    session: Session,
    transport: Box<dyn RealtimeTransport>,
    closed: bool,
}

impl LiveSession {
    pub async fn open(
        session: Session,
        mut transport: Box<dyn RealtimeTransport>,
    ) -> ChatResult<(Self, mpsc::Receiver<RealtimeEvent>)> {
        let events = transport.subscribe(session.me()).await?;

        if let Err(err) = transport.announce_online().await {
            if let Err(leave_err) = transport.leave().await {
                log::warn!("Failed to leave channels after track error: {leave_err}");
            }
            return Err(err);
        }

        log::info!("{} joined the presence channel", session.me());
        Ok((
            Self {
                session,
                transport,
                closed: false,
            },
            events,
        ))
    }

    pub fn session(&self) -> Session {
        self.session
    }

    pub async fn close(mut self) -> ChatResult<()> {
        self.closed = true;

        let untracked = self.transport.announce_offline().await;
        if let Err(err) = &untracked {
            log::warn!("Failed to untrack {}: {err}", self.session.me());
        }

        let left = self.transport.leave().await;
        if let Err(err) = &left {
            log::warn!("Failed to leave realtime channels: {err}");
        }

        log::info!("{} left the presence channel", self.session.me());
        untracked.and(left)
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if !self.closed {
            log::warn!(
                "Live session for {} dropped without close; presence may stay stale",
                self.session.me()
            );
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::error::ChatError;

    /// Transport double that records the order of lifecycle calls.
    pub(crate) struct RecordingTransport {
        pub calls: Arc<Mutex<Vec<&'static str>>>,
        pub fail_track: bool,
        pub sender: Option<mpsc::Sender<RealtimeEvent>>,
    }

    impl RecordingTransport {
        pub(crate) fn new(calls: Arc<Mutex<Vec<&'static str>>>) -> Self {
            Self {
                calls,
                fail_track: false,
                sender: None,
            }
        }

        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl RealtimeTransport for RecordingTransport {
        async fn subscribe(&mut self, _me: Identity) -> ChatResult<mpsc::Receiver<RealtimeEvent>> {
            self.record("subscribe");
            let (tx, rx) = mpsc::channel(8);
            self.sender = Some(tx);
            Ok(rx)
        }

        async fn announce_online(&mut self) -> ChatResult<()> {
            self.record("track");
            if self.fail_track {
                return Err(ChatError::Transport("track rejected".into()));
            }
            Ok(())
        }

        async fn announce_offline(&mut self) -> ChatResult<()> {
            self.record("untrack");
            Ok(())
        }

        async fn leave(&mut self) -> ChatResult<()> {
            self.record("leave");
            self.sender = None;
            Ok(())
        }
    }

    #[test]
    fn counterpart_is_derived_from_me() {
        let session = Session::new(Identity::Janice);
        assert_eq!(session.counterpart(), Identity::Leo);
    }

    #[tokio::test]
    async fn close_untracks_before_leaving() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let transport = RecordingTransport::new(calls.clone());

        let (live, _events) = LiveSession::open(Session::new(Identity::Leo), Box::new(transport))
            .await
            .unwrap();
        live.close().await.unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["subscribe", "track", "untrack", "leave"]
        );
    }

    #[tokio::test]
    async fn failed_track_leaves_the_channel() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut transport = RecordingTransport::new(calls.clone());
        transport.fail_track = true;

        let result = LiveSession::open(Session::new(Identity::Leo), Box::new(transport)).await;

        assert!(matches!(result, Err(ChatError::Transport(_))));
        assert_eq!(*calls.lock().unwrap(), vec!["subscribe", "track", "leave"]);
    }
}

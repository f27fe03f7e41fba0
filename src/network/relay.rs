use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::transport::RealtimeTransport;
use crate::common::{ChatMessage, Identity, PresenceSet, RealtimeEvent};
use crate::error::{ChatError, ChatResult};

const FEED_CAPACITY: usize = 256;
const SUBSCRIBER_CAPACITY: usize = 100;

/// In-process realtime service: fans inserts and presence snapshots out to
/// every session subscribed in this process.
#[derive(Clone)]
pub struct LocalRelay {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    feed: broadcast::Sender<RealtimeEvent>,
    /// identity -> number of live tracks under that key
    online: Mutex<BTreeMap<Identity, usize>>,
}

impl LocalRelay {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            inner: Arc::new(RelayInner {
                feed,
                online: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Changefeed entry for a freshly inserted row.
    pub fn publish_insert(&self, message: ChatMessage) {
        // No subscribers is not an error.
        let _ = self.inner.feed.send(RealtimeEvent::MessageCreated(message));
    }

    pub fn online(&self) -> PresenceSet {
        snapshot(&self.lock_online())
    }

    pub fn transport(&self) -> LocalTransport {
        LocalTransport {
            relay: self.clone(),
            me: None,
            tracked: false,
            forwarder: None,
        }
    }

    pub fn boxed_transport(&self) -> Box<dyn RealtimeTransport> {
        Box::new(self.transport())
    }

    fn lock_online(&self) -> MutexGuard<'_, BTreeMap<Identity, usize>> {
        self.inner.online.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn track(&self, me: Identity) {
        let mut online = self.lock_online();
        *online.entry(me).or_insert(0) += 1;
        // Sent under the lock so snapshots go out in the order they were taken.
        let _ = self.inner.feed.send(RealtimeEvent::PresenceSync(snapshot(&online)));
    }

    fn untrack(&self, me: Identity) {
        let mut online = self.lock_online();
        if let Some(count) = online.get_mut(&me) {
            *count -= 1;
            if *count == 0 {
                online.remove(&me);
            }
        }
        let _ = self.inner.feed.send(RealtimeEvent::PresenceSync(snapshot(&online)));
    }
}

impl Default for LocalRelay {
    fn default() -> Self {
        Self::new()
    }
}

fn snapshot(online: &BTreeMap<Identity, usize>) -> PresenceSet {
    online.keys().copied().collect()
}

/// One session's handle on a [`LocalRelay`].
pub struct LocalTransport {
    relay: LocalRelay,
    me: Option<Identity>,
    tracked: bool,
    forwarder: Option<JoinHandle<()>>,
}

#[async_trait]
impl RealtimeTransport for LocalTransport {
    async fn subscribe(&mut self, me: Identity) -> ChatResult<mpsc::Receiver<RealtimeEvent>> {
        if self.forwarder.is_some() {
            return Err(ChatError::Transport("already subscribed".into()));
        }

        let mut feed = self.relay.inner.feed.subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);

        // Like a presence `sync` on join: the newcomer gets the current state.
        tx.send(RealtimeEvent::PresenceSync(self.relay.online()))
            .await
            .map_err(|err| ChatError::Transport(err.to_string()))?;

        self.forwarder = Some(tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("Local relay subscriber lagged; {skipped} events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
        self.me = Some(me);
        log::debug!("{me} subscribed to the local relay");
        Ok(rx)
    }

    async fn announce_online(&mut self) -> ChatResult<()> {
        let me = self
            .me
            .ok_or_else(|| ChatError::Transport("track before subscribe".into()))?;
        if !self.tracked {
            self.relay.track(me);
            self.tracked = true;
        }
        Ok(())
    }

    async fn announce_offline(&mut self) -> ChatResult<()> {
        if let (Some(me), true) = (self.me, self.tracked) {
            self.relay.untrack(me);
            self.tracked = false;
        }
        Ok(())
    }

    async fn leave(&mut self) -> ChatResult<()> {
        if self.tracked {
            log::warn!("Leaving the local relay while still tracked; dropping presence");
            self.announce_offline().await?;
        }
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        self.me = None;
        Ok(())
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn next_presence(rx: &mut mpsc::Receiver<RealtimeEvent>) -> PresenceSet {
        loop {
            match rx.recv().await {
                Some(RealtimeEvent::PresenceSync(set)) => return set,
                Some(_) => continue,
                None => panic!("relay closed"),
            }
        }
    }

    #[tokio::test]
    async fn track_and_untrack_reach_other_subscribers() {
        let relay = LocalRelay::new();
        let mut janice = relay.transport();
        let mut janice_rx = janice.subscribe(Identity::Janice).await.unwrap();
        assert!(next_presence(&mut janice_rx).await.is_empty());

        let mut leo = relay.transport();
        let _leo_rx = leo.subscribe(Identity::Leo).await.unwrap();
        leo.announce_online().await.unwrap();
        assert!(next_presence(&mut janice_rx).await.contains(Identity::Leo));

        leo.announce_offline().await.unwrap();
        leo.leave().await.unwrap();
        assert!(!next_presence(&mut janice_rx).await.contains(Identity::Leo));
        assert!(relay.online().is_empty());
    }

    #[tokio::test]
    async fn second_connection_keeps_identity_online() {
        let relay = LocalRelay::new();
        let mut first = relay.transport();
        let mut second = relay.transport();
        let _a = first.subscribe(Identity::Leo).await.unwrap();
        let _b = second.subscribe(Identity::Leo).await.unwrap();
        first.announce_online().await.unwrap();
        second.announce_online().await.unwrap();

        first.announce_offline().await.unwrap();
        assert!(relay.online().contains(Identity::Leo));

        second.announce_offline().await.unwrap();
        assert!(!relay.online().contains(Identity::Leo));
    }

    #[tokio::test]
    async fn track_requires_subscription() {
        let relay = LocalRelay::new();
        let mut transport = relay.transport();
        assert!(matches!(
            transport.announce_online().await,
            Err(ChatError::Transport(_))
        ));
    }
}

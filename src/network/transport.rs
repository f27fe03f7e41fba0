use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::common::{Identity, RealtimeEvent};
use crate::error::ChatResult;

/// Realtime capability: a message changefeed plus a presence channel.
///
/// One value serves one login cycle. Callers subscribe first, announce
/// themselves online once subscribed, and must announce offline before
/// leaving so the other side does not keep a stale "online" entry.
#[async_trait]
pub trait RealtimeTransport: Send {
    /// Joins the changefeed and the presence channel under `me`'s key.
    /// Events arrive on the returned receiver until [`leave`](Self::leave).
    async fn subscribe(&mut self, me: Identity) -> ChatResult<mpsc::Receiver<RealtimeEvent>>;

    /// Track: publish `me` as online.
    async fn announce_online(&mut self) -> ChatResult<()>;

    /// Untrack: retract `me` from the presence set.
    async fn announce_offline(&mut self) -> ChatResult<()>;

    async fn leave(&mut self) -> ChatResult<()>;
}

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::{Sink, SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use super::phoenix::{self, Frame};
use super::presence::PresenceTracker;
use crate::common::{ChatMessage, Identity, MessageRow, RealtimeEvent};
use crate::config::SupabaseConfig;
use crate::error::{ChatError, ChatResult};
use crate::network::RealtimeTransport;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ReplySender = oneshot::Sender<Result<Value, String>>;

const EVENT_BUFFER: usize = 100;
const OUTBOUND_BUFFER: usize = 32;

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub socket_url: Url,
    pub anon_key: String,
    pub messages_table: String,
    pub presence_channel: String,
    pub heartbeat: Duration,
    pub reply_timeout: Duration,
}

impl RealtimeConfig {
    pub fn new(base: &Url, config: &SupabaseConfig) -> ChatResult<Self> {
        let mut socket_url = base
            .join("realtime/v1/websocket")
            .map_err(|err| ChatError::Config(format!("invalid realtime url: {err}")))?;
        let scheme = match socket_url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => {
                return Err(ChatError::Config(format!(
                    "unsupported scheme `{other}` in SUPABASE_URL"
                )));
            }
        };
        socket_url
            .set_scheme(scheme)
            .map_err(|_| ChatError::Config("cannot derive websocket url".into()))?;
        socket_url
            .query_pairs_mut()
            .append_pair("apikey", &config.anon_key)
            .append_pair("vsn", "1.0.0");

        Ok(Self {
            socket_url,
            anon_key: config.anon_key.clone(),
            messages_table: config.messages_table.clone(),
            presence_channel: config.presence_channel.clone(),
            heartbeat: Duration::from_secs(config.heartbeat_secs.max(1)),
            reply_timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
        })
    }

    fn messages_topic(&self) -> String {
        phoenix::realtime_topic(&format!("public:{}", self.messages_table))
    }

    fn presence_topic(&self) -> String {
        phoenix::realtime_topic(&self.presence_channel)
    }
}

struct Outbound {
    frame: Frame,
    reply: Option<ReplySender>,
}

struct Socket {
    outbound: mpsc::Sender<Outbound>,
    task: JoinHandle<()>,
}

/// Supabase Realtime over one websocket: the INSERT changefeed of the
/// messages table plus the presence channel.
pub struct SupabaseRealtime {
    config: RealtimeConfig,
    socket: Option<Socket>,
    next_ref: u64,
}

impl SupabaseRealtime {
    pub fn new(config: RealtimeConfig) -> Self {
        Self {
            config,
            socket: None,
            next_ref: 0,
        }
    }

    pub fn boxed(config: RealtimeConfig) -> Box<dyn RealtimeTransport> {
        Box::new(Self::new(config))
    }

    /// Sends a frame and waits for its `phx_reply`.
    async fn push(&mut self, topic: String, event: &str, payload: Value) -> ChatResult<Value> {
        self.next_ref += 1;
        let frame = Frame::new(topic.clone(), event, payload, self.next_ref.to_string());

        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| ChatError::Transport("not connected".into()))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        socket
            .outbound
            .send(Outbound {
                frame,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| ChatError::Transport("socket closed".into()))?;

        match timeout(self.config.reply_timeout, reply_rx).await {
            Ok(Ok(Ok(response))) => Ok(response),
            Ok(Ok(Err(reason))) => Err(ChatError::Transport(format!(
                "{event} on {topic} refused: {reason}"
            ))),
            Ok(Err(_)) => Err(ChatError::Transport(format!(
                "socket closed before {event} on {topic} was acknowledged"
            ))),
            Err(_) => Err(ChatError::Transport(format!(
                "no reply to {event} on {topic} within {:?}",
                self.config.reply_timeout
            ))),
        }
    }
}

#[async_trait]
impl RealtimeTransport for SupabaseRealtime {
    async fn subscribe(&mut self, me: Identity) -> ChatResult<mpsc::Receiver<RealtimeEvent>> {
        if self.socket.is_some() {
            return Err(ChatError::Transport("already subscribed".into()));
        }

        let (ws, _) = tokio_tungstenite::connect_async(self.config.socket_url.as_str())
            .await
            .map_err(|err| ChatError::Transport(format!("websocket connect failed: {err}")))?;
        log::info!("Connected to realtime at {}", self.config.socket_url.host_str().unwrap_or("?"));

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let router = Router::new(
            self.config.messages_topic(),
            self.config.presence_topic(),
            events_tx,
        );
        let task = tokio::spawn(run_socket(ws, outbound_rx, router, self.config.heartbeat));
        self.socket = Some(Socket {
            outbound: outbound_tx,
            task,
        });

        let key = self.config.anon_key.clone();
        let changes = phoenix::changes_join_payload(&self.config.messages_table, &key);
        self.push(self.config.messages_topic(), phoenix::EVENT_JOIN, changes)
            .await?;

        let presence = phoenix::presence_join_payload(me.as_str(), &key);
        self.push(self.config.presence_topic(), phoenix::EVENT_JOIN, presence)
            .await?;

        log::info!("{me} subscribed to messages and presence");
        Ok(events_rx)
    }

    async fn announce_online(&mut self) -> ChatResult<()> {
        let payload = phoenix::track_payload(&Utc::now().to_rfc3339());
        self.push(self.config.presence_topic(), phoenix::EVENT_PRESENCE, payload)
            .await
            .map(|_| ())
    }

    async fn announce_offline(&mut self) -> ChatResult<()> {
        self.push(
            self.config.presence_topic(),
            phoenix::EVENT_PRESENCE,
            phoenix::untrack_payload(),
        )
        .await
        .map(|_| ())
    }

    async fn leave(&mut self) -> ChatResult<()> {
        if self.socket.is_none() {
            return Ok(());
        }

        let mut result = Ok(());
        for topic in [self.config.messages_topic(), self.config.presence_topic()] {
            if let Err(err) = self.push(topic, phoenix::EVENT_LEAVE, json!({})).await {
                log::warn!("Leave failed: {err}");
                result = Err(err);
            }
        }

        if let Some(Socket { outbound, task }) = self.socket.take() {
            // Closing the outbound side makes the socket task send Close and exit.
            drop(outbound);
            if timeout(self.config.reply_timeout, task).await.is_err() {
                log::warn!("Realtime socket did not shut down in time");
            }
        }
        result
    }
}

impl Drop for SupabaseRealtime {
    fn drop(&mut self) {
        if let Some(socket) = self.socket.take() {
            socket.task.abort();
        }
    }
}

/// Dispatches incoming frames: replies to their waiting pushes, inserts and
/// presence snapshots to the subscriber.
struct Router {
    messages_topic: String,
    presence_topic: String,
    pending: HashMap<String, ReplySender>,
    presence: PresenceTracker,
    events: mpsc::Sender<RealtimeEvent>,
}

impl Router {
    fn new(
        messages_topic: String,
        presence_topic: String,
        events: mpsc::Sender<RealtimeEvent>,
    ) -> Self {
        Self {
            messages_topic,
            presence_topic,
            pending: HashMap::new(),
            presence: PresenceTracker::new(),
            events,
        }
    }

    fn expect_reply(&mut self, reference: String, reply: ReplySender) {
        // Pushes that gave up waiting leave a closed sender behind.
        self.pending.retain(|_, waiter| !waiter.is_closed());
        self.pending.insert(reference, reply);
    }

    fn route(&mut self, text: &str) {
        let frame = match Frame::decode(text) {
            Ok(frame) => frame,
            Err(err) => {
                log::debug!("Ignoring undecodable realtime frame ({err}): {text}");
                return;
            }
        };

        match frame.event.as_str() {
            phoenix::EVENT_REPLY => {
                let waiter = frame
                    .reference
                    .as_ref()
                    .and_then(|reference| self.pending.remove(reference));
                if let Some(waiter) = waiter {
                    let _ = waiter.send(phoenix::parse_reply(&frame.payload));
                }
            }
            phoenix::EVENT_POSTGRES_CHANGES if frame.topic == self.messages_topic => {
                self.forward_insert(&frame.payload);
            }
            phoenix::EVENT_PRESENCE_STATE if frame.topic == self.presence_topic => {
                match self.presence.replace_state(&frame.payload) {
                    Ok(()) => self.deliver(RealtimeEvent::PresenceSync(self.presence.online())),
                    Err(err) => log::warn!("Malformed presence_state: {err}"),
                }
            }
            phoenix::EVENT_PRESENCE_DIFF if frame.topic == self.presence_topic => {
                match self.presence.apply_diff(&frame.payload) {
                    Ok(()) => self.deliver(RealtimeEvent::PresenceSync(self.presence.online())),
                    Err(err) => log::warn!("Malformed presence_diff: {err}"),
                }
            }
            phoenix::EVENT_ERROR | phoenix::EVENT_CLOSE => {
                log::warn!("Channel {} reported {}", frame.topic, frame.event);
            }
            other => {
                log::debug!("Unhandled realtime event `{other}` on {}", frame.topic);
            }
        }
    }

    fn forward_insert(&self, payload: &Value) {
        let Some(record) = phoenix::inserted_record(payload) else {
            return;
        };

        let message = serde_json::from_value::<MessageRow>(record.clone())
            .map_err(|err| ChatError::MalformedRow(err.to_string()))
            .and_then(ChatMessage::try_from);
        match message {
            Ok(message) => self.deliver(RealtimeEvent::MessageCreated(message)),
            Err(err) => log::warn!("Dropping realtime insert: {err}"),
        }
    }

    /// Never waits on the subscriber: the socket task must keep replying and
    /// heartbeating even when nobody reads events.
    fn deliver(&self, event: RealtimeEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                log::warn!("Realtime subscriber is behind; dropping {event:?}");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::debug!("Realtime subscriber is gone");
            }
        }
    }

    fn fail_pending(&mut self, reason: &str) {
        for (_, waiter) in self.pending.drain() {
            let _ = waiter.send(Err(reason.to_string()));
        }
    }
}

async fn send_frame<S>(sink: &mut S, frame: &Frame) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let text = frame.encode().map_err(|err| err.to_string())?;
    log::debug!("realtime <- {text}");
    sink.send(Message::Text(text.into()))
        .await
        .map_err(|err| err.to_string())
}

async fn run_socket(
    ws: WsStream,
    mut outbound: mpsc::Receiver<Outbound>,
    mut router: Router,
    heartbeat_every: Duration,
) {
    let (mut sink, mut stream) = ws.split();
    let mut heartbeat = tokio::time::interval(heartbeat_every);
    heartbeat.tick().await;
    let mut heartbeat_ref: u64 = 0;

    loop {
        tokio::select! {
            command = outbound.recv() => {
                let Some(Outbound { frame, reply }) = command else {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                if let (Some(reply), Some(reference)) = (reply, frame.reference.clone()) {
                    router.expect_reply(reference, reply);
                }
                if let Err(err) = send_frame(&mut sink, &frame).await {
                    log::warn!("Realtime send failed: {err}");
                    break;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => router.route(text.as_str()),
                Some(Ok(Message::Close(reason))) => {
                    log::info!("Realtime socket closed by server: {reason:?}");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    log::warn!("Realtime socket error: {err}");
                    break;
                }
                None => break,
            },
            _ = heartbeat.tick() => {
                heartbeat_ref += 1;
                let frame = Frame::heartbeat(format!("hb-{heartbeat_ref}"));
                if let Err(err) = send_frame(&mut sink, &frame).await {
                    log::warn!("Realtime heartbeat failed: {err}");
                    break;
                }
            }
        }
    }

    router.fail_pending("socket closed");
    log::debug!("Realtime socket task finished");
}

use tokio::sync::mpsc;

use crate::chat::{Attachment, LiveSession, Session, attachment};
use crate::common::{ChatCommand, ChatEvent, ChatMessage, NewMessageRow, RealtimeEvent};
use crate::error::{ChatError, ChatResult};

use super::backend::Backend;

/// Background loop for one login: owns the live session, runs UI commands
/// against the backend and forwards realtime traffic to the UI.
pub struct ChatClient {
    session: Session,
    backend: Backend,
    event_sender: mpsc::Sender<ChatEvent>,
    command_receiver: mpsc::Receiver<ChatCommand>,
}

impl ChatClient {
    pub fn new(
        session: Session,
        backend: Backend,
        event_sender: mpsc::Sender<ChatEvent>,
        command_receiver: mpsc::Receiver<ChatCommand>,
    ) -> Self {
        Self {
            session,
            backend,
            event_sender,
            command_receiver,
        }
    }

    pub async fn run(mut self) {
        let me = self.session.me();
        let (live, mut realtime) = match LiveSession::open(self.session, self.backend.realtime()).await {
            Ok(opened) => opened,
            Err(err) => {
                log::error!("Could not open live session for {me}: {err}");
                self.emit(ChatEvent::Failed(err)).await;
                self.emit(ChatEvent::SessionClosed).await;
                return;
            }
        };

        self.reload_history().await;

        log::info!("Chat loop started for {me}");
        let mut realtime_open = true;

        loop {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    match command {
                        Some(ChatCommand::Send(row)) => self.send(row).await,
                        Some(ChatCommand::Upload(path)) => self.upload(&path).await,
                        Some(ChatCommand::Reload) => self.reload_history().await,
                        Some(ChatCommand::Logout) | None => break,
                    }
                }
                event = realtime.recv(), if realtime_open => {
                    match event {
                        Some(RealtimeEvent::MessageCreated(message)) => {
                            self.emit(ChatEvent::MessageCreated(message)).await;
                        }
                        Some(RealtimeEvent::PresenceSync(online)) => {
                            self.emit(ChatEvent::PresenceSync(online)).await;
                        }
                        None => {
                            realtime_open = false;
                            log::warn!("Realtime stream for {me} ended");
                            self.emit(ChatEvent::Failed(ChatError::Transport(
                                "realtime connection lost".into(),
                            )))
                            .await;
                        }
                    }
                }
            }
        }

        // Nobody reads events past this point.
        drop(realtime);
        if let Err(err) = live.close().await {
            log::warn!("Logout for {me} was not clean: {err}");
        }
        self.emit(ChatEvent::SessionClosed).await;
        log::info!("Chat loop for {me} finished");
    }

    async fn reload_history(&self) {
        match self.load_history().await {
            Ok(history) => self.emit(ChatEvent::HistoryLoaded(history)).await,
            Err(err) => {
                let err = match err {
                    ChatError::FetchFailed(_) => err,
                    other => ChatError::FetchFailed(other.to_string()),
                };
                log::warn!("History fetch failed: {err}");
                self.emit(ChatEvent::Failed(err)).await;
            }
        }
    }

    /// Persisted history in store order; rows with an unknown author are skipped.
    async fn load_history(&self) -> ChatResult<Vec<ChatMessage>> {
        let rows = self.backend.messages.read_all().await?;
        let total = rows.len();
        let messages: Vec<ChatMessage> = rows
            .into_iter()
            .filter_map(|row| match ChatMessage::try_from(row) {
                Ok(message) => Some(message),
                Err(err) => {
                    log::warn!("Skipping history row: {err}");
                    None
                }
            })
            .collect();
        log::debug!("Fetched {} of {total} history rows", messages.len());
        Ok(messages)
    }

    async fn send(&mut self, row: NewMessageRow) {
        let result = self
            .backend
            .messages
            .insert(row)
            .await
            .and_then(ChatMessage::try_from);

        match result {
            // Appended on confirmation; the changefeed echo is dropped by id.
            Ok(message) => self.emit(ChatEvent::MessageCreated(message)).await,
            Err(err) => {
                let err = match err {
                    ChatError::SendFailed(_) => err,
                    other => ChatError::SendFailed(other.to_string()),
                };
                log::warn!("Send failed: {err}");
                self.emit(ChatEvent::Failed(err)).await;
            }
        }
    }

    async fn upload(&mut self, path: &std::path::Path) {
        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.emit(ChatEvent::UploadStarted(label)).await;

        let result = match Attachment::read(path).await {
            Ok(file) => attachment::upload(&self.backend, self.session.me(), file).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(message) => self.emit(ChatEvent::MessageCreated(message)).await,
            Err(err) => {
                log::warn!("Upload of {} failed: {err}", path.display());
                self.emit(ChatEvent::Failed(err)).await;
            }
        }
        self.emit(ChatEvent::UploadFinished).await;
    }

    async fn emit(&self, event: ChatEvent) {
        if let Err(err) = self.event_sender.send(event).await {
            log::debug!("UI is gone, dropping event: {err:?}");
        }
    }
}

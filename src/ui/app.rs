use std::path::PathBuf;

use eframe::egui;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::chat::Session;
use crate::common::{ChatCommand, ChatEvent, normalize};
use crate::error::ChatError;
use crate::network::{Backend, ChatClient};

use super::components::input_bar::InputAction;
use super::components::{chat_area, header, input_bar, login};
use super::state::AppState;

const CHANNEL_CAPACITY: usize = 100;

/// Channels to the client loop of the current login.
struct SessionLink {
    command_sender: mpsc::Sender<ChatCommand>,
    event_receiver: mpsc::Receiver<ChatEvent>,
}

pub struct ChatApp {
    state: AppState,
    backend: Backend,
    runtime: Handle,
    /// Every spawned client loop, so `main` can wait for them on exit.
    session_tasks: mpsc::UnboundedSender<JoinHandle<()>>,
    link: Option<SessionLink>,
}

impl ChatApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        backend: Backend,
        runtime: Handle,
        session_tasks: mpsc::UnboundedSender<JoinHandle<()>>,
    ) -> Self {
        // Image messages load their URL (https or file) straight into the list.
        egui_extras::install_image_loaders(&cc.egui_ctx);
        Self {
            state: AppState::new(),
            backend,
            runtime,
            session_tasks,
            link: None,
        }
    }

    fn login(&mut self, input: &str) {
        let me = match normalize(input) {
            Ok(me) => me,
            Err(err) => {
                self.state.login_error = Some(err.to_string());
                return;
            }
        };

        let (command_sender, command_receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let (event_sender, event_receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let client = ChatClient::new(
            Session::new(me),
            self.backend.clone(),
            event_sender,
            command_receiver,
        );
        let task = self.runtime.spawn(client.run());
        if self.session_tasks.send(task).is_err() {
            log::warn!("Session task registry is closed; logout may not finish on exit");
        }

        self.link = Some(SessionLink {
            command_sender,
            event_receiver,
        });
        self.state.begin_session(me);
        log::info!("Logged in as {me}");
    }

    fn logout(&mut self) {
        if let Some(link) = self.link.take() {
            // Dropping the sender ends the loop even if this send is refused.
            if let Err(err) = link.command_sender.try_send(ChatCommand::Logout) {
                log::debug!("Logout command not queued: {err}");
            }
        }
        self.state.end_session();
    }

    fn handle_chat_events(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };

        let mut closed = false;
        while let Ok(event) = link.event_receiver.try_recv() {
            if !self.state.apply(event) {
                closed = true;
                break;
            }
        }

        if closed {
            self.link = None;
            if self.state.notice.is_none() {
                self.state.notice = Some("Session ended".into());
            }
        }
    }

    fn send_command(&mut self, command: ChatCommand) {
        let Some(link) = self.link.as_ref() else {
            return;
        };
        if let Err(err) = link.command_sender.try_send(command) {
            log::warn!("Failed to send command to chat client: {err}");
            self.state.notice = Some("Client is busy, try again".into());
        }
    }

    fn submit_text(&mut self, draft: String) {
        let Some(chat) = self.state.chat.as_ref() else {
            return;
        };
        match chat.send_text(&draft) {
            Ok(row) => {
                self.state.input_text.clear();
                self.send_command(ChatCommand::Send(row));
            }
            Err(ChatError::EmptyMessage) => {}
            Err(err) => self.state.notice = Some(err.to_string()),
        }
    }

    fn render_chat(&mut self, ui: &mut egui::Ui) {
        let Some(chat) = self.state.chat.as_ref() else {
            return;
        };

        if header::render(ui, chat) {
            self.logout();
            return;
        }
        ui.separator();

        if let Some(notice) = self.state.notice.clone() {
            ui.horizontal(|ui| {
                ui.colored_label(egui::Color32::YELLOW, notice);
                if ui.small_button("✕").clicked() {
                    self.state.notice = None;
                }
            });
        }

        let retry = self
            .state
            .chat
            .as_ref()
            .is_some_and(|chat| chat_area::render(ui, chat));
        if retry {
            self.state.notice = None;
            self.send_command(ChatCommand::Reload);
        }
        ui.separator();

        let action = input_bar::render(
            ui,
            &mut self.state.input_text,
            &mut self.state.attach_path,
            self.state.uploading.as_deref(),
        );
        match action {
            Some(InputAction::Send(draft)) => self.submit_text(draft),
            Some(InputAction::Attach(path)) => {
                self.state.attach_path.clear();
                self.send_command(ChatCommand::Upload(PathBuf::from(path)));
            }
            None => {}
        }
    }
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_chat_events();

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.state.chat.is_some() {
                self.render_chat(ui);
                return;
            }

            let error = self
                .state
                .login_error
                .clone()
                .or_else(|| self.state.notice.clone());
            if let Some(name) = login::render(ui, &mut self.state.login_input, error.as_deref()) {
                self.login(&name);
            }
        });

        ctx.request_repaint_after(std::time::Duration::from_millis(100));
    }
}

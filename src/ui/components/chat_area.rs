use eframe::egui;

use crate::chat::ChatState;
use crate::common::{ChatMessage, MessageContent};

const IMAGE_MAX_WIDTH: f32 = 240.0;

/// Message list. Returns `true` when the user asks to reload a failed history.
pub fn render(ui: &mut egui::Ui, chat: &ChatState) -> bool {
    if !chat.is_ready() {
        ui.spinner();
        return false;
    }

    let mut retry = false;
    if chat.history_failed() {
        ui.horizontal(|ui| {
            ui.colored_label(egui::Color32::LIGHT_RED, "History could not be loaded");
            retry = ui.button("Retry").clicked();
        });
    }

    egui::ScrollArea::vertical()
        .auto_shrink([false, false])
        .stick_to_bottom(true)
        .max_height((ui.available_height() - 60.0).max(80.0))
        .show(ui, |ui| {
            if chat.messages().is_empty() {
                ui.label(egui::RichText::new("No messages yet").weak());
            }
            let session = chat.session();
            for message in chat.messages() {
                let layout = if session.is_own(message) {
                    egui::Layout::top_down(egui::Align::Max)
                } else {
                    egui::Layout::top_down(egui::Align::Min)
                };
                ui.with_layout(layout, |ui| bubble(ui, message));
            }
        });
    retry
}

fn bubble(ui: &mut egui::Ui, message: &ChatMessage) {
    egui::Frame::group(ui.style()).show(ui, |ui| {
        ui.label(
            egui::RichText::new(format!(
                "{} · {}",
                message.author,
                message.created_at.format("%H:%M")
            ))
            .small()
            .weak(),
        );

        if let Some(url) = message.content.inline_image() {
            ui.add(egui::Image::new(url).max_width(IMAGE_MAX_WIDTH));
        }
        match &message.content {
            MessageContent::Text(body) => {
                ui.label(body);
            }
            MessageContent::Image { url, file_name } => {
                ui.hyperlink_to(format!("🖼 {}", file_name.as_deref().unwrap_or("image")), url);
            }
            MessageContent::Video { url, file_name } => {
                ui.hyperlink_to(format!("🎬 {}", file_name.as_deref().unwrap_or("video")), url);
            }
            MessageContent::Audio { url, file_name } => {
                ui.hyperlink_to(format!("🔊 {}", file_name.as_deref().unwrap_or("audio")), url);
            }
            MessageContent::File { url, file_name } => {
                ui.hyperlink_to(format!("📎 {}", file_name.as_deref().unwrap_or("download")), url);
            }
        }
    });
}

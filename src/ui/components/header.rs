use eframe::egui;

use crate::chat::ChatState;

/// Title bar with the counterpart's presence. Returns `true` when Logout is clicked.
pub fn render(ui: &mut egui::Ui, chat: &ChatState) -> bool {
    let session = chat.session();
    let mut logout = false;

    ui.horizontal(|ui| {
        ui.heading(session.counterpart().as_str());

        let (color, label) = if chat.counterpart_online() {
            (egui::Color32::GREEN, "Online")
        } else {
            (egui::Color32::GRAY, "Offline")
        };
        ui.colored_label(color, "●");
        ui.label(egui::RichText::new(label).weak());

        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if ui.button("Logout").clicked() {
                logout = true;
            }
            ui.label(egui::RichText::new(format!("Logged in as {}", session.me())).weak());
        });
    });

    logout
}

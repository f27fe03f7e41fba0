use eframe::egui;

pub enum InputAction {
    Send(String),
    Attach(String),
}

/// Text box plus an attachment path field; both are disabled while an upload runs.
pub fn render(
    ui: &mut egui::Ui,
    input_text: &mut String,
    attach_path: &mut String,
    uploading: Option<&str>,
) -> Option<InputAction> {
    let mut action = None;

    if let Some(name) = uploading {
        ui.horizontal(|ui| {
            ui.spinner();
            ui.label(format!("Uploading {name}..."));
        });
    }

    ui.add_enabled_ui(uploading.is_none(), |ui| {
        ui.horizontal(|ui| {
            let response = ui.add(
                egui::TextEdit::singleline(input_text)
                    .hint_text("Type a message")
                    .desired_width(ui.available_width() - 60.0),
            );
            let enter = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if ui.button("Send").clicked() || enter {
                action = Some(InputAction::Send(input_text.clone()));
            }
        });

        ui.horizontal(|ui| {
            ui.add(
                egui::TextEdit::singleline(attach_path)
                    .hint_text("Path to a file")
                    .desired_width(ui.available_width() - 60.0),
            );
            if ui.button("Attach").clicked() && !attach_path.trim().is_empty() {
                action = Some(InputAction::Attach(attach_path.trim().to_string()));
            }
        });
    });

    action
}

use eframe::egui;

/// Login form. Returns the typed name when submitted.
pub fn render(ui: &mut egui::Ui, input: &mut String, error: Option<&str>) -> Option<String> {
    let mut submit = false;

    ui.vertical_centered(|ui| {
        ui.add_space(60.0);
        ui.heading("Private Chat");
        ui.label("Who are you?");
        ui.add_space(8.0);

        let response = ui.add(
            egui::TextEdit::singleline(input)
                .hint_text("Leo or Janice")
                .password(true)
                .desired_width(200.0),
        );
        if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
            submit = true;
        }
        if ui.button("Login").clicked() {
            submit = true;
        }

        if let Some(error) = error {
            ui.add_space(8.0);
            ui.colored_label(egui::Color32::RED, error);
        }
    });

    submit.then(|| input.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(shape: &egui::Shape, out: &mut Vec<String>) {
        match shape {
            egui::Shape::Text(text) => out.push(text.galley.text().to_string()),
            egui::Shape::Vec(shapes) => shapes.iter().for_each(|shape| texts(shape, out)),
            _ => {}
        }
    }

    #[test]
    fn typed_name_is_masked() {
        let ctx = egui::Context::default();
        let mut input = String::from("Janice");

        let output = ctx.run(egui::RawInput::default(), |ctx| {
            egui::CentralPanel::default().show(ctx, |ui| {
                render(ui, &mut input, None);
            });
        });

        let mut drawn = Vec::new();
        for clipped in &output.shapes {
            texts(&clipped.shape, &mut drawn);
        }
        assert!(drawn.iter().any(|text| text == "Login"));
        assert!(!drawn.iter().any(|text| text.contains("Janice")));
        assert_eq!(input, "Janice");
    }
}

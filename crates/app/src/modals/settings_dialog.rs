//! Settings dialog: model, tag syntax, typewriter speed and audio.

use super::{dialog_window, Modal, ModalResult};
use egui::{Context, RichText};
use shared::command_tags::TagSyntax;
use shared::settings::AppSettings;

pub enum SettingsAction {
    Save(AppSettings),
    Reset,
}

pub struct SettingsDialog {
    is_open: bool,
    draft: AppSettings,
    api_key: String,
    error: Option<String>,
    result: ModalResult<SettingsAction>,
}

impl Default for SettingsDialog {
    fn default() -> Self {
        Self {
            is_open: false,
            draft: AppSettings::default(),
            api_key: String::new(),
            error: None,
            result: ModalResult::Pending,
        }
    }
}

impl SettingsDialog {
    pub fn open_with(&mut self, settings: AppSettings) {
        self.api_key = settings.api_key.clone().unwrap_or_default();
        self.draft = settings;
        self.error = None;
        self.result = ModalResult::Pending;
        self.is_open = true;
    }

    pub fn take_result(&mut self) -> ModalResult<SettingsAction> {
        std::mem::replace(&mut self.result, ModalResult::Pending)
    }

    fn validate(&self) -> Result<AppSettings, String> {
        let mut settings = self.draft.clone();
        let key = self.api_key.trim();
        settings.api_key = (!key.is_empty()).then(|| key.to_string());
        settings.model = settings.model.trim().to_string();
        if settings.model.is_empty() {
            return Err("Model name is required".into());
        }
        if settings.triggers.symbol_start.trim().chars().count() != 1
            || settings.triggers.symbol_end.trim().chars().count() != 1
        {
            return Err("Tag brackets must be single characters".into());
        }
        if settings.triggers.symbol_start.trim() == settings.triggers.symbol_end.trim() {
            return Err("Opening and closing brackets must differ".into());
        }
        settings.triggers.symbol_start = settings.triggers.symbol_start.trim().to_string();
        settings.triggers.symbol_end = settings.triggers.symbol_end.trim().to_string();
        if settings.user_name.trim().is_empty() {
            settings.user_name = AppSettings::default().user_name;
        }
        Ok(settings)
    }
}

impl Modal for SettingsDialog {
    fn update(&mut self, ctx: &Context) -> bool {
        if !self.is_open {
            return false;
        }
        let mut should_close = false;

        dialog_window("Settings").show(ctx, |ui| {
            ui.set_min_width(380.0);
            egui::Grid::new("settings_grid")
                .num_columns(2)
                .spacing([12.0, 8.0])
                .show(ui, |ui| {
                    ui.label("Your name");
                    ui.text_edit_singleline(&mut self.draft.user_name);
                    ui.end_row();

                    ui.label("Gemini API key");
                    ui.add(egui::TextEdit::singleline(&mut self.api_key).password(true));
                    ui.end_row();

                    ui.label("Model");
                    ui.text_edit_singleline(&mut self.draft.model);
                    ui.end_row();

                    ui.label("Max tokens");
                    ui.add(egui::DragValue::new(&mut self.draft.max_tokens).clamp_range(1..=8192));
                    ui.end_row();

                    ui.label("Temperature");
                    ui.add(egui::Slider::new(&mut self.draft.temperature, 0.0..=2.0));
                    ui.end_row();

                    ui.label("Stream responses");
                    ui.checkbox(&mut self.draft.stream_responses, "");
                    ui.end_row();

                    ui.label("Typewriter delay (ms)");
                    ui.add(
                        egui::DragValue::new(&mut self.draft.typewriter_delay_ms)
                            .clamp_range(0..=200),
                    );
                    ui.end_row();

                    ui.label("Tag brackets");
                    ui.horizontal(|ui| {
                        ui.add(
                            egui::TextEdit::singleline(&mut self.draft.triggers.symbol_start)
                                .desired_width(24.0),
                        );
                        ui.add(
                            egui::TextEdit::singleline(&mut self.draft.triggers.symbol_end)
                                .desired_width(24.0),
                        );
                    });
                    ui.end_row();

                    ui.label("Separator");
                    ui.text_edit_singleline(&mut self.draft.triggers.separator);
                    ui.end_row();

                    ui.label("Sound effects");
                    ui.checkbox(&mut self.draft.audio.enabled, "");
                    ui.end_row();

                    ui.label("Volume");
                    ui.add_enabled(
                        self.draft.audio.enabled,
                        egui::Slider::new(&mut self.draft.audio.volume, 0.0..=1.0),
                    );
                    ui.end_row();
                });

            let preview = TagSyntax::from_symbols(
                &self.draft.triggers.symbol_start,
                &self.draft.triggers.symbol_end,
            )
            .wrap("avatar:happy");
            ui.label(RichText::new(format!("Example tag: {}", preview)).weak());

            if let Some(error) = &self.error {
                ui.colored_label(egui::Color32::from_rgb(220, 80, 80), error);
            }

            ui.separator();
            ui.horizontal(|ui| {
                if ui.button("Save").clicked() {
                    match self.validate() {
                        Ok(settings) => {
                            self.result = ModalResult::Confirmed(SettingsAction::Save(settings));
                            should_close = true;
                        }
                        Err(e) => self.error = Some(e),
                    }
                }
                if ui.button("Cancel").clicked() {
                    self.result = ModalResult::Cancelled;
                    should_close = true;
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("Reset to defaults").clicked() {
                        self.result = ModalResult::Confirmed(SettingsAction::Reset);
                        should_close = true;
                    }
                });
            });
        });

        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.result = ModalResult::Cancelled;
            should_close = true;
        }
        if should_close {
            self.close();
        }
        should_close
    }

    fn is_open(&self) -> bool {
        self.is_open
    }

    fn close(&mut self) {
        self.is_open = false;
        self.api_key.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialog() -> SettingsDialog {
        let mut d = SettingsDialog::default();
        d.open_with(AppSettings::default());
        d
    }

    #[test]
    fn blank_api_key_is_none() {
        let mut d = dialog();
        d.api_key = "   ".into();
        assert_eq!(d.validate().unwrap().api_key, None);
        d.api_key = " key ".into();
        assert_eq!(d.validate().unwrap().api_key.as_deref(), Some("key"));
    }

    #[test]
    fn brackets_must_be_distinct_single_chars() {
        let mut d = dialog();
        d.draft.triggers.symbol_start = "<<".into();
        assert!(d.validate().is_err());
        d.draft.triggers.symbol_start = "]".into();
        assert!(d.validate().is_err());
        d.draft.triggers.symbol_start = " { ".into();
        d.draft.triggers.symbol_end = "}".into();
        assert_eq!(d.validate().unwrap().triggers.symbol_start, "{");
    }

    #[test]
    fn empty_user_name_falls_back() {
        let mut d = dialog();
        d.draft.user_name = " ".into();
        assert_eq!(d.validate().unwrap().user_name, "User");
    }
}

//! Create or edit a personality, including its default portrait.

use super::{dialog_window, Modal, ModalResult};
use egui::{Context, RichText};
use shared::records::Personality;
use std::path::Path;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];

#[derive(Default)]
pub struct PersonalityEditor {
    is_open: bool,
    /// Personality being edited, None while creating
    base: Option<Personality>,
    name: String,
    description: String,
    prompt: String,
    tone_examples: String,
    roleplay: bool,
    image: Option<Vec<u8>>,
    image_label: Option<String>,
    error: Option<String>,
    result: Option<ModalResult<Personality>>,
}

impl PersonalityEditor {
    pub fn open_new(&mut self) {
        *self = Self {
            is_open: true,
            ..Self::default()
        };
    }

    pub fn open_edit(&mut self, personality: &Personality) {
        *self = Self {
            is_open: true,
            base: Some(personality.clone()),
            name: personality.name.clone(),
            description: personality.description.clone(),
            prompt: personality.prompt.clone(),
            tone_examples: personality.tone_examples.join("\n"),
            roleplay: personality.roleplay,
            image: personality.image.clone(),
            image_label: personality.image.as_ref().map(|_| "current portrait".to_string()),
            ..Self::default()
        };
    }

    pub fn is_editing(&self) -> bool {
        self.base.is_some()
    }

    pub fn take_result(&mut self) -> ModalResult<Personality> {
        self.result.take().unwrap_or(ModalResult::Pending)
    }

    fn pick_image(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", IMAGE_EXTENSIONS)
            .pick_file()
        else {
            return;
        };
        match std::fs::read(&path) {
            Ok(bytes) => {
                self.image_label = Some(file_label(&path));
                self.image = Some(bytes);
                self.error = None;
            }
            Err(e) => self.error = Some(format!("Could not read {}: {}", path.display(), e)),
        }
    }

    fn build(&self) -> Result<Personality, String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err("Name is required".into());
        }
        let mut personality = match &self.base {
            Some(base) => base.clone(),
            None => Personality::new(name, ""),
        };
        personality.name = name.to_string();
        personality.description = self.description.trim().to_string();
        personality.prompt = self.prompt.trim().to_string();
        personality.tone_examples = self
            .tone_examples
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        personality.roleplay = self.roleplay;
        personality.image = self.image.clone();
        Ok(personality)
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

impl Modal for PersonalityEditor {
    fn update(&mut self, ctx: &Context) -> bool {
        if !self.is_open {
            return false;
        }
        let mut should_close = false;
        let title = if self.is_editing() {
            "Edit personality"
        } else {
            "New personality"
        };

        dialog_window(title).show(ctx, |ui| {
            ui.set_min_width(420.0);
            ui.label("Name");
            ui.text_edit_singleline(&mut self.name);
            ui.add_space(4.0);
            ui.label("Who they are");
            ui.add(egui::TextEdit::multiline(&mut self.description).desired_rows(3));
            ui.add_space(4.0);
            ui.label("Instructions");
            ui.add(egui::TextEdit::multiline(&mut self.prompt).desired_rows(3));
            ui.add_space(4.0);
            ui.label("Example lines (one per line)");
            ui.add(egui::TextEdit::multiline(&mut self.tone_examples).desired_rows(3));
            ui.add_space(4.0);
            ui.checkbox(&mut self.roleplay, "Roleplay (describe actions in asterisks)");

            ui.add_space(4.0);
            ui.horizontal(|ui| {
                if ui.button("Choose portrait...").clicked() {
                    self.pick_image();
                }
                match &self.image_label {
                    Some(label) => {
                        ui.label(RichText::new(label).weak());
                        if ui.small_button("Remove").clicked() {
                            self.image = None;
                            self.image_label = None;
                        }
                    }
                    None => {
                        ui.label(RichText::new("no portrait").weak());
                    }
                }
            });

            if let Some(error) = &self.error {
                ui.colored_label(egui::Color32::from_rgb(220, 80, 80), error);
            }

            ui.separator();
            ui.horizontal(|ui| {
                if ui.button("Save").clicked() {
                    match self.build() {
                        Ok(p) => {
                            self.result = Some(ModalResult::Confirmed(p));
                            should_close = true;
                        }
                        Err(e) => self.error = Some(e),
                    }
                }
                if ui.button("Cancel").clicked() {
                    self.result = Some(ModalResult::Cancelled);
                    should_close = true;
                }
            });
        });

        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.result = Some(ModalResult::Cancelled);
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
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_personality_requires_name() {
        let mut editor = PersonalityEditor::default();
        editor.open_new();
        assert!(editor.build().is_err());
        editor.name = "  Ava ".into();
        editor.tone_examples = "Hey!\n\n  Oh my \n".into();
        let p = editor.build().unwrap();
        assert_eq!(p.name, "Ava");
        assert_eq!(p.tone_examples, vec!["Hey!", "Oh my"]);
    }

    #[test]
    fn editing_keeps_identity() {
        let mut original = Personality::new("Ava", "cheerful");
        original.image = Some(vec![1, 2]);
        let mut editor = PersonalityEditor::default();
        editor.open_edit(&original);
        assert!(editor.is_editing());
        editor.description = "grumpy".into();

        let edited = editor.build().unwrap();
        assert_eq!(edited.id, original.id);
        assert_eq!(edited.created_at, original.created_at);
        assert_eq!(edited.description, "grumpy");
        assert_eq!(edited.image, Some(vec![1, 2]));
    }

    #[test]
    fn result_is_taken_once() {
        let mut editor = PersonalityEditor::default();
        editor.result = Some(ModalResult::Cancelled);
        assert!(matches!(editor.take_result(), ModalResult::Cancelled));
        assert!(editor.take_result().is_pending());
    }
}

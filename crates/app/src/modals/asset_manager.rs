//! Per-personality asset library: import portraits and sounds, edit their
//! tags, delete them.

use super::{dialog_window, Modal};
use anyhow::{anyhow, Context as _, Result};
use egui::{Context, RichText};
use services::AssetRepository;
use shared::assets::{parse_tag_list, Asset, AssetKind, CHARACTER_TAG_PREFIX};
use std::collections::HashMap;
use std::path::Path;

const MEDIA_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "mp3", "wav", "ogg", "flac",
];

pub struct AssetManager {
    repo: AssetRepository,
    is_open: bool,
    character_id: String,
    character_name: String,
    assets: Vec<Asset>,
    /// Comma separated tags for the next import
    import_tags: String,
    tag_drafts: HashMap<String, String>,
    error: Option<String>,
    /// Set whenever the character's tag set may have changed
    changed: bool,
}

impl AssetManager {
    pub fn new(repo: AssetRepository) -> Self {
        Self {
            repo,
            is_open: false,
            character_id: String::new(),
            character_name: String::new(),
            assets: Vec::new(),
            import_tags: String::new(),
            tag_drafts: HashMap::new(),
            error: None,
            changed: false,
        }
    }

    pub fn open_for(&mut self, character_id: &str, character_name: &str) {
        self.character_id = character_id.to_string();
        self.character_name = character_name.to_string();
        self.import_tags.clear();
        self.error = None;
        self.changed = false;
        self.is_open = true;
        self.reload();
    }

    /// True once after assets were added, retagged or deleted
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    fn reload(&mut self) {
        match self.repo.list_assets_for_character(&self.character_id) {
            Ok(assets) => {
                self.tag_drafts = assets
                    .iter()
                    .map(|a| (a.id.clone(), editable_tags(a)))
                    .collect();
                self.assets = assets;
            }
            Err(e) => self.error = Some(format!("Could not load assets: {}", e)),
        }
    }

    /// Store one media file under the current character
    pub fn import_file(&mut self, path: &Path) -> Result<Asset> {
        let kind = AssetKind::from_path(path)
            .ok_or_else(|| anyhow!("Unsupported file type: {}", path.display()))?;
        let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "asset".to_string());
        let asset = Asset::new(
            &self.character_id,
            name,
            kind,
            parse_tag_list(&self.import_tags),
            data,
        );
        self.repo.add_asset(&asset)?;
        self.changed = true;
        Ok(asset)
    }

    fn import_picked(&mut self) {
        let Some(paths) = rfd::FileDialog::new()
            .add_filter("Media", MEDIA_EXTENSIONS)
            .pick_files()
        else {
            return;
        };
        let mut failures = Vec::new();
        for path in paths {
            match self.import_file(&path) {
                Ok(asset) => tracing::info!("Imported {} for {}", asset.name, self.character_name),
                Err(e) => {
                    tracing::warn!("Import failed: {:#}", e);
                    failures.push(e.to_string());
                }
            }
        }
        self.error = (!failures.is_empty()).then(|| failures.join("\n"));
        self.reload();
    }

    fn retag(&mut self, id: &str) -> Result<()> {
        let draft = self.tag_drafts.get(id).cloned().unwrap_or_default();
        let mut asset = self
            .repo
            .get_asset_by_id(id)?
            .ok_or_else(|| anyhow!("Asset not found: {}", id))?;
        asset.tags = parse_tag_list(&draft).into_iter().collect();
        asset.tags.insert(asset.kind.implicit_tag().to_string());
        self.repo.update_asset(&asset)?;
        self.changed = true;
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<()> {
        if self.repo.delete_asset(id)? {
            self.changed = true;
        }
        Ok(())
    }
}

/// Tags shown for editing; the implicit kind tag is always re-added on save
fn editable_tags(asset: &Asset) -> String {
    asset
        .tags
        .iter()
        .filter(|t| t.as_str() != asset.kind.implicit_tag())
        .cloned()
        .collect::<Vec<_>>()
        .join(", ")
}

enum RowAction {
    Retag(String),
    Delete(String),
}

impl Modal for AssetManager {
    fn update(&mut self, ctx: &Context) -> bool {
        if !self.is_open {
            return false;
        }
        let mut should_close = false;
        let mut action = None;
        let mut import = false;
        let title = format!("Assets: {}", self.character_name);

        dialog_window(&title).show(ctx, |ui| {
            ui.set_min_width(520.0);
            ui.label(
                RichText::new(format!(
                    "Tags starting with `{}` are specific to this character.",
                    CHARACTER_TAG_PREFIX
                ))
                .weak(),
            );
            ui.add_space(6.0);

            ui.horizontal(|ui| {
                ui.label("Tags");
                ui.add(
                    egui::TextEdit::singleline(&mut self.import_tags)
                        .hint_text("char_happy, smile")
                        .desired_width(240.0),
                );
                if ui.button("Import files...").clicked() {
                    import = true;
                }
            });
            ui.separator();

            egui::ScrollArea::vertical().max_height(320.0).show(ui, |ui| {
                if self.assets.is_empty() {
                    ui.label(RichText::new("No assets yet").weak());
                }
                egui::Grid::new("asset_grid")
                    .num_columns(4)
                    .striped(true)
                    .spacing([10.0, 6.0])
                    .show(ui, |ui| {
                        for asset in &self.assets {
                            ui.label(asset.kind.as_str());
                            ui.label(&asset.name);
                            if let Some(draft) = self.tag_drafts.get_mut(&asset.id) {
                                ui.add(egui::TextEdit::singleline(draft).desired_width(200.0));
                            }
                            ui.horizontal(|ui| {
                                if ui.small_button("Save tags").clicked() {
                                    action = Some(RowAction::Retag(asset.id.clone()));
                                }
                                if ui.small_button("Delete").clicked() {
                                    action = Some(RowAction::Delete(asset.id.clone()));
                                }
                            });
                            ui.end_row();
                        }
                    });
            });

            if let Some(error) = &self.error {
                ui.colored_label(egui::Color32::from_rgb(220, 80, 80), error);
            }
            ui.separator();
            if ui.button("Close").clicked() {
                should_close = true;
            }
        });

        if import {
            self.import_picked();
        }
        if let Some(action) = action {
            let outcome = match &action {
                RowAction::Retag(id) => self.retag(id),
                RowAction::Delete(id) => self.delete(id),
            };
            self.error = outcome.err().map(|e| e.to_string());
            self.reload();
        }
        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
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
        self.assets.clear();
        self.tag_drafts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use services::Database;

    fn manager() -> AssetManager {
        let db = Database::open_in_memory().unwrap();
        let mut m = AssetManager::new(AssetRepository::new(db));
        m.open_for("c1", "Ava");
        m
    }

    #[test]
    fn import_uses_extension_and_tags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Smile.PNG");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let mut m = manager();
        m.import_tags = "Char_Happy, smile".into();
        let asset = m.import_file(&path).unwrap();

        assert_eq!(asset.kind, AssetKind::Image);
        assert_eq!(asset.name, "Smile.PNG");
        assert!(asset.tags.contains("char_happy"));
        assert!(asset.tags.contains("avatar"));
        assert!(m.take_changed());
        assert!(!m.take_changed());

        let stored = m.repo.search_assets_by_tags(["char_happy"], "c1").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].data, vec![1, 2, 3]);
    }

    #[test]
    fn unsupported_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hi").unwrap();

        let mut m = manager();
        assert!(m.import_file(&path).is_err());
        assert!(!m.take_changed());
    }

    #[test]
    fn retag_keeps_implicit_tag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boom.wav");
        std::fs::write(&path, [0u8; 4]).unwrap();

        let mut m = manager();
        m.import_tags = "loud".into();
        let asset = m.import_file(&path).unwrap();
        m.reload();
        assert_eq!(m.tag_drafts[&asset.id], "loud");

        m.tag_drafts.insert(asset.id.clone(), "quiet, soft".into());
        m.retag(&asset.id).unwrap();
        let tags = m.repo.get_asset_by_id(&asset.id).unwrap().unwrap().tags;
        assert_eq!(
            tags.into_iter().collect::<Vec<_>>(),
            vec!["audio", "quiet", "soft"]
        );

        m.delete(&asset.id).unwrap();
        assert!(m.repo.list_assets_for_character("c1").unwrap().is_empty());
    }
}

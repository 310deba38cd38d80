//! Portrait slots with a cross-fade between the old and new image.
//!
//! A slot holds the texture being faded in and, while the fade runs, the one
//! being faded out. The outgoing layer (and the transient media backing it)
//! is dropped once the fade completes.

use chat_host::TransientMedia;
use eframe::egui;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const FADE_DURATION: Duration = Duration::from_millis(500);

struct Layer<T> {
    texture: T,
    _media: Option<Arc<TransientMedia>>,
}

pub struct PortraitSlot<T> {
    current: Option<Layer<T>>,
    previous: Option<Layer<T>>,
    fade_started: Option<Instant>,
}

impl<T> Default for PortraitSlot<T> {
    fn default() -> Self {
        Self {
            current: None,
            previous: None,
            fade_started: None,
        }
    }
}

impl<T> PortraitSlot<T> {
    /// Start fading to `texture`. A swap during a running fade drops the
    /// outgoing layer right away.
    pub fn show(&mut self, texture: T, media: Option<Arc<TransientMedia>>, now: Instant) {
        self.previous = self.current.take();
        self.fade_started = self.previous.as_ref().map(|_| now);
        self.current = Some(Layer {
            texture,
            _media: media,
        });
    }

    /// Advance the fade. Returns the opacity of the incoming layer.
    pub fn tick(&mut self, now: Instant) -> f32 {
        let Some(started) = self.fade_started else {
            return 1.0;
        };
        let t = now.saturating_duration_since(started).as_secs_f32() / FADE_DURATION.as_secs_f32();
        if t >= 1.0 {
            self.previous = None;
            self.fade_started = None;
            1.0
        } else {
            t
        }
    }

    pub fn is_fading(&self) -> bool {
        self.fade_started.is_some()
    }

    pub fn current(&self) -> Option<&T> {
        self.current.as_ref().map(|l| &l.texture)
    }

    pub fn previous(&self) -> Option<&T> {
        self.previous.as_ref().map(|l| &l.texture)
    }
}

/// Decode image bytes into a texture
pub fn load_texture(ctx: &egui::Context, name: &str, bytes: &[u8]) -> Option<egui::TextureHandle> {
    let img = match image::load_from_memory(bytes) {
        Ok(img) => img,
        Err(e) => {
            tracing::warn!("Could not decode portrait {}: {}", name, e);
            return None;
        }
    };
    let rgba = img.to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    let pixels = rgba.into_raw();
    let color_image = egui::ColorImage::from_rgba_unmultiplied(size, &pixels);
    Some(ctx.load_texture(name, color_image, egui::TextureOptions::LINEAR))
}

/// Every portrait on screen: one slot per message and per personality card
#[derive(Default)]
pub struct Portraits {
    slots: HashMap<String, PortraitSlot<egui::TextureHandle>>,
    defaults: HashMap<String, egui::TextureHandle>,
}

impl Portraits {
    /// Swap the portrait of `key`, cross-fading from what it showed before
    /// (the personality's default portrait for a fresh slot).
    pub fn swap(
        &mut self,
        key: &str,
        personality_id: Option<&str>,
        texture: egui::TextureHandle,
        media: Arc<TransientMedia>,
    ) {
        let now = Instant::now();
        let fallback = personality_id.and_then(|id| self.defaults.get(id));
        let slot = self.slots.entry(key.to_string()).or_insert_with(|| {
            let mut slot = PortraitSlot::default();
            if let Some(base) = fallback {
                slot.show(base.clone(), None, now);
            }
            slot
        });
        slot.show(texture, Some(media), now);
    }

    /// Forget a slot, releasing whatever it held
    pub fn clear(&mut self, key: &str) {
        self.slots.remove(key);
    }

    /// Base portrait of a personality, shown until a tag swaps it
    pub fn set_default(&mut self, personality_id: &str, texture: Option<egui::TextureHandle>) {
        match texture {
            Some(t) => {
                self.defaults.insert(personality_id.to_string(), t);
            }
            None => {
                self.defaults.remove(personality_id);
            }
        }
    }

    pub fn any_fading(&self) -> bool {
        self.slots.values().any(PortraitSlot::is_fading)
    }

    /// Paint the portrait for `key` into `rect`, falling back to the default
    /// portrait of `personality_id`.
    pub fn paint(
        &mut self,
        ui: &egui::Ui,
        rect: egui::Rect,
        key: &str,
        personality_id: Option<&str>,
    ) {
        let uv = egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));
        let rounding = egui::Rounding::same(8.0);
        let fallback = personality_id.and_then(|id| self.defaults.get(id));

        let Some(slot) = self.slots.get_mut(key) else {
            match fallback {
                Some(texture) => {
                    ui.painter()
                        .image(texture.id(), rect, uv, egui::Color32::WHITE);
                }
                None => {
                    ui.painter()
                        .rect_filled(rect, rounding, egui::Color32::from_rgb(70, 60, 90));
                }
            }
            return;
        };

        let alpha = slot.tick(Instant::now());
        if let Some(texture) = slot.previous() {
            let a = ((1.0 - alpha) * 255.0) as u8;
            ui.painter()
                .image(texture.id(), rect, uv, egui::Color32::from_white_alpha(a));
        }
        if let Some(texture) = slot.current() {
            let a = (alpha * 255.0) as u8;
            ui.painter()
                .image(texture.id(), rect, uv, egui::Color32::from_white_alpha(a));
        }
        if slot.is_fading() {
            ui.ctx().request_repaint();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_host::TransientRegistry;
    use shared::assets::{Asset, AssetKind};

    fn media(registry: &TransientRegistry) -> Arc<TransientMedia> {
        let asset = Asset::new("c1", "a.png", AssetKind::Image, vec![], vec![1]);
        Arc::new(registry.acquire(&asset))
    }

    #[test]
    fn first_image_shows_without_fade() {
        let mut slot = PortraitSlot::default();
        let now = Instant::now();
        slot.show("a", None, now);
        assert!(!slot.is_fading());
        assert_eq!(slot.tick(now), 1.0);
        assert_eq!(slot.current(), Some(&"a"));
    }

    #[test]
    fn fade_releases_previous_on_completion() {
        let registry = TransientRegistry::new();
        let mut slot = PortraitSlot::default();
        let start = Instant::now();

        slot.show("a", Some(media(&registry)), start);
        slot.show("b", Some(media(&registry)), start);
        assert!(slot.is_fading());
        assert_eq!(registry.live_count(), 2);

        let half = slot.tick(start + FADE_DURATION / 2);
        assert!(half > 0.4 && half < 0.6);
        assert_eq!(slot.previous(), Some(&"a"));
        assert_eq!(registry.live_count(), 2);

        assert_eq!(slot.tick(start + FADE_DURATION), 1.0);
        assert!(slot.previous().is_none());
        assert_eq!(registry.live_count(), 1);
        assert_eq!(registry.released_count(), 1);
    }

    #[test]
    fn swap_mid_fade_drops_outgoing_layer() {
        let registry = TransientRegistry::new();
        let mut slot = PortraitSlot::default();
        let start = Instant::now();

        slot.show("a", Some(media(&registry)), start);
        slot.show("b", Some(media(&registry)), start);
        slot.show("c", Some(media(&registry)), start + FADE_DURATION / 4);

        assert_eq!(slot.previous(), Some(&"b"));
        assert_eq!(registry.live_count(), 2);
        slot.tick(start + FADE_DURATION * 2);
        assert_eq!(registry.live_count(), 1);
        assert_eq!(slot.current(), Some(&"c"));
    }

    #[test]
    fn dropping_slot_releases_everything() {
        let registry = TransientRegistry::new();
        let mut slot = PortraitSlot::default();
        slot.show("a", Some(media(&registry)), Instant::now());
        drop(slot);
        assert_eq!(registry.live_count(), 0);
    }
}

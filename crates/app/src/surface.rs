//! Effect surface backed by the egui window.
//!
//! Dispatch tasks run on the tokio runtime; portrait swaps are decoded there
//! and queued for the UI thread, sounds go straight to the audio thread.

use chat_host::{EffectSurface, TransientMedia};
use eframe::egui;
use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use crate::audio::AudioPlayer;

pub struct PortraitSwap {
    pub message_id: String,
    pub character_id: String,
    pub image: egui::ColorImage,
    pub media: Arc<TransientMedia>,
}

pub struct UiSurface {
    tx: Mutex<Sender<PortraitSwap>>,
    audio: AudioPlayer,
    ctx: Mutex<Option<egui::Context>>,
}

impl UiSurface {
    pub fn new(audio: AudioPlayer) -> (Arc<Self>, Receiver<PortraitSwap>) {
        let (tx, rx) = mpsc::channel();
        let surface = Arc::new(Self {
            tx: Mutex::new(tx),
            audio,
            ctx: Mutex::new(None),
        });
        (surface, rx)
    }

    /// Wake the UI whenever a swap is queued
    pub fn attach(&self, ctx: egui::Context) {
        *self.ctx.lock() = Some(ctx);
    }
}

fn decode(bytes: &[u8]) -> Option<egui::ColorImage> {
    let img = image::load_from_memory(bytes).ok()?;
    let rgba = img.to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    Some(egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw()))
}

impl EffectSurface for UiSurface {
    fn swap_portrait(&self, message_id: &str, character_id: &str, media: TransientMedia) {
        let Some(image) = decode(media.data()) else {
            tracing::warn!("Portrait {} is not a readable image", media.name());
            return;
        };
        let swap = PortraitSwap {
            message_id: message_id.to_string(),
            character_id: character_id.to_string(),
            image,
            media: Arc::new(media),
        };
        if self.tx.lock().send(swap).is_err() {
            return;
        }
        if let Some(ctx) = self.ctx.lock().as_ref() {
            ctx.request_repaint();
        }
    }

    fn play_audio(&self, media: TransientMedia, volume: f32) {
        self.audio.play(media, volume);
    }
}

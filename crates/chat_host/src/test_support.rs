//! In-memory stand-ins for the asset store and the UI surface.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use shared::assets::{Asset, AssetKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::dispatcher::{AssetSource, EffectSurface};
use crate::transient::TransientMedia;

#[derive(Default)]
pub struct FakeAssets {
    pub assets: Vec<Asset>,
    pub searches: AtomicUsize,
    pub queries: Mutex<Vec<Vec<String>>>,
}

impl FakeAssets {
    pub fn with(assets: Vec<Asset>) -> Self {
        Self {
            assets,
            ..Default::default()
        }
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetSource for FakeAssets {
    async fn search(&self, tags: Vec<String>, character_id: String) -> Result<Vec<Asset>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().push(tags.clone());
        // "slow" values simulate a lookup that completes late
        if tags.iter().any(|t| t.ends_with("slow")) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        if tags.iter().any(|t| t == "broken") {
            anyhow::bail!("disk on fire");
        }
        Ok(self
            .assets
            .iter()
            .filter(|a| a.character_id == character_id)
            .filter(|a| a.has_all_tags(&tags))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct FakeSurface {
    pub portraits: Mutex<HashMap<String, TransientMedia>>,
    pub swaps: Mutex<Vec<String>>,
    pub sounds: Mutex<Vec<(String, f32)>>,
}

impl EffectSurface for FakeSurface {
    fn swap_portrait(&self, message_id: &str, _character_id: &str, media: TransientMedia) {
        self.swaps.lock().push(media.asset_id().to_string());
        // Replacing the entry drops the previous handle
        self.portraits.lock().insert(message_id.to_string(), media);
    }

    fn play_audio(&self, media: TransientMedia, volume: f32) {
        self.sounds
            .lock()
            .push((media.asset_id().to_string(), volume));
    }
}

fn asset(id: &str, name: String, kind: AssetKind, tags: &[&str]) -> Asset {
    let mut asset = Asset::new(
        "c1",
        name,
        kind,
        tags.iter().map(|t| t.to_string()),
        vec![7],
    );
    asset.id = id.to_string();
    asset
}

/// Portrait owned by character `c1`
pub fn image(id: &str, tags: &[&str]) -> Asset {
    asset(id, format!("{id}.png"), AssetKind::Image, tags)
}

/// Sound effect owned by character `c1`
pub fn sound(id: &str, tags: &[&str]) -> Asset {
    asset(id, format!("{id}.ogg"), AssetKind::Audio, tags)
}

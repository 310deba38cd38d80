//! Turns scanned command tags into UI side effects.
//!
//! Every dispatch is fire-and-forget: the asset lookup runs as its own task
//! and failures are logged, never surfaced to the renderer.

use anyhow::Result;
use async_trait::async_trait;
use services::AssetRepository;
use shared::assets::Asset;
use shared::command_tags::{CommandTag, TagAction};
use shared::error::DispatchError;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::session::TagSession;
use crate::transient::{TransientMedia, TransientRegistry};
use crate::SharedSettings;

/// Where dispatched tags look up media
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Assets of `character_id` carrying every tag, best match first
    async fn search(&self, tags: Vec<String>, character_id: String) -> Result<Vec<Asset>>;
}

#[async_trait]
impl AssetSource for AssetRepository {
    async fn search(&self, tags: Vec<String>, character_id: String) -> Result<Vec<Asset>> {
        let repo = self.clone();
        tokio::task::spawn_blocking(move || {
            repo.search_assets_by_tags(tags.iter().map(String::as_str), &character_id)
        })
        .await?
    }
}

/// The UI side that shows portraits and plays sounds.
///
/// Implementations own the handles they receive and drop them when done.
/// A target that no longer exists is a no-op.
pub trait EffectSurface: Send + Sync {
    fn swap_portrait(&self, message_id: &str, character_id: &str, media: TransientMedia);
    fn play_audio(&self, media: TransientMedia, volume: f32);
}

#[derive(Clone)]
pub struct Dispatcher {
    session: Arc<TagSession>,
    assets: Arc<dyn AssetSource>,
    surface: Arc<dyn EffectSurface>,
    settings: SharedSettings,
    registry: TransientRegistry,
}

impl Dispatcher {
    pub fn new(
        session: Arc<TagSession>,
        assets: Arc<dyn AssetSource>,
        surface: Arc<dyn EffectSurface>,
        settings: SharedSettings,
        registry: TransientRegistry,
    ) -> Self {
        Self {
            session,
            assets,
            surface,
            settings,
            registry,
        }
    }

    pub fn session(&self) -> &Arc<TagSession> {
        &self.session
    }

    pub fn registry(&self) -> &TransientRegistry {
        &self.registry
    }

    /// Act on one tag of `message_id`. Returns the lookup task, if one was started.
    pub fn dispatch(
        &self,
        tag: &CommandTag,
        message_id: &str,
        character_id: Option<&str>,
    ) -> Option<JoinHandle<()>> {
        let Some(character_id) = character_id else {
            tracing::trace!("No active character, ignoring {}", tag.full_match_text);
            return None;
        };
        if self.session.is_processed(message_id, &tag.full_match_text) {
            return None;
        }
        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("Cannot dispatch {}: {}", tag.full_match_text, e);
                return None;
            }
        };
        // Check-and-set: a concurrent scan of the same text may race us here.
        if !self.session.mark_processed(message_id, &tag.full_match_text) {
            return None;
        }

        let action = tag.action();
        let implicit = match &action {
            TagAction::Unsupported(command) => {
                tracing::warn!("{}", DispatchError::UnsupportedCommand(command.clone()));
                return None;
            }
            TagAction::Audio if !self.settings.read().audio.enabled => {
                tracing::debug!("Audio disabled, skipping {}", tag.full_match_text);
                return None;
            }
            TagAction::Avatar => "avatar",
            TagAction::Audio => "audio",
        };

        let mut tags: Vec<String> = tag
            .raw_values
            .iter()
            .map(|v| self.session.map_value(v))
            .collect();
        tags.push(implicit.to_string());

        let sequence = match action {
            TagAction::Avatar => Some(self.session.next_sequence(message_id)),
            _ => None,
        };

        tracing::debug!(
            "Dispatching {} for message {} with tags {:?}",
            tag.full_match_text,
            message_id,
            tags
        );

        let job = DispatchJob {
            session: self.session.clone(),
            assets: self.assets.clone(),
            surface: self.surface.clone(),
            settings: self.settings.clone(),
            registry: self.registry.clone(),
            message_id: message_id.to_string(),
            character_id: character_id.to_string(),
            tags,
            sequence,
        };
        Some(runtime.spawn(async move {
            match job.run().await {
                Ok(()) => {}
                Err(e @ DispatchError::NoMatch { .. }) => tracing::debug!("{}", e),
                Err(e) => tracing::warn!("Tag dispatch failed: {}", e),
            }
        }))
    }

    /// Dispatch every tag in order, dropping the task handles
    pub fn dispatch_all(&self, tags: &[CommandTag], message_id: &str, character_id: Option<&str>) {
        for tag in tags {
            let _ = self.dispatch(tag, message_id, character_id);
        }
    }
}

struct DispatchJob {
    session: Arc<TagSession>,
    assets: Arc<dyn AssetSource>,
    surface: Arc<dyn EffectSurface>,
    settings: SharedSettings,
    registry: TransientRegistry,
    message_id: String,
    character_id: String,
    tags: Vec<String>,
    /// Present for avatar swaps only
    sequence: Option<u64>,
}

impl DispatchJob {
    async fn run(self) -> Result<(), DispatchError> {
        let found = self
            .assets
            .search(self.tags.clone(), self.character_id.clone())
            .await
            .map_err(|e| DispatchError::Lookup {
                tags: self.tags.clone(),
                message: e.to_string(),
            })?;

        let Some(asset) = found.into_iter().next() else {
            return Err(DispatchError::NoMatch {
                tags: self.tags,
                character_id: self.character_id,
            });
        };

        match self.sequence {
            Some(seq) => {
                if !self.session.try_apply(&self.message_id, seq) {
                    tracing::debug!(
                        "Discarding stale avatar swap #{} for message {}",
                        seq,
                        self.message_id
                    );
                    return Ok(());
                }
                let media = self.registry.acquire(&asset);
                self.surface
                    .swap_portrait(&self.message_id, &self.character_id, media);
            }
            None => {
                let volume = self.settings.read().audio.volume;
                let media = self.registry.acquire(&asset);
                self.surface.play_audio(media, volume);
            }
        }
        Ok(())
    }
}

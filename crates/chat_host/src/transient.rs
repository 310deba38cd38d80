//! Short-lived handles to asset bytes handed to the UI.
//!
//! A handle is acquired when a dispatched tag finds an asset and released
//! exactly once when the last owner drops it, either after a portrait
//! cross-fade completes or after a sound finishes playing.

use shared::assets::{Asset, AssetKind};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct RegistryInner {
    next_id: AtomicU64,
    live: AtomicUsize,
    released: AtomicUsize,
}

/// Issues [`TransientMedia`] handles and counts the live ones
#[derive(Clone, Default)]
pub struct TransientRegistry {
    inner: Arc<RegistryInner>,
}

impl TransientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, asset: &Asset) -> TransientMedia {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner.live.fetch_add(1, Ordering::SeqCst);
        tracing::trace!("Acquired transient media {} for asset {}", id, asset.id);
        TransientMedia {
            id,
            asset_id: asset.id.clone(),
            name: asset.name.clone(),
            kind: asset.kind,
            data: Arc::from(asset.data.as_slice()),
            registry: self.inner.clone(),
        }
    }

    /// Handles acquired and not yet released
    pub fn live_count(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    pub fn released_count(&self) -> usize {
        self.inner.released.load(Ordering::SeqCst)
    }
}

/// Owned view of an asset's bytes. Dropping it releases the handle.
pub struct TransientMedia {
    id: u64,
    asset_id: String,
    name: String,
    kind: AssetKind,
    data: Arc<[u8]>,
    registry: Arc<RegistryInner>,
}

impl TransientMedia {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Shared copy of the bytes, for decoders that need `'static` input
    pub fn shared_data(&self) -> Arc<[u8]> {
        self.data.clone()
    }

    /// Opaque locator, unique for the lifetime of the process
    pub fn url(&self) -> String {
        format!("transient://{}/{}", self.id, self.asset_id)
    }
}

impl std::fmt::Debug for TransientMedia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransientMedia")
            .field("id", &self.id)
            .field("asset_id", &self.asset_id)
            .field("kind", &self.kind)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl Drop for TransientMedia {
    fn drop(&mut self) {
        self.registry.live.fetch_sub(1, Ordering::SeqCst);
        self.registry.released.fetch_add(1, Ordering::SeqCst);
        tracing::trace!("Released transient media {}", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset() -> Asset {
        Asset::new("c1", "happy.png", AssetKind::Image, vec![], vec![1, 2, 3])
    }

    #[test]
    fn drop_releases_exactly_once() {
        let registry = TransientRegistry::new();
        let first = registry.acquire(&asset());
        let second = registry.acquire(&asset());
        assert_eq!(registry.live_count(), 2);
        assert_ne!(first.url(), second.url());
        assert_eq!(first.data(), &[1, 2, 3]);

        drop(first);
        assert_eq!(registry.live_count(), 1);
        assert_eq!(registry.released_count(), 1);

        drop(second);
        assert_eq!(registry.live_count(), 0);
        assert_eq!(registry.released_count(), 2);
    }

    #[test]
    fn shared_bytes_survive_release() {
        let registry = TransientRegistry::new();
        let media = registry.acquire(&asset());
        let bytes = media.shared_data();
        drop(media);
        assert_eq!(registry.live_count(), 0);
        assert_eq!(&bytes[..], &[1, 2, 3]);
    }
}

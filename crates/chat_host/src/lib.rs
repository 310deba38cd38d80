//! Chat host - the conversation core of the app
//!
//! - Keeps per-conversation tag state (character tag cache, processed tags)
//! - Dispatches command tags to avatar swaps and sound effects
//! - Reveals streamed model text with a typewriter effect
//! - Orchestrates chats between the stores and the model provider

pub mod chat;
pub mod dispatcher;
pub mod highlight;
pub mod prompts;
pub mod renderer;
pub mod session;
pub mod transient;

#[cfg(test)]
mod test_support;

use parking_lot::RwLock;
use shared::settings::AppSettings;
use std::sync::Arc;

pub use chat::{gemini_factory, ChatService, ProviderFactory, Stores};
pub use dispatcher::{AssetSource, Dispatcher, EffectSurface};
pub use highlight::render_text_content;
pub use renderer::{RevealHandle, StreamingRenderer};
pub use session::TagSession;
pub use transient::{TransientMedia, TransientRegistry};

/// Live settings shared between the service, dispatcher and renderer
pub type SharedSettings = Arc<RwLock<AppSettings>>;

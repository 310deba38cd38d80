//! Core types for the Aphrodisiac app
//!
//! The UI thread owns [`AppState`]. Background work reports back through
//! channels that are drained once per frame.

use chat_host::ChatService;
use eframe::egui;
use regex::Regex;
use shared::events::RenderEvent;
use shared::records::{Chat, Message, Personality};
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::modals::{AssetManager, PersonalityEditor, SettingsDialog};
use crate::portrait::Portraits;
use crate::surface::PortraitSwap;

/// Result from a background chat request
#[derive(Debug)]
pub enum TaskResult {
    /// A reply finished streaming (send or regenerate)
    Reply {
        chat_id: String,
        outcome: Result<Message, String>,
    },
}

/// Slot key of a personality card, kept apart from message ids
pub fn card_key(personality_id: &str) -> String {
    format!("card:{}", personality_id)
}

pub struct AppState {
    pub ctx: egui::Context,
    pub service: Arc<ChatService>,
    pub runtime: Handle,

    pub render_rx: UnboundedReceiver<RenderEvent>,
    pub portrait_rx: Receiver<PortraitSwap>,
    pub task_tx: Sender<TaskResult>,
    pub task_rx: Receiver<TaskResult>,

    pub personalities: Vec<Personality>,
    pub active_personality: Option<String>,
    pub chats: Vec<Chat>,
    pub current_chat: Option<String>,
    pub messages: Vec<Message>,
    /// Text revealed so far, per message still being revealed
    pub live_text: HashMap<String, String>,
    /// Chats waiting on a reply
    pub pending_chats: HashSet<String>,

    pub input_text: String,
    pub status: Option<String>,
    pub scroll_to_bottom: bool,
    /// Tag pattern for the configured brackets, rebuilt when settings change
    pub tag_pattern: Regex,

    pub portraits: Portraits,
    pub settings_dialog: SettingsDialog,
    pub personality_editor: PersonalityEditor,
    pub asset_manager: AssetManager,
}

/// Something the user clicked in a panel, applied after drawing
#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    SelectPersonality(String),
    NewPersonality,
    EditPersonality(String),
    ManageAssets(String),
    DeletePersonality(String),
    SelectChat(String),
    NewChat,
    DeleteChat(String),
    ExportChat(String),
    Send,
    Regenerate(String),
    Replay(String),
    Stop(String),
    OpenSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_keys_do_not_collide_with_ids() {
        assert_eq!(card_key("p1"), "card:p1");
        assert_ne!(card_key("m1"), "m1");
    }
}

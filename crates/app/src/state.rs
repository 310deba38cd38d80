//! State management for the Aphrodisiac app
//!
//! Loading from the stores, draining background channels and applying
//! user actions. Model requests run on the tokio runtime and report back
//! through [`TaskResult`].

use chat_host::ChatService;
use eframe::egui;
use shared::events::RenderEvent;
use shared::records::Role;
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::modals::{AssetManager, Modal, PersonalityEditor, SettingsAction, SettingsDialog};
use crate::portrait::{load_texture, Portraits};
use crate::surface::PortraitSwap;
use crate::types::*;

impl AppState {
    pub fn new(
        ctx: egui::Context,
        service: Arc<ChatService>,
        runtime: Handle,
        render_rx: UnboundedReceiver<RenderEvent>,
        portrait_rx: Receiver<PortraitSwap>,
    ) -> Self {
        let (task_tx, task_rx) = channel();
        let asset_manager = AssetManager::new(service.stores().assets.clone());
        let tag_pattern = service.tag_syntax().pattern();
        let mut state = Self {
            ctx,
            service,
            runtime,
            render_rx,
            portrait_rx,
            task_tx,
            task_rx,
            personalities: Vec::new(),
            active_personality: None,
            chats: Vec::new(),
            current_chat: None,
            messages: Vec::new(),
            live_text: HashMap::new(),
            pending_chats: HashSet::new(),
            input_text: String::new(),
            status: None,
            scroll_to_bottom: false,
            tag_pattern,
            portraits: Portraits::default(),
            settings_dialog: SettingsDialog::default(),
            personality_editor: PersonalityEditor::default(),
            asset_manager,
        };
        state.reload_personalities();
        if let Some(first) = state.personalities.first().map(|p| p.id.clone()) {
            state.select_personality(&first);
        }
        state.reload_chats();
        if let Some(first) = state.chats.first().map(|c| c.id.clone()) {
            state.select_chat(&first);
        }
        state
    }

    fn report(&mut self, context: &str, error: impl std::fmt::Display) {
        tracing::warn!("{}: {}", context, error);
        self.status = Some(format!("{}: {}", context, error));
    }

    pub fn reload_personalities(&mut self) {
        match self.service.stores().personalities.list() {
            Ok(list) => {
                for p in &list {
                    let texture = p
                        .image
                        .as_deref()
                        .and_then(|bytes| load_texture(&self.ctx, &format!("default:{}", p.id), bytes));
                    self.portraits.set_default(&p.id, texture);
                }
                self.personalities = list;
            }
            Err(e) => self.report("Could not load personalities", e),
        }
    }

    pub fn reload_chats(&mut self) {
        match self.service.stores().chats.list_chats() {
            Ok(chats) => self.chats = chats,
            Err(e) => self.report("Could not load chats", e),
        }
    }

    /// Reload the current chat's messages, releasing portraits of messages
    /// that are gone.
    pub fn reload_messages(&mut self) {
        let messages = match &self.current_chat {
            Some(id) => match self.service.stores().chats.list_messages(id) {
                Ok(m) => m,
                Err(e) => {
                    self.report("Could not load messages", e);
                    return;
                }
            },
            None => Vec::new(),
        };
        let keep: HashSet<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        for old in &self.messages {
            if !keep.contains(old.id.as_str()) {
                self.portraits.clear(&old.id);
            }
        }
        self.messages = messages;
        self.scroll_to_bottom = true;
    }

    pub fn active_personality_name(&self) -> Option<&str> {
        let id = self.active_personality.as_deref()?;
        self.personalities
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.name.as_str())
    }

    pub fn is_pending(&self) -> bool {
        self.current_chat
            .as_ref()
            .is_some_and(|id| self.pending_chats.contains(id))
    }

    pub fn is_revealing(&self) -> bool {
        !self.live_text.is_empty()
    }

    /// Drain every channel. Called once per frame before drawing.
    pub fn poll(&mut self) {
        self.poll_render_events();
        self.poll_portraits();
        self.poll_tasks();
        self.poll_modals();
    }

    fn poll_render_events(&mut self) {
        while let Ok(event) = self.render_rx.try_recv() {
            if event.wants_scroll() {
                self.scroll_to_bottom = true;
            }
            match event {
                RenderEvent::Started { message_id } => {
                    if !self.messages.iter().any(|m| m.id == message_id) {
                        self.reload_messages();
                    }
                    self.live_text.insert(message_id, String::new());
                }
                RenderEvent::Revealed {
                    message_id, text, ..
                } => {
                    self.live_text.insert(message_id, text);
                }
                RenderEvent::Finished { message_id, text } => {
                    self.live_text.remove(&message_id);
                    if let Some(m) = self.messages.iter_mut().find(|m| m.id == message_id) {
                        m.text = text;
                    }
                }
                RenderEvent::Cancelled { message_id } => {
                    self.live_text.remove(&message_id);
                }
            }
        }
    }

    /// Show queued portrait swaps. A swap for a message or card that is no
    /// longer on screen is dropped, which releases its media.
    fn poll_portraits(&mut self) {
        while let Ok(swap) = self.portrait_rx.try_recv() {
            let on_message = self.messages.iter().any(|m| m.id == swap.message_id);
            let on_card = self.personalities.iter().any(|p| p.id == swap.character_id);
            if !on_message && !on_card {
                tracing::debug!("Dropping portrait swap for {}", swap.message_id);
                continue;
            }
            let texture = self.ctx.load_texture(
                swap.media.url(),
                swap.image,
                egui::TextureOptions::LINEAR,
            );
            let personality = Some(swap.character_id.as_str());
            if on_message {
                self.portraits
                    .swap(&swap.message_id, personality, texture.clone(), swap.media.clone());
            }
            if on_card {
                self.portraits.swap(
                    &card_key(&swap.character_id),
                    personality,
                    texture,
                    swap.media,
                );
            }
        }
    }

    fn poll_tasks(&mut self) {
        while let Ok(result) = self.task_rx.try_recv() {
            match result {
                TaskResult::Reply { chat_id, outcome } => {
                    self.pending_chats.remove(&chat_id);
                    if let Err(e) = outcome {
                        self.report("Reply failed", e);
                    }
                    self.reload_chats();
                    if self.current_chat.as_deref() == Some(chat_id.as_str()) {
                        self.reload_messages();
                    }
                }
            }
        }
    }

    fn poll_modals(&mut self) {
        if let Some(action) = self.settings_dialog.take_result().take_value() {
            let outcome = match action {
                SettingsAction::Save(settings) => self.service.update_settings(settings),
                SettingsAction::Reset => self.service.reset_settings().map(|_| ()),
            };
            self.tag_pattern = self.service.tag_syntax().pattern();
            match outcome {
                Ok(()) => self.status = Some("Settings saved".into()),
                Err(e) => self.report("Could not save settings", e),
            }
        }

        if let Some(personality) = self.personality_editor.take_result().take_value() {
            let stores = self.service.stores();
            let exists = matches!(stores.personalities.get(&personality.id), Ok(Some(_)));
            let outcome = if exists {
                stores.personalities.update(&personality)
            } else {
                stores.personalities.create(&personality)
            };
            match outcome {
                Ok(()) => {
                    self.reload_personalities();
                    if self.active_personality.is_none() || !exists {
                        self.select_personality(&personality.id);
                    }
                }
                Err(e) => self.report("Could not save personality", e),
            }
        }

        if self.asset_manager.take_changed() {
            if let Err(e) = self.service.refresh_character_tags() {
                self.report("Could not refresh tags", e);
            }
        }
    }

    pub fn select_personality(&mut self, id: &str) {
        match self.service.select_personality(Some(id)) {
            Ok(_) => self.active_personality = Some(id.to_string()),
            Err(e) => self.report("Could not select personality", e),
        }
    }

    pub fn select_chat(&mut self, id: &str) {
        self.current_chat = Some(id.to_string());
        self.reload_messages();
    }

    pub fn apply(&mut self, action: UiAction) {
        match action {
            UiAction::SelectPersonality(id) => self.select_personality(&id),
            UiAction::NewPersonality => self.personality_editor.open_new(),
            UiAction::EditPersonality(id) => {
                if let Some(p) = self.personalities.iter().find(|p| p.id == id) {
                    self.personality_editor.open_edit(p);
                }
            }
            UiAction::ManageAssets(id) => {
                if let Some(p) = self.personalities.iter().find(|p| p.id == id) {
                    self.asset_manager.open_for(&p.id, &p.name);
                }
            }
            UiAction::DeletePersonality(id) => self.delete_personality(&id),
            UiAction::SelectChat(id) => self.select_chat(&id),
            UiAction::NewChat => match self.service.new_chat() {
                Ok(chat) => {
                    self.reload_chats();
                    self.select_chat(&chat.id);
                }
                Err(e) => self.report("Could not create chat", e),
            },
            UiAction::DeleteChat(id) => self.delete_chat(&id),
            UiAction::ExportChat(id) => self.export_chat(&id),
            UiAction::Send => self.send(),
            UiAction::Regenerate(message_id) => self.regenerate(&message_id),
            UiAction::Replay(message_id) => {
                if let Err(e) = self.service.replay(&message_id) {
                    self.report("Could not replay", e);
                }
            }
            UiAction::Stop(message_id) => {
                self.service.cancel(&message_id);
            }
            UiAction::OpenSettings => self.settings_dialog.open_with(self.service.settings()),
        }
    }

    fn delete_personality(&mut self, id: &str) {
        if let Err(e) = self.service.delete_personality(id) {
            self.report("Could not delete personality", e);
            return;
        }
        self.portraits.clear(&card_key(id));
        self.portraits.set_default(id, None);
        if self.active_personality.as_deref() == Some(id) {
            self.active_personality = None;
        }
        if self.personality_editor.is_open() {
            self.personality_editor.close();
        }
        self.reload_personalities();
    }

    fn delete_chat(&mut self, id: &str) {
        if let Err(e) = self.service.delete_chat(id) {
            self.report("Could not delete chat", e);
            return;
        }
        if self.current_chat.as_deref() == Some(id) {
            self.current_chat = None;
            self.reload_messages();
        }
        self.reload_chats();
    }

    fn export_chat(&mut self, id: &str) {
        let html = match self.service.export_chat_html(id) {
            Ok(html) => html,
            Err(e) => return self.report("Could not export chat", e),
        };
        let Some(path) = rfd::FileDialog::new()
            .set_file_name("chat.html")
            .add_filter("HTML", &["html"])
            .save_file()
        else {
            return;
        };
        match std::fs::write(&path, html) {
            Ok(()) => self.status = Some(format!("Exported to {}", path.display())),
            Err(e) => self.report("Could not write export", e),
        }
    }

    /// Start a reply for the input text in the current chat, creating a
    /// chat first when none is open.
    fn send(&mut self) {
        let text = self.input_text.trim().to_string();
        if text.is_empty() || self.is_pending() {
            return;
        }
        if self.current_chat.is_none() {
            self.apply(UiAction::NewChat);
        }
        let Some(chat_id) = self.current_chat.clone() else {
            return;
        };
        self.input_text.clear();
        self.status = None;
        self.pending_chats.insert(chat_id.clone());

        let service = self.service.clone();
        let personality = self.active_personality.clone();
        let tx = self.task_tx.clone();
        let ctx = self.ctx.clone();
        self.runtime.spawn(async move {
            let outcome = service
                .send_message(&chat_id, personality.as_deref(), &text)
                .await
                .map_err(|e| format!("{:#}", e));
            let _ = tx.send(TaskResult::Reply { chat_id, outcome });
            ctx.request_repaint();
        });
    }

    fn regenerate(&mut self, message_id: &str) {
        let Some(chat_id) = self.current_chat.clone() else {
            return;
        };
        if self.is_pending() {
            return;
        }
        let is_model = self
            .messages
            .iter()
            .any(|m| m.id == message_id && m.role == Role::Model);
        if !is_model {
            return;
        }
        self.status = None;
        self.pending_chats.insert(chat_id.clone());

        let service = self.service.clone();
        let message_id = message_id.to_string();
        let tx = self.task_tx.clone();
        let ctx = self.ctx.clone();
        self.runtime.spawn(async move {
            let outcome = service
                .regenerate(&chat_id, &message_id)
                .await
                .map_err(|e| format!("{:#}", e));
            let _ = tx.send(TaskResult::Reply { chat_id, outcome });
            ctx.request_repaint();
        });
    }

    /// Draw whichever dialogs are open
    pub fn show_modals(&mut self, ctx: &egui::Context) {
        self.settings_dialog.update(ctx);
        self.personality_editor.update(ctx);
        self.asset_manager.update(ctx);
    }
}

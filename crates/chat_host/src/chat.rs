//! Chat orchestration: persistence, prompting, streaming and reveal.

use anyhow::{anyhow, bail, Context, Result};
use parking_lot::RwLock;
use providers::gemini::GeminiClient;
use providers::{ChatProvider, ChatRequest};
use services::{AssetRepository, ChatStore, Database, PersonalityStore, SettingsStore};
use shared::agent_api::{ChatMessage, StreamChunk};
use shared::command_tags::{split_reply, TagSyntax};
use shared::events::RenderEvent;
use shared::records::{Chat, Message, Personality, Role};
use shared::settings::AppSettings;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};

use crate::dispatcher::{Dispatcher, EffectSurface};
use crate::highlight::render_text_content_with;
use crate::prompts::get_system_prompt;
use crate::renderer::{RevealHandle, StreamingRenderer};
use crate::session::TagSession;
use crate::transient::TransientRegistry;
use crate::SharedSettings;

/// Builds the model backend from the current settings
pub type ProviderFactory =
    Arc<dyn Fn(&AppSettings) -> Result<Arc<dyn ChatProvider>> + Send + Sync>;

pub fn gemini_factory() -> ProviderFactory {
    Arc::new(|settings: &AppSettings| {
        let client = GeminiClient::from_settings(settings)?;
        Ok(Arc::new(client) as Arc<dyn ChatProvider>)
    })
}

/// Every store, sharing one database
#[derive(Clone)]
pub struct Stores {
    pub settings: SettingsStore,
    pub personalities: PersonalityStore,
    pub assets: AssetRepository,
    pub chats: ChatStore,
}

impl Stores {
    pub fn new(db: Database) -> Self {
        Self {
            settings: SettingsStore::new(db.clone()),
            personalities: PersonalityStore::new(db.clone()),
            assets: AssetRepository::new(db.clone()),
            chats: ChatStore::new(db),
        }
    }
}

pub struct ChatService {
    stores: Stores,
    settings: SharedSettings,
    session: Arc<TagSession>,
    renderer: StreamingRenderer,
    registry: TransientRegistry,
    provider_factory: ProviderFactory,
}

impl ChatService {
    pub fn new(
        db: Database,
        surface: Arc<dyn EffectSurface>,
        events: UnboundedSender<RenderEvent>,
        provider_factory: ProviderFactory,
    ) -> Result<Self> {
        let stores = Stores::new(db);
        let settings: SharedSettings = Arc::new(RwLock::new(stores.settings.get_settings()?));
        let session = Arc::new(TagSession::new());
        let registry = TransientRegistry::new();
        let dispatcher = Dispatcher::new(
            session.clone(),
            Arc::new(stores.assets.clone()),
            surface,
            settings.clone(),
            registry.clone(),
        );
        let renderer = StreamingRenderer::new(dispatcher, settings.clone(), events);
        Ok(Self {
            stores,
            settings,
            session,
            renderer,
            registry,
            provider_factory,
        })
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn session(&self) -> &Arc<TagSession> {
        &self.session
    }

    pub fn registry(&self) -> &TransientRegistry {
        &self.registry
    }

    pub fn settings(&self) -> AppSettings {
        self.settings.read().clone()
    }

    pub fn tag_syntax(&self) -> TagSyntax {
        TagSyntax::from_settings(&self.settings.read())
    }

    /// Persist new settings and apply them to the running session
    pub fn update_settings(&self, settings: AppSettings) -> Result<()> {
        self.stores.settings.save_settings(&settings)?;
        *self.settings.write() = settings;
        Ok(())
    }

    pub fn reset_settings(&self) -> Result<AppSettings> {
        let defaults = self.stores.settings.reset()?;
        *self.settings.write() = defaults.clone();
        Ok(defaults)
    }

    /// Make `id` the active character and reload its tag cache wholesale.
    pub fn select_personality(&self, id: Option<&str>) -> Result<Option<Personality>> {
        let Some(id) = id else {
            self.session.replace_character_tags(None, Vec::new());
            return Ok(None);
        };
        let personality = self
            .stores
            .personalities
            .get(id)?
            .ok_or_else(|| anyhow!("Personality not found: {}", id))?;
        let tags = self.stores.assets.tags_for_character(id)?;
        self.session
            .replace_character_tags(Some(id.to_string()), tags);
        tracing::info!("Selected personality {}", personality.name);
        Ok(Some(personality))
    }

    /// Reload the active character's tags, e.g. after its assets changed
    pub fn refresh_character_tags(&self) -> Result<()> {
        if let Some(id) = self.session.active_character() {
            let tags = self.stores.assets.tags_for_character(&id)?;
            self.session.replace_character_tags(Some(id), tags);
        }
        Ok(())
    }

    /// Delete a personality and its assets; deselects it if active
    pub fn delete_personality(&self, id: &str) -> Result<bool> {
        let deleted = self.stores.personalities.delete(id)?;
        if self.session.active_character().as_deref() == Some(id) {
            self.session.replace_character_tags(None, Vec::new());
        }
        Ok(deleted)
    }

    pub fn new_chat(&self) -> Result<Chat> {
        let chat = Chat::new();
        self.stores.chats.create_chat(&chat)?;
        tracing::info!("Created chat {}", chat.id);
        Ok(chat)
    }

    /// Delete a chat, stopping any reveal still running in it
    pub fn delete_chat(&self, chat_id: &str) -> Result<bool> {
        for message in self.stores.chats.list_messages(chat_id)? {
            self.renderer.cancel(&message.id);
            self.session.forget_message(&message.id);
        }
        self.stores.chats.delete_chat(chat_id)
    }

    /// Send a user message and stream the reply. Returns the stored model message.
    pub async fn send_message(
        &self,
        chat_id: &str,
        personality_id: Option<&str>,
        text: &str,
    ) -> Result<Message> {
        let text = text.trim();
        if text.is_empty() {
            bail!("Message is empty");
        }
        if personality_id.is_some() && self.session.active_character().as_deref() != personality_id
        {
            self.select_personality(personality_id)?;
        }

        let history = self.history(chat_id, None)?;
        self.stores
            .chats
            .append_message(&Message::new(chat_id, Role::User, text, None))?;

        let mut reply = Message::new(
            chat_id,
            Role::Model,
            "",
            personality_id.map(str::to_string),
        );
        self.stores.chats.append_message(&reply)?;

        let request = ChatRequest {
            system_prompt: self.system_prompt(personality_id)?,
            history,
            message: text.to_string(),
        };
        match self.stream_into(&reply, request).await {
            Ok(Some(final_text)) => reply.text = final_text,
            Ok(None) => {
                tracing::debug!("Reply {} was stopped before it started", reply.id);
            }
            Err(e) => {
                self.stores.chats.delete_message(&reply.id)?;
                return Err(e);
            }
        }
        Ok(reply)
    }

    /// Re-ask the model for `message_id`, dropping everything after it.
    pub async fn regenerate(&self, chat_id: &str, message_id: &str) -> Result<Message> {
        let mut target = self
            .stores
            .chats
            .get_message(message_id)?
            .filter(|m| m.chat_id == chat_id)
            .ok_or_else(|| anyhow!("Message not found: {}", message_id))?;
        if target.role != Role::Model {
            bail!("Only model replies can be regenerated");
        }

        let mut earlier = self.history(chat_id, Some(message_id))?;
        let prompt = match earlier.pop() {
            Some(last) if last.role == Role::User.as_str() => last.content,
            _ => bail!("No user message precedes {}", message_id),
        };

        let dropped = self.stores.chats.delete_messages_after(message_id)?;
        if dropped > 0 {
            tracing::debug!("Regenerate dropped {} later messages", dropped);
        }
        self.stores.chats.update_message_text(message_id, "")?;
        target.text.clear();

        let personality_id = target.personality_id.clone();
        if personality_id.is_some()
            && self.session.active_character() != personality_id
        {
            self.select_personality(personality_id.as_deref())?;
        }
        let request = ChatRequest {
            system_prompt: self.system_prompt(personality_id.as_deref())?,
            history: earlier,
            message: prompt,
        };
        if let Some(final_text) = self.stream_into(&target, request).await? {
            target.text = final_text;
        }
        Ok(target)
    }

    /// Reveal a stored message again; its tags fire again.
    pub fn replay(&self, message_id: &str) -> Result<RevealHandle> {
        let message = self
            .stores
            .chats
            .get_message(message_id)?
            .ok_or_else(|| anyhow!("Message not found: {}", message_id))?;
        self.renderer
            .reveal_text(&message.id, message.personality_id.clone(), &message.text)
    }

    pub fn cancel(&self, message_id: &str) -> bool {
        self.renderer.cancel(message_id)
    }

    /// Standalone HTML document of a chat with highlighted tags
    pub fn export_chat_html(&self, chat_id: &str) -> Result<String> {
        let chat = self
            .stores
            .chats
            .get_chat(chat_id)?
            .ok_or_else(|| anyhow!("Chat not found: {}", chat_id))?;
        let messages = self.stores.chats.list_messages(chat_id)?;
        let settings = self.settings();
        let pattern = TagSyntax::from_settings(&settings).pattern();

        let mut body = String::new();
        for message in &messages {
            let author = match message.role {
                Role::User => settings.user_name.clone(),
                Role::Model => message
                    .personality_id
                    .as_deref()
                    .and_then(|id| self.stores.personalities.get(id).ok().flatten())
                    .map(|p| p.name)
                    .unwrap_or_else(|| "Model".to_string()),
            };
            let (visible, commands) = match message.role {
                Role::User => (message.text.as_str(), None),
                Role::Model => split_reply(&message.text, &settings.triggers.separator),
            };
            let mut content = render_text_content_with(visible, &pattern);
            if let Some(block) = commands.filter(|b| !b.is_empty()) {
                content.push_str(&format!(
                    "<div class=\"commands\">{}</div>\n",
                    render_text_content_with(block, &pattern)
                ));
            }
            body.push_str(&format!(
                "<div class=\"message {role}\">\n<div class=\"author\">{author}</div>\n{content}</div>\n",
                role = message.role.as_str(),
                author = escape_html(&author),
            ));
        }

        Ok(format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
body {{ font-family: sans-serif; max-width: 48rem; margin: 2rem auto; }}
.message {{ margin-bottom: 1rem; }}
.author {{ font-weight: bold; }}
.command-tag {{ color: #b04fd0; font-family: monospace; }}
.commands {{ font-size: 0.85em; opacity: 0.7; }}
</style>
</head>
<body>
<h1>{title}</h1>
{body}</body>
</html>
"#,
            title = escape_html(&chat.title),
        ))
    }

    fn system_prompt(&self, personality_id: Option<&str>) -> Result<String> {
        let Some(id) = personality_id else {
            return Ok(String::new());
        };
        let personality = self
            .stores
            .personalities
            .get(id)?
            .ok_or_else(|| anyhow!("Personality not found: {}", id))?;
        Ok(get_system_prompt(
            &personality,
            &self.settings.read(),
            &self.session.character_tags(),
        ))
    }

    /// Chat history as model turns, stopping before `until` when given
    fn history(&self, chat_id: &str, until: Option<&str>) -> Result<Vec<ChatMessage>> {
        let mut out = Vec::new();
        for message in self.stores.chats.list_messages(chat_id)? {
            if until == Some(message.id.as_str()) {
                break;
            }
            if message.text.trim().is_empty() {
                continue;
            }
            out.push(match message.role {
                Role::User => ChatMessage::user(message.text),
                Role::Model => ChatMessage::model(message.text),
            });
        }
        Ok(out)
    }

    /// Stream a reply into `message` through the renderer and persist it.
    ///
    /// `Ok(None)` means the reveal was stopped before any text arrived and
    /// the empty message was deleted.
    async fn stream_into(&self, message: &Message, request: ChatRequest) -> Result<Option<String>> {
        let settings = self.settings();
        let provider = (self.provider_factory)(&settings)?;

        let (text_tx, text_rx) = mpsc::unbounded_channel::<String>();
        let reveal = self
            .renderer
            .reveal(&message.id, message.personality_id.clone(), text_rx)?;

        let mut received = String::new();
        let mut failure: Option<String> = None;

        if settings.stream_responses {
            let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<StreamChunk>();
            let stream = tokio::spawn(async move { provider.stream_chat(request, chunk_tx).await });
            while let Some(chunk) = chunk_rx.recv().await {
                match chunk {
                    StreamChunk::Text(text) => {
                        received.push_str(&text);
                        let _ = text_tx.send(text);
                    }
                    StreamChunk::Done { stop_reason } => {
                        tracing::debug!("Stream finished: {:?}", stop_reason);
                        break;
                    }
                    StreamChunk::Error(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            match stream.await.context("provider task")? {
                Ok(()) => {}
                Err(e) => failure = Some(e.to_string()),
            }
        } else {
            match provider.complete(request).await {
                Ok(text) => {
                    received.push_str(&text);
                    let _ = text_tx.send(text);
                }
                Err(e) => failure = Some(e.to_string()),
            }
        }
        drop(text_tx);

        if let Some(e) = failure {
            if received.is_empty() {
                self.renderer.cancel(&message.id);
                return Err(anyhow!("Model request failed: {}", e));
            }
            tracing::warn!("Reply {} ended early: {}", message.id, e);
        }

        // A stopped or restarted reveal still keeps what the model sent.
        let final_text = match reveal.finished().await {
            Some(text) => text,
            None if received.is_empty() => {
                self.stores.chats.delete_message(&message.id)?;
                self.session.forget_message(&message.id);
                tracing::debug!("Reveal of {} stopped before any text, removed", message.id);
                return Ok(None);
            }
            None => {
                tracing::debug!("Reveal of {} stopped early, keeping received text", message.id);
                received
            }
        };
        self.stores
            .chats
            .update_message_text(&message.id, &final_text)?;
        Ok(Some(final_text))
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

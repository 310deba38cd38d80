//! Personalities, chats and messages as stored locally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const TITLE_LEN: usize = 40;
pub const DEFAULT_CHAT_TITLE: &str = "New chat";

/// A persona the user can talk to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Personality {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Extra instructions appended to the system prompt
    pub prompt: String,
    /// Example lines showing how the persona talks
    #[serde(default)]
    pub tone_examples: Vec<String>,
    /// Default portrait, shown until an avatar tag swaps it
    #[serde(skip)]
    pub image: Option<Vec<u8>>,
    #[serde(default)]
    pub roleplay: bool,
    pub created_at: DateTime<Utc>,
}

impl Personality {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            prompt: String::new(),
            tone_examples: Vec::new(),
            image: None,
            roleplay: false,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: DEFAULT_CHAT_TITLE.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for Chat {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "model" | "assistant" => Some(Role::Model),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub role: Role,
    pub text: String,
    /// Personality that authored a model message
    pub personality_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        chat_id: impl Into<String>,
        role: Role,
        text: impl Into<String>,
        personality_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            chat_id: chat_id.into(),
            role,
            text: text.into(),
            personality_id,
            created_at: Utc::now(),
        }
    }
}

/// Derive a chat title from the first user message
pub fn title_from_message(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return DEFAULT_CHAT_TITLE.to_string();
    }
    let mut title: String = trimmed.chars().take(TITLE_LEN).collect::<String>();
    title = title.trim().to_string();
    if trimmed.chars().count() > TITLE_LEN {
        title.push_str("...");
    }
    title
}

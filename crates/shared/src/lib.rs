pub mod assets;
pub mod command_tags;
pub mod error;
pub mod events;
pub mod records;

pub mod settings {
    use serde::{Deserialize, Serialize};

    pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
    pub const DEFAULT_SEPARATOR: &str = "---";

    /// Tag bracket pair and the separator between reply text and command block
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct TriggerSettings {
        pub separator: String,
        pub symbol_start: String,
        pub symbol_end: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct AudioSettings {
        pub enabled: bool,
        /// Global playback volume, 0.0 - 1.0
        pub volume: f32,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct AppSettings {
        pub api_key: Option<String>,
        pub model: String,
        pub max_tokens: u32,
        pub temperature: f32,
        pub stream_responses: bool,
        /// Delay between revealed characters
        pub typewriter_delay_ms: u64,
        pub user_name: String,
        pub triggers: TriggerSettings,
        pub audio: AudioSettings,
    }

    impl Default for TriggerSettings {
        fn default() -> Self {
            Self {
                separator: DEFAULT_SEPARATOR.into(),
                symbol_start: "[".into(),
                symbol_end: "]".into(),
            }
        }
    }

    impl Default for AudioSettings {
        fn default() -> Self {
            Self {
                enabled: true,
                volume: 0.8,
            }
        }
    }

    impl Default for AppSettings {
        fn default() -> Self {
            Self {
                api_key: None,
                model: DEFAULT_MODEL.into(),
                max_tokens: 1000,
                temperature: 0.9,
                stream_responses: true,
                typewriter_delay_ms: 12,
                user_name: "User".into(),
                triggers: TriggerSettings::default(),
                audio: AudioSettings::default(),
            }
        }
    }
}

pub mod agent_api {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ChatMessage {
        pub role: String, // "user" | "model"
        pub content: String,
    }

    impl ChatMessage {
        pub fn user(content: impl Into<String>) -> Self {
            Self {
                role: "user".to_string(),
                content: content.into(),
            }
        }

        pub fn model(content: impl Into<String>) -> Self {
            Self {
                role: "model".to_string(),
                content: content.into(),
            }
        }
    }

    /// One piece of a streamed model response
    #[derive(Debug, Clone, PartialEq)]
    pub enum StreamChunk {
        Text(String),
        Done { stop_reason: Option<String> },
        Error(String),
    }
}

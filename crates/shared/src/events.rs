//! Events flowing from the streaming renderer to the UI.

use serde::{Deserialize, Serialize};

/// Renderer output for one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RenderEvent {
    /// A reveal (re)started; the message text was reset
    Started { message_id: String },
    /// One more character is visible. The UI should show `text`/`html`
    /// and keep the newest content scrolled into view.
    Revealed {
        message_id: String,
        text: String,
        html: String,
    },
    /// The reveal ran to the end of the stream
    Finished { message_id: String, text: String },
    /// The reveal was aborted (restart or explicit cancel)
    Cancelled { message_id: String },
}

impl RenderEvent {
    pub fn message_id(&self) -> &str {
        match self {
            RenderEvent::Started { message_id } => message_id,
            RenderEvent::Revealed { message_id, .. } => message_id,
            RenderEvent::Finished { message_id, .. } => message_id,
            RenderEvent::Cancelled { message_id } => message_id,
        }
    }

    /// Whether the UI should scroll to the newest content
    pub fn wants_scroll(&self) -> bool {
        matches!(self, RenderEvent::Revealed { .. } | RenderEvent::Finished { .. })
    }
}

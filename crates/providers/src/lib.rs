//! Generative-AI client used by the chat service.

pub mod gemini;
pub mod sse;

use anyhow::Result;
use async_trait::async_trait;
use shared::agent_api::{ChatMessage, StreamChunk};
use tokio::sync::mpsc::UnboundedSender;

/// One turn sent to the model: system prompt, prior history, new user message.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub system_prompt: String,
    pub history: Vec<ChatMessage>,
    pub message: String,
}

/// A chat-capable model backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Stream the reply into `tx`, ending with `StreamChunk::Done`.
    ///
    /// Contract: if the request fails *before* any chunk is sent, returns
    /// `Err(...)`. Once streaming starts, errors go through
    /// `StreamChunk::Error` and the method returns `Ok(())`.
    async fn stream_chat(&self, request: ChatRequest, tx: UnboundedSender<StreamChunk>)
        -> Result<()>;

    /// Whole reply in one call.
    async fn complete(&self, request: ChatRequest) -> Result<String>;
}

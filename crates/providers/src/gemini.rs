use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::agent_api::StreamChunk;
use shared::settings::AppSettings;
use std::env;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use crate::{ChatProvider, ChatRequest};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .pool_max_idle_per_host(2)
        .build()
        .unwrap_or_default()
});

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

impl GeminiResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().map(|p| p.text.as_str()).collect())
            .unwrap_or_default()
    }

    fn finish_reason(&self) -> Option<String> {
        self.candidates.first().and_then(|c| c.finish_reason.clone())
    }
}

/// Client for the Gemini `generateContent` API
pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    base_url: String,
}

impl GeminiClient {
    pub fn from_settings(settings: &AppSettings) -> Result<Self> {
        let api_key = match settings.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key.to_string(),
            // Try environment variable as fallback
            _ => env::var("GEMINI_API_KEY")
                .map_err(|_| anyhow!("No Gemini API key configured"))?,
        };
        Ok(Self {
            http: SHARED_HTTP.clone(),
            api_key,
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            base_url: env::var("GEMINI_BASE_URL").unwrap_or_else(|_| API_BASE.to_string()),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, request: &ChatRequest) -> GeminiRequest {
        let system_instruction = if request.system_prompt.trim().is_empty() {
            None
        } else {
            Some(GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: request.system_prompt.clone(),
                }],
            })
        };

        let mut contents: Vec<GeminiContent> = request
            .history
            .iter()
            .filter(|m| !m.content.is_empty())
            .map(|m| {
                // Gemini expects roles: "user" | "model".
                let role = match m.role.as_str() {
                    "assistant" | "model" => "model",
                    _ => "user",
                };
                GeminiContent {
                    role: Some(role.to_string()),
                    parts: vec![GeminiPart {
                        text: m.content.clone(),
                    }],
                }
            })
            .collect();
        contents.push(GeminiContent {
            role: Some("user".to_string()),
            parts: vec![GeminiPart {
                text: request.message.clone(),
            }],
        });

        GeminiRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                max_output_tokens: self.max_tokens,
                temperature: self.temperature,
            },
        }
    }

    async fn post(&self, url: String, request: &ChatRequest) -> Result<reqwest::Response> {
        let body = self.build_request(request);
        let resp = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let detail: String = body.trim().chars().take(800).collect();
            if detail.is_empty() {
                return Err(anyhow!("gemini error: {}", status));
            }
            return Err(anyhow!("gemini error: {}\n{}", status, detail));
        }
        Ok(resp)
    }

    /// Non-streaming generation, returns the whole reply.
    pub async fn generate(&self, request: &ChatRequest) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let resp = self.post(url, request).await?;
        let body: GeminiResponse = resp.json().await?;
        Ok(body.text())
    }

    /// Streaming generation over SSE.
    ///
    /// Connection errors before streaming starts are returned as `Err`.
    /// Once chunks flow, failures are sent as `StreamChunk::Error`.
    pub async fn generate_stream(
        &self,
        request: &ChatRequest,
        tx: &UnboundedSender<StreamChunk>,
    ) -> Result<()> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );
        let resp = self.post(url, request).await?;

        let mut parser = crate::sse::SseParser::new();
        let mut stream = resp.bytes_stream();
        let mut stop_reason = None;

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    let _ = tx.send(StreamChunk::Error(format!("stream read error: {}", e)));
                    return Ok(());
                }
            };
            for event in parser.feed(&bytes) {
                forward_event(&event.data, tx, &mut stop_reason);
            }
        }
        if let Some(event) = parser.finish() {
            forward_event(&event.data, tx, &mut stop_reason);
        }

        let _ = tx.send(StreamChunk::Done { stop_reason });
        Ok(())
    }
}

fn forward_event(
    data: &str,
    tx: &UnboundedSender<StreamChunk>,
    stop_reason: &mut Option<String>,
) {
    match serde_json::from_str::<GeminiResponse>(data) {
        Ok(resp) => {
            let text = resp.text();
            if !text.is_empty() {
                let _ = tx.send(StreamChunk::Text(text));
            }
            if let Some(reason) = resp.finish_reason() {
                *stop_reason = Some(reason);
            }
        }
        Err(e) => {
            tracing::warn!("Skipping malformed Gemini event: {}", e);
        }
    }
}

#[async_trait]
impl ChatProvider for GeminiClient {
    async fn stream_chat(
        &self,
        request: ChatRequest,
        tx: UnboundedSender<StreamChunk>,
    ) -> Result<()> {
        self.generate_stream(&request, &tx).await
    }

    async fn complete(&self, request: ChatRequest) -> Result<String> {
        self.generate(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::agent_api::ChatMessage;
    use tokio::sync::mpsc::unbounded_channel;

    fn client() -> GeminiClient {
        let settings = AppSettings {
            api_key: Some("test-key".into()),
            max_tokens: 256,
            temperature: 0.5,
            ..AppSettings::default()
        };
        GeminiClient::from_settings(&settings).unwrap()
    }

    #[test]
    fn request_maps_roles_and_config() {
        let request = ChatRequest {
            system_prompt: "You are Ava.".into(),
            history: vec![
                ChatMessage::user("hi"),
                ChatMessage {
                    role: "assistant".into(),
                    content: "hello [happy]".into(),
                },
                ChatMessage::model(""),
            ],
            message: "how are you?".into(),
        };
        let body = serde_json::to_value(client().build_request(&request)).unwrap();

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "You are Ava.");
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "how are you?");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
        assert_eq!(body["generationConfig"]["temperature"], 0.5);
    }

    #[test]
    fn empty_system_prompt_is_omitted() {
        let request = ChatRequest {
            system_prompt: "  ".into(),
            history: Vec::new(),
            message: "hi".into(),
        };
        let body = serde_json::to_value(client().build_request(&request)).unwrap();
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn stream_events_forward_text_and_stop_reason() {
        let (tx, mut rx) = unbounded_channel();
        let mut stop = None;
        forward_event(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hel"},{"text":"lo"}],"role":"model"}}]}"#,
            &tx,
            &mut stop,
        );
        forward_event(
            r#"{"candidates":[{"content":{"parts":[{"text":" [happy]"}]},"finishReason":"STOP"}]}"#,
            &tx,
            &mut stop,
        );
        forward_event("not json", &tx, &mut stop);

        assert_eq!(rx.try_recv().unwrap(), StreamChunk::Text("Hello".into()));
        assert_eq!(rx.try_recv().unwrap(), StreamChunk::Text(" [happy]".into()));
        assert!(rx.try_recv().is_err());
        assert_eq!(stop.as_deref(), Some("STOP"));
    }
}

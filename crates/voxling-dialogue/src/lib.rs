//! Language-model dialogue responder.
//!
//! Stateless request/response adapter to a chat-completions style API:
//! one system persona message plus the user text, no conversation history
//! across calls. The model's trailing emotion tag is stripped from the
//! visible reply and returned separately so the caller can drive the
//! avatar without another upstream call.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use voxling_core::config::DialogueConfig;
use voxling_core::persona;
use voxling_core::{Result, VoxlingError};

const DEFAULT_MODEL: &str = "doubao-1-5-pro-32k-250115";

/// Closed outcome of one dialogue exchange.
///
/// `Failure` carries the upstream error; the orchestrator substitutes the
/// user-facing apology and forces the worried emotion.
#[derive(Debug, Clone)]
pub enum DialogueResult {
    Success { reply: String, emotion: u8 },
    Failure { message: String },
}

impl DialogueResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Dialogue seam for the orchestrator; tests substitute a mock.
#[async_trait]
pub trait DialogueEngine: Send + Sync {
    /// Send one system + user exchange. Never panics or errors; failures
    /// come back as [`DialogueResult::Failure`].
    async fn respond(&self, user_text: &str, system_prompt: Option<&str>) -> DialogueResult;
}

pub struct DialogueClient {
    config: DialogueConfig,
    client: reqwest::Client,
}

impl DialogueClient {
    pub fn new(config: DialogueConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    async fn request_completion(&self, system_prompt: &str, user_text: &str) -> Result<String> {
        let api_key = self
            .config
            .resolve_api_key()
            .ok_or_else(|| VoxlingError::Config("no dialogue API key configured".into()))?;

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let model = self.config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        let body = build_chat_body(model, system_prompt, user_text);

        debug!(%url, model, "requesting dialogue completion");

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| VoxlingError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(VoxlingError::Upstream {
                code: u32::from(status.as_u16()),
                message: body,
            });
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| VoxlingError::Protocol(format!("chat response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| VoxlingError::Protocol("chat response had no choices".into()))
    }
}

#[async_trait]
impl DialogueEngine for DialogueClient {
    async fn respond(&self, user_text: &str, system_prompt: Option<&str>) -> DialogueResult {
        if user_text.trim().is_empty() {
            return DialogueResult::Failure {
                message: "empty user text".into(),
            };
        }

        let prompt = match system_prompt {
            Some(p) => p.to_string(),
            None => persona::system_prompt(None),
        };

        match self.request_completion(&prompt, user_text).await {
            Ok(raw) => {
                let (reply, emotion) = persona::parse_emotion_tag(&raw);
                debug!(emotion, chars = reply.len(), "dialogue reply parsed");
                DialogueResult::Success { reply, emotion }
            }
            Err(e) => {
                warn!(error = %e, "dialogue upstream failed");
                DialogueResult::Failure {
                    message: e.to_string(),
                }
            }
        }
    }
}

fn build_chat_body(model: &str, system_prompt: &str, user_text: &str) -> serde_json::Value {
    json!({
        "model": model,
        "messages": [
            { "role": "system", "content": system_prompt },
            { "role": "user", "content": user_text },
        ],
    })
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

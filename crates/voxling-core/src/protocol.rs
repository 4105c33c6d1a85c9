//! Client session protocol — JSON-framed messages over the WebSocket.
//!
//! One JSON object per message, discriminated by a `type` tag. Clients
//! send `audio`, `text`, or `ping`; everything else flows server → client.

use serde::{Deserialize, Serialize};

/// Client → server messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Recorded audio, base64-encoded.
    #[serde(rename = "audio")]
    Audio { audio: String },

    /// Typed text input.
    #[serde(rename = "text")]
    Text { message: String },

    /// Liveness probe; answered with `pong` regardless of in-flight turns.
    #[serde(rename = "ping")]
    Ping,
}

/// Server → client messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "welcome")]
    Welcome { message: String },

    /// Free-form progress line emitted between pipeline stages.
    #[serde(rename = "status")]
    Status { message: String },

    /// Recognized transcript for an audio turn.
    #[serde(rename = "asr_result")]
    AsrResult { message: String },

    #[serde(rename = "assistant_reply")]
    AssistantReply {
        message: String,
        emotion_value: u8,
        emotion_img: String,
        /// `null` when synthesis failed or was skipped; the text reply
        /// is still delivered.
        audio_url: Option<String>,
        user_message: String,
    },

    #[serde(rename = "pong")]
    Pong { timestamp: f64 },

    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerMessage {
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status { message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }
}

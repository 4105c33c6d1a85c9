//! Streaming client for the speech-synthesis upstream.
//!
//! One gzip-compressed JSON request frame per call, then audio payload
//! chunks are accumulated in arrival order until a negative sequence
//! number. The finished clip is persisted under a generated unique name.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::{debug, info};
use uuid::Uuid;

use voxling_core::config::TtsConfig;
use voxling_core::names::unique_media_filename;
use voxling_core::{Result, VoxlingError};

use crate::frame::{
    encode_request_frame, gzip_compress, CompressionMethod, MessageFlags, MessageType,
    ResponseBody, SerializationMethod,
};
use crate::transport::{recv_frame, send_frame, transport_err};

/// A persisted synthesis result.
#[derive(Debug, Clone)]
pub struct TtsAudio {
    pub filename: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Synthesis seam for the orchestrator; tests substitute a mock.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<TtsAudio>;
}

pub struct TtsClient {
    config: TtsConfig,
    reply_dir: PathBuf,
}

impl TtsClient {
    pub fn new(config: TtsConfig, reply_dir: PathBuf) -> Self {
        Self { config, reply_dir }
    }
}

#[async_trait]
impl SpeechSynthesizer for TtsClient {
    async fn synthesize(&self, text: &str) -> Result<TtsAudio> {
        if text.trim().is_empty() {
            return Err(VoxlingError::Validation("empty synthesis text".into()));
        }

        let request = build_synthesis_request(&self.config, text);
        let payload = gzip_compress(request.to_string().as_bytes())?;
        let frame = encode_request_frame(
            MessageType::FullClientRequest,
            MessageFlags::NoSequence,
            SerializationMethod::Json,
            CompressionMethod::Gzip,
            None,
            &payload,
        );

        let mut ws_request = self
            .config
            .url()
            .into_client_request()
            .map_err(transport_err)?;
        if let Some(token) = self.config.resolve_token() {
            let value = HeaderValue::from_str(&format!("Bearer; {token}"))
                .map_err(|e| VoxlingError::Validation(format!("authorization header: {e}")))?;
            ws_request.headers_mut().insert("Authorization", value);
        }

        let (mut ws, _) = connect_async(ws_request).await.map_err(transport_err)?;
        send_frame(&mut ws, frame).await?;

        let mut audio: Vec<u8> = Vec::new();
        loop {
            let Some(frame) = recv_frame(&mut ws).await? else {
                return Err(VoxlingError::Transport(
                    "synthesis connection closed mid-stream".into(),
                ));
            };
            match frame.body {
                ResponseBody::Ack => continue,
                ResponseBody::Chunk { sequence, data } => {
                    audio.extend_from_slice(&data);
                    if sequence < 0 {
                        break;
                    }
                }
                ResponseBody::Info(message) => {
                    debug!(%message, "frontend message from synthesis upstream");
                }
                ResponseBody::UpstreamError { code, message } => {
                    return Err(VoxlingError::Upstream { code, message });
                }
            }
        }
        let _ = ws.close(None).await;

        if audio.is_empty() {
            // Empty-output policy: a clean stream with no audio is a failure.
            return Err(VoxlingError::Upstream {
                code: 0,
                message: "synthesis produced no audio".into(),
            });
        }

        let filename = unique_media_filename("reply", "mp3");
        let path = self.reply_dir.join(&filename);
        tokio::fs::write(&path, &audio).await?;
        info!(%filename, bytes = audio.len(), "synthesized reply audio");

        Ok(TtsAudio {
            filename,
            path,
            bytes: audio.len() as u64,
        })
    }
}

fn build_synthesis_request(config: &TtsConfig, text: &str) -> serde_json::Value {
    json!({
        "app": {
            "appid": config.app_id.as_deref().unwrap_or_default(),
            "token": "access_token",
            "cluster": config.cluster,
        },
        "user": { "uid": "voxling-gateway" },
        "audio": {
            "voice_type": config.voice_type.as_deref().unwrap_or_default(),
            "encoding": "mp3",
            "speed_ratio": config.speed_ratio,
            "volume_ratio": config.volume_ratio,
            "pitch_ratio": config.pitch_ratio,
        },
        "request": {
            "reqid": Uuid::new_v4().to_string(),
            "text": text,
            "text_type": "plain",
            "operation": "submit",
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesis_request_shape() {
        let config = TtsConfig {
            voice_type: Some("warm_fox".into()),
            ..TtsConfig::default()
        };
        let request = build_synthesis_request(&config, "hello");

        assert_eq!(request["request"]["operation"], "submit");
        assert_eq!(request["request"]["text"], "hello");
        assert_eq!(request["audio"]["encoding"], "mp3");
        assert_eq!(request["audio"]["voice_type"], "warm_fox");
        assert_eq!(request["app"]["cluster"], "volcano_icl");
    }

    #[test]
    fn test_fresh_request_id_per_call() {
        let config = TtsConfig::default();
        let a = build_synthesis_request(&config, "hi");
        let b = build_synthesis_request(&config, "hi");
        assert_ne!(a["request"]["reqid"], b["request"]["reqid"]);
    }

    #[tokio::test]
    async fn test_empty_text_rejected_before_connecting() {
        let client = TtsClient::new(TtsConfig::default(), PathBuf::from("/tmp"));
        let err = client.synthesize("   ").await.unwrap_err();
        assert!(matches!(err, VoxlingError::Validation(_)));
    }
}

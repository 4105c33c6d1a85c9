//! Streaming client for the speech-recognition upstream.
//!
//! One connection per `execute` call: a gzip-compressed JSON setup request
//! describing the audio, then fixed-duration audio chunks with ascending
//! sequence numbers, the last one negated. After every send exactly one
//! response frame is received, decoded, and yielded through the returned
//! stream; the stream ends on a terminal frame or when the upstream goes
//! away.

use std::path::Path;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::debug;
use uuid::Uuid;

use voxling_core::config::AsrConfig;
use voxling_core::{Result, VoxlingError};

use crate::frame::{
    encode_request_frame, gzip_compress, gzip_decompress, CompressionMethod, MessageFlags,
    MessageType, ResponseBody, ResponseFrame, SerializationMethod,
};
use crate::segment::segment_audio;
use crate::transport::{recv_frame, send_frame, transport_err, WsConnection};

/// One decoded response from the recognition stream.
#[derive(Debug, Clone)]
pub struct AsrResponse {
    pub is_last: bool,
    /// Decoded JSON payload; `None` for acknowledgment and informational
    /// frames.
    pub payload: Option<serde_json::Value>,
}

impl AsrResponse {
    /// Recognized text carried by this frame, when present.
    pub fn text(&self) -> Option<&str> {
        self.payload.as_ref()?.get("result")?.get("text")?.as_str()
    }
}

pub type AsrStream = Pin<Box<dyn Stream<Item = Result<AsrResponse>> + Send>>;

/// Drain a recognition stream, concatenating recognized text across all
/// yielded frames. Stops at the terminal frame or end of stream.
pub async fn collect_transcript(stream: &mut AsrStream) -> Result<String> {
    use futures::StreamExt;

    let mut transcript = String::new();
    while let Some(item) = stream.next().await {
        let response = item?;
        if let Some(text) = response.text() {
            transcript.push_str(text);
        }
        if response.is_last {
            break;
        }
    }
    Ok(transcript.trim().to_string())
}

/// Transport seam for the orchestrator; tests substitute a mock.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Stream a local audio resource through the recognition upstream.
    /// A fresh connection is opened per call.
    async fn execute(&self, audio_path: &Path) -> Result<AsrStream>;
}

pub struct AsrClient {
    config: AsrConfig,
}

impl AsrClient {
    pub fn new(config: AsrConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SpeechRecognizer for AsrClient {
    async fn execute(&self, audio_path: &Path) -> Result<AsrStream> {
        let audio = tokio::fs::read(audio_path).await?;
        debug!(path = %audio_path.display(), bytes = audio.len(), "starting recognition upload");

        let config = self.config.clone();
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            // The task owns the socket; any failure is surfaced as the
            // final stream item.
            if let Err(e) = run_recognition(&config, &audio, &tx).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

async fn run_recognition(
    config: &AsrConfig,
    audio: &[u8],
    tx: &mpsc::Sender<Result<AsrResponse>>,
) -> Result<()> {
    let mut ws = connect(config).await?;

    let setup = build_recognition_request(config);
    let payload = gzip_compress(setup.to_string().as_bytes())?;
    let frame = encode_request_frame(
        MessageType::FullClientRequest,
        MessageFlags::NoSequence,
        SerializationMethod::Json,
        CompressionMethod::Gzip,
        None,
        &payload,
    );
    send_frame(&mut ws, frame).await?;
    if !forward_response(&mut ws, tx).await? {
        let _ = ws.close(None).await;
        return Ok(());
    }

    for segment in segment_audio(audio, config.segment_bytes()) {
        let (flags, sequence) = if segment.is_last {
            (MessageFlags::LastMessage, -segment.sequence)
        } else {
            (MessageFlags::PositiveSequence, segment.sequence)
        };
        let frame = encode_request_frame(
            MessageType::AudioOnlyRequest,
            flags,
            SerializationMethod::None,
            CompressionMethod::None,
            Some(sequence),
            &segment.data,
        );
        send_frame(&mut ws, frame).await?;
        if !forward_response(&mut ws, tx).await? {
            break;
        }
    }

    let _ = ws.close(None).await;
    Ok(())
}

/// Receive one frame and hand it to the caller. Returns `Ok(false)` when
/// the stream is finished (terminal frame, upstream close, caller gone).
async fn forward_response(
    ws: &mut WsConnection,
    tx: &mpsc::Sender<Result<AsrResponse>>,
) -> Result<bool> {
    let Some(frame) = recv_frame(ws).await? else {
        debug!("recognition upstream closed the connection");
        return Ok(false);
    };
    if let ResponseBody::UpstreamError { code, message } = &frame.body {
        return Err(VoxlingError::Upstream {
            code: *code,
            message: message.clone(),
        });
    }

    let last = frame.is_last();
    let response = decode_asr_response(frame)?;
    if tx.send(Ok(response)).await.is_err() {
        return Ok(false);
    }
    Ok(!last)
}

fn decode_asr_response(frame: ResponseFrame) -> Result<AsrResponse> {
    let is_last = frame.is_last();
    let compression = frame.compression;
    let payload = match frame.body {
        ResponseBody::Chunk { data, .. } if !data.is_empty() => {
            let raw = match compression {
                CompressionMethod::Gzip => gzip_decompress(&data)?,
                _ => data,
            };
            let value = serde_json::from_slice(&raw)
                .map_err(|e| VoxlingError::Protocol(format!("recognition payload: {e}")))?;
            Some(value)
        }
        ResponseBody::Info(message) => {
            debug!(%message, "frontend message from recognition upstream");
            None
        }
        _ => None,
    };
    Ok(AsrResponse { is_last, payload })
}

fn build_recognition_request(config: &AsrConfig) -> serde_json::Value {
    json!({
        "user": { "uid": "voxling-gateway" },
        "audio": {
            "format": "mp3",
            "rate": 16000,
            "bits": 16,
            "channel": 1,
        },
        "request": {
            "reqid": Uuid::new_v4().to_string(),
            "model_name": "bigmodel",
            "enable_punc": true,
            "segment_duration": config.segment_duration_ms,
        },
    })
}

async fn connect(config: &AsrConfig) -> Result<WsConnection> {
    let mut request = config
        .url
        .as_str()
        .into_client_request()
        .map_err(transport_err)?;

    let headers = request.headers_mut();
    if let Some(key) = config.resolve_app_key() {
        headers.insert("X-Api-App-Key", header_value(&key)?);
    }
    if let Some(key) = config.resolve_access_key() {
        headers.insert("X-Api-Access-Key", header_value(&key)?);
    }
    headers.insert("X-Api-Resource-Id", header_value(&config.resource_id)?);
    headers.insert("X-Api-Connect-Id", header_value(&Uuid::new_v4().to_string())?);

    let (ws, _) = connect_async(request).await.map_err(transport_err)?;
    Ok(ws)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| VoxlingError::Validation(format!("upstream header value: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_frame;

    #[test]
    fn test_recognition_request_shape() {
        let request = build_recognition_request(&AsrConfig::default());
        assert_eq!(request["audio"]["format"], "mp3");
        assert_eq!(request["request"]["segment_duration"], 200);
        assert!(request["request"]["reqid"].is_string());
    }

    #[test]
    fn test_text_extraction() {
        let response = AsrResponse {
            is_last: false,
            payload: Some(json!({ "result": { "text": "hello there" } })),
        };
        assert_eq!(response.text(), Some("hello there"));

        let no_result = AsrResponse {
            is_last: true,
            payload: Some(json!({ "code": 0 })),
        };
        assert_eq!(no_result.text(), None);
    }

    #[test]
    fn test_decode_gzip_json_chunk() {
        let body = json!({ "result": { "text": "hi" } }).to_string();
        let compressed = gzip_compress(body.as_bytes()).unwrap();
        let wire = encode_request_frame(
            MessageType::AudioOnlyResponse,
            MessageFlags::NegativeSequence,
            SerializationMethod::Json,
            CompressionMethod::Gzip,
            Some(-2),
            &compressed,
        );

        let frame = crate::frame::decode_response_frame(&wire).unwrap();
        let response = decode_asr_response(frame).unwrap();
        assert!(response.is_last);
        assert_eq!(response.text(), Some("hi"));
    }

    #[test]
    fn test_decode_malformed_chunk_is_protocol_error() {
        let wire = encode_request_frame(
            MessageType::AudioOnlyResponse,
            MessageFlags::PositiveSequence,
            SerializationMethod::Json,
            CompressionMethod::None,
            Some(1),
            b"not json",
        );
        let frame = crate::frame::decode_response_frame(&wire).unwrap();
        assert!(matches!(
            decode_asr_response(frame),
            Err(VoxlingError::Protocol(_))
        ));
    }

    #[test]
    fn test_ack_frame_decodes_to_empty_response() {
        let wire = encode_frame(
            MessageType::AudioOnlyResponse,
            MessageFlags::NoSequence,
            SerializationMethod::None,
            CompressionMethod::None,
            &[],
        );
        let frame = crate::frame::decode_response_frame(&wire).unwrap();
        let response = decode_asr_response(frame).unwrap();
        assert!(!response.is_last);
        assert!(response.payload.is_none());
    }
}

//! Session orchestrator — one client turn through ASR → dialogue → TTS.
//!
//! Stages run strictly in order, each gated on the success and non-empty
//! output of the previous one. ASR failure aborts the turn with no reply
//! (never feed garbage transcripts to the language model); dialogue
//! failure degrades to a fixed apology; TTS failure only drops the audio.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use voxling_core::config::StorageConfig;
use voxling_core::names::unique_media_filename;
use voxling_core::persona;
use voxling_core::protocol::ServerMessage;
use voxling_core::{Result, VoxlingError};
use voxling_dialogue::DialogueResult;
use voxling_speech::asr::collect_transcript;
use voxling_speech::SpeechRecognizer;

use crate::state::GatewayState;

/// Outcome of one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    NotAttempted,
    Succeeded,
    Failed,
}

/// The unit of orchestration for one client exchange. Mutated in place by
/// each stage and discarded once the final reply is sent.
#[derive(Debug)]
pub struct SessionTurn {
    pub recognized_text: String,
    pub reply: String,
    pub emotion: u8,
    pub audio_url: Option<String>,
    pub asr: StageStatus,
    pub dialogue: StageStatus,
    pub tts: StageStatus,
}

impl SessionTurn {
    fn new() -> Self {
        Self {
            recognized_text: String::new(),
            reply: String::new(),
            emotion: persona::EMOTION_NEUTRAL,
            audio_url: None,
            asr: StageStatus::NotAttempted,
            dialogue: StageStatus::NotAttempted,
            tts: StageStatus::NotAttempted,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<String>;

/// Serialize and queue a message for the owning connection. A closed
/// channel means the client is gone; the turn just runs out.
pub fn send_message(events: &EventSender, message: &ServerMessage) {
    if let Ok(json) = serde_json::to_string(message) {
        let _ = events.send(json);
    }
}

/// Drive a full audio turn: persist the upload, recognize, then hand over
/// to the dialogue/synthesis half.
pub async fn run_audio_turn(
    state: &GatewayState,
    events: &EventSender,
    audio: Vec<u8>,
) -> SessionTurn {
    let mut turn = SessionTurn::new();

    send_message(events, &ServerMessage::status("Saving your recording..."));
    let path = match save_upload(&state.config.storage(), &audio).await {
        Ok(path) => path,
        Err(e) => {
            warn!(error = %e, "failed to store uploaded audio");
            send_message(events, &ServerMessage::error(format!("Failed to store audio: {e}")));
            return turn;
        }
    };

    send_message(events, &ServerMessage::status("Recognizing speech..."));
    let timeout = Duration::from_secs(state.config.asr().timeout_secs);
    match transcribe(state.asr.as_ref(), &path, timeout).await {
        Ok(text) => {
            turn.asr = StageStatus::Succeeded;
            turn.recognized_text = text;
        }
        Err(e) => {
            turn.asr = StageStatus::Failed;
            warn!(error = %e, "speech recognition failed");
            send_message(
                events,
                &ServerMessage::error(format!("Speech recognition failed: {e}")),
            );
            return turn;
        }
    }

    send_message(
        events,
        &ServerMessage::AsrResult {
            message: turn.recognized_text.clone(),
        },
    );

    if turn.recognized_text.trim().is_empty() {
        // Deliberate policy: an empty transcript ends the turn without a
        // reply rather than prompting the model with silence.
        send_message(events, &ServerMessage::status(persona::NO_SPEECH_STATUS));
        return turn;
    }

    let user_text = turn.recognized_text.clone();
    complete_turn(state, events, &mut turn, user_text).await;
    turn
}

/// Drive a text turn: the ASR stage is skipped entirely.
pub async fn run_text_turn(
    state: &GatewayState,
    events: &EventSender,
    text: String,
) -> SessionTurn {
    let mut turn = SessionTurn::new();
    turn.recognized_text = text.clone();
    complete_turn(state, events, &mut turn, text).await;
    turn
}

/// Dialogue + synthesis, shared by both input kinds.
async fn complete_turn(
    state: &GatewayState,
    events: &EventSender,
    turn: &mut SessionTurn,
    user_text: String,
) {
    send_message(events, &ServerMessage::status("Thinking about a reply..."));

    let prompt_override = state
        .config
        .persona
        .as_ref()
        .and_then(|p| p.system_prompt.clone());
    let dialogue_timeout = Duration::from_secs(state.config.dialogue().timeout_secs);

    let outcome = tokio::time::timeout(
        dialogue_timeout,
        state.dialogue.respond(&user_text, prompt_override.as_deref()),
    )
    .await;

    match outcome {
        Ok(DialogueResult::Success { reply, emotion }) => {
            turn.dialogue = StageStatus::Succeeded;
            turn.reply = reply;
            turn.emotion = emotion;
        }
        Ok(DialogueResult::Failure { message }) => {
            turn.dialogue = StageStatus::Failed;
            warn!(%message, "dialogue failed; degrading to apology");
            turn.reply = persona::APOLOGY_REPLY.to_string();
            turn.emotion = persona::EMOTION_WORRIED;
        }
        Err(_) => {
            turn.dialogue = StageStatus::Failed;
            warn!("dialogue timed out; degrading to apology");
            turn.reply = persona::APOLOGY_REPLY.to_string();
            turn.emotion = persona::EMOTION_WORRIED;
        }
    }

    // Synthesis runs for any non-empty reply, apology included. Failure
    // here drops only the audio, never the text reply.
    if !turn.reply.trim().is_empty() {
        send_message(events, &ServerMessage::status("Synthesizing the voice reply..."));
        let tts_timeout = Duration::from_secs(state.config.tts().timeout_secs);
        match tokio::time::timeout(tts_timeout, state.tts.synthesize(&turn.reply)).await {
            Ok(Ok(audio)) => {
                turn.tts = StageStatus::Succeeded;
                turn.audio_url = Some(format!("/api/audio/{}", audio.filename));
            }
            Ok(Err(e)) => {
                turn.tts = StageStatus::Failed;
                warn!(error = %e, "synthesis failed; replying without audio");
            }
            Err(_) => {
                turn.tts = StageStatus::Failed;
                warn!("synthesis timed out; replying without audio");
            }
        }
    }

    send_message(
        events,
        &ServerMessage::AssistantReply {
            message: turn.reply.clone(),
            emotion_value: turn.emotion,
            emotion_img: persona::emotion_image_path(turn.emotion),
            audio_url: turn.audio_url.clone(),
            user_message: user_text,
        },
    );
}

/// Run the recognition stream to completion under a bounded wait,
/// concatenating recognized text across frames.
async fn transcribe(
    asr: &dyn SpeechRecognizer,
    path: &Path,
    timeout: Duration,
) -> Result<String> {
    let collect = async {
        let mut stream = asr.execute(path).await?;
        collect_transcript(&mut stream).await
    };
    tokio::time::timeout(timeout, collect)
        .await
        .map_err(|_| VoxlingError::Transport("speech recognition timed out".into()))?
}

async fn save_upload(storage: &StorageConfig, audio: &[u8]) -> Result<PathBuf> {
    let filename = unique_media_filename("voice", "webm");
    let path = storage.upload_dir.join(&filename);
    tokio::fs::write(&path, audio).await?;
    info!(%filename, bytes = audio.len(), "stored uploaded audio");
    Ok(path)
}

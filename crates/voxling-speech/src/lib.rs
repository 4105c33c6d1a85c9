//! Speech pipeline — binary wire codec, ASR and TTS streaming clients.

pub mod asr;
pub mod frame;
pub mod segment;
mod transport;
pub mod tts;

pub use asr::{AsrClient, AsrResponse, AsrStream, SpeechRecognizer};
pub use tts::{SpeechSynthesizer, TtsAudio, TtsClient};

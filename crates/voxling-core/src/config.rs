//! Configuration loading and secret resolution.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VoxlingError};

/// Top-level Voxling configuration.
///
/// Every section is optional; accessors fall back to defaults so a missing
/// or empty config file yields a fully usable (if credential-less) setup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub asr: Option<AsrConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts: Option<TtsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dialogue: Option<DialogueConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona: Option<PersonaConfig>,
}

impl Config {
    /// Load configuration from a JSON file. A missing file is not an
    /// error — defaults apply.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| VoxlingError::Config(format!("{}: {e}", path.display())))
    }

    /// Default config file location.
    pub fn default_path() -> PathBuf {
        PathBuf::from("voxling.json")
    }

    pub fn gateway(&self) -> GatewayConfig {
        self.gateway.clone().unwrap_or_default()
    }

    pub fn asr(&self) -> AsrConfig {
        self.asr.clone().unwrap_or_default()
    }

    pub fn tts(&self) -> TtsConfig {
        self.tts.clone().unwrap_or_default()
    }

    pub fn dialogue(&self) -> DialogueConfig {
        self.dialogue.clone().unwrap_or_default()
    }

    pub fn storage(&self) -> StorageConfig {
        self.storage.clone().unwrap_or_default()
    }
}

/// WebSocket session server + companion file server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Port of the static file service (reply audio + emotion images).
    #[serde(default = "default_files_port")]
    pub files_port: u16,

    /// Upper bound on one inbound client message.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: None,
            port: default_gateway_port(),
            files_port: default_files_port(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

impl GatewayConfig {
    pub fn bind_addr(&self) -> String {
        self.bind.clone().unwrap_or_else(|| "0.0.0.0".to_string())
    }
}

fn default_gateway_port() -> u16 {
    8765
}

fn default_files_port() -> u16 {
    5000
}

fn default_max_message_bytes() -> usize {
    16 * 1024 * 1024
}

/// Streaming speech-recognition upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrConfig {
    #[serde(default = "default_asr_url")]
    pub url: String,

    /// Duration of one uploaded audio segment.
    #[serde(default = "default_segment_duration_ms")]
    pub segment_duration_ms: u64,

    /// Approximate source byte rate used to size segments.
    #[serde(default = "default_byte_rate")]
    pub byte_rate: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key_env: Option<String>,

    #[serde(default = "default_asr_resource_id")]
    pub resource_id: String,

    #[serde(default = "default_asr_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            url: default_asr_url(),
            segment_duration_ms: default_segment_duration_ms(),
            byte_rate: default_byte_rate(),
            app_key: None,
            app_key_env: None,
            access_key: None,
            access_key_env: None,
            resource_id: default_asr_resource_id(),
            timeout_secs: default_asr_timeout_secs(),
        }
    }
}

impl AsrConfig {
    pub fn resolve_app_key(&self) -> Option<String> {
        resolve_secret_field(&self.app_key, &self.app_key_env)
    }

    pub fn resolve_access_key(&self) -> Option<String> {
        resolve_secret_field(&self.access_key, &self.access_key_env)
    }

    /// Bytes carried by one segment of `segment_duration_ms`.
    pub fn segment_bytes(&self) -> usize {
        let bytes = u64::from(self.byte_rate) * self.segment_duration_ms / 1000;
        (bytes as usize).max(1)
    }
}

fn default_asr_url() -> String {
    "wss://openspeech.bytedance.com/api/v3/sauc/bigmodel_nostream".to_string()
}

fn default_segment_duration_ms() -> u64 {
    200
}

fn default_byte_rate() -> u32 {
    32_000
}

fn default_asr_resource_id() -> String {
    "volc.bigasr.sauc.duration".to_string()
}

fn default_asr_timeout_secs() -> u64 {
    30
}

/// Streaming speech-synthesis upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default = "default_tts_host")]
    pub host: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    #[serde(default = "default_tts_cluster")]
    pub cluster: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_type: Option<String>,

    #[serde(default = "default_ratio")]
    pub speed_ratio: f64,

    #[serde(default = "default_ratio")]
    pub volume_ratio: f64,

    #[serde(default = "default_ratio")]
    pub pitch_ratio: f64,

    #[serde(default = "default_tts_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            host: default_tts_host(),
            app_id: None,
            token: None,
            token_env: None,
            cluster: default_tts_cluster(),
            voice_type: None,
            speed_ratio: default_ratio(),
            volume_ratio: default_ratio(),
            pitch_ratio: default_ratio(),
            timeout_secs: default_tts_timeout_secs(),
        }
    }
}

impl TtsConfig {
    pub fn resolve_token(&self) -> Option<String> {
        resolve_secret_field(&self.token, &self.token_env)
    }

    pub fn url(&self) -> String {
        format!("wss://{}/api/v1/tts/ws_binary", self.host)
    }
}

fn default_tts_host() -> String {
    "openspeech.bytedance.com".to_string()
}

fn default_tts_cluster() -> String {
    "volcano_icl".to_string()
}

fn default_ratio() -> f64 {
    1.0
}

fn default_tts_timeout_secs() -> u64 {
    20
}

/// Conversational language-model upstream (chat-completions style API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueConfig {
    #[serde(default = "default_dialogue_base_url")]
    pub base_url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default = "default_dialogue_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            base_url: default_dialogue_base_url(),
            api_key: None,
            api_key_env: None,
            model: None,
            timeout_secs: default_dialogue_timeout_secs(),
        }
    }
}

impl DialogueConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

fn default_dialogue_base_url() -> String {
    "https://ark.cn-beijing.volces.com/api/v3".to_string()
}

fn default_dialogue_timeout_secs() -> u64 {
    30
}

/// On-disk locations for uploaded and generated media.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    #[serde(default = "default_reply_dir")]
    pub reply_dir: PathBuf,

    #[serde(default = "default_emotion_dir")]
    pub emotion_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            reply_dir: default_reply_dir(),
            emotion_dir: default_emotion_dir(),
        }
    }
}

impl StorageConfig {
    /// Create the media directories if they do not exist yet.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.upload_dir, &self.reply_dir, &self.emotion_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads/audio")
}

fn default_reply_dir() -> PathBuf {
    PathBuf::from("reply_audio")
}

fn default_emotion_dir() -> PathBuf {
    PathBuf::from("emotion_img")
}

/// Companion persona overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonaConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Full system prompt override. When set, the built-in prompt
    /// (including the emotion-tag instruction) is not used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// Resolve a secret: a non-empty literal field wins, otherwise the named
/// environment variable is consulted.
fn resolve_secret_field(value: &Option<String>, env_name: &Option<String>) -> Option<String> {
    if let Some(v) = value {
        if !v.is_empty() {
            return Some(v.clone());
        }
    }
    env_name
        .as_ref()
        .and_then(|name| std::env::var(name).ok())
        .filter(|v| !v.is_empty())
}

//! Gateway shared state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use voxling_core::config::Config;
use voxling_dialogue::DialogueEngine;
use voxling_speech::{SpeechRecognizer, SpeechSynthesizer};

/// Shared gateway state accessible from all connections and handlers.
///
/// The upstream engines are injected as trait objects so tests (and
/// alternative providers) can swap them without touching the gateway.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub asr: Arc<dyn SpeechRecognizer>,
    pub dialogue: Arc<dyn DialogueEngine>,
    pub tts: Arc<dyn SpeechSynthesizer>,
    connections: RwLock<HashMap<String, ConnectionState>>,
}

/// Per-connection registry entry.
#[derive(Clone)]
pub struct ConnectionState {
    pub conn_id: String,
    pub event_tx: mpsc::UnboundedSender<String>,
}

impl GatewayState {
    pub fn new(
        config: Arc<Config>,
        asr: Arc<dyn SpeechRecognizer>,
        dialogue: Arc<dyn DialogueEngine>,
        tts: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            config,
            asr,
            dialogue,
            tts,
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub async fn add_connection(&self, conn: ConnectionState) {
        self.connections
            .write()
            .await
            .insert(conn.conn_id.clone(), conn);
    }

    pub async fn remove_connection(&self, conn_id: &str) {
        self.connections.write().await.remove(conn_id);
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Point-in-time copy of the live connection set.
    pub async fn snapshot(&self) -> Vec<ConnectionState> {
        self.connections.read().await.values().cloned().collect()
    }
}

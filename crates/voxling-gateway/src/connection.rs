//! WebSocket connection lifecycle — welcome, dispatch, cleanup.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use voxling_core::protocol::{ClientMessage, ServerMessage};

use crate::pipeline::{run_audio_turn, run_text_turn, send_message, EventSender};
use crate::state::{ConnectionState, GatewayState};

/// Handle a new client connection.
pub async fn handle_ws_connection(state: Arc<GatewayState>, ws: WebSocket) {
    let conn_id = Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, "client connected");

    let (mut ws_tx, mut ws_rx) = ws.split();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<String>();

    state
        .add_connection(ConnectionState {
            conn_id: conn_id.clone(),
            event_tx: event_tx.clone(),
        })
        .await;

    // All outbound traffic funnels through one sender task so turns
    // running concurrently with the read loop never interleave writes.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = event_rx.recv().await {
            if ws_tx.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    send_message(
        &event_tx,
        &ServerMessage::Welcome {
            message: voxling_core::persona::WELCOME_MESSAGE.to_string(),
        },
    );

    while let Some(msg_result) = ws_rx.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                dispatch_message(&state, &event_tx, text.to_string());
            }
            Ok(Message::Close(_)) => {
                debug!(conn_id = %conn_id, "client requested close");
                break;
            }
            Ok(_) => {
                // Axum answers ping/pong control frames itself; binary
                // payloads are not part of the session protocol.
            }
            Err(e) => {
                error!(conn_id = %conn_id, %e, "WebSocket error");
                break;
            }
        }
    }

    send_task.abort();
    state.remove_connection(&conn_id).await;
    info!(conn_id = %conn_id, "client disconnected");
}

/// Route one inbound message. Turns are spawned as their own tasks so a
/// slow pipeline never blocks this connection's read loop (liveness
/// probes keep working mid-turn).
fn dispatch_message(state: &Arc<GatewayState>, events: &EventSender, raw: String) {
    let value: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(_) => {
            send_message(events, &ServerMessage::error("invalid JSON message"));
            return;
        }
    };

    match serde_json::from_value::<ClientMessage>(value.clone()) {
        Ok(ClientMessage::Ping) => {
            let timestamp = chrono::Utc::now().timestamp_micros() as f64 / 1e6;
            send_message(events, &ServerMessage::Pong { timestamp });
        }
        Ok(ClientMessage::Text { message }) => {
            if message.trim().is_empty() {
                send_message(events, &ServerMessage::error("empty text message"));
                return;
            }
            debug!(chars = message.len(), "text turn received");
            let state = state.clone();
            let events = events.clone();
            tokio::spawn(async move {
                run_text_turn(&state, &events, message).await;
            });
        }
        Ok(ClientMessage::Audio { audio }) => {
            let bytes = match base64::engine::general_purpose::STANDARD.decode(audio) {
                Ok(bytes) if !bytes.is_empty() => bytes,
                _ => {
                    send_message(events, &ServerMessage::error("invalid audio payload"));
                    return;
                }
            };
            debug!(bytes = bytes.len(), "audio turn received");
            let state = state.clone();
            let events = events.clone();
            tokio::spawn(async move {
                run_audio_turn(&state, &events, bytes).await;
            });
        }
        Err(_) => {
            let kind = value
                .get("type")
                .and_then(|v| v.as_str())
                .unwrap_or("(missing)");
            if matches!(kind, "audio" | "text" | "ping") {
                send_message(events, &ServerMessage::error(format!("malformed {kind} message")));
            } else {
                warn!(kind, "unrecognized message type");
                send_message(
                    events,
                    &ServerMessage::error(format!("unknown message type: {kind}")),
                );
            }
        }
    }
}

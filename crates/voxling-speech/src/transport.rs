//! WebSocket plumbing shared by the upstream clients.

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use voxling_core::{Result, VoxlingError};

use crate::frame::{decode_response_frame, ResponseFrame};

pub(crate) type WsConnection = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub(crate) fn transport_err(e: impl std::fmt::Display) -> VoxlingError {
    VoxlingError::Transport(e.to_string())
}

pub(crate) async fn send_frame(ws: &mut WsConnection, frame: Vec<u8>) -> Result<()> {
    ws.send(WsMessage::Binary(frame.into()))
        .await
        .map_err(transport_err)
}

/// Receive the next binary frame and decode it. `Ok(None)` means the peer
/// closed the connection.
pub(crate) async fn recv_frame(ws: &mut WsConnection) -> Result<Option<ResponseFrame>> {
    while let Some(message) = ws.next().await {
        match message.map_err(transport_err)? {
            WsMessage::Binary(bytes) => return decode_response_frame(&bytes).map(Some),
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            WsMessage::Close(_) => return Ok(None),
            other => {
                return Err(VoxlingError::Protocol(format!(
                    "unexpected non-binary frame: {other:?}"
                )))
            }
        }
    }
    Ok(None)
}

//! WebSocket connection handler.
//!
//! One task per attached connection: frames from the socket are forwarded
//! to the other participant of the session, frames queued for this
//! connection are written back out by a spawned sender task.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::protocol::{peek_type, Outbound, CLOSE_SESSION_FULL, SESSION_FULL_REASON};
use crate::state::{AttachError, RelayState};

/// Handle a single WebSocket connection.
///
/// This function runs for the lifetime of the connection:
/// 1. Attaches to the session's room, or closes with 4001 if it is full
/// 2. Spawns a sender task to write queued frames
/// 3. Forwards incoming text frames verbatim until the socket closes
/// 4. Detaches, removing the room if it was the last participant
pub async fn handle_websocket(
    socket: WebSocket,
    state: RelayState,
    session_id: String,
    user_id: String,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Create the outbound channel for this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    // ── Step 1: Attach ────────────────────────────────────────────────────

    let conn_id = match state.attach(&session_id, &user_id, tx) {
        Ok(conn_id) => conn_id,
        Err(AttachError::SessionFull) => {
            let _ = ws_sender
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_SESSION_FULL,
                    reason: SESSION_FULL_REASON.into(),
                })))
                .await;
            return;
        }
    };

    // ── Step 2: Spawn Sender Task ─────────────────────────────────────────

    let sender_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Frame(text) => {
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Outbound::Close { code, reason } => {
                    let _ = ws_sender
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    // ── Step 3: Forward Messages ──────────────────────────────────────────

    while let Some(msg_result) = ws_receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let delivered = state.forward(&session_id, conn_id, &text);
                tracing::debug!(
                    session_id = session_id.as_str(),
                    user_id = user_id.as_str(),
                    kind = peek_type(&text).as_deref().unwrap_or("?"),
                    delivered,
                    "Frame relayed"
                );
            }
            Ok(Message::Close(_)) => {
                tracing::info!(
                    session_id = session_id.as_str(),
                    user_id = user_id.as_str(),
                    "Client sent close frame"
                );
                break;
            }
            Err(e) => {
                tracing::warn!(
                    session_id = session_id.as_str(),
                    user_id = user_id.as_str(),
                    error = %e,
                    "WebSocket error"
                );
                break;
            }
            _ => {} // Binary, Ping, Pong: ignore
        }
    }

    // ── Step 4: Cleanup ───────────────────────────────────────────────────

    let remaining = state.detach(&session_id, conn_id);
    sender_task.abort();
    tracing::info!(
        session_id = session_id.as_str(),
        user_id = user_id.as_str(),
        remaining,
        "WebSocket disconnected"
    );
}

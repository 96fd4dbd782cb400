//! WebSocket driver for [`SignalingLink`].
//!
//! ```text
//! ┌──────────────┐  LinkCommand   ┌──────────────┐   text frames   ┌─────────┐
//! │ SignalingLink│───────────────►│  socket task │◄───────────────►│  relay  │
//! └──────────────┘                └──────┬───────┘                 └─────────┘
//!                                        │ LinkEvent
//!                                        ▼
//!                                   call loop
//! ```
//!
//! No retry or reconnect: a failed connect or a dropped socket is reported
//! once as `Error`/`Closed` and the task exits.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use super::link::{LinkCommand, LinkEvent, SignalingLink};
use super::message::SignalingMessage;

/// Build the relay URL for one session.
pub fn session_url(signaling_url: &str, session_id: &str, user_id: &str) -> String {
    format!(
        "{}/ws/{}?user_id={}",
        signaling_url.trim_end_matches('/'),
        urlencoding::encode(session_id),
        urlencoding::encode(user_id),
    )
}

/// Open a link to the relay and spawn the task that drives it.
///
/// Returns immediately with the link in `Connecting` state; `Opened` arrives
/// on the event channel once the handshake completes.
pub fn open(
    signaling_url: &str,
    session_id: &str,
    user_id: &str,
) -> (SignalingLink, mpsc::UnboundedReceiver<LinkEvent>) {
    let (link, commands) = SignalingLink::new(session_id);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let url = session_url(signaling_url, session_id, user_id);

    tokio::spawn(drive_socket(url, commands, events_tx));

    (link, events_rx)
}

async fn drive_socket(
    url: String,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    let ws_stream = match connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            tracing::warn!(url = url.as_str(), error = %e, "Signaling connect failed");
            let _ = events.send(LinkEvent::Error(e.to_string()));
            return;
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    if events.send(LinkEvent::Opened).is_err() {
        // Nobody is listening any more.
        let _ = ws_sender.close().await;
        return;
    }

    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(LinkCommand::Send(message)) => {
                        let json = match message.encode() {
                            Ok(json) => json,
                            Err(e) => {
                                tracing::error!(kind = %message.kind(), error = %e, "Failed to encode signaling message");
                                continue;
                            }
                        };
                        if let Err(e) = ws_sender.send(WsMessage::Text(json.into())).await {
                            let _ = events.send(LinkEvent::Error(e.to_string()));
                            break;
                        }
                    }
                    Some(LinkCommand::Close) | None => {
                        let _ = ws_sender.close().await;
                        let _ = events.send(LinkEvent::Closed);
                        break;
                    }
                }
            }

            frame = ws_receiver.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        let event = match SignalingMessage::decode(&text) {
                            Ok(message) => LinkEvent::Message(message),
                            Err(e) => LinkEvent::Rejected(e.to_string()),
                        };
                        if events.send(event).is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        tracing::info!(url = url.as_str(), "Relay closed signaling socket");
                        let _ = events.send(LinkEvent::Closed);
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(url = url.as_str(), error = %e, "Signaling socket error");
                        let _ = events.send(LinkEvent::Error(e.to_string()));
                        break;
                    }
                    // tungstenite answers pings itself; binary frames are not part of the protocol
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

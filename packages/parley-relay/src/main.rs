//! Parley Relay Server
//!
//! A lightweight WebSocket relay for call signaling. Each session id is one
//! room; the two participants of a session attach to it and every text
//! frame one sends is forwarded, untouched, to the other.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            RELAY ROOMS                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  GET /ws/{session_id}?user_id=alice ──┐                                 │
//! │                                       ├──► Room(session_id) ≤ 2 conns   │
//! │  GET /ws/{session_id}?user_id=bob ────┘        │                        │
//! │                                                │ frames forwarded       │
//! │  third user ──► close 4001 "session full"      │ verbatim, in order     │
//! │  same user again ──► replaces stale socket     ▼                        │
//! │                                          other participant              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! **Privacy**: The relay never interprets payloads. It only peeks at the
//! envelope `type` for logs.

mod handler;
mod protocol;
mod state;

use std::time::Duration;

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use clap::Parser;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use protocol::ConnectParams;
use state::{RelayConfig, RelayState};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "parley-relay", version, about = "Parley call signaling relay")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080, env = "RELAY_PORT")]
    port: u16,

    /// Room TTL in seconds
    #[arg(long, default_value_t = 3600, env = "ROOM_TTL_SECS")]
    room_ttl_secs: i64,

    /// Cleanup interval in seconds
    #[arg(long, default_value_t = 300, env = "CLEANUP_INTERVAL_SECS")]
    cleanup_interval_secs: u64,
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley_relay=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    let config = RelayConfig {
        port: args.port,
        room_ttl_secs: args.room_ttl_secs,
    };
    let addr = format!("0.0.0.0:{}", config.port);
    let state = RelayState::new(config);

    // Spawn periodic cleanup task
    let cleanup_state = state.clone();
    let cleanup_interval = args.cleanup_interval_secs.max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(cleanup_interval));
        loop {
            interval.tick().await;
            cleanup_state.cleanup_expired();
        }
    });

    let app = router(state);

    tracing::info!("Parley relay server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .await
        .expect("Server error");
}

/// Build the HTTP router.
fn router(state: RelayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/ws/:session_id", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Route Handlers ────────────────────────────────────────────────────────────

/// WebSocket upgrade handler for session participants.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    Query(params): Query<ConnectParams>,
    State(state): State<RelayState>,
) -> Response {
    if params.user_id.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "user_id query parameter required").into_response();
    }
    let user_id = params.user_id;
    ws.on_upgrade(move |socket| handler::handle_websocket(socket, state, session_id, user_id))
}

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "parley-relay",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Statistics endpoint.
async fn stats_handler(State(state): State<RelayState>) -> impl IntoResponse {
    Json(state.stats())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

    async fn serve() -> (String, RelayState) {
        let state = RelayState::new(RelayConfig::default());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("ws://{}", addr), state)
    }

    async fn attach(base: &str, session: &str, user: &str) -> Client {
        let (ws, _) = connect_async(format!("{}/ws/{}?user_id={}", base, session, user))
            .await
            .unwrap();
        ws
    }

    async fn wait_for_participants(state: &RelayState, session: &str, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let attached = state
                    .rooms
                    .get(session)
                    .map(|room| room.participants.len())
                    .unwrap_or(0);
                if attached == count {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("participants never attached");
    }

    async fn next_text(ws: &mut Client) -> String {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("no frame")
            .expect("stream ended")
            .unwrap();
        match msg {
            WsMessage::Text(text) => text.to_string(),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_health_json_structure() {
        let json_val = json!({
            "status": "ok",
            "service": "parley-relay",
            "version": env!("CARGO_PKG_VERSION"),
        });
        assert_eq!(json_val["status"], "ok");
        assert_eq!(json_val["service"], "parley-relay");
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["parley-relay"]);
        assert_eq!(args.port, 8080);
        assert_eq!(args.room_ttl_secs, 3600);
        assert_eq!(args.cleanup_interval_secs, 300);
    }

    #[tokio::test]
    async fn test_frames_relay_between_participants() {
        let (base, state) = serve().await;
        let mut alice = attach(&base, "s1", "alice").await;
        let mut bob = attach(&base, "s1", "bob").await;
        wait_for_participants(&state, "s1", 2).await;

        let offer = r#"{"type":"offer","sdp":"v=0\r\n"}"#;
        alice.send(WsMessage::Text(offer.into())).await.unwrap();
        assert_eq!(next_text(&mut bob).await, offer);

        bob.send(WsMessage::Text(r#"{"type":"answer","sdp":"v=0"}"#.into()))
            .await
            .unwrap();
        assert_eq!(next_text(&mut alice).await, r#"{"type":"answer","sdp":"v=0"}"#);
    }

    #[tokio::test]
    async fn test_third_participant_refused() {
        let (base, state) = serve().await;
        let _alice = attach(&base, "s1", "alice").await;
        let _bob = attach(&base, "s1", "bob").await;
        wait_for_participants(&state, "s1", 2).await;

        let mut carol = attach(&base, "s1", "carol").await;
        let frame = tokio::time::timeout(Duration::from_secs(5), carol.next())
            .await
            .unwrap();
        match frame {
            Some(Ok(WsMessage::Close(Some(close)))) => {
                assert_eq!(u16::from(close.code), protocol::CLOSE_SESSION_FULL);
            }
            other => panic!("expected close frame, got {:?}", other),
        }
        assert_eq!(state.stats().connected_participants, 2);
    }

    #[tokio::test]
    async fn test_room_removed_when_both_leave() {
        let (base, state) = serve().await;
        let mut alice = attach(&base, "s1", "alice").await;
        let mut bob = attach(&base, "s1", "bob").await;
        wait_for_participants(&state, "s1", 2).await;

        alice.close(None).await.unwrap();
        wait_for_participants(&state, "s1", 1).await;
        bob.close(None).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while state.room_count() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("room not removed");
    }
}

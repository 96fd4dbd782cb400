//! Relay wire conventions.
//!
//! The relay forwards text frames between the two participants of a session
//! verbatim. It never decodes the envelope beyond peeking at `type` for
//! logging; sessions, offers and candidates are the clients' business.

use serde::{Deserialize, Serialize};

// ── Close Codes ───────────────────────────────────────────────────────────────

/// Sent to a third participant trying to attach to a full session.
pub const CLOSE_SESSION_FULL: u16 = 4001;

/// Sent to a stale connection replaced by a newer one for the same user.
pub const CLOSE_REPLACED: u16 = 4002;

/// Close reason paired with [`CLOSE_SESSION_FULL`].
pub const SESSION_FULL_REASON: &str = "session full";

/// Close reason paired with [`CLOSE_REPLACED`].
pub const REPLACED_REASON: &str = "replaced by newer connection";

// ── Connection Outbox ─────────────────────────────────────────────────────────

/// What a connection's sender task writes to its socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A text frame from the other participant, untouched
    Frame(String),
    /// Close the socket with this code and reason
    Close {
        code: u16,
        reason: &'static str,
    },
}

// ── Query Parameters ──────────────────────────────────────────────────────────

/// Query string of `GET /ws/:session_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectParams {
    /// Identity of the attaching participant
    #[serde(default)]
    pub user_id: String,
}

// ── Envelope Peek ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TypePeek {
    #[serde(rename = "type")]
    kind: String,
}

/// The `type` field of a frame, if it is a JSON object that has one.
pub fn peek_type(text: &str) -> Option<String> {
    serde_json::from_str::<TypePeek>(text).ok().map(|p| p.kind)
}

// ── Stats ─────────────────────────────────────────────────────────────────────

/// Body of `GET /stats`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelayStats {
    /// Sessions with at least one attached participant
    pub active_sessions: usize,
    /// Attached connections across all sessions
    pub connected_participants: usize,
    /// Sessions with both participants attached
    pub paired_sessions: usize,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

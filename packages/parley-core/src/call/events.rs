//! # Call Events
//!
//! Updates broadcast by a running call for the UI to render.

use serde::{Deserialize, Serialize};

use super::transport::ConnectionState;

/// Where the offer/answer exchange stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationState {
    /// Engine not started
    #[default]
    Idle,
    /// Waiting for the other participant to attach
    AwaitingPeer,
    /// Offer sent (initiator)
    Offering,
    /// Answering an offer (receiver)
    Answering,
    /// Transport reported `connected`
    Connected,
    /// Transport failed; terminal
    Failed,
    /// Call torn down; terminal
    Ended,
}

impl NegotiationState {
    /// `Ended` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, NegotiationState::Ended | NegotiationState::Failed)
    }

    /// An offer/answer exchange has begun or completed.
    pub fn is_negotiating(&self) -> bool {
        matches!(
            self,
            NegotiationState::Offering | NegotiationState::Answering | NegotiationState::Connected
        )
    }
}

/// Why a call ended. Serialized as the `reason` sent to the session service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Local user hung up or navigated away
    Hangup,
    /// Duration budget used up
    Timeout,
    /// Link or transport lost before the call ever connected
    ConnectionFailed,
    /// Link or transport lost after the call had connected
    CallCompleted,
    /// The other participant sent `Bye`
    PeerEnded,
}

impl EndReason {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Hangup => "hangup",
            EndReason::Timeout => "timeout",
            EndReason::ConnectionFailed => "connection_failed",
            EndReason::CallCompleted => "call_completed",
            EndReason::PeerEnded => "peer_ended",
        }
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broadcast to subscribers of a running call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallUpdate {
    /// Negotiation moved
    State(NegotiationState),
    /// Transport connection moved
    Connection(ConnectionState),
    /// Countdown, whole seconds
    TimeRemaining(u64),
    /// Call is over
    Ended {
        /// Why
        reason: EndReason,
        /// Whether media ever flowed
        ever_connected: bool,
    },
}

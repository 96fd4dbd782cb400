//! # Signaling
//!
//! Envelope codec and the session-scoped link to the relay.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SIGNALING EXCHANGE                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   Initiator                    Relay                    Receiver       │
//! │   ─────────                    ─────                    ────────       │
//! │   (open) ── Join ─────────────►  ──────────────────────► (JoinAck) ◄┐  │
//! │          ◄──────────────────── ◄──────────── JoinAck ───            │  │
//! │   Offer ──────────────────────►  ──────────────────────► Answering  │  │
//! │          ◄──────────────────── ◄──────────── Answer ────            │  │
//! │   Candidate ◄───────────────── ─ ─ ─ trickle both ways ─ ─ ─ ──────►   │
//! │   Bye ────────────────────────►  ──────────────────────► terminate     │
//! │                                                                         │
//! │  The relay forwards envelopes verbatim between the two participants    │
//! │  attached to the same session id. It never reads payloads.             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod link;
mod message;
pub mod ws;

pub use link::{LinkCommand, LinkEvent, LinkState, SendOutcome, SignalingLink};
pub use message::{IceCandidate, MessageKind, SessionDescription, SignalingMessage};

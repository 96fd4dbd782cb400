//! # Call
//!
//! Everything that happens between "matched" and "ended": negotiation of
//! the peer connection, candidate buffering, the countdown and the single
//! exit path.
//!
//! ## Components
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          CALL COMPONENTS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────┐     owns     ┌───────────────────────────────┐   │
//! │  │ Call (driver)    │─────────────►│ NegotiationEngine             │   │
//! │  │                  │              │  - SignalingLink              │   │
//! │  │ - select! loop   │              │  - PeerTransport              │   │
//! │  │ - CallTimer      │              │  - MediaCapture               │   │
//! │  │ - CallHandle     │              │  - CandidateBuffer            │   │
//! │  └────────┬─────────┘              └───────────────┬───────────────┘   │
//! │           │ Some(reason)                           │ Teardown          │
//! │           ▼                                        ▼                   │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │ TerminationCoordinator: Bye → report → release → finish (once)   │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Candidate Buffering
//!
//! ```text
//! local candidate ──► link open? ──yes──► send
//!                          │no
//!                          └──► local_send queue ──(link opens)──► flush, then Join
//!
//! remote candidate ──► remote description set? ──yes──► apply
//!                          │no
//!                          └──► remote_apply queue ──(description set)──► drain
//! ```

mod candidates;
mod driver;
mod engine;
mod events;
mod termination;
mod timer;
mod transport;

pub use candidates::{CandidateBuffer, PendingQueue};
pub use driver::{Call, CallCommand, CallDeps, CallHandle, CallOutcome};
pub use engine::NegotiationEngine;
pub use events::{CallUpdate, EndReason, NegotiationState};
pub use termination::{SetupResources, Teardown, TerminationCoordinator, TerminationRecord};
pub use timer::{CallTimer, TimerEvent};
pub use transport::{
    ConnectionState, DescriptionKind, IceServer, MediaCapture, MediaSource, PeerTransport,
    TransportEvent, TransportFactory,
};

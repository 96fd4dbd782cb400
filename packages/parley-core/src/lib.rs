//! # Parley Core
//!
//! Client-side orchestration of timed one-to-one practice calls: matching,
//! signaling, offer/answer negotiation, the call countdown, the single
//! termination path and the post-call rating.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         PARLEY CORE MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────────────┐  │
//! │  │  Matching   │  │   Session   │  │              Call               │  │
//! │  │             │  │             │  │                                 │  │
//! │  │ - Join      │─►│ - Roles     │─►│ - NegotiationEngine             │  │
//! │  │ - Poll      │  │ - Levels    │  │ - CandidateBuffer               │  │
//! │  │ - Resume    │  │ - Budget    │  │ - CallTimer                     │  │
//! │  └──────┬──────┘  └─────────────┘  │ - TerminationCoordinator        │  │
//! │         │                          └───────┬─────────────────┬───────┘  │
//! │         │                                  │                 │          │
//! │  ┌──────▼──────────────────────┐  ┌────────▼────────┐  ┌─────▼──────┐   │
//! │  │      Session Service        │  │   Signaling     │  │   Rating   │   │
//! │  │                             │  │                 │  │            │   │
//! │  │ - REST (reqwest)            │  │ - Envelopes     │  │ - Verdict  │   │
//! │  │ - join/leave/end/rate       │  │ - WebSocket     │  │ - Latched  │   │
//! │  └─────────────────────────────┘  └─────────────────┘  └────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`config`] - Client configuration and environment overrides
//! - [`session`] - Session model, roles and call budgets
//! - [`signaling`] - Relay envelopes and the signaling link
//! - [`call`] - Negotiation, countdown and termination of one call
//! - [`service`] - Client for the matching/session backend
//! - [`matching`] - Queue join and session polling
//! - [`rating`] - Post-call rating
//! - [`time`] - Clock abstraction
//!
//! ## Embedding
//!
//! The crate ships no media stack. The embedding application supplies
//! [`MediaSource`](call::MediaSource) for camera and microphone capture, and
//! [`TransportFactory`](call::TransportFactory) producing a
//! [`PeerTransport`](call::PeerTransport) (a WebRTC peer connection, for
//! example). Both go into [`CallDeps`] together with the session service and
//! a [`Clock`](time::Clock).
//!
//! ## Typical Flow
//!
//! ```ignore
//! use std::sync::Arc;
//! use parley_core::{Call, CallDeps, CoreConfig, HttpSessionService, Level};
//! use parley_core::{MatchOutcome, MatchingPoller, SessionContext, SystemClock, Verdict};
//!
//! let config = CoreConfig::from_env()?;
//! let service = Arc::new(HttpSessionService::new(&config.api_base_url));
//!
//! let poller = MatchingPoller::new(service.clone(), "alice", Level::Beginner, &config);
//! let MatchOutcome::Matched(info) = poller.find_match(cancelled).await else {
//!     return Ok(());
//! };
//!
//! let deps = CallDeps {
//!     service: service.clone(),
//!     media: Arc::new(app_media),           // embedder's MediaSource
//!     transports: Arc::new(app_transports), // embedder's TransportFactory
//!     clock: Arc::new(SystemClock),
//! };
//! let ctx = SessionContext::new(info, "alice", &config.durations)?;
//! let (call, handle) = Call::connect(ctx, &deps, &config).await?;
//! let outcome = call.run().await;
//!
//! if let Some(mut gate) = outcome.rating_gate(service) {
//!     gate.submit(Verdict::new(5)?).await?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod call;
pub mod config;
pub mod error;
pub mod matching;
pub mod rating;
pub mod service;
pub mod session;
pub mod signaling;
/// Wall-clock abstraction so countdowns can be driven in tests.
pub mod time;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use call::{Call, CallDeps, CallHandle, CallOutcome, CallUpdate, EndReason};
pub use config::CoreConfig;
pub use error::{Error, Result};
pub use matching::{MatchOutcome, MatchingPoller, MatchingStatus};
pub use rating::{RatingGate, RatingOutcome, Verdict};
pub use service::{HttpSessionService, SessionService};
pub use session::{Level, Role, SessionContext, SessionInfo};
pub use time::{Clock, SystemClock};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of Parley Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

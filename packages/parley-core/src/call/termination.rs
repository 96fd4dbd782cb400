//! # Termination Coordinator
//!
//! The single idempotent exit path for a call. Whatever ends the call
//! (hangup, expiry, peer `Bye`, link loss, transport failure, unload),
//! every trigger funnels into [`TerminationCoordinator::terminate`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        TERMINATION SEQUENCE                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  terminate(reason)                                                      │
//! │      │                                                                  │
//! │      ├── already triggered? ──► return false (no side effects)          │
//! │      │                                                                  │
//! │      ├── 1. Bye to peer      (link open and reason ≠ peer_ended)        │
//! │      ├── 2. end report       (bounded wait; failure logged only)        │
//! │      ├── 3. release          (media, transport, link)                   │
//! │      └── 4. finish           (session marked ended, state Ended)        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The triggered flag is set before the first await, so a second trigger
//! arriving while the report is in flight is already a no-op.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::events::EndReason;
use super::transport::MediaCapture;
use crate::service::{EndCallReport, SessionService};
use crate::session::SessionContext;
use crate::signaling::{SendOutcome, SignalingLink, SignalingMessage};

/// What a call must expose for the coordinator to tear it down.
#[async_trait]
pub trait Teardown: Send {
    /// The session being ended.
    fn context(&self) -> &SessionContext;

    /// Whether a `Bye` can still reach the peer.
    fn link_is_open(&self) -> bool;

    /// Queue a `Bye` on the link. `false` if it could not be sent.
    fn send_bye(&mut self) -> bool;

    /// Stop media, close the transport, close the link.
    async fn release(&mut self);

    /// Record the end reason and move to the final state.
    fn finish(&mut self, reason: EndReason);
}

/// Resources held before the negotiation engine exists. Lets a failed setup
/// (media denied, transport refused) go through the same exit path.
pub struct SetupResources {
    ctx: SessionContext,
    link: SignalingLink,
    media: Option<Box<dyn MediaCapture>>,
}

impl SetupResources {
    /// Wrap what setup has acquired so far.
    pub fn new(ctx: SessionContext, link: SignalingLink, media: Option<Box<dyn MediaCapture>>) -> Self {
        Self { ctx, link, media }
    }

    /// Give back the context, e.g. to read the recorded end reason.
    pub fn into_context(self) -> SessionContext {
        self.ctx
    }
}

#[async_trait]
impl Teardown for SetupResources {
    fn context(&self) -> &SessionContext {
        &self.ctx
    }

    fn link_is_open(&self) -> bool {
        self.link.is_open()
    }

    fn send_bye(&mut self) -> bool {
        matches!(self.link.send(SignalingMessage::Bye), SendOutcome::Sent)
    }

    async fn release(&mut self) {
        if let Some(mut media) = self.media.take() {
            media.stop();
        }
        self.link.close();
    }

    fn finish(&mut self, reason: EndReason) {
        self.ctx.mark_ended(reason);
    }
}

/// Whether termination has run, and why.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TerminationRecord {
    /// Set on the first trigger, never cleared
    pub triggered: bool,
    /// Reason of the first trigger
    pub reason: Option<EndReason>,
}

/// Runs the end-of-call sequence exactly once.
pub struct TerminationCoordinator {
    record: TerminationRecord,
    service: Arc<dyn SessionService>,
    report_timeout: Duration,
}

impl std::fmt::Debug for TerminationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminationCoordinator")
            .field("record", &self.record)
            .field("report_timeout", &self.report_timeout)
            .finish()
    }
}

impl TerminationCoordinator {
    /// Coordinator reporting to `service`, waiting at most `report_timeout`.
    pub fn new(service: Arc<dyn SessionService>, report_timeout: Duration) -> Self {
        Self {
            record: TerminationRecord::default(),
            service,
            report_timeout,
        }
    }

    /// Current record.
    pub fn record(&self) -> TerminationRecord {
        self.record
    }

    /// Whether termination has been triggered.
    pub fn is_triggered(&self) -> bool {
        self.record.triggered
    }

    /// End the call. Returns `true` only for the invocation that actually ran
    /// the sequence.
    pub async fn terminate(&mut self, reason: EndReason, target: &mut dyn Teardown) -> bool {
        if self.record.triggered {
            tracing::debug!(
                session_id = target.context().session_id(),
                reason = %reason,
                first = ?self.record.reason,
                "Termination already triggered"
            );
            return false;
        }
        self.record = TerminationRecord {
            triggered: true,
            reason: Some(reason),
        };

        let session_id = target.context().session_id().to_string();
        let user_id = target.context().local_user_id().to_string();
        tracing::info!(
            session_id = session_id.as_str(),
            user_id = user_id.as_str(),
            reason = %reason,
            "Terminating call"
        );

        // 1. Tell the peer, unless the peer told us
        if reason != EndReason::PeerEnded && target.link_is_open() && !target.send_bye() {
            tracing::debug!(session_id = session_id.as_str(), "Bye could not be sent");
        }

        // 2. Report to the session service
        let report = EndCallReport {
            session_id: session_id.clone(),
            user_id,
            reason,
        };
        match tokio::time::timeout(self.report_timeout, self.service.end_call(&report)).await {
            Ok(Ok(())) => {
                tracing::debug!(session_id = session_id.as_str(), "End of call reported");
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    session_id = session_id.as_str(),
                    error = %e,
                    "End-of-call report failed"
                );
            }
            Err(_) => {
                tracing::warn!(
                    session_id = session_id.as_str(),
                    timeout_ms = self.report_timeout.as_millis() as u64,
                    "End-of-call report timed out"
                );
            }
        }

        // 3. Release resources
        target.release().await;

        // 4. Final state
        target.finish(reason);
        true
    }
}

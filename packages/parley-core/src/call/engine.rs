//! # Negotiation Engine
//!
//! Drives the offer/answer/candidate exchange for one call and owns the
//! call's resources: media capture, peer transport, signaling link and the
//! candidate buffer.
//!
//! ## Negotiation Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       NEGOTIATION STATE MACHINE                         │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Idle ──start()──► AwaitingPeer                                         │
//! │                       │                                                 │
//! │     Join/JoinAck and  │            Offer received and                   │
//! │     role = Initiator  │            role = Receiver                      │
//! │            ▼          │                    ▼                            │
//! │        Offering       │                Answering                        │
//! │            │ Answer   │                    │ Answer sent                  │
//! │            └──────────┴────────┬───────────┘                            │
//! │                                ▼ transport "connected"                  │
//! │                            Connected                                    │
//! │                                │                                        │
//! │            transport "failed"  │  terminate(reason)                     │
//! │                  ▼             ▼                                        │
//! │               Failed         Ended                                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Glare cannot happen: only the initiator ever offers, and only once. The
//! receiver never offers, so there is no rollback path.
//!
//! Every handler returns `Some(reason)` when the event is terminal; the
//! caller routes that into the termination coordinator.

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::candidates::CandidateBuffer;
use super::events::{CallUpdate, EndReason, NegotiationState};
use super::termination::Teardown;
use super::transport::{ConnectionState, DescriptionKind, MediaCapture, PeerTransport, TransportEvent};
use crate::error::{Error, Result};
use crate::session::{Role, SessionContext};
use crate::signaling::{IceCandidate, LinkEvent, SendOutcome, SignalingLink, SignalingMessage};

/// Per-call negotiation state and resources. Single owner; torn down once
/// by the termination coordinator.
pub struct NegotiationEngine {
    ctx: SessionContext,
    state: NegotiationState,
    link: SignalingLink,
    transport: Box<dyn PeerTransport>,
    media: Option<Box<dyn MediaCapture>>,
    candidates: CandidateBuffer,
    offer_in_flight: bool,
    ever_connected: bool,
    updates: broadcast::Sender<CallUpdate>,
}

impl std::fmt::Debug for NegotiationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NegotiationEngine")
            .field("session_id", &self.ctx.session_id())
            .field("role", &self.ctx.role())
            .field("state", &self.state)
            .field("link", &self.link.state())
            .field("offer_in_flight", &self.offer_in_flight)
            .field("ever_connected", &self.ever_connected)
            .finish()
    }
}

impl NegotiationEngine {
    /// Take ownership of the call's resources and wait for the peer.
    pub fn start(
        ctx: SessionContext,
        media: Box<dyn MediaCapture>,
        transport: Box<dyn PeerTransport>,
        link: SignalingLink,
        updates: broadcast::Sender<CallUpdate>,
    ) -> Self {
        tracing::info!(
            session_id = ctx.session_id(),
            user_id = ctx.local_user_id(),
            role = ?ctx.role(),
            "Negotiation engine started"
        );
        let mut engine = Self {
            ctx,
            state: NegotiationState::Idle,
            link,
            transport,
            media: Some(media),
            candidates: CandidateBuffer::new(),
            offer_in_flight: false,
            ever_connected: false,
            updates,
        };
        engine.set_state(NegotiationState::AwaitingPeer);
        engine
    }

    /// Current negotiation state.
    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Whether the transport has ever reported `connected`.
    pub fn ever_connected(&self) -> bool {
        self.ever_connected
    }

    /// The session this engine negotiates.
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    // ========================================================================
    // EVENT DISPATCH
    // ========================================================================

    /// Handle one event from the signaling link.
    pub async fn handle_link_event(&mut self, event: LinkEvent) -> Option<EndReason> {
        if self.state.is_terminal() {
            tracing::trace!(?event, "Link event after termination ignored");
            return None;
        }

        match event {
            LinkEvent::Opened => self.on_link_open(),
            LinkEvent::Message(message) => self.on_message(message).await,
            LinkEvent::Rejected(reason) => {
                tracing::warn!(
                    session_id = self.ctx.session_id(),
                    error = reason.as_str(),
                    "Rejected signaling frame"
                );
                None
            }
            LinkEvent::Error(reason) => {
                tracing::warn!(
                    session_id = self.ctx.session_id(),
                    error = reason.as_str(),
                    "Signaling link failed"
                );
                self.link.mark_closed();
                Some(self.failure_reason())
            }
            LinkEvent::Closed => {
                tracing::info!(session_id = self.ctx.session_id(), "Signaling link closed by relay");
                self.link.mark_closed();
                Some(self.failure_reason())
            }
        }
    }

    /// Handle one event from the peer transport.
    pub async fn handle_transport_event(&mut self, event: TransportEvent) -> Option<EndReason> {
        if self.state.is_terminal() {
            tracing::trace!(?event, "Transport event after termination ignored");
            return None;
        }

        match event {
            TransportEvent::LocalCandidate(candidate) => {
                match self.emit(SignalingMessage::Candidate { candidate }) {
                    Ok(()) => None,
                    Err(_) => Some(self.failure_reason()),
                }
            }
            TransportEvent::StateChanged(connection) => {
                let _ = self.updates.send(CallUpdate::Connection(connection));
                match connection {
                    ConnectionState::Connected => {
                        self.ever_connected = true;
                        self.set_state(NegotiationState::Connected);
                        None
                    }
                    ConnectionState::Failed => {
                        tracing::warn!(
                            session_id = self.ctx.session_id(),
                            ever_connected = self.ever_connected,
                            "Peer transport failed"
                        );
                        self.set_state(NegotiationState::Failed);
                        Some(self.failure_reason())
                    }
                    // disconnected may recover on its own
                    _ => None,
                }
            }
        }
    }

    // ========================================================================
    // HANDLERS
    // ========================================================================

    fn on_link_open(&mut self) -> Option<EndReason> {
        if !self.link.mark_open() {
            return None;
        }

        if let Some(pending) = self.candidates.local_send.release() {
            tracing::debug!(
                session_id = self.ctx.session_id(),
                count = pending.len(),
                "Flushing local candidates"
            );
            for candidate in pending {
                if self.emit(SignalingMessage::Candidate { candidate }).is_err() {
                    return Some(self.failure_reason());
                }
            }
        }

        match self.emit(SignalingMessage::Join) {
            Ok(()) => None,
            Err(_) => Some(self.failure_reason()),
        }
    }

    async fn on_message(&mut self, message: SignalingMessage) -> Option<EndReason> {
        tracing::debug!(
            session_id = self.ctx.session_id(),
            kind = %message.kind(),
            "Signaling message received"
        );

        match message {
            SignalingMessage::Join => {
                if self.emit(SignalingMessage::JoinAck).is_err() {
                    return Some(self.failure_reason());
                }
                self.maybe_begin_offering().await
            }
            SignalingMessage::JoinAck => self.maybe_begin_offering().await,
            SignalingMessage::Offer { sdp } => self.on_offer(sdp).await,
            SignalingMessage::Answer { sdp } => self.on_answer(sdp).await,
            SignalingMessage::Candidate { candidate } => {
                self.on_remote_candidate(candidate).await;
                None
            }
            SignalingMessage::Bye => Some(EndReason::PeerEnded),
        }
    }

    /// The role check, not the message type, is what prevents a second offer.
    async fn maybe_begin_offering(&mut self) -> Option<EndReason> {
        if self.ctx.role() != Role::Initiator
            || self.state.is_negotiating()
            || self.offer_in_flight
        {
            return None;
        }

        self.set_state(NegotiationState::Offering);
        self.offer_in_flight = true;

        let offer = match self.transport.create_offer().await {
            Ok(offer) => offer,
            Err(e) => return self.negotiation_failed("create offer", e),
        };
        if self.state.is_terminal() {
            return None;
        }

        match self.emit(SignalingMessage::Offer { sdp: offer }) {
            Ok(()) => None,
            Err(_) => Some(self.failure_reason()),
        }
    }

    async fn on_offer(&mut self, sdp: crate::signaling::SessionDescription) -> Option<EndReason> {
        if self.ctx.role() == Role::Initiator {
            tracing::warn!(
                session_id = self.ctx.session_id(),
                "Initiator received an offer; ignoring"
            );
            return None;
        }
        if self.state != NegotiationState::AwaitingPeer {
            tracing::warn!(
                session_id = self.ctx.session_id(),
                state = ?self.state,
                "Duplicate offer ignored"
            );
            return None;
        }

        self.set_state(NegotiationState::Answering);

        if let Err(e) = self
            .transport
            .set_remote_description(DescriptionKind::Offer, sdp)
            .await
        {
            return self.negotiation_failed("apply offer", e);
        }
        self.apply_remote_backlog().await;

        let answer = match self.transport.create_answer().await {
            Ok(answer) => answer,
            Err(e) => return self.negotiation_failed("create answer", e),
        };
        if self.state.is_terminal() {
            return None;
        }

        match self.emit(SignalingMessage::Answer { sdp: answer }) {
            Ok(()) => None,
            Err(_) => Some(self.failure_reason()),
        }
    }

    async fn on_answer(&mut self, sdp: crate::signaling::SessionDescription) -> Option<EndReason> {
        if !self.offer_in_flight {
            tracing::warn!(
                session_id = self.ctx.session_id(),
                state = ?self.state,
                "Answer without an outstanding offer ignored"
            );
            return None;
        }

        if let Err(e) = self
            .transport
            .set_remote_description(DescriptionKind::Answer, sdp)
            .await
        {
            return self.negotiation_failed("apply answer", e);
        }
        self.offer_in_flight = false;
        self.apply_remote_backlog().await;
        None
    }

    async fn on_remote_candidate(&mut self, candidate: IceCandidate) {
        if self.candidates.remote_apply.is_released() {
            self.apply_remote_candidate(candidate).await;
        } else {
            self.candidates.remote_apply.enqueue(candidate);
        }
    }

    async fn apply_remote_backlog(&mut self) {
        let Some(pending) = self.candidates.remote_apply.release() else {
            return;
        };
        tracing::debug!(
            session_id = self.ctx.session_id(),
            count = pending.len(),
            "Applying buffered remote candidates"
        );
        for candidate in pending {
            self.apply_remote_candidate(candidate).await;
        }
    }

    async fn apply_remote_candidate(&mut self, candidate: IceCandidate) {
        if let Err(e) = self.transport.add_remote_candidate(candidate).await {
            tracing::warn!(
                session_id = self.ctx.session_id(),
                error = %e,
                "Remote candidate rejected by transport"
            );
        }
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    /// Send through the link; candidates sent before the link opens wait in
    /// the local-send queue. Any other message that cannot be sent is an
    /// `Err`, and the caller treats the link as gone.
    fn emit(&mut self, message: SignalingMessage) -> Result<()> {
        match self.link.send(message) {
            SendOutcome::Sent => Ok(()),
            SendOutcome::NotReady(SignalingMessage::Candidate { candidate }) => {
                self.candidates.local_send.enqueue(candidate);
                Ok(())
            }
            SendOutcome::NotReady(other) => {
                tracing::error!(
                    session_id = self.ctx.session_id(),
                    kind = %other.kind(),
                    "Link not open; message cannot be sent"
                );
                Err(Error::SignalingLink(format!(
                    "{} sent before the link opened",
                    other.kind()
                )))
            }
            SendOutcome::Closed(message) => {
                tracing::warn!(
                    session_id = self.ctx.session_id(),
                    kind = %message.kind(),
                    "Link closed; message dropped"
                );
                Err(Error::LinkClosed)
            }
        }
    }

    fn negotiation_failed(&mut self, step: &str, error: Error) -> Option<EndReason> {
        tracing::error!(
            session_id = self.ctx.session_id(),
            step,
            error = %error,
            "Negotiation step failed"
        );
        Some(self.failure_reason())
    }

    /// Lost link or transport: a completed call if media ever flowed.
    fn failure_reason(&self) -> EndReason {
        if self.ever_connected {
            EndReason::CallCompleted
        } else {
            EndReason::ConnectionFailed
        }
    }

    fn set_state(&mut self, state: NegotiationState) {
        if self.state == state {
            return;
        }
        tracing::debug!(
            session_id = self.ctx.session_id(),
            from = ?self.state,
            to = ?state,
            "Negotiation state changed"
        );
        self.state = state;
        let _ = self.updates.send(CallUpdate::State(state));
    }
}

#[async_trait]
impl Teardown for NegotiationEngine {
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
        self.transport.close().await;
        self.link.close();
    }

    fn finish(&mut self, reason: EndReason) {
        self.ctx.mark_ended(reason);
        if self.state != NegotiationState::Failed {
            self.set_state(NegotiationState::Ended);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{candidate, context, FakeMedia, FakeTransport, TransportCall};
    use crate::session::Role;
    use crate::signaling::{LinkCommand, SessionDescription};
    use tokio::sync::mpsc;

    struct Harness {
        engine: NegotiationEngine,
        wire: mpsc::UnboundedReceiver<LinkCommand>,
        transport: FakeTransport,
    }

    fn harness(role: Role) -> Harness {
        let ctx = context(role);
        let (link, wire) = SignalingLink::new(ctx.session_id());
        let transport = FakeTransport::default();
        let (updates, _) = broadcast::channel(64);
        let engine = NegotiationEngine::start(
            ctx,
            Box::new(FakeMedia::default()),
            Box::new(transport.clone()),
            link,
            updates,
        );
        Harness {
            engine,
            wire,
            transport,
        }
    }

    fn sent(wire: &mut mpsc::UnboundedReceiver<LinkCommand>) -> Vec<SignalingMessage> {
        let mut out = Vec::new();
        while let Ok(cmd) = wire.try_recv() {
            if let LinkCommand::Send(msg) = cmd {
                out.push(msg);
            }
        }
        out
    }

    fn offers(messages: &[SignalingMessage]) -> usize {
        messages
            .iter()
            .filter(|m| matches!(m, SignalingMessage::Offer { .. }))
            .count()
    }

    #[tokio::test]
    async fn test_open_sends_join() {
        let mut h = harness(Role::Initiator);
        assert_eq!(h.engine.state(), NegotiationState::AwaitingPeer);
        assert!(h.engine.handle_link_event(LinkEvent::Opened).await.is_none());
        assert_eq!(sent(&mut h.wire), vec![SignalingMessage::Join]);
    }

    #[tokio::test]
    async fn test_initiator_offers_on_join_ack() {
        let mut h = harness(Role::Initiator);
        h.engine.handle_link_event(LinkEvent::Opened).await;
        h.engine
            .handle_link_event(LinkEvent::Message(SignalingMessage::JoinAck))
            .await;

        let out = sent(&mut h.wire);
        assert_eq!(offers(&out), 1);
        assert_eq!(h.engine.state(), NegotiationState::Offering);
    }

    #[tokio::test]
    async fn test_initiator_offers_once_on_join_then_join_ack() {
        let mut h = harness(Role::Initiator);
        h.engine.handle_link_event(LinkEvent::Opened).await;
        h.engine
            .handle_link_event(LinkEvent::Message(SignalingMessage::Join))
            .await;
        h.engine
            .handle_link_event(LinkEvent::Message(SignalingMessage::JoinAck))
            .await;
        h.engine
            .handle_link_event(LinkEvent::Message(SignalingMessage::Join))
            .await;

        let out = sent(&mut h.wire);
        assert_eq!(offers(&out), 1);
        // Every Join still gets an ack
        assert_eq!(
            out.iter().filter(|m| **m == SignalingMessage::JoinAck).count(),
            2
        );
    }

    #[tokio::test]
    async fn test_receiver_never_offers() {
        let mut h = harness(Role::Receiver);
        h.engine.handle_link_event(LinkEvent::Opened).await;
        for msg in [SignalingMessage::Join, SignalingMessage::JoinAck, SignalingMessage::Join] {
            h.engine.handle_link_event(LinkEvent::Message(msg)).await;
        }
        assert_eq!(offers(&sent(&mut h.wire)), 0);
        assert_eq!(h.engine.state(), NegotiationState::AwaitingPeer);
    }

    #[tokio::test]
    async fn test_receiver_answers_offer_and_drains_backlog_in_order() {
        let mut h = harness(Role::Receiver);
        h.engine.handle_link_event(LinkEvent::Opened).await;
        for n in 0..3 {
            h.engine
                .handle_link_event(LinkEvent::Message(SignalingMessage::Candidate {
                    candidate: candidate(n),
                }))
                .await;
        }
        // Nothing applied before the remote description
        assert!(h.transport.calls().is_empty());

        h.engine
            .handle_link_event(LinkEvent::Message(SignalingMessage::Offer {
                sdp: SessionDescription::new("offer"),
            }))
            .await;
        h.engine
            .handle_link_event(LinkEvent::Message(SignalingMessage::Candidate {
                candidate: candidate(3),
            }))
            .await;

        assert_eq!(
            h.transport.calls(),
            vec![
                TransportCall::SetRemote(DescriptionKind::Offer, "offer".into()),
                TransportCall::AddCandidate(candidate(0)),
                TransportCall::AddCandidate(candidate(1)),
                TransportCall::AddCandidate(candidate(2)),
                TransportCall::CreateAnswer,
                TransportCall::AddCandidate(candidate(3)),
            ]
        );
        assert!(sent(&mut h.wire)
            .iter()
            .any(|m| matches!(m, SignalingMessage::Answer { .. })));
        assert_eq!(h.engine.state(), NegotiationState::Answering);
    }

    #[tokio::test]
    async fn test_initiator_applies_backlog_after_answer() {
        let mut h = harness(Role::Initiator);
        h.engine.handle_link_event(LinkEvent::Opened).await;
        h.engine
            .handle_link_event(LinkEvent::Message(SignalingMessage::JoinAck))
            .await;
        h.engine
            .handle_link_event(LinkEvent::Message(SignalingMessage::Candidate {
                candidate: candidate(7),
            }))
            .await;
        h.engine
            .handle_link_event(LinkEvent::Message(SignalingMessage::Answer {
                sdp: SessionDescription::new("answer"),
            }))
            .await;

        assert_eq!(
            h.transport.calls(),
            vec![
                TransportCall::CreateOffer,
                TransportCall::SetRemote(DescriptionKind::Answer, "answer".into()),
                TransportCall::AddCandidate(candidate(7)),
            ]
        );
    }

    #[tokio::test]
    async fn test_second_answer_is_ignored() {
        let mut h = harness(Role::Initiator);
        h.engine.handle_link_event(LinkEvent::Opened).await;
        h.engine
            .handle_link_event(LinkEvent::Message(SignalingMessage::JoinAck))
            .await;
        for _ in 0..2 {
            h.engine
                .handle_link_event(LinkEvent::Message(SignalingMessage::Answer {
                    sdp: SessionDescription::new("answer"),
                }))
                .await;
        }
        let set_remote = h
            .transport
            .calls()
            .into_iter()
            .filter(|c| matches!(c, TransportCall::SetRemote(..)))
            .count();
        assert_eq!(set_remote, 1);
    }

    #[tokio::test]
    async fn test_initiator_ignores_offer() {
        let mut h = harness(Role::Initiator);
        h.engine.handle_link_event(LinkEvent::Opened).await;
        let end = h
            .engine
            .handle_link_event(LinkEvent::Message(SignalingMessage::Offer {
                sdp: SessionDescription::new("glare"),
            }))
            .await;
        assert!(end.is_none());
        assert!(h.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_local_candidates_before_open_flush_before_join() {
        let mut h = harness(Role::Receiver);
        for n in 0..3 {
            h.engine
                .handle_transport_event(TransportEvent::LocalCandidate(candidate(n)))
                .await;
        }
        assert!(sent(&mut h.wire).is_empty());

        h.engine.handle_link_event(LinkEvent::Opened).await;
        h.engine
            .handle_transport_event(TransportEvent::LocalCandidate(candidate(3)))
            .await;

        assert_eq!(
            sent(&mut h.wire),
            vec![
                SignalingMessage::Candidate { candidate: candidate(0) },
                SignalingMessage::Candidate { candidate: candidate(1) },
                SignalingMessage::Candidate { candidate: candidate(2) },
                SignalingMessage::Join,
                SignalingMessage::Candidate { candidate: candidate(3) },
            ]
        );
    }

    #[tokio::test]
    async fn test_repeated_open_does_not_flush_twice() {
        let mut h = harness(Role::Receiver);
        h.engine
            .handle_transport_event(TransportEvent::LocalCandidate(candidate(0)))
            .await;
        h.engine.handle_link_event(LinkEvent::Opened).await;
        h.engine.handle_link_event(LinkEvent::Opened).await;
        assert_eq!(sent(&mut h.wire).len(), 2);
    }

    #[tokio::test]
    async fn test_reply_before_open_ends_call() {
        let mut h = harness(Role::Receiver);
        let end = h
            .engine
            .handle_link_event(LinkEvent::Message(SignalingMessage::Join))
            .await;
        assert_eq!(end, Some(EndReason::ConnectionFailed));
        assert!(sent(&mut h.wire).is_empty());
    }

    #[tokio::test]
    async fn test_bye_requests_peer_ended() {
        let mut h = harness(Role::Receiver);
        h.engine.handle_link_event(LinkEvent::Opened).await;
        let end = h
            .engine
            .handle_link_event(LinkEvent::Message(SignalingMessage::Bye))
            .await;
        assert_eq!(end, Some(EndReason::PeerEnded));
    }

    #[tokio::test]
    async fn test_failure_before_connect_is_connection_failed() {
        let mut h = harness(Role::Initiator);
        let end = h
            .engine
            .handle_transport_event(TransportEvent::StateChanged(ConnectionState::Failed))
            .await;
        assert_eq!(end, Some(EndReason::ConnectionFailed));
        assert_eq!(h.engine.state(), NegotiationState::Failed);
    }

    #[tokio::test]
    async fn test_failure_after_connect_is_call_completed() {
        let mut h = harness(Role::Initiator);
        h.engine
            .handle_transport_event(TransportEvent::StateChanged(ConnectionState::Connected))
            .await;
        assert!(h.engine.ever_connected());
        let end = h.engine.handle_link_event(LinkEvent::Closed).await;
        assert_eq!(end, Some(EndReason::CallCompleted));
    }

    #[tokio::test]
    async fn test_disconnected_is_not_terminal() {
        let mut h = harness(Role::Initiator);
        let end = h
            .engine
            .handle_transport_event(TransportEvent::StateChanged(ConnectionState::Disconnected))
            .await;
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn test_rejected_frame_is_not_terminal() {
        let mut h = harness(Role::Initiator);
        let end = h
            .engine
            .handle_link_event(LinkEvent::Rejected("Unknown signaling message type: x".into()))
            .await;
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn test_offer_creation_failure_is_terminal() {
        let mut h = harness(Role::Initiator);
        h.transport.fail_offers();
        h.engine.handle_link_event(LinkEvent::Opened).await;
        let end = h
            .engine
            .handle_link_event(LinkEvent::Message(SignalingMessage::JoinAck))
            .await;
        assert_eq!(end, Some(EndReason::ConnectionFailed));
        assert_eq!(offers(&sent(&mut h.wire)), 0);
    }

    #[tokio::test]
    async fn test_events_after_finish_are_ignored() {
        let mut h = harness(Role::Receiver);
        h.engine.finish(EndReason::Hangup);
        assert_eq!(h.engine.state(), NegotiationState::Ended);
        let end = h
            .engine
            .handle_link_event(LinkEvent::Message(SignalingMessage::Bye))
            .await;
        assert!(end.is_none());
        assert_eq!(h.engine.context().session().ended_reason, Some(EndReason::Hangup));
    }
}

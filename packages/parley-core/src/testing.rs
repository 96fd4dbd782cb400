//! Recording fakes shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::call::{
    DescriptionKind, IceServer, MediaCapture, MediaSource, PeerTransport, TransportEvent,
    TransportFactory,
};
use crate::error::{Error, Result};
use crate::service::{
    EndCallReport, JoinResponse, RateResponse, RatingSubmission, SessionLookup, SessionService,
};
use crate::session::{DurationTable, Level, Role, SessionContext, SessionInfo};
use crate::signaling::{IceCandidate, SessionDescription};

pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn session_info(level: &str) -> SessionInfo {
    SessionInfo {
        id: "sess-1".into(),
        user1_id: "alice".into(),
        user2_id: "bob".into(),
        level: level.into(),
        created_at: t0(),
        partner: None,
    }
}

/// Beginner session seen from alice (initiator) or bob (receiver).
pub fn context(role: Role) -> SessionContext {
    let user = match role {
        Role::Initiator => "alice",
        Role::Receiver => "bob",
    };
    SessionContext::new(session_info("beginner"), user, &DurationTable::default()).unwrap()
}

pub fn candidate(n: u32) -> IceCandidate {
    IceCandidate::new(serde_json::json!({
        "candidate": format!("candidate:{} 1 udp 2122260223 10.0.0.{} 5000{} typ host", n, n, n),
        "sdpMid": "0",
        "sdpMLineIndex": 0
    }))
}

// ============================================================================
// MEDIA
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct FakeMedia {
    stops: Arc<AtomicUsize>,
}

impl FakeMedia {
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl MediaCapture for FakeMedia {
    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeMediaSource {
    pub media: FakeMedia,
    pub deny: bool,
}

#[async_trait]
impl MediaSource for FakeMediaSource {
    async fn acquire(&self) -> Result<Box<dyn MediaCapture>> {
        if self.deny {
            return Err(Error::MediaAcquisition("permission denied".into()));
        }
        Ok(Box::new(self.media.clone()))
    }
}

// ============================================================================
// TRANSPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    CreateOffer,
    CreateAnswer,
    SetRemote(DescriptionKind, String),
    AddCandidate(IceCandidate),
    Close,
}

#[derive(Debug, Default)]
struct TransportInner {
    calls: Vec<TransportCall>,
    fail_offers: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    inner: Arc<Mutex<TransportInner>>,
}

impl FakeTransport {
    /// Calls other than `Close`, in order.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|c| **c != TransportCall::Close)
            .cloned()
            .collect()
    }

    pub fn closes(&self) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|c| **c == TransportCall::Close)
            .count()
    }

    pub fn fail_offers(&self) {
        self.inner.lock().fail_offers = true;
    }

    fn record(&self, call: TransportCall) {
        self.inner.lock().calls.push(call);
    }
}

#[async_trait]
impl PeerTransport for FakeTransport {
    async fn create_offer(&mut self) -> Result<SessionDescription> {
        self.record(TransportCall::CreateOffer);
        if self.inner.lock().fail_offers {
            return Err(Error::Negotiation("offer refused".into()));
        }
        Ok(SessionDescription::new("v=0 offer"))
    }

    async fn create_answer(&mut self) -> Result<SessionDescription> {
        self.record(TransportCall::CreateAnswer);
        Ok(SessionDescription::new("v=0 answer"))
    }

    async fn set_remote_description(
        &mut self,
        kind: DescriptionKind,
        description: SessionDescription,
    ) -> Result<()> {
        self.record(TransportCall::SetRemote(kind, description.as_str().to_string()));
        Ok(())
    }

    async fn add_remote_candidate(&mut self, candidate: IceCandidate) -> Result<()> {
        self.record(TransportCall::AddCandidate(candidate));
        Ok(())
    }

    async fn close(&mut self) {
        self.record(TransportCall::Close);
    }
}

/// Hands out one shared [`FakeTransport`] and keeps the event sender so a
/// test can inject transport events.
#[derive(Debug, Default)]
pub struct FakeTransportFactory {
    pub transport: FakeTransport,
    pub fail: bool,
    events: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    servers: Mutex<Vec<IceServer>>,
}

impl FakeTransportFactory {
    pub fn events(&self) -> mpsc::UnboundedSender<TransportEvent> {
        self.events
            .lock()
            .clone()
            .expect("transport not created yet")
    }

    pub fn servers(&self) -> Vec<IceServer> {
        self.servers.lock().clone()
    }
}

impl TransportFactory for FakeTransportFactory {
    fn create(
        &self,
        ice_servers: &[IceServer],
    ) -> Result<(Box<dyn PeerTransport>, mpsc::UnboundedReceiver<TransportEvent>)> {
        if self.fail {
            return Err(Error::TransportFailure("no transport".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.events.lock() = Some(tx);
        *self.servers.lock() = ice_servers.to_vec();
        Ok((Box::new(self.transport.clone()), rx))
    }
}

// ============================================================================
// SESSION SERVICE
// ============================================================================

#[derive(Debug, Default)]
struct ServiceInner {
    joins: Vec<(String, Level)>,
    lookups: VecDeque<Result<SessionLookup>>,
    lookup_calls: usize,
    leaves: Vec<String>,
    reports: Vec<EndCallReport>,
    ratings: Vec<RatingSubmission>,
    rated: HashMap<String, usize>,
    join_matched: bool,
    fail_end_call: bool,
    end_call_delay: Option<Duration>,
    ice_servers: Vec<IceServer>,
}

/// In-memory session service. Ratings behave as the backend's rendezvous:
/// the second submission for a session is the one that gets points.
#[derive(Debug, Clone, Default)]
pub struct FakeService {
    inner: Arc<Mutex<ServiceInner>>,
}

impl FakeService {
    pub fn push_lookup(&self, lookup: Result<SessionLookup>) {
        self.inner.lock().lookups.push_back(lookup);
    }

    pub fn active(info: SessionInfo) -> SessionLookup {
        SessionLookup {
            active_session: true,
            session: Some(info),
        }
    }

    pub fn set_join_matched(&self, matched: bool) {
        self.inner.lock().join_matched = matched;
    }

    pub fn fail_end_call(&self) {
        self.inner.lock().fail_end_call = true;
    }

    pub fn delay_end_call(&self, delay: Duration) {
        self.inner.lock().end_call_delay = Some(delay);
    }

    pub fn set_ice_servers(&self, servers: Vec<IceServer>) {
        self.inner.lock().ice_servers = servers;
    }

    pub fn joins(&self) -> Vec<(String, Level)> {
        self.inner.lock().joins.clone()
    }

    pub fn lookup_calls(&self) -> usize {
        self.inner.lock().lookup_calls
    }

    pub fn leaves(&self) -> Vec<String> {
        self.inner.lock().leaves.clone()
    }

    pub fn reports(&self) -> Vec<EndCallReport> {
        self.inner.lock().reports.clone()
    }

    pub fn ratings(&self) -> Vec<RatingSubmission> {
        self.inner.lock().ratings.clone()
    }
}

#[async_trait]
impl SessionService for FakeService {
    async fn join_queue(&self, user_id: &str, level: Level) -> Result<JoinResponse> {
        let mut inner = self.inner.lock();
        inner.joins.push((user_id.to_string(), level));
        Ok(JoinResponse {
            matched: inner.join_matched,
        })
    }

    async fn session_for(&self, _user_id: &str) -> Result<SessionLookup> {
        let mut inner = self.inner.lock();
        inner.lookup_calls += 1;
        inner
            .lookups
            .pop_front()
            .unwrap_or_else(|| Ok(SessionLookup::default()))
    }

    async fn leave_queue(&self, user_id: &str) -> Result<()> {
        self.inner.lock().leaves.push(user_id.to_string());
        Ok(())
    }

    async fn end_call(&self, report: &EndCallReport) -> Result<()> {
        let (delay, fail) = {
            let mut inner = self.inner.lock();
            inner.reports.push(report.clone());
            (inner.end_call_delay, inner.fail_end_call)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(Error::BackendReport("service unavailable".into()));
        }
        Ok(())
    }

    async fn rate(&self, submission: &RatingSubmission) -> Result<RateResponse> {
        let mut inner = self.inner.lock();
        inner.ratings.push(submission.clone());
        let count = inner.rated.entry(submission.session_id.clone()).or_default();
        *count += 1;
        Ok(RateResponse {
            points_awarded: (*count == 2).then_some(10),
        })
    }

    async fn ice_servers(&self) -> Result<Vec<IceServer>> {
        Ok(self.inner.lock().ice_servers.clone())
    }
}

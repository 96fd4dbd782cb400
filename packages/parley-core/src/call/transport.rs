//! Seams for the media and peer-transport primitives.
//!
//! Codec negotiation and NAT traversal live behind [`PeerTransport`]; this
//! crate only sequences the calls into it. Implementations of
//! [`PeerTransport`], [`TransportFactory`] and [`MediaSource`] come from the
//! embedding application, which owns the platform's media and WebRTC stack.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::signaling::{IceCandidate, SessionDescription};

/// STUN/TURN entry from `GET /ice-servers`, passed through to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    /// One or more `stun:`/`turn:` URLs
    #[serde(deserialize_with = "one_or_many")]
    pub urls: Vec<String>,
    /// TURN username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// TURN credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Urls {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Urls::deserialize(deserializer)? {
        Urls::One(url) => vec![url],
        Urls::Many(urls) => urls,
    })
}

/// Which side produced a description being applied remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionKind {
    /// From an `Offer`
    Offer,
    /// From an `Answer`
    Answer,
}

/// Peer connection state as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Created, nothing negotiated
    New,
    /// Connectivity checks running
    Connecting,
    /// Media flowing
    Connected,
    /// Temporarily lost; may recover
    Disconnected,
    /// Gave up
    Failed,
    /// Closed locally
    Closed,
}

/// Asynchronous output of a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A local candidate to trickle to the peer
    LocalCandidate(IceCandidate),
    /// Connection state moved
    StateChanged(ConnectionState),
}

/// The peer connection. Creating a description also applies it locally.
#[async_trait]
pub trait PeerTransport: Send {
    /// Create and apply a local offer.
    async fn create_offer(&mut self) -> Result<SessionDescription>;

    /// Create and apply a local answer to the remote offer.
    async fn create_answer(&mut self) -> Result<SessionDescription>;

    /// Apply the peer's description.
    async fn set_remote_description(
        &mut self,
        kind: DescriptionKind,
        description: SessionDescription,
    ) -> Result<()>;

    /// Apply one of the peer's candidates.
    async fn add_remote_candidate(&mut self, candidate: IceCandidate) -> Result<()>;

    /// Release the connection. Must be safe to call more than once.
    async fn close(&mut self);
}

/// Builds one transport per call.
pub trait TransportFactory: Send + Sync {
    /// Create a transport configured with `ice_servers`, plus its event stream.
    fn create(
        &self,
        ice_servers: &[IceServer],
    ) -> Result<(Box<dyn PeerTransport>, mpsc::UnboundedReceiver<TransportEvent>)>;
}

/// Live camera/microphone capture.
pub trait MediaCapture: Send {
    /// Stop all tracks. Must be safe to call more than once.
    fn stop(&mut self);
}

/// Acquires local media.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Acquire camera and microphone.
    ///
    /// Fails with [`crate::Error::MediaAcquisition`] when denied or absent.
    async fn acquire(&self) -> Result<Box<dyn MediaCapture>>;
}

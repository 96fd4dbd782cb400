//! Session-scoped link to the signaling relay.
//!
//! The link itself only tracks readiness and hands outbound messages to
//! whatever drives the socket (see [`super::ws`]). Inbound traffic arrives as
//! [`LinkEvent`]s on a separate channel so the call loop can dispatch them
//! alongside every other event.
//!
//! ```text
//!   Connecting ──Opened──► Open ──Closed/Error/close()──► Closed
//!        └────────────Closed/Error/close()───────────────────┘
//! ```

use tokio::sync::mpsc;

use super::message::SignalingMessage;

/// Readiness of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Socket not yet established
    Connecting,
    /// Messages can be sent
    Open,
    /// Gone for good; no reconnect
    Closed,
}

/// Instructions for the socket driver.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkCommand {
    /// Write one envelope
    Send(SignalingMessage),
    /// Close the socket
    Close,
}

/// What the socket driver reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Socket established
    Opened,
    /// A well-formed envelope from the other participant
    Message(SignalingMessage),
    /// A frame that failed to decode; carries the decode error text
    Rejected(String),
    /// Socket errored; terminal
    Error(String),
    /// Socket closed; terminal
    Closed,
}

/// Result of [`SignalingLink::send`]. Sending never fails loudly.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Handed to the socket driver
    Sent,
    /// Link still connecting; the message is handed back for deferral
    NotReady(SignalingMessage),
    /// Link closed or the driver is gone; the message was dropped
    Closed(SignalingMessage),
}

/// Client end of one session's signaling channel.
#[derive(Debug)]
pub struct SignalingLink {
    session_id: String,
    state: LinkState,
    commands: mpsc::UnboundedSender<LinkCommand>,
}

impl SignalingLink {
    /// Create a link in `Connecting` state plus the command stream its
    /// driver consumes.
    pub fn new(session_id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<LinkCommand>) {
        let (commands, rx) = mpsc::unbounded_channel();
        (
            Self {
                session_id: session_id.into(),
                state: LinkState::Connecting,
                commands,
            },
            rx,
        )
    }

    /// Session this link belongs to.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current readiness.
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Whether messages can be sent right now.
    pub fn is_open(&self) -> bool {
        self.state == LinkState::Open
    }

    /// Record that the driver reported `Opened`. Returns `false` if the link
    /// was not connecting (already open or closed).
    pub fn mark_open(&mut self) -> bool {
        if self.state != LinkState::Connecting {
            return false;
        }
        self.state = LinkState::Open;
        tracing::debug!(session_id = self.session_id.as_str(), "Signaling link open");
        true
    }

    /// Record that the driver reported the socket gone.
    pub fn mark_closed(&mut self) {
        self.state = LinkState::Closed;
    }

    /// Send a message, or hand it back if the link is not ready.
    pub fn send(&mut self, message: SignalingMessage) -> SendOutcome {
        match self.state {
            LinkState::Connecting => SendOutcome::NotReady(message),
            LinkState::Closed => SendOutcome::Closed(message),
            LinkState::Open => match self.commands.send(LinkCommand::Send(message)) {
                Ok(()) => SendOutcome::Sent,
                Err(mpsc::error::SendError(cmd)) => {
                    self.state = LinkState::Closed;
                    match cmd {
                        LinkCommand::Send(message) => SendOutcome::Closed(message),
                        LinkCommand::Close => unreachable!("only Send was queued"),
                    }
                }
            },
        }
    }

    /// Close the link. Idempotent.
    pub fn close(&mut self) {
        if self.state == LinkState::Closed {
            return;
        }
        self.state = LinkState::Closed;
        let _ = self.commands.send(LinkCommand::Close);
        tracing::debug!(session_id = self.session_id.as_str(), "Signaling link closed");
    }
}

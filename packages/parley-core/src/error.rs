//! # Error Handling
//!
//! Error types for Parley Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Session Errors                                                    │
//! │  │   ├── InvalidSession        - Session object is malformed           │
//! │  │   ├── NotParticipant        - Local user is not in the session      │
//! │  │   └── UnknownLevel          - Level has no duration entry           │
//! │  │                                                                      │
//! │  ├── Media Errors                                                      │
//! │  │   └── MediaAcquisition      - Camera/microphone denied/unavailable  │
//! │  │                                                                      │
//! │  ├── Signaling Errors                                                  │
//! │  │   ├── SignalingLink         - Relay channel unreachable/errored     │
//! │  │   ├── LinkClosed            - Relay channel already closed          │
//! │  │   ├── UnknownMessageType    - Envelope `type` not recognised        │
//! │  │   └── MalformedMessage      - Envelope payload does not parse       │
//! │  │                                                                      │
//! │  ├── Transport Errors                                                  │
//! │  │   ├── TransportFailure      - Negotiated connection failed          │
//! │  │   └── Negotiation           - Offer/answer/candidate step failed    │
//! │  │                                                                      │
//! │  ├── Backend Errors                                                    │
//! │  │   ├── BackendReport         - End-call or rating report failed      │
//! │  │   ├── MatchingPoll          - Matching queue request failed         │
//! │  │   └── Http                  - Unexpected HTTP status / body         │
//! │  │                                                                      │
//! │  └── Rating Errors                                                     │
//! │      └── InvalidVerdict        - Score outside 1..=5                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Terminal vs Recoverable
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      ERROR HANDLING FLOW                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Terminal (media, link, transport)                                     │
//! │    └─► TerminationCoordinator::terminate(reason)                       │
//! │          └─► one readable message + way back to home view              │
//! │                                                                         │
//! │  Recoverable (matching poll, backend report)                           │
//! │    └─► logged, retried (poll) or skipped (report)                      │
//! │          └─► never blocks local cleanup                                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for Parley Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Parley Core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Session Errors (100-199)
    // ========================================================================

    /// The session object handed over by the matching service is malformed
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    /// The local user is neither participant of the session
    #[error("User {0} is not a participant of this session.")]
    NotParticipant(String),

    /// The session level is not one we know a duration for
    #[error("Unknown session level: {0}")]
    UnknownLevel(String),

    // ========================================================================
    // Media Errors (200-299)
    // ========================================================================

    /// Camera or microphone denied or unavailable
    #[error("Could not access camera or microphone: {0}")]
    MediaAcquisition(String),

    // ========================================================================
    // Signaling Errors (300-399)
    // ========================================================================

    /// The signaling relay channel errored or could not be reached
    #[error("Signaling link error: {0}")]
    SignalingLink(String),

    /// The signaling relay channel is already closed
    #[error("Signaling link is closed.")]
    LinkClosed,

    /// A signaling envelope carried an unrecognised `type`
    #[error("Unknown signaling message type: {0}")]
    UnknownMessageType(String),

    /// A signaling envelope could not be parsed
    #[error("Malformed signaling message: {0}")]
    MalformedMessage(String),

    // ========================================================================
    // Transport Errors (400-499)
    // ========================================================================

    /// The negotiated peer connection went to `failed`
    #[error("Peer connection failed: {0}")]
    TransportFailure(String),

    /// An offer/answer/candidate step was rejected by the transport
    #[error("Negotiation step failed: {0}")]
    Negotiation(String),

    // ========================================================================
    // Backend Errors (500-599)
    // ========================================================================

    /// Reporting to the session service failed
    #[error("Failed to report to session service: {0}")]
    BackendReport(String),

    /// Polling the matching queue failed
    #[error("Matching request failed: {0}")]
    MatchingPoll(String),

    /// Unexpected HTTP status or body
    #[error("HTTP error: {0}")]
    Http(String),

    // ========================================================================
    // Rating Errors (600-699)
    // ========================================================================

    /// Rating score outside the accepted range
    #[error("Rating must be between 1 and 5, got {0}.")]
    InvalidVerdict(u8),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Configuration value could not be used
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// - 100-199: Session
    /// - 200-299: Media
    /// - 300-399: Signaling
    /// - 400-499: Transport
    /// - 500-599: Backend
    /// - 600-699: Rating
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidSession(_) => 100,
            Error::NotParticipant(_) => 101,
            Error::UnknownLevel(_) => 102,

            Error::MediaAcquisition(_) => 200,

            Error::SignalingLink(_) => 300,
            Error::LinkClosed => 301,
            Error::UnknownMessageType(_) => 302,
            Error::MalformedMessage(_) => 303,

            Error::TransportFailure(_) => 400,
            Error::Negotiation(_) => 401,

            Error::BackendReport(_) => 500,
            Error::MatchingPoll(_) => 501,
            Error::Http(_) => 502,

            Error::InvalidVerdict(_) => 600,

            Error::Config(_) => 900,
            Error::Serialization(_) => 901,
            Error::Internal(_) => 902,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors are retried (matching poll) or logged and skipped
    /// (backend reports). They never end a call.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::MatchingPoll(_) | Error::BackendReport(_) | Error::Http(_)
        )
    }

    /// Check if this error ends the call it occurred in
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Error::MediaAcquisition(_)
                | Error::SignalingLink(_)
                | Error::LinkClosed
                | Error::TransportFailure(_)
        )
    }

    /// The single readable message shown to the user for this error
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::MediaAcquisition(_) => {
                "We couldn't access your camera or microphone. Check permissions and try again."
            }
            Error::SignalingLink(_) | Error::LinkClosed => {
                "Lost connection to the call server."
            }
            Error::TransportFailure(_) | Error::Negotiation(_) => {
                "The connection to your partner failed."
            }
            Error::MatchingPoll(_) | Error::Http(_) | Error::BackendReport(_) => {
                "Connection error. Retrying..."
            }
            _ => "Something went wrong.",
        }
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::SignalingLink(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::InvalidSession("x".into()).code(), 100);
        assert_eq!(Error::MediaAcquisition("denied".into()).code(), 200);
        assert_eq!(Error::LinkClosed.code(), 301);
        assert_eq!(Error::TransportFailure("ice".into()).code(), 400);
        assert_eq!(Error::BackendReport("503".into()).code(), 500);
        assert_eq!(Error::InvalidVerdict(9).code(), 600);
        assert_eq!(Error::Internal("test".into()).code(), 902);
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(Error::MatchingPoll("timeout".into()).is_recoverable());
        assert!(Error::BackendReport("500".into()).is_recoverable());
        assert!(!Error::MediaAcquisition("denied".into()).is_recoverable());
        assert!(!Error::LinkClosed.is_recoverable());
    }

    #[test]
    fn test_terminal_errors() {
        assert!(Error::MediaAcquisition("denied".into()).is_terminal());
        assert!(Error::SignalingLink("refused".into()).is_terminal());
        assert!(Error::TransportFailure("failed".into()).is_terminal());
        assert!(!Error::BackendReport("500".into()).is_terminal());
        assert!(!Error::MatchingPoll("dns".into()).is_terminal());
    }

    #[test]
    fn test_user_message_is_generic_for_internal() {
        assert_eq!(Error::Internal("boom".into()).user_message(), "Something went wrong.");
        assert!(Error::LinkClosed.user_message().contains("call server"));
    }
}

//! # Session Service
//!
//! Client-side contract of the matching/session backend. The core consumes
//! these endpoints; it implements none of them.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       SESSION SERVICE (REST)                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  POST /matching/join        {user_id, level}        → {matched}        │
//! │  GET  /matching/session/:u                          → {active_session, │
//! │                                                         session?}       │
//! │  POST /matching/leave       {user_id}                                  │
//! │  POST /matching/end         {session_id, user_id, reason}              │
//! │  POST /matching/rate        {session_id, user_id, rating}              │
//! │                                                     → {points_awarded?}│
//! │  GET  /ice-servers                                  → [IceServer]      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::call::{EndReason, IceServer};
use crate::error::Result;
use crate::session::{Level, SessionInfo};

pub use http::HttpSessionService;

/// Response to `POST /matching/join`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinResponse {
    /// A partner was found immediately
    #[serde(default)]
    pub matched: bool,
}

/// Response to `GET /matching/session/{user_id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLookup {
    /// The user is in a live session
    #[serde(default)]
    pub active_session: bool,
    /// That session, when active
    #[serde(default)]
    pub session: Option<SessionInfo>,
}

impl SessionLookup {
    /// The session, if the lookup says one is active.
    pub fn into_active(self) -> Option<SessionInfo> {
        if self.active_session {
            self.session
        } else {
            None
        }
    }
}

/// Body of `POST /matching/end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndCallReport {
    /// Session that ended
    pub session_id: String,
    /// Reporting user
    pub user_id: String,
    /// Why it ended
    pub reason: EndReason,
}

/// Body of `POST /matching/rate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingSubmission {
    /// Rated session
    pub session_id: String,
    /// Rating user
    pub user_id: String,
    /// Score, 1..=5
    pub rating: u8,
}

/// Response to `POST /matching/rate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateResponse {
    /// Present only on the submission that completed the pair
    #[serde(default)]
    pub points_awarded: Option<u64>,
}

/// The matching/session backend.
#[async_trait]
pub trait SessionService: Send + Sync {
    /// Enter the matching queue.
    async fn join_queue(&self, user_id: &str, level: Level) -> Result<JoinResponse>;

    /// Look up the user's live session.
    async fn session_for(&self, user_id: &str) -> Result<SessionLookup>;

    /// Leave the matching queue.
    async fn leave_queue(&self, user_id: &str) -> Result<()>;

    /// Report that a call ended.
    async fn end_call(&self, report: &EndCallReport) -> Result<()>;

    /// Submit a post-call rating.
    async fn rate(&self, submission: &RatingSubmission) -> Result<RateResponse>;

    /// Transport relay configuration.
    async fn ice_servers(&self) -> Result<Vec<IceServer>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_report_body() {
        let report = EndCallReport {
            session_id: "s1".into(),
            user_id: "alice".into(),
            reason: EndReason::ConnectionFailed,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"session_id": "s1", "user_id": "alice", "reason": "connection_failed"})
        );
    }

    #[test]
    fn test_inactive_lookup_yields_nothing() {
        let lookup: SessionLookup = serde_json::from_str(r#"{"active_session":false}"#).unwrap();
        assert!(lookup.into_active().is_none());
    }

    #[test]
    fn test_rate_response_without_award() {
        let resp: RateResponse = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert_eq!(resp.points_awarded, None);
    }
}

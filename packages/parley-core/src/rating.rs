//! # Rating Gate
//!
//! Post-call rating. Points are awarded by the session service only once
//! both participants have rated the same session; the client just submits
//! its own verdict and reports what came back.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         RATING RENDEZVOUS                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   Participant A                Service                Participant B     │
//! │   ─────────────                ───────                ─────────────     │
//! │   rate(4) ──────────────────► 1 of 2                                    │
//! │           ◄── Pending ──────                                            │
//! │                                2 of 2 ◄───────────────────── rate(5)    │
//! │                                       ─── Awarded(10) ─────────►        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A gate is only handed out for calls that ever connected; see
//! [`CallOutcome::rating_gate`](crate::call::CallOutcome::rating_gate).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::service::{RatingSubmission, SessionService};

/// A 1..=5 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Verdict(u8);

impl Verdict {
    /// Lowest score
    pub const MIN: u8 = 1;
    /// Highest score
    pub const MAX: u8 = 5;

    /// Validate a score.
    pub fn new(score: u8) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&score) {
            Ok(Self(score))
        } else {
            Err(Error::InvalidVerdict(score))
        }
    }

    /// The score.
    pub fn score(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Verdict {
    type Error = Error;

    fn try_from(score: u8) -> Result<Self> {
        Self::new(score)
    }
}

impl From<Verdict> for u8 {
    fn from(verdict: Verdict) -> u8 {
        verdict.0
    }
}

/// What the service said about a submitted rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingOutcome {
    /// Recorded; the partner has not rated yet
    Pending,
    /// Both have rated; points granted to this user
    Awarded(u64),
}

/// One user's rating of one session. Submits at most once.
pub struct RatingGate {
    service: Arc<dyn SessionService>,
    session_id: String,
    user_id: String,
    outcome: Option<RatingOutcome>,
}

impl std::fmt::Debug for RatingGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatingGate")
            .field("session_id", &self.session_id)
            .field("user_id", &self.user_id)
            .field("outcome", &self.outcome)
            .finish()
    }
}

impl RatingGate {
    /// Gate for `user_id` rating `session_id`.
    pub fn new(service: Arc<dyn SessionService>, session_id: &str, user_id: &str) -> Self {
        Self {
            service,
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            outcome: None,
        }
    }

    /// The session being rated.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Outcome of the accepted submission, if any.
    pub fn outcome(&self) -> Option<RatingOutcome> {
        self.outcome
    }

    /// Submit `verdict`. After one accepted submission, later calls return
    /// the same outcome without contacting the service. A failed request
    /// can be retried.
    pub async fn submit(&mut self, verdict: Verdict) -> Result<RatingOutcome> {
        if let Some(outcome) = self.outcome {
            tracing::debug!(
                session_id = self.session_id.as_str(),
                "Rating already submitted"
            );
            return Ok(outcome);
        }

        let submission = RatingSubmission {
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            rating: verdict.score(),
        };
        let response = self.service.rate(&submission).await?;

        let outcome = match response.points_awarded {
            Some(points) => RatingOutcome::Awarded(points),
            None => RatingOutcome::Pending,
        };
        tracing::info!(
            session_id = self.session_id.as_str(),
            user_id = self.user_id.as_str(),
            score = verdict.score(),
            outcome = ?outcome,
            "Rating submitted"
        );
        self.outcome = Some(outcome);
        Ok(outcome)
    }
}

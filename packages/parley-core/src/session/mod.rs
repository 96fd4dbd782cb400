//! # Session Context
//!
//! The immutable description of one matched call, produced by the external
//! matching service and handed to the call machinery.
//!
//! ## Role Assignment
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        ROLE ASSIGNMENT                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  session.user1_id == local user  ──►  Role::Initiator (sends Offer)    │
//! │  session.user2_id == local user  ──►  Role::Receiver  (never offers)   │
//! │  neither                          ──►  Error::NotParticipant            │
//! │                                                                         │
//! │  Fixed when the context is built. Nothing downstream can change it.    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod wire;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::call::EndReason;
use crate::error::{Error, Result};

pub use wire::{parse_timestamp, PartnerInfo, SessionInfo};

/// Proficiency level the pair was matched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// Short calls
    Beginner,
    /// Standard calls
    Intermediate,
    /// Standard calls
    Advanced,
}

impl Level {
    /// Wire name of the level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Beginner => "beginner",
            Level::Intermediate => "intermediate",
            Level::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(Level::Beginner),
            "intermediate" => Ok(Level::Intermediate),
            "advanced" => Ok(Level::Advanced),
            other => Err(Error::UnknownLevel(other.to_string())),
        }
    }
}

/// Call length per level, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationTable {
    /// Budget for beginner sessions
    pub beginner: u64,
    /// Budget for intermediate sessions
    pub intermediate: u64,
    /// Budget for advanced sessions
    pub advanced: u64,
}

impl Default for DurationTable {
    fn default() -> Self {
        Self {
            beginner: 300,
            intermediate: 600,
            advanced: 600,
        }
    }
}

impl DurationTable {
    /// Budget in seconds for a level.
    pub fn budget_for(&self, level: Level) -> u64 {
        match level {
            Level::Beginner => self.beginner,
            Level::Intermediate => self.intermediate,
            Level::Advanced => self.advanced,
        }
    }
}

/// Which side of the negotiation the local endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Always produces the first offer
    Initiator,
    /// Never offers; answers the initiator
    Receiver,
}

impl Role {
    /// Whether this role sends the first `Offer`.
    pub fn is_initiator(&self) -> bool {
        matches!(self, Role::Initiator)
    }
}

/// One matched call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Session id (also the signaling room id)
    pub id: String,
    /// The initiator
    pub participant_a: String,
    /// The receiver
    pub participant_b: String,
    /// Level the pair was matched on
    pub level: Level,
    /// When the backend created the session
    pub created_at: DateTime<Utc>,
    /// Total call length in seconds
    pub duration_budget_secs: u64,
    /// Set once, when the call terminates
    pub ended_reason: Option<EndReason>,
}

/// The other participant as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partner {
    /// Partner user id
    pub id: String,
    /// Partner display name
    pub username: String,
}

/// Session plus the local endpoint's fixed view of it.
#[derive(Debug, Clone)]
pub struct SessionContext {
    session: Session,
    local_user_id: String,
    role: Role,
    partner: Partner,
}

impl SessionContext {
    /// Build the context for `local_user_id` from the service's session object.
    ///
    /// The role is fixed here: `user1_id` is the initiator.
    pub fn new(info: SessionInfo, local_user_id: &str, durations: &DurationTable) -> Result<Self> {
        if info.id.is_empty() {
            return Err(Error::InvalidSession("empty session id".into()));
        }
        if info.user1_id == info.user2_id {
            return Err(Error::InvalidSession(format!(
                "session {} pairs user {} with itself",
                info.id, info.user1_id
            )));
        }

        let role = if info.user1_id == local_user_id {
            Role::Initiator
        } else if info.user2_id == local_user_id {
            Role::Receiver
        } else {
            return Err(Error::NotParticipant(local_user_id.to_string()));
        };

        let level: Level = info.level.parse()?;
        let other_id = match role {
            Role::Initiator => info.user2_id.clone(),
            Role::Receiver => info.user1_id.clone(),
        };
        let partner = match info.partner {
            Some(p) => Partner {
                id: p.id,
                username: p.username,
            },
            None => Partner {
                username: other_id.clone(),
                id: other_id,
            },
        };

        tracing::debug!(
            session_id = info.id.as_str(),
            user_id = local_user_id,
            role = ?role,
            level = level.as_str(),
            "Session context built"
        );

        Ok(Self {
            session: Session {
                id: info.id,
                participant_a: info.user1_id,
                participant_b: info.user2_id,
                level,
                created_at: info.created_at,
                duration_budget_secs: durations.budget_for(level),
                ended_reason: None,
            },
            local_user_id: local_user_id.to_string(),
            role,
            partner,
        })
    }

    /// The session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Session id.
    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    /// Local user id.
    pub fn local_user_id(&self) -> &str {
        &self.local_user_id
    }

    /// Local role. Immutable for the session's lifetime.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The other participant.
    pub fn partner(&self) -> &Partner {
        &self.partner
    }

    /// Record why the call ended. Only the first reason sticks.
    pub(crate) fn mark_ended(&mut self, reason: EndReason) {
        if self.session.ended_reason.is_none() {
            self.session.ended_reason = Some(reason);
        }
    }
}

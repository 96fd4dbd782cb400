//! Server state management.
//!
//! One room per session id, holding at most two attached connections.
//! All data structures are concurrent (DashMap) for lock-free access.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::{Outbound, RelayStats, CLOSE_REPLACED, REPLACED_REASON};

/// Participants allowed per session.
pub const MAX_PARTICIPANTS: usize = 2;

/// Default room TTL in seconds (1 hour).
const DEFAULT_ROOM_TTL_SECS: i64 = 3600;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub port: u16,
    /// Rooms older than this with no live connection are swept
    pub room_ttl_secs: i64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            room_ttl_secs: DEFAULT_ROOM_TTL_SECS,
        }
    }
}

/// A connection's outbox.
pub type ConnSender = mpsc::UnboundedSender<Outbound>;

/// One attached connection.
#[derive(Debug, Clone)]
pub struct Participant {
    pub user_id: String,
    pub conn_id: Uuid,
    pub sender: ConnSender,
}

/// The relay channel of one session.
#[derive(Debug, Clone)]
pub struct Room {
    pub participants: Vec<Participant>,
    pub created_at: DateTime<Utc>,
}

/// Why an attach was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachError {
    /// Two other participants are already attached
    SessionFull,
}

/// Shared server state.
#[derive(Clone)]
pub struct RelayState {
    /// Session ID → room.
    pub rooms: Arc<DashMap<String, Room>>,

    /// Server configuration.
    pub config: RelayConfig,
}

impl RelayState {
    /// Create a new relay state with the given configuration.
    pub fn new(config: RelayConfig) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            config,
        }
    }

    // ── Attach / Detach ───────────────────────────────────────────────────

    /// Attach a connection for `user_id` to `session_id`, creating the room
    /// on first use. A user attaching again replaces its previous connection,
    /// which is told to close.
    pub fn attach(
        &self,
        session_id: &str,
        user_id: &str,
        sender: ConnSender,
    ) -> Result<Uuid, AttachError> {
        let conn_id = Uuid::new_v4();
        let participant = Participant {
            user_id: user_id.to_string(),
            conn_id,
            sender,
        };

        match self.rooms.entry(session_id.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(Room {
                    participants: vec![participant],
                    created_at: Utc::now(),
                });
                tracing::info!(session_id, user_id, "Room created");
            }
            Entry::Occupied(mut occupied) => {
                let room = occupied.get_mut();
                let existing = room.participants.iter().position(|p| p.user_id == user_id);
                if let Some(index) = existing {
                    let stale = std::mem::replace(&mut room.participants[index], participant);
                    let _ = stale.sender.send(Outbound::Close {
                        code: CLOSE_REPLACED,
                        reason: REPLACED_REASON,
                    });
                    tracing::info!(session_id, user_id, "Participant reattached");
                } else if room.participants.len() >= MAX_PARTICIPANTS {
                    tracing::warn!(session_id, user_id, "Session full; attach refused");
                    return Err(AttachError::SessionFull);
                } else {
                    room.participants.push(participant);
                    tracing::info!(
                        session_id,
                        user_id,
                        participant_count = room.participants.len(),
                        "Participant attached"
                    );
                }
            }
        }

        Ok(conn_id)
    }

    /// Detach one connection. Returns how many participants remain; the room
    /// is removed when none do. A connection that was already replaced
    /// detaches without touching its replacement.
    pub fn detach(&self, session_id: &str, conn_id: Uuid) -> usize {
        let remaining = match self.rooms.get_mut(session_id) {
            Some(mut room) => {
                room.participants.retain(|p| p.conn_id != conn_id);
                room.participants.len()
            }
            None => return 0,
        };

        if remaining == 0
            && self
                .rooms
                .remove_if(session_id, |_, room| room.participants.is_empty())
                .is_some()
        {
            tracing::info!(session_id, "Room removed");
        }

        remaining
    }

    // ── Forwarding ────────────────────────────────────────────────────────

    /// Hand a frame from `from` to the other participant of the session.
    /// Returns the number of connections it was queued on. Frames from a
    /// connection that is no longer attached (replaced or detached) go nowhere.
    pub fn forward(&self, session_id: &str, from: Uuid, text: &str) -> usize {
        let Some(room) = self.rooms.get(session_id) else {
            return 0;
        };
        let Some(sender) = room.participants.iter().find(|p| p.conn_id == from) else {
            tracing::debug!(session_id, conn_id = %from, "Frame from detached connection dropped");
            return 0;
        };
        room.participants
            .iter()
            .filter(|p| p.user_id != sender.user_id)
            .filter(|p| p.sender.send(Outbound::Frame(text.to_string())).is_ok())
            .count()
    }

    // ── Stats ─────────────────────────────────────────────────────────────

    /// Number of rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Room and connection counts.
    pub fn stats(&self) -> RelayStats {
        let mut stats = RelayStats {
            active_sessions: 0,
            connected_participants: 0,
            paired_sessions: 0,
        };
        for room in self.rooms.iter() {
            stats.active_sessions += 1;
            stats.connected_participants += room.participants.len();
            if room.participants.len() == MAX_PARTICIPANTS {
                stats.paired_sessions += 1;
            }
        }
        stats
    }

    // ── Cleanup ───────────────────────────────────────────────────────────

    /// Drop rooms past their TTL whose connections are all gone.
    /// Called periodically by the cleanup task.
    pub fn cleanup_expired(&self) {
        self.cleanup_expired_at(Utc::now());
    }

    fn cleanup_expired_at(&self, now: DateTime<Utc>) {
        let ttl = self.config.room_ttl_secs;
        let before = self.rooms.len();
        self.rooms.retain(|_, room| {
            let expired = (now - room.created_at).num_seconds() > ttl;
            let dead = room.participants.iter().all(|p| p.sender.is_closed());
            !(expired && dead)
        });

        let removed = before.saturating_sub(self.rooms.len());
        if removed > 0 {
            tracing::debug!(count = removed, "Cleaned up expired rooms");
        }
    }
}

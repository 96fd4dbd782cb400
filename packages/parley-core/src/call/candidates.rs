//! Candidate buffering.
//!
//! Two independent FIFO queues:
//!
//! - **local-send**: candidates our transport produced while the signaling
//!   link was still connecting. Released when the link opens.
//! - **remote-apply**: candidates the peer sent before we had a remote
//!   description. Released when the remote description is set.
//!
//! Each queue is released exactly once. After release, the owner applies or
//! sends new candidates directly and must not enqueue again.

use std::collections::VecDeque;

use crate::signaling::IceCandidate;

/// One FIFO queue with a single release.
#[derive(Debug, Default)]
pub struct PendingQueue {
    items: VecDeque<IceCandidate>,
    released: bool,
}

impl PendingQueue {
    /// Append in receipt order.
    pub fn enqueue(&mut self, candidate: IceCandidate) {
        debug_assert!(!self.released, "enqueue after release");
        self.items.push_back(candidate);
    }

    /// Take everything, in order, and mark the queue released.
    ///
    /// Returns `None` if the queue was already released, so a repeated
    /// blocking-condition event can never drain twice.
    pub fn release(&mut self) -> Option<Vec<IceCandidate>> {
        if self.released {
            return None;
        }
        self.released = true;
        Some(self.items.drain(..).collect())
    }

    /// Whether [`release`](Self::release) has run.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Number of queued candidates.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Both candidate queues of one call.
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    /// Waiting for the signaling link to open
    pub local_send: PendingQueue,
    /// Waiting for the remote description
    pub remote_apply: PendingQueue,
}

impl CandidateBuffer {
    /// Empty buffer with both queues blocked.
    pub fn new() -> Self {
        Self::default()
    }
}

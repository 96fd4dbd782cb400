//! # Matching Poller
//!
//! Gets the local user into a session: joins the queue, then polls the
//! session service until a session shows up or the search is cancelled.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           MATCHING FLOW                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  POST /matching/join ──► matched? ──yes──► lookup now                   │
//! │          │                  │no                                         │
//! │          │ error            └──► every poll_interval:                   │
//! │          ▼                        GET /matching/session/{user}          │
//! │      Retrying ◄──── error ──────────────┤                               │
//! │                                         │ active session                │
//! │                                         ▼                               │
//! │                              Connecting ── match_delay ──► Matched      │
//! │                                                                         │
//! │  cancel at any point ──► POST /matching/leave (best effort) ──► Cancelled│
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::CoreConfig;
use crate::error::{Error, Result};
use crate::service::SessionService;
use crate::session::{Level, SessionInfo};

/// Progress of a search, for the UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchingStatus {
    /// Not searching
    #[default]
    Idle,
    /// In the queue, waiting for a partner
    Searching,
    /// The queue reported an immediate match
    PartnerFound,
    /// Last request failed; trying again
    Retrying,
    /// Session found; about to enter the call
    Connecting,
}

/// How a search ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Paired into this session
    Matched(SessionInfo),
    /// The caller gave up
    Cancelled,
}

/// Queue-and-poll search for one user.
pub struct MatchingPoller {
    service: Arc<dyn SessionService>,
    user_id: String,
    level: Level,
    poll_interval: Duration,
    match_delay: Duration,
    status: watch::Sender<MatchingStatus>,
}

impl std::fmt::Debug for MatchingPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchingPoller")
            .field("user_id", &self.user_id)
            .field("level", &self.level)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

impl MatchingPoller {
    /// Poller for `user_id` at `level`, timed by `config`.
    pub fn new(
        service: Arc<dyn SessionService>,
        user_id: impl Into<String>,
        level: Level,
        config: &CoreConfig,
    ) -> Self {
        let (status, _) = watch::channel(MatchingStatus::Idle);
        Self {
            service,
            user_id: user_id.into(),
            level,
            poll_interval: config.poll_interval,
            match_delay: config.match_delay,
            status,
        }
    }

    /// Watch search progress.
    pub fn status(&self) -> watch::Receiver<MatchingStatus> {
        self.status.subscribe()
    }

    /// Look up a session the user is already in, e.g. after a restart.
    pub async fn resume_active_session(&self) -> Result<Option<SessionInfo>> {
        let lookup = self
            .service
            .session_for(&self.user_id)
            .await
            .map_err(|e| Error::MatchingPoll(e.to_string()))?;
        let active = lookup.into_active();
        if let Some(info) = &active {
            tracing::info!(
                user_id = self.user_id.as_str(),
                session_id = info.id.as_str(),
                "Resuming active session"
            );
        }
        Ok(active)
    }

    /// Search until matched, or until `cancel` completes.
    ///
    /// Network errors never end the search; they are retried every
    /// `poll_interval`.
    pub async fn find_match<C>(&self, cancel: C) -> MatchOutcome
    where
        C: Future<Output = ()>,
    {
        tracing::info!(
            user_id = self.user_id.as_str(),
            level = self.level.as_str(),
            "Searching for a partner"
        );

        tokio::select! {
            info = self.search() => {
                tracing::info!(
                    user_id = self.user_id.as_str(),
                    session_id = info.id.as_str(),
                    "Matched"
                );
                MatchOutcome::Matched(info)
            }
            _ = cancel => {
                if let Err(e) = self.service.leave_queue(&self.user_id).await {
                    tracing::warn!(user_id = self.user_id.as_str(), error = %e, "Leaving queue failed");
                }
                self.status.send_replace(MatchingStatus::Idle);
                tracing::info!(user_id = self.user_id.as_str(), "Search cancelled");
                MatchOutcome::Cancelled
            }
        }
    }

    async fn search(&self) -> SessionInfo {
        self.status.send_replace(MatchingStatus::Searching);

        let mut joined = false;
        let mut lookup_now = false;
        loop {
            if !joined {
                match self.service.join_queue(&self.user_id, self.level).await {
                    Ok(response) => {
                        joined = true;
                        if response.matched {
                            self.status.send_replace(MatchingStatus::PartnerFound);
                            lookup_now = true;
                        }
                    }
                    Err(e) => {
                        self.retrying("join", &e);
                        tokio::time::sleep(self.poll_interval).await;
                        continue;
                    }
                }
            }

            if !lookup_now {
                tokio::time::sleep(self.poll_interval).await;
            }
            lookup_now = false;

            match self.service.session_for(&self.user_id).await {
                Ok(lookup) => match lookup.into_active() {
                    Some(info) => {
                        self.status.send_replace(MatchingStatus::Connecting);
                        tokio::time::sleep(self.match_delay).await;
                        return info;
                    }
                    None => {
                        self.status.send_if_modified(|status| {
                            let changed = *status == MatchingStatus::Retrying;
                            if changed {
                                *status = MatchingStatus::Searching;
                            }
                            changed
                        });
                    }
                },
                Err(e) => self.retrying("lookup", &e),
            }
        }
    }

    fn retrying(&self, step: &str, error: &Error) {
        tracing::warn!(
            user_id = self.user_id.as_str(),
            step,
            error = %error,
            "Matching request failed; retrying"
        );
        self.status.send_replace(MatchingStatus::Retrying);
    }
}

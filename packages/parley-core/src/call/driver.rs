//! # Call Driver
//!
//! One task per call. Every input the call reacts to is a message on one of
//! four channels, handled one at a time by a single `select!` loop:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           CALL EVENT LOOP                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   CallHandle ──── hangup / unload ────┐                                 │
//! │                                       │                                 │
//! │   SignalingLink ── LinkEvent ─────────┤                                 │
//! │                                       ├──► select! ──► NegotiationEngine│
//! │   PeerTransport ── TransportEvent ────┤        │                        │
//! │                                       │        │ Some(reason)           │
//! │   interval(tick) ── CallTimer ────────┘        ▼                        │
//! │                                       TerminationCoordinator            │
//! │                                                │                        │
//! │                                                ▼                        │
//! │                                           CallOutcome                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Because handlers never run concurrently, the engine needs no locks and a
//! late callback from a torn-down transport is simply ignored.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;

use super::engine::NegotiationEngine;
use super::events::{CallUpdate, EndReason};
use super::termination::{SetupResources, TerminationCoordinator};
use super::timer::{CallTimer, TimerEvent};
use super::transport::{MediaSource, TransportEvent, TransportFactory};
use crate::config::CoreConfig;
use crate::error::Result;
use crate::rating::RatingGate;
use crate::service::SessionService;
use crate::session::SessionContext;
use crate::signaling::{ws, LinkEvent, SignalingLink};
use crate::time::Clock;

const UPDATE_CAPACITY: usize = 64;

/// External collaborators of a call.
#[derive(Clone)]
pub struct CallDeps {
    /// Matching/session backend
    pub service: Arc<dyn SessionService>,
    /// Camera and microphone
    pub media: Arc<dyn MediaSource>,
    /// Peer transport constructor
    pub transports: Arc<dyn TransportFactory>,
    /// Wall clock for the countdown
    pub clock: Arc<dyn Clock>,
}

/// Control input from the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallCommand {
    /// The user pressed end call
    Hangup,
    /// The page or app is going away
    Unload,
}

/// Handle held by the UI. Cheap to clone.
///
/// When every handle is dropped the call ends as a hangup.
#[derive(Debug, Clone)]
pub struct CallHandle {
    commands: mpsc::UnboundedSender<CallCommand>,
    updates: broadcast::Sender<CallUpdate>,
}

impl CallHandle {
    /// End the call. `false` if it has already finished.
    pub fn hangup(&self) -> bool {
        self.commands.send(CallCommand::Hangup).is_ok()
    }

    /// End the call because the client is unloading.
    pub fn unload(&self) -> bool {
        self.commands.send(CallCommand::Unload).is_ok()
    }

    /// Receive state, connection and countdown updates.
    pub fn subscribe(&self) -> broadcast::Receiver<CallUpdate> {
        self.updates.subscribe()
    }
}

/// How a call finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    /// Session that ended
    pub session_id: String,
    /// Local user
    pub user_id: String,
    /// First termination reason
    pub reason: EndReason,
    /// Whether media ever flowed
    pub ever_connected: bool,
}

impl CallOutcome {
    /// Post-call rating, offered only for calls that actually connected.
    pub fn rating_gate(&self, service: Arc<dyn SessionService>) -> Option<RatingGate> {
        if !self.ever_connected {
            return None;
        }
        Some(RatingGate::new(service, &self.session_id, &self.user_id))
    }
}

/// A call in progress.
pub struct Call {
    engine: NegotiationEngine,
    timer: CallTimer,
    termination: TerminationCoordinator,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    commands: mpsc::UnboundedReceiver<CallCommand>,
    link_events: mpsc::UnboundedReceiver<LinkEvent>,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    updates: broadcast::Sender<CallUpdate>,
}

impl std::fmt::Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Call")
            .field("engine", &self.engine)
            .field("timer", &self.timer)
            .field("termination", &self.termination)
            .finish()
    }
}

impl Call {
    /// Open a relay link for `ctx` and set the call up.
    pub async fn connect(
        ctx: SessionContext,
        deps: &CallDeps,
        config: &CoreConfig,
    ) -> Result<(Self, CallHandle)> {
        let (link, link_events) =
            ws::open(&config.signaling_url, ctx.session_id(), ctx.local_user_id());
        Self::start(ctx, deps, config, link, link_events).await
    }

    /// Acquire media and a transport, then hand everything to a new
    /// negotiation engine.
    ///
    /// A setup failure, including an invalid `config`, still runs
    /// termination (report, release) before the error is returned.
    pub async fn start(
        ctx: SessionContext,
        deps: &CallDeps,
        config: &CoreConfig,
        link: SignalingLink,
        link_events: mpsc::UnboundedReceiver<LinkEvent>,
    ) -> Result<(Self, CallHandle)> {
        let mut termination =
            TerminationCoordinator::new(deps.service.clone(), config.report_timeout);

        if let Err(e) = config.validate() {
            tracing::error!(session_id = ctx.session_id(), error = %e, "Invalid call configuration");
            let mut setup = SetupResources::new(ctx, link, None);
            termination
                .terminate(EndReason::ConnectionFailed, &mut setup)
                .await;
            return Err(e);
        }

        let ice_servers = match deps.service.ice_servers().await {
            Ok(servers) => servers,
            Err(e) => {
                tracing::warn!(
                    session_id = ctx.session_id(),
                    error = %e,
                    "ICE server lookup failed; continuing without relays"
                );
                Vec::new()
            }
        };

        let media = match deps.media.acquire().await {
            Ok(media) => media,
            Err(e) => {
                tracing::error!(session_id = ctx.session_id(), error = %e, "Media acquisition failed");
                let mut setup = SetupResources::new(ctx, link, None);
                termination
                    .terminate(EndReason::ConnectionFailed, &mut setup)
                    .await;
                return Err(e);
            }
        };

        let (transport, transport_events) = match deps.transports.create(&ice_servers) {
            Ok(created) => created,
            Err(e) => {
                tracing::error!(session_id = ctx.session_id(), error = %e, "Transport creation failed");
                let mut setup = SetupResources::new(ctx, link, Some(media));
                termination
                    .terminate(EndReason::ConnectionFailed, &mut setup)
                    .await;
                return Err(e);
            }
        };

        let timer = CallTimer::start(
            ctx.session().created_at,
            ctx.session().duration_budget_secs,
        );
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let engine = NegotiationEngine::start(ctx, media, transport, link, updates.clone());

        let handle = CallHandle {
            commands: commands_tx,
            updates: updates.clone(),
        };
        let call = Self {
            engine,
            timer,
            termination,
            clock: deps.clock.clone(),
            tick_interval: config.tick_interval,
            commands,
            link_events,
            transport_events,
            updates,
        };
        Ok((call, handle))
    }

    /// Drive the call until it ends.
    pub async fn run(mut self) -> CallOutcome {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            let end = tokio::select! {
                command = self.commands.recv() => Some(self.on_command(command)),
                Some(event) = self.link_events.recv() => self.engine.handle_link_event(event).await,
                Some(event) = self.transport_events.recv() => {
                    self.engine.handle_transport_event(event).await
                }
                _ = ticker.tick() => self.on_tick(),
            };
            if let Some(reason) = end {
                break reason;
            }
        };

        self.terminate(reason).await;
        self.outcome()
    }

    /// Run termination with `reason`. Only the first call has any effect.
    pub async fn terminate(&mut self, reason: EndReason) -> bool {
        self.timer.stop();
        if !self.termination.terminate(reason, &mut self.engine).await {
            return false;
        }
        let _ = self.updates.send(CallUpdate::Ended {
            reason,
            ever_connected: self.engine.ever_connected(),
        });
        true
    }

    fn on_command(&self, command: Option<CallCommand>) -> EndReason {
        let ctx = self.engine.context();
        match command {
            Some(CallCommand::Hangup) => {
                tracing::info!(session_id = ctx.session_id(), "Hangup requested");
            }
            Some(CallCommand::Unload) => {
                tracing::info!(session_id = ctx.session_id(), "Client unloading");
            }
            None => {
                tracing::info!(session_id = ctx.session_id(), "All call handles dropped");
            }
        }
        EndReason::Hangup
    }

    fn on_tick(&mut self) -> Option<EndReason> {
        match self.timer.tick(self.clock.now())? {
            TimerEvent::Tick { remaining_secs } => {
                let _ = self.updates.send(CallUpdate::TimeRemaining(remaining_secs));
                None
            }
            TimerEvent::Expired => {
                tracing::info!(
                    session_id = self.engine.context().session_id(),
                    "Call time budget used up"
                );
                let _ = self.updates.send(CallUpdate::TimeRemaining(0));
                Some(EndReason::Timeout)
            }
        }
    }

    fn outcome(&self) -> CallOutcome {
        let ctx = self.engine.context();
        CallOutcome {
            session_id: ctx.session_id().to_string(),
            user_id: ctx.local_user_id().to_string(),
            reason: ctx
                .session()
                .ended_reason
                .unwrap_or(EndReason::ConnectionFailed),
            ever_connected: self.engine.ever_connected(),
        }
    }
}

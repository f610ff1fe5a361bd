// ── Session transition table ──
//
// Pure state machine: one input in, a list of effects and a reply out.
// No I/O happens here; the command processor executes the effects in the
// order they are returned. Engine results carry the generation they were
// issued under and are discarded when it no longer matches.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{EngineError, SessionError};
use crate::model::{EngineStatus, ErrorReason, ServerProfile, SessionState};

/// Everything the processor can feed into the machine.
#[derive(Debug)]
pub(crate) enum Input {
    Connect(ServerProfile),
    Disconnect,
    ForceDisconnect,
    Reconnect {
        profile: ServerProfile,
        attempt: u32,
    },
    ReconnectExhausted,
    StartFinished {
        generation: u64,
        result: Result<(), EngineError>,
    },
    StopFinished {
        generation: u64,
        result: Result<(), EngineError>,
    },
    Engine(EngineStatus),
    Connectivity(bool),
    /// The engine reported `status` while the caller believed `observed`.
    Reconcile {
        observed: SessionState,
        status: EngineStatus,
    },
}

impl Input {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::Disconnect => "disconnect",
            Self::ForceDisconnect => "force_disconnect",
            Self::Reconnect { .. } => "reconnect",
            Self::ReconnectExhausted => "reconnect_exhausted",
            Self::StartFinished { .. } => "start_finished",
            Self::StopFinished { .. } => "stop_finished",
            Self::Engine(_) => "engine_status",
            Self::Connectivity(_) => "connectivity",
            Self::Reconcile { .. } => "reconcile",
        }
    }
}

/// Side effects, executed in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Effect {
    /// Publish a transition to observers.
    Emit(SessionState),
    StartEngine {
        generation: u64,
        profile: ServerProfile,
    },
    StopEngine {
        generation: u64,
    },
    Persist(ServerProfile),
    ClearPersisted,
    /// Answer every caller waiting for `profile_id` to come up.
    ResolveStart {
        profile_id: String,
        result: Result<(), SessionError>,
    },
    /// Answer every caller waiting for the engine to go down.
    ResolveStop(Result<(), SessionError>),
}

/// When the caller that sent the input gets its answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Reply {
    Now(Result<(), SessionError>),
    AwaitStart(String),
    AwaitStop,
}

#[derive(Debug)]
pub(crate) struct Step {
    pub effects: Vec<Effect>,
    pub reply: Reply,
}

/// Bookkeeping for the `Disconnecting` state.
#[derive(Debug, Clone)]
struct Stopping {
    profile: Option<ServerProfile>,
    /// Whether this stop is leaving `Connected` at the user's request.
    clear_persisted: bool,
    /// Profile to start once the stop completes (profile switch).
    next: Option<ServerProfile>,
}

#[derive(Debug)]
pub(crate) struct Machine {
    state: SessionState,
    generation: u64,
    start_in_flight: bool,
    stopping: Option<Stopping>,
    online: bool,
}

impl Default for Machine {
    fn default() -> Self {
        Self {
            state: SessionState::default(),
            generation: 0,
            start_in_flight: false,
            stopping: None,
            online: true,
        }
    }
}

impl Machine {
    pub(crate) fn state(&self) -> &SessionState {
        &self.state
    }

    pub(crate) fn handle(&mut self, input: Input, now: DateTime<Utc>) -> Step {
        let mut fx = Vec::new();
        let reply = match input {
            Input::Connect(profile) => self.connect(profile, &mut fx),
            Input::Disconnect => self.disconnect(&mut fx),
            Input::ForceDisconnect => self.force_disconnect(&mut fx),
            Input::Reconnect { profile, attempt } => self.reconnect(profile, attempt, &mut fx),
            Input::ReconnectExhausted => self.exhausted(&mut fx),
            Input::StartFinished { generation, result } => {
                self.start_finished(generation, result, now, &mut fx);
                Reply::Now(Ok(()))
            }
            Input::StopFinished { generation, result } => {
                self.stop_finished(generation, result, &mut fx);
                Reply::Now(Ok(()))
            }
            Input::Engine(status) => {
                self.engine_status(status, now, &mut fx);
                Reply::Now(Ok(()))
            }
            Input::Connectivity(online) => {
                self.online = online;
                Reply::Now(Ok(()))
            }
            Input::Reconcile { observed, status } => self.reconcile(&observed, status, &mut fx),
        };
        Step { effects: fx, reply }
    }

    // ── Commands ─────────────────────────────────────────────────────

    fn connect(&mut self, profile: ServerProfile, fx: &mut Vec<Effect>) -> Reply {
        let id = profile.id.clone();
        match self.state.clone() {
            SessionState::Connected { profile: current, .. } if current.id == id => {
                Reply::Now(Ok(()))
            }
            SessionState::Connecting { profile: current } if current.id == id => {
                Reply::AwaitStart(id)
            }
            SessionState::Reconnecting { profile: current, .. }
                if current.id == id && self.start_in_flight =>
            {
                Reply::AwaitStart(id)
            }
            SessionState::Connected { profile: current, .. } => {
                self.begin_stop(Some(current), false, Some(profile), fx);
                Reply::AwaitStart(id)
            }
            SessionState::Connecting { profile: current }
            | SessionState::Reconnecting {
                profile: current, ..
            } => {
                if self.start_in_flight {
                    fx.push(Effect::ResolveStart {
                        profile_id: current.id.clone(),
                        result: Err(SessionError::Superseded),
                    });
                    self.begin_stop(Some(current), false, Some(profile), fx);
                } else {
                    self.begin_start(profile, None, fx);
                }
                Reply::AwaitStart(id)
            }
            SessionState::Disconnecting => {
                if let Some(stopping) = self.stopping.as_mut() {
                    if let Some(previous) = stopping.next.replace(profile) {
                        if previous.id != id {
                            fx.push(Effect::ResolveStart {
                                profile_id: previous.id,
                                result: Err(SessionError::Superseded),
                            });
                        }
                    }
                }
                Reply::AwaitStart(id)
            }
            SessionState::Disconnected { .. } | SessionState::Error { .. } => {
                self.begin_start(profile, None, fx);
                Reply::AwaitStart(id)
            }
        }
    }

    fn disconnect(&mut self, fx: &mut Vec<Effect>) -> Reply {
        match self.state.clone() {
            SessionState::Disconnected { .. } => Reply::Now(Ok(())),
            SessionState::Error { .. } => {
                self.enter(SessionState::Disconnected { forced: false }, fx);
                Reply::Now(Ok(()))
            }
            SessionState::Connected { profile, .. } => {
                self.begin_stop(Some(profile), true, None, fx);
                Reply::AwaitStop
            }
            SessionState::Connecting { profile }
            | SessionState::Reconnecting { profile, .. } => {
                if self.abandon_start(SessionError::Cancelled, fx) {
                    self.begin_stop(Some(profile), false, None, fx);
                    Reply::AwaitStop
                } else {
                    self.enter(SessionState::Disconnected { forced: false }, fx);
                    Reply::Now(Ok(()))
                }
            }
            SessionState::Disconnecting => {
                if let Some(stopping) = self.stopping.as_mut() {
                    if let Some(next) = stopping.next.take() {
                        fx.push(Effect::ResolveStart {
                            profile_id: next.id,
                            result: Err(SessionError::Cancelled),
                        });
                    }
                }
                Reply::AwaitStop
            }
        }
    }

    /// External teardown (e.g. the OS revoked the tunnel). A no-op when
    /// already disconnected.
    fn force_disconnect(&mut self, fx: &mut Vec<Effect>) -> Reply {
        if matches!(self.state, SessionState::Disconnected { .. }) {
            return Reply::Now(Ok(()));
        }

        let engine_live = self.start_in_flight
            || matches!(
                self.state,
                SessionState::Connected { .. } | SessionState::Disconnecting
            );
        self.abandon_start(SessionError::ForceDisconnected, fx);
        if let Some(stopping) = self.stopping.take() {
            if let Some(next) = stopping.next {
                fx.push(Effect::ResolveStart {
                    profile_id: next.id,
                    result: Err(SessionError::ForceDisconnected),
                });
            }
            fx.push(Effect::ResolveStop(Ok(())));
        }

        self.generation += 1;
        if engine_live {
            fx.push(Effect::StopEngine {
                generation: self.generation,
            });
        }
        self.enter(SessionState::Disconnected { forced: true }, fx);
        Reply::Now(Ok(()))
    }

    /// Correct a stale `Connected` once the engine is known to be gone.
    /// Answers `Superseded` when the state moved on since `observed` was
    /// read, so a correction never lands on a newer session.
    fn reconcile(
        &mut self,
        observed: &SessionState,
        status: EngineStatus,
        fx: &mut Vec<Effect>,
    ) -> Reply {
        if self.state != *observed {
            debug!(state = self.state.label(), "discarding stale reconcile");
            return Reply::Now(Err(SessionError::Superseded));
        }
        match (&self.state, status) {
            (SessionState::Connected { .. }, EngineStatus::Down | EngineStatus::Stopping) => {
                self.force_disconnect(fx)
            }
            _ => Reply::Now(Ok(())),
        }
    }

    fn reconnect(&mut self, profile: ServerProfile, attempt: u32, fx: &mut Vec<Effect>) -> Reply {
        match self.state.clone() {
            SessionState::Connected { .. } => Reply::Now(Ok(())),
            SessionState::Connecting { profile: current } => Reply::AwaitStart(current.id),
            SessionState::Reconnecting {
                profile: current, ..
            } if self.start_in_flight => Reply::AwaitStart(current.id),
            SessionState::Disconnecting => Reply::Now(Err(SessionError::InvalidTransition {
                command: "reconnect",
                state: "disconnecting",
            })),
            SessionState::Reconnecting { .. }
            | SessionState::Disconnected { .. }
            | SessionState::Error { .. } => {
                let id = profile.id.clone();
                self.begin_start(profile, Some(attempt), fx);
                Reply::AwaitStart(id)
            }
        }
    }

    /// Retry budget spent. Only meaningful while reconnecting.
    fn exhausted(&mut self, fx: &mut Vec<Effect>) -> Reply {
        if let SessionState::Reconnecting { profile, .. } = self.state.clone() {
            self.abandon_start(SessionError::Cancelled, fx);
            self.enter(
                SessionState::Error {
                    profile: Some(profile),
                    reason: ErrorReason::ReconnectExhausted,
                },
                fx,
            );
        }
        Reply::Now(Ok(()))
    }

    // ── Engine feedback ──────────────────────────────────────────────

    fn start_finished(
        &mut self,
        generation: u64,
        result: Result<(), EngineError>,
        now: DateTime<Utc>,
        fx: &mut Vec<Effect>,
    ) {
        if generation != self.generation || !self.start_in_flight {
            debug!(generation, current = self.generation, "discarding stale start result");
            return;
        }
        self.start_in_flight = false;

        match (self.state.clone(), result) {
            (
                SessionState::Connecting { profile } | SessionState::Reconnecting { profile, .. },
                Ok(()),
            ) => {
                let id = profile.id.clone();
                self.enter(
                    SessionState::Connected {
                        profile: profile.clone(),
                        started_at: now,
                    },
                    fx,
                );
                fx.push(Effect::Persist(profile));
                fx.push(Effect::ResolveStart {
                    profile_id: id,
                    result: Ok(()),
                });
            }
            (SessionState::Connecting { profile }, Err(e)) => {
                let id = profile.id.clone();
                self.enter(
                    SessionState::Error {
                        profile: Some(profile),
                        reason: ErrorReason::start_failed(&e),
                    },
                    fx,
                );
                fx.push(Effect::ResolveStart {
                    profile_id: id,
                    result: Err(e.into()),
                });
            }
            // A failed attempt stays in Reconnecting; the coordinator owns the budget.
            (SessionState::Reconnecting { profile, .. }, Err(e)) => {
                fx.push(Effect::ResolveStart {
                    profile_id: profile.id,
                    result: Err(e.into()),
                });
            }
            _ => {}
        }
    }

    fn stop_finished(
        &mut self,
        generation: u64,
        result: Result<(), EngineError>,
        fx: &mut Vec<Effect>,
    ) {
        if generation != self.generation {
            debug!(generation, current = self.generation, "discarding stale stop result");
            return;
        }
        let Some(stopping) = self.stopping.take() else {
            return;
        };

        match result {
            Ok(()) => {
                self.enter(SessionState::Disconnected { forced: false }, fx);
                if stopping.clear_persisted {
                    fx.push(Effect::ClearPersisted);
                }
                fx.push(Effect::ResolveStop(Ok(())));
                if let Some(next) = stopping.next {
                    self.begin_start(next, None, fx);
                }
            }
            Err(e) => {
                self.enter(
                    SessionState::Error {
                        profile: stopping.profile,
                        reason: ErrorReason::stop_failed(&e),
                    },
                    fx,
                );
                fx.push(Effect::ResolveStop(Err(e.clone().into())));
                if let Some(next) = stopping.next {
                    fx.push(Effect::ResolveStart {
                        profile_id: next.id,
                        result: Err(e.into()),
                    });
                }
            }
        }
    }

    fn engine_status(&mut self, status: EngineStatus, now: DateTime<Utc>, fx: &mut Vec<Effect>) {
        match (status, self.state.clone()) {
            (
                EngineStatus::Up,
                SessionState::Connecting { .. } | SessionState::Reconnecting { .. },
            ) if self.start_in_flight => {
                self.start_finished(self.generation, Ok(()), now, fx);
            }
            (EngineStatus::Down, SessionState::Connected { profile, .. }) => {
                self.generation += 1;
                if self.online {
                    self.enter(SessionState::Disconnected { forced: true }, fx);
                } else {
                    self.enter(
                        SessionState::Reconnecting {
                            profile,
                            attempt: 0,
                        },
                        fx,
                    );
                }
            }
            _ => {}
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn enter(&mut self, state: SessionState, fx: &mut Vec<Effect>) {
        self.state = state.clone();
        fx.push(Effect::Emit(state));
    }

    fn begin_start(&mut self, profile: ServerProfile, attempt: Option<u32>, fx: &mut Vec<Effect>) {
        self.generation += 1;
        self.start_in_flight = true;
        let state = match attempt {
            Some(attempt) => SessionState::Reconnecting {
                profile: profile.clone(),
                attempt,
            },
            None => SessionState::Connecting {
                profile: profile.clone(),
            },
        };
        self.enter(state, fx);
        fx.push(Effect::StartEngine {
            generation: self.generation,
            profile,
        });
    }

    fn begin_stop(
        &mut self,
        profile: Option<ServerProfile>,
        clear_persisted: bool,
        next: Option<ServerProfile>,
        fx: &mut Vec<Effect>,
    ) {
        self.generation += 1;
        self.start_in_flight = false;
        self.stopping = Some(Stopping {
            profile,
            clear_persisted,
            next,
        });
        self.enter(SessionState::Disconnecting, fx);
        fx.push(Effect::StopEngine {
            generation: self.generation,
        });
    }

    /// Drop an in-flight start so its result is discarded. Returns whether
    /// one was in flight.
    fn abandon_start(&mut self, reason: SessionError, fx: &mut Vec<Effect>) -> bool {
        if !self.start_in_flight {
            return false;
        }
        self.start_in_flight = false;
        self.generation += 1;
        if let Some(profile) = self.state.profile() {
            fx.push(Effect::ResolveStart {
                profile_id: profile.id.clone(),
                result: Err(reason),
            });
        }
        true
    }
}

//! SchedulerActor implementation.
//!
//! The actor owns every piece of mutable scheduler state: the mode, the one
//! armed cadence timer, the poll throttle with its cooldown timer, and the
//! in-flight poll future. Socket events arrive through the mailbox and are
//! handled one at a time, in order, between timer firings and poll
//! completions.
//!
//! # Timers
//!
//! - Forced cadence (socket connected): plain timer sampled from
//!   `forced_polling_period`, re-armed on each firing and on each socket
//!   message.
//! - Start delay (socket just disconnected): plain timer of
//!   `polling_start_delay_ms`, handing over to the fallback cadence.
//! - Fallback cadence (socket disconnected): focus-aware timer sampled from
//!   `polling_period`.
//!
//! Every firing re-arms before requesting a poll, so a slow poll never
//! delays the next scheduling decision.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::config::SchedulerConfig;
use super::handle::PollingScheduler;
use super::messages::{SchedulerMessage, SchedulerMode, SchedulerSnapshot, TimerKind};
use super::poller::{ErrorSink, PollError, Poller, TracingErrorSink};
use crate::focus::{FocusTracker, focus_aware_sleep};
use crate::throttle::{PollThrottle, ThrottleAction};

/// How the actor's run loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerOutcome {
    /// `destroy()` was called.
    Destroyed,
    /// Every handle was dropped.
    Detached,
}

struct ArmedTimer {
    kind: TimerKind,
    sleep: BoxFuture<'static, ()>,
}

/// The task behind a [`PollingScheduler`] handle.
pub struct SchedulerActor {
    id: String,
    mailbox: mpsc::UnboundedReceiver<SchedulerMessage>,
    config: SchedulerConfig,
    poller: Arc<dyn Poller>,
    error_sink: Arc<dyn ErrorSink>,
    focus: watch::Receiver<bool>,
    cancellation_token: CancellationToken,
    mode: SchedulerMode,
    /// At most one cadence timer is live; arming replaces (and drops) it.
    timer: Option<ArmedTimer>,
    throttle: PollThrottle,
    cooldown: Option<BoxFuture<'static, ()>>,
    in_flight: Option<BoxFuture<'static, Result<(), PollError>>>,
    completed_polls: u64,
    failed_polls: u64,
}

impl SchedulerActor {
    /// Create a scheduler actor and its handle.
    ///
    /// Nothing is armed until [`run`](Self::run) starts; a handle destroyed
    /// before that never polls, even with `poll_on_start`.
    pub fn new(
        id: impl Into<String>,
        config: SchedulerConfig,
        poller: Arc<dyn Poller>,
        is_socket_connected: bool,
    ) -> (Self, PollingScheduler) {
        let id = id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancellation_token = CancellationToken::new();
        let handle = PollingScheduler::new(id.clone(), tx, cancellation_token.clone());

        let actor = Self {
            id,
            mailbox: rx,
            config,
            poller,
            error_sink: Arc::new(TracingErrorSink),
            focus: FocusTracker::always_focused(),
            cancellation_token,
            mode: SchedulerMode::from_connected(is_socket_connected),
            timer: None,
            throttle: PollThrottle::new(),
            cooldown: None,
            in_flight: None,
            completed_polls: 0,
            failed_polls: 0,
        };

        (actor, handle)
    }

    /// Route poll errors to a custom sink instead of the log.
    pub fn with_error_sink(mut self, error_sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = error_sink;
        self
    }

    /// Pause focus-aware delays while the receiver reads `false`.
    pub fn with_focus(mut self, focus: watch::Receiver<bool>) -> Self {
        self.focus = focus;
        self
    }

    /// Get the scheduler's ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run the scheduler until it is destroyed or every handle is dropped.
    pub async fn run(mut self) -> SchedulerOutcome {
        if self.cancellation_token.is_cancelled() {
            debug!("PollingScheduler {} destroyed before start", self.id);
            return SchedulerOutcome::Destroyed;
        }

        info!("PollingScheduler {} starting in {:?}", self.id, self.mode);

        match self.mode {
            SchedulerMode::ForcedPolling => self.arm(TimerKind::ForcedCadence),
            SchedulerMode::FallbackPolling => self.arm(TimerKind::StartDelay),
        }
        if self.config.poll_on_start {
            self.request_poll("start");
        }

        let outcome = loop {
            tokio::select! {
                // Destruction wins over anything else that is ready.
                biased;

                _ = self.cancellation_token.cancelled() => {
                    break SchedulerOutcome::Destroyed;
                }

                msg = self.mailbox.recv() => {
                    match msg {
                        Some(msg) => self.handle_message(msg),
                        None => break SchedulerOutcome::Detached,
                    }
                }

                result = Self::wait_opt(&mut self.in_flight) => {
                    self.in_flight = None;
                    self.on_poll_finished(result);
                }

                _ = Self::wait_opt(&mut self.cooldown) => {
                    self.cooldown = None;
                    self.on_cooldown_elapsed();
                }

                kind = Self::wait_timer(&mut self.timer) => {
                    self.timer = None;
                    self.on_timer(kind);
                }
            }
        };

        // Dropping these cancels the timers and any in-flight poll.
        self.timer = None;
        self.cooldown = None;
        self.in_flight = None;

        info!(
            "PollingScheduler {} stopped ({:?}) after {} polls",
            self.id, outcome, self.completed_polls
        );
        outcome
    }

    fn handle_message(&mut self, msg: SchedulerMessage) {
        match msg {
            SchedulerMessage::SocketConnected => {
                debug!("PollingScheduler {} socket connected", self.id);
                self.mode = SchedulerMode::ForcedPolling;
                self.arm(TimerKind::ForcedCadence);
                self.request_poll("socket connected");
            }
            SchedulerMessage::SocketDisconnected => {
                debug!("PollingScheduler {} socket disconnected", self.id);
                self.mode = SchedulerMode::FallbackPolling;
                self.arm(TimerKind::StartDelay);
            }
            SchedulerMessage::SocketMessage => {
                trace!("PollingScheduler {} socket message", self.id);
                self.mode = SchedulerMode::ForcedPolling;
                self.arm(TimerKind::ForcedCadence);
            }
            SchedulerMessage::GetState(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn on_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::ForcedCadence => {
                self.arm(TimerKind::ForcedCadence);
                self.request_poll("forced cadence");
            }
            TimerKind::StartDelay | TimerKind::FallbackCadence => {
                self.arm(TimerKind::FallbackCadence);
                self.request_poll("fallback cadence");
            }
        }
    }

    /// Arm the cadence timer, replacing whatever was armed before.
    fn arm(&mut self, kind: TimerKind) {
        let delay = match kind {
            TimerKind::ForcedCadence => self.config.forced_polling_period.sample(),
            TimerKind::StartDelay => self.config.polling_start_delay(),
            TimerKind::FallbackCadence => self.config.polling_period.sample(),
        };
        let sleep = match kind {
            TimerKind::FallbackCadence => focus_aware_sleep(delay, self.focus.clone()).boxed(),
            TimerKind::ForcedCadence | TimerKind::StartDelay => tokio::time::sleep(delay).boxed(),
        };

        trace!("PollingScheduler {} armed {:?} in {:?}", self.id, kind, delay);
        if let Some(previous) = self.timer.replace(ArmedTimer { kind, sleep }) {
            trace!("PollingScheduler {} cancelled {:?}", self.id, previous.kind);
        }
    }

    fn request_poll(&mut self, reason: &'static str) {
        match self.throttle.request() {
            ThrottleAction::Invoke => {
                debug!("PollingScheduler {} polling ({})", self.id, reason);
                self.start_poll();
            }
            ThrottleAction::Deferred => {
                debug!(
                    "PollingScheduler {} poll deferred ({}), throttle {:?}",
                    self.id,
                    reason,
                    self.throttle.state()
                );
            }
            ThrottleAction::StartCooldown | ThrottleAction::None => {}
        }
    }

    fn start_poll(&mut self) {
        let poller = self.poller.clone();
        let token = self.cancellation_token.clone();
        let poll = async move {
            if token.is_cancelled() {
                return Ok(());
            }
            match AssertUnwindSafe(poller.poll()).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(PollError::from_panic(payload)),
            }
        };
        self.in_flight = Some(poll.boxed());
    }

    fn on_poll_finished(&mut self, result: Result<(), PollError>) {
        if self.cancellation_token.is_cancelled() {
            return;
        }
        self.completed_polls += 1;
        if let Err(e) = result {
            self.failed_polls += 1;
            self.error_sink.report(&self.id, &e);
        }

        if self.throttle.complete() == ThrottleAction::StartCooldown {
            let delay = self.config.min_poll_delay.sample();
            trace!("PollingScheduler {} cooling down for {:?}", self.id, delay);
            self.cooldown = Some(focus_aware_sleep(delay, self.focus.clone()).boxed());
        }
    }

    fn on_cooldown_elapsed(&mut self) {
        if self.throttle.cooldown_elapsed() == ThrottleAction::Invoke {
            debug!("PollingScheduler {} running deferred poll", self.id);
            self.start_poll();
        }
    }

    fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            mode: self.mode,
            timer: self.timer.as_ref().map(|t| t.kind),
            throttle: self.throttle.state(),
            completed_polls: self.completed_polls,
            failed_polls: self.failed_polls,
            collapsed_requests: self.throttle.collapsed_requests(),
        }
    }

    /// Await an optional future; pending forever when there is none.
    async fn wait_opt<T>(fut: &mut Option<BoxFuture<'static, T>>) -> T {
        match fut {
            Some(fut) => fut.await,
            None => std::future::pending().await,
        }
    }

    async fn wait_timer(timer: &mut Option<ArmedTimer>) -> TimerKind {
        match timer {
            Some(armed) => {
                (&mut armed.sleep).await;
                armed.kind
            }
            None => std::future::pending().await,
        }
    }
}

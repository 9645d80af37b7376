//! Poll throttle.
//!
//! Guards the poll callback so that at most one invocation is in flight and
//! consecutive completions are spaced by a cooldown. Requests that arrive
//! while busy collapse into a single deferred invocation.
//!
//! The throttle is a plain state machine: it decides, the caller acts.
//! The scheduler actor owns the timers and the poll future and feeds the
//! outcomes back through [`PollThrottle::complete`] and
//! [`PollThrottle::cooldown_elapsed`].

use tracing::trace;

/// Current phase of the throttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThrottleState {
    /// Nothing running, no cooldown; the next request invokes immediately.
    #[default]
    Idle,
    /// A poll is running. `pending` records that one more was requested.
    InFlight { pending: bool },
    /// The previous poll finished and the minimum delay has not elapsed yet.
    CoolingDown { pending: bool },
}

impl ThrottleState {
    /// Whether a deferred invocation is waiting.
    pub fn has_pending(&self) -> bool {
        matches!(
            self,
            ThrottleState::InFlight { pending: true } | ThrottleState::CoolingDown { pending: true }
        )
    }
}

/// What the caller must do after feeding an event to the throttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleAction {
    /// Invoke the poll callback now.
    Invoke,
    /// The request was recorded and will run later.
    Deferred,
    /// Arm the cooldown timer.
    StartCooldown,
    /// Nothing to do.
    None,
}

/// Explicit Idle -> InFlight -> CoolingDown -> Idle state machine.
#[derive(Debug, Default)]
pub struct PollThrottle {
    state: ThrottleState,
    invocations: u64,
    collapsed: u64,
}

impl PollThrottle {
    /// Create an idle throttle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> ThrottleState {
        self.state
    }

    /// Number of times the throttle answered [`ThrottleAction::Invoke`].
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    /// Requests absorbed by an already pending invocation.
    pub fn collapsed_requests(&self) -> u64 {
        self.collapsed
    }

    /// A poll was requested.
    pub fn request(&mut self) -> ThrottleAction {
        match self.state {
            ThrottleState::Idle => {
                self.state = ThrottleState::InFlight { pending: false };
                self.invocations += 1;
                ThrottleAction::Invoke
            }
            ThrottleState::InFlight { pending } => {
                self.record_deferred(pending);
                self.state = ThrottleState::InFlight { pending: true };
                ThrottleAction::Deferred
            }
            ThrottleState::CoolingDown { pending } => {
                self.record_deferred(pending);
                self.state = ThrottleState::CoolingDown { pending: true };
                ThrottleAction::Deferred
            }
        }
    }

    /// The in-flight poll finished, successfully or not.
    pub fn complete(&mut self) -> ThrottleAction {
        match self.state {
            ThrottleState::InFlight { pending } => {
                self.state = ThrottleState::CoolingDown { pending };
                ThrottleAction::StartCooldown
            }
            other => {
                trace!(state = ?other, "Ignoring poll completion outside of InFlight");
                ThrottleAction::None
            }
        }
    }

    /// The cooldown after the last completion has elapsed.
    pub fn cooldown_elapsed(&mut self) -> ThrottleAction {
        match self.state {
            ThrottleState::CoolingDown { pending: true } => {
                self.state = ThrottleState::InFlight { pending: false };
                self.invocations += 1;
                ThrottleAction::Invoke
            }
            ThrottleState::CoolingDown { pending: false } => {
                self.state = ThrottleState::Idle;
                ThrottleAction::None
            }
            other => {
                trace!(state = ?other, "Ignoring cooldown expiry outside of CoolingDown");
                ThrottleAction::None
            }
        }
    }

    fn record_deferred(&mut self, already_pending: bool) {
        if already_pending {
            self.collapsed += 1;
        }
    }
}

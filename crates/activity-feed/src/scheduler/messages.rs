//! Messages and state types for the scheduler actor.

use tokio::sync::oneshot;

use crate::throttle::ThrottleState;

/// Messages that can be sent to a [`SchedulerActor`](super::SchedulerActor).
#[derive(Debug)]
pub enum SchedulerMessage {
    /// The push channel connected.
    SocketConnected,
    /// The push channel dropped.
    SocketDisconnected,
    /// The push channel delivered a message; proof that it is alive.
    SocketMessage,
    /// Query current state (response sent via oneshot channel).
    GetState(oneshot::Sender<SchedulerSnapshot>),
}

/// Which cadence the scheduler follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerMode {
    /// Socket believed connected: slow safety-net polling.
    ForcedPolling,
    /// Socket believed disconnected: regular fallback polling.
    FallbackPolling,
}

impl SchedulerMode {
    pub fn from_connected(is_socket_connected: bool) -> Self {
        if is_socket_connected {
            SchedulerMode::ForcedPolling
        } else {
            SchedulerMode::FallbackPolling
        }
    }
}

/// The purpose of the single armed cadence timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Forced cadence, re-armed on every firing and on every socket message.
    ForcedCadence,
    /// Grace delay after a disconnect.
    StartDelay,
    /// Fallback cadence, following the start delay.
    FallbackCadence,
}

/// Point-in-time view of a scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSnapshot {
    pub mode: SchedulerMode,
    /// Kind of the armed cadence timer, if any.
    pub timer: Option<TimerKind>,
    pub throttle: ThrottleState,
    /// Polls that resolved, successfully or not.
    pub completed_polls: u64,
    /// Polls that returned an error or panicked.
    pub failed_polls: u64,
    /// Requests absorbed into an already deferred poll.
    pub collapsed_requests: u64,
}

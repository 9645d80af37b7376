//! Polling scheduler.
//!
//! Decides when to call the poll callback based on whether the push
//! channel is believed to be working.
//!
//! # Architecture
//!
//! - `PollingScheduler`: Cloneable handle that forwards socket events
//! - `SchedulerActor`: Task owning the mode, the cadence timer and the throttle
//! - `Poller`: The caller-supplied fetch step
//! - `ErrorSink`: Receives poll errors (logged via `tracing` by default)

mod actor;
mod config;
mod handle;
mod messages;
mod poller;

pub use actor::{SchedulerActor, SchedulerOutcome};
pub use config::SchedulerConfig;
pub use handle::PollingScheduler;
pub use messages::{SchedulerMessage, SchedulerMode, SchedulerSnapshot, TimerKind};
pub use poller::{ErrorSink, FnPoller, PollError, Poller, TracingErrorSink};

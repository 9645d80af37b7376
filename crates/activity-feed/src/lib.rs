//! Activity feed: keeps a client's view of an account's activity list fresh
//! and consistently ordered on top of an unreliable push channel.
//!
//! ## Ordering
//!
//! - [`Activity`] - The three fields the ordering looks at (id, timestamp, pending)
//! - [`ordering::compare`] - Total order: pending first, then timestamp, then id
//! - [`ordering::merge`] - Sorted, de-duplicated union of two sorted lists
//! - [`ordering::merge_to_max_time`] - Windowed merge for rolling head-page updates
//!
//! ## Scheduling
//!
//! - [`PollingScheduler`] - Handle receiving socket connect/disconnect/message events
//! - [`SchedulerActor`] - The task owning timers and the poll throttle
//! - [`PollThrottle`] - At most one in-flight poll plus one deferred request
//! - [`Period`] - Jittered `[min, max]` millisecond delay
//! - [`FocusTracker`] - Foreground flag pausing focus-aware delays

pub mod activity;
pub mod error;
pub mod focus;
pub mod ordering;
pub mod period;
pub mod scheduler;
pub mod throttle;

pub use activity::{Activity, ActivityRecord, SortDirection};
pub use error::{Error, Result};
pub use focus::{FocusTracker, focus_aware_sleep};
pub use ordering::{DiagnosticSink, TracingDiagnostics, UnsortedInput};
pub use period::Period;
pub use scheduler::{
    ErrorSink, FnPoller, PollError, Poller, PollingScheduler, SchedulerActor, SchedulerConfig,
    SchedulerMessage, SchedulerMode, SchedulerOutcome, SchedulerSnapshot, TimerKind,
    TracingErrorSink,
};
pub use throttle::{PollThrottle, ThrottleAction, ThrottleState};

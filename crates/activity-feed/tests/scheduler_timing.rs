//! Timing behaviour of the polling scheduler under a paused Tokio clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use activity_feed::{
    ErrorSink, FocusTracker, Period, PollError, Poller, PollingScheduler, SchedulerActor,
    SchedulerConfig, SchedulerMode, SchedulerOutcome, ThrottleState, TimerKind,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{Instant, sleep_until};

/// Records the start offset (ms) of every poll.
struct RecordingPoller {
    origin: Instant,
    starts: Mutex<Vec<u64>>,
    finished: AtomicUsize,
    duration: Duration,
    fail: bool,
}

impl RecordingPoller {
    fn new(origin: Instant) -> Arc<Self> {
        Self::with(origin, Duration::ZERO, false)
    }

    fn with(origin: Instant, duration: Duration, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            origin,
            starts: Mutex::new(Vec::new()),
            finished: AtomicUsize::new(0),
            duration,
            fail,
        })
    }

    fn starts(&self) -> Vec<u64> {
        self.starts.lock().clone()
    }

    fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Poller for RecordingPoller {
    async fn poll(&self) -> Result<(), PollError> {
        self.starts
            .lock()
            .push(self.origin.elapsed().as_millis() as u64);
        if !self.duration.is_zero() {
            tokio::time::sleep(self.duration).await;
        }
        self.finished.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(PollError::transient("api unavailable"))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    reports: Mutex<Vec<(String, String)>>,
}

impl ErrorSink for RecordingSink {
    fn report(&self, scheduler_id: &str, error: &PollError) {
        self.reports
            .lock()
            .push((scheduler_id.to_string(), error.to_string()));
    }
}

fn config(poll_on_start: bool) -> SchedulerConfig {
    SchedulerConfig {
        poll_on_start,
        min_poll_delay: Period::fixed(100),
        polling_start_delay_ms: 1_000,
        polling_period: Period::fixed(5_000),
        forced_polling_period: Period::fixed(30_000),
    }
}

async fn at(origin: Instant, ms: u64) {
    sleep_until(origin + Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn fallback_polling_follows_start_delay_then_period() {
    let origin = Instant::now();
    let poller = RecordingPoller::new(origin);
    let (scheduler, task) =
        PollingScheduler::spawn("feed", config(false), poller.clone(), false);

    at(origin, 999).await;
    assert!(poller.starts().is_empty());

    at(origin, 1_001).await;
    assert_eq!(poller.starts(), vec![1_000]);

    at(origin, 11_001).await;
    assert_eq!(poller.starts(), vec![1_000, 6_000, 11_000]);

    scheduler.destroy();
    assert_eq!(task.await.unwrap(), SchedulerOutcome::Destroyed);
}

#[tokio::test(start_paused = true)]
async fn connect_polls_immediately_and_switches_to_forced_cadence() {
    let origin = Instant::now();
    let poller = RecordingPoller::new(origin);
    let (scheduler, task) =
        PollingScheduler::spawn("feed", config(false), poller.clone(), false);

    at(origin, 12_000).await;
    scheduler.on_socket_connect();

    // The fallback poll due at 16s was cancelled by the connect.
    at(origin, 41_999).await;
    assert_eq!(poller.starts(), vec![1_000, 6_000, 11_000, 12_000]);
    let state = scheduler.snapshot().await.unwrap();
    assert_eq!(state.mode, SchedulerMode::ForcedPolling);
    assert_eq!(state.timer, Some(TimerKind::ForcedCadence));

    at(origin, 42_001).await;
    assert_eq!(poller.starts().last(), Some(&42_000));

    scheduler.destroy();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn disconnect_restarts_grace_delay() {
    let origin = Instant::now();
    let poller = RecordingPoller::new(origin);
    let (scheduler, task) = PollingScheduler::spawn("feed", config(true), poller.clone(), true);

    at(origin, 2_000).await;
    scheduler.on_socket_disconnect();
    let state = scheduler.snapshot().await.unwrap();
    assert_eq!(state.mode, SchedulerMode::FallbackPolling);
    assert_eq!(state.timer, Some(TimerKind::StartDelay));

    at(origin, 8_001).await;
    assert_eq!(poller.starts(), vec![0, 3_000, 8_000]);

    scheduler.destroy();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn socket_message_pushes_forced_poll_back() {
    let origin = Instant::now();
    let poller = RecordingPoller::new(origin);
    let config = SchedulerConfig {
        forced_polling_period: Period::fixed(10_000),
        ..config(false)
    };
    let (scheduler, task) = PollingScheduler::spawn("feed", config, poller.clone(), true);

    at(origin, 8_000).await;
    scheduler.on_socket_message();

    at(origin, 17_999).await;
    assert!(poller.starts().is_empty());

    at(origin, 18_001).await;
    assert_eq!(poller.starts(), vec![18_000]);

    scheduler.destroy();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn socket_message_while_disconnected_cancels_fallback() {
    let origin = Instant::now();
    let poller = RecordingPoller::new(origin);
    let (scheduler, task) =
        PollingScheduler::spawn("feed", config(false), poller.clone(), false);

    at(origin, 500).await;
    scheduler.on_socket_message();

    at(origin, 29_999).await;
    assert!(poller.starts().is_empty());

    at(origin, 30_501).await;
    assert_eq!(poller.starts(), vec![30_500]);

    scheduler.destroy();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn destroy_before_start_skips_initial_poll() {
    let origin = Instant::now();
    let poller = RecordingPoller::new(origin);
    let (scheduler, task) = PollingScheduler::spawn("feed", config(true), poller.clone(), true);

    scheduler.destroy();
    assert_eq!(task.await.unwrap(), SchedulerOutcome::Destroyed);

    at(origin, 120_000).await;
    assert!(poller.starts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn destroy_stops_all_timers() {
    let origin = Instant::now();
    let poller = RecordingPoller::new(origin);
    let (scheduler, task) =
        PollingScheduler::spawn("feed", config(false), poller.clone(), false);

    at(origin, 1_500).await;
    scheduler.destroy();
    task.await.unwrap();

    scheduler.on_socket_connect();
    scheduler.on_socket_disconnect();
    scheduler.on_socket_message();

    at(origin, 60_000).await;
    assert_eq!(poller.starts(), vec![1_000]);
}

#[tokio::test(start_paused = true)]
async fn destroy_drops_in_flight_poll() {
    let origin = Instant::now();
    let poller = RecordingPoller::with(origin, Duration::from_millis(1_000), false);
    let (scheduler, task) = PollingScheduler::spawn("feed", config(true), poller.clone(), true);

    at(origin, 500).await;
    scheduler.destroy();
    task.await.unwrap();

    at(origin, 5_000).await;
    assert_eq!(poller.starts(), vec![0]);
    assert_eq!(poller.finished(), 0);
}

#[tokio::test(start_paused = true)]
async fn requests_while_busy_collapse_into_one_deferred_poll() {
    let origin = Instant::now();
    let poller = RecordingPoller::with(origin, Duration::from_millis(500), false);
    let config = SchedulerConfig {
        min_poll_delay: Period::fixed(1_000),
        ..config(true)
    };
    let (scheduler, task) = PollingScheduler::spawn("feed", config, poller.clone(), true);

    at(origin, 100).await;
    scheduler.on_socket_connect();
    at(origin, 200).await;
    scheduler.on_socket_connect();
    scheduler.on_socket_connect();

    let state = scheduler.snapshot().await.unwrap();
    assert_eq!(state.throttle, ThrottleState::InFlight { pending: true });
    assert_eq!(state.collapsed_requests, 2);

    at(origin, 5_000).await;
    // In flight 0..500, cooldown until 1500, deferred poll 1500..2000.
    assert_eq!(poller.starts(), vec![0, 1_500]);

    let state = scheduler.snapshot().await.unwrap();
    assert_eq!(state.completed_polls, 2);
    assert_eq!(state.throttle, ThrottleState::Idle);

    scheduler.destroy();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn request_during_cooldown_waits_for_min_delay() {
    let origin = Instant::now();
    let poller = RecordingPoller::new(origin);
    let config = SchedulerConfig {
        min_poll_delay: Period::fixed(2_000),
        ..config(true)
    };
    let (scheduler, task) = PollingScheduler::spawn("feed", config, poller.clone(), true);

    at(origin, 300).await;
    scheduler.on_socket_connect();

    at(origin, 3_000).await;
    assert_eq!(poller.starts(), vec![0, 2_000]);

    scheduler.destroy();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn poll_errors_are_reported_and_scheduling_continues() {
    let origin = Instant::now();
    let poller = RecordingPoller::with(origin, Duration::ZERO, true);
    let sink = Arc::new(RecordingSink::default());
    let (actor, scheduler) = SchedulerActor::new("feed-err", config(false), poller.clone(), false);
    let task = tokio::spawn(actor.with_error_sink(sink.clone()).run());

    at(origin, 6_001).await;
    assert_eq!(poller.starts(), vec![1_000, 6_000]);

    let reports = sink.reports.lock().clone();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].0, "feed-err");
    assert_eq!(reports[0].1, "api unavailable");

    let state = scheduler.snapshot().await.unwrap();
    assert_eq!(state.failed_polls, 2);

    scheduler.destroy();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn background_time_does_not_count_toward_fallback_cadence() {
    let origin = Instant::now();
    let poller = RecordingPoller::new(origin);
    let focus = FocusTracker::new(true);
    let (actor, scheduler) = SchedulerActor::new("feed", config(false), poller.clone(), false);
    let task = tokio::spawn(actor.with_focus(focus.subscribe()).run());

    // Fallback timer armed at 1000 for 5000ms of focused time.
    at(origin, 2_000).await;
    focus.set_focused(false);
    at(origin, 10_000).await;
    focus.set_focused(true);

    at(origin, 13_999).await;
    assert_eq!(poller.starts(), vec![1_000]);

    at(origin, 14_001).await;
    assert_eq!(poller.starts(), vec![1_000, 14_000]);

    scheduler.destroy();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn cooldown_pauses_while_in_background() {
    let origin = Instant::now();
    let poller = RecordingPoller::new(origin);
    let focus = FocusTracker::new(true);
    let config = SchedulerConfig {
        min_poll_delay: Period::fixed(2_000),
        ..config(true)
    };
    let (actor, scheduler) = SchedulerActor::new("feed", config, poller.clone(), true);
    let task = tokio::spawn(actor.with_focus(focus.subscribe()).run());

    // Cooldown runs 500ms focused, then stalls in the background.
    at(origin, 500).await;
    focus.set_focused(false);
    at(origin, 600).await;
    scheduler.on_socket_connect();
    let state = scheduler.snapshot().await.unwrap();
    assert_eq!(state.throttle, ThrottleState::CoolingDown { pending: true });

    // 1500ms of cooldown left once focus returns at 10s.
    at(origin, 10_000).await;
    focus.set_focused(true);

    at(origin, 11_499).await;
    assert_eq!(poller.starts(), vec![0]);

    at(origin, 11_501).await;
    assert_eq!(poller.starts(), vec![0, 11_500]);

    scheduler.destroy();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn forced_cadence_ignores_focus() {
    let origin = Instant::now();
    let poller = RecordingPoller::new(origin);
    let focus = FocusTracker::new(false);
    let (actor, scheduler) = SchedulerActor::new("feed", config(false), poller.clone(), true);
    let task = tokio::spawn(actor.with_focus(focus.subscribe()).run());

    at(origin, 30_001).await;
    assert_eq!(poller.starts(), vec![30_000]);

    scheduler.destroy();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn dropping_every_handle_detaches_actor() {
    let origin = Instant::now();
    let poller = RecordingPoller::new(origin);
    let (scheduler, task) =
        PollingScheduler::spawn("feed", config(false), poller.clone(), false);

    drop(scheduler);
    assert_eq!(task.await.unwrap(), SchedulerOutcome::Detached);

    at(origin, 20_000).await;
    assert!(poller.starts().is_empty());
}

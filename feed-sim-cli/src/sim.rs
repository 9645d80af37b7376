//! Simulated socket, activity API and feed state.

use std::slice;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use activity_feed::ordering::{merge, sort};
use activity_feed::{
    ActivityRecord, FocusTracker, PollError, Poller, PollingScheduler, SchedulerActor,
    SchedulerOutcome, SchedulerSnapshot, SortDirection,
};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

use crate::config::{AppConfig, SimulationConfig};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    #[default]
    Transfer,
    Swap,
    Stake,
}

impl ActivityKind {
    fn random() -> Self {
        match rand::random::<u64>() % 3 {
            0 => ActivityKind::Transfer,
            1 => ActivityKind::Swap,
            _ => ActivityKind::Stake,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub kind: ActivityKind,
    pub amount: u64,
}

pub type Entry = Arc<ActivityRecord<Payload>>;

struct ApiActivity {
    record: Entry,
    confirm_at: Option<Instant>,
}

/// In-memory stand-in for the remote activity API.
pub struct FakeApi {
    origin: Instant,
    config: SimulationConfig,
    activities: Mutex<Vec<ApiActivity>>,
    fetches: AtomicU64,
    failures: AtomicU64,
}

impl FakeApi {
    pub fn new(origin: Instant, config: SimulationConfig) -> Self {
        Self {
            origin,
            config,
            activities: Mutex::new(Vec::new()),
            fetches: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    fn millis_at(&self, at: Instant) -> i64 {
        i64::try_from(at.duration_since(self.origin).as_millis()).unwrap_or(i64::MAX)
    }

    /// Record a new pending activity and return it.
    pub fn create_activity(&self) -> Entry {
        let now = Instant::now();
        let mut activities = self.activities.lock();
        let record = Arc::new(ActivityRecord {
            id: format!("tx-{:06}", activities.len()),
            timestamp: self.millis_at(now),
            is_pending: true,
            payload: Payload {
                kind: ActivityKind::random(),
                amount: 1 + rand::random::<u64>() % 10_000,
            },
        });
        activities.push(ApiActivity {
            record: record.clone(),
            confirm_at: Some(now + self.config.confirm_after_ms.sample()),
        });
        record
    }

    /// Fetch the newest page, confirming whatever is due first.
    pub fn fetch_head_page(&self) -> Result<Vec<Entry>, PollError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        if rand::random::<f64>() < self.config.failure_rate {
            self.failures.fetch_add(1, Ordering::Relaxed);
            return Err(PollError::transient("simulated API failure"));
        }

        let now = Instant::now();
        let mut activities = self.activities.lock();
        for activity in activities.iter_mut() {
            if let Some(confirm_at) = activity.confirm_at.filter(|at| *at <= now) {
                let mut confirmed = (*activity.record).clone();
                confirmed.is_pending = false;
                confirmed.timestamp = self.millis_at(confirm_at);
                activity.record = Arc::new(confirmed);
                activity.confirm_at = None;
            }
        }

        let all: Vec<Entry> = activities.iter().map(|a| a.record.clone()).collect();
        let mut page = sort(&all, SortDirection::Descending);
        page.truncate(self.config.page_size);
        Ok(page)
    }

    pub fn created(&self) -> usize {
        self.activities.lock().len()
    }

    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// The client-side feed, kept sorted newest first.
#[derive(Debug, Clone, Default)]
pub struct Feed {
    entries: Arc<Mutex<Vec<Entry>>>,
}

impl Feed {
    /// Fold a fetched page in. Page entries replace older copies.
    pub fn apply_page(&self, page: &[Entry]) -> usize {
        let mut entries = self.entries.lock();
        let merged = merge(page, entries.as_slice(), SortDirection::Descending);
        let added = merged.len().saturating_sub(entries.len());
        *entries = merged;
        added
    }

    /// Fold a single pushed activity in.
    pub fn push(&self, activity: Entry) -> usize {
        self.apply_page(slice::from_ref(&activity))
    }

    pub fn snapshot(&self) -> Vec<Entry> {
        self.entries.lock().clone()
    }
}

/// Poll callback: fetch the head page and fold it into the feed.
pub struct FeedPoller {
    api: Arc<FakeApi>,
    feed: Feed,
}

impl FeedPoller {
    pub fn new(api: Arc<FakeApi>, feed: Feed) -> Self {
        Self { api, feed }
    }
}

#[async_trait]
impl Poller for FeedPoller {
    async fn poll(&self) -> Result<(), PollError> {
        tokio::time::sleep(self.api.config.api_latency_ms.sample()).await;
        let page = self.api.fetch_head_page()?;
        let added = self.feed.apply_page(&page);
        debug!("Fetched {} entries, {} new", page.len(), added);
        Ok(())
    }
}

/// Outcome of a simulation run.
#[derive(Debug)]
pub struct SimReport {
    pub feed: Vec<Entry>,
    pub snapshot: Option<SchedulerSnapshot>,
    pub outcome: SchedulerOutcome,
    pub created: usize,
    pub pushed: u64,
    pub fetches: u64,
    pub failures: u64,
    pub elapsed: Duration,
}

impl SimReport {
    pub fn pending(&self) -> usize {
        self.feed.iter().filter(|e| e.is_pending).count()
    }

    /// Activities the API knows about that never reached the feed.
    pub fn missing(&self) -> usize {
        self.created.saturating_sub(self.feed.len())
    }
}

/// Run one simulation to completion.
pub async fn run(config: AppConfig) -> Result<SimReport> {
    config.validate()?;
    let sim = config.simulation.clone();
    let origin = Instant::now();
    let end = origin + Duration::from_millis(sim.duration_ms);

    let api = Arc::new(FakeApi::new(origin, sim.clone()));
    let feed = Feed::default();
    let focus = FocusTracker::new(true);

    let poller = Arc::new(FeedPoller::new(api.clone(), feed.clone()));
    let (actor, scheduler) =
        SchedulerActor::new("sim-feed", config.scheduler, poller, sim.start_connected);
    let actor_task = tokio::spawn(actor.with_focus(focus.subscribe()).run());

    info!(
        "Simulating {}s, socket initially {}",
        sim.duration_ms / 1000,
        if sim.start_connected { "connected" } else { "disconnected" }
    );

    let socket_task = tokio::spawn(run_socket(
        sim.clone(),
        api.clone(),
        feed.clone(),
        scheduler.clone(),
        end,
    ));
    let focus_task = sim.background_every_ms.map(|every| {
        tokio::spawn(run_focus_cycle(
            focus.clone(),
            Duration::from_millis(every),
            Duration::from_millis(sim.background_for_ms),
            end,
        ))
    });

    let pushed = socket_task.await?;
    if let Some(task) = focus_task {
        task.await?;
    }

    let snapshot = scheduler.snapshot().await;
    scheduler.destroy();
    let outcome = actor_task.await?;

    Ok(SimReport {
        feed: feed.snapshot(),
        snapshot,
        outcome,
        created: api.created(),
        pushed,
        fetches: api.fetches(),
        failures: api.failures(),
        elapsed: origin.elapsed(),
    })
}

/// Drive the socket through up/down phases until `end`. Returns the number
/// of activities delivered by push.
async fn run_socket(
    sim: SimulationConfig,
    api: Arc<FakeApi>,
    feed: Feed,
    scheduler: PollingScheduler,
    end: Instant,
) -> u64 {
    let mut connected = sim.start_connected;
    let mut pushed = 0;

    loop {
        let phase = if connected {
            sim.socket_up_ms.sample()
        } else {
            sim.socket_down_ms.sample()
        };
        let stalled = connected && rand::random::<f64>() < sim.stall_rate;
        let phase_end = (Instant::now() + phase).min(end);

        if stalled {
            info!("Socket connected but stalled for {:?}", phase);
        } else {
            debug!("Socket {} for {:?}", if connected { "up" } else { "down" }, phase);
        }

        loop {
            let next = Instant::now() + sim.new_activity_ms.sample();
            if next >= phase_end {
                sleep_until(phase_end).await;
                break;
            }
            sleep_until(next).await;

            let activity = api.create_activity();
            if connected && !stalled {
                feed.push(activity);
                scheduler.on_socket_message();
                pushed += 1;
            }
        }

        if Instant::now() >= end {
            break;
        }

        connected = !connected;
        if connected {
            info!("Socket reconnected");
            scheduler.on_socket_connect();
        } else {
            info!("Socket dropped");
            scheduler.on_socket_disconnect();
        }
    }

    pushed
}

async fn run_focus_cycle(focus: FocusTracker, every: Duration, len: Duration, end: Instant) {
    loop {
        let leave = Instant::now() + every;
        if leave >= end {
            break;
        }
        sleep_until(leave).await;
        info!("App moved to background");
        focus.set_focused(false);

        let back = (Instant::now() + len).min(end);
        sleep_until(back).await;
        info!("App back in foreground");
        focus.set_focused(true);
    }
}

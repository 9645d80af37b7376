//! Focus-aware delays.
//!
//! While the host application is in the background, time spent there does
//! not count toward a focus-aware delay; the countdown resumes with the
//! remaining portion once focus returns.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Per-instance foreground flag.
///
/// The host toggles it from its lifecycle callbacks; schedulers hold
/// receivers obtained from [`FocusTracker::subscribe`].
#[derive(Debug, Clone)]
pub struct FocusTracker {
    tx: watch::Sender<bool>,
}

impl FocusTracker {
    /// Create a tracker with the given initial focus state.
    pub fn new(focused: bool) -> Self {
        let (tx, _) = watch::channel(focused);
        Self { tx }
    }

    /// Update the focus state. Subscribers are only woken on an actual change.
    pub fn set_focused(&self, focused: bool) {
        self.tx.send_if_modified(|current| {
            if *current == focused {
                false
            } else {
                *current = focused;
                true
            }
        });
    }

    /// Current focus state.
    pub fn is_focused(&self) -> bool {
        *self.tx.borrow()
    }

    /// Subscribe to focus changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// A receiver that reports focus forever, for hosts without a notion of
    /// background state.
    pub fn always_focused() -> watch::Receiver<bool> {
        let (_, rx) = watch::channel(true);
        rx
    }
}

impl Default for FocusTracker {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Sleep for `duration` of focused time.
///
/// Wraps `tokio::time::sleep`: the countdown is paused while `focus` reads
/// `false` and resumes with the remaining time once it flips back. If the
/// tracker is dropped the remaining time elapses unconditionally.
pub async fn focus_aware_sleep(duration: Duration, mut focus: watch::Receiver<bool>) {
    let mut remaining = duration;

    loop {
        let focused = *focus.borrow_and_update();

        if !focused {
            if focus.changed().await.is_err() {
                break;
            }
            continue;
        }

        let started = Instant::now();
        tokio::select! {
            _ = tokio::time::sleep(remaining) => return,
            changed = focus.changed() => {
                remaining = remaining.saturating_sub(started.elapsed());
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    tokio::time::sleep(remaining).await;
}

//! Handle for a running scheduler.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::actor::{SchedulerActor, SchedulerOutcome};
use super::config::SchedulerConfig;
use super::messages::{SchedulerMessage, SchedulerSnapshot};
use super::poller::Poller;

/// Handle to a [`SchedulerActor`].
///
/// Socket events are fire-and-forget: they are queued and handled by the
/// actor in order. Once destroyed, every method is a no-op. Dropping the
/// last clone stops the actor too.
#[derive(Clone)]
pub struct PollingScheduler {
    id: Arc<str>,
    sender: mpsc::UnboundedSender<SchedulerMessage>,
    cancellation_token: CancellationToken,
}

impl PollingScheduler {
    pub(crate) fn new(
        id: String,
        sender: mpsc::UnboundedSender<SchedulerMessage>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            id: id.into(),
            sender,
            cancellation_token,
        }
    }

    /// Create a scheduler and spawn its actor on the current runtime.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        id: impl Into<String>,
        config: SchedulerConfig,
        poller: Arc<dyn Poller>,
        is_socket_connected: bool,
    ) -> (Self, JoinHandle<SchedulerOutcome>) {
        let (actor, handle) = SchedulerActor::new(id, config, poller, is_socket_connected);
        let task = tokio::spawn(actor.run());
        (handle, task)
    }

    /// Get the scheduler's ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The push channel connected: poll now, then follow the forced cadence.
    pub fn on_socket_connect(&self) {
        self.notify(SchedulerMessage::SocketConnected);
    }

    /// The push channel dropped: start fallback polling after the grace delay.
    pub fn on_socket_disconnect(&self) {
        self.notify(SchedulerMessage::SocketDisconnected);
    }

    /// The push channel delivered a message: push the forced poll back.
    pub fn on_socket_message(&self) {
        self.notify(SchedulerMessage::SocketMessage);
    }

    /// Stop the scheduler. Idempotent.
    ///
    /// No timer fires and no poll starts after this returns; an in-flight
    /// poll is dropped at its next suspension point.
    pub fn destroy(&self) {
        if !self.cancellation_token.is_cancelled() {
            debug!("Destroying PollingScheduler {}", self.id);
            self.cancellation_token.cancel();
        }
    }

    /// Whether [`destroy`](Self::destroy) was called.
    pub fn is_destroyed(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Current state, or `None` once the actor has stopped.
    pub async fn snapshot(&self) -> Option<SchedulerSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.notify(SchedulerMessage::GetState(tx));
        rx.await.ok()
    }

    fn notify(&self, msg: SchedulerMessage) {
        if self.is_destroyed() {
            trace!("PollingScheduler {} destroyed, dropping {:?}", self.id, msg);
            return;
        }
        if let Err(e) = self.sender.send(msg) {
            trace!("PollingScheduler {} actor gone, dropping {:?}", self.id, e.0);
        }
    }
}

impl fmt::Debug for PollingScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingScheduler")
            .field("id", &self.id)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

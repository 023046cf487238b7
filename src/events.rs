//! Two-topic event bus for cluster observability: `Queued` and `TaskError`
//! broadcast over a statically typed `tokio::sync::broadcast` channel.

use tokio::sync::broadcast;

use crate::error::ClusterError;

/// An event published by the [`crate::cluster::Cluster`].
#[derive(Debug, Clone)]
pub enum ClusterEvent<T> {
    /// A job was accepted by `queue`/`execute`.
    Queued { data: T },
    /// A job's task attempt failed. `will_retry` reflects whether the
    /// scheduler will re-push it (always `false` for jobs enqueued via
    /// `execute`, since those are never retried).
    TaskError {
        error: ClusterError,
        data: T,
        will_retry: bool,
    },
}

/// Thin wrapper around a [`broadcast::Sender`] used by the scheduler to
/// publish events. Subscribers that fall behind observe
/// `broadcast::error::RecvError::Lagged` rather than silently missing events.
pub(crate) struct EventBus<T> {
    sender: broadcast::Sender<ClusterEvent<T>>,
}

impl<T: Clone> EventBus<T> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent<T>> {
        self.sender.subscribe()
    }

    /// Publish an event. Ignores the "no subscribers" error: publishing with
    /// nobody listening is the common case, not a failure.
    pub fn publish(&self, event: ClusterEvent<T>) {
        let _ = self.sender.send(event);
    }
}

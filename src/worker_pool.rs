//! Pool of lazily-spawned [`Worker`]s bounded by `max_concurrency`.
//!
//! Routing is non-blocking: the scheduler checks `can_handle`/
//! `can_launch_worker` itself and never waits inside the pool for capacity
//! to free up — an unavailable worker simply means "try again on the next
//! dispatch tick". Workers stay registered in the pool for their whole
//! lifetime (no idle/busy partition): a worker whose `can_handle` allows
//! concurrent jobs (the shared-page and per-group strategies) can be handed
//! out to more than one in-flight job at once.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use tokio::sync::Mutex;

use crate::config::{ClusterConfig, Concurrency};
use crate::error::ClusterResult;
use crate::provider::ResourceProvider;
use crate::worker::Worker;

pub struct WorkerPool<T, O> {
    config: Arc<ClusterConfig<T>>,
    provider: Arc<dyn ResourceProvider<T>>,
    workers: Mutex<Vec<Arc<Worker<T, O>>>>,
    /// Count of workers with at least one job in flight. Each `Worker`
    /// shares this counter and flips it exactly when its own `active_jobs`
    /// crosses 0 <-> nonzero, so it never drifts from the workers' actual
    /// state.
    busy: Arc<AtomicUsize>,
    spawned: AtomicUsize,
    last_spawn: Mutex<Option<Instant>>,
}

impl<T, O> WorkerPool<T, O>
where
    T: Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    pub fn new(config: Arc<ClusterConfig<T>>, provider: Arc<dyn ResourceProvider<T>>) -> Self {
        Self {
            config,
            provider,
            workers: Mutex::new(Vec::new()),
            busy: Arc::new(AtomicUsize::new(0)),
            spawned: AtomicUsize::new(0),
            last_spawn: Mutex::new(None),
        }
    }

    /// Count of workers currently executing at least one job.
    #[must_use]
    pub fn busy_count(&self) -> usize {
        self.busy.load(Ordering::SeqCst)
    }

    /// Count of workers ever spawned and not yet closed.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    /// Whether some existing worker (idle or already busy) can take `data`
    /// right now, without spawning.
    pub async fn can_handle(&self, data: &T) -> bool {
        self.workers.lock().await.iter().any(|w| w.can_handle(data))
    }

    /// Whether the pool may spawn a new worker for `data`: capacity remains,
    /// the minimum spacing since the last spawn has elapsed, and — for the
    /// per-group strategy — no existing worker already claims this job's
    /// group.
    pub async fn can_launch_worker(&self, data: &T) -> bool {
        if self.worker_count() >= self.config.max_concurrency() {
            return false;
        }

        if matches!(self.config.concurrency(), Concurrency::Group)
            && self.workers.lock().await.iter().any(|w| w.can_handle(data))
        {
            // A worker for this job's group already exists (busy or not);
            // one browser per group, never two.
            return false;
        }

        let delay = self.config.worker_creation_delay();
        if delay.is_zero() {
            return true;
        }
        match *self.last_spawn.lock().await {
            Some(prev) => prev.elapsed() >= delay,
            None => true,
        }
    }

    /// Spawn a new worker for `data` and register it with the pool.
    pub async fn launch_worker(&self, data: &T) -> ClusterResult<()> {
        *self.last_spawn.lock().await = Some(Instant::now());
        let id = self.spawned.fetch_add(1, Ordering::SeqCst);
        let resource = self.provider.worker_instance(Some(data)).await?;
        let worker = Arc::new(Worker::new(
            id,
            resource,
            Arc::clone(&self.config),
            Arc::clone(&self.busy),
        ));
        self.workers.lock().await.push(worker);
        Ok(())
    }

    /// Check out the first worker able to handle `data`, oldest first. The
    /// worker stays registered in the pool for the whole job attempt — its
    /// own `handle` call tracks the pool-wide busy count directly.
    pub async fn take_worker(&self, data: &T) -> Option<Arc<Worker<T, O>>> {
        self.workers
            .lock()
            .await
            .iter()
            .find(|w| w.can_handle(data))
            .cloned()
    }

    /// Close every worker. Callers must ensure no worker is busy before
    /// calling this — the scheduler waits for `busy_count() == 0` as part of
    /// its own close sequence.
    pub async fn close(&self) {
        let mut workers = self.workers.lock().await;
        for worker in workers.drain(..) {
            worker.close().await;
        }
        if let Err(e) = self.provider.close().await {
            tracing::warn!(error = %e, "error closing resource provider");
        }
    }
}

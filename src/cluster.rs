//! Thin facade composing config, provider, pool and scheduler into the
//! public API: `launch`, `task`, `queue`, `execute`, `idle`, `wait_for_one`,
//! `subscribe`, `close`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::{ClusterConfig, Concurrency};
use crate::error::{ClusterError, ClusterResult};
use crate::events::ClusterEvent;
use crate::job::TaskFn;
use crate::provider::ResourceProvider;
use crate::provider::per_browser::PerBrowserProvider;
use crate::provider::per_context::PerContextProvider;
use crate::provider::per_group::PerGroupProvider;
use crate::provider::shared_page::SharedPageProvider;
use crate::scheduler::Scheduler;
use crate::worker_pool::WorkerPool;

fn build_provider<T>(config: &ClusterConfig<T>) -> ClusterResult<Arc<dyn ResourceProvider<T>>>
where
    T: Send + Sync + 'static,
{
    match config.concurrency() {
        Concurrency::Page => Ok(Arc::new(SharedPageProvider::new(config.headless()))),
        Concurrency::Context => Ok(Arc::new(PerContextProvider::new(config.headless()))),
        Concurrency::Browser => Ok(Arc::new(PerBrowserProvider::new(config.headless()))),
        Concurrency::Group => {
            let group_fn = config.group_fn().cloned().ok_or_else(|| {
                ClusterError::Config("Concurrency::Group requires a group_fn".to_string())
            })?;
            Ok(Arc::new(PerGroupProvider::new(config.headless(), group_fn)))
        }
        Concurrency::Custom(factory) => Ok(factory.create()),
    }
}

/// A running job cluster. Generic over the job payload `T` and the task's
/// output `O`.
pub struct Cluster<T, O> {
    scheduler: Arc<Scheduler<T, O>>,
    pool: Arc<WorkerPool<T, O>>,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<T, O> Cluster<T, O>
where
    T: Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    /// Validate `config`, construct the matching resource provider, and
    /// start the dispatch loop.
    pub async fn launch(config: ClusterConfig<T>) -> ClusterResult<Self> {
        let config = Arc::new(config);
        let provider = build_provider(config.as_ref())?;
        provider.init().await?;

        let pool = Arc::new(WorkerPool::new(Arc::clone(&config), provider));
        let scheduler = Scheduler::new(Arc::clone(&config), Arc::clone(&pool));

        let monitor_handle = if config.monitor() {
            let pool_for_monitor = Arc::clone(&pool);
            Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(5));
                loop {
                    ticker.tick().await;
                    info!(
                        busy = pool_for_monitor.busy_count(),
                        workers = pool_for_monitor.worker_count(),
                        "cluster monitor tick"
                    );
                }
            }))
        } else {
            None
        };

        info!(max_concurrency = config.max_concurrency(), "cluster launched");
        Ok(Self {
            scheduler,
            pool,
            monitor_handle: Mutex::new(monitor_handle),
        })
    }

    /// Set the cluster-default task function, used by jobs enqueued without
    /// their own per-job task.
    pub async fn task(&self, task_fn: TaskFn<T, O>) {
        self.scheduler.set_default_task(task_fn).await;
    }

    /// Fire-and-forget enqueue using the cluster-default task.
    pub async fn queue(&self, data: T) -> ClusterResult<()> {
        self.scheduler.submit(data, None, None).await
    }

    /// Fire-and-forget enqueue with a per-job task override.
    pub async fn queue_with_task(&self, data: T, task_fn: TaskFn<T, O>) -> ClusterResult<()> {
        self.scheduler.submit(data, Some(task_fn), None).await
    }

    /// Enqueue using the cluster-default task and await its terminal result.
    /// Never retried.
    pub async fn execute(&self, data: T) -> ClusterResult<O> {
        let (tx, rx) = oneshot::channel();
        self.scheduler.submit(data, None, Some(tx)).await?;
        rx.await.map_err(|_| ClusterError::Closed)?
    }

    /// Enqueue with a per-job task override and await its terminal result.
    pub async fn execute_with_task(&self, data: T, task_fn: TaskFn<T, O>) -> ClusterResult<O> {
        let (tx, rx) = oneshot::channel();
        self.scheduler.submit(data, Some(task_fn), Some(tx)).await?;
        rx.await.map_err(|_| ClusterError::Closed)?
    }

    /// Resolves once the queue is empty and no worker is busy.
    pub async fn idle(&self) {
        self.scheduler.idle().await;
    }

    /// Resolves with the payload of the next job to complete (success or
    /// error).
    pub async fn wait_for_one(&self) -> ClusterResult<T> {
        self.scheduler.wait_for_one().await
    }

    /// Subscribe to `Queued`/`TaskError` events. Lagging subscribers observe
    /// `RecvError::Lagged`.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent<T>> {
        self.scheduler.subscribe()
    }

    #[must_use]
    pub fn busy_count(&self) -> usize {
        self.pool.busy_count()
    }

    /// Stop accepting new jobs, wait for in-flight ones to finish, and tear
    /// down every worker and the provider. Idempotent.
    pub async fn close(&self) -> ClusterResult<()> {
        if let Some(handle) = self.monitor_handle.lock().await.take() {
            handle.abort();
        }
        self.scheduler.close().await;
        Ok(())
    }
}

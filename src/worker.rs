//! Worker: owns one [`WorkerInstance`] and runs jobs against it, following
//! an acquire/use/release lifecycle scoped to each job. Whether a worker may
//! run more than one job at a time is decided by [`can_handle`].

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chromiumoxide_cdp::cdp::js_protocol::runtime::EventExceptionThrown;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::ClusterConfig;
use crate::error::ClusterError;
use crate::job::{Job, JobContext, WorkResult};
use crate::provider::{JobInstance, WorkerInstance};

/// Attempts to obtain a fresh `JobInstance` before giving up on a worker
/// entirely and letting the pool replace it.
const BROWSER_INSTANCE_TRIES: u32 = 10;

pub struct Worker<T, O> {
    pub id: usize,
    resource: Box<dyn WorkerInstance<T>>,
    config: Arc<ClusterConfig<T>>,
    active_jobs: AtomicUsize,
    /// Pool-wide count of workers with at least one job in flight, shared
    /// across every worker so it tracks the exact moment this worker's own
    /// `active_jobs` crosses 0 <-> nonzero, with no separate bookkeeping step
    /// (and so no window where the two can disagree).
    pool_busy: Arc<AtomicUsize>,
    _marker: std::marker::PhantomData<O>,
}

impl<T, O> Worker<T, O>
where
    T: Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    pub fn new(
        id: usize,
        resource: Box<dyn WorkerInstance<T>>,
        config: Arc<ClusterConfig<T>>,
        pool_busy: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            id,
            resource,
            config,
            active_jobs: AtomicUsize::new(0),
            pool_busy,
            _marker: std::marker::PhantomData,
        }
    }

    /// Whether this worker is willing to take on `data` right now. Delegates
    /// to the underlying `WorkerInstance` if it expresses a preference;
    /// otherwise a worker already running a job refuses further work.
    #[must_use]
    pub fn can_handle(&self, data: &T) -> bool {
        match self.resource.can_handle(data) {
            Some(b) => b,
            None => self.active_jobs.load(Ordering::SeqCst) == 0,
        }
    }

    /// Whether this worker currently has no job in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.active_jobs.load(Ordering::SeqCst) == 0
    }

    /// Run a single task attempt for `job` to completion.
    ///
    /// A failure to acquire or release the per-job resource never escapes as
    /// the job's own error directly: acquisition failure surfaces as
    /// `ClusterError::Provider` (after `BROWSER_INSTANCE_TRIES` repair
    /// attempts), and a release failure is only logged — the task's own
    /// result still stands. An asynchronous page-level error observed while
    /// the task is running takes priority over whatever the task itself
    /// returned.
    pub async fn handle(&self, job: &mut Job<T, O>) -> WorkResult<O> {
        let Some(task_fn) = job.task_fn.clone() else {
            return WorkResult::Error(ClusterError::Config(
                "job has no task function".to_string(),
            ));
        };

        if self.active_jobs.fetch_add(1, Ordering::SeqCst) == 0 {
            self.pool_busy.fetch_add(1, Ordering::SeqCst);
        }

        let job_instance = match self.acquire_job_instance(&job.data).await {
            Ok(instance) => instance,
            Err(e) => {
                self.finish_job();
                return WorkResult::Error(e);
            }
        };

        let (error_state, observer) = Self::install_error_observer(job_instance.as_ref());

        let ctx = JobContext {
            page: job_instance.page().clone(),
            data: job.data.clone(),
            worker_id: self.id,
        };

        let outcome = tokio::time::timeout(self.config.timeout(), task_fn(ctx)).await;
        observer.abort();

        if let Err(e) = job_instance.close().await {
            warn!(worker = self.id, error = %e, "failed to release job resource");
            if let Err(e) = self.resource.repair().await {
                warn!(worker = self.id, error = %e, "worker repair after release failure also failed");
            }
        }

        self.finish_job();

        if let Some(observed) = error_state.lock().await.take() {
            return WorkResult::Error(observed);
        }

        match outcome {
            Err(_) => WorkResult::Error(ClusterError::Timeout(self.config.timeout())),
            Ok(Err(e)) => WorkResult::Error(e),
            Ok(Ok(value)) => WorkResult::Success(value),
        }
    }

    /// Marks one job attempt as finished, flipping `pool_busy` down exactly
    /// when this worker's last in-flight job completes.
    fn finish_job(&self) {
        if self.active_jobs.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.pool_busy.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Installs a one-shot listener for an uncaught page-level exception on
    /// `job_instance`'s page. Whatever it observes (at most one event) is
    /// written into the returned `Mutex` and takes priority over the task's
    /// own return value. The returned handle must be aborted once the task
    /// attempt finishes so the listener doesn't outlive the job.
    fn install_error_observer(
        job_instance: &dyn JobInstance,
    ) -> (Arc<Mutex<Option<ClusterError>>>, JoinHandle<()>) {
        let error_state = Arc::new(Mutex::new(None));
        let state_for_listener = Arc::clone(&error_state);
        let page = job_instance.page().clone();

        let handle = tokio::spawn(async move {
            let Ok(mut events) = page.event_listener::<EventExceptionThrown>().await else {
                return;
            };
            if let Some(event) = events.next().await {
                let detail = &event.exception_details;
                let message = detail
                    .exception
                    .as_ref()
                    .and_then(|e| e.description.clone())
                    .unwrap_or_else(|| detail.text.clone());
                *state_for_listener.lock().await = Some(ClusterError::PageError(message));
            }
        });

        (error_state, handle)
    }

    async fn acquire_job_instance(
        &self,
        data: &T,
    ) -> Result<Box<dyn crate::provider::JobInstance>, ClusterError> {
        let mut last_err = None;
        for attempt in 0..BROWSER_INSTANCE_TRIES {
            match self.resource.job_instance(data).await {
                Ok(instance) => return Ok(instance),
                Err(e) => {
                    warn!(worker = self.id, attempt, error = %e, "failed to acquire job instance");
                    last_err = Some(e);
                    if let Err(repair_err) = self.resource.repair().await {
                        warn!(worker = self.id, error = %repair_err, "worker repair failed");
                    }
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ClusterError::Provider("exhausted retries".to_string())))
    }

    pub async fn close(&self) {
        if let Err(e) = self.resource.close().await {
            debug!(worker = self.id, error = %e, "error closing worker resource");
        }
    }
}

//! Job value object and the task-function contract workers execute.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::oneshot;

use crate::error::ClusterError;

/// Monotonic identifier assigned to every job at enqueue time.
///
/// Used by the [`crate::delay_queue::DelayQueue`] to remove a specific job
/// without requiring `T` or `O` to be comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub(crate) u64);

/// The context handed to a task function for a single job.
///
/// `page` is the resource acquired from the provider for this job; `data` is
/// a clone of the job's payload; `worker_id` identifies the worker executing
/// the task (useful for logging/metrics in the task function itself).
pub struct JobContext<T> {
    pub page: chromiumoxide::Page,
    pub data: T,
    pub worker_id: usize,
}

/// Future type returned by a task function.
pub type TaskFuture<O> = Pin<Box<dyn Future<Output = Result<O, ClusterError>> + Send>>;

/// A user task: takes a [`JobContext`] and produces `O` or a [`ClusterError`].
///
/// Cloned cheaply (`Arc`) since the same task function is shared across every
/// worker and every retry of a job.
pub type TaskFn<T, O> = Arc<dyn Fn(JobContext<T>) -> TaskFuture<O> + Send + Sync>;

/// Wraps a plain async closure into a [`TaskFn`].
///
/// ```ignore
/// let task = task_fn(|ctx: JobContext<u32>| async move {
///     Ok(ctx.data * 2)
/// });
/// ```
pub fn task_fn<T, O, F, Fut>(f: F) -> TaskFn<T, O>
where
    F: Fn(JobContext<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, ClusterError>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)) as TaskFuture<O>)
}

/// The outcome of a single `Worker::handle` invocation. Never panics or
/// propagates — every fallible step inside `handle` is folded into this.
#[derive(Debug)]
pub enum WorkResult<O> {
    Success(O),
    Error(ClusterError),
}

/// A unit of work: an opaque payload plus cluster bookkeeping.
///
/// `tries` never decreases. If `callbacks` is set (the job was enqueued via
/// `execute`), the cluster never retries it — see `Scheduler::dispatch` step 11.
pub struct Job<T, O> {
    pub(crate) id: JobId,
    pub data: T,
    pub(crate) url: Option<String>,
    pub(crate) domain: Option<String>,
    pub(crate) task_fn: Option<TaskFn<T, O>>,
    pub(crate) callbacks: Option<oneshot::Sender<Result<O, ClusterError>>>,
    pub(crate) group: Option<String>,
    pub(crate) tries: u32,
    pub(crate) errors: Vec<ClusterError>,
}

impl<T, O> Job<T, O> {
    pub(crate) fn new(id: JobId, data: T, task_fn: Option<TaskFn<T, O>>) -> Self {
        Self {
            id,
            data,
            url: None,
            domain: None,
            task_fn,
            callbacks: None,
            group: None,
            tries: 0,
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> JobId {
        self.id
    }

    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    #[must_use]
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    #[must_use]
    pub fn tries(&self) -> u32 {
        self.tries
    }

    #[must_use]
    pub fn errors(&self) -> &[ClusterError] {
        &self.errors
    }

    #[must_use]
    pub fn is_execute(&self) -> bool {
        self.callbacks.is_some()
    }
}

/// An entry waiting in the [`crate::delay_queue::DelayQueue`]: the job plus
/// the time at which it becomes eligible for dispatch.
pub(crate) struct QueueEntry<T, O> {
    pub job: Job<T, O>,
    pub delay_until: Option<Instant>,
}

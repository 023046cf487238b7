//! Dispatch loop: pulls ready jobs off the queue, applies admission
//! filters, routes them to the worker pool, and runs each task attempt on
//! its own detached task so the dispatcher itself never blocks on user code.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ClusterConfig;
use crate::delay_queue::DelayQueue;
use crate::error::{ClusterError, ClusterResult};
use crate::events::{ClusterEvent, EventBus};
use crate::job::{Job, JobId, TaskFn, WorkResult};
use crate::worker_pool::WorkerPool;

/// Safety-net poll interval: guarantees forward progress even if a
/// `request_dispatch` call is ever missed.
const CHECK_FOR_WORK_INTERVAL: Duration = Duration::from_millis(100);
/// Coalescing window: multiple `request_dispatch` calls arriving within this
/// window collapse into a single dispatch burst.
const WORK_CALL_INTERVAL_LIMIT: Duration = Duration::from_millis(10);
/// Event bus channel capacity; subscribers falling more than this far behind
/// observe `RecvError::Lagged` rather than unbounded memory growth.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

struct SchedulerState<T, O> {
    queue: DelayQueue<T, O>,
    duplicate_urls: HashSet<String>,
    last_domain_access: HashMap<String, Instant>,
    next_job_id: u64,
    all_target_count: u64,
    error_count: u64,
    idle_waiters: Vec<oneshot::Sender<()>>,
    wait_for_one_waiters: Vec<oneshot::Sender<T>>,
    default_task_fn: Option<TaskFn<T, O>>,
}

pub struct Scheduler<T, O> {
    config: Arc<ClusterConfig<T>>,
    pool: Arc<WorkerPool<T, O>>,
    events: Arc<EventBus<T>>,
    state: Mutex<SchedulerState<T, O>>,
    closed: AtomicBool,
    dispatch_tx: mpsc::Sender<()>,
    dispatch_loop: Mutex<Option<JoinHandle<()>>>,
}

impl<T, O> Scheduler<T, O>
where
    T: Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    pub fn new(config: Arc<ClusterConfig<T>>, pool: Arc<WorkerPool<T, O>>) -> Arc<Self> {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(1);
        let scheduler = Arc::new(Self {
            config,
            pool,
            events: Arc::new(EventBus::new(EVENT_CHANNEL_CAPACITY)),
            state: Mutex::new(SchedulerState {
                queue: DelayQueue::new(),
                duplicate_urls: HashSet::new(),
                last_domain_access: HashMap::new(),
                next_job_id: 0,
                all_target_count: 0,
                error_count: 0,
                idle_waiters: Vec::new(),
                wait_for_one_waiters: Vec::new(),
                default_task_fn: None,
            }),
            closed: AtomicBool::new(false),
            dispatch_tx,
            dispatch_loop: Mutex::new(None),
        });

        let handle = Self::spawn_dispatch_loop(Arc::clone(&scheduler), dispatch_rx);
        // `try_lock` is safe here: nothing else can be holding this lock yet.
        if let Ok(mut slot) = scheduler.dispatch_loop.try_lock() {
            *slot = Some(handle);
        }
        scheduler
    }

    fn spawn_dispatch_loop(
        scheduler: Arc<Self>,
        mut dispatch_rx: mpsc::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CHECK_FOR_WORK_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    woken = dispatch_rx.recv() => {
                        if woken.is_none() {
                            break;
                        }
                        tokio::time::sleep(WORK_CALL_INTERVAL_LIMIT).await;
                    }
                }
                if scheduler.closed.load(Ordering::SeqCst) {
                    break;
                }
                while scheduler.dispatch_one().await {}
            }
        })
    }

    /// Coalesced wake-up: a no-op if a dispatch is already pending.
    pub fn request_dispatch(&self) {
        let _ = self.dispatch_tx.try_send(());
    }

    pub async fn set_default_task(&self, task_fn: TaskFn<T, O>) {
        self.state.lock().await.default_task_fn = Some(task_fn);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ClusterEvent<T>> {
        self.events.subscribe()
    }

    pub async fn submit(
        &self,
        data: T,
        task_fn: Option<TaskFn<T, O>>,
        callback: Option<oneshot::Sender<Result<O, ClusterError>>>,
    ) -> ClusterResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClusterError::Closed);
        }

        let mut job = {
            let mut state = self.state.lock().await;
            let id = JobId(state.next_job_id);
            state.next_job_id += 1;
            state.all_target_count += 1;
            Job::new(id, data, task_fn)
        };

        if let Some(url_fn) = self.config.url_fn() {
            job.url = url_fn(&job.data);
            job.domain = job
                .url
                .as_deref()
                .and_then(|u| url::Url::parse(u).ok())
                .and_then(|u| u.host_str().map(str::to_string));
        }
        if let Some(group_fn) = self.config.group_fn() {
            job.group = group_fn(&job.data);
        }
        job.callbacks = callback;

        self.events.publish(ClusterEvent::Queued {
            data: job.data.clone(),
        });

        {
            let mut state = self.state.lock().await;
            state.queue.push(job, None);
        }
        self.request_dispatch();
        Ok(())
    }

    pub async fn idle(&self) {
        let rx = {
            let mut state = self.state.lock().await;
            if state.queue.is_empty() && self.pool.busy_count() == 0 {
                return;
            }
            let (tx, rx) = oneshot::channel();
            state.idle_waiters.push(tx);
            rx
        };
        let _ = rx.await;
    }

    pub async fn wait_for_one(&self) -> ClusterResult<T> {
        let rx = {
            let mut state = self.state.lock().await;
            let (tx, rx) = oneshot::channel();
            state.wait_for_one_waiters.push(tx);
            rx
        };
        rx.await.map_err(|_| ClusterError::Closed)
    }

    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self.dispatch_loop.lock().await.take() {
            handle.abort();
        }

        while self.pool.busy_count() > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.pool.close().await;

        let mut state = self.state.lock().await;
        for waiter in state.idle_waiters.drain(..) {
            let _ = waiter.send(());
        }
        state.wait_for_one_waiters.clear();
    }

    /// One admission attempt. Returns `true` if the caller should
    /// immediately try again (more work may be ready without waiting for
    /// the next external trigger), `false` if further progress depends on
    /// time passing or a worker becoming free.
    async fn dispatch_one(self: &Arc<Self>) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }

        let now = Instant::now();
        let mut state = self.state.lock().await;

        if state.queue.is_empty() {
            if self.pool.busy_count() == 0 {
                for waiter in state.idle_waiters.drain(..) {
                    let _ = waiter.send(());
                }
            }
            return false;
        }

        let Some(peeked) = state.queue.peek(now) else {
            return false;
        };
        let job_id = peeked.id();
        let data = peeked.data.clone();
        let url = peeked.url().map(str::to_string);
        let domain = peeked.domain().map(str::to_string);

        if self.config.skip_duplicate_urls()
            && let Some(url) = &url
            && state.duplicate_urls.contains(url)
        {
            state.queue.remove(job_id);
            debug!(%url, "dropping duplicate url");
            return true;
        }

        if self.config.same_domain_delay() > Duration::ZERO
            && let Some(domain) = &domain
            && let Some(&last) = state.last_domain_access.get(domain)
        {
            let ready_at = last + self.config.same_domain_delay();
            if ready_at > now {
                let job = state
                    .queue
                    .remove(job_id)
                    .expect("peeked job must still be present");
                state.queue.push(job, Some(ready_at));
                return true;
            }
        }

        if !self.pool.can_handle(&data).await {
            if self.pool.can_launch_worker(&data).await {
                drop(state);
                if let Err(e) = self.pool.launch_worker(&data).await {
                    error!(error = %e, "failed to launch worker");
                    return false;
                }
                return true;
            }
            return false;
        }

        let Some(worker) = self.pool.take_worker(&data).await else {
            return true;
        };

        let mut job = state
            .queue
            .remove(job_id)
            .expect("peeked job must still be present");
        if self.config.skip_duplicate_urls()
            && let Some(url) = url
        {
            state.duplicate_urls.insert(url);
        }
        if self.config.same_domain_delay() > Duration::ZERO
            && let Some(domain) = domain
        {
            state.last_domain_access.insert(domain, now);
        }
        if job.task_fn.is_none() {
            job.task_fn = state.default_task_fn.clone();
        }
        job.tries += 1;

        drop(state);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_job(worker, job).await;
        });

        true
    }

    async fn run_job(
        self: Arc<Self>,
        worker: Arc<crate::worker::Worker<T, O>>,
        mut job: Job<T, O>,
    ) {
        if job.task_fn.is_none() {
            let err = ClusterError::Config("no task function set for job".to_string());
            error!(error = %err, "job has no task function");
            self.finish_job(job, WorkResult::Error(err)).await;
            self.request_dispatch();
            return;
        }

        let result = worker.handle(&mut job).await;
        self.finish_job(job, result).await;
        self.request_dispatch();
    }

    async fn finish_job(&self, mut job: Job<T, O>, result: WorkResult<O>) {
        let data_for_waiters = job.data.clone();

        match result {
            WorkResult::Error(err) => {
                if let Some(cb) = job.callbacks.take() {
                    let _ = cb.send(Err(err));
                    self.state.lock().await.error_count += 1;
                } else {
                    let will_retry = job.tries <= self.config.retry_limit();
                    warn!(tries = job.tries, will_retry, error = %err, "job task failed");
                    self.events.publish(ClusterEvent::TaskError {
                        error: err.clone(),
                        data: job.data.clone(),
                        will_retry,
                    });
                    job.errors.push(err);
                    let mut state = self.state.lock().await;
                    if will_retry {
                        let delay = self.config.retry_delay();
                        let delay_until = if delay > Duration::ZERO {
                            Some(Instant::now() + delay)
                        } else {
                            None
                        };
                        state.queue.push(job, delay_until);
                    } else {
                        state.error_count += 1;
                    }
                }
            }
            WorkResult::Success(value) => {
                if let Some(cb) = job.callbacks.take() {
                    let _ = cb.send(Ok(value));
                } else {
                    info!(tries = job.tries, "job completed");
                }
            }
        }

        let mut state = self.state.lock().await;
        for waiter in state.wait_for_one_waiters.drain(..) {
            let _ = waiter.send(data_for_waiters.clone());
        }
    }
}

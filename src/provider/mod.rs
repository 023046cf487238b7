//! Resource provisioning traits.
//!
//! A [`ResourceProvider`] is the one seam between the scheduler and anything
//! that owns a browser. Built-in strategies (`shared_page`, `per_context`,
//! `per_browser`, `per_group`) all implement it against `chromiumoxide`;
//! callers can also bring their own by implementing it directly and plugging
//! it in via `Concurrency::Custom`.

pub mod per_browser;
pub mod per_context;
pub mod per_group;
pub mod shared_page;

use async_trait::async_trait;

use crate::error::ClusterResult;

/// Provisions and tears down [`WorkerInstance`]s. One provider backs an
/// entire cluster; it is consulted once per worker spawned by the pool.
#[async_trait]
pub trait ResourceProvider<T>: Send + Sync {
    /// Called once before the provider is used, e.g. to launch a shared
    /// browser. Strategies with nothing to do up front may no-op.
    async fn init(&self) -> ClusterResult<()>;

    /// Produce a worker-scoped handle. `data_hint` is the payload of the job
    /// that triggered this worker's creation, for strategies (like
    /// `per_group`) that need to know which resource to provision before the
    /// first job arrives.
    async fn worker_instance(
        &self,
        data_hint: Option<&T>,
    ) -> ClusterResult<Box<dyn WorkerInstance<T>>>;

    /// Release everything the provider holds. Called once when the cluster
    /// closes.
    async fn close(&self) -> ClusterResult<()>;
}

/// A worker's long-lived handle onto its resource (a browser, a context, …).
/// One `WorkerInstance` is reused across every job the worker processes.
#[async_trait]
pub trait WorkerInstance<T>: Send + Sync {
    /// Produce a job-scoped handle, typically a fresh page.
    async fn job_instance(&self, data: &T) -> ClusterResult<Box<dyn JobInstance>>;

    /// Attempt to recover after a job failed. Called by the worker before
    /// retrying or picking up the next job. The default implementation is a
    /// no-op; strategies whose underlying browser can crash override it.
    async fn repair(&self) -> ClusterResult<()> {
        Ok(())
    }

    /// Release this worker's resource. Called when the pool scales the
    /// worker down or the cluster closes.
    async fn close(&self) -> ClusterResult<()>;

    /// For strategies that bind a worker to a subset of jobs (e.g.
    /// `per_group`), report whether this worker can handle `data`. `None`
    /// means "no preference" and lets the pool route freely.
    fn can_handle(&self, _data: &T) -> Option<bool> {
        None
    }
}

/// A job-scoped resource, released after a single task attempt completes.
#[async_trait]
pub trait JobInstance: Send + Sync {
    /// The page the task function should drive.
    fn page(&self) -> &chromiumoxide::Page;

    /// Release this job's resource (e.g. close the page).
    async fn close(&self) -> ClusterResult<()>;
}

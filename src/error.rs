//! Error hierarchy for the job cluster.
//!
//! Distinguishes recoverable, per-job failures (`Provider`, `Timeout`, `Task`,
//! `PageError`) from the release-time `Release` diagnostic (never fails a job,
//! see [`crate::worker::Worker::handle`]) and from programmer error (`Config`,
//! `Closed`).

use std::time::Duration;
use thiserror::Error;

/// Errors produced anywhere in the cluster.
#[derive(Debug, Clone, Error)]
pub enum ClusterError {
    /// The resource provider could not produce a `JobInstance` after exhausting
    /// `BROWSER_INSTANCE_TRIES` repair attempts.
    #[error("resource provider error: {0}")]
    Provider(String),

    /// Releasing a `JobInstance` failed. Logged and repaired; never surfaced
    /// as a job's terminal outcome.
    #[error("resource release error: {0}")]
    Release(String),

    /// The user task did not complete within the configured timeout.
    #[error("task timed out after {0:?}")]
    Timeout(Duration),

    /// The user task returned an error.
    #[error("task error: {0}")]
    Task(String),

    /// An asynchronous error was captured by the provider's error observer
    /// while a job was in flight (e.g. an uncaught page-level exception).
    #[error("page error: {0}")]
    PageError(String),

    /// A programmer error: no task function configured, an invalid
    /// configuration value, or similar misuse.
    #[error("configuration error: {0}")]
    Config(String),

    /// `queue`/`execute` was called after `Cluster::close`.
    #[error("cluster is closed")]
    Closed,
}

/// Convenience alias used throughout the crate.
pub type ClusterResult<T> = Result<T, ClusterError>;

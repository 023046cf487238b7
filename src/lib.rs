//! Bounded-concurrency job cluster: schedule async tasks across a pool of
//! browser-backed workers, with lazy worker spawning, per-job timeouts,
//! retries, URL dedup, domain rate-limiting, and pluggable resource
//! provisioning.
//!
//! ```ignore
//! use browser_cluster::{Cluster, ClusterConfigBuilder, job::task_fn};
//!
//! let config = ClusterConfigBuilder::<String>::new()
//!     .max_concurrency(4)
//!     .build()?;
//! let cluster = Cluster::launch(config).await?;
//! cluster.task(task_fn(|ctx| async move {
//!     ctx.page.goto(&ctx.data).await.map_err(|e| browser_cluster::ClusterError::Task(e.to_string()))?;
//!     Ok(())
//! })).await;
//! cluster.queue("https://example.com".to_string()).await?;
//! cluster.idle().await;
//! cluster.close().await?;
//! ```

pub mod browser_profile;
pub mod browser_setup;
pub mod cluster;
pub mod config;
pub mod delay_queue;
pub mod error;
pub mod events;
pub mod job;
pub mod provider;
pub mod scheduler;
pub mod worker;
pub mod worker_pool;

pub use cluster::Cluster;
pub use config::{ClusterConfig, ClusterConfigBuilder, Concurrency, ProviderFactory};
pub use error::{ClusterError, ClusterResult};
pub use events::ClusterEvent;
pub use job::{Job, JobContext, TaskFn, task_fn};
pub use provider::{JobInstance, ResourceProvider, WorkerInstance};

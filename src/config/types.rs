//! Core configuration types for the job cluster.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::provider::ResourceProvider;

/// How worker resources are provisioned across the pool. Each variant trades
/// off isolation between jobs against browser-launch cost; see the
/// `provider/` submodules for the concrete semantics of each strategy.
pub enum Concurrency<T> {
    /// One shared browser; a worker may run more than one job concurrently
    /// by opening a new page per job.
    Page,
    /// One shared browser; each job gets its own incognito browser context.
    Context,
    /// One browser process per worker, exclusive.
    Browser,
    /// One browser process per group key (`group_fn` must be set).
    Group,
    /// Caller-supplied provider, bypassing the built-in strategies entirely.
    Custom(Arc<dyn ProviderFactory<T>>),
}

impl<T> Clone for Concurrency<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Page => Self::Page,
            Self::Context => Self::Context,
            Self::Browser => Self::Browser,
            Self::Group => Self::Group,
            Self::Custom(f) => Self::Custom(Arc::clone(f)),
        }
    }
}

impl<T> fmt::Debug for Concurrency<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Page => write!(f, "Concurrency::Page"),
            Self::Context => write!(f, "Concurrency::Context"),
            Self::Browser => write!(f, "Concurrency::Browser"),
            Self::Group => write!(f, "Concurrency::Group"),
            Self::Custom(_) => write!(f, "Concurrency::Custom(..)"),
        }
    }
}

/// Constructs a [`ResourceProvider`] for `Concurrency::Custom`.
pub trait ProviderFactory<T>: Send + Sync {
    fn create(&self) -> Arc<dyn ResourceProvider<T>>;
}

/// An extractor closure pulling an optional string out of a job's payload —
/// used for both the URL and the group key.
pub type Extractor<T> = Arc<dyn Fn(&T) -> Option<String> + Send + Sync>;

/// Validated cluster configuration. Build with [`super::ClusterConfigBuilder`].
pub struct ClusterConfig<T> {
    pub(crate) concurrency: Concurrency<T>,
    pub(crate) max_concurrency: usize,
    pub(crate) worker_creation_delay: Duration,
    pub(crate) timeout: Duration,
    pub(crate) retry_limit: u32,
    pub(crate) retry_delay: Duration,
    pub(crate) skip_duplicate_urls: bool,
    pub(crate) same_domain_delay: Duration,
    pub(crate) worker_shutdown_timeout: Duration,
    pub(crate) monitor: bool,
    pub(crate) headless: bool,
    pub(crate) url_fn: Option<Extractor<T>>,
    pub(crate) group_fn: Option<Extractor<T>>,
}

impl<T> Clone for ClusterConfig<T> {
    fn clone(&self) -> Self {
        Self {
            concurrency: self.concurrency.clone(),
            max_concurrency: self.max_concurrency,
            worker_creation_delay: self.worker_creation_delay,
            timeout: self.timeout,
            retry_limit: self.retry_limit,
            retry_delay: self.retry_delay,
            skip_duplicate_urls: self.skip_duplicate_urls,
            same_domain_delay: self.same_domain_delay,
            worker_shutdown_timeout: self.worker_shutdown_timeout,
            monitor: self.monitor,
            headless: self.headless,
            url_fn: self.url_fn.clone(),
            group_fn: self.group_fn.clone(),
        }
    }
}

//! Fluent, validating builder for [`ClusterConfig`].

use std::sync::Arc;
use std::time::Duration;

use crate::error::{ClusterError, ClusterResult};

use super::types::{ClusterConfig, Concurrency, Extractor};

/// Builder for [`ClusterConfig`]. Every field has a sensible default, so
/// `ClusterConfigBuilder::default().build()` is valid (a single-worker,
/// incognito-context cluster with no timeout retries).
pub struct ClusterConfigBuilder<T> {
    concurrency: Concurrency<T>,
    max_concurrency: usize,
    worker_creation_delay: Duration,
    timeout: Duration,
    retry_limit: u32,
    retry_delay: Duration,
    skip_duplicate_urls: bool,
    same_domain_delay: Duration,
    worker_shutdown_timeout: Duration,
    monitor: bool,
    headless: bool,
    url_fn: Option<Extractor<T>>,
    group_fn: Option<Extractor<T>>,
}

impl<T> Default for ClusterConfigBuilder<T> {
    fn default() -> Self {
        Self {
            concurrency: Concurrency::Context,
            max_concurrency: 1,
            worker_creation_delay: Duration::ZERO,
            timeout: Duration::from_secs(30),
            retry_limit: 0,
            retry_delay: Duration::ZERO,
            skip_duplicate_urls: false,
            same_domain_delay: Duration::ZERO,
            worker_shutdown_timeout: Duration::from_secs(5),
            monitor: false,
            headless: true,
            url_fn: None,
            group_fn: None,
        }
    }
}

impl<T> ClusterConfigBuilder<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn concurrency(mut self, concurrency: Concurrency<T>) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }

    #[must_use]
    pub fn worker_creation_delay(mut self, delay: Duration) -> Self {
        self.worker_creation_delay = delay;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = limit;
        self
    }

    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    #[must_use]
    pub fn skip_duplicate_urls(mut self, skip: bool) -> Self {
        self.skip_duplicate_urls = skip;
        self
    }

    #[must_use]
    pub fn same_domain_delay(mut self, delay: Duration) -> Self {
        self.same_domain_delay = delay;
        self
    }

    #[must_use]
    pub fn worker_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.worker_shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn monitor(mut self, monitor: bool) -> Self {
        self.monitor = monitor;
        self
    }

    /// Run built-in providers' browsers headless. Ignored by `Concurrency::Custom`.
    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Extractor used to derive `Job::url()` from the job's payload. Required
    /// for `skip_duplicate_urls` and `same_domain_delay` to have any effect.
    #[must_use]
    pub fn url_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> Option<String> + Send + Sync + 'static,
    {
        self.url_fn = Some(Arc::new(f));
        self
    }

    /// Extractor used to derive a job's group key. Required by
    /// `Concurrency::Group`.
    #[must_use]
    pub fn group_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> Option<String> + Send + Sync + 'static,
    {
        self.group_fn = Some(Arc::new(f));
        self
    }

    /// Validate and produce a [`ClusterConfig`].
    ///
    /// # Errors
    /// Returns `ClusterError::Config` for programmer errors: a zero
    /// `max_concurrency`, or `Concurrency::Group` without a `group_fn`.
    pub fn build(self) -> ClusterResult<ClusterConfig<T>> {
        if self.max_concurrency == 0 {
            return Err(ClusterError::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if matches!(self.concurrency, Concurrency::Group) && self.group_fn.is_none() {
            return Err(ClusterError::Config(
                "Concurrency::Group requires a group_fn".to_string(),
            ));
        }

        Ok(ClusterConfig {
            concurrency: self.concurrency,
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
            url_fn: self.url_fn,
            group_fn: self.group_fn,
        })
    }
}

//! Read-only accessors for [`super::ClusterConfig`].

use std::time::Duration;

use super::types::{ClusterConfig, Concurrency, Extractor};

impl<T> ClusterConfig<T> {
    #[must_use]
    pub fn concurrency(&self) -> &Concurrency<T> {
        &self.concurrency
    }

    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    #[must_use]
    pub fn worker_creation_delay(&self) -> Duration {
        self.worker_creation_delay
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    #[must_use]
    pub fn skip_duplicate_urls(&self) -> bool {
        self.skip_duplicate_urls
    }

    #[must_use]
    pub fn same_domain_delay(&self) -> Duration {
        self.same_domain_delay
    }

    #[must_use]
    pub fn worker_shutdown_timeout(&self) -> Duration {
        self.worker_shutdown_timeout
    }

    #[must_use]
    pub fn monitor(&self) -> bool {
        self.monitor
    }

    #[must_use]
    pub fn headless(&self) -> bool {
        self.headless
    }

    #[must_use]
    pub fn url_fn(&self) -> Option<&Extractor<T>> {
        self.url_fn.as_ref()
    }

    #[must_use]
    pub fn group_fn(&self) -> Option<&Extractor<T>> {
        self.group_fn.as_ref()
    }
}

//! In-memory-ish resource provider double for scheduler integration tests.
//!
//! `JobInstance::page()` is pinned to a real `chromiumoxide::Page` by the
//! trait, so this double launches exactly one real (headless) browser and
//! hands every job the same page — no navigation happens, so test task
//! functions never touch the network. What's under test is scheduler
//! behavior (admission filters, retries, completion signals), not browser
//! automation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use browser_cluster::{ClusterError, ClusterResult, JobInstance, ResourceProvider, WorkerInstance};
use chromiumoxide::Page;
use tokio::sync::OnceCell;

static SHARED_PAGE: OnceCell<Page> = OnceCell::const_new();

async fn shared_page() -> ClusterResult<Page> {
    let page = SHARED_PAGE
        .get_or_try_init(|| async {
            let (browser, _handler, _profile_dir) =
                browser_cluster::browser_setup::launch_browser(true, None)
                    .await
                    .map_err(|e| ClusterError::Provider(e.to_string()))?;
            // `_handler` is dropped here; the CDP event-pump task it
            // represents keeps running detached regardless (dropping a
            // `JoinHandle` does not abort the task it points to).
            browser
                .new_page("about:blank")
                .await
                .map_err(|e| ClusterError::Provider(e.to_string()))
        })
        .await?;
    Ok(page.clone())
}

/// Provider double whose `worker_instance`/`job_instance` can be made to
/// fail a fixed number of times before succeeding, to exercise the worker's
/// acquire-retry and repair paths. `repairs` (if set) counts every
/// `WorkerInstance::repair` call so a test can assert on it.
pub struct MockProvider {
    fail_next_n_acquires: usize,
    repairs: Arc<AtomicUsize>,
}

impl MockProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            fail_next_n_acquires: 0,
            repairs: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn failing(n: usize, repairs: Arc<AtomicUsize>) -> Self {
        Self {
            fail_next_n_acquires: n,
            repairs,
        }
    }
}

#[async_trait]
impl<T: Send + Sync> ResourceProvider<T> for MockProvider {
    async fn init(&self) -> ClusterResult<()> {
        shared_page().await.map(|_| ())
    }

    async fn worker_instance(
        &self,
        _data_hint: Option<&T>,
    ) -> ClusterResult<Box<dyn WorkerInstance<T>>> {
        Ok(Box::new(MockWorker {
            fail_next_n_acquires: AtomicUsize::new(self.fail_next_n_acquires),
            repairs: Arc::clone(&self.repairs),
        }))
    }

    async fn close(&self) -> ClusterResult<()> {
        Ok(())
    }
}

struct MockWorker {
    fail_next_n_acquires: AtomicUsize,
    repairs: Arc<AtomicUsize>,
}

#[async_trait]
impl<T: Send + Sync> WorkerInstance<T> for MockWorker {
    async fn job_instance(&self, _data: &T) -> ClusterResult<Box<dyn JobInstance>> {
        let remaining = self.fail_next_n_acquires.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next_n_acquires.fetch_sub(1, Ordering::SeqCst);
            return Err(ClusterError::Provider("injected acquire failure".to_string()));
        }
        let page = shared_page().await?;
        Ok(Box::new(MockJobInstance { page }))
    }

    async fn repair(&self) -> ClusterResult<()> {
        self.repairs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> ClusterResult<()> {
        Ok(())
    }
}

struct MockJobInstance {
    page: Page,
}

#[async_trait]
impl JobInstance for MockJobInstance {
    fn page(&self) -> &Page {
        &self.page
    }

    async fn close(&self) -> ClusterResult<()> {
        Ok(())
    }
}

/// A [`ResourceProvider`] factory usable with `Concurrency::Custom`.
pub struct MockProviderFactory;

impl<T: Send + Sync + 'static> browser_cluster::ProviderFactory<T> for MockProviderFactory {
    fn create(&self) -> Arc<dyn ResourceProvider<T>> {
        Arc::new(MockProvider::new())
    }
}

/// A [`ResourceProvider`] factory whose provider fails the first `n`
/// `job_instance` acquisitions per worker, counting `repair()` calls into
/// `repairs` so a test can assert the worker actually retried.
pub struct FailingProviderFactory {
    pub fail_count: usize,
    pub repairs: Arc<AtomicUsize>,
}

impl FailingProviderFactory {
    #[must_use]
    pub fn new(fail_count: usize) -> Self {
        Self {
            fail_count,
            repairs: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl<T: Send + Sync + 'static> browser_cluster::ProviderFactory<T> for FailingProviderFactory {
    fn create(&self) -> Arc<dyn ResourceProvider<T>> {
        Arc::new(MockProvider::failing(self.fail_count, Arc::clone(&self.repairs)))
    }
}

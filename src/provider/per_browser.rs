//! `Concurrency::Browser`: one dedicated browser process per worker.
//!
//! The most isolated (and most expensive) built-in strategy — every worker
//! gets its own process and profile directory, so a crashed or
//! fingerprinted browser only ever affects the jobs assigned to that one
//! worker.

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::page::Page;
use tokio::task::JoinHandle;
use tracing::info;

use crate::browser_setup::launch_browser;
use crate::error::{ClusterError, ClusterResult};
use crate::provider::{JobInstance, ResourceProvider, WorkerInstance};

pub struct PerBrowserProvider {
    headless: bool,
}

impl PerBrowserProvider {
    #[must_use]
    pub fn new(headless: bool) -> Self {
        Self { headless }
    }
}

#[async_trait]
impl<T: Send + Sync> ResourceProvider<T> for PerBrowserProvider {
    async fn init(&self) -> ClusterResult<()> {
        Ok(())
    }

    async fn worker_instance(
        &self,
        _data_hint: Option<&T>,
    ) -> ClusterResult<Box<dyn WorkerInstance<T>>> {
        let (browser, handler, profile_dir) = launch_browser(self.headless, None)
            .await
            .map_err(|e| ClusterError::Provider(e.to_string()))?;
        info!(profile = %profile_dir.display(), "per-browser worker ready");
        Ok(Box::new(PerBrowserWorker {
            browser,
            _handler: handler,
        }))
    }

    async fn close(&self) -> ClusterResult<()> {
        Ok(())
    }
}

struct PerBrowserWorker {
    browser: Browser,
    _handler: JoinHandle<()>,
}

#[async_trait]
impl<T: Send + Sync> WorkerInstance<T> for PerBrowserWorker {
    async fn job_instance(&self, _data: &T) -> ClusterResult<Box<dyn JobInstance>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| ClusterError::Provider(e.to_string()))?;
        Ok(Box::new(PerBrowserJob { page }))
    }

    async fn close(&self) -> ClusterResult<()> {
        self.browser
            .clone()
            .close()
            .await
            .map_err(|e| ClusterError::Release(e.to_string()))?;
        Ok(())
    }
}

struct PerBrowserJob {
    page: Page,
}

#[async_trait]
impl JobInstance for PerBrowserJob {
    fn page(&self) -> &Page {
        &self.page
    }

    async fn close(&self) -> ClusterResult<()> {
        self.page
            .close()
            .await
            .map_err(|e| ClusterError::Release(e.to_string()))
    }
}

//! `Concurrency::Page`: one browser, one page, reused across every job.
//!
//! The cheapest strategy and the one with no isolation between jobs —
//! intended for `max_concurrency == 1` workloads where jobs don't leak state
//! onto the page (or where that's actually desired, e.g. keeping a login
//! session alive across jobs).

use std::path::PathBuf;

use async_trait::async_trait;
use chromiumoxide::{Browser, Page};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use crate::browser_setup::launch_browser;
use crate::error::{ClusterError, ClusterResult};
use crate::provider::{JobInstance, ResourceProvider, WorkerInstance};

struct Launched {
    browser: Browser,
    _handler: JoinHandle<()>,
    _profile_dir: PathBuf,
}

pub struct SharedPageProvider {
    headless: bool,
    state: Mutex<Option<Launched>>,
}

impl SharedPageProvider {
    #[must_use]
    pub fn new(headless: bool) -> Self {
        Self {
            headless,
            state: Mutex::new(None),
        }
    }

    async fn ensure_launched(&self) -> ClusterResult<Browser> {
        let mut guard = self.state.lock().await;
        if guard.is_none() {
            let (browser, handler, profile_dir) = launch_browser(self.headless, None)
                .await
                .map_err(|e| ClusterError::Provider(e.to_string()))?;
            *guard = Some(Launched {
                browser,
                _handler: handler,
                _profile_dir: profile_dir,
            });
        }
        Ok(guard
            .as_ref()
            .expect("just initialized above")
            .browser
            .clone())
    }
}

#[async_trait]
impl<T: Send + Sync> ResourceProvider<T> for SharedPageProvider {
    async fn init(&self) -> ClusterResult<()> {
        self.ensure_launched().await?;
        Ok(())
    }

    async fn worker_instance(
        &self,
        _data_hint: Option<&T>,
    ) -> ClusterResult<Box<dyn WorkerInstance<T>>> {
        let browser = self.ensure_launched().await?;
        info!("shared page worker ready");
        Ok(Box::new(SharedPageWorker { browser }))
    }

    async fn close(&self) -> ClusterResult<()> {
        let mut guard = self.state.lock().await;
        if let Some(mut launched) = guard.take() {
            launched
                .browser
                .close()
                .await
                .map_err(|e| ClusterError::Provider(e.to_string()))?;
        }
        Ok(())
    }
}

struct SharedPageWorker {
    browser: Browser,
}

#[async_trait]
impl<T: Send + Sync> WorkerInstance<T> for SharedPageWorker {
    async fn job_instance(&self, _data: &T) -> ClusterResult<Box<dyn JobInstance>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| ClusterError::Provider(e.to_string()))?;
        Ok(Box::new(SharedPageJob { page }))
    }

    async fn close(&self) -> ClusterResult<()> {
        // The browser itself is owned by the provider; nothing worker-scoped
        // to release here.
        Ok(())
    }

    /// Always willing to take more work: every job gets its own fresh page
    /// on the one shared browser, so this worker multiplexes freely.
    fn can_handle(&self, _data: &T) -> Option<bool> {
        Some(true)
    }
}

struct SharedPageJob {
    page: Page,
}

#[async_trait]
impl JobInstance for SharedPageJob {
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

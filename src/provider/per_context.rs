//! `Concurrency::Context`: one shared browser, a fresh incognito browser
//! context (and page) per job. The default strategy — cheaper than a whole
//! new browser process, but each job still starts from a clean slate of
//! cookies, storage and cache.

use std::path::PathBuf;

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::target::CreateBrowserContextParams;
use chromiumoxide::page::Page;
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

pub struct PerContextProvider {
    headless: bool,
    state: Mutex<Option<Launched>>,
}

impl PerContextProvider {
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
impl<T: Send + Sync> ResourceProvider<T> for PerContextProvider {
    async fn init(&self) -> ClusterResult<()> {
        self.ensure_launched().await?;
        Ok(())
    }

    async fn worker_instance(
        &self,
        _data_hint: Option<&T>,
    ) -> ClusterResult<Box<dyn WorkerInstance<T>>> {
        let browser = self.ensure_launched().await?;
        info!("per-context worker ready");
        Ok(Box::new(PerContextWorker { browser }))
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

struct PerContextWorker {
    browser: Browser,
}

#[async_trait]
impl<T: Send + Sync> WorkerInstance<T> for PerContextWorker {
    async fn job_instance(&self, _data: &T) -> ClusterResult<Box<dyn JobInstance>> {
        let context_id = self
            .browser
            .create_browser_context(CreateBrowserContextParams::default())
            .await
            .map_err(|e| ClusterError::Provider(e.to_string()))?;
        let page = self
            .browser
            .new_page_in_context("about:blank", context_id)
            .await
            .map_err(|e| ClusterError::Provider(e.to_string()))?;
        Ok(Box::new(PerContextJob {
            browser: self.browser.clone(),
            context_id,
            page,
        }))
    }

    async fn close(&self) -> ClusterResult<()> {
        // The shared browser is owned and closed by the provider.
        Ok(())
    }
}

struct PerContextJob {
    browser: Browser,
    context_id: chromiumoxide_types::BrowserContextId,
    page: Page,
}

#[async_trait]
impl JobInstance for PerContextJob {
    fn page(&self) -> &Page {
        &self.page
    }

    async fn close(&self) -> ClusterResult<()> {
        self.page
            .close()
            .await
            .map_err(|e| ClusterError::Release(e.to_string()))?;
        self.browser
            .dispose_browser_context(self.context_id.clone())
            .await
            .map_err(|e| ClusterError::Release(e.to_string()))?;
        Ok(())
    }
}

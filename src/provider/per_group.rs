//! `Concurrency::Group`: one dedicated browser process per group key.
//!
//! The pool routes jobs to the worker whose [`WorkerInstance::can_handle`]
//! agrees with the job's group, creating a new worker only for groups it
//! hasn't seen before. This provider never tracks the group -> browser
//! mapping itself; each worker simply remembers the one group it was
//! created for.

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::page::Page;
use tokio::task::JoinHandle;
use tracing::info;

use crate::browser_setup::launch_browser;
use crate::config::types::Extractor;
use crate::error::{ClusterError, ClusterResult};
use crate::provider::{JobInstance, ResourceProvider, WorkerInstance};

pub struct PerGroupProvider<T> {
    headless: bool,
    group_fn: Extractor<T>,
}

impl<T> PerGroupProvider<T> {
    #[must_use]
    pub fn new(headless: bool, group_fn: Extractor<T>) -> Self {
        Self { headless, group_fn }
    }
}

#[async_trait]
impl<T: Send + Sync> ResourceProvider<T> for PerGroupProvider<T> {
    async fn init(&self) -> ClusterResult<()> {
        Ok(())
    }

    async fn worker_instance(
        &self,
        data_hint: Option<&T>,
    ) -> ClusterResult<Box<dyn WorkerInstance<T>>> {
        let group = data_hint.and_then(|d| (self.group_fn)(d)).ok_or_else(|| {
            ClusterError::Config("Concurrency::Group could not derive a group for this job".into())
        })?;
        let (browser, handler, profile_dir) = launch_browser(self.headless, None)
            .await
            .map_err(|e| ClusterError::Provider(e.to_string()))?;
        info!(%group, profile = %profile_dir.display(), "per-group worker ready");
        Ok(Box::new(PerGroupWorker {
            browser,
            _handler: handler,
            group,
            group_fn: self.group_fn.clone(),
        }))
    }

    async fn close(&self) -> ClusterResult<()> {
        Ok(())
    }
}

struct PerGroupWorker<T> {
    browser: Browser,
    _handler: JoinHandle<()>,
    group: String,
    group_fn: Extractor<T>,
}

#[async_trait]
impl<T: Send + Sync> WorkerInstance<T> for PerGroupWorker<T> {
    async fn job_instance(&self, _data: &T) -> ClusterResult<Box<dyn JobInstance>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| ClusterError::Provider(e.to_string()))?;
        Ok(Box::new(PerGroupJob { page }))
    }

    async fn close(&self) -> ClusterResult<()> {
        self.browser
            .clone()
            .close()
            .await
            .map_err(|e| ClusterError::Release(e.to_string()))?;
        Ok(())
    }

    fn can_handle(&self, data: &T) -> Option<bool> {
        Some((self.group_fn)(data).as_deref() == Some(self.group.as_str()))
    }
}

struct PerGroupJob {
    page: Page,
}

#[async_trait]
impl JobInstance for PerGroupJob {
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

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use browser_cluster::job::task_fn;
use browser_cluster::{ClusterConfigBuilder, ClusterError, Concurrency};
use common::mock_provider::{FailingProviderFactory, MockProviderFactory};

fn custom_concurrency<T: Send + Sync + 'static>() -> Concurrency<T> {
    Concurrency::Custom(Arc::new(MockProviderFactory))
}

#[tokio::test]
async fn queue_runs_the_default_task() {
    let count = Arc::new(AtomicUsize::new(0));
    let count_for_task = Arc::clone(&count);

    let config = ClusterConfigBuilder::<u32>::new()
        .concurrency(custom_concurrency())
        .max_concurrency(2)
        .build()
        .expect("valid config");
    let cluster = browser_cluster::Cluster::<u32, ()>::launch(config)
        .await
        .expect("cluster launches");

    cluster
        .task(task_fn(move |ctx| {
            let count = Arc::clone(&count_for_task);
            async move {
                assert_eq!(ctx.data, 7);
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }))
        .await;

    cluster.queue(7).await.expect("queue accepts job");
    cluster.idle().await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    cluster.close().await.expect("close succeeds");
}

#[tokio::test]
async fn execute_returns_the_task_result() {
    let config = ClusterConfigBuilder::<u32>::new()
        .concurrency(custom_concurrency())
        .build()
        .expect("valid config");
    let cluster = browser_cluster::Cluster::<u32, u32>::launch(config)
        .await
        .expect("cluster launches");

    cluster
        .task(task_fn(|ctx| async move { Ok(ctx.data * 2) }))
        .await;

    let result = cluster.execute(21).await.expect("task succeeds");
    assert_eq!(result, 42);

    cluster.close().await.expect("close succeeds");
}

#[tokio::test]
async fn execute_never_retries_and_surfaces_the_error() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_for_task = Arc::clone(&attempts);

    let config = ClusterConfigBuilder::<u32>::new()
        .concurrency(custom_concurrency())
        .retry_limit(5)
        .build()
        .expect("valid config");
    let cluster = browser_cluster::Cluster::<u32, ()>::launch(config)
        .await
        .expect("cluster launches");

    cluster
        .task(task_fn(move |_ctx| {
            let attempts = Arc::clone(&attempts_for_task);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ClusterError::Task("boom".to_string()))
            }
        }))
        .await;

    let result = cluster.execute(1).await;
    assert!(matches!(result, Err(ClusterError::Task(_))));
    assert_eq!(
        attempts.load(Ordering::SeqCst),
        1,
        "execute() jobs must never be retried by the cluster"
    );

    cluster.close().await.expect("close succeeds");
}

#[tokio::test]
async fn queued_jobs_retry_up_to_the_configured_limit() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_for_task = Arc::clone(&attempts);

    let config = ClusterConfigBuilder::<u32>::new()
        .concurrency(custom_concurrency())
        .retry_limit(2)
        .build()
        .expect("valid config");
    let cluster = browser_cluster::Cluster::<u32, ()>::launch(config)
        .await
        .expect("cluster launches");

    cluster
        .task(task_fn(move |_ctx| {
            let attempts = Arc::clone(&attempts_for_task);
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(ClusterError::Task("not yet".to_string()))
                } else {
                    Ok(())
                }
            }
        }))
        .await;

    cluster.queue(1).await.expect("queue accepts job");
    cluster.idle().await;

    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    cluster.close().await.expect("close succeeds");
}

#[tokio::test]
async fn skip_duplicate_urls_dispatches_each_url_once() {
    let count = Arc::new(AtomicUsize::new(0));
    let count_for_task = Arc::clone(&count);

    let config = ClusterConfigBuilder::<String>::new()
        .concurrency(custom_concurrency())
        .skip_duplicate_urls(true)
        .url_fn(|data: &String| Some(data.clone()))
        .build()
        .expect("valid config");
    let cluster = browser_cluster::Cluster::<String, ()>::launch(config)
        .await
        .expect("cluster launches");

    cluster
        .task(task_fn(move |_ctx| {
            let count = Arc::clone(&count_for_task);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }))
        .await;

    cluster
        .queue("https://example.com/a".to_string())
        .await
        .expect("queue accepts job");
    cluster
        .queue("https://example.com/a".to_string())
        .await
        .expect("queue accepts job");
    cluster
        .queue("https://example.com/b".to_string())
        .await
        .expect("queue accepts job");

    cluster.idle().await;
    assert_eq!(count.load(Ordering::SeqCst), 2);

    cluster.close().await.expect("close succeeds");
}

#[tokio::test]
async fn wait_for_one_resolves_with_completed_job_data() {
    let config = ClusterConfigBuilder::<u32>::new()
        .concurrency(custom_concurrency())
        .build()
        .expect("valid config");
    let cluster = browser_cluster::Cluster::<u32, ()>::launch(config)
        .await
        .expect("cluster launches");

    cluster
        .task(task_fn(|_ctx| async move { Ok(()) }))
        .await;

    cluster.queue(99).await.expect("queue accepts job");
    let completed = tokio::time::timeout(Duration::from_secs(5), cluster.wait_for_one())
        .await
        .expect("wait_for_one resolves in time")
        .expect("wait_for_one does not error");
    assert_eq!(completed, 99);

    cluster.close().await.expect("close succeeds");
}

#[tokio::test]
async fn close_is_idempotent() {
    let config = ClusterConfigBuilder::<u32>::new()
        .concurrency(custom_concurrency())
        .build()
        .expect("valid config");
    let cluster = browser_cluster::Cluster::<u32, ()>::launch(config)
        .await
        .expect("cluster launches");

    cluster.close().await.expect("first close succeeds");
    cluster.close().await.expect("second close is a no-op");
}

#[tokio::test]
async fn queue_after_close_is_rejected() {
    let config = ClusterConfigBuilder::<u32>::new()
        .concurrency(custom_concurrency())
        .build()
        .expect("valid config");
    let cluster = browser_cluster::Cluster::<u32, ()>::launch(config)
        .await
        .expect("cluster launches");

    cluster.close().await.expect("close succeeds");
    let result = cluster.queue(1).await;
    assert!(matches!(result, Err(ClusterError::Closed)));
}

#[tokio::test]
async fn acquire_failures_are_repaired_and_eventually_succeed() {
    let factory = FailingProviderFactory::new(9);
    let repairs = Arc::clone(&factory.repairs);

    let config = ClusterConfigBuilder::<u32>::new()
        .concurrency(Concurrency::Custom(Arc::new(factory)))
        .build()
        .expect("valid config");
    let cluster = browser_cluster::Cluster::<u32, ()>::launch(config)
        .await
        .expect("cluster launches");

    cluster
        .task(task_fn(|_ctx| async move { Ok(()) }))
        .await;

    let result = cluster.execute(1).await;
    assert!(
        result.is_ok(),
        "the 10th acquire attempt (within BROWSER_INSTANCE_TRIES) should succeed"
    );
    assert!(
        repairs.load(Ordering::SeqCst) >= 9,
        "expected at least 9 repair() calls, got {}",
        repairs.load(Ordering::SeqCst)
    );

    cluster.close().await.expect("close succeeds");
}

#[tokio::test]
async fn same_domain_delay_spaces_out_dispatch_to_one_domain() {
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    let order_for_task = Arc::clone(&order);

    let config = ClusterConfigBuilder::<String>::new()
        .concurrency(custom_concurrency())
        .max_concurrency(4)
        .same_domain_delay(Duration::from_millis(300))
        .url_fn(|data: &String| Some(data.clone()))
        .build()
        .expect("valid config");
    let cluster = browser_cluster::Cluster::<String, ()>::launch(config)
        .await
        .expect("cluster launches");

    let start = tokio::time::Instant::now();
    cluster
        .task(task_fn(move |_ctx| {
            let order = Arc::clone(&order_for_task);
            let elapsed = start.elapsed();
            async move {
                order.lock().expect("lock").push(elapsed);
                Ok(())
            }
        }))
        .await;

    cluster
        .queue("https://example.com/a".to_string())
        .await
        .expect("queue accepts job");
    cluster
        .queue("https://example.com/b".to_string())
        .await
        .expect("queue accepts job");

    cluster.idle().await;

    let timestamps = order.lock().expect("lock").clone();
    assert_eq!(timestamps.len(), 2);
    let gap = if timestamps[0] > timestamps[1] {
        timestamps[0] - timestamps[1]
    } else {
        timestamps[1] - timestamps[0]
    };
    assert!(
        gap >= Duration::from_millis(250),
        "same-domain jobs should be spaced by ~same_domain_delay, got {gap:?}"
    );

    cluster.close().await.expect("close succeeds");
}

use browser_cluster::{ClusterConfigBuilder, ClusterError, Concurrency};

#[test]
fn zero_max_concurrency_is_rejected() {
    let result = ClusterConfigBuilder::<u32>::new().max_concurrency(0).build();
    assert!(matches!(result, Err(ClusterError::Config(_))));
}

#[test]
fn group_concurrency_without_group_fn_is_rejected() {
    let result = ClusterConfigBuilder::<u32>::new()
        .concurrency(Concurrency::Group)
        .build();
    assert!(matches!(result, Err(ClusterError::Config(_))));
}

#[test]
fn group_concurrency_with_group_fn_is_accepted() {
    let result = ClusterConfigBuilder::<u32>::new()
        .concurrency(Concurrency::Group)
        .group_fn(|n: &u32| Some(format!("group-{}", n % 2)))
        .build();
    assert!(result.is_ok());
}

#[test]
fn defaults_match_documented_values() {
    let config = ClusterConfigBuilder::<u32>::new().build().expect("valid");
    assert_eq!(config.max_concurrency(), 1);
    assert_eq!(config.retry_limit(), 0);
    assert!(!config.skip_duplicate_urls());
    assert!(config.headless());
    assert_eq!(config.timeout(), std::time::Duration::from_secs(30));
    assert_eq!(
        config.worker_shutdown_timeout(),
        std::time::Duration::from_secs(5)
    );
}

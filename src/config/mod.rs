//! Cluster configuration: recognized keys, defaults, and a validating builder.

pub mod builder;
pub mod getters;
pub mod types;

pub use builder::ClusterConfigBuilder;
pub use types::{ClusterConfig, Concurrency, ProviderFactory};

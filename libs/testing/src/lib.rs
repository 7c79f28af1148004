//! Acceptance-suite support.
//!
//! Configuration loading plus the helpers the suites are written in terms of:
//! deploying a cluster of a given size, building the local client agent, and
//! the two bounded poll loops (VM state and service resolution).

pub mod config;
pub mod helpers;

pub use self::config::{AwsConfig, BoshConfig, Config, ResolverKind, Timeouts, CONFIG_PATH_ENV};
pub use helpers::{
    consumer_health_check, consumer_ip, deploy_consul_with_instance_count, deploy_manifest,
    director_client, new_consul_agent, service_resolver, teardown, vms_from_manifest,
    wait_for_service, wait_for_service_gone, wait_for_vms,
};

/// Install a test-friendly subscriber once per process.
///
/// Honors `RUST_LOG`, defaulting to `info`. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_test_writer()
        .try_init();
}

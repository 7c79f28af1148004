//! Health check acceptance suite.
//!
//! A service whose health check fails is deregistered and stops resolving;
//! once the check passes again the service resolves to the same addresses.
//! Covered for an operator-defined check script and for the release's
//! default check script.
//!
//! ## Running
//!
//! ```bash
//! # offline, against in-process fakes
//! cargo test -p consats-acceptance --test health_check
//!
//! # against a real director
//! CONSATS_CONFIG=acceptance.json cargo test -p consats-acceptance --test health_check -- --ignored
//! ```

mod common;

use std::time::Duration;

use anyhow::Result;
use common::fake::FakeSuite;
use common::live::LiveSuite;
use common::{deregisters_and_recovers, server_ips, service_name};
use consats_agent::AgentStartStopper;
use consats_manifest::{CONSUMER_JOB, SERVER_JOB};
use consats_poll::Eventually;

#[tokio::test]
#[ignore = "requires a director and a local agent binary"]
async fn live_operator_defined_check_script_deregisters_failing_service() -> Result<()> {
    let (suite, mut manifest) = LiveSuite::setup(1, 2).await?;
    let outcome = common::operator_defined_check(&suite.context(), &mut manifest).await;
    suite.finish(&manifest, outcome).await
}

#[tokio::test]
#[ignore = "requires a director and a local agent binary"]
async fn live_default_check_script_deregisters_failing_service() -> Result<()> {
    let (suite, mut manifest) = LiveSuite::setup(1, 2).await?;
    let outcome = common::default_check(&suite.context(), &mut manifest).await;
    suite.finish(&manifest, outcome).await
}

#[tokio::test]
async fn operator_defined_check_script_deregisters_failing_service() -> Result<()> {
    let (suite, mut manifest) = FakeSuite::setup(1).await?;
    assert!(suite.agent.is_running().await);

    let outcome = common::operator_defined_check(&suite.context(), &mut manifest).await;
    suite.finish(&manifest, outcome).await?;

    let server = manifest.job(SERVER_JOB).unwrap();
    let service = &server.properties.as_ref().unwrap().consul.agent.services["some-service"];
    assert_eq!(service.tags, vec!["some-service-tag"]);
    assert_eq!(
        service.check.as_ref().unwrap().script,
        format!("curl -f {}", suite.health.url())
    );

    assert_eq!(suite.deploy_requests().await, 2);
    assert_eq!(suite.delete_requests(&manifest.name).await, 1);
    assert!(!suite.agent.is_running().await);
    Ok(())
}

#[tokio::test]
async fn default_check_script_deregisters_failing_service() -> Result<()> {
    let (suite, mut manifest) = FakeSuite::setup(1).await?;

    let outcome = common::default_check(&suite.context(), &mut manifest).await;
    suite.finish(&manifest, outcome).await?;

    let consumer = manifest.job(CONSUMER_JOB).unwrap();
    let agent = &consumer.properties.as_ref().unwrap().consul.agent;
    assert_eq!(agent.mode.as_deref(), Some("client"));
    assert!(agent.services["consul-test-consumer"].check.is_none());

    assert_eq!(suite.delete_requests(&manifest.name).await, 1);
    assert_eq!(suite.agent.stop_count(), 1);
    Ok(())
}

#[tokio::test]
async fn failed_scenario_keeps_deployment_and_stops_agent() -> Result<()> {
    let (suite, mut manifest) = FakeSuite::setup(1).await?;
    common::register_operator_service(&mut manifest, suite.health.url())?;
    common::redeploy(&suite.context(), &manifest).await?;

    // The servers never resolve to the consumer's address.
    let mut ctx = suite.context();
    ctx.dns_poll = Eventually::new(Duration::from_millis(500), Duration::from_millis(100));
    let wrong = common::consumer_ips(&manifest)?;
    let outcome =
        deregisters_and_recovers(&ctx, &service_name("some-service-name"), &wrong).await;
    assert!(outcome.is_err());

    let err = suite.finish(&manifest, outcome).await.unwrap_err();
    assert!(format!("{err:#}").contains("resolving the service address"));

    assert_eq!(suite.delete_requests(&manifest.name).await, 0);
    assert!(!suite.agent.is_running().await);
    assert_eq!(server_ips(&manifest)?.len(), 1);
    Ok(())
}

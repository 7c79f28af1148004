//! Multiple hosts, multiple services.
//!
//! Three servers each register two services. Every service name resolves to
//! all server addresses, and a node-tagged name resolves to that node only.

mod common;

use anyhow::Result;
use common::fake::FakeSuite;
use common::live::LiveSuite;
use common::{server_ips, service_name, tagged_service_name};
use consats_discovery::check_service;
use consats_manifest::Vm;

#[tokio::test]
#[ignore = "requires a director and a local agent binary"]
async fn live_discovers_multiple_services_on_multiple_hosts() -> Result<()> {
    let (suite, mut manifest) = LiveSuite::setup(3, 4).await?;
    let outcome = common::multiple_hosts_multiple_services(&suite.context(), &mut manifest).await;
    suite.finish(&manifest, outcome).await
}

#[tokio::test]
async fn discovers_multiple_services_on_multiple_hosts() -> Result<()> {
    let (suite, mut manifest) = FakeSuite::setup(3).await?;
    assert_eq!(
        consats_testing::vms_from_manifest(&manifest),
        vec![Vm::running(); 4]
    );

    let outcome = common::multiple_hosts_multiple_services(&suite.context(), &mut manifest).await;
    suite.finish(&manifest, outcome).await?;

    let ips = server_ips(&manifest)?;
    assert_eq!(ips, vec!["10.244.4.4", "10.244.4.5", "10.244.4.6"]);

    let mut all = check_service(&suite.resolver, &service_name("some-other-service")).await?;
    all.sort();
    assert_eq!(all, ips);

    let node = check_service(
        &suite.resolver,
        &tagged_service_name("consul-z1-2", "some-service"),
    )
    .await?;
    assert_eq!(node, vec!["10.244.4.6"]);

    assert_eq!(suite.delete_requests(&manifest.name).await, 1);
    Ok(())
}

#[tokio::test]
async fn failing_consumer_check_removes_every_service() -> Result<()> {
    let (suite, mut manifest) = FakeSuite::setup(3).await?;

    let outcome = common::multiple_hosts_multiple_services(&suite.context(), &mut manifest).await;
    outcome?;

    suite.health.set_healthy(false).await?;
    let ctx = suite.context();
    for service in ["some-service", "some-other-service"] {
        consats_testing::wait_for_service_gone(ctx.resolver, &service_name(service), ctx.dns_poll)
            .await?;
    }

    suite.finish(&manifest, Ok(())).await
}

use anyhow::Result;
use consats_test_consumer::{serve, Config, HealthState};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Prefer RUST_LOG, fall back to CONSATS_CONSUMER_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(listen_addr = %config.listen_addr, "Starting test consumer");

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    serve(listener, HealthState::new(), async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal");
    })
    .await?;

    info!("Test consumer stopped");
    Ok(())
}

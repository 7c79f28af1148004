//! Test consumer.
//!
//! A tiny HTTP service deployed alongside the client agent. Its health check
//! endpoint backs the `consul-test-consumer` service check, and the suites
//! flip it between passing and failing over HTTP.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode, routing::get, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:6769";

pub const HEALTH_CHECK_PATH: &str = "/health_check";

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("CONSATS_CONSUMER_LISTEN_ADDR")
            .unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string())
            .parse()
            .context("invalid CONSATS_CONSUMER_LISTEN_ADDR")?;

        let log_level =
            std::env::var("CONSATS_CONSUMER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            listen_addr,
            log_level,
        })
    }
}

/// Shared health flag. Starts healthy.
#[derive(Debug, Clone)]
pub struct HealthState {
    healthy: Arc<AtomicBool>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            healthy: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

/// Router serving the health check endpoint.
pub fn create_router(state: HealthState) -> Router {
    Router::new()
        .route(HEALTH_CHECK_PATH, get(health_check).post(set_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<HealthState>) -> StatusCode {
    if state.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

async fn set_health(State(state): State<HealthState>, body: String) -> (StatusCode, String) {
    let healthy = match body.trim() {
        "true" => true,
        "false" => false,
        other => {
            return (
                StatusCode::BAD_REQUEST,
                format!("expected \"true\" or \"false\", got {other:?}"),
            )
        }
    };

    state.set_healthy(healthy);
    info!(healthy, "Health check state changed");
    (StatusCode::OK, String::new())
}

/// Serve on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: HealthState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(addr = %addr, "Serving health check");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("health check server failed")?;

    Ok(())
}

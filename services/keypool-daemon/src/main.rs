//! Keypool daemon
//!
//! Single-binary service that:
//! 1. Loads the persisted credential/endpoint pool
//! 2. Seeds credentials and endpoints from configuration
//! 3. Refreshes quota and latency in the background, rotating credentials
//!    when the active one runs out
//! 4. Serves health, metrics and the admin API

mod admin;
mod config;
mod metrics;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keypool::{Collaborators, JsonFileStore, PoolCoordinator, TracingNotifier};
use metrics_exporter_prometheus::PrometheusHandle;
use probe::{HttpLatencyProbe, HttpQuotaProbe};

use crate::admin::{AdminState, build_admin_router};
use crate::config::{Config, PoolConfig};

/// Time allowed for in-flight admin requests after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared state for the health and metrics handlers
#[derive(Clone)]
struct AppState {
    coordinator: Arc<PoolCoordinator>,
    prometheus: PrometheusHandle,
    default_endpoint: Arc<str>,
    started_at: Instant,
}

/// Build the axum router: health, metrics and the admin API behind one
/// concurrency limit.
fn build_router(state: AppState, max_connections: usize) -> Router {
    let admin = build_admin_router(AdminState::new(
        state.coordinator.clone(),
        &state.default_endpoint,
    ));
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .merge(admin)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
}

/// Open the store and build the coordinator around the HTTP probes.
async fn build_coordinator(config: &Config, client: reqwest::Client) -> Result<PoolCoordinator> {
    let probe_timeout = config.pool.probe_timeout();
    let store = JsonFileStore::new(&config.pool.store_path);
    let collaborators = Collaborators {
        quota_probe: Arc::new(HttpQuotaProbe::new(
            client.clone(),
            config.quota.usage_url.clone(),
            probe_timeout,
        )),
        latency_probe: Arc::new(HttpLatencyProbe::new(client)),
        store: Arc::new(store),
        notifier: Arc::new(TracingNotifier),
    };
    PoolCoordinator::load(collaborators, probe_timeout)
        .await
        .with_context(|| {
            format!(
                "failed to load pool from {}",
                config.pool.store_path.display()
            )
        })
}

/// Apply configured strategies, endpoints and keys on top of the persisted
/// pool. Entries already present are skipped.
async fn seed_pool(coordinator: &PoolCoordinator, pool: &PoolConfig) {
    if let Some(strategy) = pool.strategy {
        coordinator.set_strategy(strategy).await;
    }

    for url in &pool.endpoints {
        match coordinator.add_endpoint(url).await {
            Ok(_) => {}
            Err(keypool::Error::DuplicateEndpoint(_)) => debug!(url, "endpoint already present"),
            Err(e) => warn!(url, error = %e, "failed to add configured endpoint"),
        }
    }
    if let Some(strategy) = pool.endpoint_strategy {
        coordinator.set_endpoint_strategy(strategy).await;
    }

    let mut added = 0usize;
    for key in &pool.keys {
        match coordinator.add_credential(key.expose().clone(), None).await {
            Ok(_) => added += 1,
            Err(keypool::Error::DuplicateCredential) => {}
            Err(e) => warn!(key = %key.masked(), error = %e, "failed to add configured key"),
        }
    }
    if !pool.keys.is_empty() {
        info!(
            configured = pool.keys.len(),
            added, "configured keys applied"
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting keypool-daemon");

    // Install before the first probe records anything
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.admin.listen_addr,
        store_path = %config.pool.store_path.display(),
        usage_url = %config.quota.usage_url,
        refresh_interval_secs = config.pool.refresh_interval_secs,
        keys = config.pool.keys.len(),
        endpoints = config.pool.endpoints.len(),
        "configuration loaded"
    );

    let client = reqwest::Client::new();
    let coordinator = Arc::new(build_coordinator(&config, client).await?);
    seed_pool(&coordinator, &config.pool).await;

    let refresh =
        keypool::spawn_refresh_task(coordinator.clone(), config.pool.refresh_interval());

    let app_state = AppState {
        coordinator,
        prometheus: prometheus_handle,
        default_endpoint: Arc::from(config.pool.default_endpoint.as_str()),
        started_at: Instant::now(),
    };
    let app = build_router(app_state, config.admin.max_connections);

    let listen_addr = config.admin.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts at signal receipt, not at server start
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;

    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    // Lets an in-flight probe finish so its result is persisted
    refresh.stop().await;

    info!("shutdown complete");
    Ok(())
}

/// Pool health. 200 while a credential can be served (healthy or
/// degraded), 503 otherwise.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let summary = state.coordinator.status().await;
    let endpoint = state
        .coordinator
        .current_endpoint(&state.default_endpoint)
        .await;

    let status = summary["status"].as_str().unwrap_or("unhealthy");
    let status_code = match status {
        "healthy" | "degraded" => axum::http::StatusCode::OK,
        _ => axum::http::StatusCode::SERVICE_UNAVAILABLE,
    };

    let body = serde_json::json!({
        "status": status,
        "state": summary["state"],
        "strategy": summary["strategy"],
        "active_credential": summary["active_credential"],
        "credentials_total": summary["credentials_total"],
        "credentials_available": summary["credentials_available"],
        "credentials_exhausted": summary["credentials_exhausted"],
        "credentials_invalid": summary["credentials_invalid"],
        "endpoint": endpoint,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    });

    (
        status_code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint. Pool gauges are refreshed on each scrape.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    metrics::record_pool_status(&state.coordinator.status().await);
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

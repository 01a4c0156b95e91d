//! Payments API server binary
//!
//! Serves the HTTP API and runs the expiry sweeper in the background.
//!
//! # Usage
//!
//! ```bash
//! API_DATABASE__URL=postgres://... \
//! API_GATEWAY__ENABLED=true \
//! API_GATEWAY__KEY_ID=rzp_test_... \
//! API_GATEWAY__KEY_SECRET=... \
//! cargo run --bin payments-api
//! ```
//!
//! See [`interface_api::config`] for every setting.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use core_kernel::TracingMetrics;
use domain_payments::gateway::http::HttpGateway;
use domain_payments::{LogNotifier, PaymentPorts, PaymentService};
use infra_db::{create_pool, PostgresPaymentAdapter};
use interface_api::config::{ApiConfig, LogFormat};
use interface_api::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ApiConfig::load().context("failed to load configuration")?;

    init_tracing(&config.log_level, config.log_format);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        gateway_test_mode = config.gateway.test_mode,
        "Starting payments API server"
    );
    if config.uses_default_jwt_secret() {
        tracing::warn!("API_JWT_SECRET is not set; using the development placeholder");
    }

    let ApiConfig {
        host,
        port,
        jwt_secret,
        database,
        gateway,
        sweeper,
        ..
    } = config;

    let pool = create_pool(database).await.context("failed to connect to database")?;
    let adapter = Arc::new(PostgresPaymentAdapter::new(pool));

    let http_gateway = HttpGateway::from_config(&gateway).context("payment gateway is not usable")?;
    let default_currency = gateway.currency;

    let service = Arc::new(PaymentService::new(PaymentPorts {
        ledger: adapter.clone(),
        store: adapter.clone(),
        gateway: Arc::new(http_gateway),
        notifier: Arc::new(LogNotifier),
        metrics: Arc::new(TracingMetrics),
        config: Arc::new(gateway),
    }));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = service.sweeper(sweeper).spawn(shutdown_rx);

    let state = AppState::new(service, jwt_secret, default_currency).with_health_check(adapter);
    let app = create_router(state);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // The receiver may already be gone if the sweeper was disabled
    let _ = shutdown_tx.send(true);
    if let Err(err) = sweeper.await {
        tracing::warn!(error = %err, "expiry sweeper task ended abnormally");
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Installs the global subscriber; `RUST_LOG` takes precedence over `log_level`
fn init_tracing(log_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init(),
    }
}

/// Waits for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod rate_limit;

use crate::config::AppConfig;
use crate::error::{RateLimiterError, Result};
use crate::handlers::{home_handler, test_handler, HandlerState};
use crate::metrics::{metrics_handler, MetricsService};
use crate::rate_limit::{rate_limit_middleware, AdmissionFilter, RateLimiter};
use axum::{middleware, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the HTTP application with every route behind the admission filter
pub fn build_app(
    limiter: Arc<RateLimiter>,
    credential_header: &str,
    metrics: Option<MetricsService>,
) -> Router {
    let mut app = Router::new()
        .route("/", get(home_handler))
        .route("/test", get(test_handler))
        .with_state(HandlerState::new(credential_header));

    if let Some(service) = metrics {
        app = app.merge(
            Router::new()
                .route("/metrics", get(metrics_handler))
                .with_state(service),
        );
    }

    let filter = AdmissionFilter::new(limiter, credential_header);

    app.layer(middleware::from_fn_with_state(filter, rate_limit_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Initialize and run the server until a shutdown signal arrives
pub async fn init_server(config: AppConfig) -> Result<()> {
    // Validate configuration
    config.validate()?;

    info!("Starting rate limiter");
    info!(
        "Server listening on {}:{}",
        config.server.host, config.server.port
    );

    let store = rate_limit::connect(&config.storage).await?;
    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit.limiter_config(),
        store,
    ));
    info!(
        ip_limit = config.rate_limit.ip_limit,
        ip_block_secs = config.rate_limit.ip_block_secs,
        token_limit = config.rate_limit.token_limit,
        token_block_secs = config.rate_limit.token_block_secs,
        "Rate limiter initialized"
    );

    let metrics = if config.metrics.enabled {
        Some(MetricsService::new()?)
    } else {
        None
    };

    let app = build_app(
        Arc::clone(&limiter),
        &config.rate_limit.credential_header,
        metrics,
    );

    // Bind and serve
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(RateLimiterError::Io)?;

    info!("Ready to accept connections");

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| RateLimiterError::Internal(format!("Server error: {}", e)));

    limiter.close().await?;
    info!("Rate limiter stopped");

    served
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

/// Initialize tracing/logging
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ratelimiter=debug,tower_http=debug".into()),
        )
        .with_target(false)
        .compact()
        .init();
}

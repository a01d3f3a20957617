//! Relay — two-endpoint WebSocket relay server.
//!
//! Bootstrap sequence: parse args/env, build the shared context, log a
//! startup banner, serve until a shutdown signal arrives, then drain.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use relay::{http, AppConfig, AppContext};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const SHUTDOWN_WATCHDOG_SEC: u64 = 10;

#[tokio::main]
async fn main() {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("════════════════════════════════════════════════════════════");
    info!("  relay starting — port={} max_channels={}", config.port, config.max_channels);
    info!(
        "  rate_limit_max={} window_sec={} idle_timeout_sec={}",
        config.rate_limit_max, config.rate_limit_window_sec, config.idle_timeout_sec
    );
    info!("════════════════════════════════════════════════════════════");

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let ctx = AppContext::new(config);

    let router = http::router(ctx.clone());

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {addr}: {err}");
            std::process::exit(1);
        }
    };

    info!("listening on {addr}");

    let serve_ctx = ctx.clone();
    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    if let Err(err) = server.await {
        error!("server error: {err}");
    }

    shutdown(serve_ctx).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, draining connections");
}

/// Drains the server: close every live socket with 1001/"Server shutting
/// down", stop the rate limiter's sweep task, then bound the whole thing
/// with a watchdog that force-exits if it hangs.
async fn shutdown(ctx: Arc<AppContext>) {
    let drain = async {
        let outcome = ctx.registry.close_all(1001, "Server shutting down").await;
        info!(closed = outcome.closed_count, errors = outcome.errors.len(), "closed all connections");
        for err in &outcome.errors {
            warn!("close error: {err}");
        }
        ctx.rate_limiter.stop().await;
    };

    if tokio::time::timeout(Duration::from_secs(SHUTDOWN_WATCHDOG_SEC), drain)
        .await
        .is_err()
    {
        error!("shutdown watchdog fired after {SHUTDOWN_WATCHDOG_SEC}s, forcing exit");
        std::process::exit(1);
    }

    info!("shutdown complete");
}

use anyhow::Result;
use axum::serve;
use conduit_core::{
    analytics::{Analytics, AnalyticsReporter},
    config::AppConfig,
    dispatch::{default_http_client, Dispatcher},
    health::HealthTracker,
    queue::SerialQueue,
    registry::NodeRegistry,
};
use parking_lot::Mutex;
use server::router::{build_router, AppState};
use std::{net::SocketAddr, sync::Arc};
use tokio::{signal, sync::broadcast};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the logging system based on the configuration.
///
/// `RUST_LOG` overrides the configured level when set.
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,conduit_core={0},server={0}", config.logging.level))
    });

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format.as_str() == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        // "pretty" and any other format default to pretty logging
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false);
        registry.with(fmt_layer).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config =
        AppConfig::load().map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;

    init_logging(&config);
    info!("Starting Conduit RPC proxy");

    let registry =
        Arc::new(NodeRegistry::new(&config.nodes.private_url, &config.nodes.public_urls));
    info!(
        node_count = registry.len(),
        public_count = config.nodes.public_urls.len(),
        bind_port = config.server.bind_port,
        "Configuration loaded"
    );

    let health = Arc::new(Mutex::new(HealthTracker::new(registry.len())));
    let analytics = Arc::new(Analytics::new(registry.len()));

    let client = default_http_client()
        .map_err(|e| anyhow::anyhow!("HTTP client initialization failed: {e}"))?;
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&registry),
        Arc::clone(&health),
        Arc::clone(&analytics),
        client,
        config.attempt_timeout(),
    ));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let (queue, queue_handle) = SerialQueue::start(dispatcher, shutdown_tx.subscribe());

    let reporter_handle = if config.analytics.enabled {
        let reporter = AnalyticsReporter::new(
            Arc::clone(&analytics),
            Arc::clone(&health),
            Arc::clone(&registry),
            config.report_interval(),
        );
        Some(reporter.start_with_shutdown(shutdown_tx.subscribe()))
    } else {
        None
    };

    let app = build_router(AppState { queue, analytics });

    let addr: SocketAddr = format!("{}:{}", config.server.bind_address, config.server.bind_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address: {e}"))?;
    info!(address = %addr, "RPC proxy listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    if let Err(e) = serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
        error!(error = %e, "Server error occurred");
    }

    // Let the queue worker finish in-flight entries before exiting.
    let _ = shutdown_tx.send(());
    let _ = queue_handle.await;
    if let Some(handle) = reporter_handle {
        let _ = handle.await;
    }
    info!("Server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

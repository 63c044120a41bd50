//! Komodo Exporter - Prometheus exporter for Komodo-managed servers
//!
//! This binary polls the Komodo fleet-management API for per-server
//! resource stats and serves them on `/metrics`.

use anyhow::{Context, Result};
use exporter_lib::{
    api::{self, AppState, ScrapeTrigger},
    collector::{ScrapeLoop, ScrapeLoopConfig},
    ClientOptions, CollectorBuilder, KomodoClient, ScrapeContext, Scraper, StructuredLogger,
};
use prometheus::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

use crate::config::{ExporterConfig, ScrapeMode};

const EXPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Time allowed for in-flight requests after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting komodo-exporter");

    // Load configuration
    let config = ExporterConfig::load().context("Failed to load configuration")?;
    info!(
        host = %config.host,
        scrape_mode = config.scrape_mode.as_str(),
        max_concurrent = config.max_concurrent,
        only_ok = config.only_ok,
        "Exporter configured"
    );

    let client = KomodoClient::new(
        &config.host,
        config.api_key.as_str(),
        config.api_secret.as_str(),
        ClientOptions {
            timeout: config.request_timeout(),
            insecure_skip_verify: config.insecure_skip_verify,
        },
    )
    .context("Failed to create Komodo client")?;

    let collector = CollectorBuilder::new()
        .api(Arc::new(client))
        .max_concurrent(config.max_concurrent())
        .only_ok(config.only_ok)
        .build()?;

    // Only what is registered here is exported
    let registry = Registry::new();
    let logger = StructuredLogger::new(&config.host);
    let scraper = Arc::new(
        Scraper::new(collector, registry, logger.clone()).context("Failed to register metrics")?,
    );

    let (ctx, cancel) = ScrapeContext::cancellable();
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let trigger = match config.scrape_mode {
        ScrapeMode::OnDemand => ScrapeTrigger::OnRequest {
            timeout: config.scrape_timeout(),
        },
        ScrapeMode::Interval => {
            let scrape_loop = ScrapeLoop::new(
                scraper.clone(),
                ScrapeLoopConfig {
                    interval: config.scrape_interval(),
                    cycle_timeout: config.scrape_timeout(),
                },
                ctx.clone(),
            );
            tokio::spawn(scrape_loop.run(shutdown_tx.subscribe()));
            ScrapeTrigger::Interval
        }
    };

    let app_state = Arc::new(AppState::new(scraper, trigger, ctx));

    let addr = config.bind_addr();
    logger.log_startup(EXPORTER_VERSION, &addr, config.scrape_mode.as_str());

    let mut server_shutdown = shutdown_tx.subscribe();
    let mut server = tokio::spawn(async move {
        api::serve(&addr, app_state, async move {
            let _ = server_shutdown.recv().await;
        })
        .await
    });

    tokio::select! {
        reason = shutdown_signal() => {
            logger.log_shutdown(reason);
        }
        result = &mut server => {
            result
                .context("HTTP server task panicked")?
                .context("HTTP server failed")?;
            return Ok(());
        }
    }

    cancel.cancel();
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!(error = %e, "HTTP server shutdown error"),
        Ok(Err(e)) => warn!(error = %e, "HTTP server task failed"),
        Err(_) => warn!("HTTP server did not shut down in time"),
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT received",
        _ = terminate => "SIGTERM received",
    }
}

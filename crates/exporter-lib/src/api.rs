//! HTTP API for health checks and Prometheus metrics

use crate::context::ScrapeContext;
use crate::scraper::Scraper;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// When `/metrics` runs a scrape cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeTrigger {
    /// Every `/metrics` request runs one cycle before rendering
    OnRequest { timeout: Duration },
    /// Cycles run on a timer; `/metrics` only renders
    Interval,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub scraper: Arc<Scraper>,
    pub trigger: ScrapeTrigger,
    /// Parent context for request-triggered cycles; cancelled on shutdown
    pub ctx: ScrapeContext,
}

impl AppState {
    pub fn new(scraper: Arc<Scraper>, trigger: ScrapeTrigger, ctx: ScrapeContext) -> Self {
        Self {
            scraper,
            trigger,
            ctx,
        }
    }
}

/// Liveness check with a static body
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let rendered = match state.trigger {
        ScrapeTrigger::OnRequest { timeout } => {
            let ctx = state.ctx.with_timeout(timeout);
            state.scraper.scrape_and_render(&ctx).await
        }
        ScrapeTrigger::Interval => state.scraper.render().await,
    };

    match rendered {
        Ok(buffer) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            buffer,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server and run until `shutdown` resolves
pub async fn serve<F>(addr: &str, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Serving metrics");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

//! Observability infrastructure for the exporter
//!
//! Provides:
//! - Scrape health metrics (cycle duration, fatal errors, per-server errors, last success)
//! - Structured JSON logging with tracing

use crate::models::{FetchFailure, ScrapeOutcome};
use prometheus::{Gauge, Histogram, HistogramOpts, IntCounter, Registry};
use std::time::Duration;
use tracing::{info, warn};

/// Cumulative scrape-health counters
#[derive(Clone)]
pub struct ScrapeMetrics {
    duration_seconds: Histogram,
    errors_total: IntCounter,
    server_errors_total: IntCounter,
    last_success_timestamp: Gauge,
}

impl ScrapeMetrics {
    /// Register the scrape-health metrics on `registry`
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "komodo_scrape_duration_seconds",
                "Duration of the last Komodo scrape in seconds.",
            )
            .buckets(prometheus::DEFAULT_BUCKETS.to_vec()),
        )?;
        let errors_total = IntCounter::new(
            "komodo_scrape_errors_total",
            "Total number of Komodo scrape errors.",
        )?;
        let server_errors_total = IntCounter::new(
            "komodo_server_fetch_errors_total",
            "Total number of per-server stats fetches that failed.",
        )?;
        let last_success_timestamp = Gauge::new(
            "komodo_scrape_last_success_timestamp",
            "Unix timestamp of the last successful Komodo scrape.",
        )?;

        registry.register(Box::new(duration_seconds.clone()))?;
        registry.register(Box::new(errors_total.clone()))?;
        registry.register(Box::new(server_errors_total.clone()))?;
        registry.register(Box::new(last_success_timestamp.clone()))?;

        Ok(Self {
            duration_seconds,
            errors_total,
            server_errors_total,
            last_success_timestamp,
        })
    }

    /// Record the outcome of one scrape cycle
    pub fn observe_outcome(&self, outcome: &ScrapeOutcome) {
        self.duration_seconds.observe(outcome.duration.as_secs_f64());
        self.server_errors_total.inc_by(outcome.error_count as u64);

        if !outcome.succeeded {
            self.errors_total.inc();
            return;
        }

        self.last_success_timestamp
            .set(chrono::Utc::now().timestamp() as f64);
    }

    pub fn errors_total(&self) -> u64 {
        self.errors_total.get()
    }

    pub fn server_errors_total(&self) -> u64 {
        self.server_errors_total.get()
    }

    pub fn last_success_timestamp(&self) -> f64 {
        self.last_success_timestamp.get()
    }

    pub fn observed_cycles(&self) -> u64 {
        self.duration_seconds.get_sample_count()
    }
}

/// Structured logger for exporter events
///
/// Provides consistent JSON-formatted logging for scrape cycles
/// and process lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    /// `instance` identifies the remote API this exporter polls
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log exporter startup
    pub fn log_startup(&self, version: &str, listen_addr: &str, mode: &str) {
        info!(
            event = "exporter_started",
            instance = %self.instance,
            exporter_version = %version,
            listen_addr = %listen_addr,
            scrape_mode = %mode,
            "Komodo exporter started"
        );
    }

    /// Log exporter shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "exporter_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Komodo exporter shutting down"
        );
    }

    /// Log a completed cycle, including how many servers were absorbed as failures
    pub fn log_scrape_complete(&self, servers: usize, errors: usize, elapsed: Duration) {
        if errors > 0 {
            warn!(
                event = "scrape_complete",
                instance = %self.instance,
                servers = servers,
                errors = errors,
                elapsed_ms = elapsed.as_millis() as u64,
                "Scrape completed with per-server failures"
            );
        } else {
            info!(
                event = "scrape_complete",
                instance = %self.instance,
                servers = servers,
                elapsed_ms = elapsed.as_millis() as u64,
                "Scrape completed"
            );
        }
    }

    /// Log one server whose stats could not be fetched; the cycle carries on
    pub fn log_server_fetch_failed(&self, failure: &FetchFailure) {
        warn!(
            event = "server_fetch_failed",
            instance = %self.instance,
            server_id = %failure.server_id,
            server_name = %failure.server_name,
            error = %failure.error,
            "Failed to fetch server stats"
        );
    }

    /// Log a cycle that failed before any server could be polled
    pub fn log_scrape_failed(&self, error: &dyn std::error::Error, elapsed: Duration) {
        warn!(
            event = "scrape_failed",
            instance = %self.instance,
            error = %error,
            elapsed_ms = elapsed.as_millis() as u64,
            "Collect error, publishing empty snapshot"
        );
    }
}

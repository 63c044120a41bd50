//! Interval scrape loop
//!
//! Runs one scrape cycle per tick when the exporter is configured to poll on
//! a timer. `/metrics` then only renders the latest snapshot.

use crate::context::ScrapeContext;
use crate::scraper::Scraper;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Configuration for the interval scrape loop
#[derive(Debug, Clone)]
pub struct ScrapeLoopConfig {
    /// Time between cycle starts (default: 5 seconds)
    pub interval: Duration,
    /// Deadline for a single cycle (default: 20 seconds)
    pub cycle_timeout: Duration,
}

impl Default for ScrapeLoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            cycle_timeout: Duration::from_secs(20),
        }
    }
}

/// Periodically runs scrape cycles until shut down
pub struct ScrapeLoop {
    scraper: Arc<Scraper>,
    config: ScrapeLoopConfig,
    ctx: ScrapeContext,
}

impl ScrapeLoop {
    /// `ctx` is the parent of every cycle's context; cancelling it aborts the running cycle
    pub fn new(scraper: Arc<Scraper>, config: ScrapeLoopConfig, ctx: ScrapeContext) -> Self {
        Self {
            scraper,
            config,
            ctx,
        }
    }

    /// Run until a shutdown signal arrives
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs_f64(),
            timeout_secs = self.config.cycle_timeout.as_secs_f64(),
            "Starting interval scrape loop"
        );

        let mut ticker = interval(self.config.interval);
        // No catch-up burst after a slow cycle
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let ctx = self.ctx.with_timeout(self.config.cycle_timeout);
                    // Failures are logged and counted by the scraper
                    let _ = self.scraper.run(&ctx).await;

                    cycles += 1;
                    debug!(cycles = cycles, "Interval scrape cycle finished");
                }
                _ = shutdown.recv() => {
                    info!(cycles = cycles, "Shutting down interval scrape loop");
                    break;
                }
            }
        }
    }
}

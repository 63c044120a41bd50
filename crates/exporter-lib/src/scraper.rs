//! Scrape coordination
//!
//! [`Scraper`] ties the engine to the publisher. The publisher sits behind an
//! async mutex, so only one cycle runs at a time and rendering never observes
//! a half-applied snapshot.

use crate::collector::{CollectError, Collector};
use crate::context::ScrapeContext;
use crate::models::ScrapeOutcome;
use crate::observability::{ScrapeMetrics, StructuredLogger};
use crate::publisher::SnapshotPublisher;
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Single-flight scrape coordinator
pub struct Scraper {
    collector: Collector,
    publisher: Mutex<SnapshotPublisher>,
    metrics: ScrapeMetrics,
    registry: Registry,
    logger: StructuredLogger,
}

impl Scraper {
    /// Register the exporter's metrics on `registry` and wire them to `collector`
    pub fn new(
        collector: Collector,
        registry: Registry,
        logger: StructuredLogger,
    ) -> prometheus::Result<Self> {
        let publisher = SnapshotPublisher::new(&registry)?;
        let metrics = ScrapeMetrics::new(&registry)?;

        Ok(Self {
            collector,
            publisher: Mutex::new(publisher),
            metrics,
            registry,
            logger,
        })
    }

    pub fn metrics(&self) -> &ScrapeMetrics {
        &self.metrics
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run one full cycle: collect, replace the snapshot, record the outcome.
    ///
    /// Only a failed listing is returned as an error; the snapshot is cleared
    /// in that case.
    pub async fn run(&self, ctx: &ScrapeContext) -> Result<ScrapeOutcome, CollectError> {
        let mut publisher = self.publisher.lock().await;
        self.run_locked(&mut publisher, ctx).await
    }

    /// Run one cycle and render the registry in the text exposition format.
    ///
    /// A failed cycle is logged and counted; whatever is registered is still rendered.
    pub async fn scrape_and_render(&self, ctx: &ScrapeContext) -> prometheus::Result<Vec<u8>> {
        let mut publisher = self.publisher.lock().await;
        // Failure is already logged and counted
        let _ = self.run_locked(&mut publisher, ctx).await;
        self.encode()
    }

    /// Render the current snapshot without running a cycle
    pub async fn render(&self) -> prometheus::Result<Vec<u8>> {
        let _publisher = self.publisher.lock().await;
        self.encode()
    }

    async fn run_locked(
        &self,
        publisher: &mut SnapshotPublisher,
        ctx: &ScrapeContext,
    ) -> Result<ScrapeOutcome, CollectError> {
        let start = Instant::now();
        let result = self.collector.collect(ctx).await;
        let elapsed = start.elapsed();

        publisher.reset();

        match result {
            Ok(collection) => {
                for failure in &collection.failures {
                    self.logger.log_server_fetch_failed(failure);
                }
                publisher.update(&collection.records);

                let outcome = ScrapeOutcome::success(elapsed, collection.error_count());
                self.metrics.observe_outcome(&outcome);
                self.logger.log_scrape_complete(
                    collection.records.len(),
                    outcome.error_count,
                    elapsed,
                );
                Ok(outcome)
            }
            Err(e) => {
                publisher.update(&[]);

                self.metrics.observe_outcome(&ScrapeOutcome::failure(elapsed));
                self.logger.log_scrape_failed(&e, elapsed);
                Err(e)
            }
        }
    }

    fn encode(&self) -> prometheus::Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

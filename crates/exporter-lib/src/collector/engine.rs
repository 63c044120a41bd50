//! Collection engine
//!
//! One call to [`Collector::collect`] lists the fleet, fans out bounded
//! concurrent stat fetches and folds the results into a best-effort
//! [`Collection`]. Only a failed listing fails the call.

use crate::client::{ClientError, FleetApi};
use crate::context::ScrapeContext;
use crate::models::{FetchFailure, ServerDescriptor, StatRecord};
use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Concurrency bound used when none (or a non-positive one) is configured
pub const DEFAULT_MAX_CONCURRENT: usize = 8;

/// Fatal outcome of a collection cycle
#[derive(Debug, Error)]
pub enum CollectError {
    /// Listing servers failed, so there was nothing to iterate
    #[error("list servers: {0}")]
    ListServers(#[source] ClientError),
}

/// Configuration for the collection engine
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Maximum number of stat requests in flight at once (default: 8)
    pub max_concurrent: usize,
    /// Skip servers whose state is not `Ok`
    pub only_ok: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            only_ok: false,
        }
    }
}

impl CollectorConfig {
    fn effective_concurrency(&self) -> usize {
        if self.max_concurrent == 0 {
            DEFAULT_MAX_CONCURRENT
        } else {
            self.max_concurrent
        }
    }
}

/// Result of one collection cycle
#[derive(Debug, Default)]
pub struct Collection {
    /// Successful per-server records, in completion order
    pub records: Vec<StatRecord>,
    /// Per-server fetches that failed; absorbed, not surfaced as an error
    pub failures: Vec<FetchFailure>,
    /// Fetch tasks that panicked before reporting
    pub aborted: usize,
}

impl Collection {
    /// Number of per-server fetches that produced no record
    pub fn error_count(&self) -> usize {
        self.failures.len() + self.aborted
    }
}

/// Bounded-concurrency stats collector
pub struct Collector {
    api: Arc<dyn FleetApi>,
    config: CollectorConfig,
}

impl Collector {
    pub fn new(api: Arc<dyn FleetApi>, config: CollectorConfig) -> Self {
        Self { api, config }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Run one collection cycle
    pub async fn collect(&self, ctx: &ScrapeContext) -> Result<Collection, CollectError> {
        let servers = self
            .api
            .list_servers(ctx)
            .await
            .map_err(CollectError::ListServers)?;

        let listed = servers.len();
        let eligible = self.eligible(servers);

        debug!(
            listed = listed,
            eligible = eligible.len(),
            only_ok = self.config.only_ok,
            "Listed servers"
        );

        if eligible.is_empty() {
            return Ok(Collection::default());
        }

        let gate = Arc::new(Semaphore::new(self.config.effective_concurrency()));
        let mut tasks = JoinSet::new();

        for server in eligible {
            let api = Arc::clone(&self.api);
            let gate = Arc::clone(&gate);
            let ctx = ctx.clone();

            tasks.spawn(fetch_server(api, gate, ctx, server));
        }

        let mut collection = Collection::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(record)) => collection.records.push(record),
                Ok(Err(failure)) => collection.failures.push(failure),
                Err(e) => {
                    error!(error = %e, "Stats fetch task did not complete");
                    collection.aborted += 1;
                }
            }
        }

        Ok(collection)
    }

    /// Apply the state filter and drop repeated ids before dispatch
    fn eligible(&self, servers: Vec<ServerDescriptor>) -> Vec<ServerDescriptor> {
        let mut seen = HashSet::new();

        servers
            .into_iter()
            .filter(|s| !self.config.only_ok || s.state.is_ok())
            .filter(|s| {
                let first = seen.insert(s.id.clone());
                if !first {
                    debug!(server_id = %s.id, "Skipping duplicate server id");
                }
                first
            })
            .collect()
    }
}

/// Fetch one server's stats while holding an admission permit
pub(super) async fn fetch_server(
    api: Arc<dyn FleetApi>,
    gate: Arc<Semaphore>,
    ctx: ScrapeContext,
    server: ServerDescriptor,
) -> Result<StatRecord, FetchFailure> {
    let result = match gate.acquire_owned().await {
        // Held until the request settles
        Ok(_permit) => api.get_stats(&ctx, &server.id).await,
        // A closed gate admits nothing
        Err(_) => Err(ClientError::Cancelled),
    };

    match result {
        Ok(stats) => Ok(StatRecord::new(&server, stats)),
        Err(error) => Err(FetchFailure {
            server_id: server.id,
            server_name: server.name,
            error,
        }),
    }
}

/// Builder for the collection engine
pub struct CollectorBuilder {
    api: Option<Arc<dyn FleetApi>>,
    config: CollectorConfig,
}

impl CollectorBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            api: None,
            config: CollectorConfig::default(),
        }
    }

    /// Set the remote API handle
    pub fn api(mut self, api: Arc<dyn FleetApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Set the concurrency bound; zero falls back to the default
    pub fn max_concurrent(mut self, limit: usize) -> Self {
        self.config.max_concurrent = limit;
        self
    }

    /// Only poll servers in the `Ok` state
    pub fn only_ok(mut self, only_ok: bool) -> Self {
        self.config.only_ok = only_ok;
        self
    }

    /// Build the collector
    pub fn build(self) -> Result<Collector> {
        let api = self
            .api
            .ok_or_else(|| anyhow::anyhow!("Fleet API client is required"))?;

        Ok(Collector::new(api, self.config))
    }
}

impl Default for CollectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

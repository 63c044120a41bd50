//! Exporter configuration

use anyhow::{bail, Result};
use serde::Deserialize;
use std::time::Duration;

/// Prefix shared by every environment variable the exporter reads
const ENV_PREFIX: &str = "KOMODO";

/// How scrape cycles are triggered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScrapeMode {
    /// Each `/metrics` request runs a cycle
    #[default]
    OnDemand,
    /// Cycles run on a fixed interval
    Interval,
}

impl ScrapeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeMode::OnDemand => "on-demand",
            ScrapeMode::Interval => "interval",
        }
    }
}

/// Exporter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    /// Base URL of the Komodo API (required)
    #[serde(default)]
    pub host: String,

    /// API key header value (required)
    #[serde(default)]
    pub api_key: String,

    /// API secret header value (required)
    #[serde(default)]
    pub api_secret: String,

    /// Listen address for `/metrics` and `/healthz`
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Skip TLS certificate verification for self-signed deployments
    #[serde(default)]
    pub insecure_skip_verify: bool,

    #[serde(default)]
    pub scrape_mode: ScrapeMode,

    /// Interval between cycles in interval mode
    #[serde(default = "default_scrape_interval")]
    pub scrape_interval_secs: u64,

    /// Deadline for a single scrape cycle
    #[serde(default = "default_scrape_timeout")]
    pub scrape_timeout_secs: u64,

    /// Per-request timeout against the Komodo API
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Concurrent stat requests; zero or negative means the default
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: i64,

    /// Only poll servers in the `Ok` state
    #[serde(default)]
    pub only_ok: bool,
}

fn default_listen_addr() -> String {
    ":9109".to_string()
}

fn default_scrape_interval() -> u64 {
    5
}

fn default_scrape_timeout() -> u64 {
    20
}

fn default_request_timeout() -> u64 {
    15
}

fn default_max_concurrent() -> i64 {
    8
}

impl ExporterConfig {
    /// Load configuration from `KOMODO_*` environment variables
    pub fn load() -> Result<Self> {
        Self::from_env(config::Environment::with_prefix(ENV_PREFIX))
    }

    fn from_env(env: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(env.ignore_empty(true))
            .build()?;

        let config: ExporterConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("HOST", &self.host),
            ("API_KEY", &self.api_key),
            ("API_SECRET", &self.api_secret),
        ] {
            if value.trim().is_empty() {
                bail!("missing required env var {ENV_PREFIX}_{key}");
            }
        }

        if self.scrape_mode == ScrapeMode::Interval && self.scrape_interval_secs == 0 {
            bail!("{ENV_PREFIX}_SCRAPE_INTERVAL_SECS must be positive in interval mode");
        }

        for (key, secs) in [
            ("SCRAPE_TIMEOUT_SECS", self.scrape_timeout_secs),
            ("REQUEST_TIMEOUT_SECS", self.request_timeout_secs),
        ] {
            if secs == 0 {
                bail!("{ENV_PREFIX}_{key} must be positive");
            }
        }

        Ok(())
    }

    /// Socket address to bind; a bare `:port` listens on all interfaces
    pub fn bind_addr(&self) -> String {
        let addr = self.listen_addr.trim();
        if addr.starts_with(':') {
            format!("0.0.0.0{addr}")
        } else {
            addr.to_string()
        }
    }

    /// Concurrency bound for the collector; zero selects the engine default
    pub fn max_concurrent(&self) -> usize {
        usize::try_from(self.max_concurrent).unwrap_or(0)
    }

    pub fn scrape_interval(&self) -> Duration {
        Duration::from_secs(self.scrape_interval_secs)
    }

    pub fn scrape_timeout(&self) -> Duration {
        Duration::from_secs(self.scrape_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

//! Stats collection from the fleet-management API
//!
//! This module provides the collection engine, which polls every eligible
//! server with bounded concurrency, and the interval loop that drives it
//! when the exporter scrapes on a timer instead of on request.

mod engine;
mod r#loop;

#[cfg(test)]
mod tests;

pub use engine::{
    CollectError, Collection, Collector, CollectorBuilder, CollectorConfig, DEFAULT_MAX_CONCURRENT,
};
pub use r#loop::{ScrapeLoop, ScrapeLoopConfig};

//! Exporter library for Komodo-managed server stats
//!
//! This crate provides the core functionality for:
//! - Talking to the Komodo fleet-management API
//! - Bounded-concurrency stats collection with partial-failure tolerance
//! - Publishing per-server snapshots as Prometheus metrics
//! - Health checks and observability

pub mod api;
pub mod client;
pub mod collector;
pub mod context;
pub mod models;
pub mod observability;
pub mod publisher;
pub mod scraper;

pub use client::{ClientError, ClientOptions, FleetApi, KomodoClient};
pub use collector::{CollectError, Collection, Collector, CollectorBuilder, ScrapeLoop};
pub use context::{CancelHandle, ScrapeContext};
pub use models::*;
pub use observability::{ScrapeMetrics, StructuredLogger};
pub use publisher::SnapshotPublisher;
pub use scraper::Scraper;

//! Remote fleet-management API client
//!
//! The collection engine only talks to the [`FleetApi`] trait; [`KomodoClient`]
//! is the HTTP implementation used in production.

mod komodo;

pub use komodo::{ClientOptions, KomodoClient, DEFAULT_REQUEST_TIMEOUT};

use crate::context::ScrapeContext;
use crate::models::{ServerDescriptor, ServerStats};
use thiserror::Error;

pub use async_trait::async_trait;

/// Failure of a single remote API operation
#[derive(Debug, Error)]
pub enum ClientError {
    /// The network call itself failed (DNS, connect, TLS, timeout)
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The API answered with a status outside 200-299
    #[error("komodo http {status}: {body}")]
    Protocol { status: u16, body: String },

    /// The response body did not have the expected shape
    #[error("decode response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("request cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The client could not be constructed
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl ClientError {
    /// True for errors caused by the caller's context rather than the remote side
    pub fn is_context_error(&self) -> bool {
        matches!(self, ClientError::Cancelled | ClientError::DeadlineExceeded)
    }
}

/// Read operations against the fleet-management service
#[async_trait]
pub trait FleetApi: Send + Sync {
    /// Enumerate every managed server
    async fn list_servers(&self, ctx: &ScrapeContext) -> Result<Vec<ServerDescriptor>, ClientError>;

    /// Fetch current resource stats for one server
    async fn get_stats(&self, ctx: &ScrapeContext, server_id: &str)
        -> Result<ServerStats, ClientError>;
}

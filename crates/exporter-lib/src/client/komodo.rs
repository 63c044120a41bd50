//! HTTP client for the Komodo `/read` endpoint

use super::{async_trait, ClientError, FleetApi};
use crate::context::ScrapeContext;
use crate::models::{ServerDescriptor, ServerState, ServerStats};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Per-request timeout used when none is configured
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const LIST_SERVERS: &str = "ListServers";
const GET_SYSTEM_STATS: &str = "GetSystemStats";

/// Construction-time options for [`KomodoClient`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Per-request timeout (default: 15 seconds)
    pub timeout: Duration,
    /// Accept any TLS certificate; only for self-signed deployments
    pub insecure_skip_verify: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            insecure_skip_verify: false,
        }
    }
}

#[derive(Debug, Serialize)]
struct ReadRequest<'a, P: Serialize> {
    #[serde(rename = "type")]
    kind: &'a str,
    params: P,
}

#[derive(Debug, Serialize)]
struct ListServersParams {}

#[derive(Debug, Serialize)]
struct GetSystemStatsParams<'a> {
    server: &'a str,
}

#[derive(Debug, Deserialize)]
struct ListServersItem {
    id: String,
    name: String,
    #[serde(default)]
    info: ServerInfo,
}

#[derive(Debug, Default, Deserialize)]
struct ServerInfo {
    #[serde(default)]
    state: Option<ServerState>,
}

impl From<ListServersItem> for ServerDescriptor {
    fn from(item: ListServersItem) -> Self {
        ServerDescriptor {
            id: item.id,
            name: item.name,
            state: item.info.state.unwrap_or_default(),
        }
    }
}

/// Client for the Komodo fleet-management API
pub struct KomodoClient {
    client: Client,
    read_url: Url,
    api_key: String,
    api_secret: String,
}

impl KomodoClient {
    /// Create a new client; `base_url` is the API root, e.g. `https://komodo.example.com`
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let read_url = format!("{}/read", base_url.trim_end_matches('/'));
        let read_url = Url::parse(&read_url)
            .map_err(|e| ClientError::InvalidConfig(format!("base url {base_url:?}: {e}")))?;

        let timeout = if options.timeout.is_zero() {
            DEFAULT_REQUEST_TIMEOUT
        } else {
            options.timeout
        };

        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(options.insecure_skip_verify)
            .build()
            .map_err(|e| ClientError::InvalidConfig(format!("http client: {e}")))?;

        Ok(Self {
            client,
            read_url,
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        })
    }

    /// Endpoint every operation is posted to
    pub fn read_url(&self) -> &Url {
        &self.read_url
    }

    async fn read<P, T>(&self, ctx: &ScrapeContext, kind: &str, params: P) -> Result<T, ClientError>
    where
        P: Serialize + Send,
        T: DeserializeOwned,
    {
        ctx.guard(self.send_read(kind, params)).await
    }

    async fn send_read<P, T>(&self, kind: &str, params: P) -> Result<T, ClientError>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.read_url.clone())
            .header("X-Api-Key", &self.api_key)
            .header("X-Api-Secret", &self.api_secret)
            .json(&ReadRequest { kind, params })
            .send()
            .await
            .map_err(ClientError::Transport)?;

        let status = response.status();
        let body = response.bytes().await.map_err(ClientError::Transport)?;

        if !status.is_success() {
            return Err(ClientError::Protocol {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        debug!(operation = kind, bytes = body.len(), "Komodo read succeeded");
        serde_json::from_slice(&body).map_err(ClientError::Decode)
    }
}

#[async_trait]
impl FleetApi for KomodoClient {
    async fn list_servers(&self, ctx: &ScrapeContext) -> Result<Vec<ServerDescriptor>, ClientError> {
        let items: Vec<ListServersItem> = self.read(ctx, LIST_SERVERS, ListServersParams {}).await?;
        Ok(items.into_iter().map(ServerDescriptor::from).collect())
    }

    async fn get_stats(&self, ctx: &ScrapeContext, server_id: &str) -> Result<ServerStats, ClientError> {
        self.read(ctx, GET_SYSTEM_STATS, GetSystemStatsParams { server: server_id })
            .await
    }
}

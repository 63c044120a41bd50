//! Core data models for the exporter

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::client::ClientError;

/// Lifecycle state reported by the fleet-management API for a server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerState {
    /// Server is reachable and reporting
    Ok,
    /// Server is registered but not reachable
    NotOk,
    /// Server has been disabled by an operator
    Disabled,
    /// Any state this exporter does not know about
    #[default]
    #[serde(other)]
    Unknown,
}

impl ServerState {
    /// Only healthy servers are polled when state filtering is on
    pub fn is_ok(&self) -> bool {
        matches!(self, ServerState::Ok)
    }
}

/// One entry of the list-servers response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub id: String,
    pub name: String,
    pub state: ServerState,
}

impl ServerDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, state: ServerState) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state,
        }
    }
}

/// Resource stats for a single server, as returned by the remote API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerStats {
    #[serde(rename = "cpu_perc")]
    pub cpu_percent: f64,
    pub mem_free_gb: f64,
    pub mem_used_gb: f64,
    pub mem_total_gb: f64,
    #[serde(rename = "network_ingress_bytes")]
    pub net_ingress_bytes: f64,
    #[serde(rename = "network_egress_bytes")]
    pub net_egress_bytes: f64,
    #[serde(rename = "refresh_ts")]
    pub refresh_timestamp: i64,
}

/// A server's identity joined with the stats fetched for it in one cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatRecord {
    pub server_id: String,
    pub server_name: String,
    pub stats: ServerStats,
}

impl StatRecord {
    pub fn new(server: &ServerDescriptor, stats: ServerStats) -> Self {
        Self {
            server_id: server.id.clone(),
            server_name: server.name.clone(),
            stats,
        }
    }
}

/// A per-server fetch that did not produce stats
#[derive(Debug)]
pub struct FetchFailure {
    pub server_id: String,
    pub server_name: String,
    pub error: ClientError,
}

/// The per-server records currently exposed, keyed by server id
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    records: BTreeMap<String, StatRecord>,
}

impl Snapshot {
    /// Build a snapshot from one cycle's records; a repeated id keeps the first record
    pub fn from_records(records: &[StatRecord]) -> Self {
        let mut map = BTreeMap::new();
        for record in records {
            map.entry(record.server_id.clone())
                .or_insert_with(|| record.clone());
        }
        Self { records: map }
    }

    pub fn get(&self, server_id: &str) -> Option<&StatRecord> {
        self.records.get(server_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in server id order
    pub fn records(&self) -> impl Iterator<Item = &StatRecord> {
        self.records.values()
    }
}

/// Summary of one scrape cycle, consumed by the health counters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrapeOutcome {
    pub duration: Duration,
    pub succeeded: bool,
    pub error_count: usize,
}

impl ScrapeOutcome {
    pub fn success(duration: Duration, error_count: usize) -> Self {
        Self {
            duration,
            succeeded: true,
            error_count,
        }
    }

    pub fn failure(duration: Duration) -> Self {
        Self {
            duration,
            succeeded: false,
            error_count: 0,
        }
    }
}

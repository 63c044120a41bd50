//! Snapshot publisher
//!
//! Turns one cycle's [`StatRecord`]s into per-server gauge series on an
//! explicitly constructed Prometheus [`Registry`]. Each cycle replaces the
//! previous snapshot wholesale.

use crate::models::{Snapshot, StatRecord};
use prometheus::{GaugeVec, IntGauge, Opts, Registry};

/// Labels attached to every per-server series
pub const SERVER_LABELS: &[&str] = &["server_id", "server_name"];

fn server_gauge(registry: &Registry, name: &str, help: &str) -> prometheus::Result<GaugeVec> {
    let gauge = GaugeVec::new(Opts::new(name, help), SERVER_LABELS)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

/// Owner of the current snapshot and the gauges that expose it
pub struct SnapshotPublisher {
    cpu_perc: GaugeVec,
    mem_free_gb: GaugeVec,
    mem_used_gb: GaugeVec,
    mem_total_gb: GaugeVec,
    network_ingress_bytes: GaugeVec,
    network_egress_bytes: GaugeVec,
    servers_scraped: IntGauge,
    snapshot: Snapshot,
}

impl SnapshotPublisher {
    /// Register the per-server gauge families on `registry`
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let servers_scraped = IntGauge::new(
            "komodo_servers_scraped",
            "Number of servers present in the current snapshot",
        )?;
        registry.register(Box::new(servers_scraped.clone()))?;

        Ok(Self {
            cpu_perc: server_gauge(registry, "komodo_cpu_perc", "CPU percent")?,
            mem_free_gb: server_gauge(registry, "komodo_mem_free_gb", "Free memory (GB)")?,
            mem_used_gb: server_gauge(registry, "komodo_mem_used_gb", "Used memory (GB)")?,
            mem_total_gb: server_gauge(registry, "komodo_mem_total_gb", "Total memory (GB)")?,
            network_ingress_bytes: server_gauge(
                registry,
                "komodo_network_ingress_bytes",
                "Network ingress bytes",
            )?,
            network_egress_bytes: server_gauge(
                registry,
                "komodo_network_egress_bytes",
                "Network egress bytes",
            )?,
            servers_scraped,
            snapshot: Snapshot::default(),
        })
    }

    /// Drop every per-server series published so far
    pub fn reset(&mut self) {
        self.cpu_perc.reset();
        self.mem_free_gb.reset();
        self.mem_used_gb.reset();
        self.mem_total_gb.reset();
        self.network_ingress_bytes.reset();
        self.network_egress_bytes.reset();
        self.servers_scraped.set(0);
        self.snapshot = Snapshot::default();
    }

    /// Publish one cycle's records as the current snapshot
    pub fn update(&mut self, records: &[StatRecord]) {
        self.snapshot = Snapshot::from_records(records);

        for record in self.snapshot.records() {
            let labels = [record.server_id.as_str(), record.server_name.as_str()];
            let stats = &record.stats;

            self.cpu_perc.with_label_values(&labels).set(stats.cpu_percent);
            self.mem_free_gb.with_label_values(&labels).set(stats.mem_free_gb);
            self.mem_used_gb.with_label_values(&labels).set(stats.mem_used_gb);
            self.mem_total_gb.with_label_values(&labels).set(stats.mem_total_gb);
            self.network_ingress_bytes
                .with_label_values(&labels)
                .set(stats.net_ingress_bytes);
            self.network_egress_bytes
                .with_label_values(&labels)
                .set(stats.net_egress_bytes);
        }

        self.servers_scraped.set(self.snapshot.len() as i64);
    }

    /// The snapshot published by the most recent cycle
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

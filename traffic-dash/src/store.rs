//! Traffic snapshot store with deterministic aggregation queries.
//!
//! Holds the latest snapshot plus its metadata and answers the queries the
//! presenter and status displays need. The store is single-writer (the
//! connection driver) and multi-reader; each update replaces the held
//! snapshot wholesale, so readers holding the previous `Arc` keep a
//! consistent view.

use crate::message::{ClientId, ClientMetadata, ServiceTraffic, TrafficSnapshot};
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::sync::Arc;

/// Independent inbound/outbound byte sums.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub inbound: u64,
    pub outbound: u64,
}

impl Totals {
    /// Combined inbound + outbound volume.
    pub fn total(&self) -> u64 {
        self.inbound + self.outbound
    }
}

/// Aggregate volume across all clients, for the summary display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobalTotals {
    pub inbound: u64,
    pub outbound: u64,
    /// Number of distinct clients in the current snapshot
    pub clients: usize,
}

/// Holds the latest traffic snapshot and exposes aggregation queries over it.
#[derive(Debug, Clone, Default)]
pub struct TrafficStore {
    snapshot: Arc<TrafficSnapshot>,
    metadata: ClientMetadata,
    last_update: Option<DateTime<Utc>>,
}

impl TrafficStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held state wholesale. Last write wins; the previous
    /// snapshot stays valid for any reader still holding it.
    pub fn update(&mut self, snapshot: TrafficSnapshot, metadata: ClientMetadata) {
        self.snapshot = Arc::new(snapshot);
        self.metadata = metadata;
        self.last_update = Some(Utc::now());
    }

    /// Shared handle to the current snapshot.
    pub fn snapshot(&self) -> Arc<TrafficSnapshot> {
        Arc::clone(&self.snapshot)
    }

    /// When the last snapshot arrived, if any has.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    /// Clients in the current snapshot, sorted by combined volume descending.
    /// Ties break by ascending clientId so the order is reproducible.
    pub fn overview_order(&self) -> Vec<ClientId> {
        let mut clients: Vec<ClientId> = self.snapshot.keys().cloned().collect();
        // BTreeMap iteration is already id-ascending; a stable sort on the
        // volume key preserves that order for equal totals.
        clients.sort_by_key(|client| Reverse(self.client_total(client).total()));
        clients
    }

    /// Inbound/outbound sums across all services of one client.
    /// Zero for clients absent from the snapshot.
    pub fn client_total(&self, client: &str) -> Totals {
        self.snapshot
            .get(client)
            .map(|services| {
                services.values().fold(Totals::default(), |acc, service| Totals {
                    inbound: acc.inbound + service.inbound,
                    outbound: acc.outbound + service.outbound,
                })
            })
            .unwrap_or_default()
    }

    /// Per-service counters for one client, sorted by service name ascending.
    /// Empty for clients absent from the snapshot.
    pub fn service_breakdown(&self, client: &str) -> Vec<(String, ServiceTraffic)> {
        self.snapshot
            .get(client)
            .map(|services| {
                services
                    .iter()
                    .map(|(name, traffic)| (name.clone(), *traffic))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Aggregate volume summed across all clients.
    pub fn global_totals(&self) -> GlobalTotals {
        let mut totals = GlobalTotals {
            clients: self.snapshot.len(),
            ..GlobalTotals::default()
        };

        for services in self.snapshot.values() {
            for service in services.values() {
                totals.inbound += service.inbound;
                totals.outbound += service.outbound;
            }
        }

        totals
    }

    /// Human-readable label for a client: `hostname (id)` when a hostname is
    /// known and differs from the id, with a device suffix when present.
    pub fn display_label(&self, client: &str) -> String {
        let mut label = match self.metadata.hosts.get(client) {
            Some(hostname) if hostname != client => format!("{hostname} ({client})"),
            _ => client.to_string(),
        };

        if let Some(device) = self.metadata.devices.get(client) {
            if !device.is_empty() {
                label.push_str(" - ");
                label.push_str(device);
            }
        }

        label
    }
}

/// Format a byte count for axis and status text (1024 base, two decimals).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let exponent = (bytes as f64).log(1024.0).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exponent as i32);

    if exponent == 0 {
        format!("{bytes} B")
    } else {
        format!("{:.2} {}", value, UNITS[exponent])
    }
}

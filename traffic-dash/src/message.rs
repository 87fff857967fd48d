//! Wire schema for the dashboard's external interfaces.
//!
//! Raw JSON from the streaming connection and the history query API is
//! validated here and converted into ordered domain values before it reaches
//! the store. Invalid input is rejected at this boundary, never deeper in
//! the aggregation logic.

use crate::error::DashError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Stable identifier of a monitored network endpoint (e.g. an address).
pub type ClientId = String;

/// Inbound/outbound byte counters for one service bucket.
///
/// Counters are `u64`, so a payload carrying a negative count fails
/// deserialization instead of producing a nonsense aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServiceTraffic {
    /// Bytes received by the client over this service
    #[serde(rename = "in")]
    pub inbound: u64,
    /// Bytes sent by the client over this service
    #[serde(rename = "out")]
    pub outbound: u64,
}

impl ServiceTraffic {
    /// Combined inbound + outbound volume.
    pub fn total(&self) -> u64 {
        self.inbound + self.outbound
    }
}

/// Streaming push message from the monitoring backend.
///
/// `traffic` is mandatory; a message without it does not match the required
/// shape and is dropped by the connection manager. The metadata maps are
/// optional and default to empty.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrafficPush {
    /// clientId -> serviceName -> counters
    pub traffic: HashMap<ClientId, HashMap<String, ServiceTraffic>>,
    /// clientId -> resolved hostname
    #[serde(default)]
    pub hosts: HashMap<ClientId, String>,
    /// clientId -> device/vendor descriptor
    #[serde(default, rename = "hostsDevices")]
    pub devices: HashMap<ClientId, String>,
}

/// One complete, self-contained traffic state superseding all prior state.
///
/// Ordered maps so every downstream iteration is deterministic.
pub type TrafficSnapshot = BTreeMap<ClientId, BTreeMap<String, ServiceTraffic>>;

/// Hostname and device descriptors travelling alongside each snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMetadata {
    pub hosts: BTreeMap<ClientId, String>,
    pub devices: BTreeMap<ClientId, String>,
}

impl TrafficPush {
    /// Parse a raw text frame into a typed push message.
    pub fn parse(raw: &str) -> Result<Self, DashError> {
        serde_json::from_str(raw).map_err(DashError::from)
    }

    /// Convert the wire maps into the ordered domain representation.
    pub fn into_domain(self) -> (TrafficSnapshot, ClientMetadata) {
        let snapshot = self
            .traffic
            .into_iter()
            .map(|(client, services)| (client, services.into_iter().collect()))
            .collect();

        let metadata = ClientMetadata {
            hosts: self.hosts.into_iter().collect(),
            devices: self.devices.into_iter().collect(),
        };

        (snapshot, metadata)
    }
}

/// One point of a per-client history series, as received from the query API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct HistoryPoint {
    /// Absolute instant of the sample. The wire representation may omit the
    /// zone marker; it is always interpreted as UTC.
    #[serde(rename = "time", deserialize_with = "de_timestamp_utc")]
    pub timestamp: DateTime<Utc>,
    /// Total bytes observed for the client in this sample
    #[serde(rename = "total")]
    pub total_bytes: u64,
}

/// Raw history query response: clientId -> list of points.
pub type HistoryResponse = HashMap<ClientId, Vec<HistoryPoint>>;

/// Parse a timestamp string as a UTC instant, with or without an explicit
/// zone marker.
fn de_timestamp_utc<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;

    if let Ok(with_zone) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(with_zone.with_timezone(&Utc));
    }

    raw.parse::<NaiveDateTime>()
        .map(|naive| naive.and_utc())
        .map_err(|_| serde::de::Error::custom(format!("unrecognised timestamp: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_push_parses_full_message() {
        let raw = r#"{
            "traffic": {"10.0.0.1": {"http": {"in": 100, "out": 50}}},
            "hosts": {"10.0.0.1": "laptop"},
            "hostsDevices": {"10.0.0.1": "Desktop Windows"}
        }"#;

        let push = TrafficPush::parse(raw).unwrap();
        assert_eq!(push.traffic["10.0.0.1"]["http"].inbound, 100);
        assert_eq!(push.traffic["10.0.0.1"]["http"].outbound, 50);
        assert_eq!(push.hosts["10.0.0.1"], "laptop");
        assert_eq!(push.devices["10.0.0.1"], "Desktop Windows");
    }

    #[test]
    fn test_push_optional_maps_default_to_empty() {
        let raw = r#"{"traffic": {"10.0.0.1": {"dns": {"in": 10, "out": 10}}}}"#;

        let push = TrafficPush::parse(raw).unwrap();
        assert!(push.hosts.is_empty());
        assert!(push.devices.is_empty());
    }

    #[test]
    fn test_push_missing_traffic_is_rejected() {
        let raw = r#"{"hosts": {"10.0.0.1": "laptop"}}"#;
        assert!(matches!(TrafficPush::parse(raw), Err(DashError::Parse(_))));
    }

    #[test]
    fn test_push_negative_counter_is_rejected() {
        let raw = r#"{"traffic": {"10.0.0.1": {"http": {"in": -5, "out": 0}}}}"#;
        assert!(matches!(TrafficPush::parse(raw), Err(DashError::Parse(_))));
    }

    #[test]
    fn test_into_domain_orders_clients_and_services() {
        let raw = r#"{
            "traffic": {
                "10.0.0.2": {"ssh": {"in": 1, "out": 1}},
                "10.0.0.1": {"http": {"in": 2, "out": 2}, "dns": {"in": 3, "out": 3}}
            }
        }"#;

        let (snapshot, _) = TrafficPush::parse(raw).unwrap().into_domain();
        let clients: Vec<&str> = snapshot.keys().map(String::as_str).collect();
        assert_eq!(clients, vec!["10.0.0.1", "10.0.0.2"]);

        let services: Vec<&str> = snapshot["10.0.0.1"].keys().map(String::as_str).collect();
        assert_eq!(services, vec!["dns", "http"]);
    }

    #[test]
    fn test_history_point_naive_timestamp_is_utc() {
        let point: HistoryPoint =
            serde_json::from_str(r#"{"time": "2024-01-01T00:00:00", "total": 500}"#).unwrap();

        assert_eq!(
            point.timestamp,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(point.total_bytes, 500);
    }

    #[test]
    fn test_history_point_zoned_timestamp_converts_to_utc() {
        let point: HistoryPoint =
            serde_json::from_str(r#"{"time": "2024-01-01T02:00:00+02:00", "total": 1}"#).unwrap();

        assert_eq!(
            point.timestamp,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_history_point_garbage_timestamp_is_rejected() {
        let result =
            serde_json::from_str::<HistoryPoint>(r#"{"time": "yesterday", "total": 1}"#);
        assert!(result.is_err());
    }
}

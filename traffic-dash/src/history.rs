//! One-shot range queries against the history API.
//!
//! A query either produces a complete [`HistorySeries`] or fails once; there
//! is no retry here, the view controller re-issues on the next selection.

use crate::error::DashError;
use crate::message::{ClientId, HistoryPoint, HistoryResponse};
use std::collections::BTreeMap;
use std::fmt;

/// Fixed enumeration of lookback windows offered by the query API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryRange {
    /// 15-minute window
    M15,
    /// 1-hour window
    H1,
    /// 6-hour window
    H6,
}

impl HistoryRange {
    pub const ALL: [HistoryRange; 3] = [HistoryRange::M15, HistoryRange::H1, HistoryRange::H6];

    /// Wire label used in the query path.
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryRange::M15 => "15m",
            HistoryRange::H1 => "1h",
            HistoryRange::H6 => "6h",
        }
    }

    /// Human-readable label for titles and status text.
    pub fn label(&self) -> &'static str {
        match self {
            HistoryRange::M15 => "Last 15 minutes",
            HistoryRange::H1 => "Last hour",
            HistoryRange::H6 => "Last 6 hours",
        }
    }
}

impl fmt::Display for HistoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalised history query result: per-client time series, each ordered by
/// timestamp ascending, clients in deterministic (ascending id) order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistorySeries {
    series: BTreeMap<ClientId, Vec<HistoryPoint>>,
}

impl HistorySeries {
    /// Normalise a raw response: sort each client's points by timestamp.
    pub fn from_response(response: HistoryResponse) -> Self {
        let series = response
            .into_iter()
            .map(|(client, mut points)| {
                points.sort_by_key(|point| point.timestamp);
                (client, points)
            })
            .collect();

        Self { series }
    }

    /// Points for one client. A client absent from the response is an empty
    /// series, not an error.
    pub fn points(&self, client: &str) -> &[HistoryPoint] {
        self.series
            .get(client)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Clients present in the result, in ascending id (deterministic) order.
    pub fn clients(&self) -> impl Iterator<Item = &ClientId> {
        self.series.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// HTTP client issuing one-shot range queries.
#[derive(Debug, Clone)]
pub struct HistoryClient {
    http: reqwest::Client,
    base_url: String,
}

impl HistoryClient {
    /// Create a client for the given base URL, e.g.
    /// `http://127.0.0.1:8000/history`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Base URL from `TRAFFIC_DASH_HISTORY_URL`, with a localhost fallback.
    pub fn from_env() -> Self {
        let base_url = std::env::var("TRAFFIC_DASH_HISTORY_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8000/history".to_string());
        Self::new(base_url)
    }

    /// Issue a single query for the given range.
    pub async fn fetch_range(&self, range: HistoryRange) -> Result<HistorySeries, DashError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), range);
        tracing::debug!(%url, "fetching history range");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|error| DashError::History(error.to_string()))?;

        if !response.status().is_success() {
            return Err(DashError::History(format!(
                "server returned {} for range {range}",
                response.status()
            )));
        }

        let raw: HistoryResponse = response
            .json()
            .await
            .map_err(|error| DashError::History(error.to_string()))?;

        Ok(HistorySeries::from_response(raw))
    }
}

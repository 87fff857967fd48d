//! Traffic Dashboard - Core Engine
//!
//! View-state, aggregation and connection-lifecycle engine for the real-time
//! traffic dashboard:
//! - Typed wire schema for the streaming push messages and history responses
//! - [`TrafficStore`] holding the latest snapshot with deterministic queries
//! - [`ConnectionManager`] owning the streaming connection lifecycle
//! - [`HistoryClient`] issuing one-shot range queries
//! - [`ViewController`] state machine over live / drilldown / history views
//! - [`present::render`] mapping view + data to a renderable chart spec
//!
//! Rendering itself lives in the `traffic-dash-tui` front-end, which consumes
//! the [`present::ChartSpec`] this crate produces.

pub mod connection;
pub mod error;
pub mod history;
pub mod message;
pub mod present;
pub mod store;
pub mod theme;
pub mod view;

// Re-export commonly used types for convenience
pub use connection::{ConnectionManager, ConnectionState, SnapshotUpdate, StreamConfig};
pub use error::DashError;
pub use history::{HistoryClient, HistoryRange, HistorySeries};
pub use message::{ClientId, ClientMetadata, ServiceTraffic, TrafficPush, TrafficSnapshot};
pub use present::{BarSpec, ChartSpec, ChartStyle, LineSeries, LineSpec, Rgb, SERIES_PALETTE};
pub use store::{format_bytes, GlobalTotals, Totals, TrafficStore};
pub use theme::{Theme, ThemePreference};
pub use view::{Command, Selection, ViewController, ViewState};

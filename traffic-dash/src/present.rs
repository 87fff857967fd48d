//! Presenter: pure mapping from view state and data to a renderable chart
//! description.
//!
//! No rendering primitive is touched here; the returned [`ChartSpec`] is
//! consumed by the external charting front-end. Same inputs always produce
//! the same spec, including color assignment.

use crate::history::HistorySeries;
use crate::message::ClientId;
use crate::store::TrafficStore;
use crate::theme::Theme;
use crate::view::ViewState;
use chrono::{DateTime, Utc};

/// A color the charting collaborator can map onto its own primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// Fixed palette cycled over history series in first-seen order.
pub const SERIES_PALETTE: [Rgb; 8] = [
    Rgb(54, 162, 235),
    Rgb(255, 99, 132),
    Rgb(75, 192, 192),
    Rgb(255, 159, 64),
    Rgb(153, 102, 255),
    Rgb(255, 205, 86),
    Rgb(201, 203, 207),
    Rgb(46, 204, 113),
];

/// Bar colors for the inbound/outbound pair, matching the palette's first
/// two entries so live and history views read consistently.
pub const INBOUND_COLOR: Rgb = SERIES_PALETTE[0];
pub const OUTBOUND_COLOR: Rgb = SERIES_PALETTE[1];

/// Theme-dependent text/axis colors. Data is never affected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartStyle {
    pub text: Rgb,
    pub grid: Rgb,
}

impl ChartStyle {
    pub fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Dark => Self {
                text: Rgb(255, 255, 255),
                grid: Rgb(60, 60, 70),
            },
            Theme::Light => Self {
                text: Rgb(40, 40, 50),
                grid: Rgb(200, 200, 210),
            },
        }
    }
}

/// Grouped inbound/outbound bars, one group per category.
#[derive(Debug, Clone, PartialEq)]
pub struct BarSpec {
    pub title: String,
    /// Display labels, in render order
    pub categories: Vec<String>,
    /// Inbound bytes per category, parallel to `categories`
    pub inbound: Vec<u64>,
    /// Outbound bytes per category, parallel to `categories`
    pub outbound: Vec<u64>,
    pub style: ChartStyle,
}

/// One time-ordered line per client.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSeries {
    pub label: ClientId,
    pub color: Rgb,
    pub points: Vec<(DateTime<Utc>, u64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineSpec {
    pub title: String,
    pub series: Vec<LineSeries>,
    pub style: ChartStyle,
}

/// Renderable series description handed to the charting front-end.
#[derive(Debug, Clone, PartialEq)]
pub enum ChartSpec {
    Bars(BarSpec),
    Lines(LineSpec),
}

/// Compute the chart for the current view.
///
/// `history` is only consulted in the history view; the caller passes the
/// controller's held result (or `None` while a query is outstanding).
pub fn render(
    view: &ViewState,
    store: &TrafficStore,
    history: Option<&HistorySeries>,
    theme: Theme,
) -> ChartSpec {
    let style = ChartStyle::for_theme(theme);

    match view {
        ViewState::Live => ChartSpec::Bars(overview_bars(store, style)),
        ViewState::Drilldown { client } => ChartSpec::Bars(drilldown_bars(store, client, style)),
        ViewState::History { range } => {
            let mut series = Vec::new();
            if let Some(history) = history {
                for (index, client) in history.clients().enumerate() {
                    series.push(LineSeries {
                        label: client.clone(),
                        color: SERIES_PALETTE[index % SERIES_PALETTE.len()],
                        points: history
                            .points(client)
                            .iter()
                            .map(|point| (point.timestamp, point.total_bytes))
                            .collect(),
                    });
                }
            }

            ChartSpec::Lines(LineSpec {
                title: format!("Traffic history - {}", range.label()),
                series,
                style,
            })
        }
    }
}

fn overview_bars(store: &TrafficStore, style: ChartStyle) -> BarSpec {
    let order = store.overview_order();
    let mut categories = Vec::with_capacity(order.len());
    let mut inbound = Vec::with_capacity(order.len());
    let mut outbound = Vec::with_capacity(order.len());

    for client in &order {
        let totals = store.client_total(client);
        categories.push(store.display_label(client));
        inbound.push(totals.inbound);
        outbound.push(totals.outbound);
    }

    BarSpec {
        title: "Traffic by client".to_string(),
        categories,
        inbound,
        outbound,
        style,
    }
}

fn drilldown_bars(store: &TrafficStore, client: &str, style: ChartStyle) -> BarSpec {
    let breakdown = store.service_breakdown(client);
    let mut categories = Vec::with_capacity(breakdown.len());
    let mut inbound = Vec::with_capacity(breakdown.len());
    let mut outbound = Vec::with_capacity(breakdown.len());

    for (service, traffic) in &breakdown {
        categories.push(service.clone());
        inbound.push(traffic.inbound);
        outbound.push(traffic.outbound);
    }

    BarSpec {
        title: format!("Client detail - {}", store.display_label(client)),
        categories,
        inbound,
        outbound,
        style,
    }
}

//! View state machine.
//!
//! Every selection input from the surrounding UI is routed through
//! [`ViewController::handle`], which maps it to exactly one transition and
//! returns the side effects for the driver to execute. Keeping the effects
//! as data keeps the whole transition table enumerable and testable without
//! any network.

use crate::error::DashError;
use crate::history::{HistoryRange, HistorySeries};
use crate::message::ClientId;
use tracing::{debug, info};

/// The active view. Exactly one at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState {
    /// Streaming overview of all clients
    Live,
    /// Per-client service breakdown. The client may have disappeared from
    /// the current snapshot; that resolves to an empty aggregate downstream,
    /// never an error.
    Drilldown { client: ClientId },
    /// Historical range view; the streaming connection is closed while here
    History { range: HistoryRange },
}

/// Selection inputs from the surrounding UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Select a client for drill-down
    Client(ClientId),
    /// Select a history range
    Range(HistoryRange),
    /// Return to the live streaming view
    Live,
    /// Reverse the last drilldown (or leave history)
    Back,
}

/// Side effects a transition asks the driver to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Intentionally close the streaming connection
    CloseStream,
    /// (Re)open the streaming connection
    OpenStream,
    /// Issue a history query; the result must come back via
    /// [`ViewController::apply_history`] tagged with `seq`
    FetchHistory { range: HistoryRange, seq: u64 },
}

/// Where the current drilldown was entered from, so `Back` can return there.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DrillOrigin {
    Live,
    History { range: HistoryRange },
}

/// State machine over `{Live, Drilldown, History}` driving which data source
/// is active. Owns the one held history result.
#[derive(Debug)]
pub struct ViewController {
    view: ViewState,
    drill_origin: DrillOrigin,
    history: Option<HistorySeries>,
    history_error: Option<String>,
    /// Sequence of the most recently issued history query; only a result
    /// carrying this value may be applied (latest request wins).
    history_seq: u64,
    stream_open: bool,
}

impl Default for ViewController {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewController {
    /// Start in the live view with the streaming connection assumed open.
    pub fn new() -> Self {
        Self {
            view: ViewState::Live,
            drill_origin: DrillOrigin::Live,
            history: None,
            history_error: None,
            history_seq: 0,
            stream_open: true,
        }
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    /// The held history result, if any.
    pub fn history(&self) -> Option<&HistorySeries> {
        self.history.as_ref()
    }

    /// Status text of the last failed history query, if any.
    pub fn history_error(&self) -> Option<&str> {
        self.history_error.as_deref()
    }

    /// Apply one selection input. Returns the side effects to execute.
    pub fn handle(&mut self, selection: Selection) -> Vec<Command> {
        let commands = match selection {
            Selection::Client(client) => self.select_client(client),
            Selection::Range(range) => self.select_range(range),
            Selection::Live => self.select_live(),
            Selection::Back => self.back(),
        };

        debug!(view = ?self.view, ?commands, "view transition");
        commands
    }

    fn select_client(&mut self, client: ClientId) -> Vec<Command> {
        match &self.view {
            ViewState::Live => self.drill_origin = DrillOrigin::Live,
            ViewState::History { range } => {
                self.drill_origin = DrillOrigin::History { range: *range };
            }
            // Re-targeting within a drilldown keeps the original entry point.
            ViewState::Drilldown { .. } => {}
        }

        self.view = ViewState::Drilldown { client };
        Vec::new()
    }

    fn select_range(&mut self, range: HistoryRange) -> Vec<Command> {
        let mut commands = Vec::new();

        if self.stream_open {
            commands.push(Command::CloseStream);
            self.stream_open = false;
        }

        self.history_seq += 1;
        commands.push(Command::FetchHistory {
            range,
            seq: self.history_seq,
        });

        info!(%range, seq = self.history_seq, "entering history view");
        self.view = ViewState::History { range };
        commands
    }

    fn select_live(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();

        if !self.stream_open {
            commands.push(Command::OpenStream);
            self.stream_open = true;
        }

        if self.view != ViewState::Live {
            // A history result resolving after this point carries a stale
            // seq and is discarded; the next live render owes it nothing.
            self.history_seq += 1;
            self.history = None;
            self.history_error = None;
        }

        self.view = ViewState::Live;
        self.drill_origin = DrillOrigin::Live;
        commands
    }

    fn back(&mut self) -> Vec<Command> {
        match self.view.clone() {
            ViewState::Drilldown { .. } => {
                self.view = match self.drill_origin.clone() {
                    DrillOrigin::Live => ViewState::Live,
                    DrillOrigin::History { range } => ViewState::History { range },
                };
                Vec::new()
            }
            // Nothing drilled down: leaving history behaves like selecting
            // the live view; `Back` in Live has nothing to reverse.
            ViewState::History { .. } => self.select_live(),
            ViewState::Live => Vec::new(),
        }
    }

    /// Apply a completed history query.
    ///
    /// Discards the result when its seq is not the latest issued or the
    /// history overview is no longer active (directly, or behind a drilldown
    /// entered from it). On failure the prior series remains and the error
    /// is surfaced as status text. Returns whether the result was applied.
    pub fn apply_history(
        &mut self,
        seq: u64,
        result: Result<HistorySeries, DashError>,
    ) -> bool {
        if seq != self.history_seq {
            debug!(seq, latest = self.history_seq, "discarding stale history result");
            return false;
        }

        let history_active = matches!(self.view, ViewState::History { .. })
            || matches!(
                (&self.view, &self.drill_origin),
                (ViewState::Drilldown { .. }, DrillOrigin::History { .. })
            );
        if !history_active {
            debug!(seq, view = ?self.view, "discarding history result for inactive view");
            return false;
        }

        match result {
            Ok(series) => {
                self.history = Some(series);
                self.history_error = None;
            }
            Err(error) => {
                info!(%error, "history query failed");
                self.history_error = Some(error.to_string());
            }
        }

        true
    }
}

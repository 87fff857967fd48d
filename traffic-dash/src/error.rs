use thiserror::Error;

/// All errors generated in `traffic-dash`.
///
/// Nothing here is fatal to the process: transport errors trigger a timed
/// reconnect, malformed messages are dropped, and failed history queries are
/// surfaced once and left for the caller to re-issue.
#[derive(Debug, Error)]
pub enum DashError {
    #[error("websocket transport error: {0}")]
    Socket(String),

    #[error("malformed push message: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("history query failed: {0}")]
    History(String),

    #[error("failed to persist theme preference: {0}")]
    Preference(#[from] std::io::Error),
}

impl DashError {
    /// Short label for the status line.
    pub fn status_label(&self) -> &'static str {
        match self {
            DashError::Socket(_) => "stream error",
            DashError::Parse(_) => "bad message",
            DashError::History(_) => "history query failed",
            DashError::Preference(_) => "preference not saved",
        }
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Per-connection sync state machine. `Failed` is terminal and reachable
/// only from `TokenCheck`; later steps degrade instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    TokenCheck,
    Discover,
    FetchAnalytics,
    FetchReporting,
    ReconcilePersist,
    Done,
    Failed,
}

impl SyncState {
    /// The state that follows a completed (or tolerated) step.
    pub fn next(self) -> SyncState {
        match self {
            SyncState::TokenCheck => SyncState::Discover,
            SyncState::Discover => SyncState::FetchAnalytics,
            SyncState::FetchAnalytics => SyncState::FetchReporting,
            SyncState::FetchReporting => SyncState::ReconcilePersist,
            SyncState::ReconcilePersist | SyncState::Done => SyncState::Done,
            SyncState::Failed => SyncState::Failed,
        }
    }
}

/// The unit a non-fatal failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStep {
    TokenCheck,
    Discover,
    DiscoverBatch,
    FetchAnalytics,
    FetchReporting,
    Persist,
    Bookkeeping,
}

impl SyncStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStep::TokenCheck => "token_check",
            SyncStep::Discover => "discover",
            SyncStep::DiscoverBatch => "discover_batch",
            SyncStep::FetchAnalytics => "fetch_analytics",
            SyncStep::FetchReporting => "fetch_reporting",
            SyncStep::Persist => "persist",
            SyncStep::Bookkeeping => "bookkeeping",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step: SyncStep,
    pub message: String,
}

impl StepFailure {
    pub fn new(step: SyncStep, message: impl fmt::Display) -> Self {
        Self {
            step,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step.as_str(), self.message)
    }
}

/// Outcome of one connection's sync, owned exclusively by that connection's task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionReport {
    pub connection_id: i64,
    pub channel_id: String,
    pub final_state: SyncState,
    pub videos_discovered: usize,
    pub videos_updated: usize,
    pub snapshots_created: usize,
    pub counter_regressions: usize,
    pub errors: Vec<String>,
    #[serde(skip)]
    pub failures: Vec<StepFailure>,
}

impl ConnectionReport {
    pub fn new(connection_id: i64, channel_id: impl Into<String>) -> Self {
        Self {
            connection_id,
            channel_id: channel_id.into(),
            final_state: SyncState::TokenCheck,
            videos_discovered: 0,
            videos_updated: 0,
            snapshots_created: 0,
            counter_regressions: 0,
            errors: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn record(&mut self, failure: StepFailure) {
        self.errors.push(failure.to_string());
        self.failures.push(failure);
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed(&self) -> bool {
        self.final_state == SyncState::Failed
    }
}

/// Body returned by the sync triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub success: bool,
    #[serde(
        rename = "connectionsProcessed",
        skip_serializing_if = "Option::is_none"
    )]
    pub connections_processed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<ConnectionReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn completed(results: Vec<ConnectionReport>, elapsed: Duration) -> Self {
        Self {
            success: true,
            connections_processed: Some(results.len()),
            results: Some(results),
            error: None,
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn aborted(error: impl fmt::Display, elapsed: Duration) -> Self {
        Self {
            success: false,
            connections_processed: None,
            results: None,
            error: Some(error.to_string()),
            duration_ms: elapsed.as_millis() as u64,
        }
    }
}

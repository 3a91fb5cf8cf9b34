use serde::{Deserialize, Serialize};

/// Per-video windowed metrics from the Analytics API for one date range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsMetrics {
    pub views: i64,
    pub watch_hours: f64,
    /// Fraction in 0..=1 (the API reports a percentage).
    pub average_view_percentage: f64,
    pub subscribers_gained: i64,
    /// Best-effort only; the Reporting API is authoritative for reach.
    pub impressions: Option<i64>,
    pub ctr: Option<f64>,
}

/// Per-video aggregate of Reporting API rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportingMetrics {
    pub impressions: i64,
    /// Unweighted mean of the per-row CTR values.
    pub ctr: f64,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub subscribers_lost: i64,
}

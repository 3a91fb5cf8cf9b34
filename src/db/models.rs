use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbConnection {
    pub id: i64,
    pub channel_id: String,
    pub channel_title: Option<String>,
    /// Ciphertext; only the credential vault decrypts it.
    #[serde(skip_serializing)]
    pub access_token: String,
    /// Ciphertext; only the credential vault decrypts it.
    #[serde(skip_serializing)]
    pub refresh_token: String,
    pub token_expiry: DateTime<Utc>,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub reporting_job_id: Option<String>,
    pub reporting_job_type: Option<String>,
    pub error: Option<String>,
    pub requires_reauth: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A freshly granted connection; tokens are already encrypted.
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub channel_id: String,
    pub channel_title: Option<String>,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expiry: DateTime<Utc>,
}

/// Token fields written back after a successful refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshedToken {
    pub access_token: String,
    pub token_expiry: DateTime<Utc>,
    pub refreshed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbVideo {
    pub id: i64,
    pub video_id: String,
    pub channel_id: String,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub thumbnail_url: String,
    pub duration_seconds: i64,
    pub video_type: String,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub impressions: Option<i64>,
    pub ctr: Option<f64>,
    pub average_view_percentage: Option<f64>,
    pub watch_hours: Option<f64>,
    pub subscribers_gained: Option<i64>,
    pub engagement_rate: f64,
    pub last_synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbDailySnapshot {
    pub id: i64,
    pub video_id: String,
    pub channel_id: String,
    pub snapshot_date: NaiveDate,
    pub views: Option<i64>,
    pub impressions: Option<i64>,
    pub ctr: Option<f64>,
    pub reach_source: Option<String>,
    pub average_view_percentage: Option<f64>,
    pub watch_hours: Option<f64>,
    pub subscribers_gained: Option<i64>,
    pub subscribers_lost: Option<i64>,
    pub likes: Option<i64>,
    pub comments: Option<i64>,
    pub shares: Option<i64>,
    pub engagement_rate: Option<f64>,
    pub total_view_count: Option<i64>,
    pub total_like_count: Option<i64>,
    pub total_comment_count: Option<i64>,
}

/// Which adapter supplied a snapshot's impressions/CTR pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReachSource {
    Reporting,
    Analytics,
}

impl ReachSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReachSource::Reporting => "reporting",
            ReachSource::Analytics => "analytics",
        }
    }
}

/// Video row as produced by the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoUpsert {
    pub video_id: String,
    pub channel_id: String,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub thumbnail_url: String,
    pub duration_seconds: i64,
    pub video_type: String,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub impressions: Option<i64>,
    pub ctr: Option<f64>,
    pub average_view_percentage: Option<f64>,
    pub watch_hours: Option<f64>,
    pub subscribers_gained: Option<i64>,
    pub engagement_rate: f64,
    pub synced_at: DateTime<Utc>,
}

/// Snapshot row as produced by the reconciliation engine. `None` means
/// "not observed this round" and never overwrites a stored value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotUpsert {
    pub video_id: String,
    pub channel_id: String,
    pub snapshot_date: NaiveDate,
    pub views: Option<i64>,
    pub impressions: Option<i64>,
    pub ctr: Option<f64>,
    pub reach_source: Option<ReachSource>,
    pub average_view_percentage: Option<f64>,
    pub watch_hours: Option<f64>,
    pub subscribers_gained: Option<i64>,
    pub subscribers_lost: Option<i64>,
    pub likes: Option<i64>,
    pub comments: Option<i64>,
    pub shares: Option<i64>,
    pub engagement_rate: Option<f64>,
    pub total_view_count: Option<i64>,
    pub total_like_count: Option<i64>,
    pub total_comment_count: Option<i64>,
}

impl SnapshotUpsert {
    pub fn empty(video_id: &str, channel_id: &str, snapshot_date: NaiveDate) -> Self {
        Self {
            video_id: video_id.to_string(),
            channel_id: channel_id.to_string(),
            snapshot_date,
            views: None,
            impressions: None,
            ctr: None,
            reach_source: None,
            average_view_percentage: None,
            watch_hours: None,
            subscribers_gained: None,
            subscribers_lost: None,
            likes: None,
            comments: None,
            shares: None,
            engagement_rate: None,
            total_view_count: None,
            total_like_count: None,
            total_comment_count: None,
        }
    }
}

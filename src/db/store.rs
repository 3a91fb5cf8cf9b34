use crate::db::models::{
    DbConnection, DbDailySnapshot, DbVideo, RefreshedToken, SnapshotUpsert, VideoUpsert,
};
use crate::error::PulseError;
use chrono::{DateTime, NaiveDate, Utc};
use std::future::Future;

/// Read/upsert contract of the relational backend.
///
/// Every write is keyed by a natural key (connection id, video id,
/// video id + date), so retried or repeated writes converge on the same row.
pub trait SnapshotStore: Send + Sync {
    fn list_active_connections(
        &self,
    ) -> impl Future<Output = Result<Vec<DbConnection>, PulseError>> + Send;

    fn get_connection(
        &self,
        id: i64,
    ) -> impl Future<Output = Result<DbConnection, PulseError>> + Send;

    /// Persist a refreshed access token, clear the error and reactivate.
    fn save_refreshed_token(
        &self,
        id: i64,
        token: &RefreshedToken,
    ) -> impl Future<Output = Result<(), PulseError>> + Send;

    /// Record a token failure without touching any token field.
    fn mark_auth_failure(
        &self,
        id: i64,
        error: &str,
        requires_reauth: bool,
    ) -> impl Future<Output = Result<(), PulseError>> + Send;

    /// Stamp a finished sync attempt; `error == None` clears the stored error.
    fn record_sync_result(
        &self,
        id: i64,
        synced_at: DateTime<Utc>,
        error: Option<&str>,
    ) -> impl Future<Output = Result<(), PulseError>> + Send;

    fn set_reporting_job(
        &self,
        id: i64,
        job_id: &str,
        job_type: &str,
    ) -> impl Future<Output = Result<(), PulseError>> + Send;

    fn videos_for_channel(
        &self,
        channel_id: &str,
    ) -> impl Future<Output = Result<Vec<DbVideo>, PulseError>> + Send;

    fn upsert_video(
        &self,
        video: &VideoUpsert,
    ) -> impl Future<Output = Result<(), PulseError>> + Send;

    fn upsert_snapshot(
        &self,
        snapshot: &SnapshotUpsert,
    ) -> impl Future<Output = Result<(), PulseError>> + Send;

    fn snapshots_for_channel(
        &self,
        channel_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Future<Output = Result<Vec<DbDailySnapshot>, PulseError>> + Send;
}

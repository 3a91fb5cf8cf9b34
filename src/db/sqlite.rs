use crate::db::models::{
    DbConnection, DbDailySnapshot, DbVideo, NewConnection, RefreshedToken, SnapshotUpsert,
    VideoUpsert,
};
use crate::db::schema::SQLITE_INIT;
use crate::db::store::SnapshotStore;
use crate::error::PulseError;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

pub type SqlitePool = Pool<Sqlite>;

const CONNECTION_COLUMNS: &str = r#"id, channel_id, channel_title, access_token, refresh_token,
    token_expiry, last_refreshed_at, last_sync_at, reporting_job_id, reporting_job_type,
    error, requires_reauth, is_active, created_at, updated_at"#;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database at `database_url` and apply the schema.
    pub async fn connect(database_url: &str) -> Result<Self, PulseError> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(connect_opts).await?;
        let store = Self::new(pool);
        store.init_schema().await?;
        Ok(store)
    }

    /// Single-connection in-memory database; the connection is never
    /// recycled, so the data lives as long as the store.
    pub async fn connect_in_memory() -> Result<Self, PulseError> {
        let connect_opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_opts)
            .await?;
        let store = Self::new(pool);
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), PulseError> {
        // sqlx::query runs one statement at a time
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Upsert a connection by its channel id after an OAuth grant. Returns the row id.
    pub async fn upsert_connection(&self, conn: &NewConnection) -> Result<i64, PulseError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO connections (
                channel_id, channel_title, access_token, refresh_token, token_expiry,
                requires_reauth, is_active, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, 0, 1, ?, ?)
            ON CONFLICT(channel_id) DO UPDATE SET
                channel_title=COALESCE(excluded.channel_title, connections.channel_title),
                access_token=excluded.access_token,
                refresh_token=excluded.refresh_token,
                token_expiry=excluded.token_expiry,
                requires_reauth=0,
                is_active=1,
                error=NULL,
                updated_at=excluded.updated_at
            "#,
        )
        .bind(&conn.channel_id)
        .bind(&conn.channel_title)
        .bind(&conn.access_token)
        .bind(&conn.refresh_token)
        .bind(conn.token_expiry)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let rec: (i64,) = sqlx::query_as("SELECT id FROM connections WHERE channel_id = ?")
            .bind(&conn.channel_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(rec.0)
    }

    pub async fn set_active(&self, id: i64, active: bool) -> Result<(), PulseError> {
        sqlx::query("UPDATE connections SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

impl SnapshotStore for SqliteStore {
    async fn list_active_connections(&self) -> Result<Vec<DbConnection>, PulseError> {
        let rows = sqlx::query_as::<_, DbConnection>(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM connections WHERE is_active = 1 ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_connection(&self, id: i64) -> Result<DbConnection, PulseError> {
        sqlx::query_as::<_, DbConnection>(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM connections WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| PulseError::NotFound(format!("connection {id}")))
    }

    async fn save_refreshed_token(
        &self,
        id: i64,
        token: &RefreshedToken,
    ) -> Result<(), PulseError> {
        sqlx::query(
            r#"UPDATE connections SET
                access_token = ?,
                token_expiry = ?,
                last_refreshed_at = ?,
                error = NULL,
                requires_reauth = 0,
                is_active = 1,
                updated_at = ?
              WHERE id = ?"#,
        )
        .bind(&token.access_token)
        .bind(token.token_expiry)
        .bind(token.refreshed_at)
        .bind(token.refreshed_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_auth_failure(
        &self,
        id: i64,
        error: &str,
        requires_reauth: bool,
    ) -> Result<(), PulseError> {
        sqlx::query(
            r#"UPDATE connections SET
                error = ?,
                requires_reauth = ?,
                updated_at = ?
              WHERE id = ?"#,
        )
        .bind(error)
        .bind(requires_reauth)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_sync_result(
        &self,
        id: i64,
        synced_at: DateTime<Utc>,
        error: Option<&str>,
    ) -> Result<(), PulseError> {
        sqlx::query(
            "UPDATE connections SET last_sync_at = ?, error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(synced_at)
        .bind(error)
        .bind(synced_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_reporting_job(
        &self,
        id: i64,
        job_id: &str,
        job_type: &str,
    ) -> Result<(), PulseError> {
        sqlx::query(
            r#"UPDATE connections SET
                reporting_job_id = ?,
                reporting_job_type = ?,
                updated_at = ?
              WHERE id = ?"#,
        )
        .bind(job_id)
        .bind(job_type)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn videos_for_channel(&self, channel_id: &str) -> Result<Vec<DbVideo>, PulseError> {
        let rows = sqlx::query_as::<_, DbVideo>(
            r#"SELECT id, video_id, channel_id, title, published_at, thumbnail_url,
               duration_seconds, video_type, view_count, like_count, comment_count,
               impressions, ctr, average_view_percentage, watch_hours, subscribers_gained,
               engagement_rate, last_synced_at
               FROM videos WHERE channel_id = ? ORDER BY published_at DESC, video_id"#,
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Window metrics only overwrite on a present value; cumulative counters
    /// keep the larger of stored and incoming.
    async fn upsert_video(&self, video: &VideoUpsert) -> Result<(), PulseError> {
        sqlx::query(
            r#"
            INSERT INTO videos (
                video_id, channel_id, title, published_at, thumbnail_url,
                duration_seconds, video_type, view_count, like_count, comment_count,
                impressions, ctr, average_view_percentage, watch_hours, subscribers_gained,
                engagement_rate, last_synced_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(video_id) DO UPDATE SET
                channel_id=excluded.channel_id,
                title=excluded.title,
                published_at=COALESCE(excluded.published_at, videos.published_at),
                thumbnail_url=excluded.thumbnail_url,
                duration_seconds=excluded.duration_seconds,
                video_type=excluded.video_type,
                view_count=MAX(excluded.view_count, videos.view_count),
                like_count=MAX(excluded.like_count, videos.like_count),
                comment_count=MAX(excluded.comment_count, videos.comment_count),
                impressions=COALESCE(excluded.impressions, videos.impressions),
                ctr=COALESCE(excluded.ctr, videos.ctr),
                average_view_percentage=COALESCE(excluded.average_view_percentage, videos.average_view_percentage),
                watch_hours=COALESCE(excluded.watch_hours, videos.watch_hours),
                subscribers_gained=COALESCE(excluded.subscribers_gained, videos.subscribers_gained),
                engagement_rate=excluded.engagement_rate,
                last_synced_at=excluded.last_synced_at
            "#,
        )
        .bind(&video.video_id)
        .bind(&video.channel_id)
        .bind(&video.title)
        .bind(video.published_at)
        .bind(&video.thumbnail_url)
        .bind(video.duration_seconds)
        .bind(&video.video_type)
        .bind(video.view_count)
        .bind(video.like_count)
        .bind(video.comment_count)
        .bind(video.impressions)
        .bind(video.ctr)
        .bind(video.average_view_percentage)
        .bind(video.watch_hours)
        .bind(video.subscribers_gained)
        .bind(video.engagement_rate)
        .bind(video.synced_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Absent incoming values keep the stored ones. A reporting-sourced
    /// impressions/CTR pair is never replaced by an analytics-sourced one.
    async fn upsert_snapshot(&self, snapshot: &SnapshotUpsert) -> Result<(), PulseError> {
        sqlx::query(
            r#"
            INSERT INTO daily_snapshots (
                video_id, channel_id, snapshot_date, views, impressions, ctr, reach_source,
                average_view_percentage, watch_hours, subscribers_gained, subscribers_lost,
                likes, comments, shares, engagement_rate,
                total_view_count, total_like_count, total_comment_count
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(video_id, snapshot_date) DO UPDATE SET
                views=COALESCE(excluded.views, daily_snapshots.views),
                impressions=CASE
                    WHEN excluded.reach_source IS NULL THEN daily_snapshots.impressions
                    WHEN daily_snapshots.reach_source = 'reporting'
                         AND excluded.reach_source <> 'reporting' THEN daily_snapshots.impressions
                    ELSE excluded.impressions END,
                ctr=CASE
                    WHEN excluded.reach_source IS NULL THEN daily_snapshots.ctr
                    WHEN daily_snapshots.reach_source = 'reporting'
                         AND excluded.reach_source <> 'reporting' THEN daily_snapshots.ctr
                    ELSE excluded.ctr END,
                reach_source=CASE
                    WHEN excluded.reach_source IS NULL THEN daily_snapshots.reach_source
                    WHEN daily_snapshots.reach_source = 'reporting'
                         AND excluded.reach_source <> 'reporting' THEN daily_snapshots.reach_source
                    ELSE excluded.reach_source END,
                average_view_percentage=COALESCE(excluded.average_view_percentage, daily_snapshots.average_view_percentage),
                watch_hours=COALESCE(excluded.watch_hours, daily_snapshots.watch_hours),
                subscribers_gained=COALESCE(excluded.subscribers_gained, daily_snapshots.subscribers_gained),
                subscribers_lost=COALESCE(excluded.subscribers_lost, daily_snapshots.subscribers_lost),
                likes=COALESCE(excluded.likes, daily_snapshots.likes),
                comments=COALESCE(excluded.comments, daily_snapshots.comments),
                shares=COALESCE(excluded.shares, daily_snapshots.shares),
                engagement_rate=CASE
                    WHEN COALESCE(excluded.likes, daily_snapshots.likes) IS NULL
                         OR COALESCE(excluded.comments, daily_snapshots.comments) IS NULL
                         OR COALESCE(excluded.views, daily_snapshots.views) IS NULL
                        THEN COALESCE(excluded.engagement_rate, daily_snapshots.engagement_rate)
                    WHEN COALESCE(excluded.views, daily_snapshots.views) <= 0 THEN 0.0
                    ELSE CAST(COALESCE(excluded.likes, daily_snapshots.likes)
                              + COALESCE(excluded.comments, daily_snapshots.comments) AS REAL)
                         / COALESCE(excluded.views, daily_snapshots.views) END,
                total_view_count=MAX(
                    COALESCE(excluded.total_view_count, daily_snapshots.total_view_count),
                    COALESCE(daily_snapshots.total_view_count, excluded.total_view_count)),
                total_like_count=MAX(
                    COALESCE(excluded.total_like_count, daily_snapshots.total_like_count),
                    COALESCE(daily_snapshots.total_like_count, excluded.total_like_count)),
                total_comment_count=MAX(
                    COALESCE(excluded.total_comment_count, daily_snapshots.total_comment_count),
                    COALESCE(daily_snapshots.total_comment_count, excluded.total_comment_count))
            "#,
        )
        .bind(&snapshot.video_id)
        .bind(&snapshot.channel_id)
        .bind(snapshot.snapshot_date)
        .bind(snapshot.views)
        .bind(snapshot.impressions)
        .bind(snapshot.ctr)
        .bind(snapshot.reach_source.map(|s| s.as_str()))
        .bind(snapshot.average_view_percentage)
        .bind(snapshot.watch_hours)
        .bind(snapshot.subscribers_gained)
        .bind(snapshot.subscribers_lost)
        .bind(snapshot.likes)
        .bind(snapshot.comments)
        .bind(snapshot.shares)
        .bind(snapshot.engagement_rate)
        .bind(snapshot.total_view_count)
        .bind(snapshot.total_like_count)
        .bind(snapshot.total_comment_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn snapshots_for_channel(
        &self,
        channel_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DbDailySnapshot>, PulseError> {
        let rows = sqlx::query_as::<_, DbDailySnapshot>(
            r#"SELECT id, video_id, channel_id, snapshot_date, views, impressions, ctr,
               reach_source, average_view_percentage, watch_hours, subscribers_gained,
               subscribers_lost, likes, comments, shares, engagement_rate,
               total_view_count, total_like_count, total_comment_count
               FROM daily_snapshots
               WHERE channel_id = ? AND snapshot_date >= ? AND snapshot_date <= ?
               ORDER BY video_id, snapshot_date"#,
        )
        .bind(channel_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::ReachSource;
    use chrono::Duration;

    fn new_connection(channel: &str) -> NewConnection {
        NewConnection {
            channel_id: channel.to_string(),
            channel_title: Some("Test channel".to_string()),
            access_token: "enc-access".to_string(),
            refresh_token: "enc-refresh".to_string(),
            token_expiry: Utc::now() + Duration::hours(1),
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    #[tokio::test]
    async fn connection_upsert_is_keyed_by_channel() {
        let store = SqliteStore::connect_in_memory().await.unwrap();
        let a = store.upsert_connection(&new_connection("UC1")).await.unwrap();
        let b = store.upsert_connection(&new_connection("UC1")).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.list_active_connections().await.unwrap().len(), 1);

        store.set_active(a, false).await.unwrap();
        assert!(store.list_active_connections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn auth_failure_keeps_token_fields() {
        let store = SqliteStore::connect_in_memory().await.unwrap();
        let id = store.upsert_connection(&new_connection("UC1")).await.unwrap();
        let before = store.get_connection(id).await.unwrap();

        store
            .mark_auth_failure(id, "Token has been expired or revoked.", true)
            .await
            .unwrap();
        let after = store.get_connection(id).await.unwrap();
        assert_eq!(after.access_token, before.access_token);
        assert_eq!(after.refresh_token, before.refresh_token);
        assert_eq!(after.token_expiry, before.token_expiry);
        assert!(after.requires_reauth);
        assert_eq!(
            after.error.as_deref(),
            Some("Token has been expired or revoked.")
        );
    }

    #[tokio::test]
    async fn snapshot_upsert_keeps_known_values_and_reporting_reach() {
        let store = SqliteStore::connect_in_memory().await.unwrap();

        let mut first = SnapshotUpsert::empty("v1", "UC1", day());
        first.views = Some(120);
        first.impressions = Some(150);
        first.ctr = Some(0.03);
        first.reach_source = Some(ReachSource::Reporting);
        first.total_view_count = Some(1000);
        store.upsert_snapshot(&first).await.unwrap();

        let mut second = SnapshotUpsert::empty("v1", "UC1", day());
        second.impressions = Some(100);
        second.ctr = Some(0.02);
        second.reach_source = Some(ReachSource::Analytics);
        second.total_view_count = Some(990);
        store.upsert_snapshot(&second).await.unwrap();

        let rows = store
            .snapshots_for_channel("UC1", day(), day())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.views, Some(120));
        assert_eq!(row.impressions, Some(150));
        assert_eq!(row.ctr, Some(0.03));
        assert_eq!(row.reach_source.as_deref(), Some("reporting"));
        assert_eq!(row.total_view_count, Some(1000));
    }

    #[tokio::test]
    async fn engagement_rate_follows_merged_row() {
        let store = SqliteStore::connect_in_memory().await.unwrap();

        // analytics landed first, no reporting counts yet
        let mut analytics = SnapshotUpsert::empty("v1", "UC1", day());
        analytics.views = Some(90);
        store.upsert_snapshot(&analytics).await.unwrap();

        let mut reporting = SnapshotUpsert::empty("v1", "UC1", day());
        reporting.likes = Some(6);
        reporting.comments = Some(3);
        store.upsert_snapshot(&reporting).await.unwrap();

        let rows = store.snapshots_for_channel("UC1", day(), day()).await.unwrap();
        let rate = rows[0].engagement_rate.unwrap();
        assert!((rate - 0.1).abs() < 1e-12);

        let mut idle = SnapshotUpsert::empty("v2", "UC1", day());
        idle.views = Some(0);
        store.upsert_snapshot(&idle).await.unwrap();
        let mut late = SnapshotUpsert::empty("v2", "UC1", day());
        late.likes = Some(1);
        late.comments = Some(0);
        store.upsert_snapshot(&late).await.unwrap();

        let rows = store.snapshots_for_channel("UC1", day(), day()).await.unwrap();
        let v2 = rows.iter().find(|r| r.video_id == "v2").unwrap();
        assert_eq!(v2.engagement_rate, Some(0.0));
    }
}

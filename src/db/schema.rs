//! SQL DDL for initializing the snapshot store.
//! SQLite-first design; can be adapted for other RDBMS.

/// SQLite schema includes:
/// - `connections` (one OAuth grant per external channel, UNIQUE channel_id)
/// - `videos` (UNIQUE video_id, latest window metrics + cumulative counters)
/// - `daily_snapshots` (UNIQUE (video_id, snapshot_date))
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS connections (
    id INTEGER PRIMARY KEY NOT NULL,
    channel_id TEXT NOT NULL UNIQUE,
    channel_title TEXT NULL,
    access_token TEXT NOT NULL, -- encrypted
    refresh_token TEXT NOT NULL, -- encrypted
    token_expiry TEXT NOT NULL, -- RFC3339
    last_refreshed_at TEXT NULL,
    last_sync_at TEXT NULL,
    reporting_job_id TEXT NULL,
    reporting_job_type TEXT NULL,
    error TEXT NULL,
    requires_reauth INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_connections_active ON connections(is_active);

CREATE TABLE IF NOT EXISTS videos (
    id INTEGER PRIMARY KEY NOT NULL,
    video_id TEXT NOT NULL UNIQUE,
    channel_id TEXT NOT NULL,
    title TEXT NOT NULL,
    published_at TEXT NULL,
    thumbnail_url TEXT NOT NULL,
    duration_seconds INTEGER NOT NULL DEFAULT 0,
    video_type TEXT NOT NULL,
    view_count INTEGER NOT NULL DEFAULT 0,
    like_count INTEGER NOT NULL DEFAULT 0,
    comment_count INTEGER NOT NULL DEFAULT 0,
    impressions INTEGER NULL,
    ctr REAL NULL,
    average_view_percentage REAL NULL,
    watch_hours REAL NULL,
    subscribers_gained INTEGER NULL,
    engagement_rate REAL NOT NULL DEFAULT 0,
    last_synced_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_videos_channel ON videos(channel_id);

CREATE TABLE IF NOT EXISTS daily_snapshots (
    id INTEGER PRIMARY KEY NOT NULL,
    video_id TEXT NOT NULL,
    channel_id TEXT NOT NULL,
    snapshot_date TEXT NOT NULL, -- YYYY-MM-DD
    views INTEGER NULL,
    impressions INTEGER NULL,
    ctr REAL NULL,
    reach_source TEXT NULL, -- 'reporting' | 'analytics'
    average_view_percentage REAL NULL,
    watch_hours REAL NULL,
    subscribers_gained INTEGER NULL,
    subscribers_lost INTEGER NULL,
    likes INTEGER NULL,
    comments INTEGER NULL,
    shares INTEGER NULL,
    engagement_rate REAL NULL,
    total_view_count INTEGER NULL,
    total_like_count INTEGER NULL,
    total_comment_count INTEGER NULL,
    UNIQUE(video_id, snapshot_date)
);

CREATE INDEX IF NOT EXISTS idx_daily_snapshots_channel_date ON daily_snapshots(channel_id, snapshot_date);
"#;

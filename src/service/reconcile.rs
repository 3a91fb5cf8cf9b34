//! Field-by-field merge of the three sources into one video row and one
//! daily snapshot row.
//!
//! Priority per field:
//!
//! | field                                       | source                                    |
//! |---------------------------------------------|-------------------------------------------|
//! | impressions, ctr                            | Reporting (impressions > 0), else Analytics |
//! | views, watch hours, avg view %, subs gained | Analytics                                 |
//! | likes, comments, shares, subs lost          | Reporting                                 |
//! | cumulative view/like/comment totals         | Data API, never lower than stored         |

use crate::db::{DbVideo, ReachSource, SnapshotUpsert, VideoUpsert};
use crate::types::{AnalyticsMetrics, DiscoveredVideo, ReportingMetrics};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, warn};

/// What one source said about one video this round.
#[derive(Debug, PartialEq)]
pub enum Observation<'a, T> {
    /// The source answered and has a row for the video.
    Present(&'a T),
    /// The source answered without a row for the video.
    Missing,
    /// The source could not be queried this round.
    Unavailable,
}

impl<T> Clone for Observation<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Observation<'_, T> {}

impl<'a, T> Observation<'a, T> {
    pub fn from_lookup(fetched: bool, value: Option<&'a T>) -> Self {
        match (fetched, value) {
            (_, Some(v)) => Observation::Present(v),
            (true, None) => Observation::Missing,
            (false, None) => Observation::Unavailable,
        }
    }

    pub fn present(&self) -> Option<&'a T> {
        match self {
            Observation::Present(v) => Some(v),
            _ => None,
        }
    }
}

/// Everything known about one video for one day.
#[derive(Debug, Clone, Copy)]
pub struct MergeInput<'a> {
    pub channel_id: &'a str,
    pub day: NaiveDate,
    pub synced_at: DateTime<Utc>,
    pub stored: Option<&'a DbVideo>,
    pub discovered: Option<&'a DiscoveredVideo>,
    pub analytics: Observation<'a, AnalyticsMetrics>,
    pub reporting: Observation<'a, ReportingMetrics>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub video: Option<VideoUpsert>,
    pub snapshot: Option<SnapshotUpsert>,
    /// A cumulative counter came back lower than the stored one.
    pub counter_regression: bool,
}

impl Reconciled {
    fn nothing() -> Self {
        Self {
            video: None,
            snapshot: None,
            counter_regression: false,
        }
    }
}

/// Impressions/CTR pair and where it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reach {
    pub impressions: i64,
    pub ctr: f64,
    pub source: ReachSource,
}

pub fn pick_reach(
    reporting: Option<&ReportingMetrics>,
    analytics: Option<&AnalyticsMetrics>,
) -> Option<Reach> {
    if let Some(r) = reporting.filter(|r| r.impressions > 0) {
        return Some(Reach {
            impressions: r.impressions,
            ctr: r.ctr,
            source: ReachSource::Reporting,
        });
    }
    let a = analytics?;
    Some(Reach {
        impressions: a.impressions?,
        ctr: a.ctr?,
        source: ReachSource::Analytics,
    })
}

/// Window metrics taken from the Analytics API.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Window {
    views: Option<i64>,
    watch_hours: Option<f64>,
    average_view_percentage: Option<f64>,
    subscribers_gained: Option<i64>,
}

fn window(analytics: Observation<'_, AnalyticsMetrics>) -> Window {
    match analytics {
        Observation::Present(a) => Window {
            views: Some(a.views),
            watch_hours: Some(a.watch_hours),
            average_view_percentage: Some(a.average_view_percentage),
            subscribers_gained: Some(a.subscribers_gained),
        },
        // no activity in the window; retention has no meaning without views
        Observation::Missing => Window {
            views: Some(0),
            watch_hours: Some(0.0),
            average_view_percentage: None,
            subscribers_gained: Some(0),
        },
        Observation::Unavailable => Window::default(),
    }
}

/// `max(stored, incoming)`, flagging a regression when the incoming value is lower.
pub fn monotonic(stored: Option<i64>, incoming: i64) -> (i64, bool) {
    match stored {
        Some(prev) if incoming < prev => (prev, true),
        _ => (incoming, false),
    }
}

/// `(likes + comments) / views`, 0 when there are no views.
pub fn engagement_rate(likes: i64, comments: i64, views: i64) -> f64 {
    if views <= 0 {
        return 0.0;
    }
    (likes + comments) as f64 / views as f64
}

struct Totals {
    views: i64,
    likes: i64,
    comments: i64,
    regression: bool,
}

fn cumulative_totals(stored: Option<&DbVideo>, discovered: &DiscoveredVideo) -> Totals {
    let (views, v_reg) = monotonic(stored.map(|s| s.view_count), discovered.view_count);
    let (likes, l_reg) = monotonic(stored.map(|s| s.like_count), discovered.like_count);
    let (comments, c_reg) = monotonic(stored.map(|s| s.comment_count), discovered.comment_count);
    Totals {
        views,
        likes,
        comments,
        regression: v_reg || l_reg || c_reg,
    }
}

/// Merge one video's observations. A video the Data API did not return this
/// round is only touched when Analytics or Reporting has a row for it, and
/// a video seen nowhere but Reporting (unknown to the store) is skipped.
pub fn reconcile(input: &MergeInput<'_>) -> Reconciled {
    let analytics = input.analytics.present();
    let reporting = input.reporting.present();
    if input.discovered.is_none() && analytics.is_none() && reporting.is_none() {
        return Reconciled::nothing();
    }

    let (video_id, title, published_at, thumbnail_url, duration_seconds, video_type) =
        match (input.discovered, input.stored) {
            (Some(d), _) => (
                d.video_id.as_str(),
                d.title.as_str(),
                d.published_at,
                d.thumbnail_url.as_str(),
                d.duration_seconds,
                d.video_type.as_str(),
            ),
            (None, Some(s)) => (
                s.video_id.as_str(),
                s.title.as_str(),
                s.published_at,
                s.thumbnail_url.as_str(),
                s.duration_seconds,
                s.video_type.as_str(),
            ),
            (None, None) => {
                debug!(channel_id = input.channel_id, "row for unknown video skipped");
                return Reconciled::nothing();
            }
        };

    let totals = input.discovered.map(|d| cumulative_totals(input.stored, d));
    let counter_regression = totals.as_ref().is_some_and(|t| t.regression);
    if counter_regression
        && let (Some(stored), Some(d)) = (input.stored, input.discovered)
    {
        warn!(
            video_id,
            stored_views = stored.view_count,
            incoming_views = d.view_count,
            stored_likes = stored.like_count,
            incoming_likes = d.like_count,
            stored_comments = stored.comment_count,
            incoming_comments = d.comment_count,
            "cumulative counter regressed, keeping the higher value"
        );
    }

    let (view_count, like_count, comment_count) = match (&totals, input.stored) {
        (Some(t), _) => (t.views, t.likes, t.comments),
        (None, Some(s)) => (s.view_count, s.like_count, s.comment_count),
        (None, None) => (0, 0, 0),
    };

    let reach = pick_reach(reporting, analytics);
    let win = window(input.analytics);
    debug!(
        video_id,
        reach_source = reach.map(|r| r.source.as_str()).unwrap_or("none"),
        analytics = analytics.is_some(),
        reporting = reporting.is_some(),
        "merged video"
    );

    let video = VideoUpsert {
        video_id: video_id.to_string(),
        channel_id: input.channel_id.to_string(),
        title: title.to_string(),
        published_at,
        thumbnail_url: thumbnail_url.to_string(),
        duration_seconds,
        video_type: video_type.to_string(),
        view_count,
        like_count,
        comment_count,
        impressions: reach.map(|r| r.impressions),
        ctr: reach.map(|r| r.ctr),
        average_view_percentage: win.average_view_percentage,
        watch_hours: win.watch_hours,
        subscribers_gained: win.subscribers_gained,
        engagement_rate: engagement_rate(like_count, comment_count, view_count),
        synced_at: input.synced_at,
    };

    let mut snapshot = SnapshotUpsert::empty(video_id, input.channel_id, input.day);
    snapshot.views = win.views;
    snapshot.watch_hours = win.watch_hours;
    snapshot.average_view_percentage = win.average_view_percentage;
    snapshot.subscribers_gained = win.subscribers_gained;
    if let Some(r) = reach {
        snapshot.impressions = Some(r.impressions);
        snapshot.ctr = Some(r.ctr);
        snapshot.reach_source = Some(r.source);
    }
    if let Some(r) = reporting {
        snapshot.likes = Some(r.likes);
        snapshot.comments = Some(r.comments);
        snapshot.shares = Some(r.shares);
        snapshot.subscribers_lost = Some(r.subscribers_lost);
    }
    snapshot.engagement_rate = match (snapshot.likes, snapshot.comments, snapshot.views) {
        (Some(l), Some(c), Some(v)) => Some(engagement_rate(l, c, v)),
        _ => None,
    };
    if let Some(t) = &totals {
        snapshot.total_view_count = Some(t.views);
        snapshot.total_like_count = Some(t.likes);
        snapshot.total_comment_count = Some(t.comments);
    }

    Reconciled {
        video: Some(video),
        snapshot: Some(snapshot),
        counter_regression,
    }
}

/// Snapshot carrying only Reporting-owned fields, for backfilling days that
/// were synced before their report arrived. The store recomputes the
/// engagement rate against the views already on the row.
pub fn reporting_snapshot(
    video_id: &str,
    channel_id: &str,
    day: NaiveDate,
    reporting: &ReportingMetrics,
) -> SnapshotUpsert {
    let mut snapshot = SnapshotUpsert::empty(video_id, channel_id, day);
    if let Some(r) = pick_reach(Some(reporting), None) {
        snapshot.impressions = Some(r.impressions);
        snapshot.ctr = Some(r.ctr);
        snapshot.reach_source = Some(r.source);
    }
    snapshot.likes = Some(reporting.likes);
    snapshot.comments = Some(reporting.comments);
    snapshot.shares = Some(reporting.shares);
    snapshot.subscribers_lost = Some(reporting.subscribers_lost);
    snapshot
}

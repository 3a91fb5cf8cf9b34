//! Read-side metrics derived from stored snapshots for the dashboard funnel.
//! Nothing here is persisted.

use crate::db::{DbDailySnapshot, DbVideo};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

/// Retention at which a viewer counts as fully engaged.
pub const ENGAGEMENT_THRESHOLD: f64 = 0.50;

/// Expected retention for videos whose duration falls in
/// `[min_seconds, max_seconds)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RetentionBucket {
    pub min_seconds: i64,
    pub max_seconds: Option<i64>,
    pub expected_retention: f64,
}

const fn bucket(min_seconds: i64, max_seconds: Option<i64>, expected_retention: f64) -> RetentionBucket {
    RetentionBucket {
        min_seconds,
        max_seconds,
        expected_retention,
    }
}

/// Diagnostic labels are computed against this table; changing a value
/// changes every historical comparison.
pub const RETENTION_BENCHMARKS: [RetentionBucket; 8] = [
    bucket(0, Some(60), 0.70),
    bucket(60, Some(180), 0.55),
    bucket(180, Some(300), 0.50),
    bucket(300, Some(600), 0.45),
    bucket(600, Some(1200), 0.40),
    bucket(1200, Some(1800), 0.35),
    bucket(1800, Some(3600), 0.30),
    bucket(3600, None, 0.25),
];

pub fn benchmark_for(duration_seconds: i64) -> RetentionBucket {
    let d = duration_seconds.max(0);
    RETENTION_BENCHMARKS
        .iter()
        .copied()
        .find(|b| d >= b.min_seconds && b.max_seconds.is_none_or(|max| d < max))
        .unwrap_or(RETENTION_BENCHMARKS[RETENTION_BENCHMARKS.len() - 1])
}

pub fn expected_retention(duration_seconds: i64) -> f64 {
    benchmark_for(duration_seconds).expected_retention
}

/// `Σ w·x / Σ w`; 0 when the total weight is 0.
pub fn weighted_average(pairs: impl IntoIterator<Item = (f64, f64)>) -> f64 {
    let (num, den) = pairs
        .into_iter()
        .filter(|(w, _)| *w > 0.0)
        .fold((0.0, 0.0), |(n, d), (w, x)| (n + w * x, d + w));
    if den > 0.0 { num / den } else { 0.0 }
}

/// CTR across videos, weighted by impressions.
pub fn impression_weighted_ctr(items: impl IntoIterator<Item = (i64, f64)>) -> f64 {
    weighted_average(items.into_iter().map(|(imp, ctr)| (imp as f64, ctr)))
}

/// Average view fraction across videos, weighted by views.
pub fn view_weighted_retention(items: impl IntoIterator<Item = (i64, f64)>) -> f64 {
    weighted_average(items.into_iter().map(|(views, ret)| (views as f64, ret)))
}

/// `views × min(retention / 0.5, 1)`.
pub fn engaged_viewers(views: i64, retention: f64) -> f64 {
    views.max(0) as f64 * (retention.max(0.0) / ENGAGEMENT_THRESHOLD).min(1.0)
}

/// Engaged-viewer estimate over the viewers expected at the duration
/// bucket's benchmark retention. `None` without views.
pub fn engagement_quality_ratio(views: i64, retention: f64, duration_seconds: i64) -> Option<f64> {
    if views <= 0 {
        return None;
    }
    let expected = views as f64 * expected_retention(duration_seconds);
    if expected <= 0.0 {
        return None;
    }
    Some(engaged_viewers(views, retention) / expected)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLabel {
    AboveBenchmark,
    OnBenchmark,
    BelowBenchmark,
}

impl QualityLabel {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 1.10 {
            QualityLabel::AboveBenchmark
        } else if ratio >= 0.90 {
            QualityLabel::OnBenchmark
        } else {
            QualityLabel::BelowBenchmark
        }
    }
}

/// Period growth of a cumulative counter: max minus min of the observed values.
pub fn cumulative_delta(values: impl IntoIterator<Item = i64>) -> i64 {
    let mut iter = values.into_iter();
    let Some(first) = iter.next() else {
        return 0;
    };
    let (min, max) = iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    max - min
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoQuality {
    pub video_id: String,
    pub title: String,
    pub duration_seconds: i64,
    pub video_type: String,
    pub views: i64,
    pub impressions: i64,
    pub ctr: f64,
    pub retention: f64,
    pub engaged_viewers: f64,
    pub expected_retention: f64,
    pub quality_ratio: Option<f64>,
    pub quality: Option<QualityLabel>,
    /// Growth of the all-time view counter over the range.
    pub view_growth: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunnelSummary {
    pub channel_id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub impressions: i64,
    pub ctr: f64,
    pub views: i64,
    pub retention: f64,
    pub engaged_viewers: f64,
    pub engagements: i64,
    pub subscribers_gained: i64,
    pub subscribers_lost: i64,
    pub net_subscribers: i64,
    /// views / impressions
    pub view_rate: f64,
    /// engaged viewers / views
    pub engaged_rate: f64,
    /// subscribers gained / engaged viewers
    pub subscribe_rate: f64,
    pub videos: Vec<VideoQuality>,
}

#[derive(Default)]
struct VideoTally<'a> {
    snapshots: Vec<&'a DbDailySnapshot>,
}

impl VideoTally<'_> {
    fn views(&self) -> i64 {
        self.snapshots.iter().filter_map(|s| s.views).sum()
    }

    fn impressions(&self) -> i64 {
        self.snapshots.iter().filter_map(|s| s.impressions).sum()
    }

    fn reach_pairs(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.snapshots
            .iter()
            .filter_map(|s| Some((s.impressions?, s.ctr?)))
    }

    fn retention_pairs(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.snapshots
            .iter()
            .filter_map(|s| Some((s.views?, s.average_view_percentage?)))
    }
}

/// Funnel for one channel over `[start, end]`, computed from its stored
/// snapshots. Snapshots of videos missing from `videos` are counted in the
/// channel totals but get no quality row.
pub fn funnel_summary(
    channel_id: &str,
    start: NaiveDate,
    end: NaiveDate,
    videos: &[DbVideo],
    snapshots: &[DbDailySnapshot],
) -> FunnelSummary {
    let mut by_video: HashMap<&str, VideoTally<'_>> = HashMap::new();
    for s in snapshots {
        by_video.entry(s.video_id.as_str()).or_default().snapshots.push(s);
    }

    let mut engaged_total = 0.0;
    for tally in by_video.values() {
        let retention = view_weighted_retention(tally.retention_pairs());
        engaged_total += engaged_viewers(tally.views(), retention);
    }

    let mut quality: Vec<VideoQuality> = videos
        .iter()
        .filter_map(|v| {
            let tally = by_video.get(v.video_id.as_str())?;
            let views = tally.views();
            if views <= 0 {
                return None;
            }
            let retention = view_weighted_retention(tally.retention_pairs());
            let quality_ratio = engagement_quality_ratio(views, retention, v.duration_seconds);
            Some(VideoQuality {
                video_id: v.video_id.clone(),
                title: v.title.clone(),
                duration_seconds: v.duration_seconds,
                video_type: v.video_type.clone(),
                views,
                impressions: tally.impressions(),
                ctr: impression_weighted_ctr(tally.reach_pairs()),
                retention,
                engaged_viewers: engaged_viewers(views, retention),
                expected_retention: expected_retention(v.duration_seconds),
                quality_ratio,
                quality: quality_ratio.map(QualityLabel::from_ratio),
                view_growth: cumulative_delta(
                    tally.snapshots.iter().filter_map(|s| s.total_view_count),
                ),
            })
        })
        .collect();
    quality.sort_by(|a, b| b.views.cmp(&a.views).then_with(|| a.video_id.cmp(&b.video_id)));

    let impressions: i64 = snapshots.iter().filter_map(|s| s.impressions).sum();
    let views: i64 = snapshots.iter().filter_map(|s| s.views).sum();
    let engagements: i64 = snapshots
        .iter()
        .map(|s| s.likes.unwrap_or(0) + s.comments.unwrap_or(0))
        .sum();
    let subscribers_gained: i64 = snapshots.iter().filter_map(|s| s.subscribers_gained).sum();
    let subscribers_lost: i64 = snapshots.iter().filter_map(|s| s.subscribers_lost).sum();

    FunnelSummary {
        channel_id: channel_id.to_string(),
        start,
        end,
        impressions,
        ctr: impression_weighted_ctr(
            snapshots
                .iter()
                .filter_map(|s| Some((s.impressions?, s.ctr?))),
        ),
        views,
        retention: view_weighted_retention(
            snapshots
                .iter()
                .filter_map(|s| Some((s.views?, s.average_view_percentage?))),
        ),
        engaged_viewers: engaged_total,
        engagements,
        subscribers_gained,
        subscribers_lost,
        net_subscribers: subscribers_gained - subscribers_lost,
        view_rate: ratio(views as f64, impressions as f64),
        engaged_rate: ratio(engaged_total, views as f64),
        subscribe_rate: ratio(subscribers_gained as f64, engaged_total),
        videos: quality,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn benchmark_buckets_use_inclusive_lower_bounds() {
        assert_eq!(expected_retention(45), 0.70);
        assert_eq!(expected_retention(1500), 0.35);
        assert_eq!(expected_retention(0), 0.70);
        assert_eq!(expected_retention(59), 0.70);
        assert_eq!(expected_retention(60), 0.55);
        assert_eq!(expected_retention(180), 0.50);
        assert_eq!(expected_retention(1199), 0.40);
        assert_eq!(expected_retention(1200), 0.35);
        assert_eq!(expected_retention(1800), 0.30);
        assert_eq!(expected_retention(3600), 0.25);
        assert_eq!(expected_retention(90_000), 0.25);
        assert_eq!(expected_retention(-5), 0.70);
    }

    #[test]
    fn weighted_averages_are_not_simple_means() {
        // simple mean would be 0.06
        let ctr = impression_weighted_ctr([(900, 0.02), (100, 0.10)]);
        assert!((ctr - 0.028).abs() < 1e-12);
        assert_eq!(impression_weighted_ctr([(0, 0.5)]), 0.0);
        assert_eq!(view_weighted_retention(std::iter::empty()), 0.0);
    }

    #[test]
    fn engaged_viewers_caps_at_threshold() {
        assert_eq!(engaged_viewers(1000, 0.25), 500.0);
        assert_eq!(engaged_viewers(1000, 0.50), 1000.0);
        assert_eq!(engaged_viewers(1000, 0.90), 1000.0);
        assert_eq!(engaged_viewers(0, 0.90), 0.0);
    }

    #[test]
    fn quality_ratio_uses_duration_bucket() {
        // 0.84 caps at the threshold: 100 engaged against 70 expected
        let short = engagement_quality_ratio(100, 0.84, 45).unwrap();
        assert!((short - 100.0 / 70.0).abs() < 1e-9);
        assert_eq!(QualityLabel::from_ratio(short), QualityLabel::AboveBenchmark);

        // same retention on a 25 min video: 100 engaged against 35 expected
        let long = engagement_quality_ratio(100, 0.84, 1500).unwrap();
        assert!((long - 100.0 / 35.0).abs() < 1e-9);

        // 0.175 retention → 35 engaged, exactly the bucket expectation
        let on = engagement_quality_ratio(100, 0.175, 1500).unwrap();
        assert!((on - 1.0).abs() < 1e-9);
        assert_eq!(QualityLabel::from_ratio(on), QualityLabel::OnBenchmark);

        let below = engagement_quality_ratio(100, 0.10, 45).unwrap();
        assert!((below - 20.0 / 70.0).abs() < 1e-9);
        assert_eq!(QualityLabel::from_ratio(below), QualityLabel::BelowBenchmark);

        assert_eq!(QualityLabel::from_ratio(0.5), QualityLabel::BelowBenchmark);
        assert_eq!(engagement_quality_ratio(0, 0.5, 45), None);
    }

    #[test]
    fn cumulative_delta_is_max_minus_min() {
        assert_eq!(cumulative_delta([1200, 1000, 1500, 1400]), 500);
        assert_eq!(cumulative_delta([7]), 0);
        assert_eq!(cumulative_delta(Vec::new()), 0);
    }

    fn snap(video_id: &str, day: u32, views: i64, imp: i64, ctr: f64, ret: f64, total: i64) -> DbDailySnapshot {
        DbDailySnapshot {
            id: 0,
            video_id: video_id.into(),
            channel_id: "UC1".into(),
            snapshot_date: NaiveDate::from_ymd_opt(2026, 10, day).unwrap(),
            views: Some(views),
            impressions: Some(imp),
            ctr: Some(ctr),
            reach_source: Some("reporting".into()),
            average_view_percentage: Some(ret),
            watch_hours: None,
            subscribers_gained: Some(1),
            subscribers_lost: Some(0),
            likes: Some(2),
            comments: Some(1),
            shares: None,
            engagement_rate: None,
            total_view_count: Some(total),
            total_like_count: None,
            total_comment_count: None,
        }
    }

    fn video(video_id: &str, duration: i64) -> DbVideo {
        DbVideo {
            id: 0,
            video_id: video_id.into(),
            channel_id: "UC1".into(),
            title: video_id.to_uppercase(),
            published_at: None,
            thumbnail_url: String::new(),
            duration_seconds: duration,
            video_type: if duration <= 180 { "short" } else { "long" }.into(),
            view_count: 0,
            like_count: 0,
            comment_count: 0,
            impressions: None,
            ctr: None,
            average_view_percentage: None,
            watch_hours: None,
            subscribers_gained: None,
            engagement_rate: 0.0,
            last_synced_at: Utc::now(),
        }
    }

    #[test]
    fn funnel_rolls_up_snapshots() {
        let start = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let snapshots = vec![
            snap("a", 16, 100, 1000, 0.05, 0.60, 5000),
            snap("a", 17, 300, 3000, 0.05, 0.20, 5300),
            snap("b", 17, 100, 1000, 0.10, 0.25, 800),
        ];
        let videos = vec![video("a", 45), video("b", 1500)];
        let f = funnel_summary("UC1", start, end, &videos, &snapshots);

        assert_eq!(f.impressions, 5000);
        assert_eq!(f.views, 500);
        assert!((f.ctr - 0.06).abs() < 1e-12);
        assert_eq!(f.engagements, 9);
        assert_eq!(f.net_subscribers, 3);
        assert!((f.view_rate - 0.1).abs() < 1e-12);

        assert_eq!(f.videos.len(), 2);
        let a = &f.videos[0];
        assert_eq!(a.video_id, "a");
        // (100*0.6 + 300*0.2) / 400
        assert!((a.retention - 0.3).abs() < 1e-12);
        assert_eq!(a.view_growth, 300);
        assert_eq!(a.quality, Some(QualityLabel::BelowBenchmark));
        // a: 400 * 0.6, b: 100 * 0.5
        assert!((f.engaged_viewers - 290.0).abs() < 1e-9);
    }
}

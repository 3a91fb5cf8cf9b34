use super::client::YouTubeClient;
use crate::error::PulseError;
use crate::types::AnalyticsMetrics;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

const METRICS: &str = "views,estimatedMinutesWatched,averageViewPercentage,subscribersGained";
/// Rows requested per page (the API maximum for this query shape).
const PAGE_ROWS: usize = 200;
const MAX_PAGES: usize = 5;

/// Per-video rows for one window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowMetrics {
    pub by_video: HashMap<String, AnalyticsMetrics>,
    /// Every row was read. When false a video without a row may still have
    /// had activity, so its absence says nothing.
    pub complete: bool,
}

/// Inclusive calendar date range for an Analytics query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn single_day(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    /// The last complete day; today's numbers are not final yet.
    pub fn yesterday(now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        Self::single_day(today.checked_sub_days(Days::new(1)).unwrap_or(today))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ColumnHeader {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AnalyticsReport {
    #[serde(default)]
    column_headers: Vec<ColumnHeader>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
}

/// Column positions, looked up by header name with the request order as
/// the fallback.
struct Columns {
    video: usize,
    views: usize,
    minutes: usize,
    avg_pct: usize,
    subs: usize,
    impressions: Option<usize>,
    ctr: Option<usize>,
}

impl Columns {
    fn resolve(headers: &[ColumnHeader]) -> Self {
        let find = |name: &str| headers.iter().position(|h| h.name == name);
        Self {
            video: find("video").unwrap_or(0),
            views: find("views").unwrap_or(1),
            minutes: find("estimatedMinutesWatched").unwrap_or(2),
            avg_pct: find("averageViewPercentage").unwrap_or(3),
            subs: find("subscribersGained").unwrap_or(4),
            impressions: find("videoThumbnailImpressions"),
            ctr: find("videoThumbnailImpressionsClickRate"),
        }
    }
}

fn as_f64(row: &[Value], idx: usize) -> Option<f64> {
    row.get(idx).and_then(Value::as_f64)
}

fn as_i64(row: &[Value], idx: usize) -> Option<i64> {
    row.get(idx)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f.round() as i64)))
}

/// Turn positional rows into named per-video metrics.
pub(crate) fn rows_to_metrics(report: AnalyticsReport) -> HashMap<String, AnalyticsMetrics> {
    let cols = Columns::resolve(&report.column_headers);
    let mut out = HashMap::with_capacity(report.rows.len());
    for row in &report.rows {
        let Some(video_id) = row.get(cols.video).and_then(Value::as_str) else {
            continue;
        };
        let minutes = as_f64(row, cols.minutes).unwrap_or(0.0);
        let metrics = AnalyticsMetrics {
            views: as_i64(row, cols.views).unwrap_or(0),
            watch_hours: minutes / 60.0,
            average_view_percentage: as_f64(row, cols.avg_pct).unwrap_or(0.0) / 100.0,
            subscribers_gained: as_i64(row, cols.subs).unwrap_or(0),
            impressions: cols.impressions.and_then(|i| as_i64(row, i)),
            ctr: cols.ctr.and_then(|i| as_f64(row, i)).map(|pct| pct / 100.0),
        };
        out.insert(video_id.to_string(), metrics);
    }
    out
}

/// Per-video windowed metrics for one channel and one date range, paged
/// by `startIndex`. Videos without activity in the window are absent from
/// the map.
pub async fn fetch_video_metrics(
    client: &YouTubeClient,
    access_token: &str,
    channel_id: &str,
    range: DateRange,
) -> Result<WindowMetrics, PulseError> {
    let url = client.analytics_api_base.join("reports")?;
    let mut window = WindowMetrics::default();
    for page in 0..MAX_PAGES {
        let report: AnalyticsReport = client
            .get_json(
                "analytics.reports.query",
                &url,
                access_token,
                &[
                    ("ids", format!("channel=={channel_id}")),
                    ("startDate", range.start.format("%Y-%m-%d").to_string()),
                    ("endDate", range.end.format("%Y-%m-%d").to_string()),
                    ("metrics", METRICS.to_string()),
                    ("dimensions", "video".to_string()),
                    ("sort", "-views".to_string()),
                    ("maxResults", PAGE_ROWS.to_string()),
                    ("startIndex", (page * PAGE_ROWS + 1).to_string()),
                ],
            )
            .await?;
        let rows = report.rows.len();
        window.by_video.extend(rows_to_metrics(report));
        if rows < PAGE_ROWS {
            window.complete = true;
            break;
        }
    }
    if !window.complete {
        warn!(
            channel_id,
            rows = window.by_video.len(),
            "analytics row cap reached, videos without a row left unknown"
        );
    }
    debug!(channel_id, start = %range.start, end = %range.end, videos = window.by_video.len(), "analytics fetched");
    Ok(window)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_rows_become_named_metrics() {
        let raw = r#"{
            "kind": "youtubeAnalytics#resultTable",
            "columnHeaders": [
                {"name": "video", "columnType": "DIMENSION", "dataType": "STRING"},
                {"name": "views", "columnType": "METRIC", "dataType": "INTEGER"},
                {"name": "estimatedMinutesWatched", "columnType": "METRIC", "dataType": "INTEGER"},
                {"name": "averageViewPercentage", "columnType": "METRIC", "dataType": "FLOAT"},
                {"name": "subscribersGained", "columnType": "METRIC", "dataType": "INTEGER"}
            ],
            "rows": [
                ["v1", 300, 90, 42.5, 4],
                ["v2", 10, 0, 0.0, 0]
            ]
        }"#;
        let report: AnalyticsReport = serde_json::from_str(raw).unwrap();
        let metrics = rows_to_metrics(report);

        let v1 = &metrics["v1"];
        assert_eq!(v1.views, 300);
        assert!((v1.watch_hours - 1.5).abs() < 1e-9);
        assert!((v1.average_view_percentage - 0.425).abs() < 1e-9);
        assert_eq!(v1.subscribers_gained, 4);
        assert_eq!(v1.impressions, None);
        assert_eq!(metrics["v2"].views, 10);
    }

    #[test]
    fn no_rows_means_empty_map() {
        let report: AnalyticsReport =
            serde_json::from_str(r#"{"columnHeaders": []}"#).unwrap();
        assert!(rows_to_metrics(report).is_empty());
    }

    #[test]
    fn yesterday_is_a_single_day() {
        let now = "2026-10-18T03:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let range = DateRange::yesterday(now);
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2026, 10, 17).unwrap());
        assert_eq!(range.start, range.end);
    }
}

use super::client::YouTubeClient;
use crate::error::PulseError;
use crate::types::ReportingMetrics;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Upper bound on pages walked for any Reporting list call.
const MAX_LIST_PAGES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportingJob {
    pub id: String,
    pub report_type_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportMeta {
    id: String,
    create_time: DateTime<Utc>,
    download_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportTypeMeta {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobList {
    #[serde(default)]
    jobs: Vec<ReportingJob>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportList {
    #[serde(default)]
    reports: Vec<ReportMeta>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportTypeList {
    #[serde(default)]
    report_types: Vec<ReportTypeMeta>,
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateJob<'a> {
    report_type_id: &'a str,
    name: &'a str,
}

/// A downloaded bulk report file.
#[derive(Debug, Clone)]
pub struct DownloadedReport {
    pub report_id: String,
    pub created_at: DateTime<Utc>,
    pub body: String,
}

impl DownloadedReport {
    /// Rows without a date column are attributed to the report's creation day.
    pub fn rows(&self) -> Result<Vec<ReportRow>, PulseError> {
        parse_report(&self.body, self.created_at.date_naive())
    }
}

/// One CSV row, reduced to the fields the engine merges.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub video_id: String,
    pub date: NaiveDate,
    pub impressions: i64,
    pub ctr: f64,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub subscribers_lost: i64,
}

/// Column positions resolved by case-insensitive name. Column sets differ
/// between report types, so nothing is positional.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct ReportColumns {
    video_id: Option<usize>,
    date: Option<usize>,
    impressions: Option<usize>,
    ctr: Option<usize>,
    likes: Option<usize>,
    comments: Option<usize>,
    shares: Option<usize>,
    subscribers_lost: Option<usize>,
}

impl ReportColumns {
    pub(crate) fn resolve<'a>(headers: impl IntoIterator<Item = &'a str>) -> Self {
        let names: Vec<String> = headers
            .into_iter()
            .map(|h| h.trim().to_ascii_lowercase())
            .collect();
        let find = |pred: &dyn Fn(&str) -> bool| names.iter().position(|n| pred(n.as_str()));

        let ctr = find(&|n| n.contains("click_through_rate") || n.ends_with("_ctr"));
        let impressions = names.iter().enumerate().position(|(i, n)| {
            Some(i) != ctr && (n == "impressions" || n.contains("thumbnail_impressions"))
        });
        Self {
            video_id: find(&|n| n.contains("video_id")),
            date: find(&|n| n == "date"),
            impressions,
            ctr,
            likes: find(&|n| n == "likes"),
            comments: find(&|n| n == "comments"),
            shares: find(&|n| n == "shares"),
            subscribers_lost: find(&|n| n == "subscribers_lost"),
        }
    }
}

fn int_at(record: &csv::StringRecord, idx: Option<usize>) -> i64 {
    let Some(raw) = idx.and_then(|i| record.get(i)).map(str::trim) else {
        return 0;
    };
    raw.parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().map(|f| f.round() as i64))
        .unwrap_or(0)
}

fn float_at(record: &csv::StringRecord, idx: Option<usize>) -> f64 {
    idx.and_then(|i| record.get(i))
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn parse_row_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

/// Parse a comma-separated report with a header row. A file without a video
/// id column yields no rows.
pub fn parse_report(body: &str, fallback_date: NaiveDate) -> Result<Vec<ReportRow>, PulseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(body.as_bytes());
    let cols = ReportColumns::resolve(reader.headers()?.iter());
    let Some(video_col) = cols.video_id else {
        debug!("report has no video id column");
        return Ok(Vec::new());
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let video_id = record.get(video_col).map(str::trim).unwrap_or_default();
        if video_id.is_empty() {
            continue;
        }
        let date = cols
            .date
            .and_then(|i| record.get(i))
            .and_then(parse_row_date)
            .unwrap_or(fallback_date);
        rows.push(ReportRow {
            video_id: video_id.to_string(),
            date,
            impressions: int_at(&record, cols.impressions),
            ctr: float_at(&record, cols.ctr),
            likes: int_at(&record, cols.likes),
            comments: int_at(&record, cols.comments),
            shares: int_at(&record, cols.shares),
            subscribers_lost: int_at(&record, cols.subscribers_lost),
        });
    }
    Ok(rows)
}

/// Running sums for one group; CTR is the plain mean over rows.
#[derive(Default)]
struct Accumulator {
    metrics: ReportingMetrics,
    ctr_sum: f64,
    rows: u32,
}

impl Accumulator {
    fn add(&mut self, row: &ReportRow) {
        self.metrics.impressions += row.impressions;
        self.metrics.likes += row.likes;
        self.metrics.comments += row.comments;
        self.metrics.shares += row.shares;
        self.metrics.subscribers_lost += row.subscribers_lost;
        self.ctr_sum += row.ctr;
        self.rows += 1;
    }

    fn finish(mut self) -> ReportingMetrics {
        if self.rows > 0 {
            self.metrics.ctr = self.ctr_sum / f64::from(self.rows);
        }
        self.metrics
    }
}

fn aggregate<K, F>(rows: &[ReportRow], key: F) -> HashMap<K, ReportingMetrics>
where
    K: std::hash::Hash + Eq,
    F: Fn(&ReportRow) -> K,
{
    let mut groups: HashMap<K, Accumulator> = HashMap::new();
    for row in rows {
        groups.entry(key(row)).or_default().add(row);
    }
    groups.into_iter().map(|(k, acc)| (k, acc.finish())).collect()
}

pub fn aggregate_by_video(rows: &[ReportRow]) -> HashMap<String, ReportingMetrics> {
    aggregate(rows, |r| r.video_id.clone())
}

pub fn aggregate_by_video_and_date(
    rows: &[ReportRow],
) -> HashMap<(String, NaiveDate), ReportingMetrics> {
    aggregate(rows, |r| (r.video_id.clone(), r.date))
}

async fn list_jobs(client: &YouTubeClient, access_token: &str) -> Result<Vec<ReportingJob>, PulseError> {
    let url = client.reporting_api_base.join("jobs")?;
    let mut jobs = Vec::new();
    let mut page_token: Option<String> = None;
    for _ in 0..MAX_LIST_PAGES {
        let mut query = Vec::new();
        if let Some(token) = page_token.take() {
            query.push(("pageToken", token));
        }
        let page: JobList = client
            .get_json("reporting.jobs.list", &url, access_token, &query)
            .await?;
        jobs.extend(page.jobs);
        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }
    Ok(jobs)
}

async fn report_type_offered(
    client: &YouTubeClient,
    access_token: &str,
    report_type: &str,
) -> Result<bool, PulseError> {
    let url = client.reporting_api_base.join("reportTypes")?;
    let mut page_token: Option<String> = None;
    for _ in 0..MAX_LIST_PAGES {
        let mut query = Vec::new();
        if let Some(token) = page_token.take() {
            query.push(("pageToken", token));
        }
        let page: ReportTypeList = client
            .get_json("reporting.reportTypes.list", &url, access_token, &query)
            .await?;
        if page.report_types.iter().any(|t| t.id == report_type) {
            return Ok(true);
        }
        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }
    Ok(false)
}

fn find_job(jobs: Vec<ReportingJob>, report_type: &str) -> Option<ReportingJob> {
    jobs.into_iter().find(|j| j.report_type_id == report_type)
}

/// Find or create the standing job for the configured report type.
///
/// `known_job_id` is trusted as-is. Otherwise existing jobs are checked
/// before creating one, and a concurrent "already exists" answer resolves
/// to the existing job. `None` means the channel does not offer the type.
pub async fn ensure_job(
    client: &YouTubeClient,
    access_token: &str,
    known_job_id: Option<&str>,
) -> Result<Option<ReportingJob>, PulseError> {
    let report_type = client.reporting_type();
    if let Some(id) = known_job_id {
        return Ok(Some(ReportingJob {
            id: id.to_string(),
            report_type_id: report_type.to_string(),
            name: None,
        }));
    }

    if let Some(job) = find_job(list_jobs(client, access_token).await?, report_type) {
        debug!(job_id = %job.id, report_type, "reusing reporting job");
        return Ok(Some(job));
    }

    if !report_type_offered(client, access_token, report_type).await? {
        info!(report_type, "report type not offered for this channel");
        return Ok(None);
    }

    let url = client.reporting_api_base.join("jobs")?;
    let name = format!("yt-pulse {report_type}");
    let body = CreateJob {
        report_type_id: report_type,
        name: &name,
    };
    match client
        .post_json::<_, ReportingJob>("reporting.jobs.create", &url, access_token, &body)
        .await
    {
        Ok(job) => {
            info!(job_id = %job.id, report_type, "reporting job created");
            Ok(Some(job))
        }
        Err(e) if e.is_conflict() => {
            debug!(report_type, "reporting job already exists, listing again");
            Ok(find_job(list_jobs(client, access_token).await?, report_type))
        }
        Err(e) => Err(e),
    }
}

async fn list_reports(
    client: &YouTubeClient,
    access_token: &str,
    job_id: &str,
) -> Result<Vec<ReportMeta>, PulseError> {
    let url = client
        .reporting_api_base
        .join(&format!("jobs/{job_id}/reports"))?;
    let mut reports = Vec::new();
    let mut page_token: Option<String> = None;
    for _ in 0..MAX_LIST_PAGES {
        let mut query = Vec::new();
        if let Some(token) = page_token.take() {
            query.push(("pageToken", token));
        }
        let page: ReportList = client
            .get_json("reporting.reports.list", &url, access_token, &query)
            .await?;
        reports.extend(page.reports);
        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }
    reports.sort_by_key(|r| r.create_time);
    Ok(reports)
}

async fn download(
    client: &YouTubeClient,
    access_token: &str,
    meta: ReportMeta,
) -> Result<DownloadedReport, PulseError> {
    let body = client
        .get_text("reporting.media.download", &meta.download_url, access_token)
        .await?;
    Ok(DownloadedReport {
        report_id: meta.id,
        created_at: meta.create_time,
        body,
    })
}

/// The most recently created report. `None` while the job has produced
/// nothing yet (new jobs take about a day).
pub async fn latest_report(
    client: &YouTubeClient,
    access_token: &str,
    job_id: &str,
) -> Result<Option<DownloadedReport>, PulseError> {
    let Some(meta) = list_reports(client, access_token, job_id).await?.pop() else {
        debug!(job_id, "no reports yet");
        return Ok(None);
    };
    Ok(Some(download(client, access_token, meta).await?))
}

/// Every listed report, oldest first.
pub async fn all_reports(
    client: &YouTubeClient,
    access_token: &str,
    job_id: &str,
) -> Result<Vec<DownloadedReport>, PulseError> {
    let metas = list_reports(client, access_token, job_id).await?;
    let mut out = Vec::with_capacity(metas.len());
    for meta in metas {
        out.push(download(client, access_token, meta).await?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    #[test]
    fn ctr_column_matched_case_insensitively() {
        let cols = ReportColumns::resolve(["Video_ID", "Avg_Click_Through_Rate", "Impressions"]);
        assert_eq!(cols.video_id, Some(0));
        assert_eq!(cols.ctr, Some(1));
        assert_eq!(cols.impressions, Some(2));
    }

    #[test]
    fn ctr_suffix_column_is_not_taken_for_impressions() {
        let cols = ReportColumns::resolve([
            "date",
            "channel_id",
            "video_id",
            "video_thumbnail_impressions",
            "video_thumbnail_impressions_ctr",
        ]);
        assert_eq!(cols.impressions, Some(3));
        assert_eq!(cols.ctr, Some(4));
        assert_eq!(cols.date, Some(0));
    }

    #[test]
    fn parses_rows_and_aggregates_per_video() {
        let body = "date,video_id,video_thumbnail_impressions,video_thumbnail_impressions_ctr,likes\n\
                    20261016,v1,100,0.02,3\n\
                    20261017,v1,50,0.04,1\n\
                    20261017,v2,10,0.10,0\n";
        let rows = parse_report(body, day(18)).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].date, day(16));

        let by_video = aggregate_by_video(&rows);
        let v1 = &by_video["v1"];
        assert_eq!(v1.impressions, 150);
        assert_eq!(v1.likes, 4);
        // plain mean, not impression-weighted
        assert!((v1.ctr - 0.03).abs() < 1e-9);

        let by_day = aggregate_by_video_and_date(&rows);
        assert_eq!(by_day.len(), 3);
        assert_eq!(by_day[&("v1".to_string(), day(17))].impressions, 50);
    }

    #[test]
    fn rows_without_date_use_report_day() {
        let body = "VIDEO_ID,impressions\nv1,7\n";
        let rows = parse_report(body, day(12)).unwrap();
        assert_eq!(rows[0].date, day(12));
        assert_eq!(rows[0].impressions, 7);
    }

    #[test]
    fn report_without_video_column_yields_nothing() {
        let rows = parse_report("date,views\n20261017,5\n", day(17)).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn job_matching_uses_report_type() {
        let jobs = vec![
            ReportingJob {
                id: "j1".into(),
                report_type_id: "channel_basic_a2".into(),
                name: None,
            },
            ReportingJob {
                id: "j2".into(),
                report_type_id: "channel_reach_basic_a1".into(),
                name: None,
            },
        ];
        let job = find_job(jobs, "channel_reach_basic_a1").unwrap();
        assert_eq!(job.id, "j2");
    }
}

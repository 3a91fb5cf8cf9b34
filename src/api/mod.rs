//! YouTube source adapters. Each one fetches and normalizes; none writes
//! to storage.

pub mod analytics_api;
pub mod client;
pub mod data_api;
pub mod reporting_api;

use crate::error::PulseError;
use std::future::Future;

pub use analytics_api::{DateRange, WindowMetrics};
pub use client::{YouTubeClient, build_http_client};
pub use data_api::Discovery;
pub use reporting_api::{DownloadedReport, ReportingJob};

/// The three YouTube sources, as seen by the sync orchestrator.
pub trait YouTubeSource: Send + Sync {
    /// Walk the channel's uploads and fetch details. Per-batch failures are
    /// reported inside `Discovery`, not as an error.
    fn discover_videos(
        &self,
        access_token: &str,
        channel_id: &str,
    ) -> impl Future<Output = Result<Discovery, PulseError>> + Send;

    fn fetch_analytics(
        &self,
        access_token: &str,
        channel_id: &str,
        range: DateRange,
    ) -> impl Future<Output = Result<WindowMetrics, PulseError>> + Send;

    /// Reuse `known_job_id`, else find or create the job for the configured
    /// report type. `None` when the channel does not offer that report type.
    fn ensure_reporting_job(
        &self,
        access_token: &str,
        known_job_id: Option<&str>,
    ) -> impl Future<Output = Result<Option<ReportingJob>, PulseError>> + Send;

    /// Most recently created report, or `None` when none exist yet.
    fn latest_report(
        &self,
        access_token: &str,
        job_id: &str,
    ) -> impl Future<Output = Result<Option<DownloadedReport>, PulseError>> + Send;

    /// Every report currently listed for the job, oldest first.
    fn all_reports(
        &self,
        access_token: &str,
        job_id: &str,
    ) -> impl Future<Output = Result<Vec<DownloadedReport>, PulseError>> + Send;
}

impl YouTubeSource for YouTubeClient {
    async fn discover_videos(
        &self,
        access_token: &str,
        channel_id: &str,
    ) -> Result<Discovery, PulseError> {
        data_api::discover_videos(self, access_token, channel_id).await
    }

    async fn fetch_analytics(
        &self,
        access_token: &str,
        channel_id: &str,
        range: DateRange,
    ) -> Result<WindowMetrics, PulseError> {
        analytics_api::fetch_video_metrics(self, access_token, channel_id, range).await
    }

    async fn ensure_reporting_job(
        &self,
        access_token: &str,
        known_job_id: Option<&str>,
    ) -> Result<Option<ReportingJob>, PulseError> {
        reporting_api::ensure_job(self, access_token, known_job_id).await
    }

    async fn latest_report(
        &self,
        access_token: &str,
        job_id: &str,
    ) -> Result<Option<DownloadedReport>, PulseError> {
        reporting_api::latest_report(self, access_token, job_id).await
    }

    async fn all_reports(
        &self,
        access_token: &str,
        job_id: &str,
    ) -> Result<Vec<DownloadedReport>, PulseError> {
        reporting_api::all_reports(self, access_token, job_id).await
    }
}

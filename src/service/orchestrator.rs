use crate::api::{DateRange, WindowMetrics, YouTubeSource};
use crate::api::reporting_api::{aggregate_by_video, aggregate_by_video_and_date};
use crate::config::Config;
use crate::db::{DbConnection, DbVideo, SnapshotStore};
use crate::error::PulseError;
use crate::google_oauth::AccessTokenProvider;
use crate::service::reconcile::{self, MergeInput, Observation};
use crate::types::{
    ConnectionReport, DiscoveredVideo, ReportingMetrics, RunSummary, StepFailure, SyncState,
    SyncStep,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub connection_batch_size: usize,
    pub inter_batch_delay: Duration,
    pub reporting_type: String,
}

impl OrchestratorSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            connection_batch_size: cfg.connection_batch_size.max(1),
            inter_batch_delay: cfg.inter_batch_delay(),
            reporting_type: cfg.reporting_type.clone(),
        }
    }
}

/// Drives every active connection through
/// `TokenCheck → Discover → FetchAnalytics → FetchReporting → ReconcilePersist → Done`.
///
/// Only a failed token check ends a connection early (`Failed`); every later
/// step degrades to "no data from this source" and is recorded on the report.
pub struct SyncOrchestrator<S, V, Y> {
    store: S,
    vault: V,
    source: Y,
    settings: OrchestratorSettings,
}

/// Per-video inputs gathered before the merge.
struct Fetched {
    discovered: Vec<DiscoveredVideo>,
    analytics: Option<WindowMetrics>,
    reporting: Option<HashMap<String, ReportingMetrics>>,
}

impl<S, V, Y> SyncOrchestrator<S, V, Y>
where
    S: SnapshotStore,
    V: AccessTokenProvider,
    Y: YouTubeSource,
{
    pub fn new(store: S, vault: V, source: Y, settings: OrchestratorSettings) -> Self {
        Self {
            store,
            vault,
            source,
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn source(&self) -> &Y {
        &self.source
    }

    /// Sync every active connection. Connections run in groups of
    /// `connection_batch_size`; a group settles completely before the pause
    /// and the next group. Only failing to list connections aborts the run.
    pub async fn run(&self) -> RunSummary {
        let started = Instant::now();
        let connections = match self.store.list_active_connections().await {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "cannot list connections, sync run aborted");
                return RunSummary::aborted(e, started.elapsed());
            }
        };
        info!(connections = connections.len(), "sync run started");

        let mut results = Vec::with_capacity(connections.len());
        for (batch_no, batch) in connections
            .chunks(self.settings.connection_batch_size.max(1))
            .enumerate()
        {
            if batch_no > 0 && !self.settings.inter_batch_delay.is_zero() {
                tokio::time::sleep(self.settings.inter_batch_delay).await;
            }
            debug!(batch = batch_no, size = batch.len(), "processing connection batch");
            results.extend(join_all(batch.iter().map(|c| self.sync_connection(c))).await);
        }

        let failed = results.iter().filter(|r| r.failed()).count();
        let partial = results
            .iter()
            .filter(|r| !r.failed() && !r.is_clean())
            .count();
        let summary = RunSummary::completed(results, started.elapsed());
        info!(
            connections = summary.connections_processed.unwrap_or_default(),
            failed,
            partial,
            duration_ms = summary.duration_ms,
            "sync run finished"
        );
        summary
    }

    /// One connection, start to finish. Never returns an error: every
    /// failure ends up on the report.
    pub async fn sync_connection(&self, conn: &DbConnection) -> ConnectionReport {
        let now = Utc::now();
        let mut report = ConnectionReport::new(conn.id, conn.channel_id.as_str());

        let Some(token) = self.token_check(conn, &mut report).await else {
            return report;
        };
        report.final_state = report.final_state.next();

        let fetched = self.fetch_sources(conn, &token, now, &mut report).await;
        report.final_state = SyncState::ReconcilePersist;

        self.persist(conn, &fetched, now, &mut report).await;
        report.final_state = report.final_state.next();

        let error = (!report.is_clean()).then(|| report.errors.join("; "));
        if let Err(e) = self
            .store
            .record_sync_result(conn.id, now, error.as_deref())
            .await
        {
            self.step_failed(&mut report, SyncStep::Bookkeeping, e);
        }

        info!(
            connection_id = conn.id,
            channel_id = %conn.channel_id,
            discovered = report.videos_discovered,
            updated = report.videos_updated,
            snapshots = report.snapshots_created,
            regressions = report.counter_regressions,
            errors = report.errors.len(),
            "connection synced"
        );
        report
    }

    /// Load every report the job has produced and merge the Reporting-owned
    /// fields into per-day snapshots of known videos. Analytics and
    /// cumulative fields are left alone.
    pub async fn backfill_connection(&self, connection_id: i64) -> Result<ConnectionReport, PulseError> {
        let conn = self.store.get_connection(connection_id).await?;
        let mut report = ConnectionReport::new(conn.id, conn.channel_id.as_str());

        let Some(token) = self.token_check(&conn, &mut report).await else {
            return Ok(report);
        };
        report.final_state = SyncState::FetchReporting;

        let Some(job_id) = self.reporting_job(&conn, &token, &mut report).await else {
            report.final_state = SyncState::Done;
            return Ok(report);
        };

        let reports = match self.source.all_reports(&token, &job_id).await {
            Ok(r) => r,
            Err(e) => {
                self.step_failed(&mut report, SyncStep::FetchReporting, e);
                report.final_state = SyncState::Done;
                return Ok(report);
            }
        };

        let mut rows = Vec::new();
        for downloaded in &reports {
            match downloaded.rows() {
                Ok(r) => rows.extend(r),
                Err(e) => self.step_failed(
                    &mut report,
                    SyncStep::FetchReporting,
                    format!("report {}: {e}", downloaded.report_id),
                ),
            }
        }
        report.final_state = SyncState::ReconcilePersist;

        let known: HashSet<String> = match self.store.videos_for_channel(&conn.channel_id).await {
            Ok(videos) => videos.into_iter().map(|v| v.video_id).collect(),
            Err(e) => {
                self.step_failed(&mut report, SyncStep::Persist, e);
                report.final_state = SyncState::Done;
                return Ok(report);
            }
        };

        for ((video_id, day), metrics) in aggregate_by_video_and_date(&rows) {
            if !known.contains(&video_id) {
                debug!(connection_id = conn.id, video_id = %video_id, "backfill row for untracked video skipped");
                continue;
            }
            let snapshot = reconcile::reporting_snapshot(&video_id, &conn.channel_id, day, &metrics);
            match self.store.upsert_snapshot(&snapshot).await {
                Ok(()) => report.snapshots_created += 1,
                Err(e) => self.step_failed(
                    &mut report,
                    SyncStep::Persist,
                    format!("snapshot {video_id}@{day}: {e}"),
                ),
            }
        }
        report.final_state = SyncState::Done;

        info!(
            connection_id = conn.id,
            channel_id = %conn.channel_id,
            reports = reports.len(),
            rows = rows.len(),
            snapshots = report.snapshots_created,
            "reporting backfill finished"
        );
        Ok(report)
    }

    async fn token_check(&self, conn: &DbConnection, report: &mut ConnectionReport) -> Option<String> {
        match self.vault.access_token(conn).await {
            Ok(token) => Some(token),
            Err(e) => {
                let message = e.to_string();
                warn!(
                    connection_id = conn.id,
                    channel_id = %conn.channel_id,
                    step = SyncStep::TokenCheck.as_str(),
                    error = %message,
                    "token check failed, skipping connection"
                );
                report.record(StepFailure::new(SyncStep::TokenCheck, &message));
                report.final_state = SyncState::Failed;
                if let Err(db_err) = self
                    .store
                    .mark_auth_failure(conn.id, &message, e.is_auth_rejection())
                    .await
                {
                    warn!(connection_id = conn.id, error = %db_err, "recording token failure failed");
                }
                None
            }
        }
    }

    async fn fetch_sources(
        &self,
        conn: &DbConnection,
        token: &str,
        now: DateTime<Utc>,
        report: &mut ConnectionReport,
    ) -> Fetched {
        let discovered = match self.source.discover_videos(token, &conn.channel_id).await {
            Ok(discovery) => {
                for failure in discovery.batch_failures {
                    report.record(StepFailure::new(SyncStep::DiscoverBatch, failure));
                }
                discovery.videos
            }
            Err(e) => {
                self.step_failed(report, SyncStep::Discover, e);
                Vec::new()
            }
        };
        report.videos_discovered = discovered.len();
        report.final_state = report.final_state.next();

        let range = DateRange::yesterday(now);
        let analytics = match self
            .source
            .fetch_analytics(token, &conn.channel_id, range)
            .await
        {
            Ok(m) => Some(m),
            Err(e) => {
                self.step_failed(report, SyncStep::FetchAnalytics, e);
                None
            }
        };
        report.final_state = report.final_state.next();

        let reporting = self.latest_reporting(conn, token, report).await;

        Fetched {
            discovered,
            analytics,
            reporting,
        }
    }

    /// Job id for the configured report type, creating and recording the job
    /// when the connection has none. `None` when the type is not offered.
    async fn reporting_job(
        &self,
        conn: &DbConnection,
        token: &str,
        report: &mut ConnectionReport,
    ) -> Option<String> {
        let reporting_type = self.settings.reporting_type.as_str();
        let known = conn
            .reporting_job_id
            .as_deref()
            .filter(|_| conn.reporting_job_type.as_deref() == Some(reporting_type));

        let job = match self.source.ensure_reporting_job(token, known).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                info!(connection_id = conn.id, reporting_type, "no reporting job available");
                return None;
            }
            Err(e) => {
                self.step_failed(report, SyncStep::FetchReporting, e);
                return None;
            }
        };

        if known != Some(job.id.as_str())
            && let Err(e) = self
                .store
                .set_reporting_job(conn.id, &job.id, &job.report_type_id)
                .await
        {
            self.step_failed(report, SyncStep::Bookkeeping, e);
        }
        Some(job.id)
    }

    async fn latest_reporting(
        &self,
        conn: &DbConnection,
        token: &str,
        report: &mut ConnectionReport,
    ) -> Option<HashMap<String, ReportingMetrics>> {
        let job_id = self.reporting_job(conn, token, report).await?;
        let downloaded = match self.source.latest_report(token, &job_id).await {
            Ok(Some(r)) => r,
            Ok(None) => {
                debug!(connection_id = conn.id, job_id = %job_id, "reporting job has no reports yet");
                return None;
            }
            Err(e) => {
                self.step_failed(report, SyncStep::FetchReporting, e);
                return None;
            }
        };
        match downloaded.rows() {
            Ok(rows) => Some(aggregate_by_video(&rows)),
            Err(e) => {
                self.step_failed(
                    report,
                    SyncStep::FetchReporting,
                    format!("report {}: {e}", downloaded.report_id),
                );
                None
            }
        }
    }

    async fn persist(
        &self,
        conn: &DbConnection,
        fetched: &Fetched,
        now: DateTime<Utc>,
        report: &mut ConnectionReport,
    ) {
        let stored = match self.store.videos_for_channel(&conn.channel_id).await {
            Ok(v) => v,
            Err(e) => {
                self.step_failed(report, SyncStep::Persist, e);
                Vec::new()
            }
        };
        let stored: HashMap<&str, &DbVideo> =
            stored.iter().map(|v| (v.video_id.as_str(), v)).collect();
        let discovered: HashMap<&str, &DiscoveredVideo> = fetched
            .discovered
            .iter()
            .map(|v| (v.video_id.as_str(), v))
            .collect();

        // discovered first, then stored videos the Data API did not return
        let mut ids: Vec<&str> = fetched.discovered.iter().map(|v| v.video_id.as_str()).collect();
        let mut extra: Vec<&str> = stored
            .keys()
            .copied()
            .filter(|id| !discovered.contains_key(id))
            .collect();
        extra.sort_unstable();
        ids.extend(extra);

        let day = DateRange::yesterday(now).end;
        for video_id in ids {
            let input = MergeInput {
                channel_id: &conn.channel_id,
                day,
                synced_at: now,
                stored: stored.get(video_id).copied(),
                discovered: discovered.get(video_id).copied(),
                // a capped window cannot vouch for the videos it left out
                analytics: Observation::from_lookup(
                    fetched.analytics.as_ref().is_some_and(|w| w.complete),
                    fetched
                        .analytics
                        .as_ref()
                        .and_then(|w| w.by_video.get(video_id)),
                ),
                reporting: Observation::from_lookup(
                    fetched.reporting.is_some(),
                    fetched.reporting.as_ref().and_then(|m| m.get(video_id)),
                ),
            };
            let merged = reconcile::reconcile(&input);
            if merged.counter_regression {
                report.counter_regressions += 1;
            }
            if let Some(video) = &merged.video {
                match self.store.upsert_video(video).await {
                    Ok(()) => report.videos_updated += 1,
                    Err(e) => {
                        self.step_failed(report, SyncStep::Persist, format!("video {video_id}: {e}"));
                        continue;
                    }
                }
            }
            if let Some(snapshot) = &merged.snapshot {
                match self.store.upsert_snapshot(snapshot).await {
                    Ok(()) => report.snapshots_created += 1,
                    Err(e) => self.step_failed(
                        report,
                        SyncStep::Persist,
                        format!("snapshot {video_id}@{day}: {e}"),
                    ),
                }
            }
        }
    }

    fn step_failed(&self, report: &mut ConnectionReport, step: SyncStep, err: impl std::fmt::Display) {
        warn!(
            connection_id = report.connection_id,
            channel_id = %report.channel_id,
            step = step.as_str(),
            error = %err,
            "sync step failed, continuing"
        );
        report.record(StepFailure::new(step, err));
    }
}

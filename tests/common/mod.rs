#![allow(dead_code)]

use axum::{Form, Json, Router, http::StatusCode, response::IntoResponse, routing::post};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use url::Url;

use yt_pulse::PulseError;
use yt_pulse::api::{
    DateRange, Discovery, DownloadedReport, ReportingJob, WindowMetrics, YouTubeSource,
};
use yt_pulse::db::{DbConnection, NewConnection, SqliteStore};
use yt_pulse::google_oauth::{AccessTokenProvider, TokenCipher};
use yt_pulse::service::OrchestratorSettings;
use yt_pulse::types::{AnalyticsMetrics, DiscoveredVideo, VideoType};

pub const REPORT_TYPE: &str = "channel_reach_basic_a1";
pub const REVOKED: &str = "Token has been expired or revoked.";

pub fn cipher() -> TokenCipher {
    TokenCipher::new(&[7u8; 32]).unwrap()
}

pub fn settings(batch: usize) -> OrchestratorSettings {
    OrchestratorSettings {
        connection_batch_size: batch,
        inter_batch_delay: Duration::from_millis(10),
        reporting_type: REPORT_TYPE.to_string(),
    }
}

pub fn yesterday() -> NaiveDate {
    DateRange::yesterday(Utc::now()).end
}

/// Insert an active connection whose access token is already expired.
pub async fn seed_connection(
    store: &SqliteStore,
    cipher: &TokenCipher,
    channel_id: &str,
    refresh_token: &str,
) -> i64 {
    store
        .upsert_connection(&NewConnection {
            channel_id: channel_id.to_string(),
            channel_title: Some(format!("{channel_id} title")),
            access_token: cipher.encrypt("stale-access").unwrap(),
            refresh_token: cipher.encrypt(refresh_token).unwrap(),
            token_expiry: Utc::now() - ChronoDuration::minutes(1),
        })
        .await
        .unwrap()
}

async fn token_endpoint(Form(form): Form<HashMap<String, String>>) -> impl IntoResponse {
    let refresh = form.get("refresh_token").map(String::as_str).unwrap_or("");
    if form.get("grant_type").map(String::as_str) != Some("refresh_token")
        || refresh.starts_with("revoked")
    {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_grant", "error_description": REVOKED})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "access_token": format!("fresh-{refresh}"),
            "expires_in": 3600,
            "token_type": "Bearer"
        })),
    )
}

/// Local stand-in for the OAuth token endpoint. Refresh tokens starting
/// with `revoked` are rejected with `invalid_grant`.
pub async fn spawn_token_server() -> Url {
    let app = Router::new().route("/token", post(token_endpoint));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Url::parse(&format!("http://{addr}/token")).unwrap()
}

/// Hands out a fixed token without touching the store.
pub struct StaticToken;

impl AccessTokenProvider for StaticToken {
    async fn access_token(&self, _conn: &DbConnection) -> Result<String, PulseError> {
        Ok("static-token".to_string())
    }
}

pub fn video_id(channel_id: &str, n: u32) -> String {
    format!("{channel_id}-v{n}")
}

/// Two videos per channel: `v1` (45s short, active yesterday) and `v2`
/// (25 min, no analytics row). Reporting covers `v1` of every channel.
pub struct FakeSource {
    pub views: AtomicI64,
    pub fail_analytics: bool,
    /// Analytics answers but says its row cap was hit.
    pub capped_analytics: bool,
    /// Discovery reports one skipped detail batch.
    pub failed_batch: bool,
    /// The reporting job exists but has produced nothing yet.
    pub no_reports: bool,
    pub job_creations: AtomicUsize,
}

impl FakeSource {
    pub fn new(views: i64) -> Self {
        Self {
            views: AtomicI64::new(views),
            fail_analytics: false,
            capped_analytics: false,
            failed_batch: false,
            no_reports: false,
            job_creations: AtomicUsize::new(0),
        }
    }

    pub fn failing_analytics(views: i64) -> Self {
        Self {
            fail_analytics: true,
            ..Self::new(views)
        }
    }

    fn video(channel_id: &str, n: u32, duration_seconds: i64, views: i64) -> DiscoveredVideo {
        let id = video_id(channel_id, n);
        DiscoveredVideo {
            thumbnail_url: format!("https://i.ytimg.com/vi/{id}/mqdefault.jpg"),
            video_id: id,
            title: format!("Video {n}"),
            published_at: None,
            view_count: views,
            like_count: views / 10,
            comment_count: views / 20,
            duration_seconds,
            video_type: VideoType::from_duration(duration_seconds),
        }
    }

    fn report(created_at: DateTime<Utc>, body: String) -> DownloadedReport {
        DownloadedReport {
            report_id: format!("r-{}", created_at.timestamp()),
            created_at,
            body,
        }
    }
}

fn reach_csv(days: &[&str]) -> String {
    let mut body = String::from(
        "date,channel_id,video_id,video_thumbnail_impressions,video_thumbnail_impressions_ctr,likes,comments,shares,subscribers_lost\n",
    );
    for day in days {
        for channel in ["UC1", "UC2", "UC3"] {
            body.push_str(&format!(
                "{day},{channel},{},150,0.03,6,3,2,1\n",
                video_id(channel, 1)
            ));
        }
    }
    body
}

impl YouTubeSource for FakeSource {
    async fn discover_videos(
        &self,
        _access_token: &str,
        channel_id: &str,
    ) -> Result<Discovery, PulseError> {
        let views = self.views.load(Ordering::SeqCst);
        Ok(Discovery {
            videos: vec![
                Self::video(channel_id, 1, 45, views),
                Self::video(channel_id, 2, 1500, views * 2),
            ],
            batch_failures: if self.failed_batch {
                vec!["video batch 1: Google API error 400: Invalid id".to_string()]
            } else {
                Vec::new()
            },
        })
    }

    async fn fetch_analytics(
        &self,
        _access_token: &str,
        channel_id: &str,
        _range: DateRange,
    ) -> Result<WindowMetrics, PulseError> {
        if self.fail_analytics {
            return Err(PulseError::GoogleApi {
                code: 503,
                message: "The service is currently unavailable.".to_string(),
            });
        }
        let mut out = HashMap::new();
        out.insert(
            video_id(channel_id, 1),
            AnalyticsMetrics {
                views: 80,
                watch_hours: 0.5,
                average_view_percentage: 0.6,
                subscribers_gained: 2,
                impressions: Some(100),
                ctr: Some(0.02),
            },
        );
        Ok(WindowMetrics {
            by_video: out,
            complete: !self.capped_analytics,
        })
    }

    async fn ensure_reporting_job(
        &self,
        _access_token: &str,
        known_job_id: Option<&str>,
    ) -> Result<Option<ReportingJob>, PulseError> {
        let id = match known_job_id {
            Some(id) => id.to_string(),
            None => {
                self.job_creations.fetch_add(1, Ordering::SeqCst);
                "job-reach".to_string()
            }
        };
        Ok(Some(ReportingJob {
            id,
            report_type_id: REPORT_TYPE.to_string(),
            name: None,
        }))
    }

    async fn latest_report(
        &self,
        _access_token: &str,
        _job_id: &str,
    ) -> Result<Option<DownloadedReport>, PulseError> {
        if self.no_reports {
            return Ok(None);
        }
        let day = yesterday().format("%Y%m%d").to_string();
        Ok(Some(Self::report(Utc::now(), reach_csv(&[&day]))))
    }

    async fn all_reports(
        &self,
        _access_token: &str,
        _job_id: &str,
    ) -> Result<Vec<DownloadedReport>, PulseError> {
        let older = (yesterday() - ChronoDuration::days(2)).format("%Y%m%d").to_string();
        let newer = (yesterday() - ChronoDuration::days(1)).format("%Y%m%d").to_string();
        let now = Utc::now();
        Ok(vec![
            Self::report(now - ChronoDuration::days(1), reach_csv(&[&older])),
            Self::report(now, reach_csv(&[&newer])),
        ])
    }
}

use crate::error::PulseError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const YOUTUBE_DATA_API: &str = "https://www.googleapis.com/youtube/v3/";
pub const YOUTUBE_ANALYTICS_API: &str = "https://youtubeanalytics.googleapis.com/v2/";
pub const YOUTUBE_REPORTING_API: &str = "https://youtubereporting.googleapis.com/v1/";

/// Runtime configuration. Defaults, then `config.toml`, then `PULSE_*` env vars.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_url: String,
    pub listen_addr: String,
    pub loglevel: String,
    /// Key accepted by the dashboard-facing routes (manual sync, funnel).
    pub pulse_key: String,
    /// Shared secret presented by the daily scheduler.
    pub cron_secret: Option<String>,
    /// Base64 of the 32-byte AES-256-GCM key used for tokens at rest.
    pub encryption_key: Option<String>,
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub proxy: Option<Url>,

    pub token_skew_secs: u64,
    pub max_upload_items: usize,
    pub max_upload_pages: usize,
    pub video_batch_size: usize,
    pub connection_batch_size: usize,
    pub inter_batch_delay_ms: u64,
    pub api_requests_per_second: u32,
    pub reporting_type: String,

    pub token_uri: Url,
    pub data_api_base: Url,
    pub analytics_api_base: Url,
    pub reporting_api_base: Url,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://yt-pulse.sqlite".to_string(),
            listen_addr: "0.0.0.0:8000".to_string(),
            loglevel: "info".to_string(),
            pulse_key: "pwd".to_string(),
            cron_secret: None,
            encryption_key: None,
            google_client_id: None,
            google_client_secret: None,
            proxy: None,
            token_skew_secs: 300,
            max_upload_items: 200,
            max_upload_pages: 4,
            video_batch_size: 50,
            connection_batch_size: 5,
            inter_batch_delay_ms: 2000,
            api_requests_per_second: 10,
            reporting_type: "channel_reach_basic_a1".to_string(),
            token_uri: parse_static(GOOGLE_TOKEN_URI),
            data_api_base: parse_static(YOUTUBE_DATA_API),
            analytics_api_base: parse_static(YOUTUBE_ANALYTICS_API),
            reporting_api_base: parse_static(YOUTUBE_REPORTING_API),
        }
    }
}

fn parse_static(raw: &str) -> Url {
    Url::parse(raw).expect("static endpoint URL must parse")
}

impl Config {
    pub fn load() -> Result<Self, PulseError> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("PULSE_"))
            .extract()
            .map_err(|e| PulseError::Config(e.to_string()))
    }

    pub fn require_encryption_key(&self) -> Result<&str, PulseError> {
        non_empty(self.encryption_key.as_deref())
            .ok_or_else(|| PulseError::Config("PULSE_ENCRYPTION_KEY is not set".to_string()))
    }

    pub fn require_client_credentials(&self) -> Result<(&str, &str), PulseError> {
        let id = non_empty(self.google_client_id.as_deref())
            .ok_or_else(|| PulseError::Config("PULSE_GOOGLE_CLIENT_ID is not set".to_string()))?;
        let secret = non_empty(self.google_client_secret.as_deref()).ok_or_else(|| {
            PulseError::Config("PULSE_GOOGLE_CLIENT_SECRET is not set".to_string())
        })?;
        Ok((id, secret))
    }

    pub fn token_skew(&self) -> Duration {
        Duration::from_secs(self.token_skew_secs)
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_secrets_are_configuration_errors() {
        let cfg = Config::default();
        assert!(matches!(
            cfg.require_encryption_key(),
            Err(PulseError::Config(_))
        ));
        assert!(matches!(
            cfg.require_client_credentials(),
            Err(PulseError::Config(_))
        ));
    }

    #[test]
    fn blank_secret_counts_as_missing() {
        let cfg = Config {
            encryption_key: Some("   ".to_string()),
            ..Config::default()
        };
        assert!(cfg.require_encryption_key().is_err());
    }

    #[test]
    fn default_endpoints_end_with_slash_for_joining() {
        let cfg = Config::default();
        let url = cfg.data_api_base.join("channels").unwrap();
        assert_eq!(url.as_str(), "https://www.googleapis.com/youtube/v3/channels");
    }
}

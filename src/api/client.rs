use crate::config::Config;
use crate::error::{GoogleApiError, IsRetryable, PulseError};
use backon::{ExponentialBuilder, Retryable};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Build the outbound HTTP client. The OAuth token exchange uses one that
/// never follows redirects.
pub fn build_http_client(cfg: &Config, follow_redirects: bool) -> Result<reqwest::Client, PulseError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(concat!("yt-pulse/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(30));
    if !follow_redirects {
        builder = builder.redirect(reqwest::redirect::Policy::none());
    }
    if let Some(proxy_url) = cfg.proxy.as_ref() {
        let proxy = reqwest::Proxy::all(proxy_url.as_str())
            .map_err(|e| PulseError::Config(format!("invalid proxy url: {e}")))?;
        builder = builder.proxy(proxy);
    }
    Ok(builder.build()?)
}

fn default_retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(3))
        .with_max_times(3)
        .with_jitter()
}

/// Bounds on the uploads walk in the Data API adapter.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryLimits {
    pub max_items: usize,
    pub max_pages: usize,
    pub batch_size: usize,
}

/// Shared plumbing for the three YouTube adapters: one HTTP client, one
/// rate limiter, one retry policy.
#[derive(Clone)]
pub struct YouTubeClient {
    http: reqwest::Client,
    limiter: Arc<DefaultDirectRateLimiter>,
    retry_policy: ExponentialBuilder,
    pub(crate) data_api_base: Url,
    pub(crate) analytics_api_base: Url,
    pub(crate) reporting_api_base: Url,
    pub(crate) limits: DiscoveryLimits,
    pub(crate) reporting_type: String,
}

impl YouTubeClient {
    pub fn new(http: reqwest::Client, cfg: &Config) -> Self {
        let per_second = NonZeroU32::new(cfg.api_requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            http,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
            retry_policy: default_retry_policy(),
            data_api_base: cfg.data_api_base.clone(),
            analytics_api_base: cfg.analytics_api_base.clone(),
            reporting_api_base: cfg.reporting_api_base.clone(),
            limits: DiscoveryLimits {
                max_items: cfg.max_upload_items,
                max_pages: cfg.max_upload_pages.max(1),
                batch_size: cfg.video_batch_size.clamp(1, 50),
            },
            reporting_type: cfg.reporting_type.clone(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: ExponentialBuilder) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn reporting_type(&self) -> &str {
        &self.reporting_type
    }

    /// Send a request built by `build`, rate limited and retried on
    /// transient failures. Non-2xx answers become `PulseError::GoogleApi`.
    async fn send<F>(&self, what: &str, build: F) -> Result<reqwest::Response, PulseError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder + Send + Sync,
    {
        (|| async {
            self.limiter.until_ready().await;
            let resp = build(&self.http).send().await?;
            let status = resp.status();
            if status.is_success() {
                return Ok(resp);
            }
            let body = resp.text().await.unwrap_or_default();
            Err(GoogleApiError::from_response(status, &body))
        })
        .retry(self.retry_policy)
        .when(|e: &PulseError| e.is_retryable())
        .notify(|err, dur: Duration| {
            warn!("{} retrying after error {}, sleeping {:?}", what, err, dur);
        })
        .await
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        what: &str,
        url: &Url,
        access_token: &str,
        query: &[(&str, String)],
    ) -> Result<T, PulseError> {
        let resp = self
            .send(what, |http| {
                http.get(url.clone())
                    .bearer_auth(access_token)
                    .header("Accept", "application/json")
                    .query(query)
            })
            .await?;
        Ok(resp.json::<T>().await?)
    }

    pub(crate) async fn post_json<B, T>(
        &self,
        what: &str,
        url: &Url,
        access_token: &str,
        body: &B,
    ) -> Result<T, PulseError>
    where
        B: serde::Serialize + Sync,
        T: DeserializeOwned,
    {
        let resp = self
            .send(what, |http| {
                http.post(url.clone()).bearer_auth(access_token).json(body)
            })
            .await?;
        Ok(resp.json::<T>().await?)
    }

    pub(crate) async fn get_text(
        &self,
        what: &str,
        url: &str,
        access_token: &str,
    ) -> Result<String, PulseError> {
        let resp = self
            .send(what, |http| http.get(url).bearer_auth(access_token))
            .await?;
        Ok(resp.text().await?)
    }
}

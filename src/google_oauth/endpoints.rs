use crate::error::{IsRetryable, PulseError};

use backon::{ExponentialBuilder, Retryable};
use oauth2::{
    AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, RefreshToken, TokenResponse,
    TokenUrl,
    basic::{BasicClient, BasicTokenResponse},
};
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Google's token endpoint, configured for the refresh-token grant only.
pub type GoogleOauth2Client =
    BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// A new access token issued by the identity provider.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: Option<Duration>,
}

fn default_retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(3))
        .with_max_times(3)
        .with_jitter()
}

/// Google OAuth token endpoint.
#[derive(Clone)]
pub struct GoogleOauthEndpoints {
    client: GoogleOauth2Client,
    http: reqwest::Client,
    retry_policy: ExponentialBuilder,
}

impl GoogleOauthEndpoints {
    /// `http` must not follow redirects (token responses are never redirected).
    pub fn new(
        client_id: &str,
        client_secret: &str,
        token_uri: &Url,
        http: reqwest::Client,
    ) -> Result<Self, PulseError> {
        let client = BasicClient::new(ClientId::new(client_id.to_string()))
            .set_client_secret(ClientSecret::new(client_secret.to_string()))
            .set_auth_type(AuthType::RequestBody)
            .set_token_uri(TokenUrl::new(token_uri.as_str().to_string())?);
        Ok(Self {
            client,
            http,
            retry_policy: default_retry_policy(),
        })
    }

    pub fn with_retry_policy(mut self, retry_policy: ExponentialBuilder) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Exchange a refresh token for a new access token. Transport failures are
    /// retried; a provider rejection is returned as-is on the first answer.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant, PulseError> {
        let response: BasicTokenResponse = (|| async {
            self.client
                .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
                .request_async(&self.http)
                .await
                .map_err(PulseError::from)
        })
        .retry(self.retry_policy)
        .when(|e: &PulseError| e.is_retryable())
        .notify(|err, dur: Duration| {
            warn!(
                "Google OAuth2 refresh retrying after error {}, sleeping {:?}",
                err, dur
            );
        })
        .await?;

        Ok(TokenGrant {
            access_token: response.access_token().secret().to_string(),
            expires_in: response.expires_in(),
        })
    }
}

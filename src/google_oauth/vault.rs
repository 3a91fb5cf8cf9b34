use super::cipher::TokenCipher;
use super::endpoints::GoogleOauthEndpoints;
use crate::db::{DbConnection, RefreshedToken, SnapshotStore};
use crate::error::PulseError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

/// Used when the provider omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Yields a usable access token for a connection.
pub trait AccessTokenProvider: Send + Sync {
    fn access_token(
        &self,
        conn: &DbConnection,
    ) -> impl Future<Output = Result<String, PulseError>> + Send;
}

/// Decrypts stored tokens and refreshes them shortly before they expire.
/// The only writer of a connection's token fields.
#[derive(Clone)]
pub struct CredentialVault<S> {
    cipher: TokenCipher,
    endpoints: GoogleOauthEndpoints,
    store: S,
    skew: Duration,
}

impl<S: SnapshotStore> CredentialVault<S> {
    pub fn new(
        cipher: TokenCipher,
        endpoints: GoogleOauthEndpoints,
        store: S,
        skew: Duration,
    ) -> Self {
        Self {
            cipher,
            endpoints,
            store,
            skew,
        }
    }

    pub fn cipher(&self) -> &TokenCipher {
        &self.cipher
    }

    /// Return a decrypted access token, refreshing first when it expires
    /// within the skew window. A failed refresh leaves every stored token
    /// field untouched so a later attempt can retry.
    pub async fn ensure_valid_access_token(
        &self,
        conn: &DbConnection,
    ) -> Result<String, PulseError> {
        let now = Utc::now();
        if !needs_refresh(conn.token_expiry, now, self.skew) {
            debug!(connection_id = conn.id, "access token still valid");
            return self.cipher.decrypt(&conn.access_token);
        }

        let refresh_token = self.cipher.decrypt(&conn.refresh_token)?;
        let grant = self.endpoints.refresh_access_token(&refresh_token).await?;

        let lifetime = grant.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME);
        let token = RefreshedToken {
            access_token: self.cipher.encrypt(&grant.access_token)?,
            token_expiry: now
                .checked_add_signed(to_chrono(lifetime))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            refreshed_at: now,
        };
        self.store.save_refreshed_token(conn.id, &token).await?;
        info!(
            connection_id = conn.id,
            channel_id = %conn.channel_id,
            expires_at = %token.token_expiry,
            "access token refreshed"
        );
        Ok(grant.access_token)
    }
}

impl<S: SnapshotStore> AccessTokenProvider for CredentialVault<S> {
    async fn access_token(&self, conn: &DbConnection) -> Result<String, PulseError> {
        self.ensure_valid_access_token(conn).await
    }
}

/// True once `now` is inside the skew window before `expiry`.
pub fn needs_refresh(expiry: DateTime<Utc>, now: DateTime<Utc>, skew: Duration) -> bool {
    match expiry.checked_sub_signed(to_chrono(skew)) {
        Some(deadline) => now >= deadline,
        None => true,
    }
}

fn to_chrono(d: Duration) -> ChronoDuration {
    ChronoDuration::from_std(d).unwrap_or_else(|_| ChronoDuration::days(365))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_window_honours_skew() {
        let now = Utc::now();
        let skew = Duration::from_secs(300);
        assert!(needs_refresh(now, now, skew));
        assert!(needs_refresh(now + ChronoDuration::seconds(299), now, skew));
        assert!(needs_refresh(now + ChronoDuration::seconds(300), now, skew));
        assert!(!needs_refresh(now + ChronoDuration::seconds(301), now, skew));
        assert!(needs_refresh(now - ChronoDuration::hours(1), now, skew));
    }
}

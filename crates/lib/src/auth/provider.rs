//! Outbound bearer tokens via the OAuth2 client-credentials grant.

use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum AuthProviderError {
    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("token endpoint error: {0}")]
    Api(String),
}

#[derive(Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Obtains bearer tokens for reply delivery and caches the last-issued one.
///
/// The cache is re-requested only when absent or expired (`now >= expires_at`),
/// so concurrent inbound messages share one token instead of each paying a
/// token round-trip. The lock is held across the refresh: check, refresh, and
/// store are one critical section, and this provider is the token's sole writer.
pub struct AuthProvider {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
    cached: Mutex<Option<CachedToken>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

impl AuthProvider {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: scope.into(),
            cached: Mutex::new(None),
        }
    }

    /// Current bearer token, refreshed through the identity endpoint when the
    /// cached one is missing or past its validity window.
    pub async fn get_token(&self) -> Result<String, AuthProviderError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }
        let token = self.request_token().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn request_token(&self) -> Result<CachedToken, AuthProviderError> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];
        let res = self.client.post(&self.token_url).form(&form).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(AuthProviderError::Api(format!("{} {}", status, body)));
        }
        let data: TokenResponse = res.json().await?;
        Ok(CachedToken {
            value: data.access_token,
            expires_at: Instant::now() + Duration::from_secs(data.expires_in),
        })
    }
}

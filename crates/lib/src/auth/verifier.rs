//! Inbound bearer-token verification against a published JWK set.

use anyhow::{Context, Result};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};

/// Fetch the signing key set from its well-known URL. Called once at startup;
/// the service refuses to start when the set cannot be fetched, rather than
/// accept unverifiable tokens.
pub async fn fetch_key_set(client: &reqwest::Client, url: &str) -> Result<JwkSet> {
    let res = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("fetching signing key set from {}", url))?;
    let res = res
        .error_for_status()
        .with_context(|| format!("signing key set endpoint {}", url))?;
    let key_set = res
        .json::<JwkSet>()
        .await
        .context("decoding signing key set")?;
    Ok(key_set)
}

/// Verifies inbound bearer tokens. Holds a read-only key set fetched at
/// startup; keys rotated server-side after that require a restart to pick up.
pub struct TokenVerifier {
    key_set: JwkSet,
    audience: String,
    issuer: Option<String>,
}

impl TokenVerifier {
    pub fn new(key_set: JwkSet, audience: impl Into<String>, issuer: Option<String>) -> Self {
        Self {
            key_set,
            audience: audience.into(),
            issuer,
        }
    }

    /// Check signature, audience, expiry (and issuer when configured).
    /// Malformed, unsigned, or otherwise invalid tokens return false; this
    /// is an authorization outcome, never a server error.
    pub fn verify(&self, token: &str) -> bool {
        let header = match decode_header(token) {
            Ok(h) => h,
            Err(_) => return false,
        };
        let Some(kid) = header.kid else {
            return false;
        };
        let Some(jwk) = self.key_set.find(&kid) else {
            return false;
        };
        let Ok(key) = DecodingKey::from_jwk(jwk) else {
            return false;
        };
        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[self.audience.as_str()]);
        if let Some(ref issuer) = self.issuer {
            validation.set_issuer(&[issuer.as_str()]);
        }
        decode::<serde_json::Value>(token, &key, &validation).is_ok()
    }
}

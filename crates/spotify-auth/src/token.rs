//! OAuth token exchange and refresh
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (initial authorization completion)
//! 2. Token refresh (every acquisition, under the default policy)
//!
//! Both operations POST a form-encoded body to the token endpoint with
//! `Accept: application/json`. The HTTP client is injected so callers share
//! their connection pool and tests can point the endpoint at a local server.

use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::debug;

use crate::credentials::Credential;
use crate::error::{Error, Result};
use crate::redirect::AuthorizationCode;
use crate::secret::Secret;

/// Response body from the token endpoint.
///
/// Refresh responses may omit `refresh_token`; code exchange responses must
/// carry both tokens.
#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    #[serde(default)]
    expires_in: Option<u64>,
}

impl TokenResponse {
    fn into_credential(self, now: u64) -> Result<Credential> {
        if self.access_token.is_empty() {
            return Err(Error::Decode("response has no access_token".into()));
        }
        let refresh_token = self
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Decode("response has no refresh_token".into()))?;

        Ok(Credential {
            access_token: self.access_token,
            refresh_token,
            expires_at: self.expires_in.map(|secs| expiry(now, secs)).transpose()?,
        })
    }

    /// Apply a refresh response in place. The access token is always
    /// replaced; the refresh token only when the response carries one.
    fn apply_to(self, credential: &mut Credential, now: u64) -> Result<()> {
        if self.access_token.is_empty() {
            return Err(Error::Decode("response has no access_token".into()));
        }
        let expires_at = self.expires_in.map(|secs| expiry(now, secs)).transpose()?;

        credential.access_token = self.access_token;
        if let Some(refresh) = self.refresh_token.filter(|t| !t.is_empty()) {
            credential.refresh_token = refresh;
        }
        if expires_at.is_some() {
            credential.expires_at = expires_at;
        }
        Ok(())
    }
}

/// Absolute expiry for a relative `expires_in`. The value comes from the
/// provider, so an overflow is a decode error rather than a wrapped time.
fn expiry(now: u64, expires_in: u64) -> Result<u64> {
    now.checked_add(expires_in)
        .ok_or_else(|| Error::Decode(format!("expires_in out of range: {expires_in}")))
}

/// Client for the provider's token endpoint.
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    endpoint: String,
    client_id: String,
    client_secret: Secret<String>,
}

impl TokenClient {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Secret<String>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            client_id: client_id.into(),
            client_secret,
        }
    }

    /// Exchange an authorization code for the initial credential.
    ///
    /// `redirect_uri` must match the one sent in the authorization URL.
    pub async fn exchange_code(
        &self,
        code: &AuthorizationCode,
        redirect_uri: &str,
    ) -> Result<Credential> {
        let response = self
            .post(&[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", redirect_uri),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose().as_str()),
            ])
            .await?;

        let credential = response.into_credential(unix_now())?;
        debug!("exchanged authorization code for tokens");
        Ok(credential)
    }

    /// Refresh the access token in place.
    ///
    /// On error the credential is left untouched.
    pub async fn refresh(&self, credential: &mut Credential) -> Result<()> {
        let response = self
            .post(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", credential.refresh_token.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose().as_str()),
            ])
            .await?;

        response.apply_to(credential, unix_now())?;
        debug!("refreshed access token");
        Ok(())
    }

    async fn post(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(&self.endpoint)
            .header(ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| Error::Network(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.ok().filter(|b| !b.is_empty());
            return Err(Error::Protocol {
                status: status.as_u16(),
                body,
            });
        }

        response.json::<TokenResponse>().await.map_err(|e| {
            if e.is_decode() {
                Error::Decode(e.to_string())
            } else {
                Error::Network(format!("reading token response: {e}"))
            }
        })
    }
}

/// Seconds since the unix epoch.
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

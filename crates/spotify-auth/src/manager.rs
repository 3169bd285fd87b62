//! Credential acquisition
//!
//! `acquire()` walks `TryLoad → {Refresh | FreshAuth} → Persist → Ready`:
//! a stored credential is refreshed (per [`RefreshPolicy`]), otherwise the
//! browser flow runs and the code is exchanged. Whatever comes out is
//! persisted; a failed write is logged and the credential is still returned.
//! Refresh failures are terminal: there is no fallback to the browser flow
//! and no retry.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::authorize::AuthorizationFlow;
use crate::browser::BrowserLauncher;
use crate::constants::{AUTHORIZE_ENDPOINT, DEFAULT_REDIRECT_TIMEOUT_SECS, TOKEN_ENDPOINT};
use crate::credentials::{Credential, CredentialStore, LoadOutcome};
use crate::error::{Error, Result};
use crate::policy::RefreshPolicy;
use crate::secret::Secret;
use crate::token::{TokenClient, unix_now};

/// Inputs for credential acquisition.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    /// Local port the provider redirects to.
    pub redirect_port: u16,
    pub redirect_timeout: Duration,
    pub refresh_policy: RefreshPolicy,
    /// Defaults to `~/.spotify/auth.yaml` when unset.
    pub credential_path: Option<PathBuf>,
    pub token_endpoint: String,
    pub authorize_endpoint: String,
}

impl AuthConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: Secret<String>,
        redirect_port: u16,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            redirect_port,
            redirect_timeout: Duration::from_secs(DEFAULT_REDIRECT_TIMEOUT_SECS),
            refresh_policy: RefreshPolicy::default(),
            credential_path: None,
            token_endpoint: TOKEN_ENDPOINT.to_owned(),
            authorize_endpoint: AUTHORIZE_ENDPOINT.to_owned(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Config("client id is missing".into()));
        }
        if self.client_secret.is_blank() {
            return Err(Error::Config("client secret is missing".into()));
        }
        if self.redirect_port == 0 {
            return Err(Error::Config("redirect port must be between 1 and 65535".into()));
        }
        if self.redirect_timeout.is_zero() {
            return Err(Error::Config("redirect timeout must be greater than 0".into()));
        }
        if !self.token_endpoint.starts_with("http://") && !self.token_endpoint.starts_with("https://")
        {
            return Err(Error::Config(format!(
                "token endpoint must start with http:// or https://, got: {}",
                self.token_endpoint
            )));
        }
        Ok(())
    }
}

/// Produces a ready-to-use credential for API callers.
pub struct CredentialManager {
    config: AuthConfig,
    store: CredentialStore,
    tokens: TokenClient,
    launcher: Box<dyn BrowserLauncher>,
}

impl CredentialManager {
    /// Validates `config` before anything touches the network.
    pub fn new(
        config: AuthConfig,
        http: reqwest::Client,
        launcher: Box<dyn BrowserLauncher>,
    ) -> Result<Self> {
        config.validate()?;

        let path = match &config.credential_path {
            Some(path) => path.clone(),
            None => CredentialStore::default_path()?,
        };
        let tokens = TokenClient::new(
            http,
            config.token_endpoint.clone(),
            config.client_id.clone(),
            config.client_secret.clone(),
        );

        Ok(Self {
            store: CredentialStore::new(path),
            tokens,
            launcher,
            config,
        })
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Acquire a usable bearer credential.
    pub async fn acquire(&self) -> Result<Credential> {
        let path = self.store.path().display().to_string();

        let credential = match self.store.load().await {
            LoadOutcome::Found(mut credential) => {
                if !self.config.refresh_policy.needs_refresh(&credential, unix_now()) {
                    info!(%path, "stored credential still valid, skipping refresh");
                    return Ok(credential);
                }
                self.tokens.refresh(&mut credential).await?;
                info!("refreshed stored credential");
                credential
            }
            LoadOutcome::Missing => {
                debug!(%path, "no stored credential, starting authorization");
                self.authorize().await?
            }
            LoadOutcome::Unusable(reason) => {
                warn!(%path, %reason, "stored credential unusable, starting authorization");
                self.authorize().await?
            }
        };

        if let Err(e) = self.store.save(&credential).await {
            warn!(%path, error = %e, "could not persist credential, continuing with it in memory");
        }

        Ok(credential)
    }

    async fn authorize(&self) -> Result<Credential> {
        let flow = AuthorizationFlow::new(
            &self.config.client_id,
            self.config.redirect_port,
            self.config.redirect_timeout,
            self.launcher.as_ref(),
        )
        .with_endpoint(&self.config.authorize_endpoint);

        let code = flow.run().await?;
        let credential = self.tokens.exchange_code(&code, &flow.redirect_uri()).await?;
        info!("authorization complete");
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockTokenEndpoint, RedirectingBrowser, free_port, unused_url};

    fn config_in(dir: &tempfile::TempDir, token_endpoint: &str, port: u16) -> AuthConfig {
        let mut config = AuthConfig::new("abc", Secret::new("xyz".to_string()), port);
        config.credential_path = Some(dir.path().join(".spotify").join("auth.yaml"));
        config.token_endpoint = token_endpoint.to_owned();
        config.redirect_timeout = Duration::from_secs(5);
        config
    }

    fn manager(config: AuthConfig, browser: &RedirectingBrowser) -> CredentialManager {
        CredentialManager::new(config, reqwest::Client::new(), Box::new(browser.clone())).unwrap()
    }

    fn query_value(url: &str, key: &str) -> Option<String> {
        url::Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[tokio::test]
    async fn missing_credential_runs_authorization_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let mock =
            MockTokenEndpoint::start(200, r#"{"access_token":"AT1","refresh_token":"RT1"}"#).await;
        let port = free_port();
        let browser = RedirectingBrowser::delivering("CODE123");
        let manager = manager(config_in(&dir, mock.url(), port), &browser);

        let credential = manager.acquire().await.unwrap();
        assert_eq!(credential, Credential::new("AT1", "RT1"));
        assert_eq!(credential.bearer(), "Bearer AT1");

        let opened = browser.opened();
        assert_eq!(opened.len(), 1);
        assert_eq!(query_value(&opened[0], "client_id").as_deref(), Some("abc"));
        assert_eq!(
            query_value(&opened[0], "redirect_uri"),
            Some(format!("http://localhost:{port}"))
        );

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].form["grant_type"], "authorization_code");
        assert_eq!(requests[0].form["code"], "CODE123");
        assert_eq!(
            requests[0].form["redirect_uri"],
            format!("http://localhost:{port}")
        );

        let stored = manager.store().load().await.into_credential().unwrap();
        assert_eq!(stored, Credential::new("AT1", "RT1"));
    }

    #[tokio::test]
    async fn stored_credential_is_refreshed_and_keeps_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockTokenEndpoint::start(200, r#"{"access_token":"AT1"}"#).await;
        let browser = RedirectingBrowser::silent();
        let manager = manager(config_in(&dir, mock.url(), free_port()), &browser);
        manager
            .store()
            .save(&Credential::new("AT0", "RT0"))
            .await
            .unwrap();

        let credential = manager.acquire().await.unwrap();
        assert_eq!(credential, Credential::new("AT1", "RT0"));
        assert!(browser.opened().is_empty(), "refresh path must not open a browser");

        let stored = manager.store().load().await.into_credential().unwrap();
        assert_eq!(stored, Credential::new("AT1", "RT0"));
    }

    #[tokio::test]
    async fn refresh_failure_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockTokenEndpoint::start(400, r#"{"error":"invalid_grant"}"#).await;
        let browser = RedirectingBrowser::delivering("CODE123");
        let manager = manager(config_in(&dir, mock.url(), free_port()), &browser);
        manager
            .store()
            .save(&Credential::new("AT0", "RT0"))
            .await
            .unwrap();

        let err = manager.acquire().await.unwrap_err();
        assert!(matches!(err, Error::Protocol { status: 400, .. }), "got: {err:?}");
        assert!(err.to_string().contains("invalid_grant"));

        // No fallback to the browser flow, stored credential untouched
        assert!(browser.opened().is_empty());
        assert_eq!(mock.requests().len(), 1);
        let stored = manager.store().load().await.into_credential().unwrap();
        assert_eq!(stored, Credential::new("AT0", "RT0"));
    }

    #[tokio::test]
    async fn corrupt_credential_falls_back_to_authorization() {
        let dir = tempfile::tempdir().unwrap();
        let mock =
            MockTokenEndpoint::start(200, r#"{"access_token":"AT1","refresh_token":"RT1"}"#).await;
        let browser = RedirectingBrowser::delivering("CODE123");
        let manager = manager(config_in(&dir, mock.url(), free_port()), &browser);

        let path = manager.store().path().to_path_buf();
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, "{{{ not yaml").await.unwrap();

        let credential = manager.acquire().await.unwrap();
        assert_eq!(credential, Credential::new("AT1", "RT1"));
        assert_eq!(browser.opened().len(), 1);
        assert_eq!(mock.requests()[0].form["grant_type"], "authorization_code");
    }

    #[tokio::test]
    async fn redirect_timeout_is_reported_and_port_released() {
        let dir = tempfile::tempdir().unwrap();
        let mock =
            MockTokenEndpoint::start(200, r#"{"access_token":"AT1","refresh_token":"RT1"}"#).await;
        let port = free_port();
        let browser = RedirectingBrowser::silent();
        let mut config = config_in(&dir, mock.url(), port);
        config.redirect_timeout = Duration::from_millis(100);
        let manager = manager(config, &browser);

        let result = manager.acquire().await;
        assert!(matches!(result, Err(Error::Timeout(_))), "got: {result:?}");
        assert!(mock.requests().is_empty(), "no exchange without a code");

        std::net::TcpListener::bind(("127.0.0.1", port))
            .expect("listener must not hold the port after a timeout");
        assert!(matches!(
            manager.store().load().await,
            LoadOutcome::Missing
        ));
    }

    #[tokio::test]
    async fn save_failure_still_returns_credential() {
        let dir = tempfile::tempdir().unwrap();
        let mock =
            MockTokenEndpoint::start(200, r#"{"access_token":"AT1","refresh_token":"RT1"}"#).await;
        let blocker = dir.path().join("blocker");
        tokio::fs::write(&blocker, "a file, not a directory").await.unwrap();

        let browser = RedirectingBrowser::delivering("CODE123");
        let mut config = config_in(&dir, mock.url(), free_port());
        config.credential_path = Some(blocker.join("auth.yaml"));
        let manager = manager(config, &browser);

        let credential = manager.acquire().await.unwrap();
        assert_eq!(credential, Credential::new("AT1", "RT1"));
    }

    #[tokio::test]
    async fn valid_credential_skips_refresh_when_expiry_policy_set() {
        let dir = tempfile::tempdir().unwrap();
        let browser = RedirectingBrowser::silent();
        let mut config = config_in(&dir, &unused_url(), free_port());
        config.refresh_policy = RefreshPolicy::WhenExpiring {
            threshold: Duration::from_secs(300),
        };
        let manager = manager(config, &browser);

        let stored = Credential {
            expires_at: Some(unix_now() + 3600),
            ..Credential::new("AT0", "RT0")
        };
        manager.store().save(&stored).await.unwrap();

        // The token endpoint is unreachable, so any refresh attempt would fail
        let credential = manager.acquire().await.unwrap();
        assert_eq!(credential, stored);
    }

    #[test]
    fn missing_client_id_is_config_error() {
        let config = AuthConfig::new("", Secret::new("xyz".to_string()), 4000);
        let result = CredentialManager::new(
            config,
            reqwest::Client::new(),
            Box::new(RedirectingBrowser::silent()),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn config_validation() {
        let secret = || Secret::new("xyz".to_string());

        assert!(AuthConfig::new("abc", secret(), 4000).validate().is_ok());
        assert!(AuthConfig::new("abc", Secret::new(String::new()), 4000).validate().is_err());
        assert!(AuthConfig::new("abc", secret(), 0).validate().is_err());

        let mut zero_timeout = AuthConfig::new("abc", secret(), 4000);
        zero_timeout.redirect_timeout = Duration::ZERO;
        assert!(zero_timeout.validate().is_err());

        let mut bad_endpoint = AuthConfig::new("abc", secret(), 4000);
        bad_endpoint.token_endpoint = "ftp://accounts.spotify.com".into();
        assert!(bad_endpoint.validate().is_err());
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let config = AuthConfig::new("abc", Secret::new("xyz-secret".to_string()), 4000);
        assert!(!format!("{config:?}").contains("xyz-secret"));
    }
}

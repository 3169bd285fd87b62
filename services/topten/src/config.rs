//! Configuration types and loading
//!
//! Precedence: env vars > config file > defaults. The config file is
//! optional; with none present everything comes from the environment
//! (usually a `.env` file). The client secret is read from CLIENT_SECRET
//! or `client_secret_file`, never from the TOML body.

use serde::Deserialize;
use spotify_auth::{AuthConfig, RefreshPolicy, Secret};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

const DEFAULT_CONFIG_FILE: &str = "topten.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub spotify: SpotifyConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Spotify application and authorization settings
#[derive(Debug, Deserialize)]
pub struct SpotifyConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(default)]
    pub redirect_port: Option<u16>,
    #[serde(default = "default_redirect_timeout")]
    pub redirect_timeout_secs: u64,
    /// Overrides `~/.spotify/auth.yaml`
    #[serde(default)]
    pub credential_path: Option<PathBuf>,
    #[serde(default)]
    pub refresh: RefreshMode,
    #[serde(default = "default_refresh_threshold")]
    pub refresh_threshold_secs: u64,
    #[serde(default = "default_open_browser")]
    pub open_browser: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefreshMode {
    #[default]
    Always,
    WhenExpiring,
}

/// Outbound HTTP settings
#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

fn default_redirect_timeout() -> u64 {
    spotify_auth::DEFAULT_REDIRECT_TIMEOUT_SECS
}

fn default_refresh_threshold() -> u64 {
    300
}

fn default_open_browser() -> bool {
    true
}

fn default_http_timeout() -> u64 {
    30
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            client_secret_file: None,
            redirect_port: None,
            redirect_timeout_secs: default_redirect_timeout(),
            credential_path: None,
            refresh: RefreshMode::default(),
            refresh_threshold_secs: default_refresh_threshold(),
            open_browser: default_open_browser(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file, then overlay the
    /// process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                toml::from_str(&contents)?
            }
            None => Config::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay CLIENT_ID, CLIENT_SECRET and PORT, then resolve the secret
    /// file if the environment did not supply one.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(id) = lookup("CLIENT_ID") {
            self.spotify.client_id = Some(id.trim().to_owned());
        }

        if let Some(port) = lookup("PORT") {
            let port = port.trim().parse::<u16>().map_err(|_| {
                Error::Config(format!("PORT must be a port number, got: {port}"))
            })?;
            self.spotify.redirect_port = Some(port);
        }

        if let Some(secret) = lookup("CLIENT_SECRET") {
            self.spotify.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = self.spotify.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                self.spotify.client_secret = Some(Secret::new(secret));
            }
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.spotify.redirect_timeout_secs == 0 {
            return Err(Error::Config(
                "redirect_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.http.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be greater than 0".into()));
        }
        if self.spotify.redirect_port == Some(0) {
            return Err(Error::Config("redirect_port must not be 0".into()));
        }
        Ok(())
    }

    /// Build the credential manager's inputs. Id, secret and port are
    /// required here, before any network call.
    pub fn auth_config(&self) -> Result<AuthConfig> {
        let spotify = &self.spotify;
        let client_id = spotify.client_id.clone().ok_or_else(|| {
            Error::Config("client id is not set (CLIENT_ID or spotify.client_id)".into())
        })?;
        let client_secret = spotify.client_secret.clone().ok_or_else(|| {
            Error::Config(
                "client secret is not set (CLIENT_SECRET or spotify.client_secret_file)".into(),
            )
        })?;
        let port = spotify.redirect_port.ok_or_else(|| {
            Error::Config("redirect port is not set (PORT or spotify.redirect_port)".into())
        })?;

        let mut auth = AuthConfig::new(client_id, client_secret, port);
        auth.redirect_timeout = Duration::from_secs(spotify.redirect_timeout_secs);
        auth.credential_path = spotify.credential_path.clone();
        auth.refresh_policy = match spotify.refresh {
            RefreshMode::Always => RefreshPolicy::Always,
            RefreshMode::WhenExpiring => RefreshPolicy::WhenExpiring {
                threshold: Duration::from_secs(spotify.refresh_threshold_secs),
            },
        };
        Ok(auth)
    }

    /// Resolve the config file from the CLI arg, CONFIG_PATH, or
    /// `topten.toml` in the working directory if it exists.
    pub fn resolve_path(cli_path: Option<&str>) -> Option<PathBuf> {
        if let Some(p) = cli_path {
            return Some(PathBuf::from(p));
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return Some(PathBuf::from(p));
        }
        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        default.exists().then_some(default)
    }
}

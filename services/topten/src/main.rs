//! topten
//!
//! Acquires a Spotify bearer credential for the playlist updater:
//! 1. Loads `.env`, the optional TOML config, and the environment
//! 2. Refreshes the stored credential, or runs the browser authorization
//! 3. Persists the result to `~/.spotify/auth.yaml`
//! 4. Optionally prints the `Authorization` header value for scripts

mod config;
mod error;

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spotify_auth::{CredentialManager, launcher_for};

use crate::config::Config;

/// Parsed command line flags
#[derive(Debug, Default, PartialEq, Eq)]
struct CliArgs {
    config_path: Option<String>,
    print_bearer: bool,
}

impl CliArgs {
    fn parse(args: &[String]) -> Self {
        let config_path = args
            .iter()
            .position(|a| a == "--config")
            .and_then(|i| args.get(i + 1))
            .cloned();
        let print_bearer = args.iter().any(|a| a == "--print-bearer");
        Self {
            config_path,
            print_bearer,
        }
    }
}

/// Initialize tracing with LOG_LEVEL / RUST_LOG support. Logs go to stderr
/// so stdout stays clean for `--print-bearer`; LOG_FORMAT=json switches to
/// JSON lines.
fn init_tracing() {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before tracing so LOG_LEVEL can come from it
    let dotenv = dotenvy::dotenv();
    init_tracing();
    if let Err(e) = dotenv {
        debug!(error = %e, "no .env file loaded");
    }

    let args: Vec<String> = std::env::args().collect();
    let cli = CliArgs::parse(&args);

    let config_path = Config::resolve_path(cli.config_path.as_deref());
    match &config_path {
        Some(path) => info!(path = %path.display(), "loading configuration"),
        None => info!("no config file, using environment only"),
    }

    let config = Config::load(config_path.as_deref()).with_context(|| match &config_path {
        Some(path) => format!("failed to load config from {}", path.display()),
        None => "failed to load config from environment".to_owned(),
    })?;
    let auth_config = config
        .auth_config()
        .context("incomplete Spotify configuration")?;

    info!(
        redirect_port = auth_config.redirect_port,
        refresh_policy = ?auth_config.refresh_policy,
        open_browser = config.spotify.open_browser,
        "configuration loaded"
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let manager = CredentialManager::new(
        auth_config,
        http,
        launcher_for(config.spotify.open_browser),
    )
    .context("invalid Spotify configuration")?;

    let credential = manager
        .acquire()
        .await
        .context("failed to acquire Spotify credential")?;

    info!(path = %manager.store().path().display(), "Spotify credential ready");

    if cli.print_bearer {
        println!("{}", credential.bearer());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_config_and_print_flags() {
        let cli = CliArgs::parse(&args(&[
            "topten",
            "--config",
            "/etc/topten.toml",
            "--print-bearer",
        ]));
        assert_eq!(cli.config_path.as_deref(), Some("/etc/topten.toml"));
        assert!(cli.print_bearer);
    }

    #[test]
    fn no_flags_means_defaults() {
        assert_eq!(CliArgs::parse(&args(&["topten"])), CliArgs::default());
    }

    #[test]
    fn dangling_config_flag_is_ignored() {
        let cli = CliArgs::parse(&args(&["topten", "--config"]));
        assert_eq!(cli.config_path, None);
    }
}

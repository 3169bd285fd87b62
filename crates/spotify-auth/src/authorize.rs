//! Browser-driven authorization
//!
//! Builds the provider's `/authorize` URL, hands it to a [`BrowserLauncher`]
//! and waits on a [`RedirectListener`] for the code. The listener is bound
//! before the browser opens so an instant redirect cannot be missed.

use std::time::Duration;

use tracing::{debug, info};
use url::Url;

use crate::browser::BrowserLauncher;
use crate::constants::{AUTHORIZE_ENDPOINT, SCOPES};
use crate::error::{Error, Result};
use crate::redirect::{AuthorizationCode, RedirectListener};

/// Redirect URI registered with the provider for a local port.
pub fn redirect_uri(port: u16) -> String {
    format!("http://localhost:{port}")
}

/// Build the full authorization URL.
///
/// Scopes are joined with spaces; query values are form-encoded.
pub fn authorization_url(
    endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    scopes: &[&str],
) -> Result<Url> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| Error::Config(format!("invalid authorize endpoint {endpoint}: {e}")))?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", &scopes.join(" "));
    Ok(url)
}

/// One interactive authorization attempt.
pub struct AuthorizationFlow<'a> {
    endpoint: &'a str,
    client_id: &'a str,
    port: u16,
    timeout: Duration,
    launcher: &'a dyn BrowserLauncher,
}

impl<'a> AuthorizationFlow<'a> {
    pub fn new(
        client_id: &'a str,
        port: u16,
        timeout: Duration,
        launcher: &'a dyn BrowserLauncher,
    ) -> Self {
        Self {
            endpoint: AUTHORIZE_ENDPOINT,
            client_id,
            port,
            timeout,
            launcher,
        }
    }

    pub fn with_endpoint(mut self, endpoint: &'a str) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// The redirect URI this flow sends, which the code exchange must repeat.
    pub fn redirect_uri(&self) -> String {
        redirect_uri(self.port)
    }

    /// Open the browser and wait for the authorization code.
    pub async fn run(&self) -> Result<AuthorizationCode> {
        let listener = RedirectListener::bind(self.port).await?;

        let url = match authorization_url(
            self.endpoint,
            self.client_id,
            &self.redirect_uri(),
            SCOPES,
        ) {
            Ok(url) => url,
            Err(e) => {
                listener.shutdown().await;
                return Err(e);
            }
        };

        eprintln!("Please authorize this app via browser.");
        debug!(url = %url, "authorization URL");
        if let Err(e) = self.launcher.open(url.as_str()) {
            listener.shutdown().await;
            return Err(e);
        }

        info!(
            port = self.port,
            timeout_secs = self.timeout.as_secs(),
            "waiting for authorization redirect"
        );
        listener.wait(self.timeout).await
    }
}

//! One-shot local redirect listener
//!
//! Serves `GET /` on `127.0.0.1:<port>` for the duration of a single
//! authorization attempt. The redirect URI names `localhost`, which some
//! hosts resolve to `::1` first, so `[::1]:<port>` is served too when the
//! host allows it. The first request carrying a `code` (or an
//! `error`) resolves a oneshot channel; the waiting side bounds the wait with
//! a timeout and shuts the server down on every exit path, so the port is
//! free again once [`RedirectListener::wait`] returns.

use std::collections::HashMap;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// How long a stopping server may take to drain open connections before
/// its task is aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const SUCCESS_PAGE: &str = "<!DOCTYPE html>
<html><head><title>topten</title></head>
<body><h2>Authorization received.</h2><p>You can close this tab and return to the terminal.</p></body>
</html>";

const DENIED_PAGE: &str = "<!DOCTYPE html>
<html><head><title>topten</title></head>
<body><h2>Authorization was denied.</h2><p>You can close this tab.</p></body>
</html>";

const MISSING_CODE_PAGE: &str = "<!DOCTYPE html>
<html><head><title>topten</title></head>
<body><h2>No authorization code in this request.</h2></body>
</html>";

const ALREADY_RECEIVED_PAGE: &str = "<!DOCTYPE html>
<html><head><title>topten</title></head>
<body><h2>Authorization already received.</h2></body>
</html>";

/// Single-use authorization code delivered by the provider's redirect.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationCode(String);

impl AuthorizationCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthorizationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthorizationCode([REDACTED])")
    }
}

type CodeSender = Arc<Mutex<Option<oneshot::Sender<Result<AuthorizationCode>>>>>;

/// A running redirect endpoint waiting for one authorization code.
pub struct RedirectListener {
    local_addr: SocketAddr,
    code_rx: oneshot::Receiver<Result<AuthorizationCode>>,
    shutdown_tx: watch::Sender<bool>,
    servers: Vec<JoinHandle<()>>,
}

impl RedirectListener {
    /// Bind `127.0.0.1:<port>` (and `[::1]` on the same port, best effort)
    /// and start serving in the background.
    ///
    /// Port 0 binds an ephemeral port; see [`local_addr`](Self::local_addr).
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))
            .await
            .map_err(|e| Error::Io(format!("binding redirect listener on port {port}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::Io(format!("reading redirect listener address: {e}")))?;

        let (code_tx, code_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let sender: CodeSender = Arc::new(Mutex::new(Some(code_tx)));
        let app = Router::new()
            .route("/", get(capture_code))
            .with_state(sender);

        let mut servers = vec![serve(listener, app.clone(), shutdown_rx.clone())];
        match TcpListener::bind((Ipv6Addr::LOCALHOST, local_addr.port())).await {
            Ok(v6) => servers.push(serve(v6, app, shutdown_rx)),
            Err(e) => debug!(error = %e, "IPv6 loopback unavailable, serving IPv4 only"),
        }

        debug!(%local_addr, listeners = servers.len(), "redirect listener started");

        Ok(Self {
            local_addr,
            code_rx,
            shutdown_tx,
            servers,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the redirect, at most `timeout`.
    ///
    /// The server is stopped before this returns, whatever the outcome.
    pub async fn wait(mut self, timeout: Duration) -> Result<AuthorizationCode> {
        let outcome = match tokio::time::timeout(timeout, &mut self.code_rx).await {
            Ok(Ok(delivered)) => delivered,
            Ok(Err(_)) => Err(Error::Io(
                "redirect listener stopped before a code arrived".into(),
            )),
            Err(_) => {
                warn!(
                    port = self.local_addr.port(),
                    timeout_secs = timeout.as_secs(),
                    "timed out waiting for authorization redirect"
                );
                Err(Error::Timeout(timeout))
            }
        };

        self.stop().await;
        outcome
    }

    /// Stop the server without waiting for a code.
    pub async fn shutdown(mut self) {
        self.stop().await;
    }

    async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        for mut server in self.servers.drain(..) {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut server)
                .await
                .is_err()
            {
                warn!("redirect listener did not drain in time, aborting");
                server.abort();
                let _ = server.await;
            }
        }
        debug!(local_addr = %self.local_addr, "redirect listener stopped");
    }
}

impl Drop for RedirectListener {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

fn serve(
    listener: TcpListener,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await;
        if let Err(e) = result {
            warn!(error = %e, "redirect listener stopped with error");
        }
    })
}

async fn capture_code(
    State(sender): State<CodeSender>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Html<&'static str>) {
    let (delivered, page) = if let Some(error) = params.get("error") {
        (Err(Error::AuthorizationDenied(error.clone())), DENIED_PAGE)
    } else if let Some(code) = params.get("code").filter(|c| !c.is_empty()) {
        (Ok(AuthorizationCode::new(code.clone())), SUCCESS_PAGE)
    } else {
        debug!("redirect request without code or error, ignoring");
        return (StatusCode::BAD_REQUEST, Html(MISSING_CODE_PAGE));
    };

    let Some(tx) = sender.lock().await.take() else {
        return (StatusCode::OK, Html(ALREADY_RECEIVED_PAGE));
    };

    if tx.send(delivered).is_err() {
        debug!("redirect arrived after the wait ended");
    } else {
        info!("authorization redirect received");
    }
    (StatusCode::OK, Html(page))
}

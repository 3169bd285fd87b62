//! Fakes shared by the unit tests: an in-process token endpoint and
//! browser launchers that either follow the redirect or do nothing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::post;
use tokio::task::JoinHandle;
use url::Url;

use crate::browser::BrowserLauncher;
use crate::error::{Error, Result};

/// A port that was free a moment ago.
pub(crate) fn free_port() -> u16 {
    std::net::TcpListener::bind(("127.0.0.1", 0))
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// A token endpoint URL nothing is listening on.
pub(crate) fn unused_url() -> String {
    format!("http://127.0.0.1:{}/api/token", free_port())
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub form: HashMap<String, String>,
    pub accept: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Clone)]
struct MockState {
    status: StatusCode,
    body: &'static str,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// Token endpoint answering every request with a fixed status and body.
pub(crate) struct MockTokenEndpoint {
    url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    server: JoinHandle<()>,
}

impl MockTokenEndpoint {
    pub async fn start(status: u16, body: &'static str) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            status: StatusCode::from_u16(status).unwrap(),
            body,
            requests: requests.clone(),
        };
        let app = Router::new()
            .route("/api/token", post(token_handler))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}/api/token"),
            requests,
            server,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for MockTokenEndpoint {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn token_handler(
    State(state): State<MockState>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], &'static str) {
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };
    let recorded = RecordedRequest {
        form: url::form_urlencoded::parse(body.as_bytes())
            .into_owned()
            .collect(),
        accept: header_value(header::ACCEPT),
        content_type: header_value(header::CONTENT_TYPE),
    };
    state.requests.lock().unwrap().push(recorded);

    (
        state.status,
        [(header::CONTENT_TYPE, "application/json")],
        state.body,
    )
}

/// Browser that records every URL and, when given a code, performs the
/// provider's redirect back to the `redirect_uri` in that URL.
/// Clones share the record of opened URLs.
#[derive(Default, Clone)]
pub(crate) struct RedirectingBrowser {
    code: Option<&'static str>,
    opened: Arc<Mutex<Vec<String>>>,
}

impl RedirectingBrowser {
    pub fn delivering(code: &'static str) -> Self {
        Self {
            code: Some(code),
            ..Self::default()
        }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl BrowserLauncher for RedirectingBrowser {
    fn open(&self, url: &str) -> Result<()> {
        self.opened.lock().unwrap().push(url.to_owned());

        let Some(code) = self.code else {
            return Ok(());
        };
        let parsed = Url::parse(url).map_err(|e| Error::Launch(e.to_string()))?;
        let redirect = parsed
            .query_pairs()
            .find(|(k, _)| k == "redirect_uri")
            .map(|(_, v)| v.into_owned())
            .ok_or_else(|| Error::Launch("authorization URL has no redirect_uri".into()))?;
        let target = format!(
            "{}/?code={code}",
            redirect.replace("localhost", "127.0.0.1")
        );

        tokio::spawn(async move {
            let _ = reqwest::get(target).await;
        });
        Ok(())
    }
}

/// Browser that can never be opened.
pub(crate) struct FailingBrowser;

impl BrowserLauncher for FailingBrowser {
    fn open(&self, _url: &str) -> Result<()> {
        Err(Error::Launch("no browser in test environment".into()))
    }
}

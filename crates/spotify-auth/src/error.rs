//! Error types for credential acquisition

use std::time::Duration;

/// Errors from credential acquisition.
///
/// Credential-file read failures never surface here; the store reports them
/// as an unusable credential and the manager falls back to authorization.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("token endpoint returned {status}: {}", .body.as_deref().unwrap_or("<no body>"))]
    Protocol { status: u16, body: Option<String> },

    #[error("invalid token response: {0}")]
    Decode(String),

    #[error("no authorization redirect received within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("could not open browser: {0}")]
    Launch(String),

    #[error("authorization denied by provider: {0}")]
    AuthorizationDenied(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

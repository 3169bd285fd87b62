//! Spotify accounts service constants
//!
//! Endpoints and scopes used by the authorization-code flow. The client ID
//! and secret are per-application values supplied through configuration, so
//! they do not live here.

/// Authorization endpoint the user's browser is sent to.
pub const AUTHORIZE_ENDPOINT: &str = "https://accounts.spotify.com/authorize";

/// Token endpoint for code exchange and token refresh
pub const TOKEN_ENDPOINT: &str = "https://accounts.spotify.com/api/token";

/// Scopes requested during authorization: read top items, modify public and
/// private playlists, read private playlists.
pub const SCOPES: &[&str] = &[
    "user-top-read",
    "playlist-modify-public",
    "playlist-modify-private",
    "playlist-read-private",
];

/// Directory under the user's home that holds the credential file.
pub const CREDENTIAL_DIR: &str = ".spotify";

/// Credential file name inside [`CREDENTIAL_DIR`].
pub const CREDENTIAL_FILE: &str = "auth.yaml";

/// Default bound on how long to wait for the browser redirect.
pub const DEFAULT_REDIRECT_TIMEOUT_SECS: u64 = 300;

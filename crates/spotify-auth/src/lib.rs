//! Spotify OAuth credential lifecycle
//!
//! Obtains a bearer credential through the authorization-code grant, keeps
//! it fresh with the refresh grant, and persists it between runs. The crate
//! has no dependency on the binary and can be tested on its own.
//!
//! Credential flow:
//! 1. `CredentialManager::acquire()` reads `~/.spotify/auth.yaml` via `CredentialStore`
//! 2. Stored credential: `TokenClient::refresh()` mints a new access token
//! 3. No usable credential: `AuthorizationFlow` opens the browser and a
//!    `RedirectListener` captures the code, then `TokenClient::exchange_code()`
//! 4. Result saved via `CredentialStore::save()` and returned to the caller

pub mod authorize;
pub mod browser;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod manager;
pub mod policy;
pub mod redirect;
pub mod secret;
pub mod token;

#[cfg(test)]
mod test_support;

pub use authorize::{AuthorizationFlow, authorization_url, redirect_uri};
pub use browser::{BrowserLauncher, ManualBrowser, SystemBrowser, launcher_for};
pub use constants::*;
pub use credentials::{Credential, CredentialStore, LoadOutcome};
pub use error::{Error, Result};
pub use manager::{AuthConfig, CredentialManager};
pub use policy::RefreshPolicy;
pub use redirect::{AuthorizationCode, RedirectListener};
pub use secret::Secret;
pub use token::TokenClient;

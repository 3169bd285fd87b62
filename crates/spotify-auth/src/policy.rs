//! When a stored credential gets refreshed

use std::time::Duration;

use crate::credentials::Credential;

/// Refresh strategy applied to a credential loaded from disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Refresh on every acquisition, regardless of remaining validity.
    #[default]
    Always,
    /// Refresh only when the expiry is unknown or falls within `threshold`.
    WhenExpiring { threshold: Duration },
}

impl RefreshPolicy {
    /// `now` is unix seconds.
    pub fn needs_refresh(&self, credential: &Credential, now: u64) -> bool {
        match self {
            RefreshPolicy::Always => true,
            RefreshPolicy::WhenExpiring { threshold } => match credential.expires_at {
                Some(expires_at) => expires_at <= now.saturating_add(threshold.as_secs()),
                None => true,
            },
        }
    }
}

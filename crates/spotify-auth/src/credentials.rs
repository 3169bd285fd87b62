//! Credential storage for OAuth tokens
//!
//! Persists a single credential as a flat YAML mapping at a fixed per-user
//! path (`~/.spotify/auth.yaml` by default). Writes go through a temp file
//! and rename so a crash mid-write never leaves a truncated credential.
//!
//! Reads never fail hard: a missing, unreadable, or corrupt file is reported
//! as [`LoadOutcome::Missing`] or [`LoadOutcome::Unusable`] and the caller
//! runs a fresh authorization.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::constants::{CREDENTIAL_DIR, CREDENTIAL_FILE};
use crate::error::{Error, Result};

/// The persisted OAuth credential.
///
/// `expires_at` is a unix timestamp in seconds, computed from the token
/// response's `expires_in` when the provider sends one. Files written before
/// it existed simply omit the key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Current access token (Bearer token for API calls)
    pub access_token: String,
    /// Refresh token for obtaining new access tokens
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at: None,
        }
    }

    /// Value for the `Authorization` header of API calls.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Result of reading the credential file.
#[derive(Debug)]
pub enum LoadOutcome {
    Found(Credential),
    /// No file at the credential path.
    Missing,
    /// The file exists but could not be read or does not hold a usable
    /// credential.
    Unusable(String),
}

impl LoadOutcome {
    pub fn into_credential(self) -> Option<Credential> {
        match self {
            LoadOutcome::Found(credential) => Some(credential),
            LoadOutcome::Missing | LoadOutcome::Unusable(_) => None,
        }
    }
}

/// Reads and writes the credential file at a fixed path.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<home>/.spotify/auth.yaml`
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine the user's home directory".into()))?;
        Ok(home.join(CREDENTIAL_DIR).join(CREDENTIAL_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored credential.
    pub async fn load(&self) -> LoadOutcome {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return LoadOutcome::Missing,
            Err(e) => return LoadOutcome::Unusable(format!("reading credential file: {e}")),
        };

        let credential: Credential = match serde_yaml::from_str(&contents) {
            Ok(credential) => credential,
            Err(e) => return LoadOutcome::Unusable(format!("parsing credential file: {e}")),
        };

        if credential.access_token.is_empty() {
            return LoadOutcome::Unusable("stored credential has no access token".into());
        }
        if credential.refresh_token.is_empty() {
            return LoadOutcome::Unusable("stored credential has no refresh token".into());
        }

        debug!(path = %self.path.display(), "loaded credential");
        LoadOutcome::Found(credential)
    }

    /// Persist the credential, replacing any previous file.
    ///
    /// Creates the containing directory with mode 0700 when it is missing.
    /// The file itself is written with mode 0600.
    pub async fn save(&self, credential: &Credential) -> Result<()> {
        let yaml = serde_yaml::to_string(credential)
            .map_err(|e| Error::Io(format!("serializing credential: {e}")))?;

        let dir = self
            .path
            .parent()
            .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;

        if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
            create_private_dir(dir).await?;
        }

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| CREDENTIAL_FILE.to_owned());
        let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

        if let Err(e) = write_private(&tmp_path, yaml.as_bytes()).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e);
        }

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

        debug!(path = %self.path.display(), "persisted credential");
        Ok(())
    }
}

async fn create_private_dir(dir: &Path) -> Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder
        .create(dir)
        .await
        .map_err(|e| Error::Io(format!("creating {}: {e}", dir.display())))?;
    debug!(dir = %dir.display(), "created credential directory");
    Ok(())
}

/// Write `bytes` to `path` readable and writable by the owner only.
async fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options
        .open(path)
        .await
        .map_err(|e| Error::Io(format!("creating temp credential file: {e}")))?;
    file.write_all(bytes)
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;
    file.sync_all()
        .await
        .map_err(|e| Error::Io(format!("syncing temp credential file: {e}")))?;

    // mode() only applies on creation; a stale temp file keeps its old bits
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    Ok(())
}

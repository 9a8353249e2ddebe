//! Credential storage for the access/refresh token pair
//!
//! Holds at most one (access, refresh) pair behind a single tokio Mutex, so a
//! pair is always replaced or cleared as a unit. The store is either
//! session-scoped (in memory) or profile-scoped (a JSON file next to the
//! user's config). File writes use atomic temp-file + rename.
//!
//! Storage trouble never fails a caller: an unreadable or corrupt file loads
//! as "no credential", and a failed write keeps the in-memory state. Both are
//! logged at `warn`.

use std::path::{Path, PathBuf};

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// In-memory token state. Empty tokens are never stored.
#[derive(Debug, Default)]
struct Tokens {
    access: Option<Secret<String>>,
    refresh: Option<Secret<String>>,
}

/// On-disk shape, read side.
#[derive(Deserialize, Default)]
struct StoredTokens {
    #[serde(default)]
    access: Option<Secret<String>>,
    #[serde(default)]
    refresh: Option<Secret<String>>,
}

/// On-disk shape, write side. Borrows so no extra token copies are made.
#[derive(Serialize)]
struct StoredTokensRef<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    access: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh: Option<&'a str>,
}

/// Thread-safe holder of the current credential pair.
pub struct CredentialStore {
    path: Option<PathBuf>,
    state: Mutex<Tokens>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl CredentialStore {
    /// Session-scoped store; tokens are lost when the process exits.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(Tokens::default()),
        }
    }

    /// Profile-scoped store backed by `path`.
    ///
    /// A missing file is a cold start with no credential. An unreadable or
    /// corrupt file is treated the same way (storage unavailable degrades to
    /// unauthenticated) and the next write replaces it.
    pub async fn load(path: PathBuf) -> Self {
        let tokens = match read_tokens(&path).await {
            Ok(Some(stored)) => {
                let tokens = Tokens {
                    access: stored.access.filter(|t| !t.expose().is_empty()),
                    refresh: stored.refresh.filter(|t| !t.expose().is_empty()),
                };
                info!(
                    path = %path.display(),
                    has_access = tokens.access.is_some(),
                    has_refresh = tokens.refresh.is_some(),
                    "loaded credentials"
                );
                tokens
            }
            Ok(None) => {
                info!(path = %path.display(), "credential file not found, starting unauthenticated");
                Tokens::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "credential file unusable, starting unauthenticated");
                Tokens::default()
            }
        };

        Self {
            path: Some(path),
            state: Mutex::new(tokens),
        }
    }

    /// Backing file, if this store persists.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current access token, `None` when absent.
    pub async fn access(&self) -> Option<String> {
        let state = self.state.lock().await;
        state.access.as_ref().map(|t| t.expose().clone())
    }

    /// Current refresh token, `None` when absent.
    pub async fn refresh(&self) -> Option<String> {
        let state = self.state.lock().await;
        state.refresh.as_ref().map(|t| t.expose().clone())
    }

    /// Store an access token, or clear it with `None` / an empty string.
    pub async fn set_access(&self, token: Option<String>) {
        let mut state = self.state.lock().await;
        state.access = token.and_then(Secret::<String>::non_empty);
        debug!(present = state.access.is_some(), "access token updated");
        self.persist(&state).await;
    }

    /// Store a refresh token, or clear it with `None` / an empty string.
    pub async fn set_refresh(&self, token: Option<String>) {
        let mut state = self.state.lock().await;
        state.refresh = token.and_then(Secret::<String>::non_empty);
        debug!(present = state.refresh.is_some(), "refresh token updated");
        self.persist(&state).await;
    }

    /// Replace both tokens in one step (login).
    pub async fn set_pair(&self, access: String, refresh: String) {
        let mut state = self.state.lock().await;
        state.access = Secret::<String>::non_empty(access);
        state.refresh = Secret::<String>::non_empty(refresh);
        debug!("credential pair replaced");
        self.persist(&state).await;
    }

    /// Store the result of a refresh made with `used_refresh`.
    ///
    /// Applied only while `used_refresh` is still the stored refresh token;
    /// a logout or login that landed during the refresh wins and `false` is
    /// returned with the store untouched. A rotated refresh token replaces
    /// the old one in the same step.
    pub async fn apply_refresh(
        &self,
        used_refresh: &str,
        access: String,
        rotated: Option<String>,
    ) -> bool {
        let mut state = self.state.lock().await;
        if !holds_refresh(&state, used_refresh) {
            debug!("credentials changed during refresh, result discarded");
            return false;
        }
        state.access = Secret::<String>::non_empty(access);
        if let Some(rotated) = rotated.and_then(Secret::<String>::non_empty) {
            state.refresh = Some(rotated);
        }
        debug!("refreshed access token stored");
        self.persist(&state).await;
        true
    }

    /// Clear both tokens, but only while `used_refresh` is still stored.
    ///
    /// A failed refresh must not wipe a pair obtained by a login that landed
    /// while it was in flight.
    pub async fn clear_if_refresh(&self, used_refresh: &str) -> bool {
        let mut state = self.state.lock().await;
        if !holds_refresh(&state, used_refresh) {
            return false;
        }
        state.access = None;
        state.refresh = None;
        debug!("credentials cleared after failed refresh");
        self.persist(&state).await;
        true
    }

    /// Remove both tokens in one step (logout, terminal refresh failure).
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.access = None;
        state.refresh = None;
        debug!("credentials cleared");
        self.persist(&state).await;
    }

    /// Write the state to disk if this store is file-backed.
    ///
    /// Called with the state lock held so writes land in mutation order.
    async fn persist(&self, state: &Tokens) {
        let Some(path) = &self.path else {
            return;
        };
        let stored = StoredTokensRef {
            access: state.access.as_ref().map(|t| t.expose().as_str()),
            refresh: state.refresh.as_ref().map(|t| t.expose().as_str()),
        };
        if let Err(e) = write_atomic(path, &stored).await {
            warn!(path = %path.display(), error = %e, "failed to persist credentials, keeping them in memory only");
        }
    }
}

fn holds_refresh(state: &Tokens, expected: &str) -> bool {
    state
        .refresh
        .as_ref()
        .is_some_and(|t| t.expose().as_str() == expected)
}

/// Read the credential file. `Ok(None)` when it does not exist.
async fn read_tokens(path: &Path) -> Result<Option<StoredTokens>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(format!("reading credential file: {e}"))),
    };
    if contents.trim().is_empty() {
        return Ok(Some(StoredTokens::default()));
    }
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))
}

/// Write credentials to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains bearer tokens.
async fn write_atomic(path: &Path, data: &StoredTokensRef<'_>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Io("credential path has no file name".into()))?
        .to_string_lossy();
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}

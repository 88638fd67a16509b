//! Credential and authorization-state storage
//!
//! `CredentialStore` is the contract the rest of the gateway depends on.
//! `FileStore` implements it with a JSON file mapping account names to
//! credentials. All writes use atomic temp-file + rename to prevent
//! corruption on crash, and a tokio Mutex serializes concurrent writers
//! (request-time refresh, background refresh, new authorizations).
//!
//! Pending authorization challenges are kept in memory only. They are
//! short-lived and a restart simply means the user re-authorizes.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::credentials::Credential;
use crate::error::{Error, Result};
use crate::pkce::AuthorizationChallenge;

/// How long a pending authorization stays redeemable.
pub const TRANSIENT_STATE_TTL_SECS: i64 = 600;

/// Boxed future returned by store methods, keeping the trait dyn-compatible.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Persistence for named credentials and pending authorization state.
///
/// Missing entries fail with `Error::NotFound`. Uses `Pin<Box<dyn Future>>`
/// return types for dyn-compatibility (`Arc<dyn CredentialStore>`).
pub trait CredentialStore: Send + Sync {
    fn load_credential<'a>(&'a self, account: &'a str) -> StoreFuture<'a, Credential>;

    /// Insert or overwrite; latest write wins.
    fn save_credential<'a>(
        &'a self,
        account: &'a str,
        credential: Credential,
    ) -> StoreFuture<'a, ()>;

    fn save_transient_state<'a>(
        &'a self,
        state: &'a str,
        challenge: AuthorizationChallenge,
    ) -> StoreFuture<'a, ()>;

    fn load_transient_state<'a>(&'a self, state: &'a str) -> StoreFuture<'a, AuthorizationChallenge>;

    /// Idempotent: deleting an unknown state succeeds.
    fn delete_transient_state<'a>(&'a self, state: &'a str) -> StoreFuture<'a, ()>;

    /// Account names, sorted.
    fn list_accounts(&self) -> StoreFuture<'_, Vec<String>>;
}

/// File-backed store.
///
/// The credential Mutex serializes all writes. Reads acquire the lock
/// briefly to clone the in-memory state.
pub struct FileStore {
    path: PathBuf,
    credentials: Mutex<HashMap<String, Credential>>,
    pending: Mutex<HashMap<String, AuthorizationChallenge>>,
    state_ttl: Duration,
}

impl FileStore {
    /// Load credentials from the given file path.
    ///
    /// If the file doesn't exist, creates it as `{}` (cold start with zero
    /// accounts).
    pub async fn load(path: PathBuf) -> Result<Self> {
        let credentials = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            let credentials: HashMap<String, Credential> = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
            info!(path = %path.display(), accounts = credentials.len(), "loaded credentials");
            credentials
        } else {
            info!(path = %path.display(), "credential file not found, starting with empty store");
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| Error::Io(format!("creating credential directory: {e}")))?;
            }
            let empty = HashMap::new();
            write_atomic(&path, &empty).await?;
            empty
        };

        Ok(Self {
            path,
            credentials: Mutex::new(credentials),
            pending: Mutex::new(HashMap::new()),
            state_ttl: Duration::seconds(TRANSIENT_STATE_TTL_SECS),
        })
    }

    /// Override how long pending authorizations stay redeemable.
    pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_expired(&self, challenge: &AuthorizationChallenge) -> bool {
        challenge.created_at + self.state_ttl <= Utc::now()
    }
}

impl CredentialStore for FileStore {
    fn load_credential<'a>(&'a self, account: &'a str) -> StoreFuture<'a, Credential> {
        Box::pin(async move {
            let credentials = self.credentials.lock().await;
            credentials
                .get(account)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("account {account}")))
        })
    }

    fn save_credential<'a>(
        &'a self,
        account: &'a str,
        credential: Credential,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut credentials = self.credentials.lock().await;
            credentials.insert(account.to_string(), credential);
            write_atomic(&self.path, &credentials).await?;
            debug!(account, "saved credential");
            Ok(())
        })
    }

    fn save_transient_state<'a>(
        &'a self,
        state: &'a str,
        challenge: AuthorizationChallenge,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut pending = self.pending.lock().await;
            pending.retain(|_, c| !self.is_expired(c));
            pending.insert(state.to_string(), challenge);
            Ok(())
        })
    }

    fn load_transient_state<'a>(&'a self, state: &'a str) -> StoreFuture<'a, AuthorizationChallenge> {
        Box::pin(async move {
            let pending = self.pending.lock().await;
            pending
                .get(state)
                .filter(|c| !self.is_expired(c))
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("authorization state {state}")))
        })
    }

    fn delete_transient_state<'a>(&'a self, state: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.pending.lock().await.remove(state);
            Ok(())
        })
    }

    fn list_accounts(&self) -> StoreFuture<'_, Vec<String>> {
        Box::pin(async move {
            let credentials = self.credentials.lock().await;
            let mut names: Vec<String> = credentials.keys().cloned().collect();
            names.sort();
            Ok(names)
        })
    }
}

/// Write credentials to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains OAuth tokens.
async fn write_atomic(path: &Path, data: &HashMap<String, Credential>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

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

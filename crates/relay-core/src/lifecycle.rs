//! Credential lifecycle: resolution, refresh and status
//!
//! The store is the single source of truth for token data. `TokenManager`
//! reads it on every resolution and writes refreshed credentials back.
//! Refresh for one account is serialized by a per-account lock; whoever
//! gets the lock second re-reads the store and finds the fresh credential,
//! so concurrent resolvers cost one upstream refresh.
//!
//! Refresh is eager: a credential inside the 60-second skew window is
//! refreshed before use rather than after a 401.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use relay_auth::{
    Credential, CredentialStore, GlobalProxy, OAuthConfig, TransportFactory, effective_proxy,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result, store_error};
use crate::keyed::KeyedLocks;

/// Snapshot of one account's credential state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountStatus {
    pub account: String,
    pub valid: bool,
    pub needs_refresh: bool,
    pub expires_at: DateTime<Utc>,
    pub scopes: Vec<String>,
}

/// Resolves usable credentials and keeps them fresh.
pub struct TokenManager {
    store: Arc<dyn CredentialStore>,
    oauth: OAuthConfig,
    transports: Arc<TransportFactory>,
    global_proxy: Option<GlobalProxy>,
    account_locks: Arc<KeyedLocks>,
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        oauth: OAuthConfig,
        transports: Arc<TransportFactory>,
        global_proxy: Option<GlobalProxy>,
    ) -> Self {
        Self {
            store,
            oauth,
            transports,
            global_proxy,
            account_locks: Arc::new(KeyedLocks::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn global_proxy(&self) -> Option<&GlobalProxy> {
        self.global_proxy.as_ref()
    }

    /// Per-account locks serializing every credential write. Anything else
    /// that saves credentials must take the same lock.
    pub fn account_locks(&self) -> Arc<KeyedLocks> {
        self.account_locks.clone()
    }

    async fn load(&self, account: &str) -> Result<Credential> {
        self.store
            .load_credential(account)
            .await
            .map_err(|e| store_error(account, "load credential", e))
    }

    /// Return a valid credential for `account`, refreshing it first if it is
    /// inside the skew window.
    ///
    /// Fails with `AccountNotFound`, `Refresh` (or `Network` when the token
    /// endpoint was unreachable), or `ExpiredCredential` when the credential
    /// is still unusable afterwards.
    pub async fn resolve(&self, account: &str) -> Result<Credential> {
        let credential = self.load(account).await?;
        if !credential.needs_refresh() {
            return self.ensure_valid(account, credential);
        }

        let _guard = self.account_locks.lock(account).await;
        // Another resolver may have refreshed while we waited
        let credential = self.load(account).await?;
        if !credential.needs_refresh() {
            debug!(account, "credential refreshed by a concurrent caller");
            return self.ensure_valid(account, credential);
        }

        let refreshed = self.refresh_locked(account, &credential).await?;
        self.ensure_valid(account, refreshed)
    }

    fn ensure_valid(&self, account: &str, credential: Credential) -> Result<Credential> {
        if credential.is_valid() {
            Ok(credential)
        } else {
            warn!(account, expires_at = %credential.expires_at, "credential unusable after refresh attempt");
            Err(Error::ExpiredCredential(account.to_string()))
        }
    }

    /// Refresh `credential` and persist the result under `account`.
    ///
    /// The bound proxy descriptor is kept. Takes the account's refresh lock.
    pub async fn refresh(&self, account: &str, credential: &Credential) -> Result<Credential> {
        let _guard = self.account_locks.lock(account).await;
        self.refresh_locked(account, credential).await
    }

    /// Refresh `account` if its credential expires within `threshold`.
    ///
    /// Returns whether a refresh was performed. Used by the background task.
    pub async fn refresh_if_expiring(
        &self,
        account: &str,
        threshold: chrono::Duration,
    ) -> Result<bool> {
        if !self.load(account).await?.expires_within(Utc::now(), threshold) {
            return Ok(false);
        }

        let _guard = self.account_locks.lock(account).await;
        let credential = self.load(account).await?;
        if !credential.expires_within(Utc::now(), threshold) {
            return Ok(false);
        }
        self.refresh_locked(account, &credential).await?;
        Ok(true)
    }

    /// Caller holds the account's refresh lock.
    async fn refresh_locked(&self, account: &str, credential: &Credential) -> Result<Credential> {
        let proxy = effective_proxy(credential.proxy.as_ref(), self.global_proxy.as_ref());
        let client = self.transports.transport(proxy.as_ref()).map_err(Error::Proxy)?;

        debug!(account, proxied = proxy.is_some(), "refreshing access token");
        let refreshed = match relay_auth::refresh_token(&client, &self.oauth, credential).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                metrics::counter!("token_refreshes_total", "result" => "failure").increment(1);
                warn!(account, error = %e, "token refresh failed");
                return Err(if e.is_transport() {
                    Error::Network {
                        account: account.to_string(),
                        step: "refresh",
                        message: e.to_string(),
                        timeout: e.is_timeout(),
                    }
                } else {
                    Error::Refresh {
                        account: account.to_string(),
                        source: e,
                    }
                });
            }
        };

        self.store
            .save_credential(account, refreshed.clone())
            .await
            .map_err(|e| {
                warn!(account, error = %e, "refreshed credential could not be saved");
                Error::store(Some(account), "save refreshed credential", e)
            })?;

        metrics::counter!("token_refreshes_total", "result" => "success").increment(1);
        info!(account, expires_at = %refreshed.expires_at, "token refresh succeeded");
        Ok(refreshed)
    }

    /// Credential state for `account` without refreshing it.
    pub async fn status(&self, account: &str) -> Result<AccountStatus> {
        let credential = self.load(account).await?;
        let now = Utc::now();
        Ok(AccountStatus {
            account: account.to_string(),
            valid: credential.is_valid_at(now),
            needs_refresh: credential.needs_refresh_at(now),
            expires_at: credential.expires_at,
            scopes: credential.scopes,
        })
    }

    pub async fn list_accounts(&self) -> Result<Vec<String>> {
        self.store
            .list_accounts()
            .await
            .map_err(|e| Error::store(None, "list accounts", e))
    }
}

//! Authorization flow: issue a PKCE challenge, redeem it exactly once
//!
//! The authorizer owns state validation. A code is only exchanged when its
//! state was issued here and has not been redeemed or expired. The pending
//! entry is consumed before the exchange, under a per-state lock, so two
//! concurrent completions with the same state cannot both reach the token
//! endpoint. A failed exchange therefore needs a fresh authorization.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use relay_auth::{
    CredentialStore, GlobalProxy, OAuthConfig, ProxyDescriptor, TransportFactory, effective_proxy,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::keyed::KeyedLocks;

/// What a user needs to start authorizing in a browser.
#[derive(Debug, Clone, Serialize)]
pub struct PendingAuthorization {
    pub auth_url: String,
    pub state: String,
    pub code_challenge: String,
}

/// Result of a completed authorization.
#[derive(Debug, Clone, Serialize)]
pub struct CompletedAuthorization {
    pub account: String,
    pub expires_at: DateTime<Utc>,
    pub scopes: Vec<String>,
}

pub struct Authorizer {
    store: Arc<dyn CredentialStore>,
    oauth: OAuthConfig,
    transports: Arc<TransportFactory>,
    global_proxy: Option<GlobalProxy>,
    state_locks: KeyedLocks,
    account_locks: Arc<KeyedLocks>,
}

impl Authorizer {
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
            state_locks: KeyedLocks::new(),
            account_locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Share the token manager's per-account locks so a completed
    /// authorization never interleaves with a refresh of the same account.
    pub fn with_account_locks(mut self, locks: Arc<KeyedLocks>) -> Self {
        self.account_locks = locks;
        self
    }

    /// Generate a challenge and remember it until it is redeemed or expires.
    pub async fn generate_authorization(&self) -> Result<PendingAuthorization> {
        let challenge = relay_auth::generate_challenge(&self.oauth).map_err(|e| match e {
            relay_auth::Error::Randomness(msg) => Error::Randomness(msg),
            other => Error::Configuration(other),
        })?;

        let pending = PendingAuthorization {
            auth_url: challenge.auth_url.clone(),
            state: challenge.state.clone(),
            code_challenge: challenge.code_challenge.clone(),
        };
        self.store
            .save_transient_state(&pending.state, challenge)
            .await
            .map_err(|e| Error::store(None, "save authorization state", e))?;

        info!(state = %pending.state, "authorization issued");
        Ok(pending)
    }

    /// Redeem `state` and exchange `code` for a credential stored under
    /// `account`, bound to `proxy` when given.
    ///
    /// Unknown, expired or already-redeemed states fail with `UnknownState`.
    pub async fn complete_authorization(
        &self,
        code: &str,
        state: &str,
        account: &str,
        proxy: Option<ProxyDescriptor>,
    ) -> Result<CompletedAuthorization> {
        let challenge = {
            let _guard = self.state_locks.lock(state).await;
            let challenge = match self.store.load_transient_state(state).await {
                Ok(challenge) => challenge,
                Err(relay_auth::Error::NotFound(_)) => {
                    warn!(state, account, "authorization state not found");
                    return Err(Error::UnknownState {
                        state: state.to_string(),
                    });
                }
                Err(e) => return Err(Error::store(Some(account), "load authorization state", e)),
            };
            self.store
                .delete_transient_state(state)
                .await
                .map_err(|e| Error::store(Some(account), "delete authorization state", e))?;
            challenge
        };

        let route = effective_proxy(proxy.as_ref(), self.global_proxy.as_ref());
        let client = self.transports.transport(route.as_ref()).map_err(Error::Proxy)?;

        let credential = relay_auth::exchange_code(
            &client,
            &self.oauth,
            code,
            &challenge.code_verifier,
            state,
            proxy,
        )
        .await
        .map_err(|e| {
            warn!(account, error = %e, "authorization code exchange failed");
            Error::Exchange {
                account: account.to_string(),
                source: e,
            }
        })?;

        let completed = CompletedAuthorization {
            account: account.to_string(),
            expires_at: credential.expires_at,
            scopes: credential.scopes.clone(),
        };
        {
            let _guard = self.account_locks.lock(account).await;
            self.store
                .save_credential(account, credential)
                .await
                .map_err(|e| Error::store(Some(account), "save credential", e))?;
        }

        info!(account, expires_at = %completed.expires_at, "authorization completed");
        Ok(completed)
    }
}

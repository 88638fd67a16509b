//! Caller-facing facade
//!
//! Wires the authorizer, token manager and relay around one store and one
//! transport factory, and exposes the operations the HTTP layer calls.

use std::sync::Arc;

use relay_auth::{CredentialStore, GlobalProxy, OAuthConfig, ProxyDescriptor, TransportFactory};
use serde_json::Value;

use crate::authorization::{Authorizer, CompletedAuthorization, PendingAuthorization};
use crate::error::{Error, Result};
use crate::lifecycle::{AccountStatus, TokenManager};
use crate::relay::{Relay, RelayConfig};

/// Everything the gateway needs, fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub oauth: OAuthConfig,
    pub relay: RelayConfig,
    pub global_proxy: Option<GlobalProxy>,
}

pub struct Gateway {
    authorizer: Authorizer,
    tokens: Arc<TokenManager>,
    relay: Relay,
}

impl Gateway {
    /// Outbound calls (token endpoint and relay) share one transport factory
    /// bounded by the relay timeout.
    pub fn new(config: GatewayConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let transports = Arc::new(TransportFactory::new(config.relay.timeout).map_err(Error::Proxy)?);
        let tokens = Arc::new(TokenManager::new(
            store.clone(),
            config.oauth.clone(),
            transports.clone(),
            config.global_proxy.clone(),
        ));
        let authorizer = Authorizer::new(store, config.oauth, transports.clone(), config.global_proxy)
            .with_account_locks(tokens.account_locks());
        let relay = Relay::new(config.relay, tokens.clone(), transports);

        Ok(Self {
            authorizer,
            tokens,
            relay,
        })
    }

    /// Token manager, for the background refresh task.
    pub fn tokens(&self) -> Arc<TokenManager> {
        self.tokens.clone()
    }

    pub async fn generate_authorization(&self) -> Result<PendingAuthorization> {
        self.authorizer.generate_authorization().await
    }

    pub async fn complete_authorization(
        &self,
        code: &str,
        state: &str,
        account: &str,
        proxy: Option<ProxyDescriptor>,
    ) -> Result<CompletedAuthorization> {
        self.authorizer
            .complete_authorization(code, state, account, proxy)
            .await
    }

    pub async fn account_status(&self, account: &str) -> Result<AccountStatus> {
        self.tokens.status(account).await
    }

    pub async fn list_accounts(&self) -> Result<Vec<String>> {
        self.tokens.list_accounts().await
    }

    pub async fn relay(&self, account: &str, payload: &Value) -> Result<Value> {
        self.relay.relay(account, payload).await
    }
}

//! Relay orchestration
//!
//! Per call: resolve a valid credential, pick the network path, forward the
//! caller's JSON payload with the account's bearer token, classify the
//! response. No state survives between calls and nothing is retried; the
//! caller decides on retry using the error kind.
//!
//! Dropping the returned future aborts the upstream call. Nothing read from
//! a cancelled response is persisted.

use std::sync::Arc;
use std::time::Duration;

use relay_auth::{TransportFactory, effective_proxy};
use reqwest::header::USER_AGENT;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::classify::{ResponseClass, classify_response};
use crate::error::{Error, Result};
use crate::lifecycle::TokenManager;

pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_API_VERSION: &str = "2023-06-01";
pub const DEFAULT_BETA_HEADER: &str = "claude-code-20250219,oauth-2025-04-20,interleaved-thinking-2025-05-14,fine-grained-tool-streaming-2025-05-14";
pub const DEFAULT_USER_AGENT: &str = "claude-cli/1.0.53 (external, cli)";

/// Upstream request settings, fixed at construction.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub api_url: String,
    /// Sent as `anthropic-version`
    pub api_version: String,
    /// Sent as `anthropic-beta` when set
    pub beta_header: Option<String>,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            beta_header: Some(DEFAULT_BETA_HEADER.to_string()),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct Relay {
    config: RelayConfig,
    tokens: Arc<TokenManager>,
    transports: Arc<TransportFactory>,
}

fn network_error(account: &str, step: &'static str, e: reqwest::Error) -> Error {
    Error::Network {
        account: account.to_string(),
        step,
        message: e.to_string(),
        timeout: e.is_timeout(),
    }
}

impl Relay {
    pub fn new(
        config: RelayConfig,
        tokens: Arc<TokenManager>,
        transports: Arc<TransportFactory>,
    ) -> Self {
        Self {
            config,
            tokens,
            transports,
        }
    }

    /// Forward `payload` upstream on behalf of `account`.
    ///
    /// Returns the decoded upstream body on 2xx. Otherwise fails with
    /// `RateLimited` or `Upstream`, both carrying status and body.
    pub async fn relay(&self, account: &str, payload: &Value) -> Result<Value> {
        let credential = self.tokens.resolve(account).await?;

        let proxy = effective_proxy(credential.proxy.as_ref(), self.tokens.global_proxy());
        let client = self
            .transports
            .transport(proxy.as_ref())
            .map_err(Error::Proxy)?;

        let mut request = client
            .post(&self.config.api_url)
            .timeout(self.config.timeout)
            .bearer_auth(&credential.access_token)
            .header("anthropic-version", &self.config.api_version)
            .header(USER_AGENT, &self.config.user_agent)
            .json(payload);
        if let Some(beta) = &self.config.beta_header {
            request = request.header("anthropic-beta", beta);
        }

        debug!(account, proxied = proxy.is_some(), "forwarding request upstream");
        let response = request
            .send()
            .await
            .map_err(|e| network_error(account, "relay", e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| network_error(account, "read response", e))?;

        let class = classify_response(status, &body);
        info!(account, status, outcome = class.label(), "upstream response classified");

        match class {
            ResponseClass::Success if body.trim().is_empty() => Ok(Value::Null),
            ResponseClass::Success => {
                serde_json::from_str(&body).map_err(|e| Error::InvalidResponse {
                    account: account.to_string(),
                    message: format!("decoding upstream body: {e}"),
                })
            }
            ResponseClass::RateLimited => {
                warn!(account, status, "upstream rate limit");
                Err(Error::RateLimited {
                    account: account.to_string(),
                    status,
                    body,
                })
            }
            ResponseClass::Upstream => Err(Error::Upstream {
                account: account.to_string(),
                status,
                body,
            }),
        }
    }
}

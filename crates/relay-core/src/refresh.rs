//! Proactive background token refresh
//!
//! Spawns a periodic task that walks every stored account and refreshes
//! credentials approaching expiration, so most relay calls find a fresh
//! token. Refreshes go through the same per-account lock as request-time
//! refresh, so the two never race on a single-use refresh token.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::Error;
use crate::lifecycle::TokenManager;

/// Spawn a background task that proactively refreshes expiring tokens.
///
/// Runs every `interval` and refreshes any credential expiring within
/// `threshold`. Failures are logged and retried on the next cycle.
///
/// Returns a `JoinHandle` for the spawned task.
pub fn spawn_refresh_task(
    tokens: Arc<TokenManager>,
    interval: Duration,
    threshold: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick, credentials were just loaded
        ticker.tick().await;

        loop {
            ticker.tick().await;
            refresh_cycle(&tokens, threshold).await;
        }
    })
}

/// Run one refresh cycle. Returns how many credentials were refreshed.
pub async fn refresh_cycle(tokens: &TokenManager, threshold: Duration) -> usize {
    let accounts = match tokens.list_accounts().await {
        Ok(accounts) => accounts,
        Err(e) => {
            warn!(error = %e, "background refresh could not list accounts");
            return 0;
        }
    };
    let threshold = chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX);

    let mut refreshed = 0;
    for account in &accounts {
        match tokens.refresh_if_expiring(account, threshold).await {
            Ok(true) => {
                refreshed += 1;
                info!(account, "background token refresh succeeded");
            }
            Ok(false) => debug!(account, "token not expiring within threshold"),
            Err(Error::Refresh { source, .. }) => {
                warn!(account, error = %source, "background refresh rejected, account needs re-authorization");
            }
            Err(e) => {
                warn!(account, error = %e, "background refresh failed, will retry next cycle");
            }
        }
    }
    refreshed
}

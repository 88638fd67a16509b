//! HTTP routes
//!
//! Endpoints:
//! - GET  /health                        service status and account count
//! - GET  /metrics                       Prometheus text exposition
//! - POST /oauth/auth-url                start a PKCE authorization
//! - POST /oauth/token                   complete it and store the credential
//! - GET  /oauth/accounts                list stored accounts
//! - GET  /oauth/accounts/{name}/status  credential status, never tokens
//! - POST /api/v1/messages               relay a payload for one account

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use relay_auth::ProxyDescriptor;
use relay_core::{CompletedAuthorization, Gateway, PendingAuthorization};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::error::{ApiError, request_id};

/// Header naming the account when `?account=` is absent.
pub const ACCOUNT_HEADER: &str = "x-account-name";

const SERVICE_NAME: &str = "claude-relay";

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub prometheus: PrometheusHandle,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>, prometheus: PrometheusHandle) -> Self {
        Self {
            gateway,
            prometheus,
            started_at: Instant::now(),
        }
    }
}

/// Build the axum router with all routes and shared state.
///
/// Requests beyond `max_connections` queue in the concurrency limit layer.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/oauth/auth-url", post(auth_url_handler))
        .route("/oauth/token", post(token_handler))
        .route("/oauth/accounts", get(accounts_handler))
        .route("/oauth/accounts/{name}/status", get(status_handler))
        .route("/api/v1/messages", post(messages_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// 200 with the account count while the store answers, 503 otherwise.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.started_at.elapsed().as_secs();
    let (status_code, status, accounts) = match state.gateway.list_accounts().await {
        Ok(accounts) => (StatusCode::OK, "healthy", accounts.len()),
        Err(e) => {
            warn!(error = %e, "health check could not list accounts");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded", 0)
        }
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "service": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "accounts": accounts,
            "uptime_seconds": uptime,
        })),
    )
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

async fn auth_url_handler(
    State(state): State<AppState>,
) -> Result<Json<PendingAuthorization>, ApiError> {
    let pending = state.gateway.generate_authorization().await?;
    Ok(Json(pending))
}

#[derive(Debug, Deserialize)]
struct TokenRequest {
    authorization_code: String,
    state: String,
    account_name: String,
    #[serde(default)]
    proxy_config: Option<ProxyDescriptor>,
}

async fn token_handler(
    State(state): State<AppState>,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<CompletedAuthorization>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let account = request.account_name.trim();
    if account.is_empty() {
        return Err(ApiError::bad_request("account_name must not be empty"));
    }
    if request.authorization_code.trim().is_empty() || request.state.is_empty() {
        return Err(ApiError::bad_request(
            "authorization_code and state are required",
        ));
    }

    let completed = state
        .gateway
        .complete_authorization(
            &request.authorization_code,
            &request.state,
            account,
            request.proxy_config,
        )
        .await?;
    Ok(Json(completed))
}

async fn accounts_handler(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let accounts = state.gateway.list_accounts().await?;
    Ok(Json(json!({ "accounts": accounts })))
}

async fn status_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let status = state
        .gateway
        .account_status(&name)
        .await
        .map_err(|e| match e {
            relay_core::Error::AccountNotFound(_) => ApiError::not_found(e.to_string()),
            other => ApiError::from(other),
        })?;

    Ok(Json(json!({
        "account": status.account,
        "is_valid": status.valid,
        "need_refresh": status.needs_refresh,
        "expires_at": status.expires_at,
        "scopes": status.scopes,
    })))
}

#[derive(Debug, Default, Deserialize)]
struct RelayParams {
    account: Option<String>,
}

/// Query parameter first, then the account header.
fn account_from(params: RelayParams, headers: &HeaderMap) -> Option<String> {
    params
        .account
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .or_else(|| {
            headers
                .get(ACCOUNT_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(String::from)
        })
}

async fn messages_handler(
    State(state): State<AppState>,
    Query(params): Query<RelayParams>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request_id = request_id();

    let Some(account) = account_from(params, &headers) else {
        return Err(ApiError::bad_request(format!(
            "account is required (?account= or {ACCOUNT_HEADER} header)"
        ))
        .with_request_id(request_id));
    };
    let Json(payload) = body
        .map_err(|e| ApiError::bad_request(e.body_text()).with_request_id(request_id.clone()))?;

    let started = Instant::now();
    let result = state.gateway.relay(&account, &payload).await;
    let elapsed = started.elapsed().as_secs_f64();

    match result {
        Ok(reply) => {
            crate::metrics::record_relay("success", elapsed);
            info!(request_id, account, duration_secs = elapsed, "request relayed");
            Ok(Json(reply))
        }
        Err(e) => {
            crate::metrics::record_relay(e.label(), elapsed);
            warn!(
                request_id,
                account,
                outcome = e.label(),
                status = e.upstream_status(),
                error = %e,
                "relay failed"
            );
            Err(ApiError::from(e).with_request_id(request_id))
        }
    }
}

//! In-process stand-ins for the token endpoint and the relay target.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use relay_auth::{AuthorizationChallenge, Credential, CredentialStore, FileStore, StoreFuture};
use serde_json::{Value, json};
use tempfile::TempDir;

pub fn credential_expiring_in(secs: i64) -> Credential {
    Credential {
        access_token: "at_initial".into(),
        refresh_token: "rt_initial".into(),
        expires_at: Utc::now() + chrono::Duration::seconds(secs),
        scopes: vec!["user:inference".into()],
        proxy: None,
    }
}

/// File store in a fresh temp dir, seeded with `accounts`.
pub async fn test_store(accounts: &[(&str, Credential)]) -> (TempDir, Arc<dyn CredentialStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::load(dir.path().join("credentials.json"))
        .await
        .unwrap();
    for (name, credential) in accounts {
        store.save_credential(name, credential.clone()).await.unwrap();
    }
    (dir, Arc::new(store))
}

/// Delegates to `inner` but fails every credential save with a disk error.
pub struct FailingSaveStore {
    pub inner: Arc<dyn CredentialStore>,
}

impl CredentialStore for FailingSaveStore {
    fn load_credential<'a>(&'a self, account: &'a str) -> StoreFuture<'a, Credential> {
        self.inner.load_credential(account)
    }

    fn save_credential<'a>(&'a self, _account: &'a str, _credential: Credential) -> StoreFuture<'a, ()> {
        Box::pin(async { Err(relay_auth::Error::Io("disk full".into())) })
    }

    fn save_transient_state<'a>(
        &'a self,
        state: &'a str,
        challenge: AuthorizationChallenge,
    ) -> StoreFuture<'a, ()> {
        self.inner.save_transient_state(state, challenge)
    }

    fn load_transient_state<'a>(&'a self, state: &'a str) -> StoreFuture<'a, AuthorizationChallenge> {
        self.inner.load_transient_state(state)
    }

    fn delete_transient_state<'a>(&'a self, state: &'a str) -> StoreFuture<'a, ()> {
        self.inner.delete_transient_state(state)
    }

    fn list_accounts(&self) -> StoreFuture<'_, Vec<String>> {
        self.inner.list_accounts()
    }
}

async fn serve(app: Router) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[derive(Clone)]
struct TokenBehavior {
    hits: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<Value>>>,
    delay: Duration,
    status: StatusCode,
    lifetime_secs: u64,
}

async fn token_handler(
    State(behavior): State<TokenBehavior>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let n = behavior.hits.fetch_add(1, Ordering::SeqCst) + 1;
    behavior.bodies.lock().unwrap().push(body);
    tokio::time::sleep(behavior.delay).await;

    if !behavior.status.is_success() {
        return (behavior.status, Json(json!({"error": "invalid_grant"})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "access_token": format!("at_refreshed_{n}"),
            "refresh_token": format!("rt_refreshed_{n}"),
            "expires_in": behavior.lifetime_secs,
            "token_type": "Bearer",
            "scope": "user:profile user:inference",
        })),
    )
}

/// Token endpoint that numbers every token it issues (`at_refreshed_<n>`).
pub struct MockTokenEndpoint {
    addr: std::net::SocketAddr,
    hits: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<Value>>>,
}

impl MockTokenEndpoint {
    async fn spawn_with(delay: Duration, status: StatusCode, lifetime_secs: u64) -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let behavior = TokenBehavior {
            hits: hits.clone(),
            bodies: bodies.clone(),
            delay,
            status,
            lifetime_secs,
        };
        let app = Router::new()
            .route("/v1/oauth/token", post(token_handler))
            .with_state(behavior);
        Self {
            addr: serve(app).await,
            hits,
            bodies,
        }
    }

    pub async fn spawn() -> Self {
        Self::spawn_with(Duration::ZERO, StatusCode::OK, 3600).await
    }

    pub async fn spawn_with_delay(delay: Duration) -> Self {
        Self::spawn_with(delay, StatusCode::OK, 3600).await
    }

    pub async fn spawn_with_lifetime(lifetime_secs: u64) -> Self {
        Self::spawn_with(Duration::ZERO, StatusCode::OK, lifetime_secs).await
    }

    /// Answers every request with 401.
    pub async fn spawn_rejecting() -> Self {
        Self::spawn_with(Duration::ZERO, StatusCode::UNAUTHORIZED, 3600).await
    }

    pub fn token_url(&self) -> String {
        format!("http://{}/v1/oauth/token", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// JSON bodies received so far, in arrival order.
    pub fn bodies(&self) -> Vec<Value> {
        self.bodies.lock().unwrap().clone()
    }
}

#[derive(Clone)]
struct UpstreamBehavior {
    status: StatusCode,
    body: &'static str,
    delay: Duration,
    requests: Arc<Mutex<Vec<(HeaderMap, Value)>>>,
}

async fn upstream_handler(
    State(behavior): State<UpstreamBehavior>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    let parsed = serde_json::from_str(&body).unwrap_or(Value::Null);
    behavior.requests.lock().unwrap().push((headers, parsed));
    tokio::time::sleep(behavior.delay).await;
    (
        behavior.status,
        [(header::CONTENT_TYPE, "application/json")],
        behavior.body,
    )
}

/// Relay target answering every request with a fixed status and body.
pub struct MockUpstream {
    addr: std::net::SocketAddr,
    requests: Arc<Mutex<Vec<(HeaderMap, Value)>>>,
}

impl MockUpstream {
    pub async fn spawn(status: StatusCode, body: &'static str) -> Self {
        Self::spawn_with_delay(status, body, Duration::ZERO).await
    }

    pub async fn spawn_with_delay(status: StatusCode, body: &'static str, delay: Duration) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let behavior = UpstreamBehavior {
            status,
            body,
            delay,
            requests: requests.clone(),
        };
        let app = Router::new()
            .route("/v1/messages", post(upstream_handler))
            .with_state(behavior);
        Self {
            addr: serve(app).await,
            requests,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}/v1/messages", self.addr)
    }

    pub fn requests(&self) -> Vec<(HeaderMap, Value)> {
        self.requests.lock().unwrap().clone()
    }
}

//! OAuth token exchange and refresh
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (completes the PKCE flow)
//! 2. Token refresh (proactive, before the expiry skew window)
//!
//! Both POST a JSON body to `OAuthConfig::token_url` with different grant
//! types. The caller supplies the `reqwest::Client`, already routed through
//! whichever proxy applies, so this module never picks a network path.

use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::OAuthConfig;
use crate::credentials::Credential;
use crate::error::{Error, Result};
use crate::proxy::ProxyDescriptor;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Body of a token endpoint request.
#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_uri: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code_verifier: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
}

/// Response from the token endpoint for both exchange and refresh.
///
/// `expires_in` is a delta in seconds from the response time. Refresh
/// responses may omit `refresh_token` and `scope`.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: String,
    /// Space-separated granted scopes
    #[serde(default)]
    pub scope: String,
}

impl TokenResponse {
    /// Convert into a credential with absolute expiry `now + expires_in`.
    ///
    /// Missing refresh token or scopes fall back to `previous`, if given.
    pub fn into_credential(
        self,
        now: DateTime<Utc>,
        previous: Option<&Credential>,
        proxy: Option<ProxyDescriptor>,
    ) -> Credential {
        let expires_in = self.expires_in.min(u64::from(u32::MAX));
        let expires_at = now + Duration::seconds(expires_in as i64);

        let refresh_token = match (self.refresh_token.is_empty(), previous) {
            (true, Some(prev)) => prev.refresh_token.clone(),
            _ => self.refresh_token,
        };

        let mut scopes: Vec<String> = self.scope.split_whitespace().map(String::from).collect();
        if scopes.is_empty() {
            if let Some(prev) = previous {
                scopes = prev.scopes.clone();
            }
        }

        Credential {
            access_token: self.access_token,
            refresh_token,
            expires_at,
            scopes,
            proxy,
        }
    }
}

/// Strip anything accidentally pasted after the code: a URL fragment
/// first, then any trailing query parameters.
pub fn clean_code(code: &str) -> &str {
    let code = code.trim();
    let code = code.split('#').next().unwrap_or(code);
    code.split('&').next().unwrap_or(code)
}

fn transport_error(step: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("{step}: {e}"))
    } else {
        Error::Http(format!("{step} request failed: {e}"))
    }
}

async fn send_token_request(
    client: &reqwest::Client,
    config: &OAuthConfig,
    request: &TokenRequest<'_>,
) -> Result<std::result::Result<TokenResponse, (StatusCode, String)>> {
    let response = client
        .post(&config.token_url)
        .header("Accept", "application/json, text/plain, */*")
        .header("User-Agent", BROWSER_USER_AGENT)
        .header("Accept-Language", "en-US,en;q=0.9")
        .header("Referer", "https://claude.ai/")
        .header("Origin", "https://claude.ai")
        .json(request)
        .send()
        .await
        .map_err(|e| transport_error(request.grant_type, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Ok(Err((status, body)));
    }

    let body = response
        .text()
        .await
        .map_err(|e| transport_error("reading token response", e))?;
    serde_json::from_str::<TokenResponse>(&body)
        .map(Ok)
        .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))
}

/// Exchange an authorization code for a credential.
///
/// `proxy` is bound to the resulting credential; the request itself goes
/// out on `client`.
pub async fn exchange_code(
    client: &reqwest::Client,
    config: &OAuthConfig,
    code: &str,
    verifier: &str,
    state: &str,
    proxy: Option<ProxyDescriptor>,
) -> Result<Credential> {
    let request = TokenRequest {
        grant_type: "authorization_code",
        client_id: &config.client_id,
        code: Some(clean_code(code)),
        refresh_token: None,
        redirect_uri: Some(&config.redirect_uri),
        code_verifier: Some(verifier),
        state: Some(state),
    };

    match send_token_request(client, config, &request).await? {
        Ok(token) => {
            debug!(scope = %token.scope, expires_in = token.expires_in, "authorization code exchanged");
            Ok(token.into_credential(Utc::now(), None, proxy))
        }
        Err((status, body)) => Err(Error::TokenExchange(format!(
            "token endpoint returned {status}: {body}"
        ))),
    }
}

/// Refresh `credential` using its refresh token.
///
/// The bound proxy descriptor carries over unchanged.
pub async fn refresh_token(
    client: &reqwest::Client,
    config: &OAuthConfig,
    credential: &Credential,
) -> Result<Credential> {
    let request = TokenRequest {
        grant_type: "refresh_token",
        client_id: &config.client_id,
        code: None,
        refresh_token: Some(&credential.refresh_token),
        redirect_uri: None,
        code_verifier: None,
        state: None,
    };

    match send_token_request(client, config, &request).await? {
        Ok(token) => Ok(token.into_credential(
            Utc::now(),
            Some(credential),
            credential.proxy.clone(),
        )),
        // 401/403 means the refresh token is revoked or invalid
        Err((status, body))
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN =>
        {
            Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {body}"
            )))
        }
        Err((status, body)) => Err(Error::TokenExchange(format!(
            "token refresh returned {status}: {body}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration as StdDuration;

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;

    use super::*;
    use crate::proxy::ProxyKind;

    #[derive(Clone)]
    struct MockToken {
        status: AxumStatus,
        body: String,
        seen: Arc<Mutex<Vec<(HeaderMap, Value)>>>,
    }

    async fn token_handler(
        State(mock): State<MockToken>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (AxumStatus, String) {
        mock.seen.lock().unwrap().push((headers, body));
        (mock.status, mock.body.clone())
    }

    /// Spawn a token endpoint that answers every request with `status`/`body`.
    async fn spawn_token_endpoint(
        status: AxumStatus,
        body: &str,
    ) -> (OAuthConfig, Arc<Mutex<Vec<(HeaderMap, Value)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mock = MockToken {
            status,
            body: body.to_string(),
            seen: seen.clone(),
        };
        let app = Router::new()
            .route("/v1/oauth/token", post(token_handler))
            .with_state(mock);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = OAuthConfig {
            token_url: format!("http://{addr}/v1/oauth/token"),
            ..OAuthConfig::default()
        };
        (config, seen)
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(StdDuration::from_secs(5))
            .build()
            .unwrap()
    }

    fn stored_credential() -> Credential {
        Credential {
            access_token: "at_old".into(),
            refresh_token: "rt_old".into(),
            expires_at: Utc::now(),
            scopes: vec!["user:profile".into(), "user:inference".into()],
            proxy: Some(ProxyDescriptor::new(ProxyKind::Socks5, "s.local", 1080)),
        }
    }

    #[test]
    fn clean_code_strips_fragment_then_query() {
        assert_eq!(clean_code("abc#state=xyz"), "abc");
        assert_eq!(clean_code("abc&state=xyz"), "abc");
        assert_eq!(clean_code("abc&x=1#frag"), "abc");
        assert_eq!(clean_code("  abc  "), "abc");
        assert_eq!(clean_code("abc"), "abc");
    }

    #[test]
    fn token_response_tolerates_missing_optionals() {
        let json = r#"{"access_token":"at_abc","expires_in":3600}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "at_abc");
        assert!(token.refresh_token.is_empty());
        assert!(token.scope.is_empty());
    }

    #[test]
    fn into_credential_computes_absolute_expiry() {
        let now = Utc::now();
        let token = TokenResponse {
            access_token: "at".into(),
            refresh_token: "rt".into(),
            expires_in: 3600,
            token_type: "Bearer".into(),
            scope: "user:profile user:inference".into(),
        };
        let cred = token.into_credential(now, None, None);
        assert_eq!(cred.expires_at, now + Duration::seconds(3600));
        assert_eq!(cred.scopes, vec!["user:profile", "user:inference"]);
    }

    #[test]
    fn into_credential_keeps_previous_refresh_token_and_scopes() {
        let previous = stored_credential();
        let token = TokenResponse {
            access_token: "at_new".into(),
            refresh_token: String::new(),
            expires_in: 60,
            token_type: String::new(),
            scope: String::new(),
        };
        let cred = token.into_credential(Utc::now(), Some(&previous), None);
        assert_eq!(cred.refresh_token, "rt_old");
        assert_eq!(cred.scopes, previous.scopes);
    }

    #[tokio::test]
    async fn exchange_sends_pkce_fields_and_builds_credential() {
        let (config, seen) = spawn_token_endpoint(
            AxumStatus::OK,
            r#"{"access_token":"at_new","refresh_token":"rt_new","expires_in":3600,"token_type":"Bearer","scope":"user:inference"}"#,
        )
        .await;

        let proxy = ProxyDescriptor::new(ProxyKind::Http, "p.local", 8080);
        let cred = exchange_code(
            &client(),
            &config,
            "the-code#state=abc",
            "verifier-1",
            "state-1",
            Some(proxy.clone()),
        )
        .await
        .unwrap();

        assert_eq!(cred.access_token, "at_new");
        assert_eq!(cred.refresh_token, "rt_new");
        assert_eq!(cred.scopes, vec!["user:inference"]);
        assert_eq!(cred.proxy, Some(proxy));
        assert!(cred.is_valid());

        let seen = seen.lock().unwrap();
        let (headers, body) = &seen[0];
        assert_eq!(body["grant_type"], "authorization_code");
        assert_eq!(body["code"], "the-code");
        assert_eq!(body["code_verifier"], "verifier-1");
        assert_eq!(body["state"], "state-1");
        assert_eq!(body["client_id"], config.client_id);
        assert_eq!(body["redirect_uri"], config.redirect_uri);
        assert_eq!(headers["origin"], "https://claude.ai");
        assert_eq!(headers["referer"], "https://claude.ai/");
    }

    #[tokio::test]
    async fn exchange_non_success_carries_status_and_body() {
        let (config, _) =
            spawn_token_endpoint(AxumStatus::BAD_REQUEST, r#"{"error":"invalid_grant"}"#).await;
        let err = exchange_code(&client(), &config, "bad", "v", "s", None)
            .await
            .unwrap_err();
        match err {
            Error::TokenExchange(msg) => {
                assert!(msg.contains("400"), "got: {msg}");
                assert!(msg.contains("invalid_grant"), "got: {msg}");
            }
            other => panic!("expected TokenExchange, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exchange_malformed_body_is_exchange_error() {
        let (config, _) = spawn_token_endpoint(AxumStatus::OK, "not json").await;
        let err = exchange_code(&client(), &config, "c", "v", "s", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TokenExchange(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn exchange_unreachable_endpoint_is_transport_error() {
        let config = OAuthConfig {
            token_url: "http://127.0.0.1:1/v1/oauth/token".into(),
            ..OAuthConfig::default()
        };
        let err = exchange_code(&client(), &config, "c", "v", "s", None)
            .await
            .unwrap_err();
        assert!(err.is_transport(), "got {err:?}");
    }

    #[tokio::test]
    async fn refresh_preserves_proxy_and_missing_fields() {
        let (config, seen) =
            spawn_token_endpoint(AxumStatus::OK, r#"{"access_token":"at_new","expires_in":7200}"#)
                .await;
        let previous = stored_credential();

        let cred = refresh_token(&client(), &config, &previous).await.unwrap();
        assert_eq!(cred.access_token, "at_new");
        assert_eq!(cred.refresh_token, "rt_old");
        assert_eq!(cred.scopes, previous.scopes);
        assert_eq!(cred.proxy, previous.proxy);

        let seen = seen.lock().unwrap();
        let body = &seen[0].1;
        assert_eq!(body["grant_type"], "refresh_token");
        assert_eq!(body["refresh_token"], "rt_old");
        assert!(body.get("code_verifier").is_none());
    }

    #[tokio::test]
    async fn refresh_rejected_token_is_invalid_credentials() {
        let (config, _) =
            spawn_token_endpoint(AxumStatus::UNAUTHORIZED, r#"{"error":"invalid_grant"}"#).await;
        let err = refresh_token(&client(), &config, &stored_credential())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn refresh_server_error_is_exchange_error() {
        let (config, _) = spawn_token_endpoint(AxumStatus::BAD_GATEWAY, "upstream down").await;
        let err = refresh_token(&client(), &config, &stored_credential())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TokenExchange(ref m) if m.contains("502")), "got {err:?}");
    }
}

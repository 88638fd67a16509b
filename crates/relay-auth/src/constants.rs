//! OAuth client defaults
//!
//! Public OAuth client configuration matching the Claude CLI. These values
//! are not secrets, they identify the public client application. The actual
//! secrets (access/refresh tokens) are managed by the credential store.

use serde::Deserialize;

/// Public OAuth client ID (same as Claude CLI)
pub const DEFAULT_CLIENT_ID: &str = "9d1c250a-e61b-44d9-88ed-5944d1962f5e";

/// OAuth redirect URI (hosted callback page that displays the code)
pub const DEFAULT_REDIRECT_URI: &str = "https://console.anthropic.com/oauth/code/callback";

/// Token endpoint for code exchange and token refresh
pub const DEFAULT_TOKEN_URL: &str = "https://console.anthropic.com/v1/oauth/token";

/// Authorization endpoint
pub const DEFAULT_AUTHORIZE_URL: &str = "https://claude.ai/oauth/authorize";

/// Scopes requested during authorization (space-separated).
pub const DEFAULT_SCOPES: &str = "org:create_api_key user:profile user:inference";

/// Safety margin subtracted from a credential's expiry. A credential inside
/// this window is treated as due for refresh and no longer valid.
pub const EXPIRY_SKEW_SECS: i64 = 60;

/// PKCE challenge method. Only S256 is ever sent.
pub const CHALLENGE_METHOD: &str = "S256";

/// OAuth client settings used for authorization URLs and token requests.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OAuthConfig {
    pub client_id: String,
    pub authorize_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub scopes: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scopes: DEFAULT_SCOPES.to_string(),
        }
    }
}

//! PKCE (Proof Key for Code Exchange) implementation per RFC 7636
//!
//! Generates the verifier/challenge/state triple for one authorization
//! attempt. The verifier stays server-side (in the transient state store)
//! and is sent during token exchange; the challenge goes into the
//! authorization URL so the authorization server can verify the exchange
//! came from the party that started the flow.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::TryRngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::{CHALLENGE_METHOD, OAuthConfig};
use crate::error::{Error, Result};

/// Random bytes behind both the verifier and the state token.
const RANDOM_BYTES: usize = 32;

/// One authorization attempt. Single use: deleted once exchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationChallenge {
    pub code_verifier: String,
    pub code_challenge: String,
    pub state: String,
    pub auth_url: String,
    pub created_at: DateTime<Utc>,
}

fn random_bytes() -> Result<[u8; RANDOM_BYTES]> {
    let mut bytes = [0u8; RANDOM_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| Error::Randomness(e.to_string()))?;
    Ok(bytes)
}

/// Generate a PKCE code verifier from the OS entropy source.
///
/// 32 random bytes, URL-safe base64 without padding (43 characters).
pub fn generate_verifier() -> Result<String> {
    Ok(URL_SAFE_NO_PAD.encode(random_bytes()?))
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generate the opaque state token: 32 random bytes, hex encoded.
pub fn generate_state() -> Result<String> {
    Ok(hex::encode(random_bytes()?))
}

/// Build the authorization URL with all required OAuth parameters.
pub fn build_authorization_url(config: &OAuthConfig, challenge: &str, state: &str) -> Result<String> {
    let url = url::Url::parse_with_params(
        &config.authorize_url,
        &[
            ("code", "true"),
            ("client_id", config.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("scope", config.scopes.as_str()),
            ("code_challenge", challenge),
            ("code_challenge_method", CHALLENGE_METHOD),
            ("state", state),
        ],
    )
    .map_err(|e| Error::InvalidUrl(format!("authorize URL {}: {e}", config.authorize_url)))?;
    Ok(url.into())
}

/// Generate a fresh verifier, challenge, state and authorization URL.
pub fn generate_challenge(config: &OAuthConfig) -> Result<AuthorizationChallenge> {
    let code_verifier = generate_verifier()?;
    let code_challenge = compute_challenge(&code_verifier);
    let state = generate_state()?;
    let auth_url = build_authorization_url(config, &code_challenge, &state)?;

    Ok(AuthorizationChallenge {
        code_verifier,
        code_challenge,
        state,
        auth_url,
        created_at: Utc::now(),
    })
}

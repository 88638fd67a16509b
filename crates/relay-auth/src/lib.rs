//! OAuth authentication library for the Claude relay
//!
//! Provides PKCE flow generation, token exchange/refresh, the shared entity
//! types, credential storage, and outbound transport construction. This
//! crate has no dependency on the relay orchestration or the service binary
//! and can be tested and used independently.
//!
//! Credential flow:
//! 1. `pkce::generate_challenge()` produces verifier, challenge, state and URL
//! 2. User authorizes via the URL and pastes back the code
//! 3. `token::exchange_code()` turns code + verifier into a `Credential`
//! 4. Credential stored via `CredentialStore::save_credential()`
//! 5. `token::refresh_token()` renews it before the expiry skew window

pub mod constants;
pub mod credentials;
pub mod error;
pub mod pkce;
pub mod proxy;
pub mod store;
pub mod token;

pub use constants::*;
pub use credentials::Credential;
pub use error::{Error, Result};
pub use pkce::{
    AuthorizationChallenge, build_authorization_url, compute_challenge, generate_challenge,
    generate_state, generate_verifier,
};
pub use proxy::{
    GlobalProxy, ProxyDescriptor, ProxyKind, TransportFactory, build_transport, effective_proxy,
};
pub use store::{CredentialStore, FileStore, StoreFuture};
pub use token::{TokenResponse, clean_code, exchange_code, refresh_token};

//! Credential lifecycle and relay orchestration for the Claude relay
//!
//! Builds on `relay-auth` to keep per-account OAuth credentials usable and
//! to forward client payloads upstream with them. Components receive their
//! configuration at construction; nothing here reads the environment.
//!
//! Request lifecycle:
//! 1. `Gateway::relay` asks `TokenManager::resolve` for a valid credential
//! 2. A credential inside the 60s skew window is refreshed under a
//!    per-account lock and written back to the store
//! 3. The effective proxy (global if enabled, else per-credential) picks
//!    the transport
//! 4. The payload goes upstream with the bearer token and version headers
//! 5. The response is classified as success, rate limit or upstream error
//!
//! A background task (`spawn_refresh_task`) refreshes credentials that are
//! about to expire so most requests skip step 2.

pub mod authorization;
pub mod classify;
pub mod error;
pub mod gateway;
pub mod keyed;
pub mod lifecycle;
pub mod refresh;
pub mod relay;

#[cfg(test)]
mod test_support;

pub use authorization::{Authorizer, CompletedAuthorization, PendingAuthorization};
pub use classify::{ResponseClass, classify_response, is_rate_limited};
pub use error::{Error, ErrorKind, Result};
pub use gateway::{Gateway, GatewayConfig};
pub use keyed::KeyedLocks;
pub use lifecycle::{AccountStatus, TokenManager};
pub use refresh::{refresh_cycle, spawn_refresh_task};
pub use relay::{
    DEFAULT_API_URL, DEFAULT_API_VERSION, DEFAULT_BETA_HEADER, DEFAULT_USER_AGENT, Relay,
    RelayConfig,
};

//! Error types for authorization, credential lifecycle and relay operations

/// Coarse failure class callers use to pick a response and a backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No usable credential (unknown account, rejected exchange or refresh)
    Auth,
    RateLimited,
    /// Non-2xx from the relay target
    Upstream,
    /// Transport failure or timeout; caller may retry
    Network,
    InvalidRequest,
    Configuration,
    Internal,
}

/// Errors from gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("entropy source unavailable: {0}")]
    Randomness(String),

    #[error("authorization state {state} is unknown, expired or already used")]
    UnknownState { state: String },

    #[error("code exchange for account {account} failed: {source}")]
    Exchange {
        account: String,
        #[source]
        source: relay_auth::Error,
    },

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("token refresh for account {account} failed: {source}")]
    Refresh {
        account: String,
        #[source]
        source: relay_auth::Error,
    },

    #[error("no valid credential for account {0} after refresh")]
    ExpiredCredential(String),

    #[error("proxy configuration error: {0}")]
    Proxy(#[source] relay_auth::Error),

    #[error("OAuth configuration error: {0}")]
    Configuration(#[source] relay_auth::Error),

    #[error("network error during {step} for account {account}: {message}")]
    Network {
        account: String,
        step: &'static str,
        message: String,
        timeout: bool,
    },

    #[error("account {account} rate limited by upstream ({status}): {body}")]
    RateLimited {
        account: String,
        status: u16,
        body: String,
    },

    #[error("upstream returned {status} for account {account}: {body}")]
    Upstream {
        account: String,
        status: u16,
        body: String,
    },

    #[error("invalid upstream response for account {account}: {message}")]
    InvalidResponse { account: String, message: String },

    #[error("credential store error during {step}{}: {source}", for_account(.account))]
    Store {
        account: Option<String>,
        step: &'static str,
        #[source]
        source: relay_auth::Error,
    },
}

fn for_account(account: &Option<String>) -> String {
    account
        .as_deref()
        .map(|a| format!(" for account {a}"))
        .unwrap_or_default()
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownState { .. } => ErrorKind::InvalidRequest,
            Error::Exchange { source, .. } if source.is_transport() => ErrorKind::Network,
            Error::Exchange { .. }
            | Error::AccountNotFound(_)
            | Error::Refresh { .. }
            | Error::ExpiredCredential(_) => ErrorKind::Auth,
            Error::RateLimited { .. } => ErrorKind::RateLimited,
            Error::Upstream { .. } | Error::InvalidResponse { .. } => ErrorKind::Upstream,
            Error::Network { .. } => ErrorKind::Network,
            Error::Proxy(_) | Error::Configuration(_) => ErrorKind::Configuration,
            Error::Randomness(_) | Error::Store { .. } => ErrorKind::Internal,
        }
    }

    /// Rate limiting is a kind of upstream failure.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Error::RateLimited { .. } | Error::Upstream { .. })
    }

    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Error::RateLimited { status, .. } | Error::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Response body read from the upstream, when there was one.
    pub fn upstream_body(&self) -> Option<&str> {
        match self {
            Error::RateLimited { body, .. } | Error::Upstream { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Network { timeout: true, .. })
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Auth => "auth_error",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Upstream => "upstream_error",
            ErrorKind::Network if self.is_timeout() => "timeout",
            ErrorKind::Network => "network_error",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Configuration => "configuration_error",
            ErrorKind::Internal => "internal_error",
        }
    }
}

impl Error {
    pub(crate) fn store(
        account: Option<&str>,
        step: &'static str,
        source: relay_auth::Error,
    ) -> Self {
        Error::Store {
            account: account.map(str::to_string),
            step,
            source,
        }
    }
}

/// Map a credential load failure: a missing entry means the account doesn't exist.
pub(crate) fn store_error(account: &str, step: &'static str, err: relay_auth::Error) -> Error {
    match err {
        relay_auth::Error::NotFound(_) => Error::AccountNotFound(account.to_string()),
        other => Error::store(Some(account), step, other),
    }
}

/// Result alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

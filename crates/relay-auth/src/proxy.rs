//! Proxy descriptors and outbound transport construction
//!
//! A `ProxyDescriptor` names the network path for a single outbound call.
//! Two descriptors can apply to a call: the process-wide `GlobalProxy`
//! (wins when enabled) and the one bound to a credential (fallback). The
//! precedence is resolved by `effective_proxy`; the transport factory only
//! turns the chosen descriptor into a `reqwest::Client`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::form_urlencoded::byte_serialize;

use crate::error::{Error, Result};

/// Transport kind of a proxy descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProxyKind {
    None,
    Http,
    Https,
    Socks5,
}

impl ProxyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyKind::None => "none",
            ProxyKind::Http => "http",
            ProxyKind::Https => "https",
            ProxyKind::Socks5 => "socks5",
        }
    }

    /// URL scheme handed to reqwest. SOCKS5 uses `socks5h` so the proxy
    /// resolves the upstream hostname, not the local resolver.
    fn scheme(&self) -> Option<&'static str> {
        match self {
            ProxyKind::None => None,
            ProxyKind::Http => Some("http"),
            ProxyKind::Https => Some("https"),
            ProxyKind::Socks5 => Some("socks5h"),
        }
    }
}

impl FromStr for ProxyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(ProxyKind::None),
            "http" => Ok(ProxyKind::Http),
            "https" => Ok(ProxyKind::Https),
            "socks5" => Ok(ProxyKind::Socks5),
            other => Err(Error::UnsupportedProxyType(other.to_string())),
        }
    }
}

impl TryFrom<String> for ProxyKind {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ProxyKind> for String {
    fn from(kind: ProxyKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network path for one outbound call.
///
/// Serialized with the field name `type` for the kind, matching the stored
/// credential layout. Empty username/password strings count as absent.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyDescriptor {
    #[serde(rename = "type")]
    pub kind: ProxyKind,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ProxyDescriptor {
    pub fn new(kind: ProxyKind, host: impl Into<String>, port: u16) -> Self {
        Self {
            kind,
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Whether this descriptor means "no proxy".
    pub fn is_direct(&self) -> bool {
        self.kind == ProxyKind::None
    }

    /// Username/password pair, only when both are present and non-empty.
    fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }

    /// Proxy URL with percent-encoded credentials embedded when present.
    ///
    /// Returns `None` for a direct descriptor.
    pub fn proxy_url(&self) -> Result<Option<String>> {
        let Some(scheme) = self.kind.scheme() else {
            return Ok(None);
        };
        if self.host.trim().is_empty() {
            return Err(Error::InvalidProxy(format!("{} proxy has no host", self.kind)));
        }
        if self.port == 0 {
            return Err(Error::InvalidProxy(format!(
                "{} proxy {} has no port",
                self.kind, self.host
            )));
        }

        let url = match self.credentials() {
            Some((user, pass)) => format!(
                "{scheme}://{}:{}@{}",
                encode(user),
                encode(pass),
                self.authority()
            ),
            None => format!("{scheme}://{}", self.authority()),
        };
        Ok(Some(url))
    }

    /// Proxy address without credentials, safe for logs.
    pub fn endpoint(&self) -> String {
        format!("{}://{}", self.kind, self.authority())
    }

    /// `host:port`, with IPv6 literals bracketed.
    fn authority(&self) -> String {
        let host = self.host.trim();
        if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{}", self.port)
        } else {
            format!("{host}:{}", self.port)
        }
    }
}

impl fmt::Debug for ProxyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyDescriptor")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn encode(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect()
}

/// Process-wide proxy. Overrides per-credential descriptors while enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalProxy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(flatten)]
    pub proxy: ProxyDescriptor,
}

/// Pick the descriptor for one call.
///
/// An enabled global proxy wins, otherwise the credential's own descriptor
/// applies, otherwise the call goes direct.
pub fn effective_proxy(
    credential_proxy: Option<&ProxyDescriptor>,
    global: Option<&GlobalProxy>,
) -> Option<ProxyDescriptor> {
    let chosen = match global {
        Some(global) if global.enabled => Some(&global.proxy),
        _ => credential_proxy,
    };
    chosen.filter(|proxy| !proxy.is_direct()).cloned()
}

/// Build an HTTP client routed through `descriptor`, or a direct client
/// when there is none. Every request on the client is bounded by `timeout`.
pub fn build_transport(
    descriptor: Option<&ProxyDescriptor>,
    timeout: Duration,
) -> Result<reqwest::Client> {
    let builder = reqwest::Client::builder().timeout(timeout);

    let builder = match descriptor.map(ProxyDescriptor::proxy_url).transpose()?.flatten() {
        Some(url) => {
            let proxy = reqwest::Proxy::all(&url).map_err(|e| {
                Error::InvalidProxy(format!(
                    "{}: {e}",
                    descriptor.map(ProxyDescriptor::endpoint).unwrap_or_default()
                ))
            })?;
            builder.proxy(proxy)
        }
        None => builder.no_proxy(),
    };

    builder
        .build()
        .map_err(|e| Error::InvalidProxy(format!("building HTTP client: {e}")))
}

/// Caches one client per distinct descriptor so connection pools are reused
/// across calls that take the same network path.
pub struct TransportFactory {
    timeout: Duration,
    direct: reqwest::Client,
    proxied: Mutex<HashMap<ProxyDescriptor, reqwest::Client>>,
}

impl TransportFactory {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            timeout,
            direct: build_transport(None, timeout)?,
            proxied: Mutex::new(HashMap::new()),
        })
    }

    /// Request timeout applied to every client this factory hands out.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Client for the given descriptor (direct when `None` or kind `none`).
    pub fn transport(&self, descriptor: Option<&ProxyDescriptor>) -> Result<reqwest::Client> {
        let Some(descriptor) = descriptor.filter(|d| !d.is_direct()) else {
            return Ok(self.direct.clone());
        };

        let mut cache = self.proxied.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = cache.get(descriptor) {
            return Ok(client.clone());
        }

        let client = build_transport(Some(descriptor), self.timeout)?;
        debug!(proxy = %descriptor.endpoint(), "built proxied transport");
        cache.insert(descriptor.clone(), client.clone());
        Ok(client)
    }
}

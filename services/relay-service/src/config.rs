//! Configuration types and loading
//!
//! The file path comes from `--config`, then `CONFIG_PATH`, then
//! `claude-relay.toml`. Every setting is read from that file, falling back
//! to defaults. The only other environment input is the global proxy
//! password: GLOBAL_PROXY_PASSWORD wins over `password_file`, and the
//! password is never read from the TOML itself.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Secret;
use relay_auth::{GlobalProxy, OAuthConfig, ProxyDescriptor, ProxyKind};
use relay_core::{
    DEFAULT_API_URL, DEFAULT_API_VERSION, DEFAULT_BETA_HEADER, DEFAULT_USER_AGENT, GatewayConfig,
    RelayConfig,
};
use serde::Deserialize;

const PASSWORD_ENV: &str = "GLOBAL_PROXY_PASSWORD";

/// Longest accepted refresh threshold (one week).
const MAX_REFRESH_THRESHOLD_SECS: u64 = 7 * 24 * 60 * 60;

/// Root configuration. Every section is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub oauth: OAuthConfig,
    pub upstream: UpstreamConfig,
    pub storage: StorageConfig,
    pub global_proxy: GlobalProxyConfig,
    pub refresh: RefreshConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            max_connections: 1000,
        }
    }
}

/// Relay target settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub api_url: String,
    pub api_version: String,
    /// Empty string disables the `anthropic-beta` header
    pub beta_header: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            beta_header: DEFAULT_BETA_HEADER.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub credentials_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from("data/credentials.json"),
        }
    }
}

/// Process-wide proxy; overrides per-account proxies while enabled.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GlobalProxyConfig {
    pub enabled: bool,
    #[serde(rename = "type")]
    pub kind: Option<ProxyKind>,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    #[serde(skip)]
    pub password: Option<Secret<String>>,
    /// Path to a file containing the password (alternative to GLOBAL_PROXY_PASSWORD)
    pub password_file: Option<PathBuf>,
}

/// Background refresh schedule
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_secs: u64,
    /// Refresh credentials expiring within this window
    pub threshold_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            threshold_secs: 900,
        }
    }
}

fn require_http_url(setting: &str, value: &str) -> common::Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::invalid(
            setting,
            format!("must start with http:// or https://, got: {value}"),
        ))
    }
}

fn require_nonzero(setting: &str, value: u64) -> common::Result<()> {
    if value == 0 {
        Err(common::Error::invalid(setting, "must be greater than 0"))
    } else {
        Ok(())
    }
}

impl Config {
    /// Load configuration from a TOML file, validate it, then resolve the
    /// global proxy password.
    ///
    /// Password resolution order:
    /// 1. GLOBAL_PROXY_PASSWORD env var
    /// 2. password_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.validate()?;

        if config.global_proxy.enabled {
            config.global_proxy.password = common::load_secret(
                PASSWORD_ENV,
                config.global_proxy.password_file.as_deref(),
            )?;
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        require_http_url("upstream.api_url", &self.upstream.api_url)?;
        require_http_url("oauth.token_url", &self.oauth.token_url)?;
        require_http_url("oauth.authorize_url", &self.oauth.authorize_url)?;
        require_nonzero("upstream.timeout_secs", self.upstream.timeout_secs)?;
        require_nonzero("server.max_connections", self.server.max_connections as u64)?;
        require_nonzero("refresh.interval_secs", self.refresh.interval_secs)?;
        if self.refresh.threshold_secs > MAX_REFRESH_THRESHOLD_SECS {
            return Err(common::Error::invalid(
                "refresh.threshold_secs",
                format!("must be at most {MAX_REFRESH_THRESHOLD_SECS}"),
            ));
        }

        let proxy = &self.global_proxy;
        if proxy.enabled {
            match proxy.kind {
                None | Some(ProxyKind::None) => {
                    return Err(common::Error::invalid(
                        "global_proxy.type",
                        "must be http, https or socks5 when the global proxy is enabled",
                    ));
                }
                Some(_) => {}
            }
            if proxy.host.trim().is_empty() {
                return Err(common::Error::invalid("global_proxy.host", "must not be empty"));
            }
            require_nonzero("global_proxy.port", u64::from(proxy.port))?;
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("claude-relay.toml")
    }

    /// The enabled global proxy, if any.
    pub fn global_proxy(&self) -> Option<GlobalProxy> {
        let section = &self.global_proxy;
        let kind = section.kind.filter(|_| section.enabled)?;
        Some(GlobalProxy {
            enabled: true,
            proxy: ProxyDescriptor {
                kind,
                host: section.host.clone(),
                port: section.port,
                username: section.username.clone(),
                password: section.password.as_ref().map(|p| p.expose().clone()),
            },
        })
    }

    pub fn relay_config(&self) -> RelayConfig {
        let beta = self.upstream.beta_header.trim();
        RelayConfig {
            api_url: self.upstream.api_url.clone(),
            api_version: self.upstream.api_version.clone(),
            beta_header: (!beta.is_empty()).then(|| beta.to_string()),
            user_agent: self.upstream.user_agent.clone(),
            timeout: Duration::from_secs(self.upstream.timeout_secs),
        }
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            oauth: self.oauth.clone(),
            relay: self.relay_config(),
            global_proxy: self.global_proxy(),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh.interval_secs)
    }

    pub fn refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.refresh.threshold_secs)
    }
}

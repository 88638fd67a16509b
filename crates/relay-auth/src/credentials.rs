//! OAuth credential record
//!
//! One `Credential` per account name. `expires_at` is absolute (UTC,
//! RFC 3339 on disk), computed at exchange/refresh time from the token
//! endpoint's `expires_in` delta.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::EXPIRY_SKEW_SECS;
use crate::proxy::ProxyDescriptor;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer token for API calls
    pub access_token: String,
    /// Token for obtaining new access tokens
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Network path bound to this account. Older files call it `proxy_config`.
    #[serde(default, alias = "proxy_config", skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyDescriptor>,
}

impl Credential {
    fn refresh_deadline(&self) -> DateTime<Utc> {
        self.expires_at - Duration::seconds(EXPIRY_SKEW_SECS)
    }

    /// Usable at `now`: non-empty access token and `now` before expiry minus skew.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && now < self.refresh_deadline()
    }

    /// Due for refresh at `now`: `now` at or after expiry minus skew.
    pub fn needs_refresh_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.refresh_deadline()
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh_at(Utc::now())
    }

    /// Whether the credential expires within `window` of `now`, ignoring skew.
    ///
    /// A window reaching past the representable range covers every expiry.
    pub fn expires_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now.checked_add_signed(window)
            .is_none_or(|limit| self.expires_at <= limit)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .field("proxy", &self.proxy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyKind;

    fn credential_expiring_in(secs: i64, now: DateTime<Utc>) -> Credential {
        Credential {
            access_token: "at_1".into(),
            refresh_token: "rt_1".into(),
            expires_at: now + Duration::seconds(secs),
            scopes: vec!["user:inference".into()],
            proxy: None,
        }
    }

    #[test]
    fn inside_skew_window_needs_refresh() {
        let now = Utc::now();
        let cred = credential_expiring_in(30, now);
        assert!(cred.needs_refresh_at(now));
        assert!(!cred.is_valid_at(now));
    }

    #[test]
    fn outside_skew_window_is_valid() {
        let now = Utc::now();
        let cred = credential_expiring_in(120, now);
        assert!(!cred.needs_refresh_at(now));
        assert!(cred.is_valid_at(now));
    }

    #[test]
    fn exactly_at_deadline_needs_refresh() {
        let now = Utc::now();
        let cred = credential_expiring_in(EXPIRY_SKEW_SECS, now);
        assert!(cred.needs_refresh_at(now));
        assert!(!cred.is_valid_at(now));
    }

    #[test]
    fn empty_access_token_is_never_valid() {
        let now = Utc::now();
        let mut cred = credential_expiring_in(3600, now);
        cred.access_token.clear();
        assert!(!cred.is_valid_at(now));
        assert!(!cred.needs_refresh_at(now));
    }

    #[test]
    fn expires_within_window() {
        let now = Utc::now();
        let cred = credential_expiring_in(600, now);
        assert!(cred.expires_within(now, Duration::seconds(900)));
        assert!(!cred.expires_within(now, Duration::seconds(300)));
    }

    #[test]
    fn expires_within_unbounded_window_does_not_overflow() {
        let now = Utc::now();
        let cred = credential_expiring_in(7200, now);
        assert!(cred.expires_within(now, Duration::MAX));
        assert!(cred.expires_within(now, Duration::seconds(10_000_000_000_000)));
    }

    #[test]
    fn accepts_legacy_proxy_field_name() {
        let json = r#"{
            "access_token": "at",
            "refresh_token": "rt",
            "expires_at": "2030-01-01T00:00:00Z",
            "scopes": ["user:profile"],
            "proxy_config": {"type": "http", "host": "p.local", "port": 8080}
        }"#;
        let cred: Credential = serde_json::from_str(json).unwrap();
        let proxy = cred.proxy.unwrap();
        assert_eq!(proxy.kind, ProxyKind::Http);
        assert_eq!(proxy.host, "p.local");
    }

    #[test]
    fn serializes_without_absent_proxy() {
        let cred = credential_expiring_in(60, Utc::now());
        let json = serde_json::to_string(&cred).unwrap();
        assert!(!json.contains("proxy"));
        assert!(json.contains("\"expires_at\""));
    }

    #[test]
    fn debug_redacts_tokens() {
        let cred = credential_expiring_in(60, Utc::now());
        let debug = format!("{cred:?}");
        assert!(!debug.contains("at_1"));
        assert!(!debug.contains("rt_1"));
    }
}

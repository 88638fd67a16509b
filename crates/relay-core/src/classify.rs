//! Upstream response classification
//!
//! A relay response is either a success (2xx) or an error. Errors whose body
//! mentions a rate limit are reported separately so callers can back off
//! differently from a generic upstream failure.

/// Rate-limit phrases in upstream error bodies, matched case-insensitively.
const RATE_LIMIT_PATTERNS: &[&str] = &["rate limit", "exceed your account's rate limit"];

/// Outcome class of one upstream response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    RateLimited,
    Upstream,
}

impl ResponseClass {
    pub fn label(&self) -> &'static str {
        match self {
            ResponseClass::Success => "success",
            ResponseClass::RateLimited => "rate_limited",
            ResponseClass::Upstream => "upstream_error",
        }
    }
}

/// Whether an upstream error body reports a rate limit.
pub fn is_rate_limited(body: &str) -> bool {
    let lower = body.to_lowercase();
    RATE_LIMIT_PATTERNS
        .iter()
        .any(|pattern| lower.contains(pattern))
}

/// Classify an upstream response by status and body.
///
/// Only the body decides between rate limit and generic error; a 429 with
/// an unrecognised message is a generic upstream error.
pub fn classify_response(status: u16, body: &str) -> ResponseClass {
    if (200..300).contains(&status) {
        ResponseClass::Success
    } else if is_rate_limited(body) {
        ResponseClass::RateLimited
    } else {
        ResponseClass::Upstream
    }
}

//! Shared helpers for provider adapters.

use rg_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain error taxonomy.
///
/// Timeouts map to [`Error::Timeout`]; connect/request failures are
/// transient (retried once by policy); everything else is plain HTTP.
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else if e.is_connect() || e.is_request() {
        Error::Transient(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Classify a non-success upstream status into the retry taxonomy.
pub(crate) fn classify_status(provider: &str, status: u16, body: &str) -> Error {
    let summary = format!("{provider}: HTTP {status} - {}", truncate(body, 300));
    match status {
        429 => Error::RateLimited(summary),
        500 | 502 | 503 | 504 | 529 => Error::Transient(summary),
        _ => Error::Provider(summary),
    }
}

/// Read an API key from the env var named in config.
pub(crate) fn resolve_api_key(env_var: &str) -> Result<String> {
    std::env::var(env_var)
        .map_err(|_| Error::Auth(format!("environment variable '{env_var}' not set")))
}

fn truncate(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Shared error type used across all Regulus crates.
///
/// Variants map to the behaviors the turn boundary cares about: which
/// errors retry, which terminate the session, and which become tool-visible
/// text. See [`Error::classification`] for the user-facing tag.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// Missing or invalid credential. Terminates the session; never retried.
    #[error("auth: {0}")]
    Auth(String),

    /// Daily quota spent. Terminates the turn with a dedicated close code.
    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    /// Provider returned 429. Retried on the backoff schedule.
    #[error("provider rate limited: {0}")]
    RateLimited(String),

    /// Transient provider/connection failure. Retried once.
    #[error("provider transient: {0}")]
    Transient(String),

    /// Non-retryable provider failure.
    #[error("provider: {0}")]
    Provider(String),

    /// The upstream source has no document at the requested location.
    #[error("not found: {0}")]
    NotFound(String),

    /// A write or read attempted on chunks the caller does not own.
    /// Surfaced to the caller and logged; never silently filtered.
    #[error("ownership violation: {0}")]
    Ownership(String),

    #[error("persistence: {0}")]
    Persistence(String),

    #[error("config: {0}")]
    Config(String),

    /// An internal invariant did not hold. Asserts in debug builds.
    #[error("invariant broken: {0}")]
    Invariant(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Short classification tag for user-visible errors. Event payloads
    /// carry this tag plus a concise message; provider internals stay out.
    pub fn classification(&self) -> &'static str {
        match self {
            Error::Io(_) | Error::Json(_) | Error::Persistence(_) => "persistence",
            Error::Http(_) | Error::Transient(_) => "transient",
            Error::Timeout(_) => "timeout",
            Error::Auth(_) => "auth",
            Error::QuotaExhausted(_) => "quota",
            Error::RateLimited(_) => "rate_limited",
            Error::Provider(_) => "provider",
            Error::NotFound(_) => "not_found",
            Error::Ownership(_) => "ownership",
            Error::Config(_) => "config",
            Error::Invariant(_) => "internal",
            Error::Other(_) => "internal",
        }
    }

    /// Whether the turn loop may retry the failed call at all.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RateLimited(_) | Error::Transient(_) | Error::Http(_) | Error::Timeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

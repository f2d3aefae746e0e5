//! Thin HTTP adapters for the regulatory portals.
//!
//! Each adapter normalizes its portal's response into a [`Document`],
//! enforces its own per-second rate budget, and retries idempotent GETs
//! once on transient failure.

pub mod aps;
pub mod cfr;
pub mod drs;

use std::time::Duration;

use tokio::time::Instant;

use rg_domain::config::SourceEndpoint;
use rg_domain::error::{Error, Result};
use rg_providers::retry::{with_retry, RetryPolicy};

/// Simple per-source request pacing: calls are spaced at least
/// `1/rate_per_sec` apart, callers sleep for their slot.
pub(crate) struct RateBudget {
    min_interval: Duration,
    next_slot: tokio::sync::Mutex<Instant>,
}

impl RateBudget {
    pub fn new(rate_per_sec: u32) -> Self {
        let min_interval = Duration::from_millis(1000 / u64::from(rate_per_sec.max(1)));
        Self {
            min_interval,
            next_slot: tokio::sync::Mutex::new(Instant::now()),
        }
    }

    pub async fn acquire(&self) {
        let wake = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let wake = (*next).max(now);
            *next = wake + self.min_interval;
            wake
        };
        tokio::time::sleep_until(wake).await;
    }
}

/// Shared upstream client state for one portal.
pub(crate) struct PortalClient {
    pub http: reqwest::Client,
    pub base_url: String,
    pub api_key: Option<(String, String)>,
    budget: RateBudget,
    retry: RetryPolicy,
}

impl PortalClient {
    pub fn from_endpoint(cfg: &SourceEndpoint) -> Result<Self> {
        let api_key = match &cfg.api_key_env {
            Some(env_var) => match std::env::var(env_var) {
                Ok(key) => Some((cfg.api_key_header.clone(), key)),
                Err(_) => {
                    tracing::warn!(
                        env_var = %env_var,
                        "portal API key not set; requests go out unauthenticated"
                    );
                    None
                }
            },
            None => None,
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_s))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
            api_key,
            budget: RateBudget::new(cfg.rate_per_sec),
            // Idempotent GETs retry once on transient failure; no
            // rate-limit schedule at this layer.
            retry: RetryPolicy {
                rate_limit_delays: Vec::new(),
                transient_retries: 1,
                jitter_factor: 0.0,
            },
        })
    }

    /// Rate-budgeted GET returning the response body, with one retry on
    /// transient failure. 404 maps to [`Error::NotFound`].
    pub async fn get_text(&self, url: &str, query: &[(&str, &str)]) -> Result<String> {
        self.budget.acquire().await;

        with_retry(&self.retry, || async {
            let mut rb = self.http.get(url).query(query);
            if let Some((header, key)) = &self.api_key {
                rb = rb.header(header.as_str(), key.as_str());
            }
            let resp = rb
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        Error::Timeout(e.to_string())
                    } else {
                        Error::Transient(e.to_string())
                    }
                })?;

            let status = resp.status().as_u16();
            let text = resp.text().await.map_err(|e| Error::Transient(e.to_string()))?;
            match status {
                200..=299 => Ok(text),
                404 => Err(Error::NotFound(format!("no document at {url}"))),
                429 => Err(Error::RateLimited(format!("portal rate limit at {url}"))),
                500..=599 => Err(Error::Transient(format!("portal HTTP {status} at {url}"))),
                _ => Err(Error::Http(format!("portal HTTP {status} at {url}"))),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rate_budget_spaces_calls() {
        let budget = RateBudget::new(10); // 100 ms interval
        let start = Instant::now();
        budget.acquire().await;
        budget.acquire().await;
        budget.acquire().await;
        // Third call waits at least two intervals after the first.
        assert!(start.elapsed() >= Duration::from_millis(180));
    }
}

//! Retry policy driver.
//!
//! Retries are data, not stack unwinding: the policy owns the schedule and
//! the classification rules, and the driver re-invokes the operation.
//!
//! - Rate-limited calls back off 2 s, 4 s, 8 s (max 3 retries).
//! - Transient failures (connect resets, 5xx, timeouts) retry once.
//! - Everything else surfaces immediately.

use std::future::Future;
use std::time::Duration;

use rg_domain::error::{Error, Result};
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Backoff schedule applied to rate-limited calls, in order.
    pub rate_limit_delays: Vec<Duration>,
    /// Extra attempts granted to transient failures.
    pub transient_retries: u32,
    /// Fraction of each delay added as random jitter (0.0 – 1.0).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit_delays: vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
            ],
            transient_retries: 1,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// No sleeping — for tests.
    pub fn immediate() -> Self {
        Self {
            rate_limit_delays: vec![Duration::ZERO; 3],
            transient_retries: 1,
            jitter_factor: 0.0,
        }
    }

    fn jittered(&self, base: Duration) -> Duration {
        if self.jitter_factor <= 0.0 || base.is_zero() {
            return base;
        }
        let jitter_ms = base.as_millis() as f64 * self.jitter_factor * rand::random::<f64>();
        base + Duration::from_millis(jitter_ms as u64)
    }
}

/// Drive an async operation through the policy.
///
/// Rate-limit and transient budgets are independent: a call that hits a
/// 429, then a connection reset, consumes one step from each.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut rate_step = 0usize;
    let mut transient_used = 0u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(Error::RateLimited(msg)) => {
                if rate_step >= policy.rate_limit_delays.len() {
                    return Err(Error::RateLimited(msg));
                }
                let delay = policy.jittered(policy.rate_limit_delays[rate_step]);
                tracing::warn!(
                    attempt = rate_step + 1,
                    delay_ms = delay.as_millis() as u64,
                    "rate limited, backing off"
                );
                sleep(delay).await;
                rate_step += 1;
            }
            Err(e) if is_transient(&e) => {
                if transient_used >= policy.transient_retries {
                    return Err(e);
                }
                transient_used += 1;
                tracing::warn!(error = %e, "transient failure, retrying once");
            }
            Err(e) => return Err(e),
        }
    }
}

fn is_transient(e: &Error) -> bool {
    matches!(e, Error::Transient(_) | Error::Http(_) | Error::Timeout(_))
}

//! Cooperative turn cancellation.
//!
//! Each running turn gets a `CancelToken`; the socket handler that started
//! the turn cancels it on client disconnect or an explicit cancel frame.
//! The turn loop both polls it between events and `select!`s on
//! [`CancelToken::cancelled`] around blocking awaits, so in-flight
//! provider streams and tool calls observe cancellation promptly.

use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
pub struct CancelToken {
    inner: CancellationToken,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Resolves when the token is cancelled.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await;
    }
}

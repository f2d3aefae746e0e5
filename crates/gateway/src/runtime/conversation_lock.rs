//! Per-conversation turn serialization.
//!
//! Concurrent turns on one conversation are not permitted: a second
//! message queues behind the in-flight turn. (The alternative — rejecting
//! — is allowed by the contract; queueing is the choice here, applied
//! consistently.) The caller emits a `warning` event when it observes the
//! queue via [`ConversationLockMap::is_busy`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct ConversationLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for ConversationLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a turn currently holds the conversation.
    pub fn is_busy(&self, conversation_id: &str) -> bool {
        self.locks
            .lock()
            .get(conversation_id)
            .map(|s| s.available_permits() == 0)
            .unwrap_or(false)
    }

    /// Wait for exclusive access. The permit releases on drop.
    pub async fn acquire(&self, conversation_id: &str) -> OwnedSemaphorePermit {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(conversation_id.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        // The semaphore is never closed, so acquisition cannot fail.
        match sem.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => unreachable!("conversation semaphore closed"),
        }
    }

    /// Drop map entries for conversations nobody holds.
    pub fn prune_idle(&self) {
        self.locks.lock().retain(|_, sem| sem.available_permits() == 0);
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

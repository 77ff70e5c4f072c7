//! Per-stage concurrency enforcement (spec §4.1 invariant, §5, §9).
//!
//! A token is acquired *before* acking the triggering queue message and is
//! released on the transition into the next stage's "done" state (or into
//! `ERROR`) — never at ack time. The token therefore outlives the driver
//! call that acquired it; it is stashed here keyed by `transfer_id` until
//! the corresponding callback or poll releases it. This is the one
//! cross-task shared structure in the pipeline and is mutex-guarded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct PermitRegistry {
    semaphore: Arc<Semaphore>,
    held: Mutex<HashMap<String, OwnedSemaphorePermit>>,
}

impl PermitRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            held: Mutex::new(HashMap::new()),
        }
    }

    /// Block until a slot is free. Suspends the calling task (spec §5).
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore never closed")
    }

    /// Hand a just-acquired permit off to the waiter map, to be released by
    /// whichever callback or poll later observes this transfer's completion.
    pub fn stash(&self, transfer_id: &str, permit: OwnedSemaphorePermit) {
        self.held.lock().unwrap().insert(transfer_id.to_string(), permit);
    }

    /// Release the token held for `transfer_id`, if any is still held.
    ///
    /// Returns `false` if no token was held — the signal that a redelivered
    /// callback or an overlapping poll tick already released it, so callers
    /// must not double-release.
    pub fn release(&self, transfer_id: &str) -> bool {
        self.held.lock().unwrap().remove(transfer_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_blocks_at_capacity() {
        let registry = Arc::new(PermitRegistry::new(1));
        let permit = registry.acquire().await;
        registry.stash("t1", permit);

        assert_eq!(registry.semaphore.available_permits(), 0);
        assert!(registry.release("t1"));
        assert_eq!(registry.semaphore.available_permits(), 1);
    }

    #[tokio::test]
    async fn double_release_is_a_no_op() {
        let registry = PermitRegistry::new(1);
        let permit = registry.acquire().await;
        registry.stash("t1", permit);

        assert!(registry.release("t1"));
        assert!(!registry.release("t1"));
    }
}

//! The pending-local-mutation gate.
//!
//! Every component that writes to the API directly (debounced field edits, PATCH,
//! POST, DELETE) holds a [`MutationGuard`] for the lifetime of the write. The
//! live-update worker applies queued hub messages only while the count is zero.
//! There is no per-resource lock; this counter is the only coordination point
//! between local writes and server pushes.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct PendingMutations {
    count: Arc<watch::Sender<usize>>,
}

impl Default for PendingMutations {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingMutations {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(0);
        Self {
            count: Arc::new(sender),
        }
    }

    /// Increments synchronously; the count drops again when the guard is dropped.
    #[must_use = "the mutation is only pending while the guard is alive"]
    pub fn increment(&self) -> MutationGuard {
        self.count.send_modify(|count| *count += 1);
        MutationGuard {
            count: self.count.clone(),
        }
    }

    pub fn count(&self) -> usize {
        *self.count.borrow()
    }

    pub fn is_idle(&self) -> bool {
        self.count() == 0
    }

    /// Resolves immediately when idle, otherwise once the last guard is dropped.
    pub async fn wait_idle(&self) {
        let mut receiver = self.count.subscribe();
        // the sender lives in `self`, so the watch cannot close while we wait
        let _ = receiver.wait_for(|count| *count == 0).await;
    }

    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.count.subscribe()
    }
}

#[derive(Debug)]
pub struct MutationGuard {
    count: Arc<watch::Sender<usize>>,
}

impl Drop for MutationGuard {
    fn drop(&mut self) {
        self.count
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_guard_releases_on_drop() {
        let gate = PendingMutations::new();
        let first = gate.increment();
        let second = gate.increment();
        assert_eq!(gate.count(), 2);

        drop(first);
        assert!(!gate.is_idle());
        drop(second);
        assert!(gate.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_idle_suspends_until_released() {
        let gate = PendingMutations::new();
        let guard = gate.increment();

        let waiter = tokio::spawn({
            let gate = gate.clone();
            async move { gate.wait_idle().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
        assert!(gate.is_idle());
    }
}

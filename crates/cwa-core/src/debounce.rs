//! Per-key debounce with cancel, tied to the mutation gate.

use crate::gate::{MutationGuard, PendingMutations};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::trace;

type Flush<K, V> = Arc<dyn Fn(K, V) -> BoxFuture<'static, ()> + Send + Sync>;

struct Slot<V> {
    value: V,
    generation: u64,
    guard: MutationGuard,
}

/// Coalesces values per key; only the latest value within `window` is flushed.
///
/// The gate is incremented synchronously when the first value for a key arrives,
/// before any timer starts, and stays held until the flush future completes.
/// Each new value restarts the window for its key.
pub struct Debouncer<K, V> {
    window: Duration,
    gate: PendingMutations,
    slots: Arc<Mutex<HashMap<K, Slot<V>>>>,
    generation: Arc<AtomicU64>,
    flush: Flush<K, V>,
}

impl<K, V> Clone for Debouncer<K, V> {
    fn clone(&self) -> Self {
        Self {
            window: self.window,
            gate: self.gate.clone(),
            slots: self.slots.clone(),
            generation: self.generation.clone(),
            flush: self.flush.clone(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<K, V> Debouncer<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Send + 'static,
{
    pub fn new<F, Fut>(window: Duration, gate: PendingMutations, flush: F) -> Self
    where
        F: Fn(K, V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            window,
            gate,
            slots: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
            flush: Arc::new(move |key, value| Box::pin(flush(key, value))),
        }
    }

    /// Queues `value` for `key`, replacing any value still waiting. Must be called
    /// from within a Tokio runtime.
    pub fn push(&self, key: K, value: V) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        {
            let mut slots = lock(&self.slots);
            match slots.get_mut(&key) {
                Some(slot) => {
                    slot.value = value;
                    slot.generation = generation;
                }
                None => {
                    let guard = self.gate.increment();
                    slots.insert(
                        key.clone(),
                        Slot {
                            value,
                            generation,
                            guard,
                        },
                    );
                }
            }
        }

        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.window).await;
            let ready = {
                let mut slots = lock(&this.slots);
                match slots.get(&key) {
                    Some(slot) if slot.generation == generation => slots.remove(&key),
                    _ => None,
                }
            };
            let Some(slot) = ready else {
                trace!(generation, "Superseded debounce timer");
                return;
            };
            (this.flush)(key, slot.value).await;
            drop(slot.guard);
        });
    }

    /// Drops the waiting value for `key` and releases its hold on the gate.
    pub fn cancel(&self, key: &K) -> bool {
        lock(&self.slots).remove(key).is_some()
    }

    pub fn pending(&self) -> usize {
        lock(&self.slots).len()
    }
}

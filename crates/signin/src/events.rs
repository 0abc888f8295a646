//! Callback registry used for every notification the store publishes.
//!
//! Listeners run in registration order on the task that emitted the value,
//! after the store has released its state lock, so a listener may call back
//! into the store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: AtomicU64,
    listeners: Mutex<BTreeMap<u64, Listener<T>>>,
}

pub struct Emitter<T> {
    registry: Arc<Registry<T>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Emitter<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(0),
                listeners: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners().insert(id, Arc::new(listener));
        SubscriptionId(id)
    }

    /// Returns whether a listener was removed. Unknown or already removed ids
    /// are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners().remove(&id.0).is_some()
    }

    pub fn emit(&self, value: &T) {
        let listeners: Vec<Listener<T>> = self.listeners().values().cloned().collect();
        for listener in listeners {
            listener(value);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn listeners(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, Listener<T>>> {
        self.registry
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone + Send + 'static> Emitter<T> {
    /// Forwards every emitted value into a channel. The listener stays
    /// registered until unsubscribed, dropped sends are ignored.
    pub fn forward(&self, tx: mpsc::UnboundedSender<T>) -> SubscriptionId {
        self.subscribe(move |value: &T| {
            let _ = tx.send(value.clone());
        })
    }
}

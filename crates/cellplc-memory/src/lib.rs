//! The observable memory (`Memory`, C1 in the design): a shared key-value
//! store with atomic batch writes and synchronous, strictly-ordered observer
//! fan-out.
//!
//! Writes and the resulting notification fan-out happen under the same
//! critical section, which is what gives every observer the same total
//! order of batches. Observers therefore must never call back into the
//! memory that is currently notifying them -- the lock is not reentrant and
//! doing so deadlocks. [`Memory::write`] documents this explicitly.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};

use cellplc_types::{Batch, SignalName, SignalValue, SnapshotMap};

/// Receives ordered modification batches from a [`Memory`].
///
/// Implementations must return promptly and must not call back into the
/// originating memory's `read`/`write` from within `memory_modified` -- the
/// memory's lock is held for the duration of the callback.
pub trait Observer {
    fn memory_modified(&self, batch: &Batch);
}

struct Inner {
    values: HashMap<SignalName, SignalValue>,
    observers: Vec<Weak<dyn Observer + Send + Sync>>,
}

/// Shared, observable key-value store. Cheap to clone (internally an
/// `Arc`), so every component that needs a handle to the memory just clones
/// one.
#[derive(Clone)]
pub struct Memory {
    inner: Arc<Mutex<Inner>>,
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory {
    pub fn new() -> Self {
        Memory {
            inner: Arc::new(Mutex::new(Inner {
                values: HashMap::new(),
                observers: Vec::new(),
            })),
        }
    }

    /// Atomically snapshot the requested subset. Keys with no stored value
    /// are simply absent from the result (absent is distinct from `Null`).
    pub fn read(&self, keys: &[SignalName]) -> SnapshotMap {
        let inner = self.inner.lock().expect("memory mutex poisoned");
        let mut out = SnapshotMap::new();
        for key in keys {
            if let Some(value) = inner.values.get(key) {
                out.insert(key.clone(), value.clone());
            }
        }
        out
    }

    /// Read every currently-stored entry.
    pub fn read_all(&self) -> SnapshotMap {
        let inner = self.inner.lock().expect("memory mutex poisoned");
        inner.values.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Compute the delta against the current values (filtering out
    /// identical-value writes), apply it, and fan out exactly one
    /// notification containing that delta to every live observer -- all
    /// under the same lock, so every observer sees the same global write
    /// order.
    ///
    /// A panicking observer is isolated: its panic is caught, logged, and
    /// fan-out continues to the remaining observers. It must never poison
    /// the memory's lock or drop later notifications.
    pub fn write(&self, keyvalues: Batch) {
        if keyvalues.is_empty() {
            return;
        }

        let mut inner = self.inner.lock().expect("memory mutex poisoned");

        let mut delta = Batch::new();
        for (key, value) in keyvalues {
            let changed = match inner.values.get(&key) {
                Some(existing) => *existing != value,
                None => true,
            };
            if changed {
                inner.values.insert(key.clone(), value.clone());
                delta.insert(key, value);
            }
        }

        if delta.is_empty() {
            return;
        }

        // Copy out before fan-out: observers may drop (and thus disappear
        // from the registry) while we are iterating, and a misbehaving
        // observer must not corrupt our view of the registry.
        let observers: Vec<Weak<dyn Observer + Send + Sync>> = inner.observers.clone();
        for weak in &observers {
            let Some(observer) = weak.upgrade() else {
                continue;
            };
            let result = panic::catch_unwind(AssertUnwindSafe(|| observer.memory_modified(&delta)));
            if let Err(panic) = result {
                tracing::error!(?panic, "observer panicked handling memory_modified, isolating");
            }
        }
    }

    /// Register an observer. It immediately receives one notification
    /// carrying a snapshot of every currently-stored entry, then a weak
    /// handle is kept so the memory does not keep the observer alive past
    /// its owner dropping it.
    pub fn add_observer(&self, observer: Arc<dyn Observer + Send + Sync>) {
        let mut inner = self.inner.lock().expect("memory mutex poisoned");
        let snapshot: Batch = inner.values.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        inner.observers.push(Arc::downgrade(&observer));
        if !snapshot.is_empty() {
            observer.memory_modified(&snapshot);
        }
    }
}

/// An [`Observer`] that simply logs every batch it sees, for use as a
/// cheap "what just happened" tap when wiring up a process.
pub struct MemoryLogger {
    name: String,
}

impl MemoryLogger {
    pub fn new(name: impl Into<String>) -> Self {
        MemoryLogger { name: name.into() }
    }
}

impl Observer for MemoryLogger {
    fn memory_modified(&self, batch: &Batch) {
        for (key, value) in batch {
            tracing::debug!(observer = %self.name, key = %key, %value, "signal changed");
        }
    }
}

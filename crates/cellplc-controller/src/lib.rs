//! The controller (C3): a per-caller snapshot of the memory plus a queue of
//! change notifications, and the family of blocking wait primitives every
//! higher-level component (facade, production cycle, runner, simulator)
//! is built on.
//!
//! A `Controller` is thread-confined: its snapshot is a plain `RefCell`, not
//! a lock, because only the owning thread ever reads or advances it. The
//! notification queue underneath is the only part shared with the writer's
//! thread (via the `Observer` callback registered with the [`Memory`]).

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use cellplc_memory::{Memory, Observer};
use cellplc_types::{Batch, SignalName, SignalValue, SnapshotMap};

/// Optional liveness policy: a nominated heartbeat signal (or none, meaning
/// "any traffic counts") and the maximum interval since the last heartbeat
/// before the peer is considered disconnected.
#[derive(Clone, Debug)]
pub struct HeartbeatPolicy {
    pub signal_name: Option<SignalName>,
    pub max_interval: Duration,
}

struct SharedState {
    queue: std::collections::VecDeque<Batch>,
    last_heartbeat: Option<Instant>,
}

struct QueueObserver {
    shared: Arc<Mutex<SharedState>>,
    condvar: Arc<Condvar>,
    heartbeat_signal: Option<SignalName>,
}

impl Observer for QueueObserver {
    fn memory_modified(&self, batch: &Batch) {
        if batch.is_empty() {
            return;
        }
        let mut state = self.shared.lock().expect("controller queue mutex poisoned");
        let touches_heartbeat = match &self.heartbeat_signal {
            None => true,
            Some(name) => batch.contains_key(name),
        };
        if touches_heartbeat {
            state.last_heartbeat = Some(Instant::now());
        }
        state.queue.push_back(batch.clone());
        self.condvar.notify_all();
    }
}

/// A per-caller view of a [`Memory`]: snapshot + notification queue + wait
/// primitives. Not `Sync` -- each owning thread should hold its own
/// controller.
pub struct Controller {
    memory: Memory,
    snapshot: RefCell<SnapshotMap>,
    shared: Arc<Mutex<SharedState>>,
    condvar: Arc<Condvar>,
    heartbeat: Option<HeartbeatPolicy>,
    // kept alive so the memory's weak reference stays valid for the
    // controller's lifetime
    _observer: Arc<QueueObserver>,
}

const DEQUEUE_SLICE: Duration = Duration::from_millis(50);

impl Controller {
    pub fn new(memory: Memory) -> Self {
        Self::with_heartbeat(memory, None)
    }

    pub fn with_heartbeat(memory: Memory, heartbeat: Option<HeartbeatPolicy>) -> Self {
        let shared = Arc::new(Mutex::new(SharedState {
            queue: std::collections::VecDeque::new(),
            last_heartbeat: None,
        }));
        let condvar = Arc::new(Condvar::new());
        let observer = Arc::new(QueueObserver {
            shared: shared.clone(),
            condvar: condvar.clone(),
            heartbeat_signal: heartbeat.as_ref().and_then(|h| h.signal_name.clone()),
        });
        memory.add_observer(observer.clone());
        Controller {
            memory,
            snapshot: RefCell::new(SnapshotMap::new()),
            shared,
            condvar,
            heartbeat,
            _observer: observer,
        }
    }

    fn merge(&self, batch: &Batch) {
        let mut snapshot = self.snapshot.borrow_mut();
        for (key, value) in batch {
            snapshot.insert(key.clone(), value.clone());
        }
    }

    /// Drain every currently queued batch into the snapshot, in arrival
    /// order, without blocking.
    pub fn sync(&self) {
        loop {
            let batch = {
                let mut state = self.shared.lock().expect("controller queue mutex poisoned");
                state.queue.pop_front()
            };
            match batch {
                Some(b) => self.merge(&b),
                None => break,
            }
        }
    }

    /// Dequeue exactly one batch, merging it into the snapshot, or return
    /// `None` once `deadline` (if any) has passed. Waits in 50 ms slices so
    /// that a disconnect becomes observable even with no traffic; if
    /// `timeout_on_disconnect` is set, a slice that ends with the peer
    /// disconnected aborts the wait immediately.
    fn dequeue_one(&self, deadline: Option<Instant>, timeout_on_disconnect: bool) -> Option<Batch> {
        loop {
            {
                let mut state = self.shared.lock().expect("controller queue mutex poisoned");
                if let Some(batch) = state.queue.pop_front() {
                    drop(state);
                    self.merge(&batch);
                    return Some(batch);
                }
                let slice = match deadline {
                    Some(d) => {
                        let now = Instant::now();
                        if now >= d {
                            return None;
                        }
                        DEQUEUE_SLICE.min(d - now)
                    }
                    None => DEQUEUE_SLICE,
                };
                let (_guard, _result) = self
                    .condvar
                    .wait_timeout(state, slice)
                    .expect("controller queue mutex poisoned");
            }
            if timeout_on_disconnect && !self.is_connected() {
                return None;
            }
            if let Some(d) = deadline {
                if Instant::now() >= d {
                    return None;
                }
            }
        }
    }

    /// Whether the nominated peer is considered live: always true if no
    /// heartbeat policy is configured, otherwise whether a qualifying batch
    /// has arrived within `max_interval`. An unset heartbeat (no batch has
    /// ever arrived) is never connected.
    pub fn is_connected(&self) -> bool {
        match &self.heartbeat {
            None => true,
            Some(policy) => {
                let state = self.shared.lock().expect("controller queue mutex poisoned");
                match state.last_heartbeat {
                    Some(t) => t.elapsed() < policy.max_interval,
                    None => false,
                }
            }
        }
    }

    /// Block until at least one batch is dequeued, or `timeout` elapses.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        self.dequeue_one(deadline, false).is_some()
    }

    /// Loop dequeuing (ignoring disconnects, since we are waiting to
    /// *become* connected) until `is_connected()` is true or `timeout`
    /// elapses.
    pub fn wait_until_connected(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if self.is_connected() {
                return true;
            }
            if self.dequeue_one(deadline, false).is_none() {
                return false;
            }
        }
    }

    /// Dequeue batches until one contains `key` with `expected` (or any
    /// value, if `expected` is `None`), or `timeout` elapses.
    pub fn wait_for(&self, key: &str, expected: Option<&SignalValue>, timeout: Option<Duration>) -> bool {
        let mut expectations = BTreeMap::new();
        expectations.insert(key.to_string(), expected.cloned());
        self.wait_for_any(&expectations, timeout)
    }

    /// As [`Self::wait_for`], but succeeds the first time any key in
    /// `expectations` changes to its expected value (`None` matches any
    /// value).
    pub fn wait_for_any(
        &self,
        expectations: &BTreeMap<SignalName, Option<SignalValue>>,
        timeout: Option<Duration>,
    ) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let batch = match self.dequeue_one(deadline, true) {
                Some(b) => b,
                None => return false,
            };
            for (key, expected) in expectations {
                if let Some(actual) = batch.get(key) {
                    match expected {
                        None => return true,
                        Some(want) => {
                            if actual == want {
                                return true;
                            }
                        }
                    }
                }
            }
        }
    }

    fn satisfies_all(&self, expectations: &BTreeMap<SignalName, SignalValue>) -> bool {
        let snapshot = self.snapshot.borrow();
        expectations.iter().all(|(k, v)| snapshot.get(k) == Some(v))
    }

    fn satisfies_any(&self, exceptions: &BTreeMap<SignalName, SignalValue>) -> bool {
        let snapshot = self.snapshot.borrow();
        exceptions.iter().any(|(k, v)| snapshot.get(k) == Some(v))
    }

    /// Succeed immediately if the snapshot already satisfies every
    /// expectation; otherwise dequeue until it does or `timeout` elapses.
    pub fn wait_until_all(&self, expectations: &BTreeMap<SignalName, SignalValue>, timeout: Option<Duration>) -> bool {
        if self.satisfies_all(expectations) {
            return true;
        }
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if self.dequeue_one(deadline, true).is_none() {
                return false;
            }
            if self.satisfies_all(expectations) {
                return true;
            }
        }
    }

    /// Succeed as soon as any exception predicate in `exceptions` is met.
    pub fn wait_until_any(&self, exceptions: &BTreeMap<SignalName, SignalValue>, timeout: Option<Duration>) -> bool {
        if self.satisfies_any(exceptions) {
            return true;
        }
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if self.dequeue_one(deadline, true).is_none() {
                return false;
            }
            if self.satisfies_any(exceptions) {
                return true;
            }
        }
    }

    /// `Sync` first; return true immediately if any exception is already
    /// met or every expectation is already met; otherwise wait for any key
    /// in the union of both to change, and retry. Empty inputs are
    /// trivially true.
    pub fn wait_until_all_or_any(
        &self,
        expectations: &BTreeMap<SignalName, SignalValue>,
        exceptions: &BTreeMap<SignalName, SignalValue>,
        timeout: Option<Duration>,
    ) -> bool {
        self.sync();
        if expectations.is_empty() && exceptions.is_empty() {
            return true;
        }
        if self.satisfies_any(exceptions) || self.satisfies_all(expectations) {
            return true;
        }

        let mut union: BTreeMap<SignalName, Option<SignalValue>> = BTreeMap::new();
        for (k, v) in expectations {
            union.insert(k.clone(), Some(v.clone()));
        }
        for (k, v) in exceptions {
            union.insert(k.clone(), Some(v.clone()));
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if !self.wait_for_any(&union, remaining) {
                return false;
            }
            if self.satisfies_any(exceptions) || self.satisfies_all(expectations) {
                return true;
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<SignalValue> {
        self.snapshot.borrow().get(key).cloned()
    }

    pub fn get_multiple(&self, keys: &[SignalName]) -> SnapshotMap {
        let snapshot = self.snapshot.borrow();
        keys.iter()
            .filter_map(|k| snapshot.get(k).map(|v| (k.clone(), v.clone())))
            .collect()
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(SignalValue::Bool(b)) => b,
            _ => default,
        }
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.get(key) {
            Some(SignalValue::Int(i)) => i,
            _ => default,
        }
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        match self.get(key) {
            Some(SignalValue::String(s)) => s,
            _ => default.to_string(),
        }
    }

    pub fn sync_and_get_bool(&self, key: &str, default: bool) -> bool {
        self.sync();
        self.get_bool(key, default)
    }

    pub fn sync_and_get_int(&self, key: &str, default: i64) -> i64 {
        self.sync();
        self.get_int(key, default)
    }

    pub fn sync_and_get_string(&self, key: &str, default: &str) -> String {
        self.sync();
        self.get_string(key, default)
    }

    pub fn set(&self, key: impl Into<SignalName>, value: impl Into<SignalValue>) {
        let mut batch = Batch::new();
        batch.insert(key.into(), value.into());
        self.memory.write(batch);
    }

    pub fn set_multiple(&self, values: Batch) {
        self.memory.write(values);
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }
}

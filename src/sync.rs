//! Synchronization primitives for headsync.
//!
//! - [`Semaphore`] bounds how many external processes run at once.
//! - [`Cancellation`] is the cooperative interrupt signal threaded through
//!   every network-bound call.
//! - [`OnceMap`] computes a value at most once per key and shares it with
//!   every concurrent caller asking for the same key. A computation that
//!   yields nothing is not cached, so the next caller tries again.

use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use dashmap::DashMap;

/// A counting semaphore for limiting concurrency.
///
/// Permits are released by dropping the [`SemaphoreGuard`], even on panic.
#[derive(Clone)]
pub struct Semaphore {
    state: Arc<(Mutex<usize>, Condvar)>,
}

/// RAII guard that releases a semaphore permit on drop.
pub struct SemaphoreGuard {
    state: Arc<(Mutex<usize>, Condvar)>,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            state: Arc::new((Mutex::new(permits.max(1)), Condvar::new())),
        }
    }

    /// Acquire a permit, blocking until one is available.
    pub fn acquire(&self) -> SemaphoreGuard {
        let (lock, cvar) = &*self.state;
        // A poisoned counter is still a valid counter.
        let mut available = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while *available == 0 {
            available = cvar
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *available -= 1;

        SemaphoreGuard {
            state: Arc::clone(&self.state),
        }
    }
}

impl Drop for SemaphoreGuard {
    fn drop(&mut self) {
        let (lock, cvar) = &*self.state;
        let mut available = lock.lock().unwrap_or_else(PoisonError::into_inner);
        *available += 1;
        cvar.notify_one();
    }
}

/// Cooperative cancellation token.
///
/// Cloning shares the underlying flag. Long-running operations check
/// [`Cancellation::is_cancelled`] between steps, and process runs poll it so
/// a cancelled fetch is killed instead of left running.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The shared flag, for wiring into signal handlers.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

/// A concurrent map that computes each value at most once.
///
/// The shard lock is only held while looking up the per-key cell; the
/// computation itself runs under that key's own lock, so callers for
/// different keys proceed in parallel while callers for the same key wait for
/// the first one and then share its result.
pub struct OnceMap<K, V> {
    cells: DashMap<K, Arc<Mutex<Option<V>>>>,
}

impl<K, V> OnceMap<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            cells: DashMap::new(),
        }
    }

    /// Return the value for `key`, computing it with `init` if no caller has
    /// done so yet.
    pub fn get_or_init(&self, key: K, init: impl FnOnce() -> V) -> V {
        let cell = self.cell(key);
        let mut slot = cell.lock().unwrap_or_else(PoisonError::into_inner);
        slot.get_or_insert_with(init).clone()
    }

    /// Like [`get_or_init`](Self::get_or_init), but `None` from `init` is
    /// returned without being stored.
    pub fn try_get_or_init(&self, key: K, init: impl FnOnce() -> Option<V>) -> Option<V> {
        let cell = self.cell(key);
        let mut slot = cell.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = init();
        }
        slot.clone()
    }

    /// The value for `key` if it has already been computed.
    pub fn get(&self, key: &K) -> Option<V> {
        let cell = Arc::clone(self.cells.get(key)?.value());
        let slot = cell.lock().unwrap_or_else(PoisonError::into_inner);
        slot.clone()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn cell(&self, key: K) -> Arc<Mutex<Option<V>>> {
        Arc::clone(self.cells.entry(key).or_default().value())
    }
}

impl<K, V> Default for OnceMap<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

//! FIFO mutual exclusion serializing every mutation of the cache/file pair.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, trace};

/// An asynchronous FIFO mutual-exclusion gate.
///
/// Built on [`tokio::sync::Mutex`], which hands the lock to queued waiters in arrival order, so
/// no caller can starve. Holdership is represented by a [`LockGuard`]: dropping the guard
/// releases the lock (or passes it to the next waiter), which also happens when the critical
/// section returns early with an error or unwinds.
///
/// # Example
///
/// ```rust
/// use jnbase::ExclusiveLock;
///
/// # async fn example() {
/// let lock = ExclusiveLock::new();
/// let guard = lock.acquire().await;
/// assert!(lock.is_locked());
/// guard.release();
/// assert!(!lock.is_locked());
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ExclusiveLock {
    /// The FIFO mutex providing exclusion and ordering.
    inner:   Mutex<()>,
    /// Number of callers currently suspended in [`ExclusiveLock::acquire`].
    waiters: AtomicUsize,
}

/// Proof of sole holdership of an [`ExclusiveLock`]. Releases on drop.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl LockGuard<'_> {
    /// Releases the lock, handing it to the next queued waiter if any.
    pub fn release(self) {
        trace!("Exclusive lock released");
        drop(self);
    }
}

/// Keeps the waiter count accurate even if a pending acquisition is dropped.
struct WaiterTicket<'a>(&'a AtomicUsize);

impl<'a> WaiterTicket<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaiterTicket<'_> {
    fn drop(&mut self) { self.0.fetch_sub(1, Ordering::SeqCst); }
}

impl ExclusiveLock {
    /// Creates an unheld lock.
    pub const fn new() -> Self {
        Self {
            inner:   Mutex::const_new(()),
            waiters: AtomicUsize::new(0),
        }
    }

    /// Suspends until the caller is the sole holder. Grants immediately if unheld.
    pub async fn acquire(&self) -> LockGuard<'_> {
        if let Ok(guard) = self.inner.try_lock() {
            trace!("Exclusive lock acquired without contention");
            return LockGuard {
                _guard: guard,
            };
        }

        let ticket = WaiterTicket::enter(&self.waiters);
        debug!(
            "Exclusive lock contended, queueing behind {} waiter(s)",
            self.waiters().saturating_sub(1)
        );
        let guard = self.inner.lock().await;
        drop(ticket);
        trace!("Exclusive lock acquired after waiting");
        LockGuard {
            _guard: guard,
        }
    }

    /// Acquires the lock only if it is free and nobody is queued.
    pub fn try_acquire(&self) -> Option<LockGuard<'_>> {
        self.inner.try_lock().ok().map(|guard| {
            LockGuard {
                _guard: guard,
            }
        })
    }

    /// Returns `true` if the lock is currently held.
    pub fn is_locked(&self) -> bool { self.inner.try_lock().is_err() }

    /// Returns the number of callers suspended waiting for the lock.
    pub fn waiters(&self) -> usize { self.waiters.load(Ordering::SeqCst) }
}

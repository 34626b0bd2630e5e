//! Filepath: src/rwspinlock.rs
//!
//! Reader-writer spin lock used for per-node locking and for the list-level
//! coordination lock.
//!
//! [`RwSpinLock`] packs the whole lock state into a single `u32`: the top bit
//! marks a writer, the remaining 31 bits count active readers. Waiters busy-spin
//! on the atomic word instead of parking in the OS scheduler, so the lock is
//! only suitable for short critical sections.
//!
//! # Concurrency Model
//! 1. Readers: call [`RwSpinLock::read_lock`], read, let the [`ReadGuard`] drop.
//! 2. Writers: call [`RwSpinLock::write_lock`], modify, let the [`WriteGuard`] drop.
//!
//! # Type-State Pattern
//! The guard type records which mode was acquired, so the unlock path can never
//! confuse a reader release with a writer release. Guards release on drop
//! (panic-safe) or through an explicit `unlock(self)`.
//!
//! # Fairness
//! Writer-preferring: once a writer has published the writer bit, new readers
//! spin until that writer unlocks. A flood of readers therefore cannot starve a
//! writer. A stream of writers can delay readers, which is acceptable for the
//! short, write-heavy node critical sections this lock protects.
//!
//! ```rust
//! use rclist::rwspinlock::RwSpinLock;
//!
//! let lock = RwSpinLock::new();
//! {
//!     let _a = lock.read_lock();
//!     let _b = lock.read_lock();
//!     assert_eq!(lock.readers(), 2);
//! }
//! let guard = lock.write_lock();
//! assert!(lock.is_write_locked());
//! guard.unlock();
//! assert!(!lock.is_locked());
//! ```

use std::marker::PhantomData;
use std::sync::atomic::AtomicU32;

use crate::ordering::{CAS_FAILURE, LOCK_ORD, RELAXED, UNLOCK_ORD};


#[cfg(loom)]
mod loom_tests;

// ============================================================================
//  Bit Constants
// ============================================================================

/// Writer bit: a writer holds the lock or is waiting for readers to drain.
const WRITER_BIT: u32 = 1 << 31;

/// Reader count mask.
const READER_MASK: u32 = WRITER_BIT - 1;

/// Busy spins before falling back to `yield_now`.
const SPIN_LIMIT: u32 = 64;

// ============================================================================
//  SpinWait
// ============================================================================

/// Bounded busy-wait with a scheduler fallback.
///
/// The first [`SPIN_LIMIT`] rounds only issue a CPU spin hint. After that each
/// round yields the rest of the timeslice, which keeps a contended lock from
/// monopolising a core when the holder has been descheduled.
#[derive(Debug, Default)]
pub(crate) struct SpinWait {
    spins: u32,
}

impl SpinWait {
    #[inline]
    pub(crate) const fn new() -> Self {
        Self { spins: 0 }
    }

    /// Wait one round.
    #[inline]
    pub(crate) fn snooze(&mut self) {
        if self.spins < SPIN_LIMIT {
            self.spins += 1;
            std::hint::spin_loop();
        } else {
            std::thread::yield_now();
        }
    }

    /// Number of rounds waited so far (saturates at [`SPIN_LIMIT`]).
    #[inline]
    #[cfg_attr(not(feature = "tracing"), allow(dead_code))]
    pub(crate) const fn spins(&self) -> u32 {
        self.spins
    }
}

// ============================================================================
//  RwSpinLock
// ============================================================================

/// A compact reader-writer spin lock.
///
/// # Layout
/// Bit 31: `writer` | Bits 0-30: `reader count`
#[derive(Debug, Default)]
pub struct RwSpinLock {
    state: AtomicU32,
}

// ============================================================================
//  Guards (Type-State Pattern)
// ============================================================================

/// Proof that the lock is held in shared mode.
///
/// Cannot be constructed except through [`RwSpinLock::read_lock`] or
/// [`RwSpinLock::try_read`]. Releases one reader on drop.
///
/// Guards are `!Send` via `PhantomData<*mut ()>`: a lock must be released by
/// the thread that acquired it.
#[derive(Debug)]
#[must_use = "dropping the guard immediately releases the lock"]
pub struct ReadGuard<'a> {
    lock: &'a RwSpinLock,
    _marker: PhantomData<*mut ()>,
}

/// Proof that the lock is held exclusively.
///
/// Cannot be constructed except through [`RwSpinLock::write_lock`] or
/// [`RwSpinLock::try_write`]. Clears the writer bit on drop.
#[derive(Debug)]
#[must_use = "dropping the guard immediately releases the lock"]
pub struct WriteGuard<'a> {
    lock: &'a RwSpinLock,
    _marker: PhantomData<*mut ()>,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        let prev: u32 = self.lock.state.fetch_sub(1, UNLOCK_ORD);
        debug_assert!(prev & READER_MASK != 0, "read unlock without readers");
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        // Readers never increment while the writer bit is set, so only the
        // writer bit can be present here.
        let prev: u32 = self.lock.state.fetch_and(!WRITER_BIT, UNLOCK_ORD);
        debug_assert_eq!(prev, WRITER_BIT, "write unlock with readers present");
    }
}

impl ReadGuard<'_> {
    /// Release the shared lock.
    #[inline]
    pub fn unlock(self) {
        drop(self);
    }
}

impl WriteGuard<'_> {
    /// Release the exclusive lock.
    #[inline]
    pub fn unlock(self) {
        drop(self);
    }
}

impl RwSpinLock {
    /// Create an unlocked lock.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(0),
        }
    }

    // ========================================================================
    //  Acquisition
    // ========================================================================

    /// Acquire the lock in shared mode, spinning while a writer is present.
    pub fn read_lock(&self) -> ReadGuard<'_> {
        let mut wait = SpinWait::new();

        loop {
            if let Some(guard) = self.try_read() {
                return guard;
            }
            wait.snooze();
        }
    }

    /// Try to acquire the lock in shared mode without waiting.
    ///
    /// Fails if a writer holds or is waiting for the lock. A CAS lost to
    /// another reader is retried, since it does not indicate contention with
    /// a writer.
    pub fn try_read(&self) -> Option<ReadGuard<'_>> {
        let mut current: u32 = self.state.load(RELAXED);

        loop {
            if current & WRITER_BIT != 0 {
                return None;
            }

            debug_assert!(current < READER_MASK, "reader count overflow");

            match self
                .state
                .compare_exchange_weak(current, current + 1, LOCK_ORD, CAS_FAILURE)
            {
                Ok(_) => {
                    return Some(ReadGuard {
                        lock: self,
                        _marker: PhantomData,
                    });
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Acquire the lock exclusively.
    ///
    /// Publishes the writer bit first (blocking new readers), then waits for
    /// the active readers to drain.
    pub fn write_lock(&self) -> WriteGuard<'_> {
        let mut wait = SpinWait::new();

        loop {
            let current: u32 = self.state.load(RELAXED);

            if current & WRITER_BIT == 0
                && self
                    .state
                    .compare_exchange_weak(current, current | WRITER_BIT, LOCK_ORD, CAS_FAILURE)
                    .is_ok()
            {
                break;
            }
            wait.snooze();
        }

        let mut drain = SpinWait::new();
        while self.state.load(LOCK_ORD) != WRITER_BIT {
            drain.snooze();
        }

        WriteGuard {
            lock: self,
            _marker: PhantomData,
        }
    }

    /// Try to acquire the lock exclusively without waiting.
    ///
    /// Succeeds only when the lock is completely free.
    pub fn try_write(&self) -> Option<WriteGuard<'_>> {
        self.state
            .compare_exchange(0, WRITER_BIT, LOCK_ORD, CAS_FAILURE)
            .ok()
            .map(|_| WriteGuard {
                lock: self,
                _marker: PhantomData,
            })
    }

    // ========================================================================
    //  Inspection
    // ========================================================================

    /// Number of readers currently holding the lock.
    #[inline]
    #[must_use]
    pub fn readers(&self) -> u32 {
        self.state.load(RELAXED) & READER_MASK
    }

    /// Whether a writer holds (or is acquiring) the lock.
    #[inline]
    #[must_use]
    pub fn is_write_locked(&self) -> bool {
        self.state.load(RELAXED) & WRITER_BIT != 0
    }

    /// Whether anyone holds the lock.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state.load(RELAXED) != 0
    }
}

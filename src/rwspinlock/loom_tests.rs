//! Loom tests for RwSpinLock.
//!
//! Loom explores every interleaving of a small model, which catches races that
//! random stress testing can miss.
//!
//! Run with: `RUSTFLAGS="--cfg loom" cargo test --lib rwspinlock::loom_tests`
//!
//! NOTE: Loom tests use loom's own atomic types, so we create a simplified
//! version of the lock with the same state word and transitions.

use loom::sync::Arc;
use loom::sync::atomic::{AtomicU32, Ordering};
use loom::thread;
use std::marker::PhantomData;

// Bit constants (same as main module)
const WRITER_BIT: u32 = 1 << 31;
const READER_MASK: u32 = WRITER_BIT - 1;

/// Simplified RwSpinLock for loom testing.
struct LoomRwLock {
    state: AtomicU32,
}

struct LoomReadGuard<'a> {
    lock: &'a LoomRwLock,
    _marker: PhantomData<*mut ()>,
}

struct LoomWriteGuard<'a> {
    lock: &'a LoomRwLock,
    _marker: PhantomData<*mut ()>,
}

impl Drop for LoomReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.state.fetch_sub(1, Ordering::Release);
    }
}

impl Drop for LoomWriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.state.fetch_and(!WRITER_BIT, Ordering::Release);
    }
}

impl LoomRwLock {
    fn new() -> Self {
        Self {
            state: AtomicU32::new(0),
        }
    }

    fn read_lock(&self) -> LoomReadGuard<'_> {
        loop {
            let current = self.state.load(Ordering::Relaxed);

            if current & WRITER_BIT != 0 {
                thread::yield_now();
                continue;
            }

            if self
                .state
                .compare_exchange_weak(current, current + 1, Ordering::Acquire, Ordering::Acquire)
                .is_ok()
            {
                return LoomReadGuard {
                    lock: self,
                    _marker: PhantomData,
                };
            }
            thread::yield_now();
        }
    }

    fn write_lock(&self) -> LoomWriteGuard<'_> {
        loop {
            let current = self.state.load(Ordering::Relaxed);

            if current & WRITER_BIT == 0
                && self
                    .state
                    .compare_exchange_weak(
                        current,
                        current | WRITER_BIT,
                        Ordering::Acquire,
                        Ordering::Acquire,
                    )
                    .is_ok()
            {
                break;
            }
            thread::yield_now();
        }

        while self.state.load(Ordering::Acquire) != WRITER_BIT {
            thread::yield_now();
        }

        LoomWriteGuard {
            lock: self,
            _marker: PhantomData,
        }
    }

    fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) != 0
    }

    fn readers(&self) -> u32 {
        self.state.load(Ordering::Relaxed) & READER_MASK
    }
}

/// Two writers never hold the lock at the same time.
#[test]
fn test_loom_writer_mutual_exclusion() {
    loom::model(|| {
        let lock = Arc::new(LoomRwLock::new());
        let counter = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let l = Arc::clone(&lock);
                let c = Arc::clone(&counter);
                thread::spawn(move || {
                    let _guard = l.write_lock();
                    // Non-atomic increment: lost if exclusion fails.
                    let val = c.load(Ordering::Relaxed);
                    c.store(val + 1, Ordering::Relaxed);
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(counter.load(Ordering::Relaxed), 2);
        assert!(!lock.is_locked());
    });
}

/// A reader sees either none or all of a writer's critical section.
#[test]
fn test_loom_reader_sees_whole_write() {
    loom::model(|| {
        let lock = Arc::new(LoomRwLock::new());
        let a = Arc::new(AtomicU32::new(0));
        let b = Arc::new(AtomicU32::new(0));

        let (l1, a1, b1) = (Arc::clone(&lock), Arc::clone(&a), Arc::clone(&b));
        let writer = thread::spawn(move || {
            let _guard = l1.write_lock();
            a1.store(1, Ordering::Relaxed);
            b1.store(1, Ordering::Relaxed);
        });

        let (l2, a2, b2) = (Arc::clone(&lock), Arc::clone(&a), Arc::clone(&b));
        let reader = thread::spawn(move || {
            let _guard = l2.read_lock();
            let x = a2.load(Ordering::Relaxed);
            let y = b2.load(Ordering::Relaxed);
            assert_eq!(x, y);
        });

        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(lock.readers(), 0);
    });
}

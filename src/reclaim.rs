//! Filepath: src/reclaim.rs
//!
//! Deferred reclamation of tombstoned nodes.
//!
//! Erased nodes cannot be freed on the spot: a cursor may still sit on them, or
//! a concurrent step may be between reading a link and taking its reference.
//! They are pushed onto a lock-free staging stack (the "bin") and freed later by
//! a single background worker once they are provably unreferenced.
//!
//! # Sweep
//!
//! ```text
//!   head ─► [new arrivals] ─► start ─► [phase-1 segment] ─► null
//! ```
//!
//! 1. **Mark**: snapshot `start` under the coordination write lock. Walk the
//!    segment below it: nodes with a non-zero count leave the bin, the rest are
//!    marked `purged`.
//! 2. **Confirm**: take the coordination write lock again and detach the
//!    segment from anything pushed since. Every release that can observe a zero
//!    count runs under the coordination read lock, so this write acquisition
//!    waits out any thread still touching a node it just dropped to zero.
//!    Nodes still `purged` with a zero count are confirmed; the rest go back to
//!    the bin or leave it.
//! 3. **Free**: drop each confirmed node and release the references its frozen
//!    `prev`/`next` links held on its former neighbours.
//!
//! # Leaving the bin
//!
//! A node with live references is taken out of the bin so it is not rescanned
//! every sweep. Whoever later drops its count to zero stages it again. The
//! `staged` flag and the count form a store/load handshake (see
//! [`HANDSHAKE_ORD`](crate::ordering::HANDSHAKE_ORD)) so that exactly one of
//! the reclaimer or the releasing thread keeps ownership of the staging slot.

use std::marker::PhantomData;
use std::ptr as StdPtr;
use std::sync::atomic::{AtomicPtr, AtomicU64};

use crate::node::{Node, NodePtr};
use crate::ordering::{CAS_FAILURE, CAS_SUCCESS, READ_ORD, RELAXED, WRITE_ORD};
use crate::rwspinlock::RwSpinLock;
use crate::tracing_helpers::trace_log;

mod worker;


pub(crate) use worker::Reclaimer;

// ============================================================================
//  ReclaimStats
// ============================================================================

/// Counters describing reclaimer activity since the list was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimStats {
    /// Sweeps that found a non-empty bin.
    pub sweeps: u64,

    /// Nodes freed by the reclaimer.
    pub reclaimed: u64,

    /// Pushes onto the bin by erasing or releasing threads.
    pub staged: u64,
}

/// Outcome of a single sweep, used for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SweepReport {
    /// Nodes walked in phase 1.
    pub examined: usize,

    /// Nodes freed in the free pass.
    pub reclaimed: usize,

    /// Nodes that left the bin because they were still referenced.
    pub withdrawn: usize,

    /// Nodes pushed back for a later sweep.
    pub deferred: usize,
}

// ============================================================================
//  ReclaimDomain
// ============================================================================

/// State shared between a list and its reclaimer.
///
/// Owns the coordination lock and the staging stack. Nodes only enter the
/// domain through [`ReclaimDomain::retire`] and [`ReclaimDomain::release`].
#[derive(Debug)]
pub(crate) struct ReclaimDomain<T> {
    /// Readers: threads releasing references or staging nodes.
    /// Writer: the reclaimer at phase boundaries.
    coordination: RwSpinLock,

    /// Head of the intrusive staging stack.
    bin: AtomicPtr<Node<T>>,

    sweeps: AtomicU64,
    reclaimed: AtomicU64,
    staged: AtomicU64,

    /// Freeing a node drops a `T` on the reclaimer thread.
    _marker: PhantomData<Box<Node<T>>>,
}

impl<T> ReclaimDomain<T> {
    pub(crate) const fn new() -> Self {
        Self {
            coordination: RwSpinLock::new(),
            bin: AtomicPtr::new(StdPtr::null_mut()),
            sweeps: AtomicU64::new(0),
            reclaimed: AtomicU64::new(0),
            staged: AtomicU64::new(0),
            _marker: PhantomData,
        }
    }

    pub(crate) fn stats(&self) -> ReclaimStats {
        ReclaimStats {
            sweeps: self.sweeps.load(RELAXED),
            reclaimed: self.reclaimed.load(RELAXED),
            staged: self.staged.load(RELAXED),
        }
    }

    /// Whether the bin is empty.
    pub(crate) fn is_idle(&self) -> bool {
        self.bin.load(READ_ORD).is_null()
    }

    // ========================================================================
    //  Producer Side
    // ========================================================================

    /// Drop `count` references on `node`, staging it if it is tombstoned and
    /// the count reached zero.
    ///
    /// # Safety
    ///
    /// The caller must own `count` references on `node`, which must belong to
    /// the list served by this domain.
    pub(crate) unsafe fn release(&self, node: NodePtr<T>, count: u32) {
        let _coord = self.coordination.read_lock();

        // SAFETY: the caller's references keep the node alive until the
        // decrement below, and the coordination read lock keeps the reclaimer
        // from confirming it until we are done.
        let node_ref: &Node<T> = unsafe { &*node };

        if node_ref.drop_refs(count) == 0 && node_ref.is_tombstoned() {
            self.stage(node);
        }
    }

    /// Hand a freshly tombstoned node to the reclaimer, dropping the
    /// `link_refs` references its former neighbours held.
    ///
    /// # Safety
    ///
    /// `node` must have just been unlinked and tombstoned by the caller, and
    /// the caller must still hold at least one reference besides `link_refs`.
    pub(crate) unsafe fn retire(&self, node: NodePtr<T>, link_refs: u32) {
        let _coord = self.coordination.read_lock();

        // SAFETY: the caller's own reference keeps the node alive.
        let node_ref: &Node<T> = unsafe { &*node };
        debug_assert!(node_ref.is_tombstoned(), "retiring a live node");

        let remaining: u32 = node_ref.drop_refs(link_refs);
        debug_assert!(remaining > 0, "retire consumed the caller's reference");

        self.stage(node);
    }

    /// Push `node` unless it is already staged.
    fn stage(&self, node: NodePtr<T>) {
        // SAFETY: callers hold the coordination read lock and the node is
        // either referenced or has just dropped to zero under that lock.
        let node_ref: &Node<T> = unsafe { &*node };

        if node_ref.try_stage() {
            self.push(node);
            self.staged.fetch_add(1, RELAXED);
        }
    }

    /// Treiber push onto the bin.
    fn push(&self, node: NodePtr<T>) {
        // SAFETY: the caller owns the staging claim on `node`, so nobody else
        // writes its `bin_next`.
        let node_ref: &Node<T> = unsafe { &*node };
        debug_assert!(node_ref.is_staged(), "pushing a node without its claim");
        let mut head: NodePtr<T> = self.bin.load(READ_ORD);

        loop {
            node_ref.set_bin_next(head);

            match self
                .bin
                .compare_exchange_weak(head, node, CAS_SUCCESS, CAS_FAILURE)
            {
                Ok(_) => return,
                Err(actual) => head = actual,
            }
        }
    }

    // ========================================================================
    //  Consumer Side
    // ========================================================================

    /// Give up the staging claim on a node that is still referenced.
    ///
    /// Returns `true` if the node left the bin. Returns `false` if its count
    /// reached zero in the meantime and the reclaimer kept the claim itself.
    fn withdraw(node: &Node<T>) -> bool {
        node.unstage();

        if node.ref_count() != 0 {
            return true;
        }

        // The count hit zero after the check that sent us here. Either we win
        // the claim back, or the releasing thread already pushed the node again
        // and it now lives above the segment being swept.
        !node.try_stage()
    }

    /// Run one two-phase sweep.
    ///
    /// # Safety
    ///
    /// Only one thread may sweep a domain at a time, and nodes in the bin must
    /// have been allocated with `Box::into_raw`.
    pub(crate) unsafe fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        // ---- Phase 1: mark ------------------------------------------------
        let start: NodePtr<T> = {
            let _coord = self.coordination.write_lock();
            self.bin.load(READ_ORD)
        };

        if start.is_null() {
            return report;
        }

        // SAFETY: staged nodes are never freed by anyone but this sweep.
        let start_ref: &Node<T> = unsafe { &*start };
        report.examined += 1;

        // `start` may still be the shared head, so it cannot be unlinked here.
        // A referenced `start` is simply left unmarked for phase 2.
        if start_ref.ref_count() == 0 {
            start_ref.mark_purged();
        } else {
            start_ref.clear_purged();
        }

        let mut left: &Node<T> = start_ref;
        let mut current: NodePtr<T> = start_ref.bin_next();

        while !current.is_null() {
            // SAFETY: nodes below `start` are only linked and unlinked by us.
            let node: &Node<T> = unsafe { &*current };
            report.examined += 1;

            // Read before `withdraw`: a re-push overwrites `bin_next`.
            let following: NodePtr<T> = node.bin_next();

            if node.ref_count() != 0 && Self::withdraw(node) {
                left.set_bin_next(following);
                report.withdrawn += 1;
            } else {
                node.mark_purged();
                left = node;
            }

            current = following;
        }

        // ---- Phase 2: confirm and splice ----------------------------------
        let head: NodePtr<T> = {
            let _coord = self.coordination.write_lock();
            let head: NodePtr<T> = self.bin.load(READ_ORD);

            if head == start {
                self.bin.store(StdPtr::null_mut(), WRITE_ORD);
            }
            head
        };

        if head != start {
            // Cut the new arrivals off the phase-1 segment. Their `bin_next`
            // fields are frozen once published, except by us.
            let mut above: NodePtr<T> = head;
            loop {
                // SAFETY: every node between `head` and `start` is staged.
                let node: &Node<T> = unsafe { &*above };
                let below: NodePtr<T> = node.bin_next();

                if below == start {
                    node.set_bin_next(StdPtr::null_mut());
                    break;
                }

                debug_assert!(!below.is_null(), "phase-1 start lost from the bin");
                above = below;
            }
        }

        let mut confirmed: Vec<NodePtr<T>> = Vec::new();
        let mut current: NodePtr<T> = start;

        while !current.is_null() {
            // SAFETY: the segment is now private to this sweep.
            let node: &Node<T> = unsafe { &*current };
            let following: NodePtr<T> = node.bin_next();

            if node.is_purged() && node.ref_count() == 0 {
                confirmed.push(current);
            } else {
                node.clear_purged();

                if node.ref_count() == 0 || !Self::withdraw(node) {
                    self.push(current);
                    report.deferred += 1;
                } else {
                    report.withdrawn += 1;
                }
            }

            current = following;
        }

        // ---- Free pass ----------------------------------------------------
        for ptr in confirmed {
            // SAFETY: count is zero after the grace period, nothing links to
            // the node, and it is no longer in the bin.
            let node: Box<Node<T>> = unsafe { Box::from_raw(ptr) };
            let prev: NodePtr<T> = node.prev();
            let next: NodePtr<T> = node.next();
            drop(node);

            trace_log!(node = ?ptr, "reclaimed node");

            // SAFETY: the frozen links each owned one reference.
            unsafe {
                if !prev.is_null() {
                    self.release(prev, 1);
                }
                if !next.is_null() {
                    self.release(next, 1);
                }
            }

            report.reclaimed += 1;
        }

        self.sweeps.fetch_add(1, RELAXED);
        self.reclaimed.fetch_add(report.reclaimed as u64, RELAXED);

        report
    }
}

// The domain is shared with the reclaimer thread through an `Arc`. It holds raw
// node pointers, so the auto traits are derived from `Box<Node<T>>` through the
// marker: sharing requires `T: Send + Sync`.

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts drops so tests can tell exactly when a node was freed.
    struct Tracked(Arc<AtomicUsize>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// A tombstoned node with `refs` references and no neighbours.
    fn dead_node(drops: &Arc<AtomicUsize>, refs: u32) -> NodePtr<Tracked> {
        let node = Box::into_raw(Node::new(
            Tracked(Arc::clone(drops)),
            StdPtr::null_mut(),
            StdPtr::null_mut(),
        ));
        // SAFETY: freshly allocated.
        let node_ref = unsafe { &*node };
        node_ref.mark_tombstoned();
        node_ref.drop_refs(3 - refs);
        node
    }

    #[test]
    fn test_sweep_on_empty_bin() {
        let domain: ReclaimDomain<u32> = ReclaimDomain::new();

        // SAFETY: single sweeper.
        let report = unsafe { domain.sweep() };
        assert_eq!(report, SweepReport::default());
        assert_eq!(domain.stats().sweeps, 0);
    }

    #[test]
    fn test_unreferenced_node_is_freed() {
        let drops = Arc::new(AtomicUsize::new(0));
        let domain: ReclaimDomain<Tracked> = ReclaimDomain::new();

        let node = dead_node(&drops, 1);
        // SAFETY: we own the single remaining reference.
        unsafe { domain.release(node, 1) };
        assert!(!domain.is_idle());

        // SAFETY: single sweeper.
        let report = unsafe { domain.sweep() };

        assert_eq!(report.reclaimed, 1);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(domain.is_idle());
        assert_eq!(domain.stats().reclaimed, 1);
        assert_eq!(domain.stats().staged, 1);
    }

    #[test]
    fn test_referenced_node_leaves_bin_and_returns() {
        let drops = Arc::new(AtomicUsize::new(0));
        let domain: ReclaimDomain<Tracked> = ReclaimDomain::new();

        // One link reference plus one "cursor" reference.
        let node = dead_node(&drops, 2);
        // SAFETY: the cursor reference keeps it alive.
        unsafe { domain.retire(node, 1) };

        // SAFETY: single sweeper.
        let report = unsafe { domain.sweep() };
        assert_eq!(report.reclaimed, 0);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert!(domain.is_idle(), "referenced node should leave the bin");

        // Dropping the cursor reference stages it again.
        // SAFETY: we own that reference.
        unsafe { domain.release(node, 1) };
        assert!(!domain.is_idle());

        // SAFETY: single sweeper.
        let report = unsafe { domain.sweep() };
        assert_eq!(report.reclaimed, 1);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_multiple_nodes_in_one_sweep() {
        let drops = Arc::new(AtomicUsize::new(0));
        let domain: ReclaimDomain<Tracked> = ReclaimDomain::new();

        let held = dead_node(&drops, 1);
        // SAFETY: freshly allocated, one reference held.
        unsafe { (*held).acquire() };

        for _ in 0..4 {
            let node = dead_node(&drops, 1);
            // SAFETY: we own the reference.
            unsafe { domain.release(node, 1) };
        }
        // SAFETY: we own one of the two references.
        unsafe { domain.release(held, 1) };
        // `held` has a live reference but is not staged yet: stage it by hand.
        // SAFETY: still referenced.
        unsafe { domain.retire(held, 0) };

        // SAFETY: single sweeper.
        let report = unsafe { domain.sweep() };
        assert_eq!(report.examined, 5);
        assert_eq!(report.reclaimed, 4);
        assert_eq!(report.withdrawn, 1);
        assert!(domain.is_idle());

        // SAFETY: last reference.
        unsafe { domain.release(held, 1) };
        // SAFETY: single sweeper.
        unsafe { domain.sweep() };
        assert_eq!(drops.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_freeing_releases_frozen_neighbours() {
        let drops = Arc::new(AtomicUsize::new(0));
        let domain: ReclaimDomain<Tracked> = ReclaimDomain::new();

        // `left` is held only by `right.prev`.
        let left = dead_node(&drops, 1);
        let right = Box::into_raw(Node::new(
            Tracked(Arc::clone(&drops)),
            left,
            StdPtr::null_mut(),
        ));
        // SAFETY: freshly allocated.
        unsafe {
            (*right).mark_tombstoned();
            (*right).drop_refs(2);
            domain.release(right, 1);
        }

        // First sweep frees `right`, which stages `left`.
        // SAFETY: single sweeper.
        let report = unsafe { domain.sweep() };
        assert_eq!(report.reclaimed, 1);
        assert!(!domain.is_idle());

        // SAFETY: single sweeper.
        let report = unsafe { domain.sweep() };
        assert_eq!(report.reclaimed, 1);
        assert_eq!(drops.load(Ordering::SeqCst), 2);
        assert!(domain.is_idle());
        assert_eq!(domain.stats().sweeps, 2);
    }

    #[test]
    fn test_withdraw_keeps_claim_when_count_is_zero() {
        let drops = Arc::new(AtomicUsize::new(0));
        let node = dead_node(&drops, 1);
        // SAFETY: freshly allocated.
        let node_ref = unsafe { &*node };

        assert!(node_ref.try_stage());
        node_ref.drop_refs(1);

        // Count is zero: the reclaimer wins the claim back.
        assert!(!ReclaimDomain::withdraw(node_ref));
        assert!(node_ref.is_staged());

        // SAFETY: nobody else holds the node.
        drop(unsafe { Box::from_raw(node) });
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}

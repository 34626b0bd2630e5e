//! Filepath: src/node.rs
//!
//! List node: a value, two structural links, a reference count, a tombstone
//! flag, staging bookkeeping for the reclaimer, and a per-node lock.
//!
//! # Reference Counting
//!
//! `ref_count` counts every holder that may dereference the node:
//! - each link pointing at it (`prev.next`, `next.prev`, and the frozen
//!   `prev`/`next` of tombstoned nodes that have not been freed yet),
//! - each live [`Cursor`](crate::Cursor),
//! - temporary references taken by in-flight operations.
//!
//! A link is only ever followed while holding the lock of the node that owns
//! it, and that link is itself counted, so a reference is never taken on a
//! node whose count is zero. Once a tombstoned node drops to zero it stays
//! there. Dropping to zero never frees the node; that is the reclaimer's job.

use std::ptr as StdPtr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32};

use crate::ordering::{HANDSHAKE_ORD, READ_ORD, RELAXED, WRITE_ORD};
use crate::rwspinlock::RwSpinLock;

/// Raw node pointer. Nodes are allocated with `Box::into_raw`.
pub(crate) type NodePtr<T> = *mut Node<T>;

/// References a freshly spliced node starts with: two links plus the cursor
/// returned by `insert`.
pub(crate) const INSERTED_REFS: u32 = 3;

/// Link references dropped when a node is unlinked by `erase`.
pub(crate) const LINK_REFS: u32 = 2;

/// A node of the list.
///
/// Sentinels carry no value. Every other field is atomic so that a node can be
/// inspected by the reclaimer without taking its lock.
#[derive(Debug)]
pub(crate) struct Node<T> {
    value: Option<T>,

    prev: AtomicPtr<Node<T>>,
    next: AtomicPtr<Node<T>>,

    ref_count: AtomicU32,

    /// Set once by `erase`, under the node's write lock.
    tombstoned: AtomicBool,

    /// Survived phase 1 of the current sweep with a zero count.
    purged: AtomicBool,

    /// Linked into the staging stack (or owned by a running sweep).
    staged: AtomicBool,

    /// Intrusive staging stack link.
    bin_next: AtomicPtr<Node<T>>,

    lock: RwSpinLock,
}

impl<T> Node<T> {
    /// Create a sentinel with a single self-owned reference.
    pub(crate) fn sentinel() -> Box<Self> {
        Box::new(Self::with_parts(None, StdPtr::null_mut(), StdPtr::null_mut(), 1))
    }

    /// Create an element node already linked to `prev` and `next`.
    pub(crate) fn new(value: T, prev: NodePtr<T>, next: NodePtr<T>) -> Box<Self> {
        Box::new(Self::with_parts(Some(value), prev, next, INSERTED_REFS))
    }

    const fn with_parts(value: Option<T>, prev: NodePtr<T>, next: NodePtr<T>, refs: u32) -> Self {
        Self {
            value,
            prev: AtomicPtr::new(prev),
            next: AtomicPtr::new(next),
            ref_count: AtomicU32::new(refs),
            tombstoned: AtomicBool::new(false),
            purged: AtomicBool::new(false),
            staged: AtomicBool::new(false),
            bin_next: AtomicPtr::new(StdPtr::null_mut()),
            lock: RwSpinLock::new(),
        }
    }

    // ========================================================================
    //  Value and Links
    // ========================================================================

    #[inline]
    pub(crate) const fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    #[inline]
    pub(crate) const fn is_sentinel(&self) -> bool {
        self.value.is_none()
    }

    #[inline]
    pub(crate) const fn lock(&self) -> &RwSpinLock {
        &self.lock
    }

    #[inline]
    pub(crate) fn prev(&self) -> NodePtr<T> {
        self.prev.load(READ_ORD)
    }

    #[inline]
    pub(crate) fn next(&self) -> NodePtr<T> {
        self.next.load(READ_ORD)
    }

    /// Caller must hold this node's write lock.
    #[inline]
    pub(crate) fn set_prev(&self, prev: NodePtr<T>) {
        self.prev.store(prev, WRITE_ORD);
    }

    /// Caller must hold this node's write lock.
    #[inline]
    pub(crate) fn set_next(&self, next: NodePtr<T>) {
        self.next.store(next, WRITE_ORD);
    }

    // ========================================================================
    //  Reference Count
    // ========================================================================

    /// Take one reference.
    ///
    /// Clears the `purged` mark so that a sweep in progress treats the node as
    /// revived.
    #[inline]
    pub(crate) fn acquire(&self) {
        let prev: u32 = self.ref_count.fetch_add(1, RELAXED);
        debug_assert!(prev < u32::MAX, "reference count overflow");

        if self.purged.load(RELAXED) {
            self.purged.store(false, HANDSHAKE_ORD);
        }
    }

    /// Drop `count` references and return what is left.
    ///
    /// Does not free anything. The caller stages the node when this returns
    /// zero on a tombstoned node.
    #[inline]
    pub(crate) fn drop_refs(&self, count: u32) -> u32 {
        let prev: u32 = self.ref_count.fetch_sub(count, HANDSHAKE_ORD);
        debug_assert!(prev >= count, "reference count underflow");
        prev - count
    }

    #[inline]
    pub(crate) fn ref_count(&self) -> u32 {
        self.ref_count.load(HANDSHAKE_ORD)
    }

    // ========================================================================
    //  Tombstone
    // ========================================================================

    #[inline]
    pub(crate) fn is_tombstoned(&self) -> bool {
        self.tombstoned.load(READ_ORD)
    }

    /// Caller must hold this node's write lock.
    #[inline]
    pub(crate) fn mark_tombstoned(&self) {
        debug_assert!(!self.is_sentinel(), "sentinels are never tombstoned");
        self.tombstoned.store(true, WRITE_ORD);
    }

    // ========================================================================
    //  Staging Bookkeeping
    // ========================================================================

    /// Claim the right to push this node onto the staging stack.
    ///
    /// Returns `true` if the caller won and must push it.
    #[inline]
    pub(crate) fn try_stage(&self) -> bool {
        !self.staged.swap(true, HANDSHAKE_ORD)
    }

    /// Give up the staging claim. Only the reclaimer calls this.
    #[inline]
    pub(crate) fn unstage(&self) {
        self.staged.store(false, HANDSHAKE_ORD);
    }

    #[inline]
    pub(crate) fn is_staged(&self) -> bool {
        self.staged.load(READ_ORD)
    }

    #[inline]
    pub(crate) fn is_purged(&self) -> bool {
        self.purged.load(HANDSHAKE_ORD)
    }

    #[inline]
    pub(crate) fn mark_purged(&self) {
        self.purged.store(true, HANDSHAKE_ORD);
    }

    #[inline]
    pub(crate) fn clear_purged(&self) {
        self.purged.store(false, HANDSHAKE_ORD);
    }

    #[inline]
    pub(crate) fn bin_next(&self) -> NodePtr<T> {
        self.bin_next.load(READ_ORD)
    }

    #[inline]
    pub(crate) fn set_bin_next(&self, next: NodePtr<T>) {
        self.bin_next.store(next, WRITE_ORD);
    }
}

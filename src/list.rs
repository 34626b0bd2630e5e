//! Filepath: src/list.rs
//!
//! Concurrent doubly-linked list.
//!
//! [`List`] owns two permanent sentinels and hands out [`Cursor`]s, each of
//! which pins one node with a reference. Structural changes lock only the
//! nodes they touch; erased nodes are tombstoned and handed to the list's
//! reclaimer instead of being freed on the spot.
//!
//! # Lock Order
//!
//! ```text
//!   head ─► ... ─► prev ─► target ─► next ─► ... ─► tail
//!   locks are always taken left to right, at most three at a time
//! ```
//!
//! Nodes never move relative to each other, so every operation acquires in
//! ascending structural order and no two operations can wait on each other in
//! a cycle. Releases and staging never happen while a node lock is held.
//!
//! # Validation
//!
//! Positions read without a lock are re-checked once all locks are held. A
//! failed check means a concurrent insert or erase won the race; the locks are
//! dropped and the operation retries with backoff.

use std::fmt as StdFmt;
use std::ptr as StdPtr;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use crate::config::ListConfig;
use crate::error::ListError;
use crate::node::{LINK_REFS, Node, NodePtr};
use crate::ordering::RELAXED;
use crate::reclaim::{ReclaimDomain, ReclaimStats, Reclaimer};
use crate::rwspinlock::SpinWait;
use crate::tracing_helpers::{debug_log, trace_log};

pub mod cursor;

pub use cursor::{Cursor, Iter};

// ============================================================================
//  List
// ============================================================================

/// A doubly-linked list that can be read and modified from many threads.
///
/// All operations take `&self`. Positions are expressed with [`Cursor`]s,
/// which stay valid (readable and steppable) even after the element they sit
/// on has been erased by another thread.
///
/// # Example
///
/// ```rust
/// use rclist::List;
///
/// let list: List<u32> = List::new();
/// list.push_back(1);
/// list.push_back(3);
///
/// let first = list.begin().unwrap();
/// let inserted = list.insert(&first, 2).unwrap();
/// assert_eq!(inserted.get(), Some(&2));
///
/// assert_eq!(list.to_vec(), vec![1, 2, 3]);
/// ```
pub struct List<T> {
    head: NodePtr<T>,
    tail: NodePtr<T>,

    /// Maintained element count. Eventually consistent with the links.
    len: AtomicUsize,

    domain: Arc<ReclaimDomain<T>>,
    reclaimer: Reclaimer,
}

// SAFETY: nodes are only reached through the list, values are shared between
// threads by reference and dropped on the reclaimer thread.
unsafe impl<T: Send + Sync> Send for List<T> {}

// SAFETY: every shared mutation goes through node locks or atomics.
unsafe impl<T: Send + Sync> Sync for List<T> {}

impl<T> List<T>
where
    T: Send + Sync + 'static,
{
    // ========================================================================
    //  Construction
    // ========================================================================

    /// Create an empty list with the default configuration.
    ///
    /// # Panics
    ///
    /// Panics if the reclaimer thread cannot be spawned. Use
    /// [`List::try_with_config`] to handle that case.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ListConfig::default())
    }

    /// Create an empty list with `config`.
    ///
    /// # Panics
    ///
    /// Panics if the reclaimer thread cannot be spawned.
    #[must_use]
    pub fn with_config(config: ListConfig) -> Self {
        match Self::try_with_config(config) {
            Ok(list) => list,
            Err(err) => panic!("{err}"),
        }
    }

    /// Create an empty list with `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ListError::ReclaimerSpawn`] if the reclaimer thread cannot be
    /// started.
    pub fn try_with_config(config: ListConfig) -> Result<Self, ListError> {
        let domain: Arc<ReclaimDomain<T>> = Arc::new(ReclaimDomain::new());
        let reclaimer: Reclaimer = Reclaimer::spawn(Arc::clone(&domain), &config)?;

        let head: NodePtr<T> = Box::into_raw(Node::sentinel());
        let tail: NodePtr<T> = Box::into_raw(Node::sentinel());

        // SAFETY: both sentinels were just allocated and are not shared yet.
        unsafe {
            (*head).set_next(tail);
            (*tail).acquire();
            (*tail).set_prev(head);
            (*head).acquire();
        }

        debug_log!(
            thread = %config.thread_name,
            interval_ms = config.sweep_interval.as_millis() as u64,
            "list created"
        );

        Ok(Self {
            head,
            tail,
            len: AtomicUsize::new(0),
            domain,
            reclaimer,
        })
    }

    /// Create a list holding a single element.
    #[must_use]
    pub fn from_value(value: T) -> Self {
        let list: Self = Self::new();
        list.push_back(value);
        list
    }

    // ========================================================================
    //  Positions
    // ========================================================================

    /// Cursor on the first element.
    ///
    /// # Errors
    ///
    /// Returns [`ListError::OutOfRange`] if the list is empty.
    pub fn begin(&self) -> Result<Cursor<'_, T>, ListError> {
        // SAFETY: sentinels live as long as the list.
        let first: NodePtr<T> = unsafe { self.acquire_link(self.head, Direction::Next) };

        if first == self.tail {
            // SAFETY: we own the reference just taken.
            unsafe { self.domain.release(first, 1) };
            return Err(ListError::OutOfRange);
        }

        Ok(Cursor::adopt(self, first))
    }

    /// Cursor on the last element.
    ///
    /// # Errors
    ///
    /// Returns [`ListError::OutOfRange`] if the list is empty.
    pub fn rbegin(&self) -> Result<Cursor<'_, T>, ListError> {
        // SAFETY: sentinels live as long as the list.
        let last: NodePtr<T> = unsafe { self.acquire_link(self.tail, Direction::Prev) };

        if last == self.head {
            // SAFETY: we own the reference just taken.
            unsafe { self.domain.release(last, 1) };
            return Err(ListError::OutOfRange);
        }

        Ok(Cursor::adopt(self, last))
    }

    /// Cursor on the tail sentinel (one past the last element).
    #[must_use]
    pub fn end(&self) -> Cursor<'_, T> {
        Cursor::pin(self, self.tail)
    }

    /// Cursor on the head sentinel (one before the first element).
    ///
    /// Inserting at `rend()` prepends.
    #[must_use]
    pub fn rend(&self) -> Cursor<'_, T> {
        Cursor::pin(self, self.head)
    }

    // ========================================================================
    //  Insert
    // ========================================================================

    /// Insert `value` immediately after the node `at` designates.
    ///
    /// Returns a cursor on the new element. If `at`'s element was erased
    /// concurrently, nothing is inserted and the end cursor is returned.
    ///
    /// # Errors
    ///
    /// - [`ListError::OutOfRange`] if `at` is the end cursor.
    /// - [`ListError::ForeignCursor`] if `at` belongs to another list.
    pub fn insert(&self, at: &Cursor<'_, T>, value: T) -> Result<Cursor<'_, T>, ListError> {
        if !at.belongs_to(self) {
            return Err(ListError::ForeignCursor);
        }

        let prev: NodePtr<T> = at.node();
        if prev == self.tail {
            return Err(ListError::OutOfRange);
        }

        // SAFETY: `at` holds a reference on `prev`.
        match unsafe { self.link_after(prev, value, None) } {
            Ok(node) => Ok(Cursor::adopt(self, node)),
            Err(_stale) => {
                trace_log!("insert after erased node");
                Ok(self.end())
            }
        }
    }

    /// Splice a new node holding `value` right after `prev`.
    ///
    /// With `expect_next`, also fails if `prev`'s successor is not that node.
    /// On failure the value is handed back. On success the new node carries
    /// one reference owned by the caller.
    ///
    /// # Safety
    ///
    /// The caller must hold a reference on `prev`.
    unsafe fn link_after(
        &self,
        prev: NodePtr<T>,
        value: T,
        expect_next: Option<NodePtr<T>>,
    ) -> Result<NodePtr<T>, T> {
        // SAFETY: caller's reference keeps `prev` alive.
        let prev_ref: &Node<T> = unsafe { &*prev };
        let mut wait = SpinWait::new();

        loop {
            let prev_guard = prev_ref.lock().write_lock();

            if prev_ref.is_tombstoned() {
                return Err(value);
            }

            let next: NodePtr<T> = prev_ref.next();
            if expect_next.is_some_and(|expected| expected != next) {
                return Err(value);
            }

            // SAFETY: `prev.next` is a counted link and `prev` is locked.
            let next_ref: &Node<T> = unsafe { &*next };
            let next_guard = next_ref.lock().write_lock();

            if next_ref.prev() == prev {
                let node: NodePtr<T> = Box::into_raw(Node::new(value, prev, next));

                // Each neighbour trades one link for another: counts unchanged.
                prev_ref.set_next(node);
                next_ref.set_prev(node);
                self.len.fetch_add(1, RELAXED);

                next_guard.unlock();
                prev_guard.unlock();
                return Ok(node);
            }

            next_guard.unlock();
            prev_guard.unlock();

            trace_log!(spins = wait.spins(), "insert validation failed, retrying");
            wait.snooze();
        }
    }

    /// Append `value` at the back.
    pub fn push_back(&self, value: T) {
        let mut value: T = value;
        let mut wait = SpinWait::new();

        loop {
            // SAFETY: sentinels live as long as the list.
            let last: NodePtr<T> = unsafe { self.acquire_link(self.tail, Direction::Prev) };

            // SAFETY: we hold a reference on `last`.
            let outcome = unsafe { self.link_after(last, value, Some(self.tail)) };

            // SAFETY: releasing the reference taken above.
            unsafe { self.domain.release(last, 1) };

            match outcome {
                Ok(node) => {
                    // SAFETY: `link_after` gave us one reference.
                    unsafe { self.domain.release(node, 1) };
                    return;
                }
                Err(returned) => {
                    value = returned;
                    wait.snooze();
                }
            }
        }
    }

    /// Prepend `value` at the front.
    pub fn push_front(&self, value: T) {
        // SAFETY: the head sentinel is never tombstoned and lives as long as
        // the list, so the splice cannot fail.
        if let Ok(node) = unsafe { self.link_after(self.head, value, None) } {
            // SAFETY: `link_after` gave us one reference.
            unsafe { self.domain.release(node, 1) };
        }
    }

    // ========================================================================
    //  Erase
    // ========================================================================

    /// Erase the element `at` designates.
    ///
    /// Returns a cursor on the next live element (or the end cursor). If the
    /// element was already erased by another thread, nothing changes and the
    /// cursor moves past it.
    ///
    /// # Errors
    ///
    /// - [`ListError::OutOfRange`] if `at` is a sentinel.
    /// - [`ListError::ForeignCursor`] if `at` belongs to another list.
    pub fn erase(&self, at: &Cursor<'_, T>) -> Result<Cursor<'_, T>, ListError> {
        if !at.belongs_to(self) {
            return Err(ListError::ForeignCursor);
        }

        let target: NodePtr<T> = at.node();
        if target == self.head || target == self.tail {
            return Err(ListError::OutOfRange);
        }

        // SAFETY: `at` holds a reference on `target`.
        let (next, _unlinked) = unsafe { self.unlink(target) };

        let mut cursor: Cursor<'_, T> = Cursor::adopt(self, next);
        cursor.skip_erased_forward();
        Ok(cursor)
    }

    /// Unlink and tombstone `target`.
    ///
    /// Returns a referenced successor and whether this call did the unlink.
    ///
    /// # Safety
    ///
    /// The caller must hold a reference on `target`, which must not be a
    /// sentinel.
    unsafe fn unlink(&self, target: NodePtr<T>) -> (NodePtr<T>, bool) {
        // SAFETY: caller's reference keeps `target` alive.
        let target_ref: &Node<T> = unsafe { &*target };
        debug_assert!(!target_ref.is_sentinel(), "unlinking a sentinel");

        let mut wait = SpinWait::new();

        loop {
            let (prev, next): (NodePtr<T>, NodePtr<T>) = {
                let _guard = target_ref.lock().read_lock();
                let prev: NodePtr<T> = target_ref.prev();
                let next: NodePtr<T> = target_ref.next();

                // SAFETY: both links are counted and `target` is locked.
                unsafe {
                    (*prev).acquire();
                    (*next).acquire();
                }
                (prev, next)
            };

            // SAFETY: we hold a reference on each.
            let (prev_ref, next_ref): (&Node<T>, &Node<T>) = unsafe { (&*prev, &*next) };

            let prev_guard = prev_ref.lock().write_lock();
            let target_guard = target_ref.lock().write_lock();
            let next_guard = next_ref.lock().write_lock();

            if target_ref.is_tombstoned() {
                next_guard.unlock();
                target_guard.unlock();
                prev_guard.unlock();

                // SAFETY: releasing our snapshot reference; `next`'s becomes
                // the caller's.
                unsafe { self.domain.release(prev, 1) };
                return (next, false);
            }

            let linked: bool = !prev_ref.is_tombstoned()
                && !next_ref.is_tombstoned()
                && prev_ref.next() == target
                && next_ref.prev() == target;

            if linked {
                prev_ref.set_next(next);
                next_ref.set_prev(prev);
                target_ref.mark_tombstoned();
                self.len.fetch_sub(1, RELAXED);

                // Our snapshot references become the two new links; the
                // returned successor needs one more.
                next_ref.acquire();

                next_guard.unlock();
                target_guard.unlock();
                prev_guard.unlock();

                // SAFETY: `target` was unlinked and tombstoned above and the
                // caller still holds a reference.
                unsafe { self.domain.retire(target, LINK_REFS) };
                return (next, true);
            }

            next_guard.unlock();
            target_guard.unlock();
            prev_guard.unlock();

            // SAFETY: releasing our snapshot references.
            unsafe {
                self.domain.release(prev, 1);
                self.domain.release(next, 1);
            }

            trace_log!(spins = wait.spins(), "erase validation failed, retrying");
            wait.snooze();
        }
    }

    /// Remove the first element and return a clone of its value.
    pub fn pop_front(&self) -> Option<T>
    where
        T: Clone,
    {
        self.pop_end(self.head, Direction::Next)
    }

    /// Remove the last element and return a clone of its value.
    pub fn pop_back(&self) -> Option<T>
    where
        T: Clone,
    {
        self.pop_end(self.tail, Direction::Prev)
    }

    /// Erase the element next to `sentinel`, retrying if another thread erases
    /// it first.
    fn pop_end(&self, sentinel: NodePtr<T>, direction: Direction) -> Option<T>
    where
        T: Clone,
    {
        let mut wait = SpinWait::new();

        loop {
            // SAFETY: sentinels live as long as the list.
            let target: NodePtr<T> = unsafe { self.acquire_link(sentinel, direction) };

            if target == self.head || target == self.tail {
                // SAFETY: releasing the reference taken above.
                unsafe { self.domain.release(target, 1) };
                return None;
            }

            // SAFETY: we hold a reference on `target`, which is not a sentinel.
            let (next, unlinked) = unsafe { self.unlink(target) };

            // SAFETY: we hold a reference on `target` until the release below.
            let value: Option<T> = if unlinked {
                unsafe { (*target).value().cloned() }
            } else {
                None
            };

            // SAFETY: releasing the successor handed to us and our own
            // reference on `target`.
            unsafe {
                self.domain.release(next, 1);
                self.domain.release(target, 1);
            }

            if unlinked {
                return value;
            }
            wait.snooze();
        }
    }

    // ========================================================================
    //  Reading
    // ========================================================================

    /// Clone of the first element.
    #[must_use]
    pub fn front(&self) -> Option<T>
    where
        T: Clone,
    {
        self.begin().ok().and_then(|cursor| cursor.get().cloned())
    }

    /// Clone of the last element.
    #[must_use]
    pub fn back(&self) -> Option<T>
    where
        T: Clone,
    {
        self.rbegin().ok().and_then(|cursor| cursor.get().cloned())
    }

    /// Iterator over clones of the live elements, front to back.
    ///
    /// Elements erased while the iterator is suspended on them are skipped
    /// when it moves on.
    pub fn iter(&self) -> Iter<'_, T>
    where
        T: Clone,
    {
        Iter::new(self.rend())
    }

    /// Snapshot of the elements, front to back.
    ///
    /// Not atomic with respect to concurrent modifications.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.iter().collect()
    }

    /// Number of elements.
    ///
    /// Exact once concurrent modifications have completed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(RELAXED)
    }

    /// Whether the list holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counters of the list's reclaimer.
    #[must_use]
    pub fn reclaim_stats(&self) -> ReclaimStats {
        self.domain.stats()
    }
}

// ============================================================================
//  Link Helpers
// ============================================================================

/// Which link of a node to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Prev,
    Next,
}

impl<T> List<T> {
    /// Follow one link of `owner` under its read lock and take a reference on
    /// the node it points to.
    ///
    /// # Safety
    ///
    /// The caller must hold a reference on `owner` (or `owner` must be a
    /// sentinel), and `owner` must not be at the end of the requested
    /// direction.
    pub(crate) unsafe fn acquire_link(&self, owner: NodePtr<T>, direction: Direction) -> NodePtr<T> {
        // SAFETY: guaranteed by the caller.
        let owner_ref: &Node<T> = unsafe { &*owner };
        let _guard = owner_ref.lock().read_lock();

        let target: NodePtr<T> = match direction {
            Direction::Prev => owner_ref.prev(),
            Direction::Next => owner_ref.next(),
        };
        debug_assert!(!target.is_null(), "followed a link past a sentinel");

        // SAFETY: the link is counted and its owner is locked.
        unsafe { (*target).acquire() };
        target
    }

    pub(crate) const fn head(&self) -> NodePtr<T> {
        self.head
    }

    pub(crate) const fn tail(&self) -> NodePtr<T> {
        self.tail
    }

    /// Drop `count` references on `node`.
    ///
    /// # Safety
    ///
    /// The caller must own `count` references on `node`.
    pub(crate) unsafe fn release(&self, node: NodePtr<T>, count: u32) {
        // SAFETY: forwarded.
        unsafe { self.domain.release(node, count) };
    }
}

// ============================================================================
//  Trait Impls
// ============================================================================

impl<T> Default for List<T>
where
    T: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for List<T>
where
    T: Send + Sync + 'static,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut list: Self = Self::new();
        list.extend(iter);
        list
    }
}

impl<T> Extend<T> for List<T>
where
    T: Send + Sync + 'static,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push_back(value);
        }
    }
}

impl<T> Extend<T> for &List<T>
where
    T: Send + Sync + 'static,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push_back(value);
        }
    }
}

impl<'a, T> IntoIterator for &'a List<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

impl<T> StdFmt::Debug for List<T> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("List")
            .field("len", &self.len.load(RELAXED))
            .field("stats", &self.domain.stats())
            .finish_non_exhaustive()
    }
}

impl<T> Drop for List<T> {
    fn drop(&mut self) {
        // The worker drains the bin before it exits.
        self.reclaimer.shutdown();

        // Only reachable if the worker died early.
        while !self.domain.is_idle() {
            // SAFETY: the worker has been joined, we are the only sweeper.
            unsafe { self.domain.sweep() };
        }

        // No cursor can outlive `&self`, so only live nodes remain.
        let mut current: NodePtr<T> = self.head;

        while !current.is_null() {
            // SAFETY: every node still linked from `head` is owned by the
            // list alone at this point.
            let node: Box<Node<T>> = unsafe { Box::from_raw(current) };
            current = if StdPtr::eq(current, self.tail) {
                StdPtr::null_mut()
            } else {
                node.next()
            };
        }

        debug_log!(len = self.len.load(RELAXED), "list dropped");
    }
}

//! Filepath: src/list/cursor.rs
//!
//! Reference-counted positions in a [`List`].
//!
//! A [`Cursor`] owns one reference on the node it sits on, so the node stays
//! readable even after another thread erases it. Stepping takes the new
//! reference before dropping the old one, under a read lock on the node being
//! left, and lands past any erased nodes on the way.

use std::fmt as StdFmt;
use std::iter::FusedIterator;
use std::mem as StdMem;
use std::ptr as StdPtr;

use super::{Direction, List};
use crate::error::ListError;
use crate::node::{Node, NodePtr};

// ============================================================================
//  Cursor
// ============================================================================

/// A position in a [`List`].
///
/// Cloning a cursor pins the node again; dropping it releases the pin.
/// Equality compares node identity, not values.
///
/// ```rust
/// use rclist::List;
///
/// let list: List<u32> = (1..=3).collect();
/// let mut cursor = list.begin().unwrap();
///
/// cursor.move_next().unwrap();
/// assert_eq!(cursor.get(), Some(&2));
///
/// cursor.move_next().unwrap();
/// cursor.move_next().unwrap();
/// assert!(cursor.is_end());
/// assert!(cursor.move_next().is_err());
/// ```
pub struct Cursor<'a, T> {
    list: &'a List<T>,
    node: NodePtr<T>,
}

// SAFETY: a cursor only hands out `&T` and releases through the list's atomics.
unsafe impl<T: Send + Sync> Send for Cursor<'_, T> {}

// SAFETY: shared access only reads the pinned node.
unsafe impl<T: Send + Sync> Sync for Cursor<'_, T> {}

impl<'a, T> Cursor<'a, T> {
    /// Wrap a reference the caller already owns.
    pub(crate) const fn adopt(list: &'a List<T>, node: NodePtr<T>) -> Self {
        Self { list, node }
    }

    /// Take a new reference on `node`.
    ///
    /// `node` must be a sentinel of `list` or already pinned by the caller.
    pub(crate) fn pin(list: &'a List<T>, node: NodePtr<T>) -> Self {
        // SAFETY: see above.
        unsafe { (*node).acquire() };
        Self { list, node }
    }

    #[inline]
    pub(crate) const fn node(&self) -> NodePtr<T> {
        self.node
    }

    #[inline]
    pub(crate) fn belongs_to(&self, list: &List<T>) -> bool {
        StdPtr::eq(self.list, list)
    }

    #[inline]
    fn node_ref(&self) -> &Node<T> {
        // SAFETY: our reference keeps the node alive.
        unsafe { &*self.node }
    }

    // ========================================================================
    //  Inspection
    // ========================================================================

    /// The element under the cursor, or `None` on a sentinel.
    ///
    /// Still readable after the element has been erased.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        self.node_ref().value()
    }

    /// Whether the cursor is on the tail sentinel.
    #[must_use]
    pub fn is_end(&self) -> bool {
        self.node == self.list.tail()
    }

    /// Whether the cursor is on the head sentinel.
    #[must_use]
    pub fn is_head(&self) -> bool {
        self.node == self.list.head()
    }

    /// Whether the element under the cursor has been erased.
    #[must_use]
    pub fn is_tombstoned(&self) -> bool {
        self.node_ref().is_tombstoned()
    }

    // ========================================================================
    //  Movement
    // ========================================================================

    /// Advance to the next live element (or the end).
    ///
    /// # Errors
    ///
    /// Returns [`ListError::OutOfRange`] if the cursor is already at the end.
    pub fn move_next(&mut self) -> Result<(), ListError> {
        if self.is_end() {
            return Err(ListError::OutOfRange);
        }

        self.step(Direction::Next);
        self.skip_erased(Direction::Next);
        Ok(())
    }

    /// Step back to the previous live element (or the head sentinel).
    ///
    /// # Errors
    ///
    /// Returns [`ListError::OutOfRange`] if the cursor is on the head sentinel.
    pub fn move_prev(&mut self) -> Result<(), ListError> {
        if self.is_head() {
            return Err(ListError::OutOfRange);
        }

        self.step(Direction::Prev);
        self.skip_erased(Direction::Prev);
        Ok(())
    }

    /// Move forward until the cursor sits on a live node.
    pub(crate) fn skip_erased_forward(&mut self) {
        self.skip_erased(Direction::Next);
    }

    /// Sentinels are never tombstoned, so this stops at either end.
    fn skip_erased(&mut self, direction: Direction) {
        while self.is_tombstoned() {
            self.step(direction);
        }
    }

    /// Move one link in `direction`.
    fn step(&mut self, direction: Direction) {
        // SAFETY: we hold a reference on `self.node`, which is not at the end
        // of `direction`: callers check the sentinels and tombstoned nodes keep
        // their frozen links.
        let target: NodePtr<T> = unsafe { self.list.acquire_link(self.node, direction) };
        let left: NodePtr<T> = StdMem::replace(&mut self.node, target);

        // SAFETY: the reference we held on the node we left.
        unsafe { self.list.release(left, 1) };
    }
}

impl<T> Clone for Cursor<'_, T> {
    fn clone(&self) -> Self {
        Self::pin(self.list, self.node)
    }
}

impl<T> Drop for Cursor<'_, T> {
    fn drop(&mut self) {
        // SAFETY: the cursor owns exactly one reference.
        unsafe { self.list.release(self.node, 1) };
    }
}

impl<T> PartialEq for Cursor<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

impl<T> Eq for Cursor<'_, T> {}

impl<T: StdFmt::Debug> StdFmt::Debug for Cursor<'_, T> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("Cursor")
            .field("node", &self.node)
            .field("value", &self.get())
            .field("tombstoned", &self.is_tombstoned())
            .finish()
    }
}

// ============================================================================
//  Iter
// ============================================================================

/// Iterator over clones of a list's elements, created by [`List::iter`].
pub struct Iter<'a, T> {
    cursor: Cursor<'a, T>,
    done: bool,
}

impl<'a, T> Iter<'a, T> {
    /// Start just before the element `cursor` would move to next.
    pub(crate) const fn new(cursor: Cursor<'a, T>) -> Self {
        Self {
            cursor,
            done: false,
        }
    }
}

impl<T: Clone> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.done {
            return None;
        }

        if self.cursor.move_next().is_err() || self.cursor.is_end() {
            self.done = true;
            return None;
        }

        self.cursor.get().cloned()
    }
}

impl<T: Clone> FusedIterator for Iter<'_, T> {}

impl<T: StdFmt::Debug> StdFmt::Debug for Iter<'_, T> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("Iter")
            .field("cursor", &self.cursor)
            .field("done", &self.done)
            .finish()
    }
}

//! Standard memory orderings for concurrent list access.
//!
//! These constants ensure consistent ordering usage across the codebase
//! and make the intent clear at each access point.

use std::sync::atomic::Ordering;

/// Ordering for reading links and flags outside of a node lock.
/// Pairs with writer's Release stores.
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Ordering for writing links and flags under a node lock.
/// Pairs with reader's Acquire loads.
pub const WRITE_ORD: Ordering = Ordering::Release;

/// Ordering for CAS success on the staging stack head.
pub const CAS_SUCCESS: Ordering = Ordering::AcqRel;

/// Ordering for CAS failure.
/// Only need to see the current value.
pub const CAS_FAILURE: Ordering = Ordering::Acquire;

/// Ordering for relaxed loads (within a locked region, or statistics).
/// Safe because the lock provides synchronization.
pub const RELAXED: Ordering = Ordering::Relaxed;

/// Ordering for spin lock acquisition.
/// Must see everything the previous holder wrote.
pub const LOCK_ORD: Ordering = Ordering::Acquire;

/// Ordering for spin lock release.
/// Must publish the critical section to the next holder.
pub const UNLOCK_ORD: Ordering = Ordering::Release;

/// Ordering for the reference count / staging handshake.
///
/// A release that drops a count to zero and the reclaimer clearing the
/// `staged` flag form a store-load pair on two different atomics; only
/// sequential consistency guarantees that at least one side observes the
/// other.
pub const HANDSHAKE_ORD: Ordering = Ordering::SeqCst;

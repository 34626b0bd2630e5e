//! # `rclist`
//!
//! A concurrent doubly-linked list with per-node locking and deferred,
//! reference-counted reclamation.
//!
//! Every node carries its own reader-writer spin lock. Inserts lock the two
//! nodes around the gap, erases lock the target and both neighbours, always in
//! list order. Erased nodes are not freed in place: they are tombstoned, stay
//! readable for any [`Cursor`] still sitting on them, and are freed by a
//! background reclaimer once nothing references them any more.
//!
//! | Component | Role |
//! |-----------|------|
//! | [`List`] | Sentinels, element count, insert/erase/push/pop |
//! | [`Cursor`] | Reference-counted position, steps over erased nodes |
//! | [`RwSpinLock`] | Per-node lock, writer-preferring |
//! | reclaimer | Background thread running a two-phase sweep |
//!
//! ## Thread Safety
//!
//! `List<T>` is `Send + Sync` when `T: Send + Sync`. All operations take
//! `&self`:
//!
//! ```rust
//! use std::thread;
//! use rclist::List;
//!
//! let list: List<u64> = List::new();
//!
//! thread::scope(|s| {
//!     for t in 0..4 {
//!         let list = &list;
//!         s.spawn(move || {
//!             for i in 0..100 {
//!                 list.push_back(t * 100 + i);
//!             }
//!         });
//!     }
//! });
//!
//! assert_eq!(list.len(), 400);
//! ```
//!
//! ## Cursors Survive Erasure
//!
//! ```rust
//! use rclist::List;
//!
//! let list: List<u32> = (1..=4).collect();
//! let mut three = list.begin().unwrap();
//! three.move_next().unwrap();
//! three.move_next().unwrap();
//!
//! list.erase(&three.clone()).unwrap();
//!
//! // Still readable, and stepping lands on the survivor.
//! assert_eq!(three.get(), Some(&3));
//! three.move_next().unwrap();
//! assert_eq!(three.get(), Some(&4));
//! assert_eq!(list.len(), 3);
//! ```
//!
//! ## Logging
//!
//! Enable the `tracing` feature to route internal events to the `tracing`
//! crate. Without it, logging compiles to nothing.

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

// Crate-private logging macros.
mod tracing_helpers;

pub mod config;
pub mod error;
pub mod list;
mod node;
pub mod ordering;
pub mod reclaim;
pub mod rwspinlock;

// Re-export main types for convenience
pub use config::ListConfig;
pub use error::ListError;
pub use list::{Cursor, Iter, List};
pub use reclaim::ReclaimStats;
pub use rwspinlock::RwSpinLock;

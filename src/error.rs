//! Errors surfaced by [`List`](crate::List) operations.

use std::fmt as StdFmt;

/// Errors that can occur during list operations.
///
/// Losing a race against a concurrent erase is not an error: `insert` and
/// `erase` report it by returning an end cursor, and internal validation
/// failures are retried transparently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListError {
    /// The operation targeted a sentinel, a position past either end, or an
    /// element of an empty list.
    OutOfRange,

    /// The cursor was obtained from a different list.
    ForeignCursor,

    /// The operating system refused to start the reclaimer thread.
    ReclaimerSpawn(String),
}

impl StdFmt::Display for ListError {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::OutOfRange => write!(f, "position out of range"),

            Self::ForeignCursor => write!(f, "cursor belongs to a different list"),

            Self::ReclaimerSpawn(reason) => {
                write!(f, "failed to spawn reclaimer thread: {reason}")
            }
        }
    }
}

impl std::error::Error for ListError {}

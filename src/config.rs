//! Construction-time configuration for [`List`](crate::List).

use std::time::Duration;

/// Default pause between two reclamation sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Default name of the reclaimer thread.
pub const DEFAULT_THREAD_NAME: &str = "rclist-reclaimer";

/// Configuration for a [`List`](crate::List) and its reclaimer.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use rclist::{List, ListConfig};
///
/// let config = ListConfig::default().with_sweep_interval(Duration::from_millis(10));
/// let list: List<u32> = List::with_config(config);
/// assert!(list.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListConfig {
    /// How long the reclaimer sleeps between sweeps.
    ///
    /// A tombstoned node is freed no earlier than the sweep after the one
    /// that staged it, so this also bounds how long dead nodes linger.
    pub sweep_interval: Duration,

    /// Name given to the reclaimer thread.
    pub thread_name: String,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl ListConfig {
    /// Set the pause between reclamation sweeps.
    #[must_use]
    pub const fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the reclaimer thread name.
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

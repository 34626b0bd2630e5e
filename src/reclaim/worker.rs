//! Background reclaimer thread.
//!
//! One worker per list. It sweeps the domain, then sleeps for the configured
//! interval or until shutdown is requested. After shutdown it keeps sweeping
//! without sleeping until the bin is empty, so nothing staged is leaked when
//! the list goes away.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::{ReclaimDomain, SweepReport};
use crate::config::ListConfig;
use crate::error::ListError;
use crate::tracing_helpers::{debug_log, trace_log, warn_log};

/// Shutdown flag plus the condvar the worker sleeps on.
#[derive(Debug, Default)]
struct Signal {
    /// Mutex paired with the condvar (required by [`parking_lot`] API).
    stop: Mutex<bool>,
    wake: Condvar,
}

/// Owning handle of the reclaimer thread.
///
/// Dropping the handle requests shutdown and joins the thread.
#[derive(Debug)]
pub(crate) struct Reclaimer {
    signal: Arc<Signal>,
    handle: Option<JoinHandle<()>>,
}

impl Reclaimer {
    /// Spawn the worker for `domain`.
    pub(crate) fn spawn<T>(
        domain: Arc<ReclaimDomain<T>>,
        config: &ListConfig,
    ) -> Result<Self, ListError>
    where
        T: Send + Sync + 'static,
    {
        let signal: Arc<Signal> = Arc::new(Signal::default());
        let worker_signal: Arc<Signal> = Arc::clone(&signal);
        let interval: Duration = config.sweep_interval;

        let handle: JoinHandle<()> = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || run(&domain, &worker_signal, interval))
            .map_err(|err| ListError::ReclaimerSpawn(err.to_string()))?;

        debug_log!(interval_ms = interval.as_millis() as u64, "reclaimer started");

        Ok(Self {
            signal,
            handle: Some(handle),
        })
    }

    /// Wake the worker for an immediate sweep.
    #[cfg(test)]
    pub(crate) fn wake(&self) {
        self.signal.wake.notify_one();
    }

    /// Request shutdown and wait for the worker to drain and exit.
    ///
    /// Idempotent.
    pub(crate) fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        *self.signal.stop.lock() = true;
        self.signal.wake.notify_one();

        if handle.join().is_err() {
            warn_log!("reclaimer thread panicked");
        }
    }
}

impl Drop for Reclaimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Worker loop.
fn run<T>(domain: &ReclaimDomain<T>, signal: &Signal, interval: Duration) {
    loop {
        // SAFETY: this thread is the only sweeper of `domain` while it runs.
        let report: SweepReport = unsafe { domain.sweep() };

        if report.examined > 0 {
            trace_log!(
                examined = report.examined,
                reclaimed = report.reclaimed,
                withdrawn = report.withdrawn,
                deferred = report.deferred,
                "sweep finished"
            );
        }

        let mut stop = signal.stop.lock();

        if *stop {
            if domain.is_idle() {
                break;
            }
            // Draining: sweep again without sleeping.
            continue;
        }

        let _ = signal.wake.wait_for(&mut stop, interval);
    }

    debug_log!(
        sweeps = domain.stats().sweeps,
        reclaimed = domain.stats().reclaimed,
        "reclaimer drained and stopped"
    );
}

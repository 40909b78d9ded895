//! Periodic flush scheduler for Roomcast.
//!
//! A [`FlushScheduler`] owns at most one recurring timer task. Every
//! interval the task asks its [`FlushTarget`] which keys have pending work
//! and spawns one independent drain task per key, so draining many rooms
//! never happens in one unbroken stretch on a worker.
//!
//! # Failure containment
//!
//! The timer reschedules itself unconditionally:
//!
//! - a drain that returns `Err` is logged and counted;
//! - a drain that panics is contained in its task and reported when the
//!   next scan reaps it;
//! - a panicking scan is caught and logged, and the loop carries on.
//!
//! # Integration
//!
//! The target is held through a `Weak`, so the scheduler can live inside
//! the very object it flushes without a reference cycle:
//!
//! ```ignore
//! struct Adapter { scheduler: FlushScheduler, /* ... */ }
//!
//! impl FlushTarget for Adapter { /* pending() / drain() */ }
//!
//! let adapter = Arc::new(Adapter::new());
//! adapter.scheduler.start(Arc::downgrade(&adapter));
//! ```
//!
//! The loop ends on its own once the target is dropped.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the flush scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushConfig {
    /// Time between two scans.
    pub interval: Duration,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5_000),
        }
    }
}

impl FlushConfig {
    /// Smallest interval the scheduler will run with.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

    /// Create a config for a specific interval in milliseconds.
    pub fn with_interval_ms(ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(ms),
        }
    }

    /// Fix out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`FlushScheduler::new`]. A zero interval
    /// would turn the timer into a busy loop, so it is raised to
    /// [`Self::MIN_INTERVAL`].
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.interval.as_millis() as u64,
                "flush interval below minimum, clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// Something with per-key buffers that the scheduler drains.
pub trait FlushTarget: Send + Sync + 'static {
    /// Identifies one buffer (a room, for the adapter).
    type Key: Send + fmt::Display + 'static;

    /// Error reported by a failed drain.
    type Error: std::error::Error + Send + 'static;

    /// Keys whose buffers have pending work right now.
    fn pending(&self) -> Vec<Self::Key>;

    /// Drains one buffer and returns how many items were flushed.
    ///
    /// Runs later than the scan that listed `key`, so implementations
    /// must re-check that the buffer still exists.
    fn drain(&self, key: &Self::Key) -> Result<usize, Self::Error>;
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Snapshot of the scheduler's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushMetrics {
    /// Scans performed (one per elapsed interval).
    pub total_scans: u64,
    /// Drains that completed successfully.
    pub total_drains: u64,
    /// Drains that returned an error.
    pub total_failures: u64,
    /// Drain tasks or scans that panicked.
    pub total_panics: u64,
    /// Items flushed across all successful drains.
    pub total_flushed: u64,
}

#[derive(Default)]
struct Counters {
    scans: AtomicU64,
    drains: AtomicU64,
    failures: AtomicU64,
    panics: AtomicU64,
    flushed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> FlushMetrics {
        FlushMetrics {
            total_scans: self.scans.load(Ordering::Relaxed),
            total_drains: self.drains.load(Ordering::Relaxed),
            total_failures: self.failures.load(Ordering::Relaxed),
            total_panics: self.panics.load(Ordering::Relaxed),
            total_flushed: self.flushed.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Owner of the recurring flush timer.
///
/// The "is a timer already running" flag is the `task` slot itself: it is
/// filled by [`start`](Self::start) and emptied by [`stop`](Self::stop)
/// or on drop.
pub struct FlushScheduler {
    config: FlushConfig,
    task: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl FlushScheduler {
    /// Create a stopped scheduler.
    pub fn new(config: FlushConfig) -> Self {
        let config = config.validated();
        debug!(
            interval_ms = config.interval.as_millis() as u64,
            "flush scheduler created"
        );
        Self {
            config,
            task: Mutex::new(None),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Start the timer for `target` unless one is already running.
    ///
    /// Returns `true` if a new timer was spawned. Outside a Tokio runtime
    /// nothing is spawned and `false` is returned; the caller may try
    /// again later.
    pub fn start<T: FlushTarget>(&self, target: Weak<T>) -> bool {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("no Tokio runtime, flush scheduler not started");
                return false;
            }
        };

        let interval = self.config.interval;
        let counters = Arc::clone(&self.counters);
        *task = Some(runtime.spawn(run(target, interval, counters)));
        info!(
            interval_ms = interval.as_millis() as u64,
            "flush scheduler started"
        );
        true
    }

    /// Stop the timer. Drain tasks already spawned run to completion.
    ///
    /// Returns `true` if a running timer was stopped. Idempotent.
    pub fn stop(&self) -> bool {
        match self.task.lock().take() {
            Some(handle) => {
                let was_running = !handle.is_finished();
                handle.abort();
                if was_running {
                    info!("flush scheduler stopped");
                }
                was_running
            }
            None => false,
        }
    }

    /// Whether a timer task is currently alive.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// The configured scan interval.
    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    /// Snapshot of current metrics.
    pub fn metrics(&self) -> FlushMetrics {
        self.counters.snapshot()
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

/// The timer loop: sleep, reap finished drains, scan, spawn drains.
async fn run<T: FlushTarget>(
    target: Weak<T>,
    interval: Duration,
    counters: Arc<Counters>,
) {
    let mut drains: Vec<JoinHandle<()>> = Vec::new();

    loop {
        time::sleep(interval).await;
        drains = reap(drains, &counters).await;

        let Some(target) = target.upgrade() else {
            debug!("flush target dropped, scheduler exiting");
            break;
        };

        counters.scans.fetch_add(1, Ordering::Relaxed);
        let keys = match panic::catch_unwind(AssertUnwindSafe(|| target.pending())) {
            Ok(keys) => keys,
            Err(_) => {
                counters.panics.fetch_add(1, Ordering::Relaxed);
                error!("flush scan panicked, retrying next interval");
                continue;
            }
        };
        trace!(pending = keys.len(), "flush scan");

        for key in keys {
            let target = Arc::clone(&target);
            let counters = Arc::clone(&counters);
            drains.push(tokio::spawn(async move {
                match target.drain(&key) {
                    Ok(flushed) => {
                        counters.drains.fetch_add(1, Ordering::Relaxed);
                        counters.flushed.fetch_add(flushed as u64, Ordering::Relaxed);
                        debug!(%key, flushed, "buffer drained");
                    }
                    Err(e) => {
                        counters.failures.fetch_add(1, Ordering::Relaxed);
                        warn!(%key, error = %e, "drain failed");
                    }
                }
            }));
        }
    }
}

/// Collects finished drain tasks, reporting panics. Unfinished tasks are
/// returned untouched.
async fn reap(
    drains: Vec<JoinHandle<()>>,
    counters: &Counters,
) -> Vec<JoinHandle<()>> {
    let (finished, running): (Vec<_>, Vec<_>) =
        drains.into_iter().partition(|handle| handle.is_finished());

    for handle in finished {
        if let Err(e) = handle.await {
            if e.is_panic() {
                counters.panics.fetch_add(1, Ordering::Relaxed);
                error!("drain task panicked");
            }
        }
    }

    running
}

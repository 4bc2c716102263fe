//! Worker pool sizing, batching, and progress aggregation.

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::Result;

/// Processed items between opportunistic progress reports
const REPORT_EVERY: usize = 100;

/// `min(2 x available_parallelism, 16)`, at least 1
pub fn default_workers() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    (cpus * 2).clamp(1, 16)
}

/// Split `0..len` into contiguous ranges of `batch_size` (last may be shorter).
pub fn batch_ranges(len: usize, batch_size: usize) -> Vec<Range<usize>> {
    let batch_size = batch_size.max(1);
    (0..len)
        .step_by(batch_size)
        .map(|start| start..(start + batch_size).min(len))
        .collect()
}

/// Thread pool with exactly `workers` threads
pub(crate) fn build_pool(workers: usize) -> Result<rayon::ThreadPool> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("shredder-worker-{}", i))
        .build()?;
    Ok(pool)
}

/// Percent-complete reporter shared by all workers of one run.
///
/// Workers bump an atomic counter; the callback only ever sees values
/// above the last one it received.
pub(crate) struct Progress<'a> {
    callback: &'a (dyn Fn(f64) + Sync),
    total: AtomicUsize,
    done: AtomicUsize,
    reported: Mutex<f64>,
}

impl<'a> Progress<'a> {
    pub fn new(callback: &'a (dyn Fn(f64) + Sync)) -> Self {
        Self {
            callback,
            total: AtomicUsize::new(0),
            done: AtomicUsize::new(0),
            reported: Mutex::new(0.0),
        }
    }

    /// Set the unit count that maps to 100%.
    pub fn start(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
    }

    /// Count `n` finished units, reporting whenever a multiple of
    /// [`REPORT_EVERY`] is crossed.
    pub fn advance(&self, n: usize) {
        let before = self.done.fetch_add(n, Ordering::Relaxed);
        let after = before + n;
        if after / REPORT_EVERY != before / REPORT_EVERY {
            self.report_done(after);
        }
    }

    /// Report the current count regardless of the reporting interval.
    pub fn flush(&self) {
        self.report_done(self.done.load(Ordering::Relaxed));
    }

    pub fn finish(&self) {
        self.report(100.0);
    }

    fn report_done(&self, done: usize) {
        let total = self.total.load(Ordering::Relaxed);
        if total > 0 {
            self.report(done.min(total) as f64 * 100.0 / total as f64);
        }
    }

    fn report(&self, percent: f64) {
        let mut last = self.reported.lock();
        if percent > *last {
            *last = percent;
            (self.callback)(percent);
        }
    }
}

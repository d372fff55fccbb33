//! Row and progress counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// What a [`RowCounter`] counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    /// Rows of a main table.
    Rows,
    /// Rows of an auxiliary blob table.
    Blobs,
}

/// Running totals shared by every task of a load phase.
#[derive(Debug)]
pub struct ProgressCounter {
    rows_ok: AtomicU64,
    rows_failed: AtomicU64,
    blobs_ok: AtomicU64,
    blobs_failed: AtomicU64,
    start_time: Instant,
}

/// Point-in-time copy of a [`ProgressCounter`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub rows_ok: u64,
    pub rows_failed: u64,
    pub blobs_ok: u64,
    pub blobs_failed: u64,
    pub elapsed_secs: f64,
}

impl Default for ProgressCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCounter {
    pub fn new() -> Self {
        Self {
            rows_ok: AtomicU64::new(0),
            rows_failed: AtomicU64::new(0),
            blobs_ok: AtomicU64::new(0),
            blobs_failed: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    fn record(&self, kind: CounterKind, success: u64, failed: u64) {
        let (ok, bad) = match kind {
            CounterKind::Rows => (&self.rows_ok, &self.rows_failed),
            CounterKind::Blobs => (&self.blobs_ok, &self.blobs_failed),
        };
        if success > 0 {
            ok.fetch_add(success, Ordering::Relaxed);
        }
        if failed > 0 {
            bad.fetch_add(failed, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            rows_ok: self.rows_ok.load(Ordering::Relaxed),
            rows_failed: self.rows_failed.load(Ordering::Relaxed),
            blobs_ok: self.blobs_ok.load(Ordering::Relaxed),
            blobs_failed: self.blobs_failed.load(Ordering::Relaxed),
            elapsed_secs: self.start_time.elapsed().as_secs_f64(),
        }
    }

    /// Rows per second since creation.
    pub fn rows_per_second(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.rows_ok.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn log_totals(&self) {
        let s = self.snapshot();
        info!(
            "Progress: {} rows written ({} failed), {} blobs written ({} failed), {:.0} rows/sec",
            s.rows_ok,
            s.rows_failed,
            s.blobs_ok,
            s.blobs_failed,
            self.rows_per_second()
        );
    }

    /// Log running totals every `interval` until `stop` is cancelled.
    pub fn spawn_reporter(
        self: &Arc<Self>,
        interval: Duration,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        let progress = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => progress.log_totals(),
                }
            }
        })
    }
}

/// Per-table write counter feeding the shared [`ProgressCounter`].
#[derive(Debug)]
pub struct RowCounter {
    name: String,
    kind: CounterKind,
    success: AtomicU64,
    failed: AtomicU64,
    progress: Arc<ProgressCounter>,
}

impl RowCounter {
    pub fn new(name: impl Into<String>, kind: CounterKind, progress: Arc<ProgressCounter>) -> Self {
        Self {
            name: name.into(),
            kind,
            success: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            progress,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_success(&self, rows: u64) {
        self.success.fetch_add(rows, Ordering::Relaxed);
        self.progress.record(self.kind, rows, 0);
    }

    pub fn add_failed(&self, rows: u64) {
        self.failed.fetch_add(rows, Ordering::Relaxed);
        self.progress.record(self.kind, 0, rows);
    }

    pub fn success(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

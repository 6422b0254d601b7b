//! Lifecycle metrics tracking
//!
//! Thread-safe counters for evaluation cycles and transition outcomes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::store::FailureKind;

/// Thread-safe metrics for tracking lifecycle cycles
#[derive(Debug, Clone)]
pub struct LifecycleMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    cycles_started: AtomicUsize,
    cycles_completed: AtomicUsize,
    cycles_failed: AtomicUsize,
    objects_scanned: AtomicUsize,
    transitions_planned: AtomicUsize,
    transitions_applied: AtomicUsize,
    transitions_skipped: AtomicUsize,
    failed_unavailable: AtomicUsize,
    failed_not_found: AtomicUsize,
    failed_permission: AtomicUsize,
    total_duration_ms: AtomicU64,
}

impl Default for LifecycleMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub fn record_cycle_start(&self) {
        self.inner.cycles_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cycle that ran to completion
    pub fn record_cycle_complete(&self, duration: Duration) {
        self.inner.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.inner
            .total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Record a cycle aborted before execution (e.g. listing failed)
    pub fn record_cycle_failure(&self) {
        self.inner.cycles_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_objects_scanned(&self, count: usize) {
        self.inner
            .objects_scanned
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_transitions_planned(&self, count: usize) {
        self.inner
            .transitions_planned
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_applied(&self) {
        self.inner
            .transitions_applied
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.inner
            .transitions_skipped
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, kind: FailureKind) {
        let counter = match kind {
            FailureKind::StoreUnavailable => &self.inner.failed_unavailable,
            FailureKind::ObjectNotFound => &self.inner.failed_not_found,
            FailureKind::PermissionDenied => &self.inner.failed_permission,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cycles_started(&self) -> usize {
        self.inner.cycles_started.load(Ordering::Relaxed)
    }

    pub fn cycles_completed(&self) -> usize {
        self.inner.cycles_completed.load(Ordering::Relaxed)
    }

    pub fn cycles_failed(&self) -> usize {
        self.inner.cycles_failed.load(Ordering::Relaxed)
    }

    pub fn objects_scanned(&self) -> usize {
        self.inner.objects_scanned.load(Ordering::Relaxed)
    }

    pub fn transitions_planned(&self) -> usize {
        self.inner.transitions_planned.load(Ordering::Relaxed)
    }

    pub fn transitions_applied(&self) -> usize {
        self.inner.transitions_applied.load(Ordering::Relaxed)
    }

    pub fn transitions_skipped(&self) -> usize {
        self.inner.transitions_skipped.load(Ordering::Relaxed)
    }

    pub fn failures(&self, kind: FailureKind) -> usize {
        match kind {
            FailureKind::StoreUnavailable => self.inner.failed_unavailable.load(Ordering::Relaxed),
            FailureKind::ObjectNotFound => self.inner.failed_not_found.load(Ordering::Relaxed),
            FailureKind::PermissionDenied => self.inner.failed_permission.load(Ordering::Relaxed),
        }
    }

    pub fn transitions_failed(&self) -> usize {
        self.failures(FailureKind::StoreUnavailable)
            + self.failures(FailureKind::ObjectNotFound)
            + self.failures(FailureKind::PermissionDenied)
    }

    /// Calculate the average duration of completed cycles
    pub fn avg_cycle_duration_ms(&self) -> f64 {
        let total_ms = self.inner.total_duration_ms.load(Ordering::Relaxed) as f64;
        let cycles = self.cycles_completed() as f64;
        if cycles > 0.0 { total_ms / cycles } else { 0.0 }
    }

    /// Log lifetime totals
    pub fn log(&self) {
        tracing::info!(
            cycles_started = self.cycles_started(),
            cycles_completed = self.cycles_completed(),
            cycles_failed = self.cycles_failed(),
            objects_scanned = self.objects_scanned(),
            transitions_planned = self.transitions_planned(),
            transitions_applied = self.transitions_applied(),
            transitions_skipped = self.transitions_skipped(),
            transitions_failed = self.transitions_failed(),
            avg_cycle_duration_ms = self.avg_cycle_duration_ms(),
            "Lifecycle totals"
        );
    }
}

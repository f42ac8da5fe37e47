//! Consumer metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Metrics for a single consumer
#[derive(Debug, Default)]
pub struct ConsumerMetrics {
    /// Images waiting in the backlog
    backlog_len: AtomicUsize,
    /// Images accepted
    inserted_count: AtomicU64,
    /// Images refused because the backlog was full
    overflow_count: AtomicU64,
    /// Images refused for any other reason
    rejected_count: AtomicU64,
    /// Images dropped by `clear_backlog`
    cleared_count: AtomicU64,
}

impl ConsumerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog_len.load(Ordering::Relaxed)
    }

    pub fn set_backlog_len(&self, len: usize) {
        self.backlog_len.store(len, Ordering::Relaxed);
    }

    pub fn inserted_count(&self) -> u64 {
        self.inserted_count.load(Ordering::Relaxed)
    }

    pub fn inc_inserted_count(&self) {
        self.inserted_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow_count.load(Ordering::Relaxed)
    }

    pub fn inc_overflow_count(&self) {
        self.overflow_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected_count.load(Ordering::Relaxed)
    }

    pub fn inc_rejected_count(&self) {
        self.rejected_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cleared_count(&self) -> u64 {
        self.cleared_count.load(Ordering::Relaxed)
    }

    pub fn add_cleared_count(&self, count: u64) {
        self.cleared_count.fetch_add(count, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            backlog_len: self.backlog_len(),
            inserted_count: self.inserted_count(),
            overflow_count: self.overflow_count(),
            rejected_count: self.rejected_count(),
            cleared_count: self.cleared_count(),
        }
    }
}

/// Snapshot of consumer metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub backlog_len: usize,
    pub inserted_count: u64,
    pub overflow_count: u64,
    pub rejected_count: u64,
    pub cleared_count: u64,
}

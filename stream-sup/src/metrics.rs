//! Per-consumer delivery counters.
//!
//! Each consumer owns one [`ConsumerMetrics`]. The delivery callback is the
//! only writer; the rate reporter reads without locking. The two counters are
//! read independently, so a snapshot may be momentarily skewed between them.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ConsumerMetrics {
    consumed: AtomicU64,
    total_entries: AtomicU64,
}

/// Point-in-time copy of one or more [`ConsumerMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub consumed: u64,
    pub total_entries: u64,
}

impl ConsumerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_consumed(&self) {
        self.consumed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_entries(&self, n: u64) {
        self.total_entries.fetch_add(n, Ordering::Relaxed);
    }

    /// Account for one delivery carrying `entries` batch entries.
    pub fn record_delivery(&self, entries: u64) {
        self.increment_consumed();
        self.increment_entries(entries);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            consumed: self.consumed.load(Ordering::Relaxed),
            total_entries: self.total_entries.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Sum snapshots across consumers. An empty iterator yields zero totals.
    pub fn sum<I>(snapshots: I) -> Self
    where
        I: IntoIterator<Item = MetricsSnapshot>,
    {
        snapshots
            .into_iter()
            .fold(MetricsSnapshot::default(), |acc, s| MetricsSnapshot {
                consumed: acc.consumed + s.consumed,
                total_entries: acc.total_entries + s.total_entries,
            })
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Aggregate pipeline counters, safe under concurrent increment from
/// multiple workers.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    jobs_created: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_cancelled: AtomicU64,
    records_processed: AtomicU64,
    records_failed: AtomicU64,
    batch_latency_micros: AtomicU64,
    batches_observed: AtomicU64,
}

impl PipelineMetrics {
    pub fn job_created(&self) {
        self.jobs_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_cancelled(&self) {
        self.jobs_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch(&self, latency: Duration, processed: u64, failed: u64) {
        self.records_processed.fetch_add(processed, Ordering::Relaxed);
        self.records_failed.fetch_add(failed, Ordering::Relaxed);
        self.batch_latency_micros
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        self.batches_observed.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time snapshot. Individual counters are read atomically; the
    /// snapshot as a whole is advisory, not a transaction.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let batches = self.batches_observed.load(Ordering::Relaxed);
        let latency_micros = self.batch_latency_micros.load(Ordering::Relaxed);
        MetricsSnapshot {
            jobs_created: self.jobs_created.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_cancelled: self.jobs_cancelled.load(Ordering::Relaxed),
            records_processed: self.records_processed.load(Ordering::Relaxed),
            records_failed: self.records_failed.load(Ordering::Relaxed),
            avg_batch_latency_micros: if batches == 0 {
                0
            } else {
                latency_micros / batches
            },
        }
    }
}

/// Point-in-time view of the aggregate counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub jobs_created: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_cancelled: u64,
    pub records_processed: u64,
    pub records_failed: u64,
    pub avg_batch_latency_micros: u64,
}

impl MetricsSnapshot {
    pub fn avg_batch_latency(&self) -> Duration {
        Duration::from_micros(self.avg_batch_latency_micros)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let metrics = PipelineMetrics::default();
        metrics.job_created();
        metrics.job_completed();
        metrics.record_batch(Duration::from_millis(10), 100, 3);
        metrics.record_batch(Duration::from_millis(30), 50, 0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_created, 1);
        assert_eq!(snapshot.jobs_completed, 1);
        assert_eq!(snapshot.records_processed, 150);
        assert_eq!(snapshot.records_failed, 3);
        assert_eq!(snapshot.avg_batch_latency(), Duration::from_millis(20));
    }
}

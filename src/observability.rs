use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{info, warn};

/// Ledger interaction counters
#[derive(Debug, Default)]
pub struct LedgerMetrics {
    pub submissions: AtomicU64,
    pub rejections: AtomicU64,
    pub invalid_operations: AtomicU64,
    pub confirmations: AtomicU64,
    pub confirmation_failures: AtomicU64,
    pub duplicate_events: AtomicU64,
}

impl LedgerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submission(&self) {
        self.submissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid_operation(&self) {
        self.invalid_operations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_confirmation(&self) {
        self.confirmations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_confirmation_failure(&self) {
        self.confirmation_failures.fetch_add(1, Ordering::Relaxed);
        warn!("Ledger transaction reverted");
    }

    pub fn record_duplicate_event(&self) {
        self.duplicate_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> LedgerStats {
        LedgerStats {
            submissions: self.submissions.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            invalid_operations: self.invalid_operations.load(Ordering::Relaxed),
            confirmations: self.confirmations.load(Ordering::Relaxed),
            confirmation_failures: self.confirmation_failures.load(Ordering::Relaxed),
            duplicate_events: self.duplicate_events.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Ledger metrics: submissions={}, rejections={}, invalid={}, confirmations={}, reverted={}, duplicate_events={}",
            stats.submissions,
            stats.rejections,
            stats.invalid_operations,
            stats.confirmations,
            stats.confirmation_failures,
            stats.duplicate_events
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerStats {
    pub submissions: u64,
    pub rejections: u64,
    pub invalid_operations: u64,
    pub confirmations: u64,
    pub confirmation_failures: u64,
    pub duplicate_events: u64,
}

/// Global metrics instance
static LEDGER_METRICS: std::sync::LazyLock<LedgerMetrics> =
    std::sync::LazyLock::new(LedgerMetrics::new);

pub fn ledger_metrics() -> &'static LedgerMetrics {
    &LEDGER_METRICS
}

/// Time an operation and log its duration when finished
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}

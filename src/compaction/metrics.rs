//! Trigger observability counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters tracking trigger activity.
///
/// Counters are monotonically increasing and cheap to record; read them via
/// [`snapshot`](TriggerMetrics::snapshot).
#[derive(Debug, Default)]
pub struct TriggerMetrics {
    ticks: AtomicU64,
    signals_handled: AtomicU64,
    signals_dropped_queue_full: AtomicU64,
    plans_submitted: AtomicU64,
    plans_skipped_executor_full: AtomicU64,
    plan_fill_failures: AtomicU64,
    submit_failures: AtomicU64,
}

impl TriggerMetrics {
    pub(crate) fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_signal_handled(&self) {
        self.signals_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_signal_dropped(&self) {
        self.signals_dropped_queue_full.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_plan_submitted(&self) {
        self.plans_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_plan_skipped_executor_full(&self) {
        self.plans_skipped_executor_full
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_plan_fill_failure(&self) {
        self.plan_fill_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_submit_failure(&self) {
        self.submit_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent-enough copy of all counters.
    pub fn snapshot(&self) -> TriggerMetricsSnapshot {
        TriggerMetricsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            signals_handled: self.signals_handled.load(Ordering::Relaxed),
            signals_dropped_queue_full: self.signals_dropped_queue_full.load(Ordering::Relaxed),
            plans_submitted: self.plans_submitted.load(Ordering::Relaxed),
            plans_skipped_executor_full: self
                .plans_skipped_executor_full
                .load(Ordering::Relaxed),
            plan_fill_failures: self.plan_fill_failures.load(Ordering::Relaxed),
            submit_failures: self.submit_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the trigger counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerMetricsSnapshot {
    /// Periodic ticks observed.
    pub ticks: u64,
    /// Signals consumed from the queue.
    pub signals_handled: u64,
    /// Non-blocking signals dropped because the queue was full.
    pub signals_dropped_queue_full: u64,
    /// Plans accepted by the executor.
    pub plans_submitted: u64,
    /// Plans skipped because the executor reported full.
    pub plans_skipped_executor_full: u64,
    /// Plans dropped because id allocation failed.
    pub plan_fill_failures: u64,
    /// Plans rejected by the executor.
    pub submit_failures: u64,
}

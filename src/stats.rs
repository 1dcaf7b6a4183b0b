//     ______   __  __     __         ______     ______
//    /\  == \ /\ \/\ \   /\ \       /\  ___\   /\  ___\
//    \ \  _-/ \ \ \_\ \  \ \ \____  \ \___  \  \ \  __\
//     \ \_\    \ \_____\  \ \_____\  \/\_____\  \ \_____\
//      \/_/     \/_____/   \/_____/   \/_____/   \/_____/
//
// Author: Colin MacRitchie / Ripple Group
//! Statistics collection and per-tick reporting.
//!
//! Two layers, following the same split as the rest of the crate's
//! observability: cheap atomic counters that are always maintained and can be
//! sampled with [`SchedulerStats::snapshot`], and a per-tick per-category
//! table ([`TickSnapshot`]) whose emission to the diagnostic sinks is
//! compiled in only with the `tracing` / `metrics` features.

#![forbid(unsafe_code)]

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::info;

/// Cumulative scheduler counters.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    /// Tasks accepted by the submission gate.
    pub submitted: AtomicU64,

    /// Tasks dispatched from immediate chains (phase 1).
    pub dispatched_immediate: AtomicU64,

    /// Deferred tasks dispatched under category budgets (phase 2).
    pub dispatched_base: AtomicU64,

    /// Deferred tasks dispatched by the bonus pass (phase 3).
    pub dispatched_bonus: AtomicU64,

    /// Tasks dropped by the frame-age rule.
    pub skipped: AtomicU64,

    /// Tasks removed by deferred cancellation.
    pub cancelled: AtomicU64,

    /// Completed ticks.
    pub ticks: AtomicU64,
}

impl SchedulerStats {
    /// Creates a zeroed counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an accepted submission.
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        metrics::counter!("frame_pulse_submitted_total").increment(1);
    }

    /// Records immediate dispatches.
    pub fn record_immediate(&self, count: u64) {
        self.dispatched_immediate.fetch_add(count, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        metrics::counter!("frame_pulse_dispatched_total", "phase" => "immediate").increment(count);
    }

    /// Records budgeted deferred dispatches.
    pub fn record_base(&self, count: u64) {
        self.dispatched_base.fetch_add(count, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        metrics::counter!("frame_pulse_dispatched_total", "phase" => "base").increment(count);
    }

    /// Records bonus-pass dispatches.
    pub fn record_bonus(&self, count: u64) {
        self.dispatched_bonus.fetch_add(count, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        metrics::counter!("frame_pulse_dispatched_total", "phase" => "bonus").increment(count);
    }

    /// Records aged-out drops.
    pub fn record_skipped(&self, count: u64) {
        self.skipped.fetch_add(count, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        metrics::counter!("frame_pulse_skipped_total").increment(count);
    }

    /// Records deferred cancellations that removed a record.
    pub fn record_cancelled(&self, count: u64) {
        self.cancelled.fetch_add(count, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        metrics::counter!("frame_pulse_cancelled_total").increment(count);
    }

    /// Records a completed tick.
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        metrics::counter!("frame_pulse_ticks_total").increment(1);
    }

    /// Point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            dispatched_immediate: self.dispatched_immediate.load(Ordering::Relaxed),
            dispatched_base: self.dispatched_base.load(Ordering::Relaxed),
            dispatched_bonus: self.dispatched_bonus.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of [`SchedulerStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Tasks accepted by the submission gate.
    pub submitted: u64,
    /// Immediate dispatches.
    pub dispatched_immediate: u64,
    /// Budgeted deferred dispatches.
    pub dispatched_base: u64,
    /// Bonus-pass dispatches.
    pub dispatched_bonus: u64,
    /// Aged-out drops.
    pub skipped: u64,
    /// Deferred cancellations applied.
    pub cancelled: u64,
    /// Completed ticks.
    pub ticks: u64,
}

impl StatsSnapshot {
    /// Total tasks dispatched across all phases.
    #[must_use]
    pub const fn dispatched_total(&self) -> u64 {
        self.dispatched_immediate + self.dispatched_base + self.dispatched_bonus
    }
}

/// One category's row of a tick report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CategoryTickStats {
    /// Tasks dispatched within the category budget (phases 1 and 2).
    pub done_base: u32,
    /// Tasks dispatched by the bonus pass (phase 3).
    pub done_bonus: u32,
    /// Tasks dropped by the frame-age rule this tick.
    pub skipped: u32,
    /// Tasks still queued at the end of the tick.
    pub pending: u32,
    /// Local budget left over after phase 2.
    pub remaining_budget: Duration,
}

/// Per-category report for one completed tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickSnapshot {
    /// Frame counter value during the tick.
    pub frame: u32,
    /// One row per category, in category order.
    pub categories: Vec<CategoryTickStats>,
}

impl TickSnapshot {
    /// Tasks dispatched this tick, all categories and phases.
    #[must_use]
    pub fn dispatched(&self) -> u64 {
        self.categories
            .iter()
            .map(|c| u64::from(c.done_base) + u64::from(c.done_bonus))
            .sum()
    }

    /// Tasks left pending this tick, all categories.
    #[must_use]
    pub fn pending(&self) -> u64 {
        self.categories.iter().map(|c| u64::from(c.pending)).sum()
    }

    /// Emits the report to the configured sinks. Compiles to a no-op when
    /// neither the `tracing` nor the `metrics` feature is enabled.
    pub fn emit(&self) {
        #[cfg(feature = "tracing")]
        info!(frame = self.frame, report = %self, "tick complete");

        #[cfg(feature = "metrics")]
        for (category, row) in self.categories.iter().enumerate() {
            let label = category.to_string();
            metrics::gauge!("frame_pulse_pending", "category" => label.clone())
                .set(f64::from(row.pending));
            metrics::gauge!("frame_pulse_remaining_budget_us", "category" => label)
                .set(row.remaining_budget.as_micros() as f64);
        }
    }
}

impl fmt::Display for TickSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "frame {:>6} | cat | base | bonus | skip | pend | left_us", self.frame)?;
        for (category, row) in self.categories.iter().enumerate() {
            writeln!(
                f,
                "             | {:>3} | {:>4} | {:>5} | {:>4} | {:>4} | {:>7}",
                category,
                row.done_base,
                row.done_bonus,
                row.skipped,
                row.pending,
                row.remaining_budget.as_micros(),
            )?;
        }
        Ok(())
    }
}

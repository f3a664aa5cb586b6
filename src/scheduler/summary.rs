//! Per-cycle summary accumulation.
//!
//! Grounded on `crawl_events::metrics::EventBusMetrics`'s running-counters
//! then `snapshot()` shape, adapted from atomics (the teacher's bus is
//! shared across tasks) to plain fields (one accumulator lives behind the
//! single-cycle dispatch mutex — see `scheduler::pool`).
//!
//! Page identifiers are represented as `u64` across every pagination kind
//! (page number for `TotalPages`/`HasMore`/`Cursor`/`None`, index for
//! `List`), which keeps [`CycleSummary`] — and therefore [`crate::events::Event`] —
//! free of a generic parameter for the driver's payload type.

use std::time::Instant;

/// Which bucket a page timing sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingKind {
    All,
    Successful,
    Failed,
}

#[derive(Debug, Clone, Copy, Default)]
struct AvgAccumulator {
    sum_ms: u64,
    count: u64,
}

impl AvgAccumulator {
    fn add(&mut self, ms: u64) {
        self.sum_ms += ms;
        self.count += 1;
    }

    fn average(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.sum_ms / self.count
        }
    }
}

/// Timing breakdown for a finished cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub started_at_ms: u128,
    pub total_ms: u64,
    pub avg_all_ms: u64,
    pub avg_successful_ms: u64,
    pub avg_failed_ms: u64,
}

/// Immutable result of one cycle. Deeply immutable by construction: every
/// field is a plain value with no interior mutability, so a clone can be
/// handed to `summary_handler` and the event bus without risk of a caller
/// observing a mutation.
#[derive(Debug, Clone)]
pub struct CycleSummary {
    pub completed: bool,
    pub total_page_count: u64,
    pub failed_page_list: Vec<u64>,
    pub total_error_count: u64,
    pub timings: Timings,
}

/// Accumulates running totals across one cycle; `summarize` finalizes them
/// into a [`CycleSummary`].
pub struct SummaryAccumulator {
    wall_start: Instant,
    started_at_ms: u128,
    total_ms: Option<u64>,
    total_page_count: u64,
    failed_pages: Vec<u64>,
    total_error_count: u64,
    all: AvgAccumulator,
    successful: AvgAccumulator,
    failed: AvgAccumulator,
}

impl SummaryAccumulator {
    #[must_use]
    pub fn new(epoch: Instant, started_at_ms: u128) -> Self {
        Self {
            wall_start: epoch,
            started_at_ms,
            total_ms: None,
            total_page_count: 0,
            failed_pages: Vec::new(),
            total_error_count: 0,
            all: AvgAccumulator::default(),
            successful: AvgAccumulator::default(),
            failed: AvgAccumulator::default(),
        }
    }

    pub fn record_page(&mut self) {
        self.total_page_count += 1;
    }

    pub fn set_total_page_count(&mut self, n: u64) {
        self.total_page_count = n;
    }

    pub fn record_error(&mut self) {
        self.total_error_count += 1;
    }

    pub fn add_avg_timing(&mut self, kind: TimingKind, ms: u64) {
        self.all.add(ms);
        match kind {
            TimingKind::All => {}
            TimingKind::Successful => self.successful.add(ms),
            TimingKind::Failed => self.failed.add(ms),
        }
    }

    /// Record a page as failed. No-ops if `page` is already present, since
    /// `failed_page_list` is a set (§3 invariant).
    pub fn push_failed_page(&mut self, page: u64) {
        if !self.failed_pages.contains(&page) {
            self.failed_pages.push(page);
        }
    }

    #[must_use]
    pub fn failed_page_count(&self) -> usize {
        self.failed_pages.len()
    }

    #[must_use]
    pub fn failed_pages(&self) -> &[u64] {
        &self.failed_pages
    }

    /// Finalize `total_ms` if not already set. Idempotent: a driver or the
    /// cycle loop may call this before `summarize` without double-counting.
    pub fn finish_timing(&mut self) {
        if self.total_ms.is_none() {
            self.total_ms = Some(self.wall_start.elapsed().as_millis() as u64);
        }
    }

    /// Produce the immutable snapshot, sorting `failed_page_list` for a
    /// deterministic, natural-ordering presentation (§3).
    #[must_use]
    pub fn summarize(mut self, completed: bool) -> CycleSummary {
        self.finish_timing();
        self.failed_pages.sort_unstable();
        CycleSummary {
            completed,
            total_page_count: self.total_page_count,
            failed_page_list: self.failed_pages,
            total_error_count: self.total_error_count,
            timings: Timings {
                started_at_ms: self.started_at_ms,
                total_ms: self.total_ms.unwrap_or(0),
                avg_all_ms: self.all.average(),
                avg_successful_ms: self.successful.average(),
                avg_failed_ms: self.failed.average(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_samples_report_zero_average() {
        let acc = SummaryAccumulator::new(Instant::now(), 0);
        let summary = acc.summarize(true);
        assert_eq!(summary.timings.avg_all_ms, 0);
        assert_eq!(summary.timings.avg_successful_ms, 0);
        assert_eq!(summary.timings.avg_failed_ms, 0);
    }

    #[test]
    fn averages_are_arithmetic_means() {
        let mut acc = SummaryAccumulator::new(Instant::now(), 0);
        acc.add_avg_timing(TimingKind::Successful, 10);
        acc.add_avg_timing(TimingKind::Successful, 20);
        acc.add_avg_timing(TimingKind::Failed, 100);
        let summary = acc.summarize(true);
        assert_eq!(summary.timings.avg_successful_ms, 15);
        assert_eq!(summary.timings.avg_failed_ms, 100);
        assert_eq!(summary.timings.avg_all_ms, (10 + 20 + 100) / 3);
    }

    #[test]
    fn failed_page_list_is_deduplicated_and_sorted() {
        let mut acc = SummaryAccumulator::new(Instant::now(), 0);
        acc.push_failed_page(3);
        acc.push_failed_page(1);
        acc.push_failed_page(3);
        let summary = acc.summarize(false);
        assert_eq!(summary.failed_page_list, vec![1, 3]);
    }
}

//! Per-cycle failure-timeline bookkeeping.
//!
//! Grounded on `crawl_engine::circuit_breaker::DomainHealth`'s
//! consecutive/total failure counters, adapted from a per-domain, cross-cycle
//! health tracker to a per-cycle budget check: instead of opening/closing a
//! circuit, `fail()` and `complete()` answer "has this cycle blown its
//! failure budget" against `max_total_page_fails` /
//! `max_consecutive_page_fails`.

/// A single entry in the failure timeline. `Separator` marks a success,
/// matching §4.3's "inserts a separator sentinel between fail runs" — kept
/// distinct from a `Fail` entry so the timeline can be inspected for runs of
/// consecutive failures without ambiguity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimelineEntry {
    Fail(Option<u64>),
    Separator,
}

/// Tracks whether the active cycle may still skip (i.e. give up on) another
/// page without exceeding the configured failure budget.
pub struct FailCounter {
    timeline: Vec<TimelineEntry>,
    total_page_fails: u64,
    consecutive_page_fails: u64,
    skip_page_if_possible: bool,
    max_total_page_fails: u64,
    max_consecutive_page_fails: u64,
}

impl FailCounter {
    #[must_use]
    pub fn new(
        skip_page_if_possible: bool,
        max_total_page_fails: u64,
        max_consecutive_page_fails: u64,
    ) -> Self {
        Self {
            timeline: Vec::new(),
            total_page_fails: 0,
            consecutive_page_fails: 0,
            skip_page_if_possible,
            max_total_page_fails,
            max_consecutive_page_fails,
        }
    }

    /// Record a page succeeding. Resets the consecutive-failure run and
    /// places a separator if the timeline currently ends on a failure.
    pub fn success(&mut self) {
        self.consecutive_page_fails = 0;
        if matches!(self.timeline.last(), Some(TimelineEntry::Fail(_))) {
            self.timeline.push(TimelineEntry::Separator);
        }
    }

    /// Record a page exhausting its retries. Returns whether the cycle
    /// *cannot* skip any more pages (i.e. the budget is now exceeded).
    pub fn fail(&mut self, page: Option<u64>) -> bool {
        self.timeline.push(TimelineEntry::Fail(page));
        self.total_page_fails += 1;
        self.consecutive_page_fails += 1;
        !self.within_budget()
    }

    /// Recompute totals restricted to pages `<= last_page` (when given), so
    /// overshoot pages beyond the discovered final page don't count against
    /// the budget, then re-apply the budget check. Returns whether the
    /// completed cycle still counts as `completed`.
    pub fn complete(&mut self, last_page: Option<u64>) -> bool {
        if let Some(last_page) = last_page {
            self.recompute_restricted_to(last_page);
        }
        self.within_budget()
    }

    fn recompute_restricted_to(&mut self, last_page: u64) {
        let mut total = 0u64;
        let mut consecutive = 0u64;
        let mut max_consecutive = 0u64;
        for entry in &self.timeline {
            match entry {
                TimelineEntry::Fail(Some(p)) if *p > last_page => {
                    // Overshoot: does not count, but also does not break a run.
                }
                TimelineEntry::Fail(_) => {
                    total += 1;
                    consecutive += 1;
                    max_consecutive = max_consecutive.max(consecutive);
                }
                TimelineEntry::Separator => consecutive = 0,
            }
        }
        self.total_page_fails = total;
        self.consecutive_page_fails = max_consecutive;
    }

    fn within_budget(&self) -> bool {
        if self.total_page_fails == 0 {
            return true;
        }
        self.skip_page_if_possible
            && self.total_page_fails <= self.max_total_page_fails
            && self.consecutive_page_fails <= self.max_consecutive_page_fails
    }
}

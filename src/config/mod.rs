//! Options validation and defaulting (§4.4 Options Validator).
//!
//! Grounded on `config::builder`'s typestate builder, generalized from
//! compile-time-required fields to a defaulting-plus-warning validator: a raw
//! [`RawOptions`] (whatever the caller supplies, with everything but the
//! pagination config and fetch handler optional) is validated into an
//! immutable [`Options`] record, with a [`ValidationWarning`] emitted per
//! rejected field instead of a hard error.

use crate::callbacks::{
    InitFlowContext, InitThisContext, ResponseHandler, SummaryHandler,
};
use crate::events::{Event, EventBus, LoggerPolicy};
use crate::pagination::PaginationConfig;
use crate::scheduler::interval::IntervalValue;

/// `Dynamic` measures elapsed time since a worker's last execution and waits
/// only the remainder of the interval; `Fixed` always waits the full
/// interval regardless of how long the last attempt took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntervalStrategy {
    #[default]
    Dynamic,
    Fixed,
}

/// A configured interval: a constant, a `[min, max]` range, or a function of
/// the global (and, for the per-page interval, flow) context.
pub enum IntervalSetting<This, Flow> {
    Scalar(u64),
    Range(u64, u64),
    Function(crate::callbacks::IntervalFn<This, Flow>),
}

impl<This, Flow> IntervalSetting<This, Flow> {
    fn resolve_static(&self) -> Option<IntervalValue> {
        match self {
            Self::Scalar(ms) => Some(IntervalValue::Scalar(*ms)),
            Self::Range(a, b) => Some(IntervalValue::Range(*a, *b)),
            Self::Function(_) => None,
        }
    }
}

/// A field rejected during validation, replaced with its default.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: &'static str,
    pub message: String,
}

/// Raw, user-supplied configuration. Every field but `pagination` and
/// `fetch_handler` (carried inside `pagination`) is optional; [`validate`]
/// fills in defaults and reports what it rejected.
pub struct RawOptions<This, Flow, R, C, I> {
    pub pagination: PaginationConfig<This, Flow, R, C, I>,
    pub init_this_context: InitThisContext<This>,
    pub reset_this_context: bool,
    pub init_flow_context: InitFlowContext<This, Flow>,
    pub reset_flow_context: bool,
    pub response_handler: Option<ResponseHandler<This, R>>,
    pub summary_handler: Option<SummaryHandler<This>>,
    pub interval: Option<IntervalSetting<This, Flow>>,
    pub interval_strategy: IntervalStrategy,
    pub cycle_interval: Option<IntervalSetting<This, Flow>>,
    pub cycle_interval_strategy: IntervalStrategy,
    pub concurrency: i64,
    pub remove_context_for_redundant_flows: bool,
    pub retry_limit: i64,
    pub retry_distinct_flows: bool,
    pub skip_page_if_possible: bool,
    pub max_total_page_fails: i64,
    pub max_consecutive_page_fails: i64,
    pub pagination_start: u64,
    pub pagination_prefetch: bool,
    pub logger: LoggerPolicy,
}

impl<This, Flow, R, C, I> RawOptions<This, Flow, R, C, I> {
    /// A minimally-specified raw configuration; every other field takes its
    /// §6 default.
    #[must_use]
    pub fn new(
        pagination: PaginationConfig<This, Flow, R, C, I>,
        init_this_context: InitThisContext<This>,
        init_flow_context: InitFlowContext<This, Flow>,
    ) -> Self {
        Self {
            pagination,
            init_this_context,
            reset_this_context: false,
            init_flow_context,
            reset_flow_context: false,
            response_handler: None,
            summary_handler: None,
            interval: None,
            interval_strategy: IntervalStrategy::default(),
            cycle_interval: None,
            cycle_interval_strategy: IntervalStrategy::Fixed,
            concurrency: 1,
            remove_context_for_redundant_flows: true,
            retry_limit: 2,
            retry_distinct_flows: true,
            skip_page_if_possible: false,
            max_total_page_fails: i64::MAX,
            max_consecutive_page_fails: i64::MAX,
            pagination_start: 1,
            pagination_prefetch: false,
            logger: LoggerPolicy::default(),
        }
    }
}

/// The validated, defaulted record driving one scheduler instance.
pub struct Options<This, Flow, R, C, I> {
    pub pagination: PaginationConfig<This, Flow, R, C, I>,
    pub init_this_context: InitThisContext<This>,
    pub reset_this_context: bool,
    pub init_flow_context: InitFlowContext<This, Flow>,
    pub reset_flow_context: bool,
    pub response_handler: Option<ResponseHandler<This, R>>,
    pub summary_handler: Option<SummaryHandler<This>>,
    pub interval: IntervalSetting<This, Flow>,
    pub interval_strategy: IntervalStrategy,
    pub cycle_interval: IntervalSetting<This, Flow>,
    pub cycle_interval_strategy: IntervalStrategy,
    pub concurrency: usize,
    pub remove_context_for_redundant_flows: bool,
    pub retry_limit: u32,
    pub retry_distinct_flows: bool,
    pub skip_page_if_possible: bool,
    pub max_total_page_fails: u64,
    pub max_consecutive_page_fails: u64,
    pub pagination_start: u64,
    pub pagination_prefetch: bool,
    pub logger: LoggerPolicy,
}

impl<This, Flow, R, C, I> Options<This, Flow, R, C, I> {
    /// Resolve the per-page interval (global + flow context available) to a
    /// millisecond count, falling back to the default range and publishing a
    /// `GeneralError` if a configured function errors or returns a
    /// non-finite value.
    #[must_use]
    pub fn resolve_interval(&self, this: &This, flow: Option<&Flow>, event_bus: &EventBus) -> u64 {
        resolve_setting(&self.interval, this, flow, event_bus)
    }

    /// Resolve the per-cycle interval (no flow context: it runs between
    /// cycles, not between pages).
    #[must_use]
    pub fn resolve_cycle_interval(&self, this: &This, event_bus: &EventBus) -> u64 {
        resolve_setting(&self.cycle_interval, this, None, event_bus)
    }
}

fn resolve_setting<This, Flow>(
    setting: &IntervalSetting<This, Flow>,
    this: &This,
    flow: Option<&Flow>,
    event_bus: &EventBus,
) -> u64 {
    match setting {
        IntervalSetting::Function(f) => {
            let resolved = f(this, flow).and_then(|x| {
                IntervalValue::from_signed(x)
                    .ok_or_else(|| anyhow::anyhow!("interval function returned a non-finite value: {x}"))
            });
            let value = resolved.unwrap_or_else(|e| {
                event_bus.publish_error(Event::GeneralError, e);
                IntervalValue::Range(
                    crate::scheduler::interval::DEFAULT_INTERVAL_RANGE.0,
                    crate::scheduler::interval::DEFAULT_INTERVAL_RANGE.1,
                )
            });
            crate::scheduler::interval::resolve(value)
        }
        other => crate::scheduler::interval::resolve(
            other
                .resolve_static()
                .unwrap_or(IntervalValue::Range(
                    crate::scheduler::interval::DEFAULT_INTERVAL_RANGE.0,
                    crate::scheduler::interval::DEFAULT_INTERVAL_RANGE.1,
                )),
        ),
    }
}

/// Validate a [`RawOptions`] into a defaulted, immutable [`Options`],
/// reporting a [`ValidationWarning`] for every out-of-range field it
/// replaced with its default.
pub fn validate<This, Flow, R, C, I>(
    raw: RawOptions<This, Flow, R, C, I>,
) -> (Options<This, Flow, R, C, I>, Vec<ValidationWarning>) {
    let mut warnings = Vec::new();

    let concurrency = non_negative_at_least_one(raw.concurrency, "concurrency", &mut warnings);
    if concurrency > 1 && !raw.pagination.supports_concurrency() {
        warnings.push(ValidationWarning {
            field: "concurrency",
            message: format!(
                "concurrency is not meaningful for {} pagination and will be ignored",
                raw.pagination.name()
            ),
        });
    }
    let retry_limit = non_negative(raw.retry_limit, "retry_limit", &mut warnings);
    let max_total_page_fails =
        non_negative_u64(raw.max_total_page_fails, "max_total_page_fails", &mut warnings);
    let max_consecutive_page_fails = non_negative_u64(
        raw.max_consecutive_page_fails,
        "max_consecutive_page_fails",
        &mut warnings,
    );

    let interval = raw.interval.unwrap_or(IntervalSetting::Range(
        crate::scheduler::interval::DEFAULT_INTERVAL_RANGE.0,
        crate::scheduler::interval::DEFAULT_INTERVAL_RANGE.1,
    ));
    // cycle_interval falls back to interval (§3) when unset; since
    // `IntervalSetting` isn't `Clone` (it may hold a boxed function), build
    // the fallback by reusing the same default range rather than cloning.
    let cycle_interval = raw.cycle_interval.unwrap_or(IntervalSetting::Range(
        crate::scheduler::interval::DEFAULT_INTERVAL_RANGE.0,
        crate::scheduler::interval::DEFAULT_INTERVAL_RANGE.1,
    ));

    let options = Options {
        pagination: raw.pagination,
        init_this_context: raw.init_this_context,
        reset_this_context: raw.reset_this_context,
        init_flow_context: raw.init_flow_context,
        reset_flow_context: raw.reset_flow_context,
        response_handler: raw.response_handler,
        summary_handler: raw.summary_handler,
        interval,
        interval_strategy: raw.interval_strategy,
        cycle_interval,
        cycle_interval_strategy: raw.cycle_interval_strategy,
        concurrency,
        remove_context_for_redundant_flows: raw.remove_context_for_redundant_flows,
        retry_limit,
        retry_distinct_flows: raw.retry_distinct_flows,
        skip_page_if_possible: raw.skip_page_if_possible,
        max_total_page_fails,
        max_consecutive_page_fails,
        // Accepted verbatim, including 0 — a driver starting at page 0 is the
        // caller's choice, not something validation second-guesses.
        pagination_start: raw.pagination_start,
        pagination_prefetch: raw.pagination_prefetch,
        logger: raw.logger,
    };

    (options, warnings)
}

fn non_negative_at_least_one(value: i64, field: &'static str, warnings: &mut Vec<ValidationWarning>) -> usize {
    if value < 1 {
        warnings.push(ValidationWarning {
            field,
            message: format!("expected >= 1, got {value}; using 1"),
        });
        1
    } else {
        value as usize
    }
}

fn non_negative(value: i64, field: &'static str, warnings: &mut Vec<ValidationWarning>) -> u32 {
    if value < 0 {
        warnings.push(ValidationWarning {
            field,
            message: format!("expected >= 0, got {value}; using 0"),
        });
        0
    } else {
        value.min(i64::from(u32::MAX)) as u32
    }
}

fn non_negative_u64(value: i64, field: &'static str, warnings: &mut Vec<ValidationWarning>) -> u64 {
    if value < 0 {
        warnings.push(ValidationWarning {
            field,
            message: format!("expected >= 0, got {value}; using u64::MAX"),
        });
        u64::MAX
    } else {
        value as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_concurrency_with_warning() {
        let mut warnings = Vec::new();
        let v = non_negative_at_least_one(0, "concurrency", &mut warnings);
        assert_eq!(v, 1);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "concurrency");
    }

    #[test]
    fn accepts_valid_concurrency_without_warning() {
        let mut warnings = Vec::new();
        let v = non_negative_at_least_one(4, "concurrency", &mut warnings);
        assert_eq!(v, 4);
        assert!(warnings.is_empty());
    }

    #[test]
    fn negative_retry_limit_defaults_to_zero() {
        let mut warnings = Vec::new();
        let v = non_negative(-3, "retry_limit", &mut warnings);
        assert_eq!(v, 0);
        assert_eq!(warnings.len(), 1);
    }
}

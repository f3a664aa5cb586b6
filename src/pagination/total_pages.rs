//! The `TotalPages` pagination driver (§4.6).
//!
//! State is private to this module: `next_page` and the discovered
//! `last_page`, both captured by the `next_fresh` closure handed to
//! `scheduler::pool::run_dispatch`. Grounded on `orchestrator::crawl_pages`'s
//! page-counter loop, generalized from a fixed page range to one discovered
//! mid-cycle from the first response(s).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use tokio_util::sync::CancellationToken;

use crate::callbacks::{FetchHandler, ResolveHandler};
use crate::config::Options;
use crate::events::{Event, EventBus};
use crate::scheduler::pool::{self, EngineConfig, ExecResult, Outcome};
use crate::scheduler::summary::{CycleSummary, SummaryAccumulator, TimingKind};
use crate::scheduler::FailCounter;

#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_total_pages_cycle<This, Flow, R, C, I>(
    this: Arc<This>,
    flows: Vec<Flow>,
    fetch_handler: FetchHandler<This, Flow, u64, R>,
    resolve_total_pages: ResolveHandler<This, R, Option<u64>>,
    options: &Options<This, Flow, R, C, I>,
    event_bus: &Arc<EventBus>,
    token: &CancellationToken,
    started_at_ms: u128,
) -> (Vec<Flow>, CycleSummary)
where
    This: Send + Sync + 'static,
    Flow: Send + 'static,
    R: Send + Sync + Clone + 'static,
{
    let next_page = AtomicU64::new(options.pagination_start);
    let last_page: Mutex<Option<u64>> = Mutex::new(None);
    let done = AtomicBool::new(false);
    let first_page_ready = AtomicBool::new(false);

    let mut fail_counter = FailCounter::new(
        options.skip_page_if_possible,
        options.max_total_page_fails,
        options.max_consecutive_page_fails,
    );
    let mut summary = SummaryAccumulator::new(Instant::now(), started_at_ms);

    let engine_config = EngineConfig {
        distinct_flows: options.retry_distinct_flows,
        retry_limit: options.retry_limit,
        interval_strategy: options.interval_strategy,
    };
    // The context updater sizes `flows` to the right concurrency ceiling
    // already (§4.7); `TotalPages` further floors it to 1 until the first
    // page has landed, unless prefetch is enabled.
    let total_flows = flows.len();
    let concurrency = || {
        if options.pagination_prefetch || first_page_ready.load(Ordering::Acquire) {
            total_flows
        } else {
            1
        }
    };

    let next_fresh = || -> Option<u64> {
        if done.load(Ordering::Acquire) {
            return None;
        }
        // §4.5: with prefetch disabled, only one fresh task may run until the
        // first page has completed at least once.
        let page = next_page.load(Ordering::Acquire);
        if !options.pagination_prefetch && !first_page_ready.load(Ordering::Acquire) && page > options.pagination_start {
            return None;
        }
        next_page.store(page + 1, Ordering::Release);
        if let Some(last) = *last_page.lock()
            && page >= last
        {
            done.store(true, Ordering::Release);
        }
        Some(page)
    };

    let response_handler = options.response_handler.clone();
    let this_for_exec = Arc::clone(&this);
    let event_bus_for_exec = Arc::clone(event_bus);
    let exec = Arc::new(move |flow: Flow, page: u64, _attempts_left: u32, _is_retry: bool| {
        let this = Arc::clone(&this_for_exec);
        let fetch_handler = fetch_handler.clone();
        let resolve_total_pages = resolve_total_pages.clone();
        let response_handler = response_handler.clone();
        let event_bus = Arc::clone(&event_bus_for_exec);
        Box::pin(async move {
            let (flow, fetch_result) = fetch_handler(Arc::clone(&this), flow, page).await;
            let response = match fetch_result {
                Ok(r) => r,
                Err(e) => {
                    event_bus.publish_error(Event::FetchError, e);
                    return (flow, ExecResult::NeedsRetry(page));
                }
            };
            if let Some(rh) = response_handler {
                let this2 = Arc::clone(&this);
                let response2 = response.clone();
                tokio::spawn(async move {
                    if let Err(e) = rh(this2, response2).await {
                        log::warn!("[ResponseHandleError] response_handler failed: {e:#}");
                    }
                });
            }
            match resolve_total_pages(this, response).await {
                Ok(total) => (flow, ExecResult::Success(total)),
                Err(e) => {
                    event_bus.publish_error(Event::ResolveError, e);
                    (flow, ExecResult::NeedsRetry(page))
                }
            }
        }) as crate::callbacks::BoxFuture<'static, (Flow, ExecResult<u64, Option<u64>>)>
    });

    let mut stop_for_budget = false;
    let (remaining_flows, cancelled) = pool::run_dispatch(
        flows,
        &engine_config,
        token,
        concurrency,
        || options.resolve_interval(&this, None, event_bus),
        next_fresh,
        exec,
        |outcome| match outcome {
            Outcome::Success(total, elapsed_ms) => {
                fail_counter.success();
                summary.record_page();
                summary.add_avg_timing(TimingKind::Successful, elapsed_ms);
                first_page_ready.store(true, Ordering::Release);
                if let Some(total) = total {
                    *last_page.lock() = Some(total);
                    summary.set_total_page_count(total);
                }
            }
            Outcome::Retrying(elapsed_ms) => {
                summary.record_error();
                summary.add_avg_timing(TimingKind::Failed, elapsed_ms);
            }
            Outcome::Exhausted(page, elapsed_ms) => {
                summary.record_page();
                summary.record_error();
                summary.add_avg_timing(TimingKind::Failed, elapsed_ms);
                if fail_counter.fail(Some(page)) {
                    stop_for_budget = true;
                    done.store(true, Ordering::Release);
                }
                summary.push_failed_page(page);
            }
        },
    )
    .await;

    let completed = !cancelled && !stop_for_budget && fail_counter.complete(*last_page.lock());
    (remaining_flows, summary.summarize(completed))
}

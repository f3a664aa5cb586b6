//! The `List` pagination driver (§4.6): a fixed, up-front list of items.
//!
//! `resolve_list` runs once before the worker pool starts; everything past
//! that point is plain index-based dispatch, grounded on the same retry/fail
//! budget machinery as `TotalPages`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::callbacks::{FetchHandler, ResolveListHandler};
use crate::config::Options;
use crate::events::{Event, EventBus};
use crate::scheduler::pool::{self, EngineConfig, ExecResult, Outcome};
use crate::scheduler::summary::{CycleSummary, SummaryAccumulator, TimingKind};
use crate::scheduler::FailCounter;

#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_list_cycle<This, Flow, R, C, I>(
    this: Arc<This>,
    flows: Vec<Flow>,
    fetch_handler: FetchHandler<This, Flow, (I, usize), R>,
    resolve_list: ResolveListHandler<This, I>,
    options: &Options<This, Flow, R, C, I>,
    event_bus: &Arc<EventBus>,
    token: &CancellationToken,
    started_at_ms: u128,
) -> (Vec<Flow>, CycleSummary)
where
    This: Send + Sync + 'static,
    Flow: Send + 'static,
    R: Send + Sync + Clone + 'static,
    I: Send + Sync + Clone + 'static,
{
    let mut summary = SummaryAccumulator::new(Instant::now(), started_at_ms);

    let items = match resolve_list(Arc::clone(&this)).await {
        Ok(items) => items,
        Err(e) => {
            event_bus.publish_error(Event::ResolveError, e);
            return (flows, summary.summarize(false));
        }
    };
    if items.is_empty() {
        event_bus.publish(Event::ResolveError(Arc::new(anyhow::anyhow!(
            "resolve_list returned an empty list"
        ))));
        return (flows, summary.summarize(true));
    }

    let next_index = AtomicUsize::new(0);
    let done = AtomicBool::new(false);

    let mut fail_counter = FailCounter::new(
        options.skip_page_if_possible,
        options.max_total_page_fails,
        options.max_consecutive_page_fails,
    );

    let engine_config = EngineConfig {
        distinct_flows: options.retry_distinct_flows,
        retry_limit: options.retry_limit,
        interval_strategy: options.interval_strategy,
    };
    let total_flows = flows.len();

    let next_fresh = || -> Option<(I, usize)> {
        if done.load(Ordering::Acquire) {
            return None;
        }
        let idx = next_index.fetch_add(1, Ordering::AcqRel);
        if idx >= items.len() {
            done.store(true, Ordering::Release);
            return None;
        }
        let item = items[idx].clone();
        if idx + 1 >= items.len() {
            done.store(true, Ordering::Release);
        }
        Some((item, idx))
    };

    let response_handler = options.response_handler.clone();
    let this_for_exec = Arc::clone(&this);
    let event_bus_for_exec = Arc::clone(event_bus);
    let exec = Arc::new(move |flow: Flow, payload: (I, usize), _attempts_left: u32, _is_retry: bool| {
        let this = Arc::clone(&this_for_exec);
        let fetch_handler = fetch_handler.clone();
        let response_handler = response_handler.clone();
        let event_bus = Arc::clone(&event_bus_for_exec);
        Box::pin(async move {
            let (flow, fetch_result) = fetch_handler(Arc::clone(&this), flow, payload.clone()).await;
            match fetch_result {
                Ok(response) => {
                    if let Some(rh) = response_handler {
                        tokio::spawn(async move {
                            if let Err(e) = rh(this, response).await {
                                log::warn!("[ResponseHandleError] response_handler failed: {e:#}");
                            }
                        });
                    }
                    (flow, ExecResult::Success(()))
                }
                Err(e) => {
                    event_bus.publish_error(Event::FetchError, e);
                    (flow, ExecResult::NeedsRetry(payload))
                }
            }
        }) as crate::callbacks::BoxFuture<'static, (Flow, ExecResult<(I, usize), ()>)>
    });

    let mut stop_for_budget = false;
    let (remaining_flows, cancelled) = pool::run_dispatch(
        flows,
        &engine_config,
        token,
        || total_flows,
        || options.resolve_interval(&this, None, event_bus),
        next_fresh,
        exec,
        |outcome| match outcome {
            Outcome::Success((), elapsed_ms) => {
                fail_counter.success();
                summary.record_page();
                summary.add_avg_timing(TimingKind::Successful, elapsed_ms);
            }
            Outcome::Retrying(elapsed_ms) => {
                summary.record_error();
                summary.add_avg_timing(TimingKind::Failed, elapsed_ms);
            }
            Outcome::Exhausted((_, idx), elapsed_ms) => {
                summary.record_page();
                summary.record_error();
                summary.add_avg_timing(TimingKind::Failed, elapsed_ms);
                if fail_counter.fail(Some(idx as u64)) {
                    stop_for_budget = true;
                    done.store(true, Ordering::Release);
                }
                summary.push_failed_page(idx as u64);
            }
        },
    )
    .await;

    summary.set_total_page_count(next_index.load(Ordering::Acquire).min(items.len()) as u64);
    let completed = !cancelled && !stop_for_budget && fail_counter.complete(None);
    (remaining_flows, summary.summarize(completed))
}

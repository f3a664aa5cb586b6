//! The `Cursor` pagination driver (§4.6): sequential, cursor-chained
//! pagination. Concurrency is forced to 1 — `skip_page_if_possible` and the
//! failure budget don't apply, since a lost cursor makes every subsequent
//! page unreachable; the first unrecoverable failure is always terminal.

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

#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_cursor_cycle<This, Flow, R, C, I>(
    this: Arc<This>,
    flows: Vec<Flow>,
    fetch_handler: FetchHandler<This, Flow, (Option<C>, u64), R>,
    resolve_cursor: ResolveHandler<This, R, Option<C>>,
    options: &Options<This, Flow, R, C, I>,
    event_bus: &Arc<EventBus>,
    token: &CancellationToken,
    started_at_ms: u128,
) -> (Vec<Flow>, CycleSummary)
where
    This: Send + Sync + 'static,
    Flow: Send + 'static,
    R: Send + Sync + Clone + 'static,
    C: Send + Sync + Clone + 'static,
{
    let next_cursor: Mutex<Option<C>> = Mutex::new(None);
    let next_page_num = AtomicU64::new(1);
    let done = AtomicBool::new(false);
    let natural_end = AtomicBool::new(false);

    let mut summary = SummaryAccumulator::new(Instant::now(), started_at_ms);

    let engine_config = EngineConfig {
        distinct_flows: options.retry_distinct_flows,
        retry_limit: options.retry_limit,
        interval_strategy: options.interval_strategy,
    };

    let next_fresh = || -> Option<(Option<C>, u64)> {
        if done.load(Ordering::Acquire) {
            return None;
        }
        let page_num = next_page_num.fetch_add(1, Ordering::AcqRel);
        Some((next_cursor.lock().clone(), page_num))
    };

    let response_handler = options.response_handler.clone();
    let this_for_exec = Arc::clone(&this);
    let event_bus_for_exec = Arc::clone(event_bus);
    let exec = Arc::new(
        move |flow: Flow, payload: (Option<C>, u64), _attempts_left: u32, _is_retry: bool| {
            let this = Arc::clone(&this_for_exec);
            let fetch_handler = fetch_handler.clone();
            let resolve_cursor = resolve_cursor.clone();
            let response_handler = response_handler.clone();
            let event_bus = Arc::clone(&event_bus_for_exec);
            Box::pin(async move {
                let (flow, fetch_result) = fetch_handler(Arc::clone(&this), flow, payload.clone()).await;
                let response = match fetch_result {
                    Ok(r) => r,
                    Err(e) => {
                        event_bus.publish_error(Event::FetchError, e);
                        return (flow, ExecResult::NeedsRetry(payload));
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
                match resolve_cursor(this, response).await {
                    Ok(next) => (flow, ExecResult::Success(next)),
                    Err(e) => {
                        event_bus.publish_error(Event::ResolveError, e);
                        (flow, ExecResult::NeedsRetry(payload))
                    }
                }
            }) as crate::callbacks::BoxFuture<'static, (Flow, ExecResult<(Option<C>, u64), Option<C>>)>
        },
    );

    let (remaining_flows, cancelled) = pool::run_dispatch(
        flows,
        &engine_config,
        token,
        || 1,
        || options.resolve_interval(&this, None, event_bus),
        next_fresh,
        exec,
        |outcome| match outcome {
            Outcome::Success(next, elapsed_ms) => {
                summary.record_page();
                summary.add_avg_timing(TimingKind::Successful, elapsed_ms);
                match next {
                    Some(c) => *next_cursor.lock() = Some(c),
                    None => {
                        done.store(true, Ordering::Release);
                        natural_end.store(true, Ordering::Release);
                    }
                }
            }
            Outcome::Retrying(elapsed_ms) => {
                summary.record_error();
                summary.add_avg_timing(TimingKind::Failed, elapsed_ms);
            }
            Outcome::Exhausted((_, page_num), elapsed_ms) => {
                summary.record_page();
                summary.record_error();
                summary.add_avg_timing(TimingKind::Failed, elapsed_ms);
                summary.push_failed_page(page_num);
                done.store(true, Ordering::Release);
            }
        },
    )
    .await;

    summary.set_total_page_count(next_page_num.load(Ordering::Acquire).saturating_sub(1));
    let completed = !cancelled && natural_end.load(Ordering::Acquire);
    (remaining_flows, summary.summarize(completed))
}

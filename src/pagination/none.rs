//! The `None` pagination driver (§4.6): a fixed one-page cycle.
//!
//! Concurrency is forced to 1 and exactly one page (page `1`) is ever
//! dispatched — fresh or retried. Grounded on the degenerate single-shot path
//! through `orchestrator::crawl_pages` when a crawl has no further links to
//! discover.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::callbacks::FetchHandler;
use crate::config::Options;
use crate::events::{Event, EventBus};
use crate::scheduler::pool::{self, EngineConfig, ExecResult, Outcome};
use crate::scheduler::summary::{CycleSummary, SummaryAccumulator, TimingKind};

const ONLY_PAGE: u64 = 1;

#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_none_cycle<This, Flow, R, C, I>(
    this: Arc<This>,
    flows: Vec<Flow>,
    fetch_handler: FetchHandler<This, Flow, (), R>,
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
    let dispatched = AtomicBool::new(false);
    let succeeded = AtomicBool::new(false);

    let mut summary = SummaryAccumulator::new(Instant::now(), started_at_ms);

    let engine_config = EngineConfig {
        distinct_flows: options.retry_distinct_flows,
        retry_limit: options.retry_limit,
        interval_strategy: options.interval_strategy,
    };

    let next_fresh = || -> Option<()> {
        if dispatched.swap(true, Ordering::Relaxed) {
            None
        } else {
            Some(())
        }
    };

    let response_handler = options.response_handler.clone();
    let this_for_exec = Arc::clone(&this);
    let event_bus_for_exec = Arc::clone(event_bus);
    let exec = Arc::new(move |flow: Flow, (): (), _attempts_left: u32, _is_retry: bool| {
        let this = Arc::clone(&this_for_exec);
        let fetch_handler = fetch_handler.clone();
        let response_handler = response_handler.clone();
        let event_bus = Arc::clone(&event_bus_for_exec);
        Box::pin(async move {
            let (flow, fetch_result) = fetch_handler(Arc::clone(&this), flow, ()).await;
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
                    (flow, ExecResult::NeedsRetry(()))
                }
            }
        }) as crate::callbacks::BoxFuture<'static, (Flow, ExecResult<(), ()>)>
    });

    let (remaining_flows, cancelled) = pool::run_dispatch(
        flows,
        &engine_config,
        token,
        || 1,
        || options.resolve_interval(&this, None, event_bus),
        next_fresh,
        exec,
        |outcome| match outcome {
            Outcome::Success((), elapsed_ms) => {
                summary.record_page();
                summary.add_avg_timing(TimingKind::Successful, elapsed_ms);
                succeeded.store(true, Ordering::Relaxed);
            }
            Outcome::Retrying(elapsed_ms) => {
                summary.record_error();
                summary.add_avg_timing(TimingKind::Failed, elapsed_ms);
            }
            Outcome::Exhausted((), elapsed_ms) => {
                summary.record_page();
                summary.record_error();
                summary.add_avg_timing(TimingKind::Failed, elapsed_ms);
                summary.push_failed_page(ONLY_PAGE);
            }
        },
    )
    .await;

    let completed = !cancelled && succeeded.load(Ordering::Relaxed);
    (remaining_flows, summary.summarize(completed))
}

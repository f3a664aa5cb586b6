//! The Cycle Loop (§4.8): repeatedly rebuilds contexts, runs one pagination
//! cycle, reports its summary, and paces to the next cycle.
//!
//! Grounded on `orchestrator`'s top-level crawl loop and `crawl_events`'
//! emission ordering: the loop owns no public API of its own (that's
//! `crate::facade::Scheduler`) — it's spawned as a single task and driven
//! entirely through the shared state handed to [`run`].

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::config::Options;
use crate::events::{Event, EventBus};
use crate::scheduler::{context, sleeper};

/// Shared state a running cycle loop task exposes back to the façade:
/// the live flow pool (emptied out while a cycle's dispatch is in flight),
/// the current global context (swapped on `reset_this_context`), and the
/// per-cycle token the façade cancels directly on a forced stop escalation.
pub(crate) struct SharedState<This, Flow> {
    pub this: Mutex<Arc<This>>,
    pub flows: Mutex<Vec<Flow>>,
    pub current_cycle_token: Mutex<CancellationToken>,
}

impl<This, Flow> SharedState<This, Flow> {
    pub fn new(this: Arc<This>, flows: Vec<Flow>) -> Self {
        Self {
            this: Mutex::new(this),
            flows: Mutex::new(flows),
            current_cycle_token: Mutex::new(CancellationToken::new()),
        }
    }
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Run the cycle loop until `outer_token` is cancelled or a fatal runtime
/// error forces a stop. `ready` is fired before the first await point so the
/// façade can observe `is_running() == true` before it publishes `Started`.
pub(crate) async fn run<This, Flow, R, C, I>(
    state: Arc<SharedState<This, Flow>>,
    options: Arc<Options<This, Flow, R, C, I>>,
    event_bus: Arc<EventBus>,
    outer_token: CancellationToken,
    ready: oneshot::Sender<()>,
) where
    This: Send + Sync + 'static,
    Flow: Send + 'static,
    R: Send + Sync + Clone + 'static,
    C: Send + Sync + Clone + 'static,
    I: Send + Sync + Clone + 'static,
{
    let _ = ready.send(());

    let mut first_cycle = true;
    loop {
        // The first cycle always runs to completion once this task has been
        // spawned: checking `outer_token` before it would race a `stop()`
        // called immediately after `start()` (as `start_once` does),
        // breaking the "exactly one cycle runs" guarantee.
        if !first_cycle && outer_token.is_cancelled() {
            break;
        }

        if options.reset_this_context && !first_cycle {
            match (options.init_this_context)() {
                Ok(fresh) => *state.this.lock() = Arc::new(fresh),
                Err(e) => {
                    event_bus.publish_error(Event::GeneralError, e);
                    outer_token.cancel();
                    break;
                }
            }
        }

        let this = state.this.lock().clone();
        let previous_flows = std::mem::take(&mut *state.flows.lock());
        let rebuild_now = first_cycle || options.reset_flow_context;

        let cycle_flows = if rebuild_now {
            match context::rebuild(
                &this,
                &options.init_flow_context,
                options.concurrency,
                options.remove_context_for_redundant_flows,
                previous_flows,
            )
            .await
            {
                Ok(rebuilt) => rebuilt.flows,
                Err(e) => {
                    event_bus.publish_error(Event::GeneralError, anyhow::Error::new(e));
                    outer_token.cancel();
                    break;
                }
            }
        } else {
            previous_flows
        };
        first_cycle = false;

        let cycle_token = CancellationToken::new();
        *state.current_cycle_token.lock() = cycle_token.clone();

        let started_at_ms = now_ms();
        let (remaining_flows, summary) = options
            .pagination
            .run_cycle(Arc::clone(&this), cycle_flows, &options, &event_bus, &cycle_token, started_at_ms)
            .await;

        *state.flows.lock() = remaining_flows;

        if let Some(summary_handler) = &options.summary_handler
            && let Err(e) = summary_handler(Arc::clone(&this), summary.clone()).await
        {
            event_bus.publish_error(Event::SummaryHandleError, e);
        }
        event_bus.publish(Event::CycleSummary(summary));

        if outer_token.is_cancelled() {
            break;
        }

        let cycle_interval = options.resolve_cycle_interval(&this, &event_bus);
        if sleeper::sleep(cycle_interval, &outer_token).await {
            break;
        }
    }
}

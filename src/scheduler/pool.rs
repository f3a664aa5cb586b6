//! The dispatch engine shared by every pagination driver (§4.5).
//!
//! Grounded on `crawl_engine::orchestrator`'s fixed-size worker pool: a flow
//! context is either "parked" (idle, available for dispatch) or "in flight"
//! (moved out into a running task, hence `Vec<Option<Flow>>` below — a flow
//! is literally absent from its slot while a task runs, which is also why
//! handlers hand `Flow` back instead of borrowing it, see `crate::callbacks`).
//!
//! Each pagination driver owns its own page-allocation state (`next_page`,
//! `items`, a cursor, ...) and its own "terminal" decision (when to stop
//! minting fresh work); this module owns everything driver-agnostic: the
//! worker slots, the `retry_distinct_flows` matching (`super::retry`), and
//! per-slot interval pacing. A driver plugs in three callbacks: `next_fresh`
//! mints a fresh page's payload (or signals there's none left), `exec` fetches
//! and classifies one attempt, and `on_outcome` lets the driver update its own
//! bookkeeping (failure budgets, discovered last page, summary stats).
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::callbacks::BoxFuture;
use crate::config::IntervalStrategy;
use crate::scheduler::retry::{assign_retries, PendingRetry};
use crate::scheduler::sleeper;

/// What one attempt (fresh or retried) concluded with. `exec` only classifies
/// the attempt; the engine (not the driver) decides whether a `NeedsRetry`
/// still has budget left.
pub(crate) enum ExecResult<P, Ev> {
    Success(Ev),
    NeedsRetry(P),
}

/// What the engine reports back to the driver after one attempt resolves,
/// folding in the attempts-left bookkeeping `exec` itself doesn't see. Each
/// variant carries the wall-clock time `exec` itself took, in milliseconds
/// (the pacing sleep before it is excluded), for the driver's summary.
pub(crate) enum Outcome<P, Ev> {
    Success(Ev, u64),
    Retrying(u64),
    Exhausted(P, u64),
}

/// What one pushed attempt future resolves to: either `exec` ran to
/// completion, or its pacing sleep was cut short by cancellation before
/// `exec` was ever invoked — in which case `payload` is handed back
/// untouched so it can be requeued instead of counted as a failed attempt.
enum DispatchOutcome<P, Ev> {
    Cancelled(P),
    Settled(ExecResult<P, Ev>, u64),
}

pub(crate) struct EngineConfig {
    pub distinct_flows: bool,
    pub retry_limit: u32,
    pub interval_strategy: IntervalStrategy,
}

struct WorkerSlots<Flow> {
    slots: Vec<Option<Flow>>,
    active: usize,
}

impl<Flow> WorkerSlots<Flow> {
    fn new(flows: Vec<Flow>) -> Self {
        let len = flows.len();
        Self {
            slots: flows.into_iter().map(Some).collect(),
            active: len,
        }
    }

    /// Re-evaluate concurrency for the coming dispatch tick. Per §4.5,
    /// concurrency only ever grows mid-cycle (fixed-concurrency top-ups,
    /// prefetch gating lifting once the first page lands) — it never
    /// shrinks, so this takes the max of the current and requested bound.
    fn raise_active_to(&mut self, wanted: usize) {
        self.active = self.active.max(wanted.min(self.slots.len())).min(self.slots.len());
    }

    fn free_indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .take(self.active)
            .filter(|(_, f)| f.is_some())
            .map(|(i, _)| i)
            .collect()
    }

    fn take(&mut self, idx: usize) -> Flow {
        self.slots[idx].take().expect("slot already taken")
    }

    fn put_back(&mut self, idx: usize, flow: Flow) {
        self.slots[idx] = Some(flow);
    }

    fn into_flows(self) -> Vec<Flow> {
        self.slots.into_iter().flatten().collect()
    }
}

type AttemptOutput<Flow, P, Ev> = (usize, Flow, u32, HashSet<usize>, DispatchOutcome<P, Ev>);
type Attempt<Flow, P, Ev> = (Flow, ExecResult<P, Ev>);

/// Run one cycle's dispatch loop to completion.
///
/// `next_fresh` is called synchronously (never concurrently with itself) to
/// mint a fresh page for a free slot; once it returns `None` it must keep
/// returning `None` (the driver's own terminal flag). `exec` performs the
/// actual fetch/resolve; `on_outcome` is invoked once per resolved attempt so
/// the driver can update its fail counter, summary, and terminal state.
///
/// Returns the flow contexts (including any left idle beyond the active
/// concurrency) and whether the cycle was cut short by cancellation.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_dispatch<Flow, P, Ev, FConcurrency, FFresh, FExec, FOutcome>(
    flows: Vec<Flow>,
    config: &EngineConfig,
    token: &CancellationToken,
    concurrency: FConcurrency,
    interval_ms: impl Fn() -> u64,
    mut next_fresh: FFresh,
    exec: Arc<FExec>,
    mut on_outcome: FOutcome,
) -> (Vec<Flow>, bool)
where
    Flow: Send + 'static,
    P: Send + Clone + 'static,
    Ev: Send + 'static,
    FConcurrency: Fn() -> usize,
    FFresh: FnMut() -> Option<P>,
    FExec: Fn(Flow, P, u32, bool) -> BoxFuture<'static, Attempt<Flow, P, Ev>> + Send + Sync + 'static,
    FOutcome: FnMut(Outcome<P, Ev>),
{
    let mut worker_slots = WorkerSlots::new(flows);
    let mut pending: std::collections::VecDeque<PendingRetry<P>> = std::collections::VecDeque::new();
    let mut last_exec: HashMap<usize, Instant> = HashMap::new();
    let mut in_flight: FuturesUnordered<BoxFuture<'static, AttemptOutput<Flow, P, Ev>>> =
        FuturesUnordered::new();
    let mut cancelled = false;

    loop {
        if token.is_cancelled() {
            cancelled = true;
            break;
        }

        worker_slots.raise_active_to(concurrency());
        let free = worker_slots.free_indices();
        if !free.is_empty() {
            let assigned = assign_retries(&mut pending, &free, config.distinct_flows, worker_slots.active);
            let mut used: HashSet<usize> = HashSet::new();
            for (slot, retry) in assigned {
                used.insert(slot);
                dispatch(
                    &mut worker_slots,
                    &mut in_flight,
                    &mut last_exec,
                    slot,
                    retry.payload,
                    retry.attempts_left,
                    retry.attempted_flows,
                    true,
                    config,
                    &interval_ms,
                    Arc::clone(&exec),
                    token,
                );
            }
            for slot in free {
                if used.contains(&slot) {
                    continue;
                }
                if let Some(payload) = next_fresh() {
                    dispatch(
                        &mut worker_slots,
                        &mut in_flight,
                        &mut last_exec,
                        slot,
                        payload,
                        config.retry_limit,
                        HashSet::new(),
                        false,
                        config,
                        &interval_ms,
                        Arc::clone(&exec),
                        token,
                    );
                }
            }
        }

        if in_flight.is_empty() && pending.is_empty() {
            break;
        }

        tokio::select! {
            () = token.cancelled() => {
                cancelled = true;
                break;
            }
            next = in_flight.next() => {
                let Some((slot, flow, attempts_left, mut attempted_flows, result)) = next else {
                    break;
                };
                worker_slots.put_back(slot, flow);
                match result {
                    DispatchOutcome::Cancelled(payload) => {
                        // The pacing sleep was cut short by cancellation; `exec`
                        // never ran, so this isn't a failed attempt — requeue
                        // the payload unchanged rather than spending a retry.
                        let mut retry = PendingRetry::new(payload, attempts_left);
                        retry.attempted_flows = attempted_flows;
                        pending.push_back(retry);
                    }
                    DispatchOutcome::Settled(ExecResult::Success(ev), elapsed_ms) => {
                        on_outcome(Outcome::Success(ev, elapsed_ms));
                    }
                    DispatchOutcome::Settled(ExecResult::NeedsRetry(payload), elapsed_ms) => {
                        if attempts_left > 0 {
                            attempted_flows.insert(slot);
                            let mut retry = PendingRetry::new(payload, attempts_left - 1);
                            retry.attempted_flows = attempted_flows;
                            pending.push_back(retry);
                            on_outcome(Outcome::Retrying(elapsed_ms));
                        } else {
                            on_outcome(Outcome::Exhausted(payload, elapsed_ms));
                        }
                    }
                }
            }
        }
    }

    (worker_slots.into_flows(), cancelled)
}

/// Parks a flow onto the in-flight set. The pacing sleep and the `exec` call
/// both live inside the pushed future, not here: `dispatch` itself never
/// awaits, so dispatching several workers in the same tick lets their sleeps
/// run concurrently instead of serializing behind each other in the loop
/// above.
#[allow(clippy::too_many_arguments)]
fn dispatch<Flow, P, Ev, FExec>(
    worker_slots: &mut WorkerSlots<Flow>,
    in_flight: &mut FuturesUnordered<BoxFuture<'static, AttemptOutput<Flow, P, Ev>>>,
    last_exec: &mut HashMap<usize, Instant>,
    slot: usize,
    payload: P,
    attempts_left: u32,
    attempted_flows: HashSet<usize>,
    is_retry: bool,
    config: &EngineConfig,
    interval_ms: &impl Fn() -> u64,
    exec: Arc<FExec>,
    token: &CancellationToken,
) where
    Flow: Send + 'static,
    P: Send + Clone + 'static,
    Ev: Send + 'static,
    FExec: Fn(Flow, P, u32, bool) -> BoxFuture<'static, Attempt<Flow, P, Ev>> + Send + Sync + 'static,
{
    let flow = worker_slots.take(slot);
    let wait_ms = match last_exec.get(&slot) {
        Some(last) => match config.interval_strategy {
            IntervalStrategy::Dynamic => {
                let elapsed = last.elapsed().as_millis() as u64;
                interval_ms().saturating_sub(elapsed)
            }
            IntervalStrategy::Fixed => interval_ms(),
        },
        None => 0,
    };
    last_exec.insert(slot, Instant::now());
    let token = token.clone();
    let requeue_payload = payload.clone();
    in_flight.push(Box::pin(async move {
        if wait_ms > 0 && sleeper::sleep(wait_ms, &token).await {
            return (slot, flow, attempts_left, attempted_flows, DispatchOutcome::Cancelled(requeue_payload));
        }
        let started = Instant::now();
        let (flow, result) = exec(flow, payload, attempts_left, is_retry).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        (slot, flow, attempts_left, attempted_flows, DispatchOutcome::Settled(result, elapsed_ms))
    }));
}

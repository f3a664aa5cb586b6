//! Context Updater (§4.7): (re)builds the per-cycle `FlowContext` pool.
//!
//! Grounded on `orchestrator::crawl_pages`'s worker-state initialization,
//! generalized from a fixed `Vec<WorkerState>` built once to a rebuild that
//! runs at the start of every cycle (or is skipped, carrying the previous
//! cycle's contexts forward, when `reset_flow_context` is false).
//!
//! Growth mid-cycle (§4.7's "top up... never shrink") collapses to nothing
//! further to do here: [`rebuild`] already pre-sizes the returned `Vec` to
//! `Options::concurrency` (or the user's fixed-concurrency `Vec` length)
//! before the cycle starts, so the only growth `scheduler::pool::run_dispatch`
//! performs mid-cycle is activating already-allocated idle slots — it never
//! needs to mint a brand new `Flow` value once a cycle is underway, since
//! `Options::concurrency` does not change within a cycle.

use std::sync::Arc;

use crate::callbacks::{FlowInit, InitFlowContext};
use crate::error::RuntimeError;

/// Result of a rebuild: the sized flow pool and whether the user's
/// initializer put the engine into fixed-concurrency mode (a non-empty `Vec`
/// return), which overrides `Options::concurrency` for this cycle.
#[derive(Debug)]
pub(crate) struct Rebuilt<Flow> {
    pub flows: Vec<Flow>,
    pub fixed_concurrency: bool,
}

/// Rebuild the flow pool for a new cycle.
///
/// `previous` carries forward whatever contexts survived the last cycle (or
/// is empty on the very first cycle). The first call to `init_flow_context`
/// determines the mode: a `Vec` result replaces the whole pool outright; a
/// scalar result is called once more per remaining `concurrency` slot,
/// passing along the corresponding old context so the user may migrate
/// state. Every call after the first must agree on scalar-vs-fixed, or the
/// rebuild fails with [`RuntimeError::InconsistentFlowShape`].
pub(crate) async fn rebuild<This, Flow>(
    this: &Arc<This>,
    init_flow_context: &InitFlowContext<This, Flow>,
    concurrency: usize,
    remove_context_for_redundant_flows: bool,
    previous: Vec<Flow>,
) -> Result<Rebuilt<Flow>, RuntimeError> {
    let mut previous = previous.into_iter();
    let first_old = previous.next();
    let rest_old: Vec<Flow> = previous.collect();

    let first = init_flow_context(Arc::clone(this), first_old)
        .await
        .map_err(RuntimeError::InitFlowContext)?;

    match first {
        FlowInit::Fixed(vec) => {
            if vec.is_empty() {
                return Err(RuntimeError::EmptyFlowContexts);
            }
            Ok(Rebuilt {
                flows: vec,
                fixed_concurrency: true,
            })
        }
        FlowInit::Scalar(first_flow) => {
            if concurrency == 0 {
                return Err(RuntimeError::EmptyFlowContexts);
            }
            let mut flows = Vec::with_capacity(concurrency);
            flows.push(first_flow);
            let mut rest_old = rest_old.into_iter();
            for _ in 1..concurrency {
                let old = rest_old.next();
                match init_flow_context(Arc::clone(this), old)
                    .await
                    .map_err(RuntimeError::InitFlowContext)?
                {
                    FlowInit::Scalar(flow) => flows.push(flow),
                    FlowInit::Fixed(_) => return Err(RuntimeError::InconsistentFlowShape),
                }
            }
            if !remove_context_for_redundant_flows {
                flows.extend(rest_old);
            }
            Ok(Rebuilt {
                flows,
                fixed_concurrency: false,
            })
        }
    }
}

//! Error types for scheduler construction and runtime control.

use thiserror::Error;

/// Errors that abort `Scheduler::new` synchronously.
///
/// These are the only failures the spec requires to be thrown rather than
/// warned-and-defaulted: a missing `fetch_handler`, a missing kind-specific
/// resolver, or `init_this_context` erroring.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("fetch_handler is required")]
    MissingFetchHandler,

    #[error("resolver `{0}` is required for this pagination kind")]
    MissingResolver(&'static str),

    #[error("init_this_context failed: {0}")]
    InitThisContext(#[source] anyhow::Error),
}

/// Errors surfaced from a forced-stop-triggering runtime failure.
///
/// `init_flow_context` erroring, or returning an inconsistent/empty shape,
/// forces the scheduler to stop and emits this as a `GeneralError` event.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("init_flow_context failed: {0}")]
    InitFlowContext(#[source] anyhow::Error),

    #[error("init_flow_context returned an empty context list")]
    EmptyFlowContexts,

    #[error("init_flow_context mixed scalar and fixed-concurrency results across calls")]
    InconsistentFlowShape,
}

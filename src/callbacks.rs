//! Shared callback type aliases.
//!
//! User callbacks are stored as `Arc<dyn Fn(...) -> BoxFuture<...>>` trait
//! objects rather than generic type parameters on `Scheduler` itself — the
//! five pagination kinds already contribute enough generics (`This`, `Flow`,
//! response `R`, and per-kind cursor/item types); boxing the callbacks keeps
//! `Scheduler` construction free of a distinct closure type per callback
//! field, matching how the teacher stores its `ShutdownHook` trait objects in
//! `kodegen_server_http::Managers` rather than threading a generic per hook.
//!
//! `Flow` is moved into and back out of the future: a plain `&mut Flow`
//! borrow can't be captured by a `'static` boxed future, so handlers take
//! ownership and hand it back alongside their result. `This` is always
//! shared via `Arc` since multiple flows may read it concurrently.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Fetches one page. Returns the (possibly mutated) flow context alongside
/// the fetch result, since `Flow` was moved in.
pub type FetchHandler<This, Flow, Page, R> =
    Arc<dyn Fn(Arc<This>, Flow, Page) -> BoxFuture<'static, (Flow, anyhow::Result<R>)> + Send + Sync>;

/// Resolves some output from a fetched response (e.g. total page count, a
/// has-more flag, the next cursor).
pub type ResolveHandler<This, R, Out> =
    Arc<dyn Fn(Arc<This>, R) -> BoxFuture<'static, anyhow::Result<Out>> + Send + Sync>;

/// Resolves the full item list up front for the `List` pagination kind.
pub type ResolveListHandler<This, I> =
    Arc<dyn Fn(Arc<This>) -> BoxFuture<'static, anyhow::Result<Vec<I>>> + Send + Sync>;

/// Fire-and-forget handler invoked with each fetched response.
///
/// Spawned via `tokio::spawn` and never awaited by the driver (§9): a slow
/// handler can still be running when the next cycle begins. No
/// synchronization barrier is provided between cycles — if `Flow`/`This`
/// carry shared mutable state the handler touches, the caller is responsible
/// for making that safe.
pub type ResponseHandler<This, R> =
    Arc<dyn Fn(Arc<This>, R) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Invoked once per cycle with the finished summary.
pub type SummaryHandler<This> = Arc<
    dyn Fn(Arc<This>, crate::scheduler::summary::CycleSummary) -> BoxFuture<'static, anyhow::Result<()>>
        + Send
        + Sync,
>;

/// Constructs the global context once at scheduler creation, and again at
/// each cycle start if `reset_this_context` is set.
pub type InitThisContext<This> = Arc<dyn Fn() -> anyhow::Result<This> + Send + Sync>;

/// The result of one `init_flow_context` call: a single context (scalar
/// mode) or a non-empty vector (fixed-concurrency mode, which overrides
/// `Options::concurrency`).
pub enum FlowInit<Flow> {
    Scalar(Flow),
    Fixed(Vec<Flow>),
}

/// Constructs or migrates one flow context, optionally given the previous
/// cycle's context in the same slot (`None` on the very first call for a
/// slot, or when topping up newly grown concurrency).
pub type InitFlowContext<This, Flow> =
    Arc<dyn Fn(Arc<This>, Option<Flow>) -> BoxFuture<'static, anyhow::Result<FlowInit<Flow>>> + Send + Sync>;

/// Resolves a configured interval (scalar, range, or function) for a flow, as
/// a raw millisecond count (fractional and negative values are coerced by
/// `IntervalValue::from_signed`, not here). Synchronous and borrow-based:
/// unlike the I/O-bound handlers above, this callback only inspects
/// in-memory state and returns immediately. An `Err` is treated the same as
/// a non-finite result: logged as a `GeneralError` and replaced with the
/// default interval range.
pub type IntervalFn<This, Flow> =
    Arc<dyn Fn(&This, Option<&Flow>) -> anyhow::Result<f64> + Send + Sync>;

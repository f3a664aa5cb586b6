//! The Public Façade (§4.9): `Scheduler`, the single type a caller
//! constructs and drives.
//!
//! Grounded on `crawl_events::bus::CrawlEventBus`'s public shape
//! (`subscribe`, a graceful/forced shutdown pair) layered over the Cycle
//! Loop task spawned by [`Scheduler::start`].

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::config::{self, Options, RawOptions};
use crate::cycle::{self, SharedState};
use crate::error::ConfigError;
use crate::events::{Event, EventBus};

const NOT_STOPPING: u8 = 0;
const STOPPING_GRACEFUL: u8 = 1;
const STOPPING_FORCED: u8 = 2;

/// A running (or idle) cycle scheduler for one pagination configuration.
///
/// Cheaply `Clone`-free by design: all shared state lives behind `Arc`
/// internally, so callers hold a `Scheduler` directly rather than an `Arc`
/// around it, matching how `CrawlEventBus` is held by its owner.
pub struct Scheduler<This, Flow, R, C, I> {
    options: Arc<Options<This, Flow, R, C, I>>,
    event_bus: Arc<EventBus>,
    state: Arc<SharedState<This, Flow>>,
    running: watch::Sender<bool>,
    outer_token: Mutex<CancellationToken>,
    stop_state: AtomicU8,
}

impl<This, Flow, R, C, I> Scheduler<This, Flow, R, C, I>
where
    This: Send + Sync + 'static,
    Flow: Send + 'static,
    R: Send + Sync + Clone + 'static,
    C: Send + Sync + Clone + 'static,
    I: Send + Sync + Clone + 'static,
{
    /// Validate and construct a scheduler. Per §6, only `init_this_context`
    /// erroring is a hard construction failure here: the missing-callback
    /// checks the distilled source performs at runtime (missing
    /// `fetch_handler`, missing kind-specific resolver) are instead enforced
    /// by the Rust type system — `PaginationConfig`'s variants make those
    /// fields mandatory to even construct a value, so there is no runtime
    /// state in which they could be absent.
    pub fn new(raw: RawOptions<This, Flow, R, C, I>) -> Result<Self, ConfigError> {
        let (options, warnings) = config::validate(raw);
        let event_bus = Arc::new(EventBus::new(options.logger.clone()));
        for warning in warnings {
            event_bus.publish(Event::ValidationWarning {
                key: warning.field,
                msg: warning.message,
            });
        }

        let this = (options.init_this_context)().map_err(ConfigError::InitThisContext)?;
        let state = Arc::new(SharedState::new(Arc::new(this), Vec::new()));

        Ok(Self {
            options: Arc::new(options),
            event_bus,
            state,
            running: watch::channel(false).0,
            outer_token: Mutex::new(CancellationToken::new()),
            stop_state: AtomicU8::new(NOT_STOPPING),
        })
    }

    /// Start the cycle loop. Returns `false` if already running.
    pub fn start(&self) -> bool {
        if *self.running.borrow() {
            return false;
        }
        self.stop_state.store(NOT_STOPPING, Ordering::SeqCst);

        let outer_token = CancellationToken::new();
        *self.outer_token.lock() = outer_token.clone();
        // `send` is a no-op when there are no live receivers, which is the
        // common case here (callers don't have to `subscribe()` to `running`
        // to use `start`/`stop`/`is_running`); `send_replace` updates the
        // value unconditionally.
        self.running.send_replace(true);

        let (ready_tx, ready_rx) = oneshot::channel();
        let event_bus_for_ready = Arc::clone(&self.event_bus);
        tokio::spawn(async move {
            if ready_rx.await.is_ok() {
                event_bus_for_ready.publish(Event::Started);
            }
        });

        let state = Arc::clone(&self.state);
        let options = Arc::clone(&self.options);
        let event_bus = Arc::clone(&self.event_bus);
        let running_tx = self.running.clone();
        tokio::spawn(async move {
            cycle::run(state, options, Arc::clone(&event_bus), outer_token, ready_tx).await;
            event_bus.publish(Event::Stopped);
            running_tx.send_replace(false);
        });

        true
    }

    /// `start()` then an immediate graceful `stop()`: exactly one cycle
    /// runs, since a graceful stop only takes effect once the active cycle
    /// (the first) finishes.
    pub async fn start_once(&self) {
        let _ = self.start();
        self.stop(false).await;
    }

    /// Request a stop, graceful or forced, and await the loop task's exit.
    ///
    /// A second call escalating `forced` while a graceful stop is already
    /// underway cancels the per-cycle token directly rather than waiting for
    /// the outer token's cancellation to be noticed between cycles.
    pub async fn stop(&self, forced: bool) {
        if *self.running.borrow() {
            let desired = if forced { STOPPING_FORCED } else { STOPPING_GRACEFUL };
            if self.stop_state.load(Ordering::SeqCst) < desired {
                self.stop_state.store(desired, Ordering::SeqCst);
                self.outer_token.lock().cancel();
                if forced {
                    self.state.current_cycle_token.lock().cancel();
                }
            }
        }

        let mut rx = self.running.subscribe();
        while *rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    #[must_use]
    pub fn options(&self) -> &Options<This, Flow, R, C, I> {
        &self.options
    }

    /// A snapshot of the current global context.
    #[must_use]
    pub fn global_context(&self) -> Arc<This> {
        self.state.this.lock().clone()
    }

    /// The live flow pool. Empty while a cycle's dispatch loop has every
    /// flow checked out; populated between cycles and once the loop is
    /// idle.
    pub fn flows_contexts(&self) -> parking_lot::MutexGuard<'_, Vec<Flow>> {
        self.state.flows.lock()
    }

    /// Subscribe to the event bus (grounded on `CrawlEventBus::subscribe`).
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_bus.subscribe()
    }
}

//! Façade lifecycle and boundary-behavior properties from SPEC_FULL.md §8
//! not already covered by the pagination scenario tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cycle_scheduler::callbacks::FlowInit;
use cycle_scheduler::{CycleSummary, PaginationConfig, RawOptions, Scheduler};
use parking_lot::Mutex;

struct This;

fn init_this() -> cycle_scheduler::callbacks::InitThisContext<This> {
    Arc::new(|| Ok(This))
}

fn init_flow() -> cycle_scheduler::callbacks::InitFlowContext<This, u32> {
    Arc::new(|_this, old| Box::pin(async move { Ok(FlowInit::Scalar(old.unwrap_or(0))) }))
}

fn capture_summary() -> (
    cycle_scheduler::callbacks::SummaryHandler<This>,
    Arc<Mutex<Option<CycleSummary>>>,
) {
    let slot: Arc<Mutex<Option<CycleSummary>>> = Arc::new(Mutex::new(None));
    let slot_for_handler = Arc::clone(&slot);
    let handler = Arc::new(move |_this: Arc<This>, summary: CycleSummary| {
        let slot = Arc::clone(&slot_for_handler);
        Box::pin(async move {
            *slot.lock() = Some(summary);
            Ok(())
        }) as cycle_scheduler::callbacks::BoxFuture<'static, anyhow::Result<()>>
    });
    (handler, slot)
}

fn none_scheduler() -> Scheduler<This, u32, String, String, String> {
    let fetch_handler = Arc::new(|_this: Arc<This>, flow: u32, (): ()| {
        Box::pin(async move { (flow, Ok("x".to_string())) })
            as cycle_scheduler::callbacks::BoxFuture<'static, (u32, anyhow::Result<String>)>
    });
    let raw = RawOptions::<This, u32, String, String, String>::new(
        PaginationConfig::None { fetch_handler },
        init_this(),
        init_flow(),
    );
    Scheduler::new(raw).unwrap()
}

#[tokio::test]
async fn start_twice_returns_true_then_false() {
    let scheduler = none_scheduler();
    assert!(scheduler.start());
    assert!(!scheduler.start());
    scheduler.stop(false).await;
}

#[tokio::test]
async fn stop_on_idle_scheduler_resolves_immediately_with_no_events() {
    let scheduler = none_scheduler();
    let mut events = scheduler.subscribe();
    scheduler.stop(false).await;
    assert!(events.try_recv().is_err(), "no event should have been published");
}

#[tokio::test]
async fn start_once_runs_exactly_one_cycle_with_zero_cycle_interval() {
    let seen: Arc<AtomicU64> = Arc::new(AtomicU64::new(0));
    let seen_for_fetch = Arc::clone(&seen);
    let fetch_handler = Arc::new(move |_this: Arc<This>, flow: u32, (): ()| {
        seen_for_fetch.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { (flow, Ok("x".to_string())) })
            as cycle_scheduler::callbacks::BoxFuture<'static, (u32, anyhow::Result<String>)>
    });
    let mut raw = RawOptions::<This, u32, String, String, String>::new(
        PaginationConfig::None { fetch_handler },
        init_this(),
        init_flow(),
    );
    raw.cycle_interval = Some(cycle_scheduler::config::IntervalSetting::Scalar(0));
    let scheduler = Scheduler::new(raw).unwrap();
    scheduler.start_once().await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stop_false_then_stop_true_escalation_still_terminates() {
    let scheduler = none_scheduler();
    assert!(scheduler.start());
    scheduler.stop(false).await;
    // A second, forced stop on an already-idle scheduler is a no-op that
    // still resolves promptly.
    scheduler.stop(true).await;
    assert!(!scheduler.is_running());
}

#[tokio::test]
async fn retry_limit_zero_places_first_failure_immediately() {
    let fetch_handler = Arc::new(|_this: Arc<This>, flow: u32, (): ()| {
        Box::pin(async move { (flow, Err(anyhow::anyhow!("always fails"))) })
            as cycle_scheduler::callbacks::BoxFuture<'static, (u32, anyhow::Result<String>)>
    });
    let (summary_handler, slot) = capture_summary();
    let mut raw = RawOptions::<This, u32, String, String, String>::new(
        PaginationConfig::None { fetch_handler },
        init_this(),
        init_flow(),
    );
    raw.retry_limit = 0;
    raw.summary_handler = Some(summary_handler);
    let scheduler = Scheduler::new(raw).unwrap();
    scheduler.start_once().await;

    let summary = slot.lock().take().expect("summary_handler ran");
    assert_eq!(summary.failed_page_list, vec![1]);
}

#[tokio::test]
async fn max_total_page_fails_zero_terminates_cycle_on_first_failure() {
    let fetch_handler = Arc::new(|_this: Arc<This>, flow: u32, (): ()| {
        Box::pin(async move { (flow, Err(anyhow::anyhow!("always fails"))) })
            as cycle_scheduler::callbacks::BoxFuture<'static, (u32, anyhow::Result<String>)>
    });
    let (summary_handler, slot) = capture_summary();
    let mut raw = RawOptions::<This, u32, String, String, String>::new(
        PaginationConfig::None { fetch_handler },
        init_this(),
        init_flow(),
    );
    raw.skip_page_if_possible = true;
    raw.max_total_page_fails = 0;
    raw.summary_handler = Some(summary_handler);
    let scheduler = Scheduler::new(raw).unwrap();
    scheduler.start_once().await;

    let summary = slot.lock().take().expect("summary_handler ran");
    assert!(!summary.completed);
    assert_eq!(summary.failed_page_list, vec![1]);
}

#[tokio::test]
async fn pagination_start_zero_is_accepted_verbatim() {
    let first_page: Arc<Mutex<Option<u64>>> = Arc::new(Mutex::new(None));
    let first_page_for_fetch = Arc::clone(&first_page);
    let fetch_handler = Arc::new(move |_this: Arc<This>, flow: u32, page: u64| {
        first_page_for_fetch.lock().get_or_insert(page);
        Box::pin(async move { (flow, Ok(page)) })
            as cycle_scheduler::callbacks::BoxFuture<'static, (u32, anyhow::Result<u64>)>
    });
    let resolve_total_pages = Arc::new(|_this: Arc<This>, _response: u64| {
        Box::pin(async move { Ok(Some(0u64)) })
            as cycle_scheduler::callbacks::BoxFuture<'static, anyhow::Result<Option<u64>>>
    });
    let mut raw = RawOptions::<This, u32, u64, String, String>::new(
        PaginationConfig::TotalPages {
            fetch_handler,
            resolve_total_pages,
        },
        init_this(),
        init_flow(),
    );
    raw.pagination_start = 0;
    let scheduler = Scheduler::new(raw).unwrap();
    scheduler.start_once().await;

    assert_eq!(*first_page.lock(), Some(0));
}

#[tokio::test]
async fn fixed_flow_contexts_pin_concurrency_regardless_of_setting() {
    let dispatched: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
    let dispatched_for_fetch = Arc::clone(&dispatched);
    let fetch_handler = Arc::new(move |_this: Arc<This>, flow: u32, page: u64| {
        dispatched_for_fetch.lock().push(flow);
        Box::pin(async move { (flow, Ok(page)) })
            as cycle_scheduler::callbacks::BoxFuture<'static, (u32, anyhow::Result<u64>)>
    });
    let resolve_total_pages = Arc::new(|_this: Arc<This>, _response: u64| {
        Box::pin(async move { Ok(Some(6u64)) })
            as cycle_scheduler::callbacks::BoxFuture<'static, anyhow::Result<Option<u64>>>
    });
    let init_flow_fixed: cycle_scheduler::callbacks::InitFlowContext<This, u32> =
        Arc::new(|_this, _old| Box::pin(async move { Ok(FlowInit::Fixed(vec![10, 20, 30])) }));

    let (summary_handler, slot) = capture_summary();
    let mut raw = RawOptions::<This, u32, u64, String, String>::new(
        PaginationConfig::TotalPages {
            fetch_handler,
            resolve_total_pages,
        },
        init_this(),
        init_flow_fixed,
    );
    raw.concurrency = 1; // the Fixed result overrides this
    raw.summary_handler = Some(summary_handler);
    let scheduler = Scheduler::new(raw).unwrap();
    scheduler.start_once().await;

    let summary = slot.lock().take().expect("summary_handler ran");
    assert!(summary.completed);
    let flows_used: std::collections::HashSet<u32> = dispatched.lock().iter().copied().collect();
    assert_eq!(flows_used, [10, 20, 30].into_iter().collect());
}

//! End-to-end scenarios exercising each pagination kind through the public
//! façade (`Scheduler::start_once`), one cycle at a time.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
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

/// Wires a `summary_handler` that stashes the single cycle's summary for the
/// test to inspect after `start_once` returns.
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

#[tokio::test]
async fn none_pagination_succeeds_in_one_page() {
    let fetch_handler = Arc::new(|_this: Arc<This>, flow: u32, (): ()| {
        Box::pin(async move { (flow, Ok("x".to_string())) })
            as cycle_scheduler::callbacks::BoxFuture<'static, (u32, anyhow::Result<String>)>
    });

    let (summary_handler, slot) = capture_summary();
    let mut raw = RawOptions::<This, u32, String, String, String>::new(
        PaginationConfig::None { fetch_handler },
        init_this(),
        init_flow(),
    );
    raw.summary_handler = Some(summary_handler);

    let scheduler = Scheduler::new(raw).unwrap();
    scheduler.start_once().await;

    let summary = slot.lock().take().expect("summary_handler ran");
    assert!(summary.completed);
    assert_eq!(summary.total_page_count, 1);
    assert!(summary.failed_page_list.is_empty());
    assert_eq!(summary.total_error_count, 0);
}

#[tokio::test]
async fn total_pages_concurrency_three_dispatches_every_page_exactly_once() {
    let seen: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_for_fetch = Arc::clone(&seen);
    let fetch_handler = Arc::new(move |_this: Arc<This>, flow: u32, page: u64| {
        seen_for_fetch.lock().push(page);
        Box::pin(async move { (flow, Ok(page)) })
            as cycle_scheduler::callbacks::BoxFuture<'static, (u32, anyhow::Result<u64>)>
    });
    let resolve_total_pages = Arc::new(|_this: Arc<This>, _response: u64| {
        Box::pin(async move { Ok(Some(5u64)) })
            as cycle_scheduler::callbacks::BoxFuture<'static, anyhow::Result<Option<u64>>>
    });

    let (summary_handler, slot) = capture_summary();
    let mut raw = RawOptions::<This, u32, u64, String, String>::new(
        PaginationConfig::TotalPages {
            fetch_handler,
            resolve_total_pages,
        },
        init_this(),
        init_flow(),
    );
    raw.concurrency = 3;
    raw.summary_handler = Some(summary_handler);

    let scheduler = Scheduler::new(raw).unwrap();
    scheduler.start_once().await;

    let summary = slot.lock().take().expect("summary_handler ran");
    assert!(summary.completed);
    assert_eq!(summary.total_page_count, 5);
    assert!(summary.failed_page_list.is_empty());

    let mut pages = seen.lock().clone();
    pages.sort_unstable();
    pages.dedup();
    assert_eq!(pages, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn has_more_concurrency_two_stops_after_fourth_page() {
    let dispatched: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
    let dispatched_for_fetch = Arc::clone(&dispatched);
    let fetch_handler = Arc::new(move |_this: Arc<This>, flow: u32, page: u64| {
        dispatched_for_fetch.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { (flow, Ok(page)) })
            as cycle_scheduler::callbacks::BoxFuture<'static, (u32, anyhow::Result<u64>)>
    });
    let resolve_has_more = Arc::new(|_this: Arc<This>, page: u64| {
        Box::pin(async move { Ok(page < 4) })
            as cycle_scheduler::callbacks::BoxFuture<'static, anyhow::Result<bool>>
    });

    let (summary_handler, slot) = capture_summary();
    let mut raw = RawOptions::<This, u32, u64, String, String>::new(
        PaginationConfig::HasMore {
            fetch_handler,
            resolve_has_more,
        },
        init_this(),
        init_flow(),
    );
    raw.concurrency = 2;
    raw.summary_handler = Some(summary_handler);

    let scheduler = Scheduler::new(raw).unwrap();
    scheduler.start_once().await;

    let summary = slot.lock().take().expect("summary_handler ran");
    assert!(summary.completed);
    // With concurrency 2, a slot can optimistically fetch one page past the
    // boundary before the page resolving `has_more: false` is processed.
    assert!(summary.total_page_count >= 4, "expected at least 4 pages, got {}", summary.total_page_count);
    assert!(summary.failed_page_list.is_empty());
}

#[tokio::test]
async fn total_pages_retry_distinct_flows_exhausts_always_failing_page() {
    let attempts_on_page_two: Arc<AtomicU64> = Arc::new(AtomicU64::new(0));
    let attempts_for_fetch = Arc::clone(&attempts_on_page_two);
    let flows_seen_for_page_two: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
    let flows_for_fetch = Arc::clone(&flows_seen_for_page_two);
    let fetch_handler = Arc::new(move |_this: Arc<This>, flow: u32, page: u64| {
        if page == 2 {
            attempts_for_fetch.fetch_add(1, Ordering::SeqCst);
            flows_for_fetch.lock().push(flow);
        }
        Box::pin(async move { (flow, Ok(page)) })
            as cycle_scheduler::callbacks::BoxFuture<'static, (u32, anyhow::Result<u64>)>
    });
    let resolve_total_pages = Arc::new(|_this: Arc<This>, page: u64| {
        Box::pin(async move {
            if page == 2 {
                Err(anyhow::anyhow!("page 2 always errors"))
            } else {
                Ok(Some(3u64))
            }
        }) as cycle_scheduler::callbacks::BoxFuture<'static, anyhow::Result<Option<u64>>>
    });

    let flow_counter = Arc::new(AtomicU64::new(0));
    let distinct_init_flow: cycle_scheduler::callbacks::InitFlowContext<This, u32> =
        Arc::new(move |_this, _old| {
            let flow_counter = Arc::clone(&flow_counter);
            Box::pin(async move { Ok(FlowInit::Scalar(flow_counter.fetch_add(1, Ordering::SeqCst) as u32)) })
        });

    let (summary_handler, slot) = capture_summary();
    let mut raw = RawOptions::<This, u32, u64, String, String>::new(
        PaginationConfig::TotalPages {
            fetch_handler,
            resolve_total_pages,
        },
        init_this(),
        distinct_init_flow,
    );
    raw.concurrency = 3;
    raw.retry_limit = 2;
    raw.retry_distinct_flows = true;
    raw.skip_page_if_possible = true;
    raw.summary_handler = Some(summary_handler);

    let scheduler = Scheduler::new(raw).unwrap();
    scheduler.start_once().await;

    let summary = slot.lock().take().expect("summary_handler ran");
    assert_eq!(summary.failed_page_list, vec![2]);
    assert_eq!(attempts_on_page_two.load(Ordering::SeqCst), 3);
    let distinct_flows: std::collections::HashSet<u32> =
        flows_seen_for_page_two.lock().iter().copied().collect();
    assert_eq!(distinct_flows.len(), 3, "each retry ran on a distinct flow");
    assert!(summary.completed, "skip_page_if_possible permits completion despite the exhausted page");
}

#[tokio::test]
async fn cursor_pagination_follows_chain_to_natural_end() {
    let fetch_handler = Arc::new(|_this: Arc<This>, flow: u32, (cursor, _page_num): (Option<String>, u64)| {
        Box::pin(async move { (flow, Ok(cursor)) })
            as cycle_scheduler::callbacks::BoxFuture<'static, (u32, anyhow::Result<Option<String>>)>
    });
    let calls: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let calls_for_resolve = Arc::clone(&calls);
    let resolve_cursor = Arc::new(move |_this: Arc<This>, response: Option<String>| {
        calls_for_resolve.lock().push(response.clone());
        let next = match response.as_deref() {
            None => Some("a".to_string()),
            Some("a") => Some("b".to_string()),
            Some("b") => None,
            Some(_) => None,
        };
        Box::pin(async move { Ok(next) })
            as cycle_scheduler::callbacks::BoxFuture<'static, anyhow::Result<Option<String>>>
    });

    let (summary_handler, slot) = capture_summary();
    let mut raw = RawOptions::<This, u32, Option<String>, String, String>::new(
        PaginationConfig::Cursor {
            fetch_handler,
            resolve_cursor,
        },
        init_this(),
        init_flow(),
    );
    raw.summary_handler = Some(summary_handler);

    let scheduler = Scheduler::new(raw).unwrap();
    scheduler.start_once().await;

    let summary = slot.lock().take().expect("summary_handler ran");
    assert!(summary.completed);
    assert_eq!(summary.total_page_count, 3);
    let calls = calls.lock().clone();
    assert_eq!(calls, vec![None, Some("a".to_string()), Some("b".to_string())]);
}

#[tokio::test]
async fn list_pagination_retries_one_failing_item_then_succeeds() {
    let attempts_on_v: Arc<AtomicU64> = Arc::new(AtomicU64::new(0));
    let attempts_for_fetch = Arc::clone(&attempts_on_v);
    let resolve_list = Arc::new(|_this: Arc<This>| {
        Box::pin(async move { Ok(vec!["u".to_string(), "v".to_string(), "w".to_string()]) })
            as cycle_scheduler::callbacks::BoxFuture<'static, anyhow::Result<Vec<String>>>
    });
    let fetch_handler = Arc::new(move |_this: Arc<This>, flow: u32, (item, _idx): (String, usize)| {
        let attempts_for_fetch = Arc::clone(&attempts_for_fetch);
        Box::pin(async move {
            if item == "v" {
                let n = attempts_for_fetch.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    return (flow, Err(anyhow::anyhow!("transient failure on v")));
                }
            }
            (flow, Ok(item))
        }) as cycle_scheduler::callbacks::BoxFuture<'static, (u32, anyhow::Result<String>)>
    });

    let (summary_handler, slot) = capture_summary();
    let mut raw = RawOptions::<This, u32, String, String, String>::new(
        PaginationConfig::List {
            fetch_handler,
            resolve_list,
        },
        init_this(),
        init_flow(),
    );
    raw.retry_limit = 1;
    raw.summary_handler = Some(summary_handler);

    let scheduler = Scheduler::new(raw).unwrap();
    scheduler.start_once().await;

    let summary = slot.lock().take().expect("summary_handler ran");
    assert!(summary.completed);
    assert_eq!(summary.total_page_count, 3);
    assert!(summary.failed_page_list.is_empty());
    assert_eq!(summary.total_error_count, 1);
    assert_eq!(attempts_on_v.load(Ordering::SeqCst), 2);
}

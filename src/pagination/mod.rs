//! Pagination kinds and the per-kind callback records they require.
//!
//! §9's "dynamic callback shapes" design note: rather than one loosely typed
//! callback bag, each kind is a variant carrying its own strongly-typed
//! record. The scheduler is generic over the response type `R` the
//! `fetch_handler` produces and, for `Cursor`/`List`, the cursor/item types
//! `C`/`I`.

mod cursor;
mod has_more;
mod list;
mod none;
mod total_pages;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::callbacks::{FetchHandler, ResolveHandler, ResolveListHandler};
use crate::config::Options;
use crate::events::EventBus;
use crate::scheduler::summary::CycleSummary;

/// The callback record and kind-specific state required by each pagination
/// strategy.
pub enum PaginationConfig<This, Flow, R, C, I> {
    /// Fixed one-page cycle; concurrency is forced to 1.
    None { fetch_handler: FetchHandler<This, Flow, (), R> },

    /// Total page count discovered from the first response(s).
    TotalPages {
        fetch_handler: FetchHandler<This, Flow, u64, R>,
        resolve_total_pages: ResolveHandler<This, R, Option<u64>>,
    },

    /// Terminates when a resolver reports no more pages.
    HasMore {
        fetch_handler: FetchHandler<This, Flow, u64, R>,
        resolve_has_more: ResolveHandler<This, R, bool>,
    },

    /// Sequential, cursor-chained pagination; concurrency is forced to 1.
    Cursor {
        fetch_handler: FetchHandler<This, Flow, (Option<C>, u64), R>,
        resolve_cursor: ResolveHandler<This, R, Option<C>>,
    },

    /// A fixed, up-front list of items to fetch.
    List {
        fetch_handler: FetchHandler<This, Flow, (I, usize), R>,
        resolve_list: ResolveListHandler<This, I>,
    },
}

impl<This, Flow, R, C, I> PaginationConfig<This, Flow, R, C, I> {
    /// Whether this kind honors `Options::concurrency` at all (§3: "only
    /// meaningful for TotalPages, HasMore, List").
    #[must_use]
    pub(crate) fn supports_concurrency(&self) -> bool {
        matches!(self, Self::TotalPages { .. } | Self::HasMore { .. } | Self::List { .. })
    }

    #[must_use]
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::None { .. } => "None",
            Self::TotalPages { .. } => "TotalPages",
            Self::HasMore { .. } => "HasMore",
            Self::Cursor { .. } => "Cursor",
            Self::List { .. } => "List",
        }
    }

    /// Dispatch one cycle to the driver matching this pagination kind.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn run_cycle(
        &self,
        this: Arc<This>,
        flows: Vec<Flow>,
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
        I: Send + Sync + Clone + 'static,
    {
        match self {
            Self::None { fetch_handler } => {
                none::run_none_cycle(this, flows, fetch_handler.clone(), options, event_bus, token, started_at_ms)
                    .await
            }
            Self::TotalPages {
                fetch_handler,
                resolve_total_pages,
            } => {
                total_pages::run_total_pages_cycle(
                    this,
                    flows,
                    fetch_handler.clone(),
                    resolve_total_pages.clone(),
                    options,
                    event_bus,
                    token,
                    started_at_ms,
                )
                .await
            }
            Self::HasMore {
                fetch_handler,
                resolve_has_more,
            } => {
                has_more::run_has_more_cycle(
                    this,
                    flows,
                    fetch_handler.clone(),
                    resolve_has_more.clone(),
                    options,
                    event_bus,
                    token,
                    started_at_ms,
                )
                .await
            }
            Self::Cursor {
                fetch_handler,
                resolve_cursor,
            } => {
                cursor::run_cursor_cycle(
                    this,
                    flows,
                    fetch_handler.clone(),
                    resolve_cursor.clone(),
                    options,
                    event_bus,
                    token,
                    started_at_ms,
                )
                .await
            }
            Self::List {
                fetch_handler,
                resolve_list,
            } => {
                list::run_list_cycle(
                    this,
                    flows,
                    fetch_handler.clone(),
                    resolve_list.clone(),
                    options,
                    event_bus,
                    token,
                    started_at_ms,
                )
                .await
            }
        }
    }
}

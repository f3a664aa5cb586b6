//! Event and log-category types published by the scheduler's event bus.

use crate::scheduler::summary::CycleSummary;
use std::fmt;
use std::sync::Arc;

/// A log/telemetry category a user may enable independently via
/// `Options::logger`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    ValidationWarning,
    GeneralError,
    FetchError,
    ResolveError,
    ResponseHandleError,
    SummaryHandleError,
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ValidationWarning => "ValidationWarning",
            Self::GeneralError => "GeneralError",
            Self::FetchError => "FetchError",
            Self::ResolveError => "ResolveError",
            Self::ResponseHandleError => "ResponseHandleError",
            Self::SummaryHandleError => "SummaryHandleError",
        };
        f.write_str(s)
    }
}

/// Every event the scheduler's façade can publish.
///
/// Cloned cheaply: error payloads are wrapped in `Arc` since `anyhow::Error`
/// is not `Clone` and `broadcast::Sender::send` requires `Clone`.
#[derive(Debug, Clone)]
pub enum Event {
    /// The cycle loop has started.
    Started,
    /// The cycle loop has fully exited.
    Stopped,
    /// One cycle finished; carries its immutable summary.
    CycleSummary(CycleSummary),
    /// An option field failed validation and was defaulted.
    ValidationWarning { key: &'static str, msg: String },
    /// A fatal runtime error forced the scheduler to stop.
    GeneralError(Arc<anyhow::Error>),
    /// `fetch_handler` returned an error for a page.
    FetchError(Arc<anyhow::Error>),
    /// A pagination resolver returned an error.
    ResolveError(Arc<anyhow::Error>),
    /// `response_handler` returned an error.
    ResponseHandleError(Arc<anyhow::Error>),
    /// `summary_handler` returned an error.
    SummaryHandleError(Arc<anyhow::Error>),
}

/// `Options::logger` — controls which categories are printed via the `log`
/// facade. Events are always published on the bus regardless of this policy.
#[derive(Debug, Clone)]
pub enum LoggerPolicy {
    /// Print nothing.
    Disabled,
    /// Print every category.
    All,
    /// Print only the listed categories.
    Categories(std::collections::HashSet<LogCategory>),
}

impl Default for LoggerPolicy {
    /// §6 default: `[ValidationWarning, GeneralError]`.
    fn default() -> Self {
        Self::Categories(
            [LogCategory::ValidationWarning, LogCategory::GeneralError]
                .into_iter()
                .collect(),
        )
    }
}

impl LoggerPolicy {
    #[must_use]
    pub fn enables(&self, category: LogCategory) -> bool {
        match self {
            Self::Disabled => false,
            Self::All => true,
            Self::Categories(set) => set.contains(&category),
        }
    }
}

impl Event {
    /// The log category this event belongs to, if any (`Started`/`Stopped`/
    /// `CycleSummary` are always emitted and never gated by the logger
    /// policy, since §6 only lists log categories for the error/warning
    /// events).
    #[must_use]
    pub fn category(&self) -> Option<LogCategory> {
        match self {
            Self::Started | Self::Stopped | Self::CycleSummary(_) => None,
            Self::ValidationWarning { .. } => Some(LogCategory::ValidationWarning),
            Self::GeneralError(_) => Some(LogCategory::GeneralError),
            Self::FetchError(_) => Some(LogCategory::FetchError),
            Self::ResolveError(_) => Some(LogCategory::ResolveError),
            Self::ResponseHandleError(_) => Some(LogCategory::ResponseHandleError),
            Self::SummaryHandleError(_) => Some(LogCategory::SummaryHandleError),
        }
    }
}

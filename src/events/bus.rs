//! Typed event bus for the scheduler's public façade.
//!
//! A thin wrapper over `tokio::sync::broadcast`, grounded on
//! `crawl_events::bus::CrawlEventBus`: publishers never block on slow
//! subscribers (lagging receivers just miss older events, surfaced as a
//! `RecvError::Lagged` the caller can observe on `recv()`), and every publish
//! is also mirrored through the `log` facade when the active `LoggerPolicy`
//! enables that event's category.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use super::types::{Event, LoggerPolicy};

const DEFAULT_CAPACITY: usize = 256;

/// Publishes [`Event`]s to any number of subscribers and mirrors them to the
/// `log` facade according to a [`LoggerPolicy`].
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    logger: LoggerPolicy,
    published: AtomicU64,
}

impl EventBus {
    #[must_use]
    pub fn new(logger: LoggerPolicy) -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self {
            sender,
            logger,
            published: AtomicU64::new(0),
        }
    }

    /// Subscribe to future events. Events published before this call are not
    /// replayed.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Number of events published on this bus so far.
    #[must_use]
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Publish an event: mirror it to `log` if enabled, then broadcast it.
    /// A send with zero subscribers is not an error — the façade may publish
    /// `Started` before any caller has subscribed.
    pub fn publish(&self, event: Event) {
        self.log_if_enabled(&event);
        self.published.fetch_add(1, Ordering::Relaxed);
        let _ = self.sender.send(event);
    }

    fn log_if_enabled(&self, event: &Event) {
        let Some(category) = event.category() else {
            return;
        };
        if !self.logger.enables(category) {
            return;
        }
        match event {
            Event::ValidationWarning { key, msg } => {
                log::warn!("[ValidationWarning] {key}: {msg}");
            }
            Event::GeneralError(err) => log::error!("[GeneralError] {err}"),
            Event::FetchError(err) => log::warn!("[FetchError] {err}"),
            Event::ResolveError(err) => log::warn!("[ResolveError] {err}"),
            Event::ResponseHandleError(err) => log::warn!("[ResponseHandleError] {err}"),
            Event::SummaryHandleError(err) => log::warn!("[SummaryHandleError] {err}"),
            Event::Started | Event::Stopped | Event::CycleSummary(_) => {}
        }
    }

    /// Convenience for publishing an `anyhow::Error` wrapped event.
    pub fn publish_error(&self, make: impl FnOnce(Arc<anyhow::Error>) -> Event, err: anyhow::Error) {
        self.publish(make(Arc::new(err)));
    }
}

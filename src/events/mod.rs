//! Event bus for scheduler lifecycle and telemetry events.

pub mod bus;
pub mod types;

pub use bus::EventBus;
pub use types::{Event, LogCategory, LoggerPolicy};

//! Built-in event listeners
//!
//! - [`EventLogger`]: writes events to the `tracing` log
//! - [`MockEventListener`]: captures events for testing and assertions

pub mod event_logger;
pub mod mock_listener;

pub use event_logger::EventLogger;
pub use mock_listener::{CapturedEvents, MockEventListener};

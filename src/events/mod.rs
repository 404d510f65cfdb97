//! Event system for wallet state changes
//!
//! The wallet emits a [`WalletEvent`] whenever it records, spends or
//! invalidates something. Listeners registered with the [`EventDispatcher`]
//! receive every event in registration order; a failing listener is logged and
//! skipped without affecting the others or the wallet operation that emitted
//! the event.

pub mod listeners;
pub mod types;

use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error as ThisError;
use tracing::{debug, warn};

pub use types::WalletEvent;

/// Errors raised while registering listeners
#[derive(Debug, Clone, ThisError, PartialEq, Eq)]
pub enum EventDispatcherError {
    #[error("Listener name must not be empty")]
    InvalidListenerName(String),

    #[error("Listener '{0}' is already registered")]
    DuplicateListener(String),

    #[error("Too many listeners: {current} registered, maximum {max}")]
    TooManyListeners { current: usize, max: usize },
}

/// Statistics about event dispatching
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    pub total_events_dispatched: usize,
    pub total_listener_calls: usize,
    pub total_listener_errors: usize,
    pub total_processing_time: Duration,
    pub events_by_type: HashMap<String, usize>,
    pub errors_by_listener: HashMap<String, usize>,
}

/// Trait for handling wallet events asynchronously
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Handle a wallet event
    ///
    /// Errors are logged but do not interrupt the wallet or other listeners.
    async fn handle_event(
        &mut self,
        event: &WalletEvent,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Name used for logging and duplicate detection
    fn name(&self) -> &'static str;

    /// Check if this listener should receive events of a specific type
    fn wants_event(&self, _event: &WalletEvent) -> bool {
        true
    }
}

/// Delivers events to registered listeners
#[derive(Default)]
pub struct EventDispatcher {
    listeners: Vec<Box<dyn EventListener>>,
    registered_names: HashSet<String>,
    max_listeners: Option<usize>,
    stats: EventStats,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_listeners(mut self, max: usize) -> Self {
        self.max_listeners = Some(max);
        self
    }

    /// Register a listener; names must be unique
    pub fn register(&mut self, listener: Box<dyn EventListener>) -> Result<(), EventDispatcherError> {
        let listener_name = listener.name().to_string();
        if listener_name.trim().is_empty() {
            return Err(EventDispatcherError::InvalidListenerName(listener_name));
        }
        if self.registered_names.contains(&listener_name) {
            return Err(EventDispatcherError::DuplicateListener(listener_name));
        }
        if let Some(max) = self.max_listeners {
            if self.listeners.len() >= max {
                return Err(EventDispatcherError::TooManyListeners {
                    current: self.listeners.len(),
                    max,
                });
            }
        }

        debug!(listener = %listener_name, "registered event listener");
        self.registered_names.insert(listener_name);
        self.listeners.push(listener);
        Ok(())
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn stats(&self) -> &EventStats {
        &self.stats
    }

    /// Deliver `event` to every interested listener
    pub async fn dispatch(&mut self, event: WalletEvent) {
        let dispatch_start = Instant::now();
        self.stats.total_events_dispatched += 1;
        *self
            .stats
            .events_by_type
            .entry(event.event_type().to_string())
            .or_insert(0) += 1;

        for listener in &mut self.listeners {
            if !listener.wants_event(&event) {
                continue;
            }
            self.stats.total_listener_calls += 1;
            if let Err(e) = listener.handle_event(&event).await {
                self.stats.total_listener_errors += 1;
                *self
                    .stats
                    .errors_by_listener
                    .entry(listener.name().to_string())
                    .or_insert(0) += 1;
                warn!(
                    listener = listener.name(),
                    event = event.event_type(),
                    error = %e,
                    "event listener failed"
                );
            }
        }

        self.stats.total_processing_time += dispatch_start.elapsed();
    }

    pub async fn dispatch_all(&mut self, events: Vec<WalletEvent>) {
        for event in events {
            self.dispatch(event).await;
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.registered_names)
            .field("events_dispatched", &self.stats.total_events_dispatched)
            .finish()
    }
}

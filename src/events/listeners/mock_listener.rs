//! Mock event listener for testing scenarios
//!
//! Captures every event it receives behind a shared handle so tests can make
//! assertions after handing the listener to a dispatcher or wallet.

use std::error::Error;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::events::{EventListener, WalletEvent};

/// Shared view of the events a [`MockEventListener`] captured
#[derive(Debug, Clone, Default)]
pub struct CapturedEvents {
    events: Arc<Mutex<Vec<WalletEvent>>>,
}

impl CapturedEvents {
    pub fn events(&self) -> Vec<WalletEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count_of(&self, event_type: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }

    pub fn last(&self) -> Option<WalletEvent> {
        self.events().last().cloned()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

#[derive(Debug, Default)]
pub struct MockEventListener {
    captured: CapturedEvents,
    /// Event types to capture (None means capture all)
    event_type_filter: Option<Vec<&'static str>>,
    /// Fail on these event types, for error isolation tests
    fail_on_event_types: Vec<&'static str>,
}

impl MockEventListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capture_only(mut self, event_types: Vec<&'static str>) -> Self {
        self.event_type_filter = Some(event_types);
        self
    }

    pub fn fail_on(mut self, event_types: Vec<&'static str>) -> Self {
        self.fail_on_event_types = event_types;
        self
    }

    /// Handle that stays valid after the listener is moved into a dispatcher
    pub fn captured(&self) -> CapturedEvents {
        self.captured.clone()
    }
}

#[async_trait]
impl EventListener for MockEventListener {
    async fn handle_event(
        &mut self,
        event: &WalletEvent,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        if self.fail_on_event_types.contains(&event.event_type()) {
            return Err(format!("mock failure on {}", event.event_type()).into());
        }
        self.captured
            .events
            .lock()
            .map_err(|_| "captured events lock poisoned")?
            .push(event.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    fn wants_event(&self, event: &WalletEvent) -> bool {
        self.event_type_filter
            .as_ref()
            .map_or(true, |types| types.contains(&event.event_type()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventDispatcher;

    #[tokio::test]
    async fn test_filter_and_failure() {
        let mut dispatcher = EventDispatcher::new();
        let mock = MockEventListener::new().capture_only(vec!["BlockProcessed"]);
        let captured = mock.captured();
        dispatcher.register(Box::new(mock)).unwrap();

        dispatcher
            .dispatch(WalletEvent::BlockDisconnected { height: 1 })
            .await;
        dispatcher
            .dispatch(WalletEvent::BlockProcessed {
                height: 1,
                outputs_found: 2,
                outputs_spent: 0,
            })
            .await;
        assert_eq!(captured.events().len(), 1);
        assert_eq!(captured.count_of("BlockProcessed"), 1);

        let mut failing = MockEventListener::new().fail_on(vec!["BlockDisconnected"]);
        let event = WalletEvent::BlockDisconnected { height: 1 };
        assert!(failing.handle_event(&event).await.is_err());
        assert!(failing.captured().events().is_empty());
    }
}

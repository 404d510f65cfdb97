//! Listener that writes every wallet event to the `tracing` log

use std::error::Error;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::events::{EventListener, WalletEvent};

/// Logs events at `info`, invalidations and discards at `warn`
#[derive(Debug, Clone, Default)]
pub struct EventLogger {
    /// Log events as JSON instead of their display form
    json: bool,
    events_logged: u64,
}

impl EventLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json() -> Self {
        Self {
            json: true,
            events_logged: 0,
        }
    }

    pub fn events_logged(&self) -> u64 {
        self.events_logged
    }
}

#[async_trait]
impl EventListener for EventLogger {
    async fn handle_event(
        &mut self,
        event: &WalletEvent,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let message = if self.json {
            event.to_compact_json()?
        } else {
            event.to_string()
        };
        match event {
            WalletEvent::RingInvalidated { .. } | WalletEvent::TransactionDiscarded { .. } => {
                warn!(event = event.event_type(), "{message}")
            }
            _ => info!(event = event.event_type(), "{message}"),
        }
        self.events_logged += 1;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "EventLogger"
    }
}

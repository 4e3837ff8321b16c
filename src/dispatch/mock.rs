//! Recording sink for tests.

use super::{DispatchError, EventSink, OutboundEvent};
use async_trait::async_trait;
use std::sync::Mutex;

/// Keeps every emitted event in memory. A failing recorder rejects every
/// event and records nothing.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<OutboundEvent>>,
    fail: bool,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn events(&self) -> Vec<OutboundEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(OutboundEvent::kind).collect()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn emit(&self, event: OutboundEvent) -> Result<(), DispatchError> {
        if self.fail {
            return Err(DispatchError::Other("recording sink set to fail".to_string()));
        }
        self.events
            .lock()
            .map_err(|_| DispatchError::Other("recording sink poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}

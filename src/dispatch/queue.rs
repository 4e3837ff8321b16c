//! In-process queue between the core and the delivery worker.

use super::{DispatchError, EventSink, OutboundEvent};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Enqueues events without waiting for delivery.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::Sender<OutboundEvent>,
}

impl ChannelEventSink {
    /// Bounded queue; `emit` fails fast with `QueueFull` instead of blocking.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<OutboundEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn emit(&self, event: OutboundEvent) -> Result<(), DispatchError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })
    }
}

/// Drain `rx` into `target` until every sender is dropped.
pub fn spawn_dispatch_worker(
    mut rx: mpsc::Receiver<OutboundEvent>,
    target: Arc<dyn EventSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut delivered = 0u64;
        let mut failed = 0u64;
        while let Some(event) = rx.recv().await {
            let kind = event.kind();
            match target.emit(event).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    warn!(event = kind, error = %e, "outbound delivery failed");
                }
            }
        }
        info!(delivered, failed, "dispatch worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::RecordingEventSink;
    use crate::domain::TimeMs;

    fn otp_event(user: &str) -> OutboundEvent {
        OutboundEvent::WithdrawalOtpIssued {
            user_id: user.to_string(),
            code: "123456".to_string(),
            expires_at: TimeMs::new(0),
        }
    }

    #[tokio::test]
    async fn test_worker_delivers_in_order() {
        let (sink, rx) = ChannelEventSink::new(8);
        let recorder = Arc::new(RecordingEventSink::new());
        let handle = spawn_dispatch_worker(rx, recorder.clone());

        sink.emit(otp_event("a")).await.unwrap();
        sink.emit(otp_event("b")).await.unwrap();
        drop(sink);
        handle.await.unwrap();

        assert_eq!(recorder.events(), vec![otp_event("a"), otp_event("b")]);
    }

    #[tokio::test]
    async fn test_full_queue_fails_fast() {
        let (sink, _rx) = ChannelEventSink::new(1);
        sink.emit(otp_event("a")).await.unwrap();
        assert_eq!(sink.emit(otp_event("b")).await, Err(DispatchError::QueueFull));
    }

    #[tokio::test]
    async fn test_closed_queue() {
        let (sink, rx) = ChannelEventSink::new(1);
        drop(rx);
        assert_eq!(sink.emit(otp_event("a")).await, Err(DispatchError::Closed));
    }
}

//! Outbound side effects.
//!
//! The settlement core never talks to notification or marketing systems
//! directly; it emits [`OutboundEvent`]s to an [`EventSink`]. Delivery is
//! best-effort and never feeds back into a settlement decision.

use crate::domain::{Decimal, SaleStatus, TimeMs, WithdrawalStatus};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

pub mod http;
pub mod mock;
pub mod queue;

pub use http::HttpEventSink;
pub use mock::RecordingEventSink;
pub use queue::{spawn_dispatch_worker, ChannelEventSink};

/// Event emitted by the core after a committed state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    SaleStatusChanged {
        sale_id: String,
        product_id: String,
        seller_user_id: String,
        buyer_email: String,
        previous_status: SaleStatus,
        status: SaleStatus,
        amount: Decimal,
        occurred_at: TimeMs,
    },
    AnticipationCompleted {
        anticipation_id: String,
        user_id: String,
        total_original: Decimal,
        fee_amount: Decimal,
        total_anticipated: Decimal,
    },
    WithdrawalRequested {
        withdrawal_id: String,
        user_id: String,
        amount: Decimal,
        net_amount: Decimal,
        status: WithdrawalStatus,
    },
    AdminWithdrawalPending {
        withdrawal_id: String,
        user_id: String,
        amount: Decimal,
    },
    /// Carries the plaintext code; only the delivery channel ever sees it.
    WithdrawalOtpIssued {
        user_id: String,
        code: String,
        expires_at: TimeMs,
    },
}

impl OutboundEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundEvent::SaleStatusChanged { .. } => "sale_status_changed",
            OutboundEvent::AnticipationCompleted { .. } => "anticipation_completed",
            OutboundEvent::WithdrawalRequested { .. } => "withdrawal_requested",
            OutboundEvent::AdminWithdrawalPending { .. } => "admin_withdrawal_pending",
            OutboundEvent::WithdrawalOtpIssued { .. } => "withdrawal_otp_issued",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("http error {status}: {message}")]
    Http { status: u16, message: String },
    #[error("dispatch queue full")]
    QueueFull,
    #[error("dispatch queue closed")]
    Closed,
    #[error("dispatch error: {0}")]
    Other(String),
}

/// Destination for outbound events.
#[async_trait]
pub trait EventSink: Send + Sync + fmt::Debug {
    async fn emit(&self, event: OutboundEvent) -> Result<(), DispatchError>;
}

/// Emit and swallow failures. Side effects must never fail the caller.
pub async fn emit_best_effort(sink: &dyn EventSink, event: OutboundEvent) {
    let kind = event.kind();
    if let Err(e) = sink.emit(event).await {
        warn!(event = kind, error = %e, "outbound event dropped");
    }
}

/// Sink used when no delivery endpoint is configured.
#[derive(Debug, Clone, Default)]
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    async fn emit(&self, event: OutboundEvent) -> Result<(), DispatchError> {
        // The OTP code itself is never written to the log.
        info!(event = event.kind(), "outbound event (no delivery endpoint)");
        Ok(())
    }
}

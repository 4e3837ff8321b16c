//! Gateway vocabulary → canonical sale status, and the transition priority table.
//!
//! Gateways disagree on naming (`PAYMENT_CONFIRMED`, `transaction.paid`,
//! `charged_back`, ...). Raw strings are first parsed into the closed
//! [`GatewaySignal`] set and only then mapped, so every accepted spelling is
//! visible in one match.

use crate::domain::SaleStatus;

/// Every gateway status/event spelling this service understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewaySignal {
    Paid,
    Approved,
    Confirmed,
    Received,
    Completed,
    Authorized,
    Settled,
    Pending,
    WaitingPayment,
    Processing,
    Created,
    InAnalysis,
    Refused,
    Declined,
    Failed,
    Denied,
    Refunded,
    Chargeback,
    Disputed,
    Cancelled,
    Voided,
    Expired,
    Overdue,
    /// Refund asked for but not yet paid back.
    RefundRequested,
    /// Chargeback dispute opened; the issuer has not ruled.
    DisputeOpened,
    /// Anything else. Maps to `pending`, never dropped.
    Unrecognized(String),
}

impl GatewaySignal {
    /// Parse a raw gateway string, case-insensitively.
    ///
    /// Separators (`.`, `-`, space) are normalised to `_`. The whole string is
    /// tried first, then ever shorter `_`-separated suffixes, so
    /// `payment.refunded` and `PAYMENT_REFUNDED` both resolve to `Refunded`
    /// while `PAYMENT_REFUND_IN_PROGRESS` resolves through `refund_in_progress`.
    /// Tokens in the middle of the string are never matched on their own.
    pub fn parse(raw: &str) -> Self {
        let normalized: String = raw
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if matches!(c, '.' | '-' | ' ') { '_' } else { c })
            .collect();

        let mut suffix = normalized.as_str();
        loop {
            if let Some(signal) = Self::from_keyword(suffix) {
                return signal;
            }
            match suffix.split_once('_') {
                Some((_, rest)) => suffix = rest,
                None => return GatewaySignal::Unrecognized(raw.trim().to_string()),
            }
        }
    }

    fn from_keyword(keyword: &str) -> Option<Self> {
        let signal = match keyword {
            "paid" | "payment_paid" => GatewaySignal::Paid,
            "approved" => GatewaySignal::Approved,
            "confirmed" => GatewaySignal::Confirmed,
            "received" | "received_in_cash" => GatewaySignal::Received,
            "completed" | "complete" | "succeeded" | "success" => GatewaySignal::Completed,
            "authorized" | "captured" => GatewaySignal::Authorized,
            "settled" => GatewaySignal::Settled,
            "pending" => GatewaySignal::Pending,
            "waiting_payment" | "awaiting_payment" | "waiting" => GatewaySignal::WaitingPayment,
            "processing" | "in_process" | "in_progress" => GatewaySignal::Processing,
            "created" => GatewaySignal::Created,
            "in_analysis" | "analysis" | "under_review" => GatewaySignal::InAnalysis,
            "refused" => GatewaySignal::Refused,
            "declined" | "rejected" => GatewaySignal::Declined,
            "failed" | "failure" => GatewaySignal::Failed,
            "denied" => GatewaySignal::Denied,
            "refunded" | "refund" | "reversed" => GatewaySignal::Refunded,
            "refund_requested" | "refund_in_progress" | "refund_pending" => {
                GatewaySignal::RefundRequested
            }
            "chargeback_dispute" | "dispute_opened" | "awaiting_chargeback_reversal" => {
                GatewaySignal::DisputeOpened
            }
            "chargeback" | "chargedback" | "charged_back" | "chargeback_requested" => {
                GatewaySignal::Chargeback
            }
            "disputed" | "dispute" => GatewaySignal::Disputed,
            "cancelled" | "canceled" | "cancel" => GatewaySignal::Cancelled,
            "voided" | "void" => GatewaySignal::Voided,
            "expired" => GatewaySignal::Expired,
            "overdue" => GatewaySignal::Overdue,
            _ => return None,
        };
        Some(signal)
    }

    /// Canonical status for this signal.
    pub fn to_status(&self) -> SaleStatus {
        match self {
            GatewaySignal::Paid
            | GatewaySignal::Approved
            | GatewaySignal::Confirmed
            | GatewaySignal::Received
            | GatewaySignal::Completed
            | GatewaySignal::Authorized
            | GatewaySignal::Settled => SaleStatus::Approved,
            GatewaySignal::Pending
            | GatewaySignal::WaitingPayment
            | GatewaySignal::Processing
            | GatewaySignal::Created
            | GatewaySignal::InAnalysis
            | GatewaySignal::RefundRequested
            | GatewaySignal::DisputeOpened => SaleStatus::Pending,
            GatewaySignal::Refused
            | GatewaySignal::Declined
            | GatewaySignal::Failed
            | GatewaySignal::Denied => SaleStatus::Refused,
            GatewaySignal::Refunded => SaleStatus::Refunded,
            GatewaySignal::Chargeback | GatewaySignal::Disputed => SaleStatus::Chargeback,
            GatewaySignal::Cancelled | GatewaySignal::Voided => SaleStatus::Cancelled,
            GatewaySignal::Expired | GatewaySignal::Overdue => SaleStatus::Expired,
            GatewaySignal::Unrecognized(_) => SaleStatus::Pending,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, GatewaySignal::Unrecognized(_))
    }
}

/// Map a raw gateway string straight to a canonical status.
pub fn map_status(raw: &str) -> SaleStatus {
    GatewaySignal::parse(raw).to_status()
}

/// Transition rank. Higher ranks may overwrite lower ones, never the reverse.
pub fn priority(status: SaleStatus) -> u8 {
    match status {
        SaleStatus::Pending => 1,
        SaleStatus::Refused | SaleStatus::Cancelled | SaleStatus::Expired => 2,
        SaleStatus::Approved => 3,
        SaleStatus::Refunded => 4,
        SaleStatus::Chargeback => 5,
    }
}

pub fn can_transition(current: SaleStatus, next: SaleStatus) -> bool {
    priority(next) >= priority(current)
}

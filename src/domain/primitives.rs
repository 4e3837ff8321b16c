//! Domain primitives: TimeMs, PaymentMethod, identifiers.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }

    pub fn plus_minutes(&self, minutes: i64) -> Self {
        TimeMs(self.0.saturating_add(minutes.saturating_mul(60_000)))
    }

    pub fn minus_minutes(&self, minutes: i64) -> Self {
        TimeMs(self.0.saturating_sub(minutes.saturating_mul(60_000)))
    }
}

/// Generate a fresh row identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Payment method chosen at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Pix,
    CreditCard,
    DebitCard,
    Boleto,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 4] = [
        PaymentMethod::Pix,
        PaymentMethod::CreditCard,
        PaymentMethod::DebitCard,
        PaymentMethod::Boleto,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Pix => "pix",
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::DebitCard => "debit_card",
            PaymentMethod::Boleto => "boleto",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown payment method: {0}")]
pub struct UnknownPaymentMethod(pub String);

impl FromStr for PaymentMethod {
    type Err = UnknownPaymentMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pix" => Ok(PaymentMethod::Pix),
            "credit_card" | "card" => Ok(PaymentMethod::CreditCard),
            "debit_card" => Ok(PaymentMethod::DebitCard),
            "boleto" => Ok(PaymentMethod::Boleto),
            other => Err(UnknownPaymentMethod(other.to_string())),
        }
    }
}

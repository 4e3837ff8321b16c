//! Sales, products and the canonical sale status.

use crate::domain::{Decimal, PaymentMethod, TimeMs};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Canonical internal sale status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    Pending,
    Approved,
    Refused,
    Refunded,
    Chargeback,
    Cancelled,
    Expired,
}

impl SaleStatus {
    pub const ALL: [SaleStatus; 7] = [
        SaleStatus::Pending,
        SaleStatus::Approved,
        SaleStatus::Refused,
        SaleStatus::Refunded,
        SaleStatus::Chargeback,
        SaleStatus::Cancelled,
        SaleStatus::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Pending => "pending",
            SaleStatus::Approved => "approved",
            SaleStatus::Refused => "refused",
            SaleStatus::Refunded => "refunded",
            SaleStatus::Chargeback => "chargeback",
            SaleStatus::Cancelled => "cancelled",
            SaleStatus::Expired => "expired",
        }
    }

    /// Statuses whose net amount counts towards the seller's wallet.
    pub fn is_wallet_eligible(&self) -> bool {
        matches!(self, SaleStatus::Approved)
    }

    /// Statuses that take member-area access away.
    pub fn revokes_access(&self) -> bool {
        matches!(
            self,
            SaleStatus::Refunded | SaleStatus::Chargeback | SaleStatus::Cancelled
        )
    }
}

impl std::fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SaleStatus {
    type Err = String;

    /// Parses the stored representation only. Gateway vocabulary goes through
    /// `engine::status::GatewaySignal`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SaleStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown sale status: {}", s))
    }
}

/// One checkout attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub id: String,
    pub product_id: String,
    pub seller_user_id: String,
    pub buyer_email: String,
    pub buyer_name: Option<String>,
    /// Gross amount charged to the buyer. Immutable.
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_fee: Decimal,
    pub platform_fee: Decimal,
    pub affiliate_user_id: Option<String>,
    pub affiliate_percentage: Decimal,
    /// Affiliate commission carved out of the gross amount.
    pub commission_amount: Decimal,
    /// Total handed to co-producers when the sale settled.
    pub coproducer_amount: Decimal,
    /// The seller's share after every fee and split.
    pub net_amount: Decimal,
    pub status: SaleStatus,
    pub transaction_id: Option<String>,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
}

impl Sale {
    /// Sum of everything deducted from the gross amount.
    pub fn total_deductions(&self) -> Decimal {
        self.payment_fee + self.platform_fee + self.commission_amount + self.coproducer_amount
    }
}

/// Product as configured by its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub owner_user_id: String,
    pub name: String,
    pub has_member_area: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoProducerStatus {
    Active,
    Inactive,
}

impl CoProducerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoProducerStatus::Active => "active",
            CoProducerStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "active" {
            CoProducerStatus::Active
        } else {
            CoProducerStatus::Inactive
        }
    }
}

/// A co-producer relation on a specific product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoProducer {
    pub product_id: String,
    pub user_id: String,
    pub commission_percentage: Decimal,
    pub status: CoProducerStatus,
}

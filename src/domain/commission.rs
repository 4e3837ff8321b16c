//! Commissions, anticipations, anticipation debts and ledger entries.

use crate::domain::{Decimal, TimeMs};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommissionRole {
    Producer,
    Coproducer,
    Affiliate,
}

impl CommissionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionRole::Producer => "producer",
            CommissionRole::Coproducer => "coproducer",
            CommissionRole::Affiliate => "affiliate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "producer" => Some(CommissionRole::Producer),
            "coproducer" => Some(CommissionRole::Coproducer),
            "affiliate" => Some(CommissionRole::Affiliate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommissionStatus {
    Pending,
    Anticipated,
    Paid,
}

impl CommissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionStatus::Pending => "pending",
            CommissionStatus::Anticipated => "anticipated",
            CommissionStatus::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CommissionStatus::Pending),
            "anticipated" => Some(CommissionStatus::Anticipated),
            "paid" => Some(CommissionStatus::Paid),
            _ => None,
        }
    }
}

/// A per-beneficiary share of a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commission {
    pub id: String,
    pub sale_id: String,
    pub user_id: String,
    pub role: CommissionRole,
    pub commission_amount: Decimal,
    pub commission_percentage: Decimal,
    pub status: CommissionStatus,
    pub anticipated_at: Option<TimeMs>,
    pub anticipation_id: Option<String>,
    pub created_at: TimeMs,
}

/// Commission row to be created at settlement time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommission {
    pub user_id: String,
    pub role: CommissionRole,
    pub commission_amount: Decimal,
    pub commission_percentage: Decimal,
}

/// Bundle of commissions paid out early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionAnticipation {
    pub id: String,
    pub user_id: String,
    pub total_original_amount: Decimal,
    pub total_anticipated_amount: Decimal,
    pub fee_percentage: Decimal,
    pub fee_amount: Decimal,
    pub status: String,
    pub completed_at: Option<TimeMs>,
    pub idempotency_key: String,
    pub created_at: TimeMs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnticipationItem {
    pub anticipation_id: String,
    pub commission_id: String,
    pub original_amount: Decimal,
    pub fee_amount: Decimal,
    pub anticipated_amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebtStatus {
    Pending,
    Partial,
    Paid,
}

impl DebtStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebtStatus::Pending => "pending",
            DebtStatus::Partial => "partial",
            DebtStatus::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DebtStatus::Pending),
            "partial" => Some(DebtStatus::Partial),
            "paid" => Some(DebtStatus::Paid),
            _ => None,
        }
    }

    pub fn is_outstanding(&self) -> bool {
        matches!(self, DebtStatus::Pending | DebtStatus::Partial)
    }
}

/// Amount owed back after an anticipated commission's sale was reversed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnticipationDebt {
    pub id: String,
    pub user_id: String,
    pub commission_id: String,
    pub sale_id: String,
    pub amount: Decimal,
    pub status: DebtStatus,
    pub created_at: TimeMs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryKind {
    AnticipationCredit,
}

impl LedgerEntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryKind::AnticipationCredit => "anticipation_credit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "anticipation_credit" => Some(LedgerEntryKind::AnticipationCredit),
            _ => None,
        }
    }
}

/// Signed balance adjustment that is not a sale or a withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: String,
    pub amount: Decimal,
    pub kind: LedgerEntryKind,
    pub reference_id: String,
    pub created_at: TimeMs,
}

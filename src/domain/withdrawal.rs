//! Withdrawals, bank accounts and withdrawal OTPs.

use crate::domain::{Decimal, TimeMs};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Completed,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Completed => "completed",
            WithdrawalStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(WithdrawalStatus::Pending),
            "approved" => Some(WithdrawalStatus::Approved),
            "completed" => Some(WithdrawalStatus::Completed),
            "rejected" => Some(WithdrawalStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: String,
    pub user_id: String,
    pub bank_account_id: String,
    pub amount: Decimal,
    pub fee: Decimal,
    pub net_amount: Decimal,
    pub status: WithdrawalStatus,
    pub created_at: TimeMs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BankAccountStatus {
    Pending,
    Approved,
    Rejected,
}

impl BankAccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BankAccountStatus::Pending => "pending",
            BankAccountStatus::Approved => "approved",
            BankAccountStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "approved" => BankAccountStatus::Approved,
            "rejected" => BankAccountStatus::Rejected,
            _ => BankAccountStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccount {
    pub id: String,
    pub user_id: String,
    pub bank_name: String,
    pub status: BankAccountStatus,
}

/// One-time code guarding a withdrawal. Only the hash is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalOtp {
    pub id: String,
    pub user_id: String,
    pub code_hash: String,
    pub expires_at: TimeMs,
    pub used_at: Option<TimeMs>,
    pub attempts: i64,
    pub created_at: TimeMs,
}

//! Balance derivation from immutable ledger rows.
//!
//! Nothing here reads configuration or caches: callers fetch the rows right
//! before acting and recompute.

use crate::domain::{Decimal, LedgerEntry, Sale, SaleStatus, Withdrawal, WithdrawalStatus};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BalanceSnapshot {
    /// Σ net amount of wallet-eligible sales.
    pub approved_net: Decimal,
    /// Σ signed ledger entries (anticipation credits).
    pub credits: Decimal,
    /// Σ withdrawals already approved or paid out.
    pub completed_withdrawals: Decimal,
    /// Σ withdrawals awaiting review.
    pub pending_withdrawals: Decimal,
    /// Σ net amount of sales still awaiting payment.
    pub pending_settlement: Decimal,
    pub available_balance: Decimal,
}

/// Balance from sales and withdrawals alone.
pub fn compute_balance(sales: &[Sale], withdrawals: &[Withdrawal]) -> BalanceSnapshot {
    compute_balance_with_entries(sales, withdrawals, &[])
}

pub fn compute_balance_with_entries(
    sales: &[Sale],
    withdrawals: &[Withdrawal],
    entries: &[LedgerEntry],
) -> BalanceSnapshot {
    let approved_net: Decimal = sales
        .iter()
        .filter(|s| s.status.is_wallet_eligible())
        .map(|s| s.net_amount)
        .sum();

    let pending_settlement: Decimal = sales
        .iter()
        .filter(|s| s.status == SaleStatus::Pending)
        .map(|s| s.net_amount)
        .sum();

    let credits: Decimal = entries.iter().map(|e| e.amount).sum();

    let completed_withdrawals: Decimal = withdrawals
        .iter()
        .filter(|w| {
            matches!(
                w.status,
                WithdrawalStatus::Completed | WithdrawalStatus::Approved
            )
        })
        .map(|w| w.amount)
        .sum();

    let pending_withdrawals: Decimal = withdrawals
        .iter()
        .filter(|w| w.status == WithdrawalStatus::Pending)
        .map(|w| w.amount)
        .sum();

    let available_balance =
        (approved_net + credits - completed_withdrawals - pending_withdrawals).max_zero();

    BalanceSnapshot {
        approved_net,
        credits,
        completed_withdrawals,
        pending_withdrawals,
        pending_settlement,
        available_balance,
    }
}

//! Withdrawal requests.
//!
//! Checks run in a fixed order and each is a hard stop: amount, minimum,
//! one-time code, account block, bank account ownership and approval,
//! cooldown, then a fresh server-side balance. The code is consumed as soon as
//! it verifies and stays consumed if a later check fails.

use crate::config::WithdrawalConfig;
use crate::db::Repository;
use crate::dispatch::{emit_best_effort, EventSink, OutboundEvent};
use crate::domain::{
    new_id, BankAccountStatus, Decimal, TimeMs, Withdrawal, WithdrawalStatus,
};
use crate::engine::{compute_balance_with_entries, BalanceSnapshot};
use crate::orchestration::otp::{OtpError, OtpService};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRequest {
    pub amount: Decimal,
    pub bank_account_id: String,
    pub otp_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WithdrawalReceipt {
    pub id: String,
    pub amount: Decimal,
    pub fee: Decimal,
    pub net_amount: Decimal,
    pub status: WithdrawalStatus,
    pub bank_name: String,
}

#[derive(Debug, Error)]
pub enum WithdrawalError {
    #[error("amount must be positive")]
    InvalidAmount,
    #[error("minimum withdrawal amount is {minimum}")]
    BelowMinimum { minimum: Decimal },
    #[error(transparent)]
    Otp(#[from] OtpError),
    #[error("withdrawals are not available for this account")]
    AccountBlocked,
    #[error("bank account not available")]
    BankAccountUnavailable,
    #[error("bank account is not approved")]
    BankAccountNotApproved,
    #[error("a withdrawal was requested less than {minutes} minutes ago")]
    Cooldown { minutes: i64 },
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Decimal, available: Decimal },
    #[error("withdrawal fee {fee} consumes the whole amount")]
    FeeExceedsAmount { fee: Decimal },
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Current balance of `user_id`, recomputed from source rows.
pub async fn current_balance(repo: &Repository, user_id: &str) -> Result<BalanceSnapshot, sqlx::Error> {
    let (sales, withdrawals, entries) = tokio::try_join!(
        repo.query_sales_for_seller(user_id),
        repo.list_withdrawals(user_id),
        repo.list_ledger_entries(user_id)
    )?;
    Ok(compute_balance_with_entries(&sales, &withdrawals, &entries))
}

#[derive(Clone)]
pub struct WithdrawalProcessor {
    repo: Arc<Repository>,
    otp: OtpService,
    config: WithdrawalConfig,
    sink: Arc<dyn EventSink>,
}

impl WithdrawalProcessor {
    pub fn new(
        repo: Arc<Repository>,
        otp: OtpService,
        config: WithdrawalConfig,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            repo,
            otp,
            config,
            sink,
        }
    }

    pub async fn request(
        &self,
        user_id: &str,
        request: &WithdrawalRequest,
    ) -> Result<WithdrawalReceipt, WithdrawalError> {
        let amount = request.amount;
        if !amount.is_positive() {
            return Err(WithdrawalError::InvalidAmount);
        }
        if amount < self.config.min_amount {
            return Err(WithdrawalError::BelowMinimum {
                minimum: self.config.min_amount,
            });
        }

        let now = TimeMs::now();
        let code = request.otp_code.as_deref().unwrap_or_default();
        if let Err(e) = self.otp.verify_and_consume(user_id, code, now).await {
            warn!(user_id, error = %e, "withdrawal code rejected");
            return Err(e.into());
        }

        if self.repo.is_account_blocked(user_id).await? {
            warn!(user_id, "withdrawal from blocked account");
            return Err(WithdrawalError::AccountBlocked);
        }

        let bank_account = match self.repo.get_bank_account(&request.bank_account_id).await? {
            Some(account) if account.user_id == user_id => account,
            Some(_) => {
                warn!(user_id, bank_account_id = %request.bank_account_id, "bank account owned by another user");
                return Err(WithdrawalError::BankAccountUnavailable);
            }
            None => return Err(WithdrawalError::BankAccountUnavailable),
        };
        if bank_account.status != BankAccountStatus::Approved {
            return Err(WithdrawalError::BankAccountNotApproved);
        }

        let since = now.minus_minutes(self.config.cooldown_minutes);
        if self.repo.has_recent_withdrawal(user_id, since).await? {
            info!(user_id, "withdrawal cooldown active");
            return Err(WithdrawalError::Cooldown {
                minutes: self.config.cooldown_minutes,
            });
        }

        let balance = current_balance(&self.repo, user_id).await?;
        if amount > balance.available_balance {
            info!(user_id, requested = %amount, available = %balance.available_balance, "insufficient balance");
            return Err(WithdrawalError::InsufficientBalance {
                requested: amount,
                available: balance.available_balance,
            });
        }

        let fee = self
            .config
            .fee
            .apply(amount)
            .ok_or(WithdrawalError::InvalidAmount)?;
        let net_amount = amount - fee;
        if !net_amount.is_positive() {
            return Err(WithdrawalError::FeeExceedsAmount { fee });
        }

        let status = if self.config.auto_approve {
            WithdrawalStatus::Approved
        } else {
            WithdrawalStatus::Pending
        };
        let withdrawal = Withdrawal {
            id: new_id(),
            user_id: user_id.to_string(),
            bank_account_id: bank_account.id.clone(),
            amount,
            fee,
            net_amount,
            status,
            created_at: now,
        };
        self.repo.insert_withdrawal(&withdrawal).await?;
        info!(user_id, withdrawal_id = %withdrawal.id, amount = %amount, status = status.as_str(), "withdrawal requested");

        emit_best_effort(
            self.sink.as_ref(),
            OutboundEvent::WithdrawalRequested {
                withdrawal_id: withdrawal.id.clone(),
                user_id: user_id.to_string(),
                amount,
                net_amount,
                status,
            },
        )
        .await;
        if status == WithdrawalStatus::Pending {
            emit_best_effort(
                self.sink.as_ref(),
                OutboundEvent::AdminWithdrawalPending {
                    withdrawal_id: withdrawal.id.clone(),
                    user_id: user_id.to_string(),
                    amount,
                },
            )
            .await;
        }

        Ok(WithdrawalReceipt {
            id: withdrawal.id,
            amount,
            fee,
            net_amount,
            status,
            bank_name: bank_account.bank_name,
        })
    }
}

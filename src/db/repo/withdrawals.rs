//! Bank accounts, withdrawals and one-time withdrawal codes.

use super::{get_decimal, get_enum, get_opt_time, get_time, Repository};
use crate::domain::{
    BankAccount, BankAccountStatus, Withdrawal, WithdrawalOtp, WithdrawalStatus, TimeMs,
};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

fn withdrawal_from_row(row: &SqliteRow) -> Result<Withdrawal, sqlx::Error> {
    Ok(Withdrawal {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        bank_account_id: row.try_get("bank_account_id")?,
        amount: get_decimal(row, "amount")?,
        fee: get_decimal(row, "fee")?,
        net_amount: get_decimal(row, "net_amount")?,
        status: get_enum(row, "status", WithdrawalStatus::parse)?,
        created_at: get_time(row, "created_at")?,
    })
}

impl Repository {
    // =========================================================================
    // Bank accounts
    // =========================================================================

    pub async fn upsert_bank_account(&self, account: &BankAccount) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO bank_accounts (id, user_id, bank_name, status)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                bank_name = excluded.bank_name,
                status = excluded.status
            "#,
        )
        .bind(&account.id)
        .bind(&account.user_id)
        .bind(&account.bank_name)
        .bind(account.status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_bank_account(&self, id: &str) -> Result<Option<BankAccount>, sqlx::Error> {
        let row = sqlx::query("SELECT id, user_id, bank_name, status FROM bank_accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| {
            Ok(BankAccount {
                id: r.try_get("id")?,
                user_id: r.try_get("user_id")?,
                bank_name: r.try_get("bank_name")?,
                status: BankAccountStatus::parse(&r.try_get::<String, _>("status")?),
            })
        })
        .transpose()
    }

    // =========================================================================
    // Withdrawals
    // =========================================================================

    pub async fn insert_withdrawal(&self, withdrawal: &Withdrawal) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO withdrawals (id, user_id, bank_account_id, amount, fee, net_amount, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&withdrawal.id)
        .bind(&withdrawal.user_id)
        .bind(&withdrawal.bank_account_id)
        .bind(withdrawal.amount.to_canonical_string())
        .bind(withdrawal.fee.to_canonical_string())
        .bind(withdrawal.net_amount.to_canonical_string())
        .bind(withdrawal.status.as_str())
        .bind(withdrawal.created_at.as_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_withdrawals(&self, user_id: &str) -> Result<Vec<Withdrawal>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, bank_account_id, amount, fee, net_amount, status, created_at
            FROM withdrawals
            WHERE user_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(withdrawal_from_row).collect()
    }

    /// Whether the user has a non-rejected withdrawal created at or after `since`.
    pub async fn has_recent_withdrawal(
        &self,
        user_id: &str,
        since: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT 1 FROM withdrawals
            WHERE user_id = ? AND status != 'rejected' AND created_at >= ?
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(since.as_ms())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    // =========================================================================
    // Withdrawal OTPs
    // =========================================================================

    /// Store a freshly issued code. Every earlier unused code of the same
    /// user is retired in the same transaction.
    pub async fn insert_otp(&self, otp: &WithdrawalOtp) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE withdrawal_otps SET used_at = ? WHERE user_id = ? AND used_at IS NULL")
            .bind(otp.created_at.as_ms())
            .bind(&otp.user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO withdrawal_otps (id, user_id, code_hash, expires_at, used_at, attempts, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&otp.id)
        .bind(&otp.user_id)
        .bind(&otp.code_hash)
        .bind(otp.expires_at.as_ms())
        .bind(otp.used_at.map(|t| t.as_ms()))
        .bind(otp.attempts)
        .bind(otp.created_at.as_ms())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// The most recently issued code that has not been consumed.
    pub async fn latest_unused_otp(
        &self,
        user_id: &str,
    ) -> Result<Option<WithdrawalOtp>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, code_hash, expires_at, used_at, attempts, created_at
            FROM withdrawal_otps
            WHERE user_id = ? AND used_at IS NULL
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(WithdrawalOtp {
                id: r.try_get("id")?,
                user_id: r.try_get("user_id")?,
                code_hash: r.try_get("code_hash")?,
                expires_at: get_time(&r, "expires_at")?,
                used_at: get_opt_time(&r, "used_at")?,
                attempts: r.try_get("attempts")?,
                created_at: get_time(&r, "created_at")?,
            })
        })
        .transpose()
    }

    /// Count a failed verification. Returns the attempt count after the increment.
    pub async fn increment_otp_attempts(&self, otp_id: &str) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            "UPDATE withdrawal_otps SET attempts = attempts + 1 WHERE id = ? RETURNING attempts",
        )
        .bind(otp_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Mark a code used. Only one caller can win; returns whether this one did.
    pub async fn consume_otp(&self, otp_id: &str, now: TimeMs) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE withdrawal_otps SET used_at = ? WHERE id = ? AND used_at IS NULL")
                .bind(now.as_ms())
                .bind(otp_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn otp(id: &str, created_at: i64) -> WithdrawalOtp {
        WithdrawalOtp {
            id: id.to_string(),
            user_id: "u1".to_string(),
            code_hash: "hash".to_string(),
            expires_at: TimeMs::new(created_at + 600_000),
            used_at: None,
            attempts: 0,
            created_at: TimeMs::new(created_at),
        }
    }

    #[tokio::test]
    async fn test_recent_withdrawal_ignores_rejected() {
        let (repo, _temp) = setup_repo().await;
        repo.upsert_bank_account(&BankAccount {
            id: "b1".to_string(),
            user_id: "u1".to_string(),
            bank_name: "Bank".to_string(),
            status: BankAccountStatus::Approved,
        })
        .await
        .unwrap();

        let withdrawal = |id: &str, status, at| Withdrawal {
            id: id.to_string(),
            user_id: "u1".to_string(),
            bank_account_id: "b1".to_string(),
            amount: d("100"),
            fee: d("4.90"),
            net_amount: d("95.10"),
            status,
            created_at: TimeMs::new(at),
        };
        repo.insert_withdrawal(&withdrawal("w1", WithdrawalStatus::Rejected, 10_000))
            .await
            .unwrap();
        assert!(!repo.has_recent_withdrawal("u1", TimeMs::new(5_000)).await.unwrap());

        repo.insert_withdrawal(&withdrawal("w2", WithdrawalStatus::Pending, 2_000))
            .await
            .unwrap();
        assert!(!repo.has_recent_withdrawal("u1", TimeMs::new(5_000)).await.unwrap());
        assert!(repo.has_recent_withdrawal("u1", TimeMs::new(1_000)).await.unwrap());
        assert_eq!(repo.list_withdrawals("u1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_otp_consumed_once() {
        let (repo, _temp) = setup_repo().await;
        repo.insert_otp(&otp("o1", 1_000)).await.unwrap();
        repo.insert_otp(&otp("o2", 2_000)).await.unwrap();

        let latest = repo.latest_unused_otp("u1").await.unwrap().unwrap();
        assert_eq!(latest.id, "o2");
        assert_eq!(repo.increment_otp_attempts("o2").await.unwrap(), 1);
        assert_eq!(repo.increment_otp_attempts("o2").await.unwrap(), 2);

        assert!(repo.consume_otp("o2", TimeMs::new(3_000)).await.unwrap());
        assert!(!repo.consume_otp("o2", TimeMs::new(3_001)).await.unwrap());
        // o1 was retired when o2 was issued.
        assert!(repo.latest_unused_otp("u1").await.unwrap().is_none());
        assert!(!repo.consume_otp("o1", TimeMs::new(3_002)).await.unwrap());
    }
}

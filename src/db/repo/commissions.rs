//! Commission, anticipation, debt and ledger-entry persistence.

use super::{get_decimal, get_enum, get_opt_time, get_time, Repository};
use crate::domain::{
    new_id, AnticipationDebt, AnticipationItem, Commission, CommissionAnticipation,
    CommissionRole, CommissionStatus, DebtStatus, LedgerEntry, LedgerEntryKind, SaleStatus,
    TimeMs,
};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;

const COMMISSION_COLUMNS: &str = r#"
    c.id, c.sale_id, c.user_id, c.role, c.commission_amount, c.commission_percentage,
    c.status, c.anticipated_at, c.anticipation_id, c.created_at
"#;

fn commission_from_row(row: &SqliteRow) -> Result<Commission, sqlx::Error> {
    Ok(Commission {
        id: row.try_get("id")?,
        sale_id: row.try_get("sale_id")?,
        user_id: row.try_get("user_id")?,
        role: get_enum(row, "role", CommissionRole::parse)?,
        commission_amount: get_decimal(row, "commission_amount")?,
        commission_percentage: get_decimal(row, "commission_percentage")?,
        status: get_enum(row, "status", CommissionStatus::parse)?,
        anticipated_at: get_opt_time(row, "anticipated_at")?,
        anticipation_id: row.try_get("anticipation_id")?,
        created_at: get_time(row, "created_at")?,
    })
}

fn anticipation_from_row(row: &SqliteRow) -> Result<CommissionAnticipation, sqlx::Error> {
    Ok(CommissionAnticipation {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        total_original_amount: get_decimal(row, "total_original_amount")?,
        total_anticipated_amount: get_decimal(row, "total_anticipated_amount")?,
        fee_percentage: get_decimal(row, "fee_percentage")?,
        fee_amount: get_decimal(row, "fee_amount")?,
        status: row.try_get("status")?,
        completed_at: get_opt_time(row, "completed_at")?,
        idempotency_key: row.try_get("idempotency_key")?,
        created_at: get_time(row, "created_at")?,
    })
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

impl Repository {
    // =========================================================================
    // Commissions
    // =========================================================================

    pub async fn list_commissions_for_sale(
        &self,
        sale_id: &str,
    ) -> Result<Vec<Commission>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM commissions c WHERE c.sale_id = ? ORDER BY c.role ASC, c.user_id ASC",
            COMMISSION_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(sale_id).fetch_all(&self.pool).await?;
        rows.iter().map(commission_from_row).collect()
    }

    /// Commissions the user could anticipate right now: pending, never
    /// anticipated, not a producer share, on an approved sale.
    ///
    /// The producer's share is already the sale's net amount in the wallet,
    /// so it is never offered for anticipation.
    pub async fn list_eligible_commissions(
        &self,
        user_id: &str,
    ) -> Result<Vec<Commission>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {}
            FROM commissions c
            JOIN sales s ON s.id = c.sale_id
            WHERE c.user_id = ?
              AND c.status = 'pending'
              AND c.anticipated_at IS NULL
              AND c.role != 'producer'
              AND s.status = 'approved'
            ORDER BY c.created_at ASC, c.id ASC
            "#,
            COMMISSION_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(user_id).fetch_all(&self.pool).await?;
        rows.iter().map(commission_from_row).collect()
    }

    /// The subset of `ids` owned by `user_id` that is still claimable, paired
    /// with the current status of each underlying sale.
    pub async fn fetch_claimable_commissions(
        &self,
        user_id: &str,
        ids: &[String],
    ) -> Result<Vec<(Commission, SaleStatus)>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT {}, s.status AS sale_status
            FROM commissions c
            JOIN sales s ON s.id = c.sale_id
            WHERE c.user_id = ?
              AND c.status = 'pending'
              AND c.anticipated_at IS NULL
              AND c.role != 'producer'
              AND c.id IN ({})
            "#,
            COMMISSION_COLUMNS,
            placeholders(ids.len())
        );

        let mut query = sqlx::query(&sql).bind(user_id);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                let sale_status =
                    get_enum(row, "sale_status", |s| SaleStatus::from_str(s).ok())?;
                Ok((commission_from_row(row)?, sale_status))
            })
            .collect()
    }

    /// Claim commissions for an anticipation.
    ///
    /// Every row must still be pending and unanticipated; if any row was
    /// claimed concurrently the whole batch is rolled back. Returns the number
    /// of rows claimed, which is either `ids.len()` or zero.
    pub async fn mark_commissions_anticipated(
        &self,
        ids: &[String],
        anticipation_id: &str,
        now: TimeMs,
    ) -> Result<usize, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut claimed = 0usize;

        for id in ids {
            let result = sqlx::query(
                r#"
                UPDATE commissions
                SET status = 'anticipated', anticipated_at = ?, anticipation_id = ?
                WHERE id = ? AND status = 'pending' AND anticipated_at IS NULL
                "#,
            )
            .bind(now.as_ms())
            .bind(anticipation_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
            claimed += result.rows_affected() as usize;
        }

        if claimed != ids.len() {
            tx.rollback().await?;
            return Ok(0);
        }

        tx.commit().await?;
        Ok(claimed)
    }

    /// Undo [`Repository::mark_commissions_anticipated`] for one anticipation.
    pub async fn revert_anticipated_commissions(
        &self,
        anticipation_id: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE commissions
            SET status = 'pending', anticipated_at = NULL, anticipation_id = NULL
            WHERE anticipation_id = ? AND status = 'anticipated'
            "#,
        )
        .bind(anticipation_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    // Anticipations
    // =========================================================================

    pub async fn anticipation_exists_for_key(&self, key: &str) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM commission_anticipations WHERE idempotency_key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Insert an anticipation header.
    ///
    /// # Errors
    /// A duplicate idempotency key surfaces as a unique-constraint database error.
    pub async fn insert_anticipation(
        &self,
        anticipation: &CommissionAnticipation,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO commission_anticipations (
                id, user_id, total_original_amount, total_anticipated_amount,
                fee_percentage, fee_amount, status, completed_at, idempotency_key, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&anticipation.id)
        .bind(&anticipation.user_id)
        .bind(anticipation.total_original_amount.to_canonical_string())
        .bind(anticipation.total_anticipated_amount.to_canonical_string())
        .bind(anticipation.fee_percentage.to_canonical_string())
        .bind(anticipation.fee_amount.to_canonical_string())
        .bind(&anticipation.status)
        .bind(anticipation.completed_at.map(|t| t.as_ms()))
        .bind(&anticipation.idempotency_key)
        .bind(anticipation.created_at.as_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert all items of one anticipation in a single transaction.
    pub async fn insert_anticipation_items(
        &self,
        items: &[AnticipationItem],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO anticipation_items (
                    anticipation_id, commission_id, original_amount, fee_amount, anticipated_amount
                ) VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&item.anticipation_id)
            .bind(&item.commission_id)
            .bind(item.original_amount.to_canonical_string())
            .bind(item.fee_amount.to_canonical_string())
            .bind(item.anticipated_amount.to_canonical_string())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_anticipation_items(
        &self,
        anticipation_id: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM anticipation_items WHERE anticipation_id = ?")
            .bind(anticipation_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_anticipation(&self, anticipation_id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM commission_anticipations WHERE id = ?")
            .bind(anticipation_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_anticipation_items(
        &self,
        anticipation_id: &str,
    ) -> Result<Vec<AnticipationItem>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT anticipation_id, commission_id, original_amount, fee_amount, anticipated_amount
            FROM anticipation_items
            WHERE anticipation_id = ?
            ORDER BY commission_id ASC
            "#,
        )
        .bind(anticipation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(AnticipationItem {
                    anticipation_id: row.try_get("anticipation_id")?,
                    commission_id: row.try_get("commission_id")?,
                    original_amount: get_decimal(row, "original_amount")?,
                    fee_amount: get_decimal(row, "fee_amount")?,
                    anticipated_amount: get_decimal(row, "anticipated_amount")?,
                })
            })
            .collect()
    }

    /// Anticipation history for a user, newest first.
    pub async fn list_anticipations(
        &self,
        user_id: &str,
    ) -> Result<Vec<CommissionAnticipation>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, total_original_amount, total_anticipated_amount,
                   fee_percentage, fee_amount, status, completed_at, idempotency_key, created_at
            FROM commission_anticipations
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(anticipation_from_row).collect()
    }

    // =========================================================================
    // Anticipation debts
    // =========================================================================

    /// Record one pending debt per anticipated commission of a reversed sale.
    ///
    /// Debts are unique per commission, so repeated reversals add nothing.
    /// Returns the number of debts created.
    pub async fn record_debts_for_sale(
        &self,
        sale_id: &str,
        now: TimeMs,
    ) -> Result<usize, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let anticipated = sqlx::query(
            r#"
            SELECT c.id, c.user_id, i.anticipated_amount
            FROM commissions c
            JOIN anticipation_items i ON i.commission_id = c.id
            WHERE c.sale_id = ? AND c.status = 'anticipated'
            "#,
        )
        .bind(sale_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut created = 0usize;
        for row in &anticipated {
            let commission_id: String = row.try_get("id")?;
            let user_id: String = row.try_get("user_id")?;
            let amount = get_decimal(row, "anticipated_amount")?;

            let result = sqlx::query(
                r#"
                INSERT INTO anticipation_debts (id, user_id, commission_id, sale_id, amount, status, created_at)
                VALUES (?, ?, ?, ?, ?, 'pending', ?)
                ON CONFLICT(commission_id) DO NOTHING
                "#,
            )
            .bind(new_id())
            .bind(&user_id)
            .bind(&commission_id)
            .bind(sale_id)
            .bind(amount.to_canonical_string())
            .bind(now.as_ms())
            .execute(&mut *tx)
            .await?;
            created += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(created)
    }

    pub async fn list_outstanding_debts(
        &self,
        user_id: &str,
    ) -> Result<Vec<AnticipationDebt>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, commission_id, sale_id, amount, status, created_at
            FROM anticipation_debts
            WHERE user_id = ? AND status IN ('pending', 'partial')
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(AnticipationDebt {
                    id: row.try_get("id")?,
                    user_id: row.try_get("user_id")?,
                    commission_id: row.try_get("commission_id")?,
                    sale_id: row.try_get("sale_id")?,
                    amount: get_decimal(row, "amount")?,
                    status: get_enum(row, "status", DebtStatus::parse)?,
                    created_at: get_time(row, "created_at")?,
                })
            })
            .collect()
    }

    pub async fn has_outstanding_debt(&self, user_id: &str) -> Result<bool, sqlx::Error> {
        let row = sqlx::query(
            "SELECT 1 FROM anticipation_debts WHERE user_id = ? AND status IN ('pending', 'partial') LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    // =========================================================================
    // Ledger entries
    // =========================================================================

    /// Append a ledger entry. Unique per (kind, reference).
    pub async fn insert_ledger_entry(&self, entry: &LedgerEntry) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, user_id, amount, kind, reference_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(entry.amount.to_canonical_string())
        .bind(entry.kind.as_str())
        .bind(&entry.reference_id)
        .bind(entry.created_at.as_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_ledger_entries(&self, user_id: &str) -> Result<Vec<LedgerEntry>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, amount, kind, reference_id, created_at
            FROM ledger_entries
            WHERE user_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(LedgerEntry {
                    id: row.try_get("id")?,
                    user_id: row.try_get("user_id")?,
                    amount: get_decimal(row, "amount")?,
                    kind: get_enum(row, "kind", LedgerEntryKind::parse)?,
                    reference_id: row.try_get("reference_id")?,
                    created_at: get_time(row, "created_at")?,
                })
            })
            .collect()
    }
}

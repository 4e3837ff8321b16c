//! Sale rows, compare-and-swap status transitions and commission settlement.

use super::{get_decimal, get_enum, get_time, Repository};
use crate::domain::{new_id, Decimal, NewCommission, PaymentMethod, Sale, SaleStatus, TimeMs};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;

const SALE_COLUMNS: &str = r#"
    id, product_id, seller_user_id, buyer_email, buyer_name, amount, payment_method,
    payment_fee, platform_fee, affiliate_user_id, affiliate_percentage, commission_amount,
    coproducer_amount, net_amount, status, transaction_id, created_at, updated_at
"#;

/// Outcome of [`Repository::apply_status_transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionWrite {
    /// Status written and event key recorded.
    Applied,
    /// The (sale, status, transaction) key was recorded by a concurrent delivery.
    AlreadyProcessed,
    /// The stored status no longer matched the expected one.
    Conflict,
}

fn sale_from_row(row: &SqliteRow) -> Result<Sale, sqlx::Error> {
    Ok(Sale {
        id: row.try_get("id")?,
        product_id: row.try_get("product_id")?,
        seller_user_id: row.try_get("seller_user_id")?,
        buyer_email: row.try_get("buyer_email")?,
        buyer_name: row.try_get("buyer_name")?,
        amount: get_decimal(row, "amount")?,
        payment_method: get_enum(row, "payment_method", |s| PaymentMethod::from_str(s).ok())?,
        payment_fee: get_decimal(row, "payment_fee")?,
        platform_fee: get_decimal(row, "platform_fee")?,
        affiliate_user_id: row.try_get("affiliate_user_id")?,
        affiliate_percentage: get_decimal(row, "affiliate_percentage")?,
        commission_amount: get_decimal(row, "commission_amount")?,
        coproducer_amount: get_decimal(row, "coproducer_amount")?,
        net_amount: get_decimal(row, "net_amount")?,
        status: get_enum(row, "status", |s| SaleStatus::from_str(s).ok())?,
        transaction_id: row.try_get("transaction_id")?,
        created_at: get_time(row, "created_at")?,
        updated_at: get_time(row, "updated_at")?,
    })
}

impl Repository {
    /// Insert a new sale.
    ///
    /// # Errors
    /// Returns an error if the insert fails (including a duplicate id).
    pub async fn insert_sale(&self, sale: &Sale) -> Result<(), sqlx::Error> {
        write_sale(&self.pool, sale).await
    }

    /// Count one use of `coupon_id` and insert the sale in one transaction.
    ///
    /// Returns `false`, writing nothing, when the coupon is inactive or its
    /// usage cap is reached. A failed insert leaves the use count untouched.
    pub async fn insert_sale_redeeming_coupon(
        &self,
        sale: &Sale,
        coupon_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let redeemed = sqlx::query(
            r#"
            UPDATE coupons SET uses_count = uses_count + 1
            WHERE id = ? AND active = 1 AND (max_uses IS NULL OR uses_count < max_uses)
            "#,
        )
        .bind(coupon_id)
        .execute(&mut *tx)
        .await?;
        if redeemed.rows_affected() != 1 {
            return Ok(false);
        }

        write_sale(&mut *tx, sale).await?;
        tx.commit().await?;
        Ok(true)
    }

    pub async fn get_sale(&self, sale_id: &str) -> Result<Option<Sale>, sqlx::Error> {
        let sql = format!("SELECT {} FROM sales WHERE id = ?", SALE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(sale_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(sale_from_row).transpose()
    }

    /// Every sale sold by `seller_user_id`, oldest first.
    pub async fn query_sales_for_seller(
        &self,
        seller_user_id: &str,
    ) -> Result<Vec<Sale>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM sales WHERE seller_user_id = ? ORDER BY created_at ASC, id ASC",
            SALE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(seller_user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(sale_from_row).collect()
    }

    pub async fn is_webhook_event_processed(
        &self,
        sale_id: &str,
        status: SaleStatus,
        transaction_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT 1 FROM processed_webhook_events
            WHERE sale_id = ? AND status = ? AND transaction_id = ?
            "#,
        )
        .bind(sale_id)
        .bind(status.as_str())
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Atomically move a sale from `expected` to `next` and record the event key.
    ///
    /// The UPDATE only matches while the stored status still equals `expected`,
    /// so two concurrent deliveries cannot both apply conflicting transitions.
    /// Both writes share one transaction; on any non-`Applied` outcome nothing
    /// is persisted.
    pub async fn apply_status_transition(
        &self,
        sale_id: &str,
        expected: SaleStatus,
        next: SaleStatus,
        transaction_id: &str,
        now: TimeMs,
    ) -> Result<TransitionWrite, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let key = sqlx::query(
            r#"
            INSERT INTO processed_webhook_events (sale_id, status, transaction_id, processed_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(sale_id, status, transaction_id) DO NOTHING
            "#,
        )
        .bind(sale_id)
        .bind(next.as_str())
        .bind(transaction_id)
        .bind(now.as_ms())
        .execute(&mut *tx)
        .await?;

        if key.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(TransitionWrite::AlreadyProcessed);
        }

        let update = sqlx::query(
            r#"
            UPDATE sales
            SET status = ?,
                updated_at = ?,
                transaction_id = COALESCE(NULLIF(?, ''), transaction_id)
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(next.as_str())
        .bind(now.as_ms())
        .bind(transaction_id)
        .bind(sale_id)
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await?;

        if update.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(TransitionWrite::Conflict);
        }

        tx.commit().await?;
        Ok(TransitionWrite::Applied)
    }

    /// Create settlement commissions for an approved sale and move the
    /// co-producer total out of the seller's net amount.
    ///
    /// Commission rows are unique per (sale, user, role); re-running inserts
    /// nothing and leaves the sale untouched. Returns the number of new rows.
    pub async fn settle_sale_commissions(
        &self,
        sale_id: &str,
        commissions: &[NewCommission],
        coproducer_total: Decimal,
        seller_net: Decimal,
        now: TimeMs,
    ) -> Result<usize, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;

        for commission in commissions {
            let result = sqlx::query(
                r#"
                INSERT INTO commissions (
                    id, sale_id, user_id, role, commission_amount, commission_percentage,
                    status, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, 'pending', ?)
                ON CONFLICT(sale_id, user_id, role) DO NOTHING
                "#,
            )
            .bind(new_id())
            .bind(sale_id)
            .bind(&commission.user_id)
            .bind(commission.role.as_str())
            .bind(commission.commission_amount.to_canonical_string())
            .bind(commission.commission_percentage.to_canonical_string())
            .bind(now.as_ms())
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }

        if inserted > 0 && coproducer_total.is_positive() {
            sqlx::query(
                r#"
                UPDATE sales
                SET coproducer_amount = ?, net_amount = ?, updated_at = ?
                WHERE id = ? AND coproducer_amount = '0'
                "#,
            )
            .bind(coproducer_total.to_canonical_string())
            .bind(seller_net.to_canonical_string())
            .bind(now.as_ms())
            .bind(sale_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(inserted)
    }
}

async fn write_sale<'e, E>(executor: E, sale: &Sale) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO sales (
            id, product_id, seller_user_id, buyer_email, buyer_name, amount, payment_method,
            payment_fee, platform_fee, affiliate_user_id, affiliate_percentage,
            commission_amount, coproducer_amount, net_amount, status, transaction_id,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&sale.id)
    .bind(&sale.product_id)
    .bind(&sale.seller_user_id)
    .bind(&sale.buyer_email)
    .bind(sale.buyer_name.as_deref())
    .bind(sale.amount.to_canonical_string())
    .bind(sale.payment_method.as_str())
    .bind(sale.payment_fee.to_canonical_string())
    .bind(sale.platform_fee.to_canonical_string())
    .bind(sale.affiliate_user_id.as_deref())
    .bind(sale.affiliate_percentage.to_canonical_string())
    .bind(sale.commission_amount.to_canonical_string())
    .bind(sale.coproducer_amount.to_canonical_string())
    .bind(sale.net_amount.to_canonical_string())
    .bind(sale.status.as_str())
    .bind(sale.transaction_id.as_deref())
    .bind(sale.created_at.as_ms())
    .bind(sale.updated_at.as_ms())
    .execute(executor)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::domain::{CommissionRole, Coupon, DiscountType};

    async fn coupon_uses(repo: &Repository) -> i64 {
        repo.find_coupons_for_product("ONCE", "p1").await.unwrap()[0].uses_count
    }

    #[tokio::test]
    async fn test_insert_and_get_sale() {
        let (repo, _temp) = setup_repo().await;
        seed_product(&repo, "p1", "seller", false).await;
        let sale = pending_sale("s1", "p1", "seller", "280.69");
        repo.insert_sale(&sale).await.unwrap();

        let loaded = repo.get_sale("s1").await.unwrap().unwrap();
        assert_eq!(loaded, sale);
        assert!(repo.get_sale("nope").await.unwrap().is_none());
        assert_eq!(repo.query_sales_for_seller("seller").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_coupon_use_and_sale_commit_together() {
        let (repo, _temp) = setup_repo().await;
        seed_product(&repo, "p1", "seller", false).await;
        repo.insert_coupon(&Coupon {
            id: "c1".to_string(),
            code: "ONCE".to_string(),
            created_by: "seller".to_string(),
            product_id: Some("p1".to_string()),
            discount_type: DiscountType::Fixed,
            discount_value: d("5"),
            active: true,
            max_uses: Some(1),
            uses_count: 0,
            expires_at: None,
            min_purchase_amount: None,
        })
        .await
        .unwrap();
        repo.insert_sale(&pending_sale("s1", "p1", "seller", "95"))
            .await
            .unwrap();

        // Duplicate id: the insert fails and the use is not counted.
        let err = repo
            .insert_sale_redeeming_coupon(&pending_sale("s1", "p1", "seller", "95"), "c1")
            .await;
        assert!(err.is_err());
        assert_eq!(coupon_uses(&repo).await, 0);

        assert!(repo
            .insert_sale_redeeming_coupon(&pending_sale("s2", "p1", "seller", "95"), "c1")
            .await
            .unwrap());
        assert_eq!(coupon_uses(&repo).await, 1);

        // Cap reached: nothing is written.
        assert!(!repo
            .insert_sale_redeeming_coupon(&pending_sale("s3", "p1", "seller", "95"), "c1")
            .await
            .unwrap());
        assert!(repo.get_sale("s3").await.unwrap().is_none());
        assert_eq!(coupon_uses(&repo).await, 1);
    }

    #[tokio::test]
    async fn test_transition_applies_once() {
        let (repo, _temp) = setup_repo().await;
        seed_product(&repo, "p1", "seller", false).await;
        repo.insert_sale(&pending_sale("s1", "p1", "seller", "100"))
            .await
            .unwrap();

        let first = repo
            .apply_status_transition("s1", SaleStatus::Pending, SaleStatus::Approved, "tx-1", TimeMs::new(5))
            .await
            .unwrap();
        assert_eq!(first, TransitionWrite::Applied);
        assert!(repo
            .is_webhook_event_processed("s1", SaleStatus::Approved, "tx-1")
            .await
            .unwrap());

        let replay = repo
            .apply_status_transition("s1", SaleStatus::Pending, SaleStatus::Approved, "tx-1", TimeMs::new(6))
            .await
            .unwrap();
        assert_eq!(replay, TransitionWrite::AlreadyProcessed);

        let sale = repo.get_sale("s1").await.unwrap().unwrap();
        assert_eq!(sale.status, SaleStatus::Approved);
        assert_eq!(sale.transaction_id.as_deref(), Some("tx-1"));
        assert_eq!(sale.updated_at, TimeMs::new(5));
    }

    #[tokio::test]
    async fn test_stale_expected_status_conflicts_without_side_effects() {
        let (repo, _temp) = setup_repo().await;
        seed_product(&repo, "p1", "seller", false).await;
        repo.insert_sale(&pending_sale("s1", "p1", "seller", "100"))
            .await
            .unwrap();
        repo.apply_status_transition("s1", SaleStatus::Pending, SaleStatus::Approved, "tx-1", TimeMs::new(5))
            .await
            .unwrap();

        // A second writer still believing the sale is pending.
        let stale = repo
            .apply_status_transition("s1", SaleStatus::Pending, SaleStatus::Refused, "tx-2", TimeMs::new(6))
            .await
            .unwrap();
        assert_eq!(stale, TransitionWrite::Conflict);
        assert!(!repo
            .is_webhook_event_processed("s1", SaleStatus::Refused, "tx-2")
            .await
            .unwrap());
        assert_eq!(
            repo.get_sale("s1").await.unwrap().unwrap().status,
            SaleStatus::Approved
        );
    }

    #[tokio::test]
    async fn test_settle_commissions_is_idempotent() {
        let (repo, _temp) = setup_repo().await;
        seed_product(&repo, "p1", "seller", false).await;
        repo.insert_sale(&pending_sale("s1", "p1", "seller", "100"))
            .await
            .unwrap();

        let rows = vec![
            NewCommission {
                user_id: "seller".to_string(),
                role: CommissionRole::Producer,
                commission_amount: d("90"),
                commission_percentage: d("90"),
            },
            NewCommission {
                user_id: "co".to_string(),
                role: CommissionRole::Coproducer,
                commission_amount: d("10"),
                commission_percentage: d("10"),
            },
        ];

        let first = repo
            .settle_sale_commissions("s1", &rows, d("10"), d("90"), TimeMs::new(7))
            .await
            .unwrap();
        assert_eq!(first, 2);
        let again = repo
            .settle_sale_commissions("s1", &rows, d("10"), d("80"), TimeMs::new(8))
            .await
            .unwrap();
        assert_eq!(again, 0);

        let sale = repo.get_sale("s1").await.unwrap().unwrap();
        assert_eq!(sale.coproducer_amount, d("10"));
        assert_eq!(sale.net_amount, d("90"));
        assert_eq!(repo.list_commissions_for_sale("s1").await.unwrap().len(), 2);
    }
}

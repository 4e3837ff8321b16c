//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `sales.rs` - Sales, status transitions and commission settlement
//! - `commissions.rs` - Commissions, anticipations, debts and ledger entries
//! - `enrollments.rs` - Courses, students and enrollments
//! - `withdrawals.rs` - Bank accounts, withdrawals and OTPs
//! - `rate_limits.rs` - Shared fixed-window counters
//!
//! Products, co-producers, coupons and account blocks are owned by other
//! services; only the reads this crate needs (plus inserts for seeding) live here.

mod commissions;
mod enrollments;
mod rate_limits;
mod sales;
mod withdrawals;

pub use sales::TransitionWrite;

use thiserror::Error;

use crate::domain::{
    CoProducer, CoProducerStatus, Coupon, Decimal, DiscountType, Product, TimeMs,
};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

#[derive(Debug, Error)]
pub enum CoproducerError {
    #[error("co-producer percentage must be within [0, 100], got {0}")]
    InvalidPercentage(Decimal),
    #[error("active co-producer percentages would total {0}, more than 100")]
    Overallocated(Decimal),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    /// Underlying pool, for ad-hoc reads in tests and health checks.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Products and co-producers
    // =========================================================================

    /// Insert or replace a product.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn upsert_product(&self, product: &Product) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO products (id, owner_user_id, name, has_member_area)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                owner_user_id = excluded.owner_user_id,
                name = excluded.name,
                has_member_area = excluded.has_member_area
            "#,
        )
        .bind(&product.id)
        .bind(&product.owner_user_id)
        .bind(&product.name)
        .bind(product.has_member_area as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_product(&self, product_id: &str) -> Result<Option<Product>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, owner_user_id, name, has_member_area FROM products WHERE id = ?",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Product {
            id: r.get("id"),
            owner_user_id: r.get("owner_user_id"),
            name: r.get("name"),
            has_member_area: r.get::<i64, _>("has_member_area") != 0,
        }))
    }

    /// Product of a sale, resolved by sale id so it can be fetched alongside
    /// the sale itself.
    pub async fn get_product_for_sale(
        &self,
        sale_id: &str,
    ) -> Result<Option<Product>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT p.id, p.owner_user_id, p.name, p.has_member_area
            FROM products p
            JOIN sales s ON s.product_id = p.id
            WHERE s.id = ?
            "#,
        )
        .bind(sale_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Product {
            id: r.get("id"),
            owner_user_id: r.get("owner_user_id"),
            name: r.get("name"),
            has_member_area: r.get::<i64, _>("has_member_area") != 0,
        }))
    }

    /// Insert or update a co-producer relation.
    ///
    /// The active co-producers of a product never total more than 100%.
    ///
    /// # Errors
    /// Returns an error if the percentage is out of range, the product would
    /// be over-allocated, or the write fails.
    pub async fn upsert_coproducer(&self, coproducer: &CoProducer) -> Result<(), CoproducerError> {
        let pct = coproducer.commission_percentage;
        if pct.is_negative() || pct > Decimal::hundred() {
            return Err(CoproducerError::InvalidPercentage(pct));
        }

        let mut tx = self.pool.begin().await?;
        if coproducer.status == CoProducerStatus::Active {
            let others = sqlx::query(
                r#"
                SELECT commission_percentage FROM co_producers
                WHERE product_id = ? AND user_id <> ? AND status = ?
                "#,
            )
            .bind(&coproducer.product_id)
            .bind(&coproducer.user_id)
            .bind(CoProducerStatus::Active.as_str())
            .fetch_all(&mut *tx)
            .await?;

            let mut total = pct;
            for row in &others {
                total = total + get_decimal(row, "commission_percentage")?;
            }
            if total > Decimal::hundred() {
                return Err(CoproducerError::Overallocated(total));
            }
        }

        sqlx::query(
            r#"
            INSERT INTO co_producers (product_id, user_id, commission_percentage, status)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(product_id, user_id) DO UPDATE SET
                commission_percentage = excluded.commission_percentage,
                status = excluded.status
            "#,
        )
        .bind(&coproducer.product_id)
        .bind(&coproducer.user_id)
        .bind(pct.to_canonical_string())
        .bind(coproducer.status.as_str())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Active co-producers of a product, ordered by user id.
    pub async fn active_coproducers(
        &self,
        product_id: &str,
    ) -> Result<Vec<CoProducer>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, user_id, commission_percentage, status
            FROM co_producers
            WHERE product_id = ? AND status = 'active'
            ORDER BY user_id ASC
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(CoProducer {
                    product_id: row.try_get("product_id")?,
                    user_id: row.try_get("user_id")?,
                    commission_percentage: get_decimal(row, "commission_percentage")?,
                    status: CoProducerStatus::parse(&row.try_get::<String, _>("status")?),
                })
            })
            .collect()
    }

    pub async fn is_active_coproducer(
        &self,
        product_id: &str,
        user_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let row = sqlx::query(
            "SELECT 1 FROM co_producers WHERE product_id = ? AND user_id = ? AND status = 'active'",
        )
        .bind(product_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    // =========================================================================
    // Coupons
    // =========================================================================

    pub async fn insert_coupon(&self, coupon: &Coupon) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO coupons (
                id, code, created_by, product_id, discount_type, discount_value,
                active, max_uses, uses_count, expires_at, min_purchase_amount
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&coupon.id)
        .bind(coupon.code.to_uppercase())
        .bind(&coupon.created_by)
        .bind(coupon.product_id.as_deref())
        .bind(coupon.discount_type.as_str())
        .bind(coupon.discount_value.to_canonical_string())
        .bind(coupon.active as i64)
        .bind(coupon.max_uses)
        .bind(coupon.uses_count)
        .bind(coupon.expires_at.map(|t| t.as_ms()))
        .bind(coupon.min_purchase_amount.map(|d| d.to_canonical_string()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Coupons with this code that could apply to `product_id`: product-specific
    /// ones first, then global ones.
    pub async fn find_coupons_for_product(
        &self,
        code: &str,
        product_id: &str,
    ) -> Result<Vec<Coupon>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, code, created_by, product_id, discount_type, discount_value,
                   active, max_uses, uses_count, expires_at, min_purchase_amount
            FROM coupons
            WHERE code = ? AND (product_id = ? OR product_id IS NULL)
            ORDER BY product_id IS NULL ASC, id ASC
            "#,
        )
        .bind(code.trim().to_uppercase())
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Coupon {
                    id: row.try_get("id")?,
                    code: row.try_get("code")?,
                    created_by: row.try_get("created_by")?,
                    product_id: row.try_get("product_id")?,
                    discount_type: DiscountType::parse(&row.try_get::<String, _>("discount_type")?),
                    discount_value: get_decimal(row, "discount_value")?,
                    active: row.try_get::<i64, _>("active")? != 0,
                    max_uses: row.try_get("max_uses")?,
                    uses_count: row.try_get("uses_count")?,
                    expires_at: get_opt_time(row, "expires_at")?,
                    min_purchase_amount: get_opt_decimal(row, "min_purchase_amount")?,
                })
            })
            .collect()
    }

    // =========================================================================
    // Account blocks
    // =========================================================================

    pub async fn block_account(&self, user_id: &str, reason: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO account_blocks (user_id, reason, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET reason = excluded.reason
            "#,
        )
        .bind(user_id)
        .bind(reason)
        .bind(TimeMs::now().as_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn is_account_blocked(&self, user_id: &str) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM account_blocks WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

// =============================================================================
// Row decoding helpers
// =============================================================================

fn decode_error(column: &str, message: String) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::<dyn std::error::Error + Send + Sync>::from(message),
    }
}

/// Decode a TEXT decimal column. A malformed amount is a decode error, never zero.
pub(crate) fn get_decimal(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| decode_error(column, format!("{}: {:?}", e, raw)))
}

pub(crate) fn get_opt_decimal(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<Decimal>, sqlx::Error> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| {
        Decimal::from_str(&s).map_err(|e| decode_error(column, format!("{}: {:?}", e, s)))
    })
    .transpose()
}

pub(crate) fn get_time(row: &SqliteRow, column: &str) -> Result<TimeMs, sqlx::Error> {
    Ok(TimeMs::new(row.try_get::<i64, _>(column)?))
}

pub(crate) fn get_opt_time(row: &SqliteRow, column: &str) -> Result<Option<TimeMs>, sqlx::Error> {
    Ok(row.try_get::<Option<i64>, _>(column)?.map(TimeMs::new))
}

pub(crate) fn get_enum<T>(
    row: &SqliteRow,
    column: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    parse(&raw).ok_or_else(|| decode_error(column, format!("unexpected value {:?}", raw)))
}

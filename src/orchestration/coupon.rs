//! Coupon validation.
//!
//! A coupon only applies to a product when its creator is allowed to sell
//! that product: the owner or an active co-producer. Every failure of that
//! relation reports the same message as an unknown code.

use crate::db::Repository;
use crate::domain::{Coupon, Decimal, DiscountType, TimeMs};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CouponCheck {
    pub coupon_code: String,
    pub product_id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub order_bumps_total: Decimal,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

/// A coupon that passed every check, with the discount worked out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedCoupon {
    #[serde(skip)]
    pub coupon_id: String,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount: Decimal,
    pub base_amount: Decimal,
    pub final_amount: Decimal,
}

#[derive(Debug, Error)]
pub enum CouponError {
    #[error("{0}")]
    BadInput(&'static str),
    #[error("invalid coupon")]
    Invalid,
    #[error("coupon expired")]
    Expired,
    #[error("coupon usage limit reached")]
    Exhausted,
    #[error("minimum purchase for this coupon is {minimum}")]
    BelowMinimum { minimum: Decimal },
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// `percentage` discounts are rounded to cents, `fixed` ones are capped at the base.
pub fn discount_for(coupon: &Coupon, base: Decimal) -> Decimal {
    match coupon.discount_type {
        DiscountType::Percentage => base.percent(coupon.discount_value),
        DiscountType::Fixed => coupon.discount_value.min(base),
    }
    .max_zero()
}

/// `round2(amount * quantity + order_bumps_total)`, or `None` above
/// [`Decimal::max_amount`].
fn order_base(check: &CouponCheck) -> Option<Decimal> {
    let base = check
        .amount
        .checked_mul(Decimal::from(check.quantity))?
        .checked_add(check.order_bumps_total)?
        .round2();
    (base <= Decimal::max_amount()).then_some(base)
}

#[derive(Clone)]
pub struct CouponValidator {
    repo: Arc<Repository>,
}

impl CouponValidator {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    pub async fn validate(&self, check: &CouponCheck, now: TimeMs) -> Result<AppliedCoupon, CouponError> {
        if check.coupon_code.trim().is_empty() {
            return Err(CouponError::BadInput("coupon_code is required"));
        }
        if check.product_id.trim().is_empty() {
            return Err(CouponError::BadInput("product_id is required"));
        }
        if check.quantity < 1 {
            return Err(CouponError::BadInput("quantity must be at least 1"));
        }
        if !check.amount.is_positive() || check.order_bumps_total.is_negative() {
            return Err(CouponError::BadInput("amount must be positive"));
        }
        let base = order_base(check).ok_or(CouponError::BadInput("order total is too large"))?;

        let coupon = self
            .find_usable(&check.coupon_code, &check.product_id)
            .await?
            .ok_or(CouponError::Invalid)?;

        if !coupon.active {
            return Err(CouponError::Invalid);
        }
        if coupon.expires_at.is_some_and(|at| at <= now) {
            return Err(CouponError::Expired);
        }
        if coupon.max_uses.is_some_and(|max| coupon.uses_count >= max) {
            return Err(CouponError::Exhausted);
        }

        if let Some(minimum) = coupon.min_purchase_amount {
            if base < minimum {
                return Err(CouponError::BelowMinimum { minimum });
            }
        }

        let discount = discount_for(&coupon, base);
        Ok(AppliedCoupon {
            coupon_id: coupon.id,
            code: coupon.code,
            discount_type: coupon.discount_type,
            discount,
            base_amount: base,
            final_amount: base - discount,
        })
    }

    /// First candidate whose creator may sell `product_id`.
    async fn find_usable(&self, code: &str, product_id: &str) -> Result<Option<Coupon>, sqlx::Error> {
        let (candidates, product) = tokio::try_join!(
            self.repo.find_coupons_for_product(code, product_id),
            self.repo.get_product(product_id)
        )?;
        let Some(product) = product else {
            debug!(product_id, "coupon checked against unknown product");
            return Ok(None);
        };

        let relations = try_join_all(candidates.iter().map(|coupon| async {
            if coupon.created_by == product.owner_user_id {
                return Ok(true);
            }
            self.repo.is_active_coproducer(product_id, &coupon.created_by).await
        }))
        .await?;

        let mut usable = None;
        for (coupon, related) in candidates.into_iter().zip(relations) {
            if related {
                usable = Some(coupon);
                break;
            }
            warn!(
                coupon_id = %coupon.id,
                created_by = %coupon.created_by,
                product_id,
                "coupon creator has no relation to product"
            );
        }
        Ok(usable)
    }
}

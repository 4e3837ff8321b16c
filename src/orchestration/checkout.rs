//! Checkout initiation: price the order, run the fee breakdown and persist a
//! pending sale. Nothing is written when the fees do not leave the seller a
//! positive net.

use crate::db::Repository;
use crate::domain::{new_id, Decimal, PaymentMethod, Sale, SaleStatus, TimeMs};
use crate::engine::{FeeCalculator, FeeError};
use crate::orchestration::coupon::{CouponCheck, CouponError, CouponValidator};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutRequest {
    pub product_id: String,
    pub buyer_email: String,
    #[serde(default)]
    pub buyer_name: Option<String>,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub affiliate_user_id: Option<String>,
    #[serde(default)]
    pub affiliate_percentage: Option<Decimal>,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("{0}")]
    Invalid(&'static str),
    #[error("product {0} not found")]
    ProductNotFound(String),
    #[error(transparent)]
    Fees(#[from] FeeError),
    #[error(transparent)]
    Coupon(#[from] CouponError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct CheckoutService {
    repo: Arc<Repository>,
    fees: FeeCalculator,
    coupons: CouponValidator,
}

impl CheckoutService {
    pub fn new(repo: Arc<Repository>, fees: FeeCalculator) -> Self {
        let coupons = CouponValidator::new(repo.clone());
        Self {
            repo,
            fees,
            coupons,
        }
    }

    pub async fn create_sale(&self, request: &CheckoutRequest) -> Result<Sale, CheckoutError> {
        let buyer_email = request.buyer_email.trim().to_lowercase();
        if buyer_email.is_empty() || !buyer_email.contains('@') {
            return Err(CheckoutError::Invalid("a valid buyer_email is required"));
        }

        let affiliate_user_id = request
            .affiliate_user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        let affiliate_percentage = match (&affiliate_user_id, request.affiliate_percentage) {
            (Some(_), Some(pct)) => Some(pct),
            (Some(_), None) => return Err(CheckoutError::Invalid("affiliate_percentage is required")),
            (None, _) => None,
        };

        let product = self
            .repo
            .get_product(&request.product_id)
            .await?
            .ok_or_else(|| CheckoutError::ProductNotFound(request.product_id.clone()))?;
        if affiliate_user_id.as_deref() == Some(product.owner_user_id.as_str()) {
            return Err(CheckoutError::Invalid("sellers cannot be their own affiliate"));
        }

        let now = TimeMs::now();
        let mut gross = request.amount;
        let mut redeemed = None;
        if let Some(code) = request.coupon_code.as_deref().filter(|c| !c.trim().is_empty()) {
            let applied = self
                .coupons
                .validate(
                    &CouponCheck {
                        coupon_code: code.to_string(),
                        product_id: product.id.clone(),
                        amount: request.amount,
                        order_bumps_total: Decimal::zero(),
                        quantity: 1,
                    },
                    now,
                )
                .await?;
            gross = applied.final_amount;
            redeemed = Some(applied.coupon_id);
        }

        let fees = self
            .fees
            .calculate(gross, request.payment_method, affiliate_percentage)?;

        let sale = Sale {
            id: new_id(),
            product_id: product.id.clone(),
            seller_user_id: product.owner_user_id.clone(),
            buyer_email,
            buyer_name: request.buyer_name.clone(),
            amount: fees.gross,
            payment_method: request.payment_method,
            payment_fee: fees.payment_fee,
            platform_fee: fees.platform_fee,
            affiliate_user_id,
            affiliate_percentage: affiliate_percentage.unwrap_or_default(),
            commission_amount: fees.affiliate_commission,
            coproducer_amount: Decimal::zero(),
            net_amount: fees.net_amount,
            status: SaleStatus::Pending,
            transaction_id: None,
            created_at: now,
            updated_at: now,
        };
        match &redeemed {
            Some(coupon_id) => {
                if !self.repo.insert_sale_redeeming_coupon(&sale, coupon_id).await? {
                    return Err(CouponError::Exhausted.into());
                }
            }
            None => self.repo.insert_sale(&sale).await?,
        }
        info!(
            sale_id = %sale.id,
            product_id = %sale.product_id,
            amount = %sale.amount,
            method = %sale.payment_method,
            "sale created"
        );
        Ok(sale)
    }
}

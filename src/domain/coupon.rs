//! Discount coupons.

use crate::domain::{Decimal, TimeMs};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::Fixed => "fixed",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "fixed" {
            DiscountType::Fixed
        } else {
            DiscountType::Percentage
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: String,
    /// Stored upper-case.
    pub code: String,
    pub created_by: String,
    /// None means the coupon applies to every product its creator may sell.
    pub product_id: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub active: bool,
    pub max_uses: Option<i64>,
    pub uses_count: i64,
    pub expires_at: Option<TimeMs>,
    pub min_purchase_amount: Option<Decimal>,
}

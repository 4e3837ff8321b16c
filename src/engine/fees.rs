//! Payment-method fees, platform fee and commission splits.
//!
//! Every intermediate monetary value is rounded to 2 dp half-up so that
//! `gross == net + payment_fee + platform_fee + affiliate_commission` holds
//! exactly on the rounded figures.

use crate::domain::{Decimal, PaymentMethod};
use serde::Serialize;
use thiserror::Error;

/// A `(percentage, flat fee)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeRate {
    pub percentage: Decimal,
    pub flat_fee: Decimal,
}

impl FeeRate {
    pub fn new(percentage: Decimal, flat_fee: Decimal) -> Self {
        Self {
            percentage,
            flat_fee,
        }
    }

    /// `round2(round2(amount * percentage / 100) + flat_fee)`, or `None` on overflow.
    pub fn apply(&self, amount: Decimal) -> Option<Decimal> {
        let fee = amount.checked_percent(self.percentage)?.checked_add(self.flat_fee)?;
        Some(fee.round2())
    }
}

/// Per-method fee table plus the platform slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeSchedule {
    pub pix: FeeRate,
    pub credit_card: FeeRate,
    pub debit_card: FeeRate,
    pub boleto: FeeRate,
    pub platform_percentage: Decimal,
}

impl FeeSchedule {
    pub fn rate(&self, method: PaymentMethod) -> FeeRate {
        match method {
            PaymentMethod::Pix => self.pix,
            PaymentMethod::CreditCard => self.credit_card,
            PaymentMethod::DebitCard => self.debit_card,
            PaymentMethod::Boleto => self.boleto,
        }
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            pix: FeeRate::new(Decimal::from_parts(499, 2), Decimal::from_parts(149, 2)),
            credit_card: FeeRate::new(Decimal::from_parts(699, 2), Decimal::from_parts(149, 2)),
            debit_card: FeeRate::new(Decimal::from_parts(599, 2), Decimal::from_parts(149, 2)),
            boleto: FeeRate::new(Decimal::from_parts(399, 2), Decimal::from_parts(299, 2)),
            platform_percentage: Decimal::zero(),
        }
    }
}

/// Breakdown of a gross amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeResult {
    pub gross: Decimal,
    pub payment_fee: Decimal,
    pub platform_fee: Decimal,
    pub affiliate_commission: Decimal,
    pub net_amount: Decimal,
}

impl FeeResult {
    pub fn total_fees(&self) -> Decimal {
        self.payment_fee + self.platform_fee + self.affiliate_commission
    }
}

/// A co-producer's cut of a settled sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoproducerShare {
    pub user_id: String,
    pub percentage: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeeError {
    #[error("gross amount must be positive, got {0}")]
    NonPositiveGross(Decimal),
    #[error("gross amount {0} exceeds the accepted maximum")]
    GrossTooLarge(Decimal),
    #[error("affiliate commission percentage must be within [0, 100], got {0}")]
    InvalidAffiliatePercentage(Decimal),
    #[error("fees and commissions ({total_fees}) consume the whole sale ({gross})")]
    FeesExceedGross { gross: Decimal, total_fees: Decimal },
    #[error("co-producer percentages add up to {0}, more than 100")]
    CoproducerPercentageOverflow(Decimal),
}

/// Pure fee calculator over an injected schedule.
#[derive(Debug, Clone, Default)]
pub struct FeeCalculator {
    schedule: FeeSchedule,
}

impl FeeCalculator {
    pub fn new(schedule: FeeSchedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &FeeSchedule {
        &self.schedule
    }

    /// Compute the fee breakdown for a sale.
    ///
    /// `affiliate_percentage` is `None` when the sale has no affiliate.
    ///
    /// # Errors
    /// Returns an error when the gross is not positive or above
    /// [`Decimal::max_amount`], the affiliate percentage is out of range, or
    /// nothing would be left for the seller.
    pub fn calculate(
        &self,
        gross: Decimal,
        method: PaymentMethod,
        affiliate_percentage: Option<Decimal>,
    ) -> Result<FeeResult, FeeError> {
        if !gross.is_positive() {
            return Err(FeeError::NonPositiveGross(gross));
        }
        if gross > Decimal::max_amount() {
            return Err(FeeError::GrossTooLarge(gross));
        }

        let affiliate_percentage = affiliate_percentage.unwrap_or_default();
        if affiliate_percentage.is_negative() || affiliate_percentage > Decimal::hundred() {
            return Err(FeeError::InvalidAffiliatePercentage(affiliate_percentage));
        }

        let gross = gross.round2();
        let overflow = || FeeError::GrossTooLarge(gross);
        let payment_fee = self.schedule.rate(method).apply(gross).ok_or_else(overflow)?;
        let platform_fee = gross
            .checked_percent(self.schedule.platform_percentage)
            .ok_or_else(overflow)?;
        let affiliate_commission = gross.checked_percent(affiliate_percentage).ok_or_else(overflow)?;
        let net_amount = gross - payment_fee - platform_fee - affiliate_commission;

        let result = FeeResult {
            gross,
            payment_fee,
            platform_fee,
            affiliate_commission,
            net_amount,
        };

        if !net_amount.is_positive() {
            return Err(FeeError::FeesExceedGross {
                gross,
                total_fees: result.total_fees(),
            });
        }

        Ok(result)
    }
}

/// Split co-producer shares off a seller's net amount.
///
/// # Errors
/// Returns an error if the percentages sum above 100.
pub fn split_coproducers(
    net_amount: Decimal,
    coproducers: &[(String, Decimal)],
) -> Result<Vec<CoproducerShare>, FeeError> {
    let total_percentage: Decimal = coproducers.iter().map(|(_, pct)| *pct).sum();
    if total_percentage > Decimal::hundred() {
        return Err(FeeError::CoproducerPercentageOverflow(total_percentage));
    }

    Ok(coproducers
        .iter()
        .filter(|(_, pct)| pct.is_positive())
        .map(|(user_id, pct)| CoproducerShare {
            user_id: user_id.clone(),
            percentage: *pct,
            amount: net_amount.percent(*pct),
        })
        .collect())
}

//! Commission rows for an approved sale.

use crate::db::Repository;
use crate::domain::{
    CoProducer, CommissionRole, Decimal, NewCommission, Product, Sale, TimeMs,
};
use crate::engine::{split_coproducers, FeeError};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error(transparent)]
    Fees(#[from] FeeError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Commission rows for a sale plus the resulting co-producer total and
/// producer net.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommissionPlan {
    pub rows: Vec<NewCommission>,
    pub coproducer_total: Decimal,
    pub producer_net: Decimal,
}

/// Work out every beneficiary's share of a sale.
///
/// The affiliate keeps the commission taken off the gross at checkout.
/// Co-producers are paid from the seller's net, and the producer keeps the
/// remainder. The seller is never treated as their own co-producer.
pub fn plan_commissions(sale: &Sale, coproducers: &[CoProducer]) -> Result<CommissionPlan, FeeError> {
    let pairs: Vec<(String, Decimal)> = coproducers
        .iter()
        .filter(|c| c.user_id != sale.seller_user_id)
        .map(|c| (c.user_id.clone(), c.commission_percentage))
        .collect();

    let shares = split_coproducers(sale.net_amount, &pairs)?;
    let coproducer_total: Decimal = shares.iter().map(|s| s.amount).sum();
    let coproducer_percentage: Decimal = shares.iter().map(|s| s.percentage).sum();
    let producer_net = sale.net_amount - coproducer_total;

    let mut rows = Vec::with_capacity(shares.len() + 2);

    if let Some(affiliate) = sale.affiliate_user_id.as_ref() {
        if sale.commission_amount.is_positive() {
            rows.push(NewCommission {
                user_id: affiliate.clone(),
                role: CommissionRole::Affiliate,
                commission_amount: sale.commission_amount,
                commission_percentage: sale.affiliate_percentage,
            });
        }
    }

    rows.extend(shares.into_iter().map(|share| NewCommission {
        user_id: share.user_id,
        role: CommissionRole::Coproducer,
        commission_amount: share.amount,
        commission_percentage: share.percentage,
    }));

    rows.push(NewCommission {
        user_id: sale.seller_user_id.clone(),
        role: CommissionRole::Producer,
        commission_amount: producer_net,
        commission_percentage: Decimal::hundred() - coproducer_percentage,
    });

    Ok(CommissionPlan {
        rows,
        coproducer_total,
        producer_net,
    })
}

/// Persist the commission plan for an approved sale. Safe to repeat: once
/// any row exists for the sale, nothing is planned again.
pub async fn settle_commissions(
    repo: &Repository,
    sale: &Sale,
    product: &Product,
) -> Result<usize, SettlementError> {
    if sale.coproducer_amount.is_positive()
        || !repo.list_commissions_for_sale(&sale.id).await?.is_empty()
    {
        return Ok(0);
    }

    let coproducers = repo.active_coproducers(&product.id).await?;
    let plan = plan_commissions(sale, &coproducers)?;
    let inserted = repo
        .settle_sale_commissions(
            &sale.id,
            &plan.rows,
            plan.coproducer_total,
            plan.producer_net,
            TimeMs::now(),
        )
        .await?;

    if inserted > 0 {
        info!(
            sale_id = %sale.id,
            commissions = inserted,
            coproducer_total = %plan.coproducer_total,
            producer_net = %plan.producer_net,
            "commissions settled"
        );
    }
    Ok(inserted)
}

//! Early payout of pending commissions.
//!
//! The database offers no transaction spanning the whole operation, so the
//! writes run as a sequence (anticipation, items, commission claims, ledger
//! credit) and a failure at any step undoes the earlier ones in reverse.

use crate::config::AnticipationConfig;
use crate::db::Repository;
use crate::dispatch::{emit_best_effort, EventSink, OutboundEvent};
use crate::domain::{
    new_id, AnticipationDebt, AnticipationItem, Commission, CommissionAnticipation, Decimal,
    LedgerEntry, LedgerEntryKind, SaleStatus, TimeMs,
};
use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Persistence used while processing an anticipation.
#[async_trait]
pub trait AnticipationStore: Send + Sync {
    async fn has_outstanding_debt(&self, user_id: &str) -> Result<bool, sqlx::Error>;
    async fn fetch_claimable_commissions(
        &self,
        user_id: &str,
        ids: &[String],
    ) -> Result<Vec<(Commission, SaleStatus)>, sqlx::Error>;
    async fn anticipation_exists_for_key(&self, key: &str) -> Result<bool, sqlx::Error>;
    async fn insert_anticipation(
        &self,
        anticipation: &CommissionAnticipation,
    ) -> Result<(), sqlx::Error>;
    async fn insert_anticipation_items(&self, items: &[AnticipationItem])
        -> Result<(), sqlx::Error>;
    async fn mark_commissions_anticipated(
        &self,
        ids: &[String],
        anticipation_id: &str,
        now: TimeMs,
    ) -> Result<usize, sqlx::Error>;
    async fn insert_ledger_entry(&self, entry: &LedgerEntry) -> Result<(), sqlx::Error>;
    async fn revert_anticipated_commissions(&self, anticipation_id: &str)
        -> Result<u64, sqlx::Error>;
    async fn delete_anticipation_items(&self, anticipation_id: &str) -> Result<u64, sqlx::Error>;
    async fn delete_anticipation(&self, anticipation_id: &str) -> Result<u64, sqlx::Error>;
}

#[async_trait]
impl AnticipationStore for Repository {
    async fn has_outstanding_debt(&self, user_id: &str) -> Result<bool, sqlx::Error> {
        Repository::has_outstanding_debt(self, user_id).await
    }

    async fn fetch_claimable_commissions(
        &self,
        user_id: &str,
        ids: &[String],
    ) -> Result<Vec<(Commission, SaleStatus)>, sqlx::Error> {
        Repository::fetch_claimable_commissions(self, user_id, ids).await
    }

    async fn anticipation_exists_for_key(&self, key: &str) -> Result<bool, sqlx::Error> {
        Repository::anticipation_exists_for_key(self, key).await
    }

    async fn insert_anticipation(
        &self,
        anticipation: &CommissionAnticipation,
    ) -> Result<(), sqlx::Error> {
        Repository::insert_anticipation(self, anticipation).await
    }

    async fn insert_anticipation_items(
        &self,
        items: &[AnticipationItem],
    ) -> Result<(), sqlx::Error> {
        Repository::insert_anticipation_items(self, items).await
    }

    async fn mark_commissions_anticipated(
        &self,
        ids: &[String],
        anticipation_id: &str,
        now: TimeMs,
    ) -> Result<usize, sqlx::Error> {
        Repository::mark_commissions_anticipated(self, ids, anticipation_id, now).await
    }

    async fn insert_ledger_entry(&self, entry: &LedgerEntry) -> Result<(), sqlx::Error> {
        Repository::insert_ledger_entry(self, entry).await
    }

    async fn revert_anticipated_commissions(
        &self,
        anticipation_id: &str,
    ) -> Result<u64, sqlx::Error> {
        Repository::revert_anticipated_commissions(self, anticipation_id).await
    }

    async fn delete_anticipation_items(&self, anticipation_id: &str) -> Result<u64, sqlx::Error> {
        Repository::delete_anticipation_items(self, anticipation_id).await
    }

    async fn delete_anticipation(&self, anticipation_id: &str) -> Result<u64, sqlx::Error> {
        Repository::delete_anticipation(self, anticipation_id).await
    }
}

#[derive(Debug, Error)]
pub enum AnticipationError {
    #[error("no commissions selected")]
    EmptyRequest,
    #[error("commission list contains duplicates")]
    DuplicateCommissions,
    #[error("outstanding anticipation debt must be settled first")]
    OutstandingDebt,
    #[error("{found} of {requested} commissions are available for anticipation")]
    CommissionsUnavailable { requested: usize, found: usize },
    #[error("commission {0} belongs to a sale that is not approved")]
    SaleNotApproved(String),
    #[error("total {total} is below the minimum anticipation amount of {minimum}")]
    BelowMinimum { total: Decimal, minimum: Decimal },
    #[error("these commissions were already anticipated")]
    AlreadyProcessed,
    #[error("anticipation could not be completed: {0}")]
    Incomplete(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnticipationResult {
    pub anticipation_id: String,
    pub total_original: Decimal,
    pub fee_amount: Decimal,
    pub total_anticipated: Decimal,
}

/// A commission offered for anticipation with its fee worked out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EligibleCommission {
    #[serde(flatten)]
    pub commission: Commission,
    pub fee_amount: Decimal,
    pub net_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnticipationOverview {
    pub commissions: Vec<EligibleCommission>,
    pub debts: Vec<AnticipationDebt>,
    pub anticipations: Vec<CommissionAnticipation>,
    pub fee_percentage: Decimal,
    pub min_amount: Decimal,
}

/// `sha256("{user_id}:{sorted ids joined by ','}")`, hex encoded.
pub fn idempotency_key(user_id: &str, commission_ids: &[String]) -> String {
    let mut sorted: Vec<&str> = commission_ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let digest = Sha256::digest(format!("{}:{}", user_id, sorted.join(",")).as_bytes());
    hex::encode(digest)
}

/// Per-item fees that add up exactly to `total_fee`; the last item absorbs
/// the rounding difference.
fn allocate_fees(
    commissions: &[Commission],
    fee_percentage: Decimal,
    total_fee: Decimal,
) -> Vec<Decimal> {
    let mut fees: Vec<Decimal> = commissions
        .iter()
        .map(|c| c.commission_amount.percent(fee_percentage))
        .collect();
    if let Some((last, rest)) = fees.split_last_mut() {
        let allocated: Decimal = rest.iter().copied().sum();
        *last = total_fee - allocated;
    }
    fees
}

#[derive(Clone)]
pub struct AnticipationEngine {
    repo: Arc<Repository>,
    store: Arc<dyn AnticipationStore>,
    config: AnticipationConfig,
    sink: Arc<dyn EventSink>,
}

impl AnticipationEngine {
    pub fn new(repo: Arc<Repository>, config: AnticipationConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            store: repo.clone(),
            repo,
            config,
            sink,
        }
    }

    /// Route writes through a different store (fault injection in tests).
    pub fn with_store(mut self, store: Arc<dyn AnticipationStore>) -> Self {
        self.store = store;
        self
    }

    pub fn config(&self) -> &AnticipationConfig {
        &self.config
    }

    pub async fn get_data(&self, user_id: &str) -> Result<AnticipationOverview, sqlx::Error> {
        let (eligible, debts, anticipations) = tokio::try_join!(
            self.repo.list_eligible_commissions(user_id),
            self.repo.list_outstanding_debts(user_id),
            self.repo.list_anticipations(user_id)
        )?;

        let commissions = eligible
            .into_iter()
            .map(|commission| {
                let fee_amount = commission
                    .commission_amount
                    .percent(self.config.fee_percentage);
                EligibleCommission {
                    net_amount: commission.commission_amount - fee_amount,
                    fee_amount,
                    commission,
                }
            })
            .collect();

        Ok(AnticipationOverview {
            commissions,
            debts,
            anticipations,
            fee_percentage: self.config.fee_percentage,
            min_amount: self.config.min_amount,
        })
    }

    /// Convert the selected commissions into an anticipation.
    pub async fn process(
        &self,
        user_id: &str,
        commission_ids: &[String],
    ) -> Result<AnticipationResult, AnticipationError> {
        if commission_ids.is_empty() {
            return Err(AnticipationError::EmptyRequest);
        }
        let unique: HashSet<&String> = commission_ids.iter().collect();
        if unique.len() != commission_ids.len() {
            return Err(AnticipationError::DuplicateCommissions);
        }

        if self.store.has_outstanding_debt(user_id).await? {
            warn!(user_id, "anticipation blocked by outstanding debt");
            return Err(AnticipationError::OutstandingDebt);
        }

        // A repeat of a completed selection finds its commissions claimed;
        // report it as the duplicate it is.
        let key = idempotency_key(user_id, commission_ids);
        if self.store.anticipation_exists_for_key(&key).await? {
            info!(user_id, "anticipation already processed for this selection");
            return Err(AnticipationError::AlreadyProcessed);
        }

        let claimable = self
            .store
            .fetch_claimable_commissions(user_id, commission_ids)
            .await?;
        if claimable.len() != commission_ids.len() {
            // A concurrent submission of the same selection may have claimed them.
            if self.store.anticipation_exists_for_key(&key).await? {
                return Err(AnticipationError::AlreadyProcessed);
            }
            warn!(user_id, requested = commission_ids.len(), found = claimable.len(), "commissions unavailable");
            return Err(AnticipationError::CommissionsUnavailable {
                requested: commission_ids.len(),
                found: claimable.len(),
            });
        }
        if let Some((commission, status)) = claimable
            .iter()
            .find(|(_, status)| !status.is_wallet_eligible())
        {
            warn!(user_id, commission_id = %commission.id, sale_status = %status, "sale not approved");
            return Err(AnticipationError::SaleNotApproved(commission.id.clone()));
        }

        let mut commissions: Vec<Commission> = claimable.into_iter().map(|(c, _)| c).collect();
        commissions.sort_by(|a, b| a.id.cmp(&b.id));

        let total_original: Decimal = commissions.iter().map(|c| c.commission_amount).sum();
        if total_original < self.config.min_amount {
            info!(user_id, total = %total_original, minimum = %self.config.min_amount, "anticipation below minimum");
            return Err(AnticipationError::BelowMinimum {
                total: total_original,
                minimum: self.config.min_amount,
            });
        }

        let fee_amount = total_original.percent(self.config.fee_percentage);
        let total_anticipated = total_original - fee_amount;
        let now = TimeMs::now();

        let anticipation = CommissionAnticipation {
            id: new_id(),
            user_id: user_id.to_string(),
            total_original_amount: total_original,
            total_anticipated_amount: total_anticipated,
            fee_percentage: self.config.fee_percentage,
            fee_amount,
            status: "completed".to_string(),
            completed_at: Some(now),
            idempotency_key: key,
            created_at: now,
        };

        match self.store.insert_anticipation(&anticipation).await {
            Ok(()) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(AnticipationError::AlreadyProcessed);
            }
            Err(e) => return Err(e.into()),
        }

        let fees = allocate_fees(&commissions, self.config.fee_percentage, fee_amount);
        let items: Vec<AnticipationItem> = commissions
            .iter()
            .zip(fees)
            .map(|(c, fee)| AnticipationItem {
                anticipation_id: anticipation.id.clone(),
                commission_id: c.id.clone(),
                original_amount: c.commission_amount,
                fee_amount: fee,
                anticipated_amount: c.commission_amount - fee,
            })
            .collect();

        if let Err(e) = self.store.insert_anticipation_items(&items).await {
            return Err(self.compensate(&anticipation.id, false, e.to_string()).await);
        }

        let ids: Vec<String> = commissions.iter().map(|c| c.id.clone()).collect();
        match self
            .store
            .mark_commissions_anticipated(&ids, &anticipation.id, now)
            .await
        {
            Ok(claimed) if claimed == ids.len() => {}
            Ok(claimed) => {
                let reason = format!("claimed {} of {} commissions", claimed, ids.len());
                return Err(self.compensate(&anticipation.id, false, reason).await);
            }
            Err(e) => return Err(self.compensate(&anticipation.id, false, e.to_string()).await),
        }

        let credit = LedgerEntry {
            id: new_id(),
            user_id: user_id.to_string(),
            amount: total_anticipated,
            kind: LedgerEntryKind::AnticipationCredit,
            reference_id: anticipation.id.clone(),
            created_at: now,
        };
        if let Err(e) = self.store.insert_ledger_entry(&credit).await {
            return Err(self.compensate(&anticipation.id, true, e.to_string()).await);
        }

        info!(
            user_id,
            anticipation_id = %anticipation.id,
            commissions = ids.len(),
            total_original = %total_original,
            fee = %fee_amount,
            "anticipation completed"
        );

        emit_best_effort(
            self.sink.as_ref(),
            OutboundEvent::AnticipationCompleted {
                anticipation_id: anticipation.id.clone(),
                user_id: user_id.to_string(),
                total_original,
                fee_amount,
                total_anticipated,
            },
        )
        .await;

        Ok(AnticipationResult {
            anticipation_id: anticipation.id,
            total_original,
            fee_amount,
            total_anticipated,
        })
    }

    /// Undo a partially written anticipation, newest step first.
    async fn compensate(
        &self,
        anticipation_id: &str,
        commissions_claimed: bool,
        cause: String,
    ) -> AnticipationError {
        warn!(anticipation_id, cause = %cause, "anticipation failed, compensating");
        let mut failures = Vec::new();

        if commissions_claimed {
            if let Err(e) = self.store.revert_anticipated_commissions(anticipation_id).await {
                failures.push(format!("revert commissions: {}", e));
            }
        }
        if let Err(e) = self.store.delete_anticipation_items(anticipation_id).await {
            failures.push(format!("delete items: {}", e));
        }
        if let Err(e) = self.store.delete_anticipation(anticipation_id).await {
            failures.push(format!("delete anticipation: {}", e));
        }

        if !failures.is_empty() {
            error!(
                anticipation_id,
                failures = ?failures,
                "CRITICAL: anticipation compensation failed, manual reconciliation required"
            );
        }
        AnticipationError::Incomplete(cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::test_support::*;
    use crate::dispatch::RecordingEventSink;
    use crate::domain::{CommissionRole, CommissionStatus, NewCommission};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum FailAt {
        Items,
        Claim,
        Ledger,
    }

    /// Delegates to the repository but fails one write step.
    struct FaultyStore {
        inner: Arc<Repository>,
        fail_at: FailAt,
    }

    fn injected() -> sqlx::Error {
        sqlx::Error::Protocol("injected failure".to_string())
    }

    #[async_trait]
    impl AnticipationStore for FaultyStore {
        async fn has_outstanding_debt(&self, user_id: &str) -> Result<bool, sqlx::Error> {
            self.inner.has_outstanding_debt(user_id).await
        }
        async fn fetch_claimable_commissions(
            &self,
            user_id: &str,
            ids: &[String],
        ) -> Result<Vec<(Commission, SaleStatus)>, sqlx::Error> {
            self.inner.fetch_claimable_commissions(user_id, ids).await
        }
        async fn anticipation_exists_for_key(&self, key: &str) -> Result<bool, sqlx::Error> {
            self.inner.anticipation_exists_for_key(key).await
        }
        async fn insert_anticipation(
            &self,
            anticipation: &CommissionAnticipation,
        ) -> Result<(), sqlx::Error> {
            self.inner.insert_anticipation(anticipation).await
        }
        async fn insert_anticipation_items(
            &self,
            items: &[AnticipationItem],
        ) -> Result<(), sqlx::Error> {
            if self.fail_at == FailAt::Items {
                return Err(injected());
            }
            self.inner.insert_anticipation_items(items).await
        }
        async fn mark_commissions_anticipated(
            &self,
            ids: &[String],
            anticipation_id: &str,
            now: TimeMs,
        ) -> Result<usize, sqlx::Error> {
            if self.fail_at == FailAt::Claim {
                return Err(injected());
            }
            self.inner
                .mark_commissions_anticipated(ids, anticipation_id, now)
                .await
        }
        async fn insert_ledger_entry(&self, entry: &LedgerEntry) -> Result<(), sqlx::Error> {
            if self.fail_at == FailAt::Ledger {
                return Err(injected());
            }
            self.inner.insert_ledger_entry(entry).await
        }
        async fn revert_anticipated_commissions(
            &self,
            anticipation_id: &str,
        ) -> Result<u64, sqlx::Error> {
            self.inner.revert_anticipated_commissions(anticipation_id).await
        }
        async fn delete_anticipation_items(
            &self,
            anticipation_id: &str,
        ) -> Result<u64, sqlx::Error> {
            self.inner.delete_anticipation_items(anticipation_id).await
        }
        async fn delete_anticipation(&self, anticipation_id: &str) -> Result<u64, sqlx::Error> {
            self.inner.delete_anticipation(anticipation_id).await
        }
    }

    /// Approved sale carrying one affiliate commission of `amount` for "aff".
    async fn approved_commission(repo: &Repository, sale_id: &str, amount: &str) -> String {
        repo.insert_sale(&pending_sale(sale_id, "p1", "seller", "500"))
            .await
            .unwrap();
        repo.apply_status_transition(sale_id, SaleStatus::Pending, SaleStatus::Approved, "tx", TimeMs::new(2))
            .await
            .unwrap();
        repo.settle_sale_commissions(
            sale_id,
            &[NewCommission {
                user_id: "aff".to_string(),
                role: CommissionRole::Affiliate,
                commission_amount: d(amount),
                commission_percentage: d("10"),
            }],
            Decimal::zero(),
            d("500"),
            TimeMs::new(3),
        )
        .await
        .unwrap();
        repo.list_commissions_for_sale(sale_id).await.unwrap()[0].id.clone()
    }

    async fn setup() -> (AnticipationEngine, Arc<Repository>, Arc<RecordingEventSink>, tempfile::TempDir, Vec<String>) {
        let (repo, temp) = setup_repo().await;
        seed_product(&repo, "p1", "seller", false).await;
        let mut ids = Vec::new();
        for (sale, amount) in [("s1", "30"), ("s2", "50"), ("s3", "40")] {
            ids.push(approved_commission(&repo, sale, amount).await);
        }
        let sink = Arc::new(RecordingEventSink::new());
        let engine = AnticipationEngine::new(repo.clone(), AnticipationConfig::default(), sink.clone());
        (engine, repo, sink, temp, ids)
    }

    #[tokio::test]
    async fn test_anticipation_of_three_commissions() {
        let (engine, repo, sink, _temp, ids) = setup().await;

        let result = engine.process("aff", &ids).await.unwrap();
        assert_eq!(result.total_original, d("120"));
        assert_eq!(result.fee_amount, d("18.60"));
        assert_eq!(result.total_anticipated, d("101.40"));

        let items = repo.list_anticipation_items(&result.anticipation_id).await.unwrap();
        assert_eq!(items.len(), 3);
        let item_fees: Decimal = items.iter().map(|i| i.fee_amount).sum();
        assert_eq!(item_fees, d("18.60"));

        let entries = repo.list_ledger_entries("aff").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount, d("101.40"));

        for sale in ["s1", "s2", "s3"] {
            let commission = &repo.list_commissions_for_sale(sale).await.unwrap()[0];
            assert_eq!(commission.status, CommissionStatus::Anticipated);
            assert_eq!(commission.anticipation_id.as_deref(), Some(result.anticipation_id.as_str()));
        }
        assert_eq!(sink.kinds(), vec!["anticipation_completed"]);
    }

    #[tokio::test]
    async fn test_below_minimum_rejected() {
        let (engine, _repo, _sink, _temp, ids) = setup().await;
        let err = engine.process("aff", &ids[2..3]).await.unwrap_err();
        assert!(matches!(err, AnticipationError::BelowMinimum { .. }));
    }

    #[tokio::test]
    async fn test_double_submit_yields_one_anticipation() {
        let (engine, repo, _sink, _temp, ids) = setup().await;
        let (first, second) = tokio::join!(engine.process("aff", &ids), engine.process("aff", &ids));

        let successes = [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1);
        let failure = first.err().or(second.err()).unwrap();
        assert!(matches!(failure, AnticipationError::AlreadyProcessed));
        assert_eq!(repo.list_anticipations("aff").await.unwrap().len(), 1);

        let again = engine.process("aff", &ids).await.unwrap_err();
        assert!(matches!(again, AnticipationError::AlreadyProcessed));
    }

    #[tokio::test]
    async fn test_existing_key_is_conflict() {
        let (engine, repo, _sink, _temp, ids) = setup().await;
        repo.insert_anticipation(&CommissionAnticipation {
            id: "prior".to_string(),
            user_id: "aff".to_string(),
            total_original_amount: d("120"),
            total_anticipated_amount: d("101.40"),
            fee_percentage: d("15.5"),
            fee_amount: d("18.60"),
            status: "completed".to_string(),
            completed_at: None,
            idempotency_key: idempotency_key("aff", &ids),
            created_at: TimeMs::new(1),
        })
        .await
        .unwrap();

        let mut reversed = ids.clone();
        reversed.reverse();
        let err = engine.process("aff", &reversed).await.unwrap_err();
        assert!(matches!(err, AnticipationError::AlreadyProcessed));
    }

    #[tokio::test]
    async fn test_compensation_restores_state_at_every_step() {
        for fail_at in [FailAt::Items, FailAt::Claim, FailAt::Ledger] {
            let (engine, repo, sink, _temp, ids) = setup().await;
            let engine = engine.with_store(Arc::new(FaultyStore {
                inner: repo.clone(),
                fail_at,
            }));

            let err = engine.process("aff", &ids).await.unwrap_err();
            assert!(matches!(err, AnticipationError::Incomplete(_)), "{:?}", fail_at);

            assert!(repo.list_anticipations("aff").await.unwrap().is_empty());
            assert!(repo.list_ledger_entries("aff").await.unwrap().is_empty());
            let eligible = repo.list_eligible_commissions("aff").await.unwrap();
            assert_eq!(eligible.len(), 3, "{:?}", fail_at);
            assert!(eligible.iter().all(|c| c.anticipated_at.is_none()));
            assert!(sink.events().is_empty());
        }
    }

    #[tokio::test]
    async fn test_rejections_before_any_write() {
        let (engine, repo, _sink, _temp, ids) = setup().await;

        assert!(matches!(engine.process("aff", &[]).await, Err(AnticipationError::EmptyRequest)));
        let dup = vec![ids[0].clone(), ids[0].clone()];
        assert!(matches!(
            engine.process("aff", &dup).await,
            Err(AnticipationError::DuplicateCommissions)
        ));
        // Someone else's commissions are not claimable.
        assert!(matches!(
            engine.process("intruder", &ids).await,
            Err(AnticipationError::CommissionsUnavailable { requested: 3, found: 0 })
        ));

        repo.apply_status_transition("s2", SaleStatus::Approved, SaleStatus::Refunded, "tx-r", TimeMs::new(9))
            .await
            .unwrap();
        let err = engine.process("aff", &ids).await.unwrap_err();
        assert!(matches!(err, AnticipationError::SaleNotApproved(_)));
        assert!(repo.list_anticipations("aff").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_outstanding_debt_blocks() {
        let (engine, repo, _sink, _temp, ids) = setup().await;
        engine.process("aff", &ids[0..2]).await.unwrap();
        repo.apply_status_transition("s1", SaleStatus::Approved, SaleStatus::Chargeback, "tx-c", TimeMs::new(9))
            .await
            .unwrap();
        assert_eq!(repo.record_debts_for_sale("s1", TimeMs::new(10)).await.unwrap(), 1);

        let err = engine.process("aff", &ids[2..]).await.unwrap_err();
        assert!(matches!(err, AnticipationError::OutstandingDebt));
        // Debt is checked before anything else, even a repeated selection.
        let err = engine.process("aff", &ids[0..2]).await.unwrap_err();
        assert!(matches!(err, AnticipationError::OutstandingDebt));

        let overview = engine.get_data("aff").await.unwrap();
        assert_eq!(overview.debts.len(), 1);
        assert_eq!(overview.anticipations.len(), 1);
        assert_eq!(overview.commissions.len(), 1);
        assert_eq!(overview.commissions[0].fee_amount, d("6.20"));
        assert_eq!(overview.commissions[0].net_amount, d("33.80"));
    }

    #[test]
    fn test_idempotency_key_ignores_order() {
        let a = idempotency_key("u1", &["b".to_string(), "a".to_string()]);
        let b = idempotency_key("u1", &["a".to_string(), "b".to_string()]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, idempotency_key("u2", &["a".to_string(), "b".to_string()]));
    }
}

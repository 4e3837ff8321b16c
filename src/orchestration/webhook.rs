//! Gateway webhook state machine.
//!
//! A delivery is resolved to a sale, mapped to a canonical status, checked
//! for idempotency and monotonicity, and then applied with a compare-and-swap
//! on the stored status. Only after the write commits do the side effects run
//! (commission settlement, enrollment sync, debts, outbound events); their
//! failures are logged and never undo the transition.

use crate::db::{Repository, TransitionWrite};
use crate::dispatch::{emit_best_effort, EventSink, OutboundEvent};
use crate::domain::{Product, Sale, SaleStatus, TimeMs};
use crate::engine::{can_transition, GatewaySignal};
use crate::orchestration::enrollment::EnrollmentAccessManager;
use crate::orchestration::settlement::settle_commissions;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Attempts at the conditional update before giving up on a contended sale.
const MAX_TRANSITION_ATTEMPTS: usize = 3;

/// The three logical fields extracted from a gateway payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayEvent {
    /// Raw status string, or the event name when no status is present.
    pub signal: Option<String>,
    pub transaction_id: Option<String>,
    pub sale_id: Option<String>,
}

impl GatewayEvent {
    /// Extract from an arbitrary gateway JSON body.
    ///
    /// Status is preferred over the event name. The sale id is looked up in
    /// `metadata.sale_id`, `data.metadata.sale_id`, `sale_id` and
    /// `external_reference`, in that order.
    pub fn from_json(body: &Value) -> Self {
        let signal = first_string(
            body,
            &[&["status"], &["data", "status"], &["event"], &["type"]],
        );
        let transaction_id = first_string(
            body,
            &[&["transaction_id"], &["data", "transaction_id"], &["data", "id"], &["id"]],
        );
        let sale_id = first_string(
            body,
            &[
                &["metadata", "sale_id"],
                &["data", "metadata", "sale_id"],
                &["sale_id"],
                &["external_reference"],
                &["data", "external_reference"],
            ],
        );

        Self {
            signal,
            transaction_id,
            sale_id,
        }
    }
}

fn first_string(body: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| {
        let value = path.iter().try_fold(body, |node, key| node.get(key))?;
        let text = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookAction {
    Updated,
    IdempotentSkip,
    StatusRegressionBlocked,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookOutcome {
    pub action: WebhookAction,
    pub sale_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SaleStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<SaleStatus>,
}

impl WebhookOutcome {
    fn new(action: WebhookAction, sale_id: &str, status: Option<SaleStatus>) -> Self {
        Self {
            action,
            sale_id: sale_id.to_string(),
            status,
            previous_status: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook payload carries no sale_id")]
    MissingSaleId,
    #[error("sale {0} kept changing; transition not applied")]
    Contention(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct WebhookProcessor {
    repo: Arc<Repository>,
    enrollment: EnrollmentAccessManager,
    sink: Arc<dyn EventSink>,
}

impl WebhookProcessor {
    pub fn new(repo: Arc<Repository>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            enrollment: EnrollmentAccessManager::new(repo.clone()),
            repo,
            sink,
        }
    }

    pub async fn process(&self, event: &GatewayEvent) -> Result<WebhookOutcome, WebhookError> {
        let sale_id = event.sale_id.as_deref().ok_or(WebhookError::MissingSaleId)?;

        let signal = GatewaySignal::parse(event.signal.as_deref().unwrap_or_default());
        if !signal.is_recognized() {
            warn!(sale_id, ?signal, "unrecognized gateway status, treating as pending");
        }
        let next = signal.to_status();
        let transaction_id = event.transaction_id.as_deref().unwrap_or_default();

        let (sale, product) = tokio::try_join!(
            self.repo.get_sale(sale_id),
            self.repo.get_product_for_sale(sale_id)
        )?;
        let (Some(mut sale), Some(product)) = (sale, product) else {
            error!(sale_id, "webhook for unknown sale");
            return Ok(WebhookOutcome::new(WebhookAction::NotFound, sale_id, None));
        };

        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            if let Some(outcome) = self.short_circuit(&sale, next, transaction_id).await? {
                if sale.status == SaleStatus::Approved && next == SaleStatus::Approved {
                    self.retry_settlement(&sale, &product).await;
                }
                return Ok(outcome);
            }

            let write = self
                .repo
                .apply_status_transition(sale_id, sale.status, next, transaction_id, TimeMs::now())
                .await?;

            match write {
                TransitionWrite::Applied => {
                    let previous = sale.status;
                    info!(sale_id, from = %previous, to = %next, transaction_id, "sale status updated");
                    self.after_transition(&sale, &product, previous, next).await;
                    return Ok(WebhookOutcome {
                        previous_status: Some(previous),
                        ..WebhookOutcome::new(WebhookAction::Updated, sale_id, Some(next))
                    });
                }
                TransitionWrite::AlreadyProcessed => {
                    info!(sale_id, status = %next, "duplicate delivery, skipping");
                    return Ok(WebhookOutcome::new(WebhookAction::IdempotentSkip, sale_id, Some(next)));
                }
                TransitionWrite::Conflict => {
                    warn!(sale_id, expected = %sale.status, "concurrent status change, re-reading sale");
                    sale = match self.repo.get_sale(sale_id).await? {
                        Some(fresh) => fresh,
                        None => {
                            return Ok(WebhookOutcome::new(WebhookAction::NotFound, sale_id, None))
                        }
                    };
                }
            }
        }

        Err(WebhookError::Contention(sale_id.to_string()))
    }

    /// Idempotency and monotonicity checks against the sale as last read.
    async fn short_circuit(
        &self,
        sale: &Sale,
        next: SaleStatus,
        transaction_id: &str,
    ) -> Result<Option<WebhookOutcome>, sqlx::Error> {
        if self
            .repo
            .is_webhook_event_processed(&sale.id, next, transaction_id)
            .await?
        {
            info!(sale_id = %sale.id, status = %next, transaction_id, "event already processed");
            return Ok(Some(WebhookOutcome::new(WebhookAction::IdempotentSkip, &sale.id, Some(next))));
        }

        if sale.status == SaleStatus::Approved && next == SaleStatus::Approved {
            info!(sale_id = %sale.id, "sale already approved");
            return Ok(Some(WebhookOutcome::new(WebhookAction::IdempotentSkip, &sale.id, Some(next))));
        }

        if !can_transition(sale.status, next) {
            warn!(sale_id = %sale.id, current = %sale.status, requested = %next, "status regression blocked");
            return Ok(Some(WebhookOutcome::new(
                WebhookAction::StatusRegressionBlocked,
                &sale.id,
                Some(sale.status),
            )));
        }

        Ok(None)
    }

    /// Repeat approvals finish a settlement that failed after the status
    /// commit. A no-op once the sale has commission rows.
    async fn retry_settlement(&self, sale: &Sale, product: &Product) {
        match settle_commissions(&self.repo, sale, product).await {
            Ok(0) => {}
            Ok(rows) => warn!(sale_id = %sale.id, rows, "commission settlement completed on redelivery"),
            Err(e) => error!(sale_id = %sale.id, error = %e, "commission settlement failed again"),
        }
    }

    async fn after_transition(
        &self,
        sale: &Sale,
        product: &Product,
        previous: SaleStatus,
        next: SaleStatus,
    ) {
        if next == SaleStatus::Approved {
            if let Err(e) = settle_commissions(&self.repo, sale, product).await {
                error!(sale_id = %sale.id, error = %e, "commission settlement failed");
            }
            if let Err(e) = self.enrollment.activate(sale, product).await {
                error!(sale_id = %sale.id, error = %e, "enrollment activation failed");
            }
        }

        if next.revokes_access() {
            if let Err(e) = self.enrollment.revoke_for_sale(sale, product, next.as_str()).await {
                error!(sale_id = %sale.id, error = %e, "enrollment revocation failed");
            }
        }

        if matches!(next, SaleStatus::Refunded | SaleStatus::Chargeback) {
            match self.repo.record_debts_for_sale(&sale.id, TimeMs::now()).await {
                Ok(0) => {}
                Ok(debts) => warn!(sale_id = %sale.id, debts, "anticipated commissions reversed"),
                Err(e) => error!(sale_id = %sale.id, error = %e, "failed to record anticipation debts"),
            }
        }

        emit_best_effort(
            self.sink.as_ref(),
            OutboundEvent::SaleStatusChanged {
                sale_id: sale.id.clone(),
                product_id: sale.product_id.clone(),
                seller_user_id: sale.seller_user_id.clone(),
                buyer_email: sale.buyer_email.clone(),
                previous_status: previous,
                status: next,
                amount: sale.amount,
                occurred_at: TimeMs::now(),
            },
        )
        .await;
    }
}

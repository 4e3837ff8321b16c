use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::api::AppState;
use crate::error::AppError;
use crate::orchestration::{GatewayEvent, WebhookOutcome};

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    #[serde(flatten)]
    pub outcome: WebhookOutcome,
}

/// Gateway callback. Duplicates, regressions and unknown sales are all
/// acknowledged with 200 so the gateway stops retrying; `action` tells them apart.
pub async fn receive_gateway_webhook(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<WebhookResponse>, AppError> {
    let event = GatewayEvent::from_json(&body);
    tracing::debug!(
        sale_id = ?event.sale_id,
        signal = ?event.signal,
        transaction_id = ?event.transaction_id,
        "gateway webhook received"
    );

    let outcome = state.webhooks.process(&event).await?;
    Ok(Json(WebhookResponse {
        received: true,
        outcome,
    }))
}

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::api::AppState;
use crate::domain::Sale;
use crate::error::AppError;
use crate::orchestration::CheckoutRequest;

/// Checkout initiation. The sale starts pending and only moves on gateway webhooks.
pub async fn create_sale(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<Sale>), AppError> {
    let sale = state.checkout.create_sale(&request).await?;
    Ok((StatusCode::CREATED, Json(sale)))
}

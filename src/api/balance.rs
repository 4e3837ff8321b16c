use axum::extract::State;
use axum::Json;

use crate::api::{AppState, AuthUser};
use crate::engine::BalanceSnapshot;
use crate::error::AppError;
use crate::orchestration::withdrawal::current_balance;

/// Balance recomputed from the requester's sales, withdrawals and ledger entries.
pub async fn get_balance(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<BalanceSnapshot>, AppError> {
    let snapshot = current_balance(&state.repo, &user_id).await?;
    Ok(Json(snapshot))
}

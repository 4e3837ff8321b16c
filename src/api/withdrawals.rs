use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::{AppState, AuthUser};
use crate::domain::{Decimal, TimeMs};
use crate::error::AppError;
use crate::orchestration::{WithdrawalReceipt, WithdrawalRequest};

#[derive(Debug, Deserialize)]
pub struct WithdrawalBody {
    pub amount: Decimal,
    pub bank_account_id: String,
    #[serde(default)]
    pub otp_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WithdrawalResponse {
    pub success: bool,
    pub withdrawal: WithdrawalReceipt,
}

#[derive(Debug, Serialize)]
pub struct OtpResponse {
    pub success: bool,
    pub expires_at: TimeMs,
}

pub async fn request_withdrawal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<WithdrawalBody>,
) -> Result<Json<WithdrawalResponse>, AppError> {
    if body.bank_account_id.trim().is_empty() {
        return Err(AppError::BadRequest("bank_account_id is required".to_string()));
    }

    let request = WithdrawalRequest {
        amount: body.amount,
        bank_account_id: body.bank_account_id.trim().to_string(),
        otp_code: body.otp_code,
    };
    let withdrawal = state.withdrawals.request(&user_id, &request).await?;

    Ok(Json(WithdrawalResponse {
        success: true,
        withdrawal,
    }))
}

pub async fn request_otp(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<OtpResponse>, AppError> {
    let issued = state.otp.issue(&user_id).await?;
    Ok(Json(OtpResponse {
        success: true,
        expires_at: issued.expires_at,
    }))
}

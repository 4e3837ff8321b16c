use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::AppState;
use crate::domain::{Decimal, TimeMs};
use crate::error::AppError;
use crate::orchestration::{CouponCheck, CouponError};

#[derive(Debug, Serialize)]
pub struct CouponResponse {
    pub valid: bool,
    pub message: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_amount: Option<Decimal>,
}

/// Rejections are a normal answer here (`valid: false`); only storage
/// failures surface as errors.
pub async fn validate_coupon(
    State(state): State<AppState>,
    Json(check): Json<CouponCheck>,
) -> Result<Json<CouponResponse>, AppError> {
    let code = check.coupon_code.trim().to_uppercase();
    let response = match state.coupons.validate(&check, TimeMs::now()).await {
        Ok(applied) => CouponResponse {
            valid: true,
            message: "coupon applied".to_string(),
            code: applied.code,
            discount: Some(applied.discount),
            final_amount: Some(applied.final_amount),
        },
        Err(CouponError::Db(e)) => return Err(e.into()),
        Err(rejection) => CouponResponse {
            valid: false,
            message: rejection.to_string(),
            code,
            discount: None,
            final_amount: None,
        },
    };
    Ok(Json(response))
}

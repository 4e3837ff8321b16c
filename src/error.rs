use crate::orchestration::{
    AnticipationError, CheckoutError, CouponError, OtpError, WebhookError, WithdrawalError,
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Too many requests: {0}")]
    TooManyRequests(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::MissingSaleId => AppError::BadRequest(err.to_string()),
            WebhookError::Contention(_) => AppError::Conflict(err.to_string()),
            WebhookError::Db(e) => e.into(),
        }
    }
}

impl From<AnticipationError> for AppError {
    fn from(err: AnticipationError) -> Self {
        match err {
            AnticipationError::EmptyRequest
            | AnticipationError::DuplicateCommissions
            | AnticipationError::CommissionsUnavailable { .. }
            | AnticipationError::SaleNotApproved(_)
            | AnticipationError::OutstandingDebt
            | AnticipationError::BelowMinimum { .. } => AppError::BadRequest(err.to_string()),
            AnticipationError::AlreadyProcessed => AppError::Conflict(err.to_string()),
            AnticipationError::Incomplete(_) => AppError::Internal(err.to_string()),
            AnticipationError::Db(e) => e.into(),
        }
    }
}

impl From<OtpError> for AppError {
    fn from(err: OtpError) -> Self {
        match err {
            OtpError::Missing
            | OtpError::Invalid
            | OtpError::Expired
            | OtpError::TooManyAttempts => AppError::Unauthorized(err.to_string()),
            OtpError::RateLimited { .. } => AppError::TooManyRequests(err.to_string()),
            OtpError::Db(e) => e.into(),
        }
    }
}

impl From<WithdrawalError> for AppError {
    fn from(err: WithdrawalError) -> Self {
        match err {
            WithdrawalError::InvalidAmount
            | WithdrawalError::BelowMinimum { .. }
            | WithdrawalError::InsufficientBalance { .. }
            | WithdrawalError::FeeExceedsAmount { .. } => AppError::BadRequest(err.to_string()),
            WithdrawalError::Otp(otp) => otp.into(),
            WithdrawalError::AccountBlocked
            | WithdrawalError::BankAccountUnavailable
            | WithdrawalError::BankAccountNotApproved => AppError::Forbidden(err.to_string()),
            WithdrawalError::Cooldown { .. } => AppError::TooManyRequests(err.to_string()),
            WithdrawalError::Db(e) => e.into(),
        }
    }
}

impl From<CouponError> for AppError {
    fn from(err: CouponError) -> Self {
        match err {
            CouponError::Db(e) => e.into(),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Invalid(_) | CheckoutError::Fees(_) => {
                AppError::BadRequest(err.to_string())
            }
            CheckoutError::ProductNotFound(_) => AppError::NotFound(err.to_string()),
            CheckoutError::Coupon(e) => e.into(),
            CheckoutError::Db(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::TooManyRequests(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

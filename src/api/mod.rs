pub mod anticipations;
pub mod balance;
pub mod coupons;
pub mod health;
pub mod sales;
pub mod webhooks;
pub mod withdrawals;

use crate::config::Config;
use crate::db::Repository;
use crate::dispatch::EventSink;
use crate::engine::FeeCalculator;
use crate::error::AppError;
use crate::orchestration::{
    AnticipationEngine, CheckoutService, CouponValidator, OtpService, WebhookProcessor,
    WithdrawalProcessor,
};
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Header set by the upstream auth gateway with the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub webhooks: Arc<WebhookProcessor>,
    pub anticipations: Arc<AnticipationEngine>,
    pub withdrawals: Arc<WithdrawalProcessor>,
    pub otp: Arc<OtpService>,
    pub checkout: Arc<CheckoutService>,
    pub coupons: Arc<CouponValidator>,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, config: Config, sink: Arc<dyn EventSink>) -> Self {
        let otp = OtpService::new(repo.clone(), config.otp.clone(), sink.clone());
        Self {
            webhooks: Arc::new(WebhookProcessor::new(repo.clone(), sink.clone())),
            anticipations: Arc::new(AnticipationEngine::new(
                repo.clone(),
                config.anticipation.clone(),
                sink.clone(),
            )),
            withdrawals: Arc::new(WithdrawalProcessor::new(
                repo.clone(),
                otp.clone(),
                config.withdrawal.clone(),
                sink,
            )),
            otp: Arc::new(otp),
            checkout: Arc::new(CheckoutService::new(
                repo.clone(),
                FeeCalculator::new(config.fees.clone()),
            )),
            coupons: Arc::new(CouponValidator::new(repo.clone())),
            repo,
            config,
        }
    }
}

/// The requesting user, taken from [`USER_ID_HEADER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| AuthUser(value.to_string()))
            .ok_or_else(|| AppError::Unauthorized("authentication required".to_string()))
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/webhooks/gateway", post(webhooks::receive_gateway_webhook))
        .route("/v1/sales", post(sales::create_sale))
        .route("/v1/anticipations", post(anticipations::handle_anticipation))
        .route("/v1/withdrawals", post(withdrawals::request_withdrawal))
        .route("/v1/withdrawals/otp", post(withdrawals::request_otp))
        .route("/v1/balance", get(balance::get_balance))
        .route("/v1/coupons/validate", post(coupons::validate_coupon))
        .layer(cors)
        .with_state(state)
}

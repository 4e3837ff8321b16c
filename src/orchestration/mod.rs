//! Stateful workflows over the repository: checkout, webhook settlement,
//! course access, anticipations and withdrawals.

pub mod anticipation;
pub mod checkout;
pub mod coupon;
pub mod enrollment;
pub mod otp;
pub mod rate_limit;
pub mod settlement;
pub mod webhook;
pub mod withdrawal;

pub use anticipation::{AnticipationEngine, AnticipationError, AnticipationStore};
pub use checkout::{CheckoutError, CheckoutRequest, CheckoutService};
pub use coupon::{AppliedCoupon, CouponCheck, CouponError, CouponValidator};
pub use enrollment::EnrollmentAccessManager;
pub use otp::{OtpError, OtpService};
pub use rate_limit::{RateDecision, RateLimiter};
pub use settlement::SettlementError;
pub use webhook::{GatewayEvent, WebhookAction, WebhookError, WebhookOutcome, WebhookProcessor};
pub use withdrawal::{WithdrawalError, WithdrawalProcessor, WithdrawalReceipt, WithdrawalRequest};

//! One-time codes guarding withdrawals.
//!
//! Codes are six digits, stored only as `sha256("{user_id}:{code}")`, expire
//! after a configured TTL and allow a bounded number of wrong guesses.

use crate::config::OtpConfig;
use crate::db::Repository;
use crate::dispatch::{emit_best_effort, EventSink, OutboundEvent};
use crate::domain::{new_id, TimeMs, WithdrawalOtp};
use crate::orchestration::rate_limit::{RateDecision, RateLimiter};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum OtpError {
    #[error("verification code required")]
    Missing,
    #[error("invalid verification code")]
    Invalid,
    #[error("verification code expired")]
    Expired,
    #[error("too many verification attempts, request a new code")]
    TooManyAttempts,
    #[error("too many code requests, try again later")]
    RateLimited { retry_at: TimeMs },
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedOtp {
    pub expires_at: TimeMs,
}

pub fn hash_code(user_id: &str, code: &str) -> String {
    hex::encode(Sha256::digest(format!("{}:{}", user_id, code).as_bytes()))
}

/// Six zero-padded digits drawn from a v4 uuid's random bytes.
fn generate_code() -> String {
    let uuid = uuid::Uuid::new_v4();
    let bytes = uuid.as_bytes();
    let value = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    format!("{:06}", value % 1_000_000)
}

#[derive(Clone)]
pub struct OtpService {
    repo: Arc<Repository>,
    config: OtpConfig,
    limiter: RateLimiter,
    sink: Arc<dyn EventSink>,
}

impl OtpService {
    pub fn new(repo: Arc<Repository>, config: OtpConfig, sink: Arc<dyn EventSink>) -> Self {
        let limiter = RateLimiter::new(
            repo.clone(),
            "withdrawal_otp",
            config.requests_per_window,
            config.window_minutes,
        );
        Self {
            repo,
            config,
            limiter,
            sink,
        }
    }

    /// Issue a fresh code and hand it to the delivery sink.
    pub async fn issue(&self, user_id: &str) -> Result<IssuedOtp, OtpError> {
        let now = TimeMs::now();
        if let RateDecision::Limited { retry_at } = self.limiter.check(user_id, now).await? {
            warn!(user_id, "otp request rate limited");
            return Err(OtpError::RateLimited { retry_at });
        }

        let code = generate_code();
        let otp = WithdrawalOtp {
            id: new_id(),
            user_id: user_id.to_string(),
            code_hash: hash_code(user_id, &code),
            expires_at: now.plus_minutes(self.config.ttl_minutes),
            used_at: None,
            attempts: 0,
            created_at: now,
        };
        self.repo.insert_otp(&otp).await?;
        info!(user_id, otp_id = %otp.id, "withdrawal code issued");

        emit_best_effort(
            self.sink.as_ref(),
            OutboundEvent::WithdrawalOtpIssued {
                user_id: user_id.to_string(),
                code,
                expires_at: otp.expires_at,
            },
        )
        .await;

        Ok(IssuedOtp {
            expires_at: otp.expires_at,
        })
    }

    /// Check `code` against the user's latest unused code and consume it.
    ///
    /// A wrong code counts an attempt. Consumption is a conditional update,
    /// so two requests racing with the same code cannot both pass.
    pub async fn verify_and_consume(
        &self,
        user_id: &str,
        code: &str,
        now: TimeMs,
    ) -> Result<(), OtpError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(OtpError::Missing);
        }

        let otp = self
            .repo
            .latest_unused_otp(user_id)
            .await?
            .ok_or(OtpError::Invalid)?;

        if otp.expires_at <= now {
            return Err(OtpError::Expired);
        }
        if otp.attempts >= self.config.max_attempts {
            return Err(OtpError::TooManyAttempts);
        }

        if hash_code(user_id, code) != otp.code_hash {
            let attempts = self.repo.increment_otp_attempts(&otp.id).await?;
            warn!(user_id, attempts, "withdrawal code mismatch");
            if attempts >= self.config.max_attempts {
                return Err(OtpError::TooManyAttempts);
            }
            return Err(OtpError::Invalid);
        }

        if !self.repo.consume_otp(&otp.id, now).await? {
            return Err(OtpError::Invalid);
        }
        Ok(())
    }
}

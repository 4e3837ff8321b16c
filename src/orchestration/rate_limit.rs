use crate::db::Repository;
use crate::domain::TimeMs;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: i64 },
    Limited { retry_at: TimeMs },
}

/// Fixed-window limiter backed by the shared counter table, so every
/// instance pointed at the same database enforces one budget.
#[derive(Clone)]
pub struct RateLimiter {
    repo: Arc<Repository>,
    scope: &'static str,
    limit: i64,
    window_ms: i64,
}

impl RateLimiter {
    pub fn new(repo: Arc<Repository>, scope: &'static str, limit: i64, window_minutes: i64) -> Self {
        Self {
            repo,
            scope,
            limit,
            window_ms: window_minutes * 60_000,
        }
    }

    /// Count one request from `subject` and decide whether it may proceed.
    pub async fn check(&self, subject: &str, now: TimeMs) -> Result<RateDecision, sqlx::Error> {
        let key = format!("{}:{}", self.scope, subject);
        let (count, window_start) = self.repo.hit_rate_limit(&key, self.window_ms, now).await?;

        if count > self.limit {
            Ok(RateDecision::Limited {
                retry_at: TimeMs::new(window_start.as_ms() + self.window_ms),
            })
        } else {
            Ok(RateDecision::Allowed {
                remaining: self.limit - count,
            })
        }
    }
}

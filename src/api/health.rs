use axum::extract::State;
use axum::Json;

use crate::api::AppState;
use crate::error::AppError;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Ready once the database answers.
pub async fn ready(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    sqlx::query("SELECT 1").execute(state.repo.pool()).await?;
    Ok(Json(serde_json::json!({"status": "ready"})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::repo::test_support::setup_repo;
    use crate::dispatch::RecordingEventSink;
    use crate::engine::FeeSchedule;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_health_returns_ok() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_ready_checks_database() {
        let (repo, _temp) = setup_repo().await;
        let config = Config {
            port: 0,
            database_path: ":memory:".to_string(),
            dispatch_url: None,
            fees: FeeSchedule::default(),
            anticipation: Default::default(),
            withdrawal: Default::default(),
            otp: Default::default(),
        };
        let state = AppState::new(repo.clone(), config, Arc::new(RecordingEventSink::new()));

        let Json(body) = ready(State(state.clone())).await.unwrap();
        assert_eq!(body["status"], "ready");

        repo.pool().close().await;
        assert!(ready(State(state)).await.is_err());
    }
}

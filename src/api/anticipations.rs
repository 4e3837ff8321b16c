use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::{AppState, AuthUser};
use crate::error::AppError;
use crate::orchestration::anticipation::AnticipationResult;

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AnticipationCommand {
    GetData,
    ProcessAnticipation {
        #[serde(default)]
        commission_ids: Vec<String>,
    },
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub success: bool,
    #[serde(flatten)]
    pub result: AnticipationResult,
}

fn parse_command(body: Value) -> Result<AnticipationCommand, AppError> {
    serde_json::from_value(body).map_err(|_| {
        AppError::BadRequest(
            "action must be 'get_data' or 'process_anticipation'".to_string(),
        )
    })
}

pub async fn handle_anticipation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    match parse_command(body)? {
        AnticipationCommand::GetData => {
            let overview = state.anticipations.get_data(&user_id).await?;
            Ok(Json(serde_json::to_value(overview).map_err(|e| AppError::Internal(e.to_string()))?))
        }
        AnticipationCommand::ProcessAnticipation { commission_ids } => {
            let result = state.anticipations.process(&user_id, &commission_ids).await?;
            let response = ProcessResponse {
                success: true,
                result,
            };
            Ok(Json(serde_json::to_value(response).map_err(|e| AppError::Internal(e.to_string()))?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_command() {
        assert_eq!(
            parse_command(json!({"action": "get_data"})).unwrap(),
            AnticipationCommand::GetData
        );
        assert_eq!(
            parse_command(json!({"action": "process_anticipation", "commission_ids": ["a", "b"]}))
                .unwrap(),
            AnticipationCommand::ProcessAnticipation {
                commission_ids: vec!["a".to_string(), "b".to_string()]
            }
        );
        assert!(matches!(
            parse_command(json!({"action": "drain_wallet"})),
            Err(AppError::BadRequest(_))
        ));
        assert!(parse_command(json!({})).is_err());
    }
}

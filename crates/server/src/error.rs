use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use coach_core::CoachError;
use coach_engine::EngineError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Coach(#[from] CoachError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Coach(e) | AppError::Engine(EngineError::Coach(e)) => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            AppError::Engine(EngineError::Closed) => {
                (StatusCode::NOT_FOUND, "No active game".to_string())
            }
            AppError::Engine(e) => {
                tracing::error!("Engine error: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };

        // {"detail": "message"}, the shape the UI expects
        (status, Json(json!({ "detail": message }))).into_response()
    }
}

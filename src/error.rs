use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::services::{fallback::FallbackError, model_store::StoreError, training::TrainingError};

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External API error: {0}")]
    ExternalApi(String),

    #[error("Training error: {0}")]
    Training(#[from] TrainingError),

    #[error("Model store error: {0}")]
    ModelStore(#[from] StoreError),

    #[error("Fallback recommendation failed: {0}")]
    Fallback(#[from] FallbackError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::Training(ref e @ TrainingError::InsufficientData { .. }) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": e.to_string() }),
            ),
            AppError::Fallback(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": "Fallback recommendation failed",
                    "detail": e.to_string()
                }),
            ),
            AppError::ExternalApi(msg) => (StatusCode::BAD_GATEWAY, json!({ "error": msg })),
            AppError::HttpClient(_) => (
                StatusCode::BAD_GATEWAY,
                json!({ "error": self.to_string() }),
            ),
            AppError::Database(_)
            | AppError::Cache(_)
            | AppError::Training(_)
            | AppError::ModelStore(_)
            | AppError::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": self.to_string() }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

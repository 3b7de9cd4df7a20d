use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{MenuEntry, Recommendation},
    services::{ModelStatus, TrainingReport},
};

use super::AppState;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct RecommendQuery {
    /// Kept as text so malformed values get the JSON error body
    pub customer_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub loaded: bool,
}

fn parse_customer_id(raw: Option<&str>) -> AppResult<i64> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::InvalidInput("customer_id is required".to_string()))?;

    match raw.parse::<i64>() {
        Ok(0) | Err(_) => Err(AppError::InvalidInput(format!(
            "customer_id must be a non-zero integer, got {:?}",
            raw
        ))),
        Ok(id) => Ok(id),
    }
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Recommend a dish for a customer right now
pub async fn recommend_advanced(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<RecommendQuery>,
) -> AppResult<Json<Recommendation>> {
    let customer_id = parse_customer_id(query.customer_id.as_deref())?;
    let now = Local::now().naive_local();

    let recommendation = state.recommender.recommend(customer_id, now).await?;

    tracing::info!(
        request_id = %request_id,
        customer_id,
        dish = %recommendation.recommended_dish,
        source = ?recommendation.source,
        "Recommendation served"
    );

    Ok(Json(recommendation))
}

/// Menu in catalog order
pub async fn get_menu(State(state): State<AppState>) -> Json<Vec<MenuEntry>> {
    Json(state.recommender.menu().entries().to_vec())
}

/// Currently served model
pub async fn model_status(State(state): State<AppState>) -> Json<ModelStatus> {
    Json(state.recommender.model_status().await)
}

/// Retrain on the full order history
pub async fn retrain_model(State(state): State<AppState>) -> AppResult<Json<TrainingReport>> {
    let report = state.recommender.retrain().await?;
    Ok(Json(report))
}

/// Re-read the persisted model
pub async fn reload_model(State(state): State<AppState>) -> AppResult<Json<ReloadResponse>> {
    let loaded = state.recommender.reload().await?;
    Ok(Json(ReloadResponse { loaded }))
}

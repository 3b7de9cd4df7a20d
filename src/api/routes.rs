use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;
use crate::middleware::{make_span_with_request_id, request_id_middleware};

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Routes under /api
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/recommendations/advanced", get(handlers::recommend_advanced))
        .route("/menu", get(handlers::get_menu))
        // Model lifecycle
        .route("/model", get(handlers::model_status))
        .route("/model/retrain", post(handlers::retrain_model))
        .route("/model/reload", post(handlers::reload_model))
}

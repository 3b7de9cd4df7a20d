use std::sync::Arc;

use crate::services::RecommendationService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub recommender: Arc<RecommendationService>,
}

impl AppState {
    pub fn new(recommender: RecommendationService) -> Self {
        Self {
            recommender: Arc::new(recommender),
        }
    }
}

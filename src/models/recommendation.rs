use serde::{Deserialize, Serialize};

/// Which engine produced a recommendation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationSource {
    Model,
    Fallback,
}

/// A recommended dish with the ingredients to display and a human-readable rationale
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub recommended_dish: String,
    pub ingredients: Vec<String>,
    pub rationale: String,
    pub source: RecommendationSource,
}

pub mod fallback;
pub mod features;
pub mod inference;
pub mod keyword_rules;
pub mod model_store;
pub mod providers;
pub mod recommender;
pub mod training;

#[cfg(test)]
mod fixtures;

pub use fallback::{FallbackEngine, FallbackError, FallbackPolicy, FallbackRequest};
pub use inference::{InferenceEngine, InferenceError, ModelPrediction};
pub use keyword_rules::{DishFlag, KeywordRule, KeywordRules, MatchField};
pub use model_store::{ModelBundle, ModelStore, StoreError};
pub use recommender::{ModelStatus, RecommendationService};
pub use training::{TrainingConfig, TrainingError, TrainingPipeline, TrainingReport};

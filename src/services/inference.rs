use std::sync::Arc;
use thiserror::Error;

use crate::{
    models::MenuCatalog,
    services::{
        features::{Candidate, FeatureBuilder, FeatureContext},
        keyword_rules::KeywordRules,
        model_store::ModelBundle,
    },
};

#[derive(Debug, Error, PartialEq)]
pub enum InferenceError {
    #[error("model unavailable")]
    ModelUnavailable,

    #[error("model artifacts are inconsistent: {0}")]
    InconsistentArtifacts(String),

    #[error("no probability computed for any dish")]
    NoProbability,
}

/// The model's pick for one request
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPrediction {
    pub dish: String,
    pub probability: f64,
    pub rationale: String,
}

/// Scores every menu dish with the trained classifier
///
/// Each dish is turned into a feature row as if it were the order being
/// placed, and scored by the probability the classifier assigns to that
/// dish's own label. One multi-class model is evaluated once per dish
/// instead of keeping a model per dish.
pub struct InferenceEngine {
    artifacts: Option<Arc<ModelBundle>>,
    menu: Arc<MenuCatalog>,
    rules: Arc<KeywordRules>,
}

impl InferenceEngine {
    pub fn new(
        artifacts: Option<Arc<ModelBundle>>,
        menu: Arc<MenuCatalog>,
        rules: Arc<KeywordRules>,
    ) -> Self {
        Self {
            artifacts,
            menu,
            rules,
        }
    }

    pub fn predict(
        &self,
        customer_id: i64,
        context: &FeatureContext,
    ) -> Result<ModelPrediction, InferenceError> {
        let bundle = match self.artifacts.as_deref() {
            Some(bundle) if bundle.classifier.is_fitted() => bundle,
            _ => {
                tracing::info!("Model not trained or loaded");
                return Err(InferenceError::ModelUnavailable);
            }
        };

        if let Some(problem) = bundle.consistency_error() {
            tracing::error!(problem = %problem, "Refusing to score with inconsistent artifacts");
            return Err(InferenceError::InconsistentArtifacts(problem));
        }

        let builder = FeatureBuilder::new(Some(bundle), &self.rules);
        let mut best: Option<(&str, f64)> = None;

        for entry in self.menu.iter() {
            let candidate = Candidate::from(entry);
            let scored = self.score_dish(&builder, bundle, customer_id, context, candidate);
            let probability = match scored {
                Some(p) => p,
                None => continue,
            };

            // Strictly greater keeps the first dish in menu order on ties
            if best.map_or(true, |(_, p)| probability > p) {
                best = Some((entry.name.as_str(), probability));
            }
        }

        let (dish, probability) = best.ok_or_else(|| {
            tracing::warn!(customer_id, "No dish could be scored");
            InferenceError::NoProbability
        })?;

        tracing::debug!(customer_id, dish, probability, "Model prediction");

        Ok(ModelPrediction {
            dish: dish.to_string(),
            probability,
            rationale: format!(
                "Based on an advanced AI model (random forest). Probability: {probability:.4}"
            ),
        })
    }

    /// Probability of `candidate`'s own label, `None` if its features cannot be built
    fn score_dish(
        &self,
        builder: &FeatureBuilder<'_>,
        bundle: &ModelBundle,
        customer_id: i64,
        context: &FeatureContext,
        candidate: Candidate<'_>,
    ) -> Option<f64> {
        let features = match builder.build(customer_id, context, &candidate) {
            Ok(features) => features,
            Err(e) => {
                tracing::warn!(dish = candidate.dish, error = %e, "Failed to build features");
                return None;
            }
        };

        let proba = match bundle.classifier.predict_proba_row(&features) {
            Ok(proba) => proba,
            Err(e) => {
                tracing::warn!(dish = candidate.dish, error = %e, "Failed to score dish");
                return None;
            }
        };

        Some(
            bundle
                .dish_encoder
                .transform(&candidate.dish.to_string())
                .and_then(|label| proba.get(label).copied())
                .unwrap_or(0.0),
        )
    }
}

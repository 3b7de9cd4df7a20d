use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{
    error::{AppError, AppResult},
    models::{MenuCatalog, Recommendation, RecommendationSource},
    services::{
        fallback::{FallbackEngine, FallbackError, FallbackPolicy, FallbackRequest},
        features::FeatureContext,
        inference::InferenceEngine,
        keyword_rules::KeywordRules,
        model_store::ModelBundle,
        providers::{DietaryProfile, OrderHistory, WeatherStatus},
        training::{TrainingError, TrainingPipeline, TrainingReport},
    },
};

/// What is currently being served
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelStatus {
    pub loaded: bool,
    pub trained_at: Option<DateTime<Utc>>,
    pub feature_count: Option<usize>,
    pub classes: Vec<String>,
    pub accuracy: Option<f64>,
}

/// Model first, heuristics when the model cannot answer
///
/// The live bundle is swapped only by `initialize`, `retrain` and `reload`.
/// Requests take a snapshot of it and never hold the lock while scoring.
pub struct RecommendationService {
    menu: Arc<MenuCatalog>,
    rules: Arc<KeywordRules>,
    orders: Arc<dyn OrderHistory>,
    weather: Arc<dyn WeatherStatus>,
    dietary: Arc<dyn DietaryProfile>,
    model: RwLock<Option<Arc<ModelBundle>>>,
    trainer: TrainingPipeline,
    fallback: FallbackEngine,
}

impl RecommendationService {
    pub fn new(
        menu: Arc<MenuCatalog>,
        rules: Arc<KeywordRules>,
        orders: Arc<dyn OrderHistory>,
        weather: Arc<dyn WeatherStatus>,
        dietary: Arc<dyn DietaryProfile>,
        trainer: TrainingPipeline,
        policy: FallbackPolicy,
    ) -> Self {
        Self {
            fallback: FallbackEngine::new(menu.clone(), policy),
            menu,
            rules,
            orders,
            weather,
            dietary,
            model: RwLock::new(None),
            trainer,
        }
    }

    pub fn menu(&self) -> &MenuCatalog {
        &self.menu
    }

    /// Loads the persisted model, training one when none exists
    ///
    /// Failing to obtain a model is not fatal: requests are then served by
    /// the fallback engine until a retrain succeeds.
    pub async fn initialize(&self) -> ModelStatus {
        match self.load_from_store().await {
            Ok(Some(bundle)) => {
                *self.model.write().await = Some(bundle);
            }
            Ok(None) => {
                tracing::info!("No persisted model; training from order history");
                match self.retrain().await {
                    Ok(report) => {
                        tracing::info!(accuracy = report.summary.accuracy, "Initial model trained");
                    }
                    Err(AppError::Training(e @ TrainingError::InsufficientData { .. })) => {
                        tracing::warn!(error = %e, "Serving fallback recommendations only");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Initial training failed");
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load persisted model");
            }
        }

        self.model_status().await
    }

    pub async fn recommend(&self, customer_id: i64, now: NaiveDateTime) -> AppResult<Recommendation> {
        let is_cold = match self.weather.is_cold_now().await {
            Ok(cold) => cold,
            Err(e) => {
                tracing::warn!(error = %e, "Weather lookup failed, assuming not cold");
                false
            }
        };

        let snapshot = self.model.read().await.clone();
        let engine = InferenceEngine::new(snapshot, self.menu.clone(), self.rules.clone());

        match engine.predict(customer_id, &FeatureContext::at(now, is_cold)) {
            Ok(prediction) => {
                let ingredients = self
                    .menu
                    .get(&prediction.dish)
                    .map(|entry| entry.ingredient_list())
                    .unwrap_or_default();

                Ok(Recommendation {
                    recommended_dish: prediction.dish,
                    ingredients,
                    rationale: prediction.rationale,
                    source: RecommendationSource::Model,
                })
            }
            Err(e) => {
                tracing::info!(customer_id, reason = %e, "Model could not answer, using fallback");
                Ok(self.recommend_fallback(customer_id, now, is_cold).await?)
            }
        }
    }

    async fn recommend_fallback(
        &self,
        customer_id: i64,
        now: NaiveDateTime,
        is_cold: bool,
    ) -> Result<Recommendation, FallbackError> {
        let orders = self
            .orders
            .all_orders()
            .await
            .map_err(|e| FallbackError::History(e.to_string()))?;

        let is_vegetarian = if orders.is_empty() {
            false
        } else {
            self.dietary
                .is_vegetarian(customer_id)
                .await
                .map_err(|e| FallbackError::Dietary(e.to_string()))?
        };

        let request = FallbackRequest {
            customer_id: Some(customer_id),
            now,
            is_vegetarian,
            is_cold,
        };
        self.fallback.recommend(&orders, &request)
    }

    /// Trains on the full order history and serves the new model
    ///
    /// The served model is replaced only after the new bundle is persisted.
    pub async fn retrain(&self) -> AppResult<TrainingReport> {
        let orders = self.orders.all_orders().await.map_err(|e| {
            AppError::Training(TrainingError::History(e.to_string()))
        })?;
        tracing::debug!(source = self.orders.name(), "Order history loaded for training");

        let (bundle, report) = self.trainer.train(orders, self.menu.clone()).await?;
        *self.model.write().await = Some(bundle);

        Ok(report)
    }

    /// Re-reads the persisted model
    ///
    /// Returns whether a bundle was found; a missing file leaves the served
    /// model in place.
    pub async fn reload(&self) -> AppResult<bool> {
        match self.load_from_store().await? {
            Some(bundle) => {
                *self.model.write().await = Some(bundle);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn load_from_store(&self) -> AppResult<Option<Arc<ModelBundle>>> {
        let store = self.trainer.store().clone();
        let bundle = tokio::task::spawn_blocking(move || store.load())
            .await
            .map_err(|e| AppError::Internal(e.to_string()))??;

        match bundle {
            Some(bundle) => {
                if let Some(problem) = bundle.consistency_error() {
                    return Err(AppError::Internal(format!(
                        "persisted model is inconsistent: {}",
                        problem
                    )));
                }
                Ok(Some(Arc::new(bundle)))
            }
            None => Ok(None),
        }
    }

    pub async fn model_status(&self) -> ModelStatus {
        let model = self.model.read().await;
        match model.as_deref() {
            Some(bundle) => ModelStatus {
                loaded: true,
                trained_at: Some(bundle.trained_at),
                feature_count: Some(bundle.feature_columns.len()),
                classes: bundle.dish_encoder.classes().to_vec(),
                accuracy: Some(bundle.summary.accuracy),
            },
            None => ModelStatus {
                loaded: false,
                trained_at: None,
                feature_count: None,
                classes: Vec::new(),
                accuracy: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::ForestConfig;
    use crate::models::{menu::fixtures::sample_menu, Order};
    use crate::services::{
        fixtures::{at, habitual_history, order},
        model_store::ModelStore,
        providers::{FixedWeather, InMemoryOrderHistory, StaticDietaryProfile},
        training::TrainingConfig,
    };
    use mockall::mock;
    use tempfile::TempDir;

    mock! {
        pub Weather {}
        #[async_trait::async_trait]
        impl WeatherStatus for Weather {
            async fn is_cold_now(&self) -> AppResult<bool>;
        }
    }

    mock! {
        pub Dietary {}
        #[async_trait::async_trait]
        impl DietaryProfile for Dietary {
            async fn is_vegetarian(&self, customer_id: i64) -> AppResult<bool>;
        }
    }

    mock! {
        pub History {}
        #[async_trait::async_trait]
        impl OrderHistory for History {
            async fn all_orders(&self) -> AppResult<Vec<Order>>;
            fn name(&self) -> &'static str;
        }
    }

    struct Harness {
        service: RecommendationService,
        _dir: TempDir,
    }

    fn build(
        orders: Arc<dyn OrderHistory>,
        weather: Arc<dyn WeatherStatus>,
        dietary: Arc<dyn DietaryProfile>,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let rules = Arc::new(KeywordRules::default());
        let trainer = TrainingPipeline::new(
            TrainingConfig {
                forest: ForestConfig {
                    n_estimators: 20,
                    ..ForestConfig::default()
                },
                ..TrainingConfig::default()
            },
            rules.clone(),
            ModelStore::new(dir.path().join("model.json")),
        );

        let service = RecommendationService::new(
            Arc::new(sample_menu()),
            rules,
            orders,
            weather,
            dietary,
            trainer,
            FallbackPolicy::default(),
        );
        Harness { service, _dir: dir }
    }

    fn in_memory(orders: Vec<Order>) -> Harness {
        build(
            Arc::new(InMemoryOrderHistory::new(orders)),
            Arc::new(FixedWeather::mild()),
            Arc::new(StaticDietaryProfile::default()),
        )
    }

    #[tokio::test]
    async fn test_empty_history_falls_back_to_default() {
        let harness = in_memory(Vec::new());
        let status = harness.service.initialize().await;
        assert!(!status.loaded);

        let rec = harness.service.recommend(1, at(3, 19)).await.unwrap();
        assert_eq!(rec.source, RecommendationSource::Fallback);
        assert_eq!(rec.recommended_dish, "Margherita");
    }

    #[tokio::test]
    async fn test_initialize_trains_and_serves_model() {
        let menu = sample_menu();
        let harness = in_memory(habitual_history(&menu));

        let status = harness.service.initialize().await;
        assert!(status.loaded);
        assert_eq!(status.classes.len(), 7);

        let rec = harness.service.recommend(1, at(3, 19)).await.unwrap();
        assert_eq!(rec.source, RecommendationSource::Model);
        assert!(rec.rationale.contains("Probability:"));
        assert_eq!(
            rec.ingredients,
            menu.get(&rec.recommended_dish).unwrap().ingredient_list()
        );
    }

    #[tokio::test]
    async fn test_reload_picks_up_persisted_model() {
        let menu = sample_menu();
        let harness = in_memory(habitual_history(&menu));
        harness.service.retrain().await.unwrap();

        let fresh = RecommendationService::new(
            Arc::new(menu),
            Arc::new(KeywordRules::default()),
            Arc::new(InMemoryOrderHistory::default()),
            Arc::new(FixedWeather::mild()),
            Arc::new(StaticDietaryProfile::default()),
            TrainingPipeline::new(
                TrainingConfig::default(),
                Arc::new(KeywordRules::default()),
                harness.service.trainer.store().clone(),
            ),
            FallbackPolicy::default(),
        );
        assert!(!fresh.model_status().await.loaded);
        assert!(fresh.reload().await.unwrap());
        assert_eq!(fresh.model_status().await, harness.service.model_status().await);
    }

    #[tokio::test]
    async fn test_reload_without_file_keeps_state() {
        let harness = in_memory(Vec::new());
        assert!(!harness.service.reload().await.unwrap());
        assert!(!harness.service.model_status().await.loaded);
    }

    #[tokio::test]
    async fn test_retrain_with_insufficient_data_is_rejected() {
        let menu = sample_menu();
        let harness = in_memory(vec![order(&menu, 1, "Pepperoni", 3, 19)]);

        let err = harness.service.retrain().await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Training(TrainingError::InsufficientData { found: 1, .. })
        ));
        assert!(!harness.service.model_status().await.loaded);
    }

    #[tokio::test]
    async fn test_weather_failure_is_treated_as_mild() {
        let menu = sample_menu();
        let mut weather = MockWeather::new();
        weather
            .expect_is_cold_now()
            .returning(|| Err(AppError::ExternalApi("weather service down".into())));

        let harness = build(
            Arc::new(InMemoryOrderHistory::new(vec![order(&menu, 1, "Chocolate", 3, 19)])),
            Arc::new(weather),
            Arc::new(StaticDietaryProfile::default()),
        );

        let rec = harness.service.recommend(1, at(9, 12)).await.unwrap();
        assert_eq!(rec.recommended_dish, "Chocolate");
        assert!(!rec.rationale.contains("cold"));
    }

    #[tokio::test]
    async fn test_history_failure_is_fallback_fault() {
        let mut history = MockHistory::new();
        history
            .expect_all_orders()
            .returning(|| Err(AppError::Internal("connection reset".into())));
        history.expect_name().return_const("mock");

        let harness = build(
            Arc::new(history),
            Arc::new(FixedWeather::mild()),
            Arc::new(StaticDietaryProfile::default()),
        );

        let err = harness.service.recommend(1, at(3, 19)).await.unwrap_err();
        assert!(matches!(err, AppError::Fallback(FallbackError::History(_))));
    }

    #[tokio::test]
    async fn test_dietary_lookup_uses_requesting_customer() {
        let menu = sample_menu();
        let mut dietary = MockDietary::new();
        dietary
            .expect_is_vegetarian()
            .withf(|id| *id == 5)
            .times(1)
            .returning(|_| Ok(true));

        let harness = build(
            Arc::new(InMemoryOrderHistory::new(vec![
                order(&menu, 5, "Pepperoni", 3, 19),
                order(&menu, 6, "Margherita", 4, 12),
            ])),
            Arc::new(FixedWeather::mild()),
            Arc::new(dietary),
        );

        let rec = harness.service.recommend(5, at(9, 21)).await.unwrap();
        assert_eq!(rec.recommended_dish, "Margherita");
    }

    #[tokio::test]
    async fn test_dietary_failure_is_fallback_fault() {
        let menu = sample_menu();
        let mut dietary = MockDietary::new();
        dietary
            .expect_is_vegetarian()
            .returning(|_| Err(AppError::Internal("profile store down".into())));

        let harness = build(
            Arc::new(InMemoryOrderHistory::new(vec![order(&menu, 5, "Pepperoni", 3, 19)])),
            Arc::new(FixedWeather::mild()),
            Arc::new(dietary),
        );

        let err = harness.service.recommend(5, at(9, 21)).await.unwrap_err();
        assert!(matches!(err, AppError::Fallback(FallbackError::Dietary(_))));
    }
}

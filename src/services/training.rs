use chrono::{DateTime, Utc};
use serde::Serialize;
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::{sync::Arc, time::Instant};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::{
    ml::{
        shuffle_split, stratified_split, ClassificationReport, ForestConfig, ForestError,
        LabelEncoder, RandomForestClassifier, ScalerError, SplitError, StandardScaler,
        TfidfVectorizer,
    },
    models::{MenuCatalog, Order},
    services::{
        features::{
            feature_columns, raw_record, reindex, Candidate, FeatureContext, FeatureError,
            SCALED_COLUMNS, UNSEEN_CUSTOMER,
        },
        keyword_rules::KeywordRules,
        model_store::{ModelBundle, ModelStore, StoreError, TrainingSummary, BUNDLE_FORMAT_VERSION},
    },
};

#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// Fewer orders than this and training is skipped
    pub min_samples: usize,
    pub test_fraction: f64,
    pub forest: ForestConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_samples: 15,
            test_fraction: 0.2,
            forest: ForestConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("insufficient data to train: {found} orders, need at least {required}")]
    InsufficientData { found: usize, required: usize },

    #[error("no ingredient vocabulary could be built from the order history")]
    EmptyVocabulary,

    #[error("dish {0} has no label")]
    UnknownLabel(String),

    #[error("feature error: {0}")]
    Features(#[from] FeatureError),

    #[error("scaling error: {0}")]
    Scaler(#[from] ScalerError),

    #[error("split error: {0}")]
    Split(#[from] SplitError),

    #[error("classifier error: {0}")]
    Classifier(#[from] ForestError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("order history unavailable: {0}")]
    History(String),

    #[error("training task failed: {0}")]
    Task(String),
}

/// Outcome of a successful training run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub trained_at: DateTime<Utc>,
    pub summary: TrainingSummary,
    pub report: ClassificationReport,
}

fn column_value(record: &[(String, f64)], column: &str) -> f64 {
    record
        .iter()
        .find(|(name, _)| name == column)
        .map_or(0.0, |(_, value)| *value)
}

/// Fits every artifact on the order history and evaluates on a held-out split
///
/// Pure and synchronous; persisting the result is up to the caller.
pub fn fit_bundle(
    orders: &[Order],
    menu: &MenuCatalog,
    rules: &KeywordRules,
    config: &TrainingConfig,
) -> Result<(ModelBundle, TrainingReport), TrainingError> {
    if orders.len() < config.min_samples {
        tracing::warn!(
            orders = orders.len(),
            required = config.min_samples,
            "Insufficient data to train model, skipping"
        );
        return Err(TrainingError::InsufficientData {
            found: orders.len(),
            required: config.min_samples,
        });
    }

    tracing::info!(orders = orders.len(), "Preparing features");

    let customer_encoder = LabelEncoder::fit(orders.iter().map(|o| &o.customer_id));
    let dish_encoder = LabelEncoder::fit(orders.iter().map(|o| &o.dish));

    let documents: Vec<String> = orders.iter().map(|o| o.ingredients.to_lowercase()).collect();
    let vectorizer = TfidfVectorizer::fit(&documents).ok_or(TrainingError::EmptyVocabulary)?;

    let mut records = Vec::with_capacity(orders.len());
    let mut labels = Vec::with_capacity(orders.len());
    for order in orders {
        let customer_encoded = customer_encoder
            .transform(&order.customer_id)
            .map_or(UNSEEN_CUSTOMER, |idx| idx as f64);
        let context = FeatureContext::at(order.ordered_at, order.cold_weather.unwrap_or(false));
        let candidate = Candidate::from_order(order, menu.get(&order.dish).map(|m| m.price));

        records.push(raw_record(
            customer_encoded,
            &context,
            &candidate,
            rules,
            &vectorizer,
        )?);
        labels.push(
            dish_encoder
                .transform(&order.dish)
                .ok_or_else(|| TrainingError::UnknownLabel(order.dish.clone()))?,
        );
    }

    let scaled_rows: Vec<Vec<f64>> = records
        .iter()
        .map(|record| {
            SCALED_COLUMNS
                .iter()
                .map(|column| column_value(record, column))
                .collect()
        })
        .collect();
    let scaler = StandardScaler::fit(&SCALED_COLUMNS, &scaled_rows)?;

    let schema = feature_columns(vectorizer.vocabulary_len());
    let features = records
        .into_iter()
        .map(|mut record| {
            scaler.transform_record(&mut record)?;
            Ok(reindex(&record, &schema))
        })
        .collect::<Result<Vec<Vec<f64>>, ScalerError>>()?;
    let x = DenseMatrix::from_2d_vec(&features);

    tracing::info!(
        rows = features.len(),
        columns = schema.len(),
        classes = dish_encoder.len(),
        "Splitting data"
    );

    let seed = config.forest.seed;
    let split = match stratified_split(&x, &labels, config.test_fraction, seed) {
        Ok(split) => split,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot stratify by dish, splitting without stratification");
            shuffle_split(&x, &labels, config.test_fraction, seed)?
        }
    };

    tracing::info!(
        train = split.y_train.len(),
        test = split.y_test.len(),
        trees = config.forest.n_estimators,
        "Training model"
    );

    let mut classifier = RandomForestClassifier::new(config.forest.clone());
    classifier.fit(&split.x_train, &split.y_train, dish_encoder.len())?;

    tracing::info!("Evaluating model");

    let y_pred = classifier.predict(&split.x_test)?;
    let report = ClassificationReport::new(&split.y_test, &y_pred, dish_encoder.classes());
    tracing::info!(accuracy = report.accuracy, "Model evaluated");
    tracing::debug!("Classification report:\n{}", report);

    let summary = TrainingSummary {
        samples: orders.len(),
        train_size: split.y_train.len(),
        test_size: split.y_test.len(),
        accuracy: report.accuracy,
        stratified: split.stratified,
    };
    let trained_at = Utc::now();

    let bundle = ModelBundle {
        format_version: BUNDLE_FORMAT_VERSION,
        trained_at,
        classifier,
        vectorizer,
        customer_encoder,
        dish_encoder,
        scaler,
        feature_columns: schema,
        summary: summary.clone(),
    };

    Ok((
        bundle,
        TrainingReport {
            trained_at,
            summary,
            report,
        },
    ))
}

/// Batch training with persistence; one run at a time
pub struct TrainingPipeline {
    config: TrainingConfig,
    rules: Arc<KeywordRules>,
    store: ModelStore,
    guard: Mutex<()>,
}

impl TrainingPipeline {
    pub fn new(config: TrainingConfig, rules: Arc<KeywordRules>, store: ModelStore) -> Self {
        Self {
            config,
            rules,
            store,
            guard: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Fits on a blocking thread and saves the bundle atomically
    ///
    /// Concurrent calls queue behind each other. On any error nothing is
    /// written and the existing artifact file is left untouched.
    pub async fn train(
        &self,
        orders: Vec<Order>,
        menu: Arc<MenuCatalog>,
    ) -> Result<(Arc<ModelBundle>, TrainingReport), TrainingError> {
        let _guard = self.guard.lock().await;
        let start = Instant::now();

        tracing::info!(orders = orders.len(), "Starting model training");

        let config = self.config.clone();
        let rules = self.rules.clone();
        let store = self.store.clone();

        let (bundle, report) = tokio::task::spawn_blocking(move || {
            let (bundle, report) = fit_bundle(&orders, &menu, &rules, &config)?;
            store.save(&bundle)?;
            Ok::<_, TrainingError>((bundle, report))
        })
        .await
        .map_err(|e| TrainingError::Task(e.to_string()))??;

        tracing::info!(
            elapsed_ms = start.elapsed().as_millis(),
            accuracy = report.summary.accuracy,
            "Model training completed"
        );

        Ok((Arc::new(bundle), report))
    }
}

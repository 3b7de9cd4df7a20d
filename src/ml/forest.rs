//! Random forest classifier built from smartcore decision trees
//!
//! Each tree is a smartcore CART classifier (Gini) grown on a bootstrap
//! sample. Bootstrap draws come from a per-tree `StdRng` seeded from the
//! configured seed, so fitting the same data twice yields the same forest.
//! Class probabilities are the share of trees voting for each class.

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use smartcore::{
    linalg::basic::{
        arrays::{Array, Array2},
        matrix::DenseMatrix,
    },
    tree::decision_tree_classifier::{
        DecisionTreeClassifier, DecisionTreeClassifierParameters, SplitCriterion,
    },
};
use std::fmt;
use thiserror::Error;

type Tree = DecisionTreeClassifier<f64, u32, DenseMatrix<f64>, Vec<u32>>;

#[derive(Debug, Error, PartialEq)]
pub enum ForestError {
    #[error("cannot fit on an empty dataset")]
    EmptyDataset,

    #[error("{features} feature rows but {labels} labels")]
    LengthMismatch { features: usize, labels: usize },

    #[error("label {label} is out of range for {n_classes} classes")]
    LabelOutOfRange { label: usize, n_classes: usize },

    #[error("classifier has not been fitted")]
    NotFitted,

    #[error("expected {expected} features, got {found}")]
    FeatureCount { expected: usize, found: usize },

    #[error("decision tree error: {0}")]
    Tree(String),
}

/// Training parameters for the forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_estimators: usize,
    pub max_depth: Option<u16>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            bootstrap: true,
            seed: 42,
        }
    }
}

impl ForestConfig {
    fn tree_parameters(&self) -> DecisionTreeClassifierParameters {
        let params = DecisionTreeClassifierParameters::default()
            .with_criterion(SplitCriterion::Gini)
            .with_min_samples_split(self.min_samples_split.max(2))
            .with_min_samples_leaf(self.min_samples_leaf.max(1));
        match self.max_depth {
            Some(depth) => params.with_max_depth(depth),
            None => params,
        }
    }
}

/// Multi-class random forest with probability estimates
#[derive(Serialize, Deserialize)]
pub struct RandomForestClassifier {
    config: ForestConfig,
    n_classes: usize,
    n_features: usize,
    trees: Vec<Tree>,
}

impl fmt::Debug for RandomForestClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomForestClassifier")
            .field("config", &self.config)
            .field("n_classes", &self.n_classes)
            .field("n_features", &self.n_features)
            .field("trees", &self.trees.len())
            .finish()
    }
}

impl RandomForestClassifier {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            n_classes: 0,
            n_features: 0,
            trees: Vec::new(),
        }
    }

    /// Fits the forest on a feature matrix and class indices `0..n_classes`
    pub fn fit(
        &mut self,
        x: &DenseMatrix<f64>,
        labels: &[usize],
        n_classes: usize,
    ) -> Result<(), ForestError> {
        let (n_samples, n_features) = x.shape();
        if n_samples == 0 {
            return Err(ForestError::EmptyDataset);
        }
        if n_samples != labels.len() {
            return Err(ForestError::LengthMismatch {
                features: n_samples,
                labels: labels.len(),
            });
        }
        if let Some(&label) = labels.iter().find(|&&label| label >= n_classes) {
            return Err(ForestError::LabelOutOfRange { label, n_classes });
        }

        let params = self.config.tree_parameters();
        let mut trees = Vec::with_capacity(self.config.n_estimators);

        for tree_idx in 0..self.config.n_estimators {
            let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(tree_idx as u64));

            let indices: Vec<usize> = if self.config.bootstrap {
                (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
            } else {
                (0..n_samples).collect()
            };

            let sample = x.take(&indices, 0);
            let targets: Vec<u32> = indices.iter().map(|&i| labels[i] as u32).collect();

            let tree = Tree::fit(&sample, &targets, params.clone())
                .map_err(|e| ForestError::Tree(e.to_string()))?;
            trees.push(tree);

            if (tree_idx + 1) % 10 == 0 {
                tracing::debug!(
                    trees = tree_idx + 1,
                    total = self.config.n_estimators,
                    "Forest training progress"
                );
            }
        }

        self.n_classes = n_classes;
        self.n_features = n_features;
        self.trees = trees;
        Ok(())
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Per-row share of trees voting for each class
    pub fn predict_proba(&self, x: &DenseMatrix<f64>) -> Result<Vec<Vec<f64>>, ForestError> {
        if !self.is_fitted() {
            return Err(ForestError::NotFitted);
        }
        let (n_rows, n_features) = x.shape();
        if n_features != self.n_features {
            return Err(ForestError::FeatureCount {
                expected: self.n_features,
                found: n_features,
            });
        }

        let mut proba = vec![vec![0.0; self.n_classes]; n_rows];
        for tree in &self.trees {
            let votes = tree
                .predict(x)
                .map_err(|e| ForestError::Tree(e.to_string()))?;
            for (row, vote) in proba.iter_mut().zip(votes) {
                if let Some(slot) = row.get_mut(vote as usize) {
                    *slot += 1.0;
                }
            }
        }

        let n_trees = self.trees.len() as f64;
        for row in &mut proba {
            for p in row.iter_mut() {
                *p /= n_trees;
            }
        }
        Ok(proba)
    }

    /// Class probabilities for a single feature row
    pub fn predict_proba_row(&self, features: &[f64]) -> Result<Vec<f64>, ForestError> {
        if !self.is_fitted() {
            return Err(ForestError::NotFitted);
        }
        if features.len() != self.n_features {
            return Err(ForestError::FeatureCount {
                expected: self.n_features,
                found: features.len(),
            });
        }
        let x = DenseMatrix::from_2d_vec(&vec![features.to_vec()]);
        Ok(self.predict_proba(&x)?.into_iter().next().unwrap_or_default())
    }

    /// Most probable class per row; ties go to the lowest class index
    pub fn predict(&self, x: &DenseMatrix<f64>) -> Result<Vec<usize>, ForestError> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .iter()
            .map(|row| {
                let mut best = 0;
                for (class, p) in row.iter().enumerate() {
                    if *p > row[best] {
                        best = class;
                    }
                }
                best
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable_data() -> (DenseMatrix<f64>, Vec<usize>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..30 {
            let x = i as f64;
            rows.push(vec![x, (i % 3) as f64]);
            labels.push(if x < 10.0 {
                0
            } else if x < 20.0 {
                1
            } else {
                2
            });
        }
        (DenseMatrix::from_2d_vec(&rows), labels)
    }

    fn small_config() -> ForestConfig {
        ForestConfig {
            n_estimators: 15,
            ..ForestConfig::default()
        }
    }

    fn rows(values: &[[f64; 2]]) -> DenseMatrix<f64> {
        DenseMatrix::from_2d_vec(&values.iter().map(|r| r.to_vec()).collect())
    }

    #[test]
    fn test_fit_and_predict_separable_classes() {
        let (x, labels) = separable_data();
        let mut forest = RandomForestClassifier::new(small_config());
        forest.fit(&x, &labels, 3).unwrap();

        assert!(forest.is_fitted());
        assert_eq!(
            forest
                .predict(&rows(&[[2.0, 0.0], [15.0, 1.0], [28.0, 2.0]]))
                .unwrap(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, labels) = separable_data();
        let mut forest = RandomForestClassifier::new(ForestConfig::default());
        forest.fit(&x, &labels, 3).unwrap();

        let proba = forest.predict_proba_row(&[12.0, 0.0]).unwrap();
        assert_eq!(proba.len(), 3);
        assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unseen_class_gets_zero_probability() {
        let (x, labels) = separable_data();
        let mut forest = RandomForestClassifier::new(small_config());
        // Class 3 exists in the label space but has no samples
        forest.fit(&x, &labels, 4).unwrap();

        let proba = forest.predict_proba_row(&[5.0, 1.0]).unwrap();
        assert_eq!(proba[3], 0.0);
    }

    #[test]
    fn test_fit_is_deterministic_for_a_seed() {
        let (x, labels) = separable_data();

        let mut a = RandomForestClassifier::new(ForestConfig::default());
        let mut b = RandomForestClassifier::new(ForestConfig::default());
        a.fit(&x, &labels, 3).unwrap();
        b.fit(&x, &labels, 3).unwrap();

        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_serialized_forest_predicts_the_same() {
        let (x, labels) = separable_data();
        let mut forest = RandomForestClassifier::new(small_config());
        forest.fit(&x, &labels, 3).unwrap();

        let json = serde_json::to_string(&forest).unwrap();
        let restored: RandomForestClassifier = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.n_classes(), 3);
        assert_eq!(
            restored.predict_proba(&x).unwrap(),
            forest.predict_proba(&x).unwrap()
        );
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let forest = RandomForestClassifier::new(ForestConfig::default());
        assert_eq!(
            forest.predict_proba(&rows(&[[1.0, 2.0]])),
            Err(ForestError::NotFitted)
        );
    }

    #[test]
    fn test_feature_count_mismatch() {
        let (x, labels) = separable_data();
        let mut forest = RandomForestClassifier::new(small_config());
        forest.fit(&x, &labels, 3).unwrap();

        assert_eq!(
            forest.predict_proba_row(&[1.0]),
            Err(ForestError::FeatureCount {
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn test_fit_rejects_bad_labels() {
        let x = rows(&[[1.0, 0.0], [2.0, 0.0]]);
        let mut forest = RandomForestClassifier::new(small_config());

        assert_eq!(
            forest.fit(&x, &[0], 2),
            Err(ForestError::LengthMismatch {
                features: 2,
                labels: 1
            })
        );
        assert_eq!(
            forest.fit(&x, &[0, 5], 2),
            Err(ForestError::LabelOutOfRange {
                label: 5,
                n_classes: 2
            })
        );
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::{self, BufWriter},
    path::{Path, PathBuf},
};
use thiserror::Error;

use crate::ml::{LabelEncoder, RandomForestClassifier, StandardScaler, TfidfVectorizer};

/// Bumped whenever the bundle layout changes incompatibly
pub const BUNDLE_FORMAT_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("model file I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("model file serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("model file has format version {found}, expected {expected}")]
    IncompatibleVersion { found: u32, expected: u32 },
}

/// Held-out evaluation recorded at training time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub samples: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub accuracy: f64,
    pub stratified: bool,
}

/// Everything inference needs, fitted together and persisted as one unit
///
/// The vectorizer, encoders, scaler and column list are only meaningful
/// alongside the classifier they were fitted with.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelBundle {
    pub format_version: u32,
    pub trained_at: DateTime<Utc>,
    pub classifier: RandomForestClassifier,
    pub vectorizer: TfidfVectorizer,
    pub customer_encoder: LabelEncoder<i64>,
    pub dish_encoder: LabelEncoder<String>,
    pub scaler: StandardScaler,
    pub feature_columns: Vec<String>,
    pub summary: TrainingSummary,
}

impl ModelBundle {
    /// Checks that the paired components agree with each other
    pub fn consistency_error(&self) -> Option<String> {
        if self.classifier.n_classes() != self.dish_encoder.len() {
            return Some(format!(
                "classifier has {} classes but dish encoder has {}",
                self.classifier.n_classes(),
                self.dish_encoder.len()
            ));
        }
        if self.classifier.n_features() != self.feature_columns.len() {
            return Some(format!(
                "classifier expects {} features but schema has {} columns",
                self.classifier.n_features(),
                self.feature_columns.len()
            ));
        }
        None
    }
}

fn write_bundle(path: &Path, bundle: &ModelBundle) -> Result<(), StoreError> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    serde_json::to_writer(&mut writer, bundle)?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

/// Single-file persistence for `ModelBundle`
#[derive(Debug, Clone)]
pub struct ModelStore {
    path: PathBuf,
}

impl ModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the bundle to a sibling temp file, then renames it into place
    pub fn save(&self, bundle: &ModelBundle) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("tmp");
        let written = write_bundle(&tmp_path, bundle)
            .and_then(|()| fs::rename(&tmp_path, &self.path).map_err(StoreError::from));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        tracing::info!(path = %self.path.display(), "Model saved");
        Ok(())
    }

    /// Loads the bundle; a missing file is `Ok(None)`
    pub fn load(&self) -> Result<Option<ModelBundle>, StoreError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "Model file not found; train first");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let bundle: ModelBundle = serde_json::from_slice(&raw)?;
        if bundle.format_version != BUNDLE_FORMAT_VERSION {
            return Err(StoreError::IncompatibleVersion {
                found: bundle.format_version,
                expected: BUNDLE_FORMAT_VERSION,
            });
        }

        tracing::info!(path = %self.path.display(), trained_at = %bundle.trained_at, "Model loaded");
        Ok(Some(bundle))
    }
}

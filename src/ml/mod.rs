//! Machine learning building blocks used by the recommendation model.
//!
//! Trees, scaling, splitting and accuracy come from smartcore; this module
//! wraps them with the label encoding, bagging and TF-IDF the model needs.

pub mod encoding;
pub mod forest;
pub mod metrics;
pub mod split;
pub mod tfidf;

pub use encoding::{LabelEncoder, ScalerError, StandardScaler};
pub use forest::{ForestConfig, ForestError, RandomForestClassifier};
pub use metrics::{accuracy, ClassificationReport};
pub use split::{shuffle_split, stratified_split, DataSplit, SplitError};
pub use tfidf::{cosine_similarity, TfidfVectorizer};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Tokens are runs of two or more word characters, matched on lower-cased text
static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w\w+\b").unwrap());

/// Splits a document into lower-cased tokens
pub fn tokenize(document: &str) -> Vec<String> {
    let lowered = document.to_lowercase();
    TOKEN_PATTERN
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// TF-IDF vectorizer over ingredient text
///
/// The vocabulary is sorted alphabetically, so column `i` of every transformed
/// vector always refers to the same term for a given fit. Weights use smoothed
/// IDF (`ln((1 + n) / (1 + df)) + 1`) and each output row is L2-normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    /// Fits the vocabulary and IDF weights on a set of documents
    ///
    /// Returns `None` when no document yields a single token.
    pub fn fit<S: AsRef<str>>(documents: &[S]) -> Option<Self> {
        let tokenized: Vec<BTreeSet<String>> = documents
            .iter()
            .map(|doc| tokenize(doc.as_ref()).into_iter().collect())
            .collect();

        let mut document_frequency: BTreeMap<String, usize> = BTreeMap::new();
        for terms in &tokenized {
            for term in terms {
                *document_frequency.entry(term.clone()).or_insert(0) += 1;
            }
        }

        if document_frequency.is_empty() {
            return None;
        }

        let n_docs = documents.len() as f64;
        let mut vocabulary = BTreeMap::new();
        let mut idf = Vec::with_capacity(document_frequency.len());

        // BTreeMap iteration is sorted, which fixes the column order
        for (idx, (term, df)) in document_frequency.into_iter().enumerate() {
            idf.push(((1.0 + n_docs) / (1.0 + df as f64)).ln() + 1.0);
            vocabulary.insert(term, idx);
        }

        Some(Self { vocabulary, idf })
    }

    /// Number of columns produced by `transform`
    pub fn vocabulary_len(&self) -> usize {
        self.idf.len()
    }

    /// Transforms a document into an L2-normalized TF-IDF row
    ///
    /// Terms outside the fitted vocabulary are ignored.
    pub fn transform(&self, document: &str) -> Vec<f64> {
        let mut row = vec![0.0; self.idf.len()];

        for token in tokenize(document) {
            if let Some(&idx) = self.vocabulary.get(&token) {
                row[idx] += 1.0;
            }
        }

        for (value, idf) in row.iter_mut().zip(&self.idf) {
            *value *= idf;
        }

        let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for value in &mut row {
                *value /= norm;
            }
        }

        row
    }

    pub fn fit_transform<S: AsRef<str>>(documents: &[S]) -> Option<(Self, Vec<Vec<f64>>)> {
        let vectorizer = Self::fit(documents)?;
        let rows = documents
            .iter()
            .map(|doc| vectorizer.transform(doc.as_ref()))
            .collect();
        Some((vectorizer, rows))
    }
}

/// Cosine similarity between two equally sized vectors (0.0 if either is zero)
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

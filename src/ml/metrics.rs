use serde::{Deserialize, Serialize};
use std::fmt;

/// Fraction of predictions equal to the true label (0.0 for no samples)
pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> f64 {
    if y_true.is_empty() || y_true.len() != y_pred.len() {
        return 0.0;
    }
    let y_true: Vec<u64> = y_true.iter().map(|&label| label as u64).collect();
    let y_pred: Vec<u64> = y_pred.iter().map(|&label| label as u64).collect();
    smartcore::metrics::accuracy(&y_true, &y_pred)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class precision/recall/F1 on a held-out set
///
/// Each class is scored one-vs-rest. Undefined ratios (no predictions or no
/// support) are reported as 0.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_f1: f64,
}

impl ClassificationReport {
    pub fn new<S: AsRef<str>>(y_true: &[usize], y_pred: &[usize], labels: &[S]) -> Self {
        let classes: Vec<ClassMetrics> = labels
            .iter()
            .enumerate()
            .map(|(class, label)| {
                let pairs = || y_true.iter().zip(y_pred);
                let tp = pairs().filter(|(t, p)| **t == class && **p == class).count();
                let predicted = y_pred.iter().filter(|&&p| p == class).count();
                let support = y_true.iter().filter(|&&t| t == class).count();

                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };

                ClassMetrics {
                    label: label.as_ref().to_string(),
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect();

        let macro_f1 = if classes.is_empty() {
            0.0
        } else {
            classes.iter().map(|c| c.f1).sum::<f64>() / classes.len() as f64
        };

        Self {
            classes,
            accuracy: accuracy(y_true, y_pred),
            macro_f1,
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<28} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        for class in &self.classes {
            writeln!(
                f,
                "{:<28} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                class.label, class.precision, class.recall, class.f1, class.support
            )?;
        }
        write!(
            f,
            "accuracy {:.4}, macro f1 {:.4}",
            self.accuracy, self.macro_f1
        )
    }
}

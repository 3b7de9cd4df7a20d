use serde::{Deserialize, Serialize};
use smartcore::{
    api::{Transformer, UnsupervisedEstimator},
    linalg::basic::{arrays::Array, matrix::DenseMatrix},
    preprocessing::numerical::{StandardScaler as ColumnScaler, StandardScalerParameters},
};
use thiserror::Error;

/// Maps labels to dense indices `0..n` in sorted label order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder<T> {
    classes: Vec<T>,
}

impl<T: Ord + Clone> LabelEncoder<T> {
    pub fn fit<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let mut classes: Vec<T> = labels.into_iter().cloned().collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    /// Index of `label`, or `None` if it was not seen during fitting
    pub fn transform(&self, label: &T) -> Option<usize> {
        self.classes.binary_search(label).ok()
    }

    pub fn classes(&self) -> &[T] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[derive(Debug, Error)]
#[error("scaler error: {0}")]
pub struct ScalerError(String);

/// Standardization (zero mean, unit variance) of named columns
///
/// The fitted statistics live in a smartcore `StandardScaler`. Columns are
/// addressed by name so the scaler can be applied to a record before it is
/// reindexed to the persisted schema.
#[derive(Debug, Serialize, Deserialize)]
pub struct StandardScaler {
    columns: Vec<String>,
    fitted: ColumnScaler<f64>,
}

impl StandardScaler {
    /// Fits one mean/deviation pair per named column
    ///
    /// `rows[i][j]` is the value of `columns[j]` in sample `i`.
    pub fn fit(columns: &[&str], rows: &[Vec<f64>]) -> Result<Self, ScalerError> {
        if rows.is_empty() {
            return Err(ScalerError("no rows to fit".to_string()));
        }
        if let Some(row) = rows.iter().find(|row| row.len() != columns.len()) {
            return Err(ScalerError(format!(
                "expected {} values per row, found {}",
                columns.len(),
                row.len()
            )));
        }

        let x = DenseMatrix::from_2d_vec(&rows.to_vec());
        let fitted = ColumnScaler::fit(&x, StandardScalerParameters::default())
            .map_err(|e| ScalerError(e.to_string()))?;

        Ok(Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            fitted,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Scales every fitted column present in a named record, in place
    ///
    /// Fitted columns missing from the record are scaled as 0.0 and left out.
    pub fn transform_record(&self, record: &mut [(String, f64)]) -> Result<(), ScalerError> {
        let positions: Vec<Option<usize>> = self
            .columns
            .iter()
            .map(|column| record.iter().position(|(name, _)| name == column))
            .collect();
        let values: Vec<f64> = positions
            .iter()
            .map(|position| position.map_or(0.0, |i| record[i].1))
            .collect();

        let scaled = self
            .fitted
            .transform(&DenseMatrix::from_2d_vec(&vec![values]))
            .map_err(|e| ScalerError(e.to_string()))?;

        for (j, position) in positions.into_iter().enumerate() {
            if let Some(i) = position {
                let value = *scaled.get((0, j));
                // constant columns have zero deviation
                record[i].1 = if value.is_finite() { value } else { 0.0 };
            }
        }
        Ok(())
    }
}

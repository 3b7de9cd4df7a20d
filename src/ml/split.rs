//! Train/test splitting of a feature matrix and its class labels

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use smartcore::{
    linalg::basic::{
        arrays::{Array, Array2},
        matrix::DenseMatrix,
    },
    model_selection::train_test_split,
};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SplitError {
    #[error("class {class} has only {count} sample(s); stratification needs at least 2")]
    TooFewMembers { class: usize, count: usize },

    #[error("{split} split of {size} samples cannot hold all {n_classes} classes")]
    SplitTooSmall {
        split: &'static str,
        size: usize,
        n_classes: usize,
    },

    #[error("not enough samples to split: {0}")]
    NotEnoughSamples(usize),

    #[error("test fraction must be in (0, 1), got {0}")]
    InvalidFraction(f64),

    #[error("{features} feature rows but {labels} labels")]
    LengthMismatch { features: usize, labels: usize },
}

/// Both halves of a split, rows of `x_*` aligned with `y_*`
#[derive(Debug)]
pub struct DataSplit {
    pub x_train: DenseMatrix<f64>,
    pub x_test: DenseMatrix<f64>,
    pub y_train: Vec<usize>,
    pub y_test: Vec<usize>,
    pub stratified: bool,
}

fn check_inputs(x: &DenseMatrix<f64>, labels: &[usize], fraction: f64) -> Result<(), SplitError> {
    let n_rows = x.shape().0;
    if n_rows != labels.len() {
        return Err(SplitError::LengthMismatch {
            features: n_rows,
            labels: labels.len(),
        });
    }
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(SplitError::InvalidFraction(fraction));
    }
    if labels.len() < 2 {
        return Err(SplitError::NotEnoughSamples(labels.len()));
    }
    Ok(())
}

/// Shuffled split without regard to class balance
///
/// Delegates to smartcore's `train_test_split`, which puts
/// `floor(n * fraction)` rows in the test half.
pub fn shuffle_split(
    x: &DenseMatrix<f64>,
    labels: &[usize],
    fraction: f64,
    seed: u64,
) -> Result<DataSplit, SplitError> {
    check_inputs(x, labels, fraction)?;
    // train_test_split panics on an empty test half
    if ((labels.len() as f32) * (fraction as f32)) < 1.0 {
        return Err(SplitError::NotEnoughSamples(labels.len()));
    }

    let y: Vec<u32> = labels.iter().map(|&label| label as u32).collect();
    let (x_train, x_test, y_train, y_test) =
        train_test_split(x, &y, fraction as f32, true, Some(seed));

    Ok(DataSplit {
        x_train,
        x_test,
        y_train: y_train.into_iter().map(|label| label as usize).collect(),
        y_test: y_test.into_iter().map(|label| label as usize).collect(),
        stratified: false,
    })
}

/// Split that keeps class proportions in both halves
///
/// Fails when a class has fewer than two samples or when either half is too
/// small to contain every class. Test slots are assigned per class by the
/// floor of its proportional share, remaining slots going to the classes
/// with the largest fractional remainders (lowest class index on ties).
pub fn stratified_split(
    x: &DenseMatrix<f64>,
    labels: &[usize],
    fraction: f64,
    seed: u64,
) -> Result<DataSplit, SplitError> {
    check_inputs(x, labels, fraction)?;
    let n_samples = labels.len();

    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (idx, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(idx);
    }

    if let Some((&class, members)) = by_class.iter().find(|(_, m)| m.len() < 2) {
        return Err(SplitError::TooFewMembers {
            class,
            count: members.len(),
        });
    }

    let n_classes = by_class.len();
    let n_test = ((n_samples as f64 * fraction).ceil() as usize).clamp(1, n_samples - 1);
    let n_train = n_samples - n_test;
    if n_test < n_classes {
        return Err(SplitError::SplitTooSmall {
            split: "test",
            size: n_test,
            n_classes,
        });
    }
    if n_train < n_classes {
        return Err(SplitError::SplitTooSmall {
            split: "train",
            size: n_train,
            n_classes,
        });
    }

    let mut allocations: Vec<(usize, usize, f64)> = by_class
        .iter()
        .map(|(&class, members)| {
            let exact = members.len() as f64 * n_test as f64 / n_samples as f64;
            (class, exact.floor() as usize, exact - exact.floor())
        })
        .collect();

    let mut remaining = n_test - allocations.iter().map(|a| a.1).sum::<usize>();
    let mut by_remainder: Vec<usize> = (0..allocations.len()).collect();
    by_remainder
        .sort_by(|&a, &b| allocations[b].2.total_cmp(&allocations[a].2).then(a.cmp(&b)));

    for slot in by_remainder.into_iter().cycle() {
        if remaining == 0 {
            break;
        }
        let capacity = by_class[&allocations[slot].0].len() - 1;
        if allocations[slot].1 < capacity {
            allocations[slot].1 += 1;
            remaining -= 1;
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n_train);
    let mut test = Vec::with_capacity(n_test);

    for (class, take, _) in allocations {
        let mut members = by_class[&class].clone();
        members.shuffle(&mut rng);
        let rest = members.split_off(take);
        test.extend(members);
        train.extend(rest);
    }

    Ok(DataSplit {
        x_train: x.take(&train, 0),
        x_test: x.take(&test, 0),
        y_train: train.iter().map(|&i| labels[i]).collect(),
        y_test: test.iter().map(|&i| labels[i]).collect(),
        stratified: true,
    })
}

//! Feature means, overall and per zone
//!
//! Sums are accumulated in row order so results are reproducible bit for bit.

use fieldzones_core::{Error, Result};
use ndarray::ArrayView2;

/// Arithmetic mean of each column. Empty input yields NaN means.
pub fn column_means(data: ArrayView2<f64>) -> Vec<f64> {
    let n = data.nrows();
    let mut sums = vec![0.0; data.ncols()];
    for row in data.rows() {
        for (s, v) in sums.iter_mut().zip(row.iter()) {
            *s += v;
        }
    }
    sums.into_iter().map(|s| s / n as f64).collect()
}

/// Count and column means of the rows carrying one label.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMeans {
    pub label: usize,
    pub count: usize,
    /// NaN for every column when `count == 0`
    pub means: Vec<f64>,
}

/// Column means per label in `0..k`, in label order.
pub fn grouped_means(data: ArrayView2<f64>, labels: &[usize], k: usize) -> Result<Vec<GroupMeans>> {
    if labels.len() != data.nrows() {
        return Err(Error::SizeMismatch {
            er: data.nrows(),
            ec: 1,
            ar: labels.len(),
            ac: 1,
        });
    }

    let d = data.ncols();
    let mut sums = vec![vec![0.0; d]; k];
    let mut counts = vec![0usize; k];

    for (row, &label) in data.rows().into_iter().zip(labels) {
        let sum = sums.get_mut(label).ok_or_else(|| Error::InvalidParameter {
            name: "labels",
            value: label.to_string(),
            reason: format!("must be < k ({})", k),
        })?;
        for (s, v) in sum.iter_mut().zip(row.iter()) {
            *s += v;
        }
        counts[label] += 1;
    }

    Ok(sums
        .into_iter()
        .zip(counts)
        .enumerate()
        .map(|(label, (sum, count))| GroupMeans {
            label,
            count,
            means: sum.into_iter().map(|s| s / count as f64).collect(),
        })
        .collect())
}

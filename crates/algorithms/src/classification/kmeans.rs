//! K-means clustering of feature vectors
//!
//! Lloyd iterations over an `n_samples × n_features` matrix, seeded with
//! k-means++ and restarted `n_init` times. The run with the lowest inertia
//! (sum of squared distances to the assigned centroid) is kept.

use crate::maybe_rayon::*;
use fieldzones_core::{Error, Result};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Parameters for K-means clustering
#[derive(Debug, Clone)]
pub struct KmeansParams {
    /// Number of clusters
    pub k: usize,
    /// Maximum Lloyd iterations per restart (default: 300)
    pub max_iterations: usize,
    /// Stop when no centroid moves further than this (default: 1e-4)
    pub tolerance: f64,
    /// Number of k-means++ restarts (default: 10)
    pub n_init: usize,
    /// Random seed for centroid initialisation
    pub seed: u64,
}

impl Default for KmeansParams {
    fn default() -> Self {
        Self {
            k: 4,
            max_iterations: 300,
            tolerance: 1e-4,
            n_init: 10,
            seed: 42,
        }
    }
}

/// Outcome of the best restart.
#[derive(Debug, Clone)]
pub struct KmeansResult {
    /// Cluster index per row, in `0..k`
    pub labels: Vec<usize>,
    /// `k × n_features` centroid matrix
    pub centroids: Array2<f64>,
    pub inertia: f64,
    /// Lloyd iterations used by the kept restart
    pub iterations: usize,
}

/// K-means clustering on the rows of `data`.
///
/// Assignment ties go to the lowest centroid index and an empty cluster
/// keeps its previous centroid. The result depends only on `data` and
/// `params`, so repeated calls return identical labels.
///
/// # Errors
/// - `k < 2`
/// - any non-finite value
/// - fewer distinct rows than `k`
pub fn kmeans(data: ArrayView2<f64>, params: &KmeansParams) -> Result<KmeansResult> {
    if params.k < 2 {
        return Err(Error::Algorithm("K-means requires k >= 2".into()));
    }
    if params.n_init == 0 || params.max_iterations == 0 {
        return Err(Error::InvalidParameter {
            name: "n_init/max_iterations",
            value: format!("{}/{}", params.n_init, params.max_iterations),
            reason: "must be positive".into(),
        });
    }

    if let Some(((row, col), v)) = data.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(Error::InvalidParameter {
            name: "data",
            value: format!("{} at row {}, column {}", v, row, col),
            reason: "k-means input must be finite".into(),
        });
    }

    let distinct = count_distinct_rows(data);
    if distinct < params.k {
        return Err(Error::Algorithm(format!(
            "Not enough distinct samples ({}) for {} clusters",
            distinct, params.k
        )));
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut best: Option<KmeansResult> = None;

    for run in 0..params.n_init {
        let init = kmeans_plus_plus(data, params.k, &mut rng);
        let result = lloyd(data, init, params);
        tracing::debug!(
            "k-means restart {}: inertia {:.6} after {} iterations",
            run,
            result.inertia,
            result.iterations
        );
        // Strict comparison: the earliest restart wins ties.
        if best.as_ref().map_or(true, |b| result.inertia < b.inertia) {
            best = Some(result);
        }
    }

    best.ok_or_else(|| Error::Algorithm("K-means produced no result".into()))
}

fn lloyd(data: ArrayView2<f64>, mut centroids: Array2<f64>, params: &KmeansParams) -> KmeansResult {
    let (n, d) = data.dim();
    let mut iterations = 0;

    for _ in 0..params.max_iterations {
        iterations += 1;
        let labels = assign(data, &centroids);

        // Update step: recompute centroids
        let mut sums = Array2::<f64>::zeros((params.k, d));
        let mut counts = vec![0usize; params.k];
        for i in 0..n {
            let k = labels[i];
            sums.row_mut(k).scaled_add(1.0, &data.row(i));
            counts[k] += 1;
        }

        let mut max_shift = 0.0_f64;
        for k in 0..params.k {
            if counts[k] == 0 {
                continue; // Keep empty cluster centroid
            }
            let new_row = sums.row(k).mapv(|s| s / counts[k] as f64);
            max_shift = max_shift.max(squared_distance(new_row.view(), centroids.row(k)).sqrt());
            centroids.row_mut(k).assign(&new_row);
        }

        if max_shift < params.tolerance {
            break;
        }
    }

    // Final assignment against the converged centroids.
    let labels = assign(data, &centroids);
    let inertia = (0..n)
        .map(|i| squared_distance(data.row(i), centroids.row(labels[i])))
        .sum();

    KmeansResult {
        labels,
        centroids,
        inertia,
        iterations,
    }
}

fn assign(data: ArrayView2<f64>, centroids: &Array2<f64>) -> Vec<usize> {
    (0..data.nrows())
        .into_par_iter()
        .map(|i| nearest(data.row(i), centroids).0)
        .collect()
}

/// Index of and squared distance to the nearest centroid; lowest index wins ties.
fn nearest(point: ArrayView1<f64>, centroids: &Array2<f64>) -> (usize, f64) {
    let mut best_k = 0;
    let mut best_dist = f64::INFINITY;
    for (k, centroid) in centroids.axis_iter(Axis(0)).enumerate() {
        let dist = squared_distance(point, centroid);
        if dist < best_dist {
            best_dist = dist;
            best_k = k;
        }
    }
    (best_k, best_dist)
}

/// k-means++ seeding: first centre uniform, then proportional to D².
fn kmeans_plus_plus(data: ArrayView2<f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let (n, d) = data.dim();
    let mut centroids = Array2::<f64>::zeros((k, d));

    let first = rng.gen_range(0..n);
    centroids.row_mut(0).assign(&data.row(first));

    let mut min_dist: Vec<f64> = (0..n)
        .map(|i| squared_distance(data.row(i), data.row(first)))
        .collect();

    for c in 1..k {
        let total: f64 = min_dist.iter().sum();
        let chosen = if total > 0.0 {
            let target = rng.gen::<f64>() * total;
            let mut acc = 0.0;
            let mut pick = None;
            for (i, &w) in min_dist.iter().enumerate() {
                acc += w;
                if w > 0.0 && acc >= target {
                    pick = Some(i);
                    break;
                }
            }
            // Rounding can leave the cumulative sum just short of target.
            pick.or_else(|| min_dist.iter().rposition(|&w| w > 0.0)).unwrap_or(0)
        } else {
            0
        };

        centroids.row_mut(c).assign(&data.row(chosen));
        for (i, dist) in min_dist.iter_mut().enumerate() {
            *dist = dist.min(squared_distance(data.row(i), data.row(chosen)));
        }
    }

    centroids
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn count_distinct_rows(data: ArrayView2<f64>) -> usize {
    let mut rows: Vec<Vec<u64>> = data
        .axis_iter(Axis(0))
        // Normalise -0.0 so it compares equal to 0.0.
        .map(|r| r.iter().map(|v| (v + 0.0).to_bits()).collect())
        .collect();
    rows.sort_unstable();
    rows.dedup();
    rows.len()
}

/// Per-column z-score standardisation.
///
/// Columns with zero variance are only centred.
pub fn standardize(data: ArrayView2<f64>) -> Array2<f64> {
    let n = data.nrows().max(1) as f64;
    let mut out = data.to_owned();
    for mut col in out.axis_iter_mut(Axis(1)) {
        let mean = col.sum() / n;
        let var = col.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        let std = var.sqrt();
        let scale = if std > 0.0 { std } else { 1.0 };
        col.mapv_inplace(|v| (v - mean) / scale);
    }
    out
}

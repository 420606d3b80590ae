//! L2 normalization.
//!
//! Two zero-norm policies coexist. Single-item paths ([`l2_normalize`]) leave a
//! zero vector untouched. Batch paths ([`l2_normalize_rows`]) divide by
//! `max(norm, BATCH_NORM_EPSILON)` so one degenerate row cannot turn into NaN.

use ndarray::{Array2, Axis};

/// Floor divisor for batch normalization.
pub const BATCH_NORM_EPSILON: f32 = 1e-12;

/// L2-normalize a vector. Returns the input unchanged if its norm is zero.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

/// L2-normalize every row of a `[batch, dim]` matrix, flooring the divisor at
/// [`BATCH_NORM_EPSILON`].
pub fn l2_normalize_rows(mut rows: Array2<f32>) -> Vec<Vec<f32>> {
    for mut row in rows.axis_iter_mut(Axis(0)) {
        let norm = row.iter().map(|x| x * x).sum::<f32>().sqrt();
        let divisor = norm.max(BATCH_NORM_EPSILON);
        row.mapv_inplace(|x| x / divisor);
    }
    rows.outer_iter().map(|row| row.to_vec()).collect()
}

/// Batch-normalize a list of equal-length vectors (text encoder output).
pub fn l2_normalize_batch(vectors: Vec<Vec<f32>>) -> Vec<Vec<f32>> {
    vectors
        .into_iter()
        .map(|v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            let divisor = norm.max(BATCH_NORM_EPSILON);
            v.into_iter().map(|x| x / divisor).collect()
        })
        .collect()
}

/// Euclidean length of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

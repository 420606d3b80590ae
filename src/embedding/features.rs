//! Image feature extraction.
//!
//! Vision encoders disagree about what they return: some exports emit the
//! projected embedding directly, some wrap it next to a pooled representation,
//! some only expose the per-token hidden states. [`FeatureOutput`] names those
//! shapes and [`extract_features`] collapses any of them into one `[batch, dim]`
//! matrix, in a fixed priority order: plain tensor, pooled, mean of hidden states.

use ndarray::{Array2, ArrayD, Axis};

use crate::error::{EmbedError, Result};

/// Raw output of one image-encoder invocation.
#[derive(Debug, Clone)]
pub enum FeatureOutput {
    /// A bare feature tensor, e.g. `[batch, 512]`.
    Tensor(ArrayD<f32>),
    /// A model output object with optional named fields.
    Wrapped(ModelOutput),
}

/// Named fields of a wrapped encoder output. Either may be missing.
#[derive(Debug, Clone, Default)]
pub struct ModelOutput {
    /// Pooled representation, `[batch, dim]`.
    pub pooler_output: Option<ArrayD<f32>>,
    /// Per-token hidden states, `[batch, seq, dim]`.
    pub last_hidden_state: Option<ArrayD<f32>>,
}

/// Collapse an encoder output into `batch_size` rows of exactly `expected_dim` values.
pub fn extract_features(
    output: FeatureOutput,
    batch_size: usize,
    expected_dim: usize,
) -> Result<Array2<f32>> {
    let features = match output {
        FeatureOutput::Tensor(tensor) => tensor,
        FeatureOutput::Wrapped(ModelOutput {
            pooler_output: Some(pooled),
            ..
        }) => pooled,
        FeatureOutput::Wrapped(ModelOutput {
            last_hidden_state: Some(hidden),
            ..
        }) => mean_over_sequence(hidden)?,
        FeatureOutput::Wrapped(_) => {
            return Err(EmbedError::UnsupportedOutputShape(
                "output has neither pooled features nor hidden states".into(),
            ))
        }
    };

    into_rows(features, batch_size, expected_dim)
}

/// Extract the single vector of a one-image invocation.
pub fn extract_single(output: FeatureOutput, expected_dim: usize) -> Result<Vec<f32>> {
    let rows = extract_features(output, 1, expected_dim)?;
    Ok(rows.row(0).to_vec())
}

/// Mean over the sequence axis of a `[batch, seq, dim]` tensor.
fn mean_over_sequence(hidden: ArrayD<f32>) -> Result<ArrayD<f32>> {
    if hidden.ndim() != 3 {
        return Err(EmbedError::UnsupportedOutputShape(format!(
            "hidden states must be [batch, seq, dim], got {:?}",
            hidden.shape()
        )));
    }
    hidden
        .mean_axis(Axis(1))
        .ok_or_else(|| EmbedError::UnsupportedOutputShape("hidden-state sequence is empty".into()))
}

/// Flatten and split into `batch_size` rows, enforcing the row width.
fn into_rows(features: ArrayD<f32>, batch_size: usize, expected_dim: usize) -> Result<Array2<f32>> {
    let total = features.len();

    if batch_size == 0 {
        if total == 0 {
            return Ok(Array2::zeros((0, expected_dim)));
        }
        return Err(EmbedError::DimensionMismatch {
            expected: 0,
            actual: total,
        });
    }

    let per_item = total / batch_size;
    if per_item * batch_size != total || per_item != expected_dim {
        return Err(EmbedError::DimensionMismatch {
            expected: expected_dim,
            actual: per_item,
        });
    }

    // iter() walks logical order, so non-contiguous layouts flatten correctly
    let flat: Vec<f32> = features.iter().copied().collect();
    Array2::from_shape_vec((batch_size, expected_dim), flat)
        .map_err(|e| EmbedError::UnsupportedOutputShape(e.to_string()))
}

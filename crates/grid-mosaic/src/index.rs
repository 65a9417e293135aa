//! Row-major conversion between flat offsets and multidimensional indices.
//!
//! The last dimension varies fastest:
//!
//! ```text
//! flat = Σ index[i] · ∏_{j>i} dims[j]
//! ```

use crate::error::{MosaicError, Result};
use crate::types::{MultiIndex, MAX_NDIMS};

/// Check that `dims` describes a non-empty grid whose cell count fits in `usize`.
pub fn validate_dims(dims: &[usize]) -> Result<()> {
    if dims.is_empty() {
        return Err(MosaicError::invalid_dimensions("at least one dimension is required"));
    }
    if dims.len() > MAX_NDIMS {
        return Err(MosaicError::invalid_dimensions(format!(
            "{} dimensions exceeds the maximum of {}",
            dims.len(),
            MAX_NDIMS
        )));
    }
    if let Some(axis) = dims.iter().position(|&d| d == 0) {
        return Err(MosaicError::invalid_dimensions(format!(
            "extent of dimension {} must be > 0",
            axis
        )));
    }
    dims.iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| MosaicError::invalid_dimensions(format!("cell count of {:?} overflows", dims)))?;
    Ok(())
}

/// Total number of cells, the product of `dims`.
pub fn cell_count(dims: &[usize]) -> usize {
    dims.iter().product()
}

/// Per-dimension strides: `prod[n-1] = 1`, `prod[i] = prod[i+1] · dims[i+1]`.
pub fn suffix_products(dims: &[usize]) -> Vec<usize> {
    let mut prod = vec![1usize; dims.len()];
    for i in (0..dims.len().saturating_sub(1)).rev() {
        prod[i] = prod[i + 1] * dims[i + 1];
    }
    prod
}

/// Linearize a multidimensional index.
pub fn flatten(dims: &[usize], index: &[usize]) -> Result<usize> {
    if index.len() != dims.len() {
        return Err(MosaicError::shape_mismatch(dims.len(), index.len()));
    }
    let mut flat = 0usize;
    for (axis, (&i, &d)) in index.iter().zip(dims).enumerate() {
        if i >= d {
            return Err(MosaicError::out_of_range(
                format!("{:?} (dimension {})", index, axis),
                format!("{:?}", dims),
            ));
        }
        flat = flat * d + i;
    }
    Ok(flat)
}

/// Inverse of [`flatten`].
pub fn unflatten(dims: &[usize], flat: usize) -> Result<MultiIndex> {
    let count = cell_count(dims);
    if flat >= count {
        return Err(MosaicError::out_of_range(flat.to_string(), count.to_string()));
    }
    let prod = suffix_products(dims);
    Ok(dims
        .iter()
        .zip(&prod)
        .map(|(&d, &p)| (flat / p) % d)
        .collect())
}

/// Linearize with precomputed strides and no bounds checks.
pub(crate) fn flatten_with_strides(strides: &[usize], index: &[usize]) -> usize {
    index.iter().zip(strides).map(|(&i, &s)| i * s).sum()
}

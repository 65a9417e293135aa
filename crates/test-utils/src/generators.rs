//! Test data generators for N-dimensional fields and matrices.
//!
//! These generators create predictable, verifiable test data patterns
//! that can be used across the test suite. Fields are row-major with the
//! last dimension varying fastest.

/// Number of cells in a grid of the given extents.
pub fn cell_count(dims: &[usize]) -> usize {
    dims.iter().product()
}

/// Row-major multi-index of `flat` in a grid of the given extents.
pub fn multi_index(dims: &[usize], flat: usize) -> Vec<usize> {
    let mut idx = vec![0; dims.len()];
    let mut rem = flat;
    for d in (0..dims.len()).rev() {
        idx[d] = rem % dims[d];
        rem /= dims[d];
    }
    idx
}

/// Creates a field whose value is its own flat index.
///
/// # Example
///
/// ```
/// use test_utils::ramp_field;
///
/// let field = ramp_field(&[2, 3]);
/// assert_eq!(field, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
/// ```
pub fn ramp_field(dims: &[usize]) -> Vec<f64> {
    (0..cell_count(dims)).map(|flat| flat as f64).collect()
}

/// Creates the affine field `offset + sum(coefficients[d] * i_d)`.
///
/// Multilinear interpolation must reproduce such a field exactly.
pub fn plane_field(dims: &[usize], coefficients: &[f64], offset: f64) -> Vec<f64> {
    assert_eq!(dims.len(), coefficients.len(), "one coefficient per dimension");
    (0..cell_count(dims))
        .map(|flat| {
            multi_index(dims, flat)
                .iter()
                .zip(coefficients)
                .fold(offset, |acc, (&i, c)| acc + c * i as f64)
        })
        .collect()
}

/// Creates physical coordinate fields `x = A * i + b`, one per dimension.
///
/// `matrix` is row-major `n x n` where `n = dims.len()`.
pub fn affine_coords(dims: &[usize], matrix: &[f64], offset: &[f64]) -> Vec<Vec<f64>> {
    let n = dims.len();
    assert_eq!(matrix.len(), n * n, "matrix must be n x n");
    assert_eq!(offset.len(), n, "one offset per dimension");
    (0..n)
        .map(|r| plane_field(dims, &matrix[r * n..(r + 1) * n], offset[r]))
        .collect()
}

/// Creates a mask that invalidates every `stride`-th cell, starting at `first`.
pub fn strided_mask(dims: &[usize], first: usize, stride: usize) -> Vec<bool> {
    let stride = stride.max(1);
    (0..cell_count(dims))
        .map(|flat| flat < first || (flat - first) % stride != 0)
        .collect()
}

/// Row-major identity matrix of order `n`.
pub fn identity_matrix(n: usize) -> Vec<f64> {
    let mut m = vec![0.0; n * n];
    for i in 0..n {
        m[i * n + i] = 1.0;
    }
    m
}

/// Creates a deterministic pseudo-random `n x n` matrix with entries in `[-1, 1)`.
pub fn pseudo_random_matrix(n: usize, seed: u32) -> Vec<f64> {
    (0..n * n)
        .map(|k| {
            let hash = simple_hash((k / n.max(1)) as u32, (k % n.max(1)) as u32, seed);
            (hash % 20_000) as f64 / 10_000.0 - 1.0
        })
        .collect()
}

/// Simple deterministic hash for reproducible test data.
fn simple_hash(x: u32, y: u32, seed: u32) -> u32 {
    let mut h = seed;
    h = h.wrapping_mul(31).wrapping_add(x);
    h = h.wrapping_mul(31).wrapping_add(y);
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_index_row_major() {
        assert_eq!(multi_index(&[2, 3, 4], 23), vec![1, 2, 3]);
        assert_eq!(multi_index(&[5], 4), vec![4]);
    }

    #[test]
    fn test_plane_field() {
        let field = plane_field(&[2, 2], &[10.0, 1.0], 0.5);
        assert_eq!(field, vec![0.5, 1.5, 10.5, 11.5]);
    }

    #[test]
    fn test_affine_coords() {
        let coords = affine_coords(&[2, 2], &[1.0, 0.0, 0.0, 2.0], &[0.0, 1.0]);
        assert_eq!(coords[0], vec![0.0, 0.0, 1.0, 1.0]);
        assert_eq!(coords[1], vec![1.0, 3.0, 1.0, 3.0]);
    }

    #[test]
    fn test_strided_mask() {
        let mask = strided_mask(&[6], 1, 2);
        assert_eq!(mask, vec![true, false, true, false, true, false]);
    }

    #[test]
    fn test_pseudo_random_matrix_is_deterministic() {
        let a = pseudo_random_matrix(4, 7);
        let b = pseudo_random_matrix(4, 7);
        let c = pseudo_random_matrix(4, 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|v| (-1.0..1.0).contains(v)));
    }

    #[test]
    fn test_identity_matrix() {
        assert_eq!(identity_matrix(2), vec![1.0, 0.0, 0.0, 1.0]);
    }
}

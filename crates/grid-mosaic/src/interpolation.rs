//! Interpolation of scalar fields on N-dimensional structured grids.
//!
//! All routines are generic over the storage precision (`f32` or `f64`) and
//! only read from the field, so they can be called concurrently on a shared
//! [`FieldView`].

use num_traits::{cast, Float};
use rayon::prelude::*;

use crate::error::{MosaicError, Result};
use crate::index;
use crate::stencil;
use crate::types::{InterpolationMethod, MaskPolicy, MultiIndex};

/// Borrowed view of a grid's values and optional validity mask.
#[derive(Debug, Clone)]
pub struct FieldView<'a, T> {
    dims: &'a [usize],
    values: &'a [T],
    mask: Option<&'a [bool]>,
    strides: Vec<usize>,
}

impl<'a, T: Float> FieldView<'a, T> {
    /// Create a view over row-major `values` with the given extents.
    pub fn new(dims: &'a [usize], values: &'a [T]) -> Result<Self> {
        index::validate_dims(dims)?;
        let count = index::cell_count(dims);
        if values.len() != count {
            return Err(MosaicError::shape_mismatch(count, values.len()));
        }
        Ok(Self {
            dims,
            values,
            mask: None,
            strides: index::suffix_products(dims),
        })
    }

    /// Attach a validity mask (`true` = valid cell).
    pub fn with_mask(mut self, mask: Option<&'a [bool]>) -> Result<Self> {
        if let Some(mask) = mask {
            if mask.len() != self.values.len() {
                return Err(MosaicError::shape_mismatch(self.values.len(), mask.len()));
            }
        }
        self.mask = mask;
        Ok(self)
    }

    pub fn dims(&self) -> &[usize] {
        self.dims
    }

    pub fn ndims(&self) -> usize {
        self.dims.len()
    }

    pub fn values(&self) -> &[T] {
        self.values
    }

    pub fn mask(&self) -> Option<&[bool]> {
        self.mask
    }

    /// Whether the cell at `flat` is unmasked.
    pub fn is_valid(&self, flat: usize) -> bool {
        self.mask.map_or(true, |mask| mask[flat])
    }

    /// Stored value at a node, ignoring the mask.
    pub fn value_at(&self, index: &[usize]) -> Result<T> {
        let flat = index::flatten(self.dims, index)?;
        Ok(self.values[flat])
    }

    fn valid_value_at(&self, index: &[usize]) -> Result<T> {
        let flat = index::flatten(self.dims, index)?;
        if !self.is_valid(flat) {
            return Err(MosaicError::MaskedCell { flat });
        }
        Ok(self.values[flat])
    }
}

/// A location inside a grid: an integer cell plus a fractional offset per dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct CellPosition {
    cell: MultiIndex,
    frac: Vec<f64>,
}

impl CellPosition {
    /// Build from an explicit cell and fractional offsets in `[0, 1)`.
    pub fn new(cell: MultiIndex, frac: Vec<f64>) -> Result<Self> {
        if cell.len() != frac.len() {
            return Err(MosaicError::shape_mismatch(cell.len(), frac.len()));
        }
        if let Some(bad) = frac.iter().find(|f| !f.is_finite() || **f < 0.0 || **f >= 1.0) {
            return Err(MosaicError::invalid_position(format!(
                "fractional offset {} is not in [0, 1)",
                bad
            )));
        }
        Ok(Self { cell, frac })
    }

    /// A position exactly on a grid node.
    pub fn node(index: &[usize]) -> Self {
        Self {
            cell: index.to_vec(),
            frac: vec![0.0; index.len()],
        }
    }

    /// Split continuous index-space coordinates into cell and offset.
    ///
    /// A coordinate equal to the last node maps to that node with a zero
    /// offset, so the whole closed extent `[0, dims[i] - 1]` is addressable.
    pub fn from_coords(dims: &[usize], coords: &[f64]) -> Result<Self> {
        if coords.len() != dims.len() {
            return Err(MosaicError::shape_mismatch(dims.len(), coords.len()));
        }
        let mut cell = Vec::with_capacity(dims.len());
        let mut frac = Vec::with_capacity(dims.len());
        for (&c, &d) in coords.iter().zip(dims) {
            if !c.is_finite() {
                return Err(MosaicError::invalid_position(format!(
                    "coordinate {} is not finite",
                    c
                )));
            }
            let last = d.saturating_sub(1) as f64;
            if d == 0 || c < 0.0 || c > last {
                return Err(MosaicError::out_of_bounds(
                    format!("{:?}", coords),
                    format!("{:?}", dims),
                ));
            }
            let floor = c.floor();
            if floor >= last {
                cell.push(d - 1);
                frac.push(0.0);
            } else {
                cell.push(floor as usize);
                frac.push(c - floor);
            }
        }
        Ok(Self { cell, frac })
    }

    pub fn cell(&self) -> &[usize] {
        &self.cell
    }

    pub fn frac(&self) -> &[f64] {
        &self.frac
    }

    pub fn ndims(&self) -> usize {
        self.cell.len()
    }

    /// Whether the position sits exactly on a node.
    pub fn is_node(&self) -> bool {
        self.frac.iter().all(|&f| f == 0.0)
    }

    /// Continuous index-space coordinates.
    pub fn coords(&self) -> Vec<f64> {
        self.cell
            .iter()
            .zip(&self.frac)
            .map(|(&c, &f)| c as f64 + f)
            .collect()
    }
}

/// Check the stencil fits and return the dimensions with a nonzero offset.
fn active_axes<T: Float>(field: &FieldView<'_, T>, position: &CellPosition) -> Result<Vec<usize>> {
    if position.ndims() != field.ndims() {
        return Err(MosaicError::shape_mismatch(field.ndims(), position.ndims()));
    }
    let mut active = Vec::new();
    for axis in 0..field.ndims() {
        let cell = position.cell[axis];
        let needs_high = position.frac[axis] > 0.0;
        if cell >= field.dims[axis] || (needs_high && cell + 1 >= field.dims[axis]) {
            return Err(MosaicError::out_of_bounds(
                format!("{:?}", position.coords()),
                format!("{:?}", field.dims),
            ));
        }
        if needs_high {
            active.push(axis);
        }
    }
    Ok(active)
}

fn masked<T: Float>(flat: usize, policy: MaskPolicy) -> Result<T> {
    match policy {
        MaskPolicy::Nan => Ok(T::nan()),
        MaskPolicy::Propagate | MaskPolicy::Renormalize => Err(MosaicError::MaskedCell { flat }),
    }
}

fn to_float<T: Float>(value: f64) -> Result<T> {
    cast::<f64, T>(value)
        .ok_or_else(|| MosaicError::invalid_position(format!("{} is not representable", value)))
}

/// Multilinear interpolation over the 2^N corners of the enclosing cell.
///
/// Each corner is weighted by the product of `1 - frac[i]` (low side) or
/// `frac[i]` (high side). Dimensions with a zero offset contribute no corners,
/// so a position on a node returns the stored value unchanged.
pub fn multilinear<T: Float>(
    field: &FieldView<'_, T>,
    position: &CellPosition,
    policy: MaskPolicy,
) -> Result<T> {
    let active = active_axes(field, position)?;
    let base = index::flatten_with_strides(&field.strides, &position.cell);

    if active.is_empty() {
        if !field.is_valid(base) {
            return masked(base, policy);
        }
        return Ok(field.values[base]);
    }

    let mut weights = Vec::with_capacity(active.len());
    for &axis in &active {
        let high = to_float::<T>(position.frac[axis])?;
        weights.push((field.strides[axis], T::one() - high, high));
    }

    let mut sum = T::zero();
    let mut weight_sum = T::zero();
    let mut skipped = false;

    for corner in 0..(1usize << active.len()) {
        let mut flat = base;
        let mut weight = T::one();
        for (bit, &(stride, low_w, high_w)) in weights.iter().enumerate() {
            if (corner >> bit) & 1 == 1 {
                flat += stride;
                weight = weight * high_w;
            } else {
                weight = weight * low_w;
            }
        }

        if !field.is_valid(flat) {
            match policy {
                MaskPolicy::Propagate => return Err(MosaicError::MaskedCell { flat }),
                MaskPolicy::Nan => return Ok(T::nan()),
                MaskPolicy::Renormalize => {
                    skipped = true;
                    continue;
                }
            }
        }

        sum = sum + weight * field.values[flat];
        weight_sum = weight_sum + weight;
    }

    if !skipped {
        return Ok(sum);
    }
    if weight_sum <= T::zero() {
        return Err(MosaicError::MaskedCell { flat: base });
    }
    Ok(sum / weight_sum)
}

/// Nearest-node lookup. Offsets of exactly one half round up.
pub fn nearest<T: Float>(
    field: &FieldView<'_, T>,
    position: &CellPosition,
    policy: MaskPolicy,
) -> Result<T> {
    active_axes(field, position)?;
    let node: MultiIndex = position
        .cell
        .iter()
        .zip(&position.frac)
        .map(|(&c, &f)| if f >= 0.5 { c + 1 } else { c })
        .collect();
    let flat = index::flatten_with_strides(&field.strides, &node);
    if !field.is_valid(flat) {
        return masked(flat, policy);
    }
    Ok(field.values[flat])
}

/// Sample a field with the chosen method.
pub fn interpolate<T: Float>(
    field: &FieldView<'_, T>,
    position: &CellPosition,
    method: InterpolationMethod,
    policy: MaskPolicy,
) -> Result<T> {
    match method {
        InterpolationMethod::Nearest => nearest(field, position, policy),
        InterpolationMethod::Multilinear => multilinear(field, position, policy),
    }
}

/// Sample a batch of positions, in parallel once the batch reaches `parallel_threshold`.
///
/// Results are returned in input order.
pub fn interpolate_many<T: Float + Send + Sync>(
    field: &FieldView<'_, T>,
    positions: &[CellPosition],
    method: InterpolationMethod,
    policy: MaskPolicy,
    parallel_threshold: usize,
) -> Vec<Result<T>> {
    if positions.len() >= parallel_threshold.max(1) {
        positions
            .par_iter()
            .map(|p| interpolate(field, p, method, policy))
            .collect()
    } else {
        positions
            .iter()
            .map(|p| interpolate(field, p, method, policy))
            .collect()
    }
}

/// Per-dimension derivative at a node in index space.
///
/// Uses central differences over the axis-aligned stencil neighbors and falls
/// back to one-sided differences at the grid edge. Dimensions of extent one
/// have a zero derivative.
pub fn gradient<T: Float>(field: &FieldView<'_, T>, index: &[usize]) -> Result<Vec<T>> {
    index::flatten(field.dims, index)?;
    let ndims = field.ndims();
    let mut grad = Vec::with_capacity(ndims);

    for axis in 0..ndims {
        if field.dims[axis] == 1 {
            grad.push(T::zero());
            continue;
        }
        let mut offset = vec![0i8; ndims];
        offset[axis] = -1;
        let low = stencil::offset_index(field.dims, index, &offset).unwrap_or_else(|| index.to_vec());
        offset[axis] = 1;
        let high = stencil::offset_index(field.dims, index, &offset).unwrap_or_else(|| index.to_vec());

        let span = to_float::<T>((high[axis] - low[axis]) as f64)?;
        let delta = field.valid_value_at(&high)? - field.valid_value_at(&low)?;
        grad.push(delta / span);
    }

    Ok(grad)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(coords: &[f64], dims: &[usize]) -> CellPosition {
        CellPosition::from_coords(dims, coords).unwrap()
    }

    #[test]
    fn test_nearest_interpolate() {
        let data: Vec<f32> = vec![
            1.0, 2.0, 3.0,
            4.0, 5.0, 6.0,
            7.0, 8.0, 9.0,
        ];
        let dims = [3, 3];
        let field = FieldView::new(&dims, &data).unwrap();
        let policy = MaskPolicy::Propagate;

        assert_eq!(nearest(&field, &pos(&[0.0, 0.0], &dims), policy).unwrap(), 1.0);
        assert_eq!(nearest(&field, &pos(&[1.0, 1.0], &dims), policy).unwrap(), 5.0);
        assert_eq!(nearest(&field, &pos(&[0.4, 0.4], &dims), policy).unwrap(), 1.0);
        assert_eq!(nearest(&field, &pos(&[0.6, 0.6], &dims), policy).unwrap(), 5.0);
    }

    #[test]
    fn test_bilinear_interpolate() {
        let data: Vec<f32> = vec![
            1.0, 2.0,
            3.0, 4.0,
        ];
        let dims = [2, 2];
        let field = FieldView::new(&dims, &data).unwrap();
        let policy = MaskPolicy::Propagate;

        // Corners
        assert_eq!(multilinear(&field, &pos(&[0.0, 0.0], &dims), policy).unwrap(), 1.0);
        assert_eq!(multilinear(&field, &pos(&[0.0, 1.0], &dims), policy).unwrap(), 2.0);
        assert_eq!(multilinear(&field, &pos(&[1.0, 0.0], &dims), policy).unwrap(), 3.0);
        assert_eq!(multilinear(&field, &pos(&[1.0, 1.0], &dims), policy).unwrap(), 4.0);

        // Center
        let center = multilinear(&field, &pos(&[0.5, 0.5], &dims), policy).unwrap();
        assert!((center - 2.5).abs() < 0.001);
    }

    #[test]
    fn test_node_value_is_exact() {
        let data: Vec<f64> = vec![0.1, 0.2, 0.3, 0.7, 1e-17, 3.3];
        let dims = [2, 3];
        let field = FieldView::new(&dims, &data).unwrap();

        for flat in 0..data.len() {
            let node = index::unflatten(&dims, flat).unwrap();
            let value = multilinear(&field, &CellPosition::node(&node), MaskPolicy::Propagate).unwrap();
            assert_eq!(value.to_bits(), data[flat].to_bits());
        }
    }

    #[test]
    fn test_partial_node_only_uses_active_axes() {
        // Along the first axis only; the second axis sits on a node.
        let data: Vec<f64> = vec![
            0.0, 10.0,
            2.0, 20.0,
        ];
        let dims = [2, 2];
        let field = FieldView::new(&dims, &data).unwrap();
        let value = multilinear(&field, &pos(&[0.25, 1.0], &dims), MaskPolicy::Propagate).unwrap();
        assert!((value - 12.5).abs() < 1e-12);
    }

    #[test]
    fn test_out_of_bounds() {
        let data = vec![0.0f64; 6];
        let dims = [2, 3];
        let field = FieldView::new(&dims, &data).unwrap();

        let outside = CellPosition::new(vec![1, 0], vec![0.5, 0.0]).unwrap();
        assert!(matches!(
            multilinear(&field, &outside, MaskPolicy::Propagate),
            Err(MosaicError::OutOfBounds { .. })
        ));

        let beyond = CellPosition::node(&[2, 0]);
        assert!(matches!(
            multilinear(&field, &beyond, MaskPolicy::Propagate),
            Err(MosaicError::OutOfBounds { .. })
        ));

        assert!(CellPosition::from_coords(&dims, &[1.5, 0.0]).is_err());
        assert!(CellPosition::from_coords(&dims, &[-0.1, 0.0]).is_err());
    }

    #[test]
    fn test_invalid_fraction() {
        assert!(CellPosition::new(vec![0], vec![1.0]).is_err());
        assert!(CellPosition::new(vec![0], vec![-0.1]).is_err());
        assert!(CellPosition::new(vec![0], vec![f64::NAN]).is_err());
        assert!(CellPosition::new(vec![0, 0], vec![0.5]).is_err());
    }

    #[test]
    fn test_from_coords_last_node() {
        let p = CellPosition::from_coords(&[3, 4], &[2.0, 1.25]).unwrap();
        assert_eq!(p.cell(), &[2, 1]);
        assert_eq!(p.frac(), &[0.0, 0.25]);
        assert_eq!(p.coords(), vec![2.0, 1.25]);
    }

    #[test]
    fn test_masked_propagate() {
        let data: Vec<f64> = vec![1.0, 2.0, 3.0, 4.0];
        let mask = vec![true, false, true, true];
        let dims = [2, 2];
        let field = FieldView::new(&dims, &data).unwrap().with_mask(Some(&mask[..])).unwrap();

        let result = multilinear(&field, &pos(&[0.5, 0.5], &dims), MaskPolicy::Propagate);
        assert_eq!(result, Err(MosaicError::MaskedCell { flat: 1 }));

        // Positions that do not touch the masked corner still succeed.
        let value = multilinear(&field, &pos(&[0.5, 0.0], &dims), MaskPolicy::Propagate).unwrap();
        assert!((value - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_masked_renormalize() {
        let data: Vec<f64> = vec![1.0, 100.0, 3.0, 5.0];
        let mask = vec![true, false, true, true];
        let dims = [2, 2];
        let field = FieldView::new(&dims, &data).unwrap().with_mask(Some(&mask[..])).unwrap();

        let value = multilinear(&field, &pos(&[0.5, 0.5], &dims), MaskPolicy::Renormalize).unwrap();
        assert!((value - 3.0).abs() < 1e-12);

        let on_masked = multilinear(&field, &CellPosition::node(&[0, 1]), MaskPolicy::Renormalize);
        assert_eq!(on_masked, Err(MosaicError::MaskedCell { flat: 1 }));
    }

    #[test]
    fn test_masked_nan() {
        let data: Vec<f32> = vec![1.0, 2.0, 3.0, 4.0];
        let mask = vec![false, true, true, true];
        let dims = [2, 2];
        let field = FieldView::new(&dims, &data).unwrap().with_mask(Some(&mask[..])).unwrap();

        let value = multilinear(&field, &pos(&[0.5, 0.5], &dims), MaskPolicy::Nan).unwrap();
        assert!(value.is_nan());
        assert!(nearest(&field, &pos(&[0.2, 0.2], &dims), MaskPolicy::Nan).unwrap().is_nan());
    }

    #[test]
    fn test_nan_data_propagates() {
        let data: Vec<f32> = vec![1.0, f32::NAN, 3.0, 4.0];
        let dims = [2, 2];
        let field = FieldView::new(&dims, &data).unwrap();

        let result = multilinear(&field, &pos(&[0.5, 0.5], &dims), MaskPolicy::Propagate).unwrap();
        assert!(result.is_nan());
    }

    #[test]
    fn test_field_view_validation() {
        let data = vec![0.0f64; 5];
        assert!(FieldView::new(&[2, 3], &data).is_err());

        let data = vec![0.0f64; 6];
        let mask = vec![true; 4];
        let field = FieldView::new(&[2, 3], &data).unwrap();
        assert!(field.with_mask(Some(&mask[..])).is_err());
    }

    #[test]
    fn test_interpolate_many_matches_serial() {
        let dims = [4, 5];
        let data: Vec<f64> = (0..20).map(|v| v as f64 * 0.5).collect();
        let field = FieldView::new(&dims, &data).unwrap();
        let positions: Vec<_> = (0..30)
            .map(|k| pos(&[(k % 4) as f64 * 0.7, (k % 5) as f64 * 0.9], &dims))
            .collect();

        let serial = interpolate_many(&field, &positions, InterpolationMethod::Multilinear, MaskPolicy::Propagate, usize::MAX);
        let parallel = interpolate_many(&field, &positions, InterpolationMethod::Multilinear, MaskPolicy::Propagate, 1);
        assert_eq!(serial, parallel);
        assert_eq!(serial.len(), 30);
    }

    #[test]
    fn test_gradient_of_linear_field() {
        // value = 3*i + 2*j
        let dims = [3, 4];
        let data: Vec<f64> = (0..12)
            .map(|flat| {
                let idx = index::unflatten(&dims, flat).unwrap();
                3.0 * idx[0] as f64 + 2.0 * idx[1] as f64
            })
            .collect();
        let field = FieldView::new(&dims, &data).unwrap();

        for node in [[0, 0], [1, 2], [2, 3]] {
            let grad = gradient(&field, &node).unwrap();
            assert!((grad[0] - 3.0).abs() < 1e-12);
            assert!((grad[1] - 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_gradient_flat_axis_and_mask() {
        let dims = [1, 3];
        let data: Vec<f64> = vec![1.0, 2.0, 4.0];
        let mask = vec![true, true, false];
        let field = FieldView::new(&dims, &data).unwrap();
        assert_eq!(gradient(&field, &[0, 1]).unwrap(), vec![0.0, 1.5]);

        let masked_field = field.with_mask(Some(&mask[..])).unwrap();
        assert_eq!(
            gradient(&masked_field, &[0, 1]),
            Err(MosaicError::MaskedCell { flat: 2 })
        );
    }
}

//! Corner and neighbor offset enumeration around a cell.
//!
//! The full stencil has 3^N offsets. Offset `k` is read as an N-digit base-3
//! number whose digit `i` (place value 3^i) maps {0, 1, 2} to {-1, 0, 1} in
//! dimension `i`. Dimension 0 therefore varies fastest, unlike the row-major
//! layout used by [`crate::index`].
//!
//! Multilinear interpolation only needs the 2^N corners of the enclosing
//! hypercube; [`hypercube_corner`] enumerates those with bit `i` selecting the
//! low or high side of dimension `i`.

use crate::error::{MosaicError, Result};
use crate::index;
use crate::types::{CornerVector, MultiIndex, MAX_NDIMS};

fn check_ndims(ndims: usize) -> Result<()> {
    if ndims > MAX_NDIMS {
        return Err(MosaicError::invalid_dimensions(format!(
            "{} dimensions exceeds the maximum of {}",
            ndims, MAX_NDIMS
        )));
    }
    Ok(())
}

/// Number of offsets in the full neighbor stencil, 3^ndims.
pub fn stencil_size(ndims: usize) -> Result<usize> {
    check_ndims(ndims)?;
    Ok(3usize.pow(ndims as u32))
}

/// Stencil index of the all-zero offset.
pub fn center_index(ndims: usize) -> Result<usize> {
    Ok((stencil_size(ndims)? - 1) / 2)
}

/// The offset vector for stencil position `index`.
pub fn corner_vector(ndims: usize, index: usize) -> Result<CornerVector> {
    let size = stencil_size(ndims)?;
    if index >= size {
        return Err(MosaicError::out_of_range(index.to_string(), size.to_string()));
    }
    Ok(decode_base3(ndims, index))
}

fn decode_base3(ndims: usize, mut index: usize) -> CornerVector {
    let mut corner = Vec::with_capacity(ndims);
    for _ in 0..ndims {
        corner.push((index % 3) as i8 - 1);
        index /= 3;
    }
    corner
}

/// Iterator over every offset of the 3^N stencil, in stencil order.
#[derive(Debug, Clone)]
pub struct CornerVectors {
    ndims: usize,
    next: usize,
    size: usize,
}

impl Iterator for CornerVectors {
    type Item = CornerVector;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.size {
            return None;
        }
        let corner = decode_base3(self.ndims, self.next);
        self.next += 1;
        Some(corner)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.size - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for CornerVectors {}

/// Enumerate the full stencil for `ndims` dimensions.
pub fn corner_vectors(ndims: usize) -> Result<CornerVectors> {
    Ok(CornerVectors {
        ndims,
        next: 0,
        size: stencil_size(ndims)?,
    })
}

/// Low/high selector for corner `index` of the unit hypercube (each entry 0 or 1).
pub fn hypercube_corner(ndims: usize, index: usize) -> Result<Vec<usize>> {
    check_ndims(ndims)?;
    let count = 1usize << ndims;
    if index >= count {
        return Err(MosaicError::out_of_range(index.to_string(), count.to_string()));
    }
    Ok((0..ndims).map(|axis| (index >> axis) & 1).collect())
}

/// Apply an offset to a cell index, returning `None` when it leaves the grid.
pub fn offset_index(dims: &[usize], index: &[usize], offset: &[i8]) -> Option<MultiIndex> {
    index
        .iter()
        .zip(offset)
        .zip(dims)
        .map(|((&i, &o), &d)| {
            let moved = i as isize + isize::from(o);
            (moved >= 0 && (moved as usize) < d).then_some(moved as usize)
        })
        .collect()
}

/// Flat indices of every in-bounds neighbor of `index`, in stencil order.
///
/// The centre cell itself is excluded.
pub fn neighbors(dims: &[usize], index: &[usize]) -> Result<Vec<usize>> {
    index::flatten(dims, index)?;
    let center = center_index(dims.len())?;
    let mut out = Vec::new();
    for (k, offset) in corner_vectors(dims.len())?.enumerate() {
        if k == center {
            continue;
        }
        if let Some(moved) = offset_index(dims, index, &offset) {
            out.push(index::flatten(dims, &moved)?);
        }
    }
    Ok(out)
}

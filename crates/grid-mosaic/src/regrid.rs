//! Regridding weights between structured grids.
//!
//! Every target point is located on the source grid in index space with
//! [`find_indices`](transform::find_indices). The enclosing source cell
//! gives 2^N multilinear weights and the flat index of its lower corner; the
//! flat offsets of the 2^N nodes from that corner are the same for every
//! target.
//!
//! ```text
//! target ──► shift by period ──► find_indices ──► converged? ──► weights
//!                                    │ no
//!                                    ├─► shift across the period, retry once
//!                                    └─► restart from each 3^N stencil corner
//! ```
//!
//! Node `j` of a cell has displacement `(j >> (N - 1 - i)) & 1` along
//! dimension `i`, so node offsets ascend in row-major order.
//!
//! Physical coordinate `i` is taken to run along index dimension `i` when
//! deciding which way to move a target across a period.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{MosaicError, Result};
use crate::index;
use crate::interpolation::FieldView;
use crate::model::{Data, DataValues, IndexRange, MosaicContext};
use crate::registry::Handle;
use crate::stencil;
use crate::transform::{self, IndexSearch, SearchParams};

/// A target is shifted by at most this many periods per axis.
pub const MAX_PERIOD_SHIFTS: usize = 10;

/// First guess is off-centre so symmetric grids do not start on a fold.
const INITIAL_GUESS_DIVISOR: f64 = 2.13456;

/// Knobs for [`RegridWeights::compute`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegridParams {
    pub search: SearchParams,

    /// Period of each physical coordinate, `None` for a non-periodic axis.
    /// Empty means no axis is periodic.
    pub periodicity: Vec<Option<f64>>,

    /// Source index boxes that targets must not land in.
    pub excluded: Vec<IndexRange>,
}

/// How much of a cell's weight survives the source mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightStatus {
    /// No weighted node is masked.
    Complete,
    /// Some weighted nodes are masked; the rest were rescaled to sum to one.
    Partial { masked: usize },
    /// Every weighted node is masked.
    Unusable,
}

impl WeightStatus {
    /// `0` when complete, the masked node count when partial, `-1` when unusable.
    pub fn status(&self) -> i32 {
        match self {
            Self::Complete => 0,
            Self::Partial { masked } => *masked as i32,
            Self::Unusable => -1,
        }
    }

    pub fn is_usable(&self) -> bool {
        !matches!(self, Self::Unusable)
    }
}

/// Multilinear weights of one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellWeights {
    /// Flat index of the cell's lowest node.
    pub lower_corner: usize,
    /// One weight per node, in node order.
    pub weights: Vec<f64>,
    pub status: WeightStatus,
}

/// Flat-index offset of each of the 2^N cell nodes from the lower corner.
pub fn node_offsets(dims: &[usize]) -> Vec<usize> {
    let n = dims.len();
    let strides = index::suffix_products(dims);
    (0..1usize << n)
        .map(|node| {
            (0..n)
                .map(|axis| ((node >> (n - 1 - axis)) & 1) * strides[axis])
                .sum()
        })
        .collect()
}

/// Weights of the 2^N source nodes around continuous index position `indices`.
///
/// Positions on the upper edge of an axis fall in the last cell with an
/// offset of one. Masked nodes get zero weight; see [`WeightStatus`].
pub fn linear_weights(
    dims: &[usize],
    indices: &[f64],
    mask: Option<&[bool]>,
) -> Result<CellWeights> {
    cell_weights(dims, &node_offsets(dims), indices, mask)
}

fn check_source_dims(dims: &[usize]) -> Result<()> {
    index::validate_dims(dims)?;
    if let Some(axis) = dims.iter().position(|&d| d < 2) {
        return Err(MosaicError::invalid_dimensions(format!(
            "dimension {} of {:?} has no cells to interpolate in",
            axis, dims
        )));
    }
    Ok(())
}

fn cell_weights(
    dims: &[usize],
    offsets: &[usize],
    indices: &[f64],
    mask: Option<&[bool]>,
) -> Result<CellWeights> {
    check_source_dims(dims)?;
    let n = dims.len();
    if indices.len() != n {
        return Err(MosaicError::shape_mismatch(n, indices.len()));
    }
    if let Some(mask) = mask {
        if mask.len() != index::cell_count(dims) {
            return Err(MosaicError::shape_mismatch(index::cell_count(dims), mask.len()));
        }
    }

    let strides = index::suffix_products(dims);
    let mut lower_corner = 0;
    let mut frac = Vec::with_capacity(n);
    for axis in 0..n {
        let x = indices[axis];
        let last = (dims[axis] - 1) as f64;
        if !x.is_finite() || x < 0.0 || x > last {
            return Err(MosaicError::out_of_bounds(
                format!("{:?}", indices),
                format!("{:?}", dims),
            ));
        }
        let cell = (x.floor() as usize).min(dims[axis] - 2);
        frac.push(x - cell as f64);
        lower_corner += cell * strides[axis];
    }

    let mut weights: Vec<f64> = (0..1usize << n)
        .map(|node| {
            (0..n)
                .map(|axis| {
                    if (node >> (n - 1 - axis)) & 1 == 1 {
                        frac[axis]
                    } else {
                        1.0 - frac[axis]
                    }
                })
                .product()
        })
        .collect();

    let mut masked = 0;
    if let Some(mask) = mask {
        for (weight, offset) in weights.iter_mut().zip(offsets) {
            if *weight > 0.0 && !mask[lower_corner + offset] {
                *weight = 0.0;
                masked += 1;
            }
        }
    }

    let status = if masked == 0 {
        WeightStatus::Complete
    } else {
        let total: f64 = weights.iter().sum();
        if total > 0.0 {
            weights.iter_mut().for_each(|w| *w /= total);
            WeightStatus::Partial { masked }
        } else {
            WeightStatus::Unusable
        }
    };

    Ok(CellWeights {
        lower_corner,
        weights,
        status,
    })
}

/// Per-coordinate `[min, max]` over every source node.
fn coordinate_bounds(coords: &[FieldView<'_, f64>]) -> Vec<(f64, f64)> {
    coords
        .iter()
        .map(|field| {
            field
                .values()
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                })
        })
        .collect()
}

fn period_of(periodicity: &[Option<f64>], axis: usize) -> Option<f64> {
    periodicity
        .get(axis)
        .copied()
        .flatten()
        .filter(|p| p.is_finite() && *p > 0.0)
}

/// Move each periodic coordinate into the source bounds; `false` when that
/// takes more than [`MAX_PERIOD_SHIFTS`] periods.
fn shift_into_bounds(
    point: &mut [f64],
    bounds: &[(f64, f64)],
    periodicity: &[Option<f64>],
    tolerance: f64,
) -> bool {
    for (axis, value) in point.iter_mut().enumerate() {
        let Some(period) = period_of(periodicity, axis) else {
            continue;
        };
        let (lo, hi) = bounds[axis];
        let mut shifts = 0;
        while *value < lo - tolerance || *value > hi + tolerance {
            if shifts == MAX_PERIOD_SHIFTS {
                return false;
            }
            if *value < lo - tolerance {
                *value += period;
            } else {
                *value -= period;
            }
            shifts += 1;
        }
    }
    true
}

/// Move periodic coordinates one period against the edge the search hit.
/// `false` when no coordinate could move.
fn shift_across_period(
    point: &mut [f64],
    hit_bounds: &[i8],
    bounds: &[(f64, f64)],
    periodicity: &[Option<f64>],
    tolerance: f64,
) -> bool {
    let mut moved = false;
    for (axis, value) in point.iter_mut().enumerate() {
        let Some(period) = period_of(periodicity, axis) else {
            continue;
        };
        let (lo, hi) = bounds[axis];
        let hit = hit_bounds.get(axis).copied().unwrap_or(0);
        if hit > 0 && *value - period >= lo - tolerance {
            *value -= period;
            moved = true;
        } else if hit < 0 && *value + period <= hi + tolerance {
            *value += period;
            moved = true;
        }
    }
    moved
}

/// One search; a singular Jacobian counts as a miss.
fn attempt(
    coords: &[FieldView<'_, f64>],
    point: &[f64],
    params: &SearchParams,
    guess: &[f64],
) -> Result<Option<IndexSearch>> {
    match transform::find_indices(coords, point, params, Some(guess)) {
        Ok(search) => Ok(Some(search)),
        Err(MosaicError::SingularTransform { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Interpolation weights from a source grid onto a list of target points.
#[derive(Debug, Clone, PartialEq)]
pub struct RegridWeights {
    source_dims: Vec<usize>,
    node_offsets: Vec<usize>,
    lower_corners: Vec<usize>,
    weights: Vec<f64>,
    statuses: Vec<WeightStatus>,
    inside: Vec<bool>,
    indices: Vec<Vec<f64>>,
}

impl RegridWeights {
    /// Locate every target on the source grid and compute its weights.
    ///
    /// `source_coords[i]` holds physical coordinate `i` of every source node
    /// and each target has one coordinate per dimension. Targets that cannot
    /// be located, or that land in an excluded box, are flagged outside; their
    /// weights still describe the last iterate.
    pub fn compute(
        source_coords: &[FieldView<'_, f64>],
        source_mask: Option<&[bool]>,
        targets: &[Vec<f64>],
        params: &RegridParams,
    ) -> Result<Self> {
        let first = source_coords
            .first()
            .ok_or_else(|| MosaicError::invalid_dimensions("no coordinate fields given"))?;
        let dims = first.dims().to_vec();
        let n = dims.len();
        if source_coords.len() != n {
            return Err(MosaicError::shape_mismatch(n, source_coords.len()));
        }
        check_source_dims(&dims)?;
        if !params.periodicity.is_empty() && params.periodicity.len() != n {
            return Err(MosaicError::shape_mismatch(n, params.periodicity.len()));
        }
        if let Some(range) = params.excluded.iter().find(|r| !r.fits(&dims)) {
            return Err(MosaicError::invalid_dimensions(format!(
                "excluded box {:?}..={:?} does not fit {:?}",
                range.lo(),
                range.hi(),
                dims
            )));
        }

        let offsets = node_offsets(&dims);
        let bounds = coordinate_bounds(source_coords);
        let tolerance = params.search.tolerance.max(1e-15);
        let mut guess: Vec<f64> = dims
            .iter()
            .map(|&d| (d as f64 / INITIAL_GUESS_DIVISOR).min((d - 1) as f64))
            .collect();

        let mut result = Self {
            source_dims: dims.clone(),
            node_offsets: offsets.clone(),
            lower_corners: Vec::with_capacity(targets.len()),
            weights: Vec::with_capacity(targets.len() * offsets.len()),
            statuses: Vec::with_capacity(targets.len()),
            inside: Vec::with_capacity(targets.len()),
            indices: Vec::with_capacity(targets.len()),
        };

        for target in targets {
            if target.len() != n {
                return Err(MosaicError::shape_mismatch(n, target.len()));
            }
            let mut point = target.clone();
            let search = if shift_into_bounds(&mut point, &bounds, &params.periodicity, tolerance) {
                Self::locate(source_coords, &mut point, &bounds, params, &guess, tolerance)?
            } else {
                None
            };

            let (indices, converged) = match search {
                Some(search) => (search.indices, search.converged),
                None => (guess.clone(), false),
            };
            let excluded = converged && params.excluded.iter().any(|r| in_box(r, &indices));
            let inside = converged && !excluded;
            if converged {
                guess = indices.clone();
            }
            trace!(?target, ?indices, inside, "Located target");

            let cell = cell_weights(&dims, &offsets, &indices, source_mask)?;
            result.lower_corners.push(cell.lower_corner);
            result.weights.extend(cell.weights);
            result.statuses.push(cell.status);
            result.inside.push(inside);
            result.indices.push(indices);
        }

        debug!(
            targets = targets.len(),
            valid = result.nvalid(),
            "Computed regrid weights"
        );
        Ok(result)
    }

    /// Search from `guess`, then across a period, then from the stencil corners.
    fn locate(
        coords: &[FieldView<'_, f64>],
        point: &mut [f64],
        bounds: &[(f64, f64)],
        params: &RegridParams,
        guess: &[f64],
        tolerance: f64,
    ) -> Result<Option<IndexSearch>> {
        let mut last = attempt(coords, point, &params.search, guess)?;
        if let Some(search) = &last {
            if search.converged {
                return Ok(last);
            }
            let mut shifted = point.to_vec();
            if shift_across_period(
                &mut shifted,
                &search.hit_bounds,
                bounds,
                &params.periodicity,
                tolerance,
            ) {
                if let Some(retry) = attempt(coords, &shifted, &params.search, guess)? {
                    if retry.converged {
                        point.copy_from_slice(&shifted);
                        return Ok(Some(retry));
                    }
                }
            }
        }

        let dims = coords[0].dims();
        for corner in stencil::corner_vectors(dims.len())? {
            let start: Vec<f64> = corner
                .iter()
                .zip(dims)
                .map(|(&c, &d)| f64::from(c + 1) * (d - 1) as f64 / 2.0)
                .collect();
            if let Some(search) = attempt(coords, point, &params.search, &start)? {
                if search.converged {
                    return Ok(Some(search));
                }
                last = Some(search);
            }
        }
        Ok(last)
    }

    pub fn source_dims(&self) -> &[usize] {
        &self.source_dims
    }

    /// Number of target points.
    pub fn len(&self) -> usize {
        self.inside.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inside.is_empty()
    }

    /// Number of targets located inside the source grid.
    pub fn nvalid(&self) -> usize {
        self.inside.iter().filter(|&&inside| inside).count()
    }

    /// Flat offsets of the 2^N cell nodes from the lower corner.
    pub fn node_offsets(&self) -> &[usize] {
        &self.node_offsets
    }

    pub fn lower_corner(&self, target: usize) -> Option<usize> {
        self.lower_corners.get(target).copied()
    }

    /// The 2^N weights of `target`, in node order.
    pub fn weights(&self, target: usize) -> Option<&[f64]> {
        let nodes = self.node_offsets.len();
        self.weights.get(target * nodes..(target + 1) * nodes)
    }

    pub fn status(&self, target: usize) -> Option<WeightStatus> {
        self.statuses.get(target).copied()
    }

    pub fn is_inside(&self, target: usize) -> bool {
        self.inside.get(target).copied().unwrap_or(false)
    }

    /// Index-space position found for `target`.
    pub fn indices(&self, target: usize) -> Option<&[f64]> {
        self.indices.get(target).map(Vec::as_slice)
    }

    /// Whether `target` can be interpolated: inside and not fully masked.
    pub fn is_usable(&self, target: usize) -> bool {
        self.is_inside(target) && self.status(target).is_some_and(|s| s.is_usable())
    }

    /// Interpolate source node values onto every target; unusable targets get `fill_value`.
    pub fn apply(&self, values: &[f64], fill_value: f64) -> Result<Vec<f64>> {
        let count = index::cell_count(&self.source_dims);
        if values.len() != count {
            return Err(MosaicError::shape_mismatch(count, values.len()));
        }
        let nodes = self.node_offsets.len();
        Ok((0..self.len())
            .map(|target| {
                if !self.is_usable(target) {
                    return fill_value;
                }
                let lower = self.lower_corners[target];
                self.weights[target * nodes..(target + 1) * nodes]
                    .iter()
                    .zip(&self.node_offsets)
                    .filter(|(w, _)| **w != 0.0)
                    .map(|(&w, &offset)| w * values[lower + offset])
                    .sum()
            })
            .collect())
    }
}

fn in_box(range: &IndexRange, indices: &[f64]) -> bool {
    indices
        .iter()
        .zip(range.lo().iter().zip(range.hi()))
        .all(|(&x, (&lo, &hi))| {
            let cell = x.floor();
            cell >= lo as f64 && cell <= hi as f64
        })
}

impl MosaicContext {
    /// Interpolate `source` onto the nodes of `target`'s grid.
    ///
    /// `source_coords` and `target_coords` hold the physical coordinates of
    /// each grid's nodes, one data record per dimension. Both grids must
    /// belong to the same mosaic. Target cells that are masked, outside the
    /// source grid, or whose source nodes are all masked keep their previous
    /// value (NaN if the target had none). The search uses the configured
    /// `singular_tolerance`.
    pub fn regrid(
        &mut self,
        source_coords: &[Handle<Data>],
        source: Handle<Data>,
        target_coords: &[Handle<Data>],
        target: Handle<Data>,
        params: &RegridParams,
    ) -> Result<RegridWeights> {
        let (source_grid, source_fields) = self.coordinate_values(source_coords)?;
        let (target_grid, target_fields) = self.coordinate_values(target_coords)?;
        if self.grid_of(source)? != source_grid || self.grid_of(target)? != target_grid {
            return Err(MosaicError::invalid_dimensions(
                "data and coordinates must live on the same grid",
            ));
        }
        let mosaic = self.mosaic_of(source_grid)?;
        if self.mosaic_of(target_grid)? != mosaic {
            return Err(MosaicError::invalid_dimensions(format!(
                "grids {} and {} belong to different mosaics",
                source_grid, target_grid
            )));
        }

        let source_dims = self.dims(source_grid)?.to_vec();
        let views = source_fields
            .iter()
            .map(|field| FieldView::new(&source_dims, field))
            .collect::<Result<Vec<_>>>()?;
        let ntargets = self.grid(target_grid)?.cell_count();
        let points: Vec<Vec<f64>> = (0..ntargets)
            .map(|k| target_fields.iter().map(|field| field[k]).collect())
            .collect();

        let mut params = params.clone();
        params.search.singular_tolerance = self.config().singular_tolerance;
        let weights = RegridWeights::compute(&views, self.mask_of(source_grid)?, &points, &params)?;

        let source_values = to_f64_values(self.values(source)?, source)?;
        let interpolated = weights.apply(&source_values, f64::NAN)?;

        let target_type = self.data_type(target_grid)?;
        let target_mask = self.mask_of(target_grid)?.map(<[bool]>::to_vec);
        let mut values = match self.values(target)? {
            Some(existing) => to_f64_values(Some(existing), target)?,
            None => vec![f64::NAN; ntargets],
        };
        let mut written = 0;
        for (k, value) in interpolated.into_iter().enumerate() {
            let masked = matches!(&target_mask, Some(mask) if !mask[k]);
            if masked || !weights.is_usable(k) {
                continue;
            }
            values[k] = value;
            written += 1;
        }
        self.set_values(target, DataValues::from_f64(target_type, values))?;

        debug!(
            mosaic = %mosaic,
            source = %source,
            target = %target,
            located = weights.nvalid(),
            written,
            "Regridded data"
        );
        Ok(weights)
    }
}

fn to_f64_values(values: Option<&DataValues>, data: Handle<Data>) -> Result<Vec<f64>> {
    let values = values.ok_or(MosaicError::MissingValues {
        handle: data.to_raw().0,
    })?;
    Ok((0..values.len()).filter_map(|flat| values.get_f64(flat)).collect())
}

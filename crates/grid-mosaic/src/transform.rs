//! Local Jacobians of index-to-physical coordinate transforms.
//!
//! A curvilinear grid carries one physical coordinate field per dimension
//! (for example x and y of every node). The Jacobian at a node is
//! `J[r][c] = ∂x_r / ∂i_c`; a vanishing determinant means the mapping cannot be
//! inverted there, so inverse-mapping interpolation must not be attempted.
//!
//! [`position_at`] is the forward map (index space to physical space, by
//! multilinear interpolation of the coordinate fields). [`find_indices`]
//! inverts it with Newton steps built from [`local_jacobian`] at the nearest
//! node.

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::determinant::{self, SquareMatrix};
use crate::error::{MosaicError, Result};
use crate::interpolation::{self, CellPosition, FieldView};
use crate::types::MaskPolicy;

/// Smallest accepted position tolerance.
const MIN_TOLERANCE: f64 = 1e-15;

/// Outcome of a Jacobian check at one node.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformCheck {
    pub jacobian: SquareMatrix<f64>,
    pub determinant: f64,
    /// `|determinant| <= tolerance`.
    pub singular: bool,
}

/// Stopping rules for [`find_indices`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Newton iteration cap. Zero is treated as one.
    pub max_iterations: usize,

    /// Accepted physical distance to the target. Raised to `1e-15` if smaller.
    pub tolerance: f64,

    /// Jacobians whose determinant is at or below this abort the search.
    pub singular_tolerance: f64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-10,
            singular_tolerance: 1e-12,
        }
    }
}

/// Result of an inverse-mapping search.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSearch {
    /// Continuous index-space coordinates of the last iterate.
    pub indices: Vec<f64>,
    /// Per dimension, `-1` or `1` when the last step was clamped at the low or
    /// high grid edge. All zero once converged.
    pub hit_bounds: Vec<i8>,
    pub iterations: usize,
    /// Physical distance between the last iterate and the target.
    pub residual: f64,
    pub converged: bool,
}

impl IndexSearch {
    /// The last iterate as a cell and fractional offset.
    pub fn position(&self, dims: &[usize]) -> Result<CellPosition> {
        CellPosition::from_coords(dims, &self.indices)
    }

    /// Whether the search was pushed against any grid edge.
    pub fn hit_any_bound(&self) -> bool {
        self.hit_bounds.iter().any(|&b| b != 0)
    }
}

/// Check one field per dimension, all with the same extents; returns those extents.
fn coordinate_dims<'a>(coords: &'a [FieldView<'_, f64>]) -> Result<&'a [usize]> {
    let n = coords.len();
    let first = coords
        .first()
        .ok_or_else(|| MosaicError::invalid_dimensions("no coordinate fields given"))?;
    for field in coords {
        if field.ndims() != n {
            return Err(MosaicError::shape_mismatch(n, field.ndims()));
        }
        if field.dims() != first.dims() {
            return Err(MosaicError::invalid_dimensions(format!(
                "coordinate fields disagree on extents: {:?} vs {:?}",
                first.dims(),
                field.dims()
            )));
        }
    }
    Ok(first.dims())
}

/// Finite-difference Jacobian of the coordinate fields at `node`.
///
/// `coords[r]` holds physical coordinate `r` for every node; all fields must
/// share the same extents and have one dimension per field.
pub fn local_jacobian(coords: &[FieldView<'_, f64>], node: &[usize]) -> Result<SquareMatrix<f64>> {
    coordinate_dims(coords)?;
    let mut jacobian = SquareMatrix::zeros(coords.len());
    for (row, field) in coords.iter().enumerate() {
        for (col, partial) in interpolation::gradient(field, node)?.into_iter().enumerate() {
            jacobian.set(row, col, partial);
        }
    }
    Ok(jacobian)
}

/// Evaluate the Jacobian at `node` and flag it when its determinant is within `tolerance`.
pub fn check_transform(
    coords: &[FieldView<'_, f64>],
    node: &[usize],
    tolerance: f64,
) -> Result<TransformCheck> {
    let jacobian = local_jacobian(coords, node)?;
    let result = determinant::evaluate(jacobian.as_slice(), jacobian.order(), tolerance)?;
    if result.singular {
        warn!(?node, determinant = result.value, "Singular coordinate transform");
    }
    Ok(TransformCheck {
        jacobian,
        determinant: result.value,
        singular: result.singular,
    })
}

/// Physical coordinates at `position`.
pub fn position_at(coords: &[FieldView<'_, f64>], position: &CellPosition) -> Result<Vec<f64>> {
    coordinate_dims(coords)?;
    coords
        .iter()
        .map(|field| interpolation::multilinear(field, position, MaskPolicy::Propagate))
        .collect()
}

fn position_at_indices(coords: &[FieldView<'_, f64>], dims: &[usize], x: &[f64]) -> Result<Vec<f64>> {
    position_at(coords, &CellPosition::from_coords(dims, x)?)
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(p, q)| (p - q) * (p - q))
        .sum::<f64>()
        .sqrt()
}

/// Find the index-space position whose physical coordinates are `target`.
///
/// Starts from `initial_guess` (the middle of the grid when `None`) and
/// iterates are kept inside the grid. A target outside the grid ends
/// unconverged with `hit_bounds` naming the edges it pushed against. A
/// singular Jacobian along the way is an error.
pub fn find_indices(
    coords: &[FieldView<'_, f64>],
    target: &[f64],
    params: &SearchParams,
    initial_guess: Option<&[f64]>,
) -> Result<IndexSearch> {
    let dims = coordinate_dims(coords)?;
    let n = dims.len();
    if target.len() != n {
        return Err(MosaicError::shape_mismatch(n, target.len()));
    }
    if let Some(bad) = target.iter().find(|t| !t.is_finite()) {
        return Err(MosaicError::invalid_position(format!(
            "target coordinate {} is not finite",
            bad
        )));
    }

    let upper: Vec<f64> = dims.iter().map(|&d| (d - 1) as f64).collect();
    let mut x: Vec<f64> = match initial_guess {
        Some(guess) => {
            if guess.len() != n {
                return Err(MosaicError::shape_mismatch(n, guess.len()));
            }
            if let Some(bad) = guess.iter().find(|g| !g.is_finite()) {
                return Err(MosaicError::invalid_position(format!(
                    "initial guess {} is not finite",
                    bad
                )));
            }
            guess.iter().zip(&upper).map(|(&g, &u)| g.clamp(0.0, u)).collect()
        }
        None => upper.iter().map(|u| u / 2.0).collect(),
    };

    let max_iterations = params.max_iterations.max(1);
    let tolerance = params.tolerance.max(MIN_TOLERANCE);
    let mut hit_bounds = vec![0i8; n];
    let mut iterations = 0;
    let mut residual;

    loop {
        let here = position_at_indices(coords, dims, &x)?;
        residual = distance(&here, target);
        if residual <= tolerance || iterations >= max_iterations {
            break;
        }
        iterations += 1;

        let node: Vec<usize> = x.iter().map(|v| v.round() as usize).collect();
        let jacobian = local_jacobian(coords, &node)?;
        let det = determinant::evaluate(jacobian.as_slice(), n, params.singular_tolerance)?;
        let rhs: Vec<f64> = target.iter().zip(&here).map(|(t, h)| t - h).collect();
        let step = if det.singular {
            None
        } else {
            determinant::solve(jacobian.as_slice(), n, &rhs)?
        };
        let step = match step {
            Some(step) if step.iter().all(|s| s.is_finite()) => step,
            _ => {
                warn!(?node, determinant = det.value, "Singular Jacobian during index search");
                return Err(MosaicError::SingularTransform {
                    at: format!("{:?}", x),
                    determinant: det.value,
                });
            }
        };

        let mut moved = false;
        for axis in 0..n {
            let next = x[axis] + step[axis];
            hit_bounds[axis] = if next < 0.0 {
                -1
            } else if next > upper[axis] {
                1
            } else {
                0
            };
            let clamped = next.clamp(0.0, upper[axis]);
            moved |= clamped != x[axis];
            x[axis] = clamped;
        }
        if !moved {
            break;
        }
    }

    let converged = residual <= tolerance;
    if converged {
        hit_bounds.fill(0);
    }
    trace!(?target, iterations, residual, converged, "Index search finished");
    Ok(IndexSearch {
        indices: x,
        hit_bounds,
        iterations,
        residual,
        converged,
    })
}

//! Determinants of small dense matrices.
//!
//! Uses Gaussian elimination with partial pivoting (an LU factorization
//! without storing L): `det = (±1) · ∏ pivots`, with the sign flipped once per
//! row swap. A zero pivot column means the matrix is singular and the
//! determinant is exactly zero. [`solve`] runs the same elimination on an
//! augmented right-hand side.

use num_traits::Float;

use crate::error::{MosaicError, Result};

/// Dense row-major square matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct SquareMatrix<T> {
    order: usize,
    data: Vec<T>,
}

impl<T: Float> SquareMatrix<T> {
    /// All-zero matrix of the given order.
    pub fn zeros(order: usize) -> Self {
        Self {
            order,
            data: vec![T::zero(); order * order],
        }
    }

    pub fn identity(order: usize) -> Self {
        let mut m = Self::zeros(order);
        for i in 0..order {
            m.data[i * order + i] = T::one();
        }
        m
    }

    /// Wrap row-major storage; `data.len()` must be `order²`.
    pub fn from_row_major(order: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != order * order {
            return Err(MosaicError::shape_mismatch(order * order, data.len()));
        }
        Ok(Self { order, data })
    }

    /// Build from rows, each of which must have one entry per row.
    pub fn from_rows(rows: &[Vec<T>]) -> Result<Self> {
        let order = rows.len();
        let mut data = Vec::with_capacity(order * order);
        for row in rows {
            if row.len() != order {
                return Err(MosaicError::shape_mismatch(order, row.len()));
            }
            data.extend_from_slice(row);
        }
        Ok(Self { order, data })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn get(&self, row: usize, col: usize) -> T {
        self.data[row * self.order + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: T) {
        self.data[row * self.order + col] = value;
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn determinant(&self) -> T {
        lu_determinant(self.data.clone(), self.order)
    }
}

/// Determinant together with a singularity flag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Determinant<T> {
    pub value: T,
    /// `|value| <= tolerance`; a singular result is not an error.
    pub singular: bool,
}

/// Determinant of a row-major `n × n` matrix.
///
/// The empty matrix (`n == 0`) has determinant one.
pub fn determinant<T: Float>(matrix: &[T], n: usize) -> Result<T> {
    if matrix.len() != n * n {
        return Err(MosaicError::shape_mismatch(n * n, matrix.len()));
    }
    Ok(lu_determinant(matrix.to_vec(), n))
}

/// Determinant flagged as singular when its magnitude is within `tolerance`.
pub fn evaluate<T: Float>(matrix: &[T], n: usize, tolerance: T) -> Result<Determinant<T>> {
    let value = determinant(matrix, n)?;
    Ok(Determinant {
        value,
        singular: value.abs() <= tolerance,
    })
}

/// Solve `matrix · x = rhs` for a row-major `n × n` matrix.
///
/// Returns `None` when a pivot column is entirely zero.
pub fn solve<T: Float>(matrix: &[T], n: usize, rhs: &[T]) -> Result<Option<Vec<T>>> {
    if matrix.len() != n * n {
        return Err(MosaicError::shape_mismatch(n * n, matrix.len()));
    }
    if rhs.len() != n {
        return Err(MosaicError::shape_mismatch(n, rhs.len()));
    }
    let mut a = matrix.to_vec();
    let mut b = rhs.to_vec();

    for k in 0..n {
        let mut pivot_row = k;
        let mut pivot_abs = a[k * n + k].abs();
        for row in (k + 1)..n {
            let candidate = a[row * n + k].abs();
            if candidate > pivot_abs {
                pivot_row = row;
                pivot_abs = candidate;
            }
        }
        if pivot_abs == T::zero() {
            return Ok(None);
        }
        if pivot_row != k {
            for col in 0..n {
                a.swap(k * n + col, pivot_row * n + col);
            }
            b.swap(k, pivot_row);
        }

        let pivot = a[k * n + k];
        for row in (k + 1)..n {
            let factor = a[row * n + k] / pivot;
            if factor == T::zero() {
                continue;
            }
            for col in (k + 1)..n {
                a[row * n + col] = a[row * n + col] - factor * a[k * n + col];
            }
            b[row] = b[row] - factor * b[k];
        }
    }

    let mut x = vec![T::zero(); n];
    for k in (0..n).rev() {
        let mut acc = b[k];
        for col in (k + 1)..n {
            acc = acc - a[k * n + col] * x[col];
        }
        x[k] = acc / a[k * n + k];
    }
    Ok(Some(x))
}

fn lu_determinant<T: Float>(mut a: Vec<T>, n: usize) -> T {
    let mut det = T::one();

    for k in 0..n {
        let mut pivot_row = k;
        let mut pivot_abs = a[k * n + k].abs();
        for row in (k + 1)..n {
            let candidate = a[row * n + k].abs();
            if candidate > pivot_abs {
                pivot_row = row;
                pivot_abs = candidate;
            }
        }

        if pivot_abs == T::zero() {
            return T::zero();
        }

        if pivot_row != k {
            for col in 0..n {
                a.swap(k * n + col, pivot_row * n + col);
            }
            det = -det;
        }

        let pivot = a[k * n + k];
        det = det * pivot;

        for row in (k + 1)..n {
            let factor = a[row * n + k] / pivot;
            if factor == T::zero() {
                continue;
            }
            for col in (k + 1)..n {
                a[row * n + col] = a[row * n + col] - factor * a[k * n + col];
            }
        }
    }

    det
}

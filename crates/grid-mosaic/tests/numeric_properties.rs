//! Integration test: numeric kernels against their defining properties.
//!
//! Covers row-major index round-trips, the 3^N stencil ordering, node
//! exactness and linear reproduction of multilinear interpolation, and LU
//! determinants checked against nalgebra.

use grid_mosaic::index::{flatten, unflatten};
use grid_mosaic::interpolation::{self, CellPosition, FieldView};
use grid_mosaic::stencil::{corner_vector, corner_vectors, stencil_size};
use grid_mosaic::{determinant, MaskPolicy, MosaicError};
use nalgebra::DMatrix;
use test_utils::{
    assert_approx_eq, cell_count, identity_matrix, plane_field, pseudo_random_matrix, ramp_field,
};

const SHAPES: &[&[usize]] = &[&[1], &[7], &[2, 3], &[3, 1, 4], &[2, 3, 4], &[2, 2, 2, 3]];

// ============================================================================
// Index math
// ============================================================================

#[test]
fn test_flatten_unflatten_roundtrip() {
    for dims in SHAPES {
        for flat in 0..cell_count(dims) {
            let index = unflatten(dims, flat).unwrap();
            assert_eq!(index.len(), dims.len());
            assert!(index.iter().zip(dims.iter()).all(|(i, d)| i < d));
            assert_eq!(flatten(dims, &index).unwrap(), flat, "dims {:?}", dims);
        }
    }
}

#[test]
fn test_worked_example() {
    let dims = [2, 3, 4];
    assert_eq!(flatten(&dims, &[1, 2, 3]).unwrap(), 23);
    assert_eq!(unflatten(&dims, 23).unwrap(), vec![1, 2, 3]);
}

#[test]
fn test_out_of_range_indices() {
    let dims = [2, 3];
    assert!(matches!(
        flatten(&dims, &[2, 0]),
        Err(MosaicError::OutOfRange { .. })
    ));
    assert!(matches!(
        unflatten(&dims, 6),
        Err(MosaicError::OutOfRange { .. })
    ));
    assert!(matches!(
        flatten(&dims, &[0]),
        Err(MosaicError::ShapeMismatch { .. })
    ));
}

// ============================================================================
// Stencil
// ============================================================================

#[test]
fn test_2d_stencil_enumerates_all_offsets_once() {
    let corners: Vec<_> = corner_vectors(2).unwrap().collect();
    assert_eq!(corners.len(), 9);
    assert_eq!(corners[0], vec![-1, -1]);
    assert_eq!(corners[8], vec![1, 1]);

    let mut seen = std::collections::HashSet::new();
    for c in &corners {
        assert!(c.iter().all(|&o| (-1..=1).contains(&o)));
        assert!(seen.insert(c.clone()), "duplicate offset {:?}", c);
    }
}

#[test]
fn test_3d_center_is_zero_offset() {
    assert_eq!(stencil_size(3).unwrap(), 27);
    assert_eq!(corner_vector(3, 13).unwrap(), vec![0, 0, 0]);
    assert!(corner_vector(3, 27).is_err());
}

// ============================================================================
// Interpolation
// ============================================================================

#[test]
fn test_nodes_are_exact() {
    for dims in SHAPES {
        let values: Vec<f64> = ramp_field(dims).iter().map(|v| v.sin() * 100.0).collect();
        let field = FieldView::new(dims, &values).unwrap();
        for flat in 0..cell_count(dims) {
            let node = unflatten(dims, flat).unwrap();
            let position = CellPosition::node(&node);
            let v = interpolation::multilinear(&field, &position, MaskPolicy::Propagate).unwrap();
            assert_eq!(v, values[flat]);
        }
    }
}

#[test]
fn test_plane_is_reproduced() {
    let dims = [3, 4, 5];
    let coefficients = [1.5, -0.25, 3.0];
    let values = plane_field(&dims, &coefficients, 7.0);
    let field = FieldView::new(&dims, &values).unwrap();

    let samples = [
        [0.0, 0.0, 0.0],
        [0.3, 1.7, 2.2],
        [1.99, 2.5, 3.75],
        [2.0, 3.0, 4.0],
        [1.0, 0.5, 4.0],
    ];
    for coords in samples {
        let position = CellPosition::from_coords(&dims, &coords).unwrap();
        let v = interpolation::multilinear(&field, &position, MaskPolicy::Propagate).unwrap();
        let expected = 7.0 + coords.iter().zip(&coefficients).map(|(x, c)| x * c).sum::<f64>();
        assert_approx_eq!(v, expected, 1e-10);
    }
}

#[test]
fn test_f32_field() {
    let dims = [2, 2];
    let values = [0.0f32, 1.0, 2.0, 3.0];
    let field = FieldView::new(&dims, &values).unwrap();
    let position = CellPosition::new(vec![0, 0], vec![0.25, 0.75]).unwrap();
    let v = interpolation::multilinear(&field, &position, MaskPolicy::Propagate).unwrap();
    assert_approx_eq!(v, 1.25, 1e-6);
}

#[test]
fn test_mask_policies() {
    let dims = [2, 2];
    let values: [f64; 4] = [1.0, 2.0, 3.0, 100.0];
    let mask = [true, true, true, false];
    let field = FieldView::new(&dims, &values)
        .unwrap()
        .with_mask(Some(&mask[..]))
        .unwrap();
    let position = CellPosition::new(vec![0, 0], vec![0.5, 0.5]).unwrap();

    assert_eq!(
        interpolation::multilinear(&field, &position, MaskPolicy::Propagate),
        Err(MosaicError::MaskedCell { flat: 3 })
    );
    assert!(interpolation::multilinear(&field, &position, MaskPolicy::Nan)
        .unwrap()
        .is_nan());
    let reweighted =
        interpolation::multilinear(&field, &position, MaskPolicy::Renormalize).unwrap();
    assert_approx_eq!(reweighted, 2.0, 1e-12);
}

#[test]
fn test_batch_matches_single() {
    let dims = [20, 30];
    let values = plane_field(&dims, &[0.5, 2.0], -1.0);
    let field = FieldView::new(&dims, &values).unwrap();
    let positions: Vec<CellPosition> = (0..500)
        .map(|k| {
            let x = (k % 19) as f64 + 0.37;
            let y = (k % 29) as f64 + 0.61;
            CellPosition::from_coords(&dims, &[x, y]).unwrap()
        })
        .collect();

    let method = grid_mosaic::InterpolationMethod::Multilinear;
    let serial = interpolation::interpolate_many(
        &field,
        &positions,
        method,
        MaskPolicy::Propagate,
        usize::MAX,
    );
    let parallel =
        interpolation::interpolate_many(&field, &positions, method, MaskPolicy::Propagate, 1);
    assert_eq!(serial, parallel);
}

// ============================================================================
// Determinants
// ============================================================================

#[test]
fn test_identity_and_repeated_rows() {
    for n in 1..=6 {
        assert_eq!(determinant(&identity_matrix(n), n).unwrap(), 1.0);
    }

    let mut m = pseudo_random_matrix(4, 11);
    let row: Vec<f64> = m[0..4].to_vec();
    m[8..12].copy_from_slice(&row);
    assert_approx_eq!(determinant(&m, 4).unwrap(), 0.0, 1e-12);
}

#[test]
fn test_determinant_matches_nalgebra() {
    for n in 1..=7 {
        for seed in 0..5 {
            let m = pseudo_random_matrix(n, seed);
            let ours = determinant(&m, n).unwrap();
            let reference = DMatrix::from_row_slice(n, n, &m).determinant();
            let scale = reference.abs().max(1.0);
            assert_approx_eq!(ours, reference, 1e-10 * scale);
        }
    }
}

#[test]
fn test_determinant_rejects_wrong_length() {
    assert!(matches!(
        determinant(&[1.0, 2.0, 3.0], 2),
        Err(MosaicError::ShapeMismatch {
            expected: 4,
            actual: 3
        })
    ));
}

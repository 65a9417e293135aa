//! Common test fixtures for grid-mosaic tests.
//!
//! YAML descriptions for the mosaic builder, plus a helper that writes one
//! to a temporary directory for tests that load from disk.

use std::fs;
use std::io;
use std::path::PathBuf;

use tempfile::TempDir;

/// Two 3x4 grids joined along an edge, with one masked cell and four queries.
///
/// - `west` holds the plane `2 + i + 0.5 j`
/// - `east` holds a ramp (value = flat index) with cell (1, 1) masked
/// - the last column of `west` touches the first column of `east`
pub const TWO_GRID_MOSAIC: &str = r#"
ndims: 2
grids:
  - name: west
    dims: [3, 4]
    values: { kind: plane, coefficients: [1.0, 0.5], offset: 2.0 }
  - name: east
    dims: [3, 4]
    data_type: float32
    values: { kind: ramp }
    mask: [true, true, true, true,
           true, false, true, true,
           true, true, true, true]
contacts:
  - { grid_a: west, lo_a: [0, 3], hi_a: [2, 3], grid_b: east, lo_b: [0, 0], hi_b: [2, 0] }
queries:
  - { grid: west, coords: [1.5, 2.25] }
  - { grid: east, coords: [0.5, 0.5] }
  - { grid: east, coords: [2.0, 3.0] }
  - { grid: west, coords: [3.5, 0.0] }
"#;

/// A single 3-D grid holding a ramp, queried at its centre.
pub const CUBE_MOSAIC: &str = r#"
ndims: 3
grids:
  - name: cube
    dims: [2, 3, 4]
    values: { kind: ramp }
queries:
  - { grid: cube, coords: [0.5, 1.0, 1.5] }
"#;

/// A description that parses but cannot be built: the contact names a missing grid.
pub const DANGLING_CONTACT: &str = r#"
ndims: 1
grids:
  - { name: only, dims: [4], values: { kind: constant, value: 1.0 } }
contacts:
  - { grid_a: only, lo_a: [0], hi_a: [0], grid_b: missing, lo_b: [0], hi_b: [0] }
"#;

/// Write `contents` to `name` inside a fresh temporary directory.
///
/// The directory is removed when the returned `TempDir` is dropped.
pub fn write_fixture(name: &str, contents: &str) -> io::Result<(TempDir, PathBuf)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join(name);
    fs::write(&path, contents)?;
    Ok((dir, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_fixture() {
        let (dir, path) = write_fixture("mosaic.yaml", CUBE_MOSAIC).unwrap();
        assert!(path.starts_with(dir.path()));
        assert_eq!(fs::read_to_string(&path).unwrap(), CUBE_MOSAIC);
    }
}

//! Grid Mosaic Core
//!
//! This crate models a computational domain as a *mosaic* of structured
//! N-dimensional grids joined by contacts, and provides the numeric kernels
//! that operate on them:
//!
//! - **Handles**: generational, kind-tagged handles for mosaics, grids and data
//! - **Index math**: row-major flatten/unflatten and 3^N neighbour stencils
//! - **Interpolation**: nearest and multilinear sampling with masked cells
//! - **Determinants**: LU with partial pivoting for Jacobian checks
//! - **Inverse mapping**: Newton search from physical coordinates to indices
//! - **Regridding**: weights that move data between grids of a mosaic
//!
//! # Architecture
//!
//! ```text
//! MosaicDescription (YAML)        GridSource (storage backend)
//!      │                                │
//!      ▼                                ▼
//! MosaicContext::define_* / load_grid ──► HandleRegistry<Mosaic|Grid|Data>
//!      │
//!      ├─► interpolate(data, CellPosition)
//!      │         │
//!      │         └─► FieldView ─► multilinear / nearest (2^N corners)
//!      │
//!      ├─► copy_across_contact(contact, source, target)
//!      │
//!      ├─► regrid(source, target) ─► RegridWeights (2^N weights per target)
//!      │         │
//!      │         └─► transform::find_indices (Newton, 3^N corner restarts)
//!      │
//!      └─► transform::check_transform(coords, node)
//!                │
//!                └─► gradient (3^N stencil) ─► determinant (LU)
//! ```
//!
//! # Example
//!
//! ```
//! use grid_mosaic::{CellPosition, DataType, DataValues, MosaicContext};
//!
//! let mut ctx = MosaicContext::new();
//! let mosaic = ctx.define_mosaic(2)?;
//! let grid = ctx.define_grid(mosaic, &[2, 2], DataType::Float64)?;
//! let data = ctx.define_data(grid)?;
//! ctx.set_values(data, DataValues::Float64(vec![0.0, 1.0, 2.0, 3.0]))?;
//!
//! let position = CellPosition::new(vec![0, 0], vec![0.5, 0.5])?;
//! assert_eq!(ctx.interpolate(data, &position)?, 1.5);
//! # Ok::<(), grid_mosaic::MosaicError>(())
//! ```

pub mod config;
pub mod description;
pub mod determinant;
pub mod error;
pub mod index;
pub mod interpolation;
pub mod model;
pub mod regrid;
pub mod registry;
pub mod report;
pub mod source;
pub mod stencil;
pub mod transform;
pub mod types;

// Re-export commonly used types at crate root
pub use config::InterpolationConfig;
pub use description::{
    BuiltMosaic, ContactDescription, GridDescription, MosaicDescription, NamedGrid,
    QueryDescription, QueryResult, ValuesSpec,
};
pub use determinant::{determinant, Determinant, SquareMatrix};
pub use error::{status_of, ErrorCode, MosaicError, Result, STATUS_OK};
pub use index::{flatten, unflatten};
pub use interpolation::{CellPosition, FieldView};
pub use model::{Contact, Data, DataValues, Grid, IndexRange, Mosaic, MosaicContext};
pub use regrid::{linear_weights, CellWeights, RegridParams, RegridWeights, WeightStatus};
pub use registry::{Handle, HandleRegistry, RawHandle, Record};
pub use report::{CollectingReporter, ErrorReporter, Report, TracingReporter};
pub use source::{GridSource, MemorySource};
pub use stencil::{corner_vector, stencil_size};
pub use transform::{
    check_transform, find_indices, local_jacobian, position_at, IndexSearch, SearchParams,
    TransformCheck,
};
pub use types::{DataType, InterpolationMethod, MaskPolicy, MultiIndex, ObjectKind, MAX_NDIMS};

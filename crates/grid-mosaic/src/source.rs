//! Storage backend seam for loading grids.
//!
//! The core never parses files. A backend exposes a grid's shape, its cell
//! values and its mask bits through [`GridSource`], and
//! [`MosaicContext::load_grid`] copies them into a new grid and data record.

use tracing::debug;

use crate::error::{MosaicError, Result};
use crate::index;
use crate::model::{Data, DataValues, Grid, Mosaic, MosaicContext};
use crate::registry::Handle;
use crate::types::DataType;

/// Read access to one stored grid.
pub trait GridSource {
    /// Per-dimension extents.
    fn read_shape(&self) -> Result<Vec<usize>>;

    /// Value of the cell at row-major offset `flat`.
    fn read_value(&self, flat: usize) -> Result<f64>;

    /// Validity of the cell at `flat`; `true` when the source has no mask.
    fn read_mask_bit(&self, _flat: usize) -> Result<bool> {
        Ok(true)
    }

    /// Whether [`GridSource::read_mask_bit`] carries information.
    fn has_mask(&self) -> bool {
        false
    }

    /// Storage precision of the values.
    fn data_type(&self) -> DataType {
        DataType::Float64
    }
}

/// A grid held in memory, mostly useful for tests and generated fields.
#[derive(Debug, Clone)]
pub struct MemorySource {
    dims: Vec<usize>,
    values: Vec<f64>,
    mask: Option<Vec<bool>>,
    data_type: DataType,
}

impl MemorySource {
    pub fn new(dims: Vec<usize>, values: Vec<f64>) -> Result<Self> {
        index::validate_dims(&dims)?;
        let count = index::cell_count(&dims);
        if values.len() != count {
            return Err(MosaicError::shape_mismatch(count, values.len()));
        }
        Ok(Self {
            dims,
            values,
            mask: None,
            data_type: DataType::Float64,
        })
    }

    pub fn with_mask(mut self, mask: Vec<bool>) -> Result<Self> {
        if mask.len() != self.values.len() {
            return Err(MosaicError::shape_mismatch(self.values.len(), mask.len()));
        }
        self.mask = Some(mask);
        Ok(self)
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }
}

impl GridSource for MemorySource {
    fn read_shape(&self) -> Result<Vec<usize>> {
        Ok(self.dims.clone())
    }

    fn read_value(&self, flat: usize) -> Result<f64> {
        self.values
            .get(flat)
            .copied()
            .ok_or_else(|| MosaicError::out_of_range(flat.to_string(), self.values.len().to_string()))
    }

    fn read_mask_bit(&self, flat: usize) -> Result<bool> {
        match &self.mask {
            Some(mask) => mask.get(flat).copied().ok_or_else(|| {
                MosaicError::out_of_range(flat.to_string(), mask.len().to_string())
            }),
            None => Ok(true),
        }
    }

    fn has_mask(&self) -> bool {
        self.mask.is_some()
    }

    fn data_type(&self) -> DataType {
        self.data_type
    }
}

impl MosaicContext {
    /// Define a grid and a data record from a storage backend.
    ///
    /// Nothing is defined if reading the source fails part way.
    pub fn load_grid(
        &mut self,
        mosaic: Handle<Mosaic>,
        source: &dyn GridSource,
    ) -> Result<(Handle<Grid>, Handle<Data>)> {
        let dims = source.read_shape()?;
        index::validate_dims(&dims)?;
        let count = index::cell_count(&dims);

        let values = (0..count)
            .map(|flat| source.read_value(flat))
            .collect::<Result<Vec<f64>>>()?;
        let mask = if source.has_mask() {
            Some(
                (0..count)
                    .map(|flat| source.read_mask_bit(flat))
                    .collect::<Result<Vec<bool>>>()?,
            )
        } else {
            None
        };

        let data_type = source.data_type();
        let grid = self.define_grid(mosaic, &dims, data_type)?;
        if let Some(mask) = mask {
            self.set_mask(grid, mask)?;
        }
        let data = self.define_data(grid)?;
        self.set_values(data, DataValues::from_f64(data_type, values))?;

        debug!(grid = %grid, data = %data, cells = count, "Loaded grid from source");
        Ok((grid, data))
    }
}

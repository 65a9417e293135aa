//! Mosaic, grid and data records and the context that owns them.
//!
//! A [`MosaicContext`] holds one [`HandleRegistry`] per record kind. Callers
//! only ever see handles; every query resolves its handle against the
//! registry of the expected kind.
//!
//! ```text
//! Mosaic ──< Grid ──< Data
//!   │          ▲
//!   └─ Contact ┘ (grid_a, range_a) <-> (grid_b, range_b)
//! ```
//!
//! Grids hold a back-reference to their mosaic and Data holds a
//! back-reference to its grid. A grid counts the data records that refer to
//! it and cannot be freed while that count is nonzero.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::InterpolationConfig;
use crate::error::{MosaicError, Result};
use crate::index;
use crate::interpolation::{self, CellPosition, FieldView};
use crate::registry::{Handle, HandleRegistry, RawHandle, Record};
use crate::transform::{self, TransformCheck};
use crate::types::{DataType, InterpolationMethod, MaskPolicy, MultiIndex, ObjectKind, MAX_NDIMS};

/// A set of structured grids covering a domain.
#[derive(Debug, Clone)]
pub struct Mosaic {
    ndims: usize,
    grids: Vec<Handle<Grid>>,
    contacts: Vec<Contact>,
}

impl Record for Mosaic {
    const KIND: ObjectKind = ObjectKind::Mosaic;
}

impl Mosaic {
    pub fn ndims(&self) -> usize {
        self.ndims
    }

    pub fn ngrids(&self) -> usize {
        self.grids.len()
    }

    pub fn ncontacts(&self) -> usize {
        self.contacts.len()
    }

    pub fn grids(&self) -> &[Handle<Grid>] {
        &self.grids
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }
}

/// A structured array of cells belonging to a mosaic.
#[derive(Debug, Clone)]
pub struct Grid {
    mosaic: Handle<Mosaic>,
    dims: Vec<usize>,
    mask: Option<Vec<bool>>,
    data_type: DataType,
    data_refs: usize,
}

impl Record for Grid {
    const KIND: ObjectKind = ObjectKind::Grid;
}

impl Grid {
    pub fn mosaic(&self) -> Handle<Mosaic> {
        self.mosaic
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn mask(&self) -> Option<&[bool]> {
        self.mask.as_deref()
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn cell_count(&self) -> usize {
        index::cell_count(&self.dims)
    }
}

/// Scalar values attached to a grid.
#[derive(Debug, Clone)]
pub struct Data {
    grid: Handle<Grid>,
    values: Option<DataValues>,
}

impl Record for Data {
    const KIND: ObjectKind = ObjectKind::Data;
}

impl Data {
    pub fn grid(&self) -> Handle<Grid> {
        self.grid
    }

    pub fn values(&self) -> Option<&DataValues> {
        self.values.as_ref()
    }
}

/// Row-major cell values in the grid's storage precision.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValues {
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl DataValues {
    /// A vector of `len` NaN values of the given precision.
    pub fn filled_nan(data_type: DataType, len: usize) -> Self {
        match data_type {
            DataType::Float32 => Self::Float32(vec![f32::NAN; len]),
            DataType::Float64 => Self::Float64(vec![f64::NAN; len]),
        }
    }

    /// Convert `f64` values to the given precision.
    pub fn from_f64(data_type: DataType, values: Vec<f64>) -> Self {
        match data_type {
            DataType::Float32 => Self::Float32(values.into_iter().map(|v| v as f32).collect()),
            DataType::Float64 => Self::Float64(values),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::Float32(_) => DataType::Float32,
            Self::Float64(_) => DataType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Float32(v) => v.len(),
            Self::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `flat`, widened to `f64`.
    pub fn get_f64(&self, flat: usize) -> Option<f64> {
        match self {
            Self::Float32(v) => v.get(flat).map(|&x| f64::from(x)),
            Self::Float64(v) => v.get(flat).copied(),
        }
    }

    fn set_f64(&mut self, flat: usize, value: f64) {
        match self {
            Self::Float32(v) => v[flat] = value as f32,
            Self::Float64(v) => v[flat] = value,
        }
    }
}

/// Inclusive per-dimension index box `[lo, hi]`.
///
/// Always satisfies `lo <= hi` on every axis; deserialization goes through
/// [`IndexRange::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawIndexRange")]
pub struct IndexRange {
    lo: MultiIndex,
    hi: MultiIndex,
}

#[derive(Deserialize)]
struct RawIndexRange {
    lo: MultiIndex,
    hi: MultiIndex,
}

impl TryFrom<RawIndexRange> for IndexRange {
    type Error = MosaicError;

    fn try_from(raw: RawIndexRange) -> Result<Self> {
        Self::new(raw.lo, raw.hi)
    }
}

impl IndexRange {
    pub fn new(lo: MultiIndex, hi: MultiIndex) -> Result<Self> {
        if lo.len() != hi.len() {
            return Err(MosaicError::shape_mismatch(lo.len(), hi.len()));
        }
        if lo.iter().zip(&hi).any(|(l, h)| l > h) {
            return Err(MosaicError::invalid_contact(format!(
                "range lower corner {:?} exceeds upper corner {:?}",
                lo, hi
            )));
        }
        Ok(Self { lo, hi })
    }

    pub fn ndims(&self) -> usize {
        self.lo.len()
    }

    pub fn lo(&self) -> &[usize] {
        &self.lo
    }

    pub fn hi(&self) -> &[usize] {
        &self.hi
    }

    pub fn extents(&self) -> Vec<usize> {
        self.lo.iter().zip(&self.hi).map(|(l, h)| h - l + 1).collect()
    }

    pub fn cell_count(&self) -> usize {
        index::cell_count(&self.extents())
    }

    /// Whether the box lies inside a grid of the given extents.
    pub fn fits(&self, dims: &[usize]) -> bool {
        self.ndims() == dims.len()
            && self.hi.iter().zip(dims).all(|(h, d)| h < d)
    }

    /// Every index in the box, in row-major order.
    pub fn indices(&self) -> Result<Vec<MultiIndex>> {
        let extents = self.extents();
        (0..index::cell_count(&extents))
            .map(|k| {
                let offset = index::unflatten(&extents, k)?;
                Ok(offset.iter().zip(&self.lo).map(|(o, l)| o + l).collect())
            })
            .collect()
    }
}

/// Adjacency/overlap between two grids of the same mosaic.
///
/// Cells of `range_a` on `grid_a` correspond one-to-one, in row-major order,
/// with cells of `range_b` on `grid_b`.
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub grid_a: Handle<Grid>,
    pub range_a: IndexRange,
    pub grid_b: Handle<Grid>,
    pub range_b: IndexRange,
}

impl Contact {
    fn references(&self, grid: Handle<Grid>) -> bool {
        self.grid_a == grid || self.grid_b == grid
    }
}

enum AnyField<'a> {
    F32(FieldView<'a, f32>),
    F64(FieldView<'a, f64>),
}

/// Owner of every mosaic, grid and data record.
pub struct MosaicContext {
    mosaics: HandleRegistry<Mosaic>,
    grids: HandleRegistry<Grid>,
    data: HandleRegistry<Data>,
    config: InterpolationConfig,
}

impl MosaicContext {
    /// Create an empty context with the default configuration.
    pub fn new() -> Self {
        Self {
            mosaics: HandleRegistry::new(),
            grids: HandleRegistry::new(),
            data: HandleRegistry::new(),
            config: InterpolationConfig::default(),
        }
    }

    /// Create an empty context with a validated configuration.
    pub fn with_config(config: InterpolationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new()
        })
    }

    pub fn config(&self) -> &InterpolationConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Define
    // ------------------------------------------------------------------

    /// Create a mosaic of `ndims`-dimensional grids.
    pub fn define_mosaic(&mut self, ndims: usize) -> Result<Handle<Mosaic>> {
        if ndims == 0 || ndims > MAX_NDIMS {
            return Err(MosaicError::invalid_dimensions(format!(
                "mosaic ndims must be in 1..={}, got {}",
                MAX_NDIMS, ndims
            )));
        }
        let handle = self.mosaics.define(Mosaic {
            ndims,
            grids: Vec::new(),
            contacts: Vec::new(),
        })?;
        debug!(mosaic = %handle, ndims, "Defined mosaic");
        Ok(handle)
    }

    /// Create a grid inside a mosaic.
    pub fn define_grid(
        &mut self,
        mosaic: Handle<Mosaic>,
        dims: &[usize],
        data_type: DataType,
    ) -> Result<Handle<Grid>> {
        let ndims = self.mosaics.find(mosaic)?.ndims;
        if dims.len() != ndims {
            return Err(MosaicError::invalid_dimensions(format!(
                "grid has {} dimensions but mosaic expects {}",
                dims.len(),
                ndims
            )));
        }
        index::validate_dims(dims)?;

        let handle = self.grids.define(Grid {
            mosaic,
            dims: dims.to_vec(),
            mask: None,
            data_type,
            data_refs: 0,
        })?;
        self.mosaics.find_mut(mosaic)?.grids.push(handle);
        debug!(grid = %handle, mosaic = %mosaic, ?dims, %data_type, "Defined grid");
        Ok(handle)
    }

    /// Create an empty data record attached to a grid.
    pub fn define_data(&mut self, grid: Handle<Grid>) -> Result<Handle<Data>> {
        self.grids.find(grid)?;
        let handle = self.data.define(Data { grid, values: None })?;
        self.grids.find_mut(grid)?.data_refs += 1;
        debug!(data = %handle, grid = %grid, "Defined data");
        Ok(handle)
    }

    // ------------------------------------------------------------------
    // Mutate
    // ------------------------------------------------------------------

    /// Attach a validity mask (`true` = valid) with one entry per cell.
    pub fn set_mask(&mut self, grid: Handle<Grid>, mask: Vec<bool>) -> Result<()> {
        let record = self.grids.find_mut(grid)?;
        let count = record.cell_count();
        if mask.len() != count {
            return Err(MosaicError::shape_mismatch(count, mask.len()));
        }
        record.mask = Some(mask);
        Ok(())
    }

    /// Remove a grid's mask so every cell is valid.
    pub fn clear_mask(&mut self, grid: Handle<Grid>) -> Result<()> {
        self.grids.find_mut(grid)?.mask = None;
        Ok(())
    }

    /// Store values for a data record; precision must match the grid.
    pub fn set_values(&mut self, data: Handle<Data>, values: DataValues) -> Result<()> {
        let grid = self.data.find(data)?.grid;
        let grid_record = self.grids.find(grid)?;
        if values.data_type() != grid_record.data_type {
            return Err(MosaicError::TypeMismatch {
                expected: grid_record.data_type,
                actual: values.data_type(),
            });
        }
        let count = grid_record.cell_count();
        if values.len() != count {
            return Err(MosaicError::shape_mismatch(count, values.len()));
        }
        self.data.find_mut(data)?.values = Some(values);
        Ok(())
    }

    /// Record a contact between two grids of `mosaic`; returns its index.
    pub fn add_contact(&mut self, mosaic: Handle<Mosaic>, contact: Contact) -> Result<usize> {
        self.mosaics.find(mosaic)?;
        for (grid, range) in [
            (contact.grid_a, &contact.range_a),
            (contact.grid_b, &contact.range_b),
        ] {
            let record = self.grids.find(grid)?;
            if record.mosaic != mosaic {
                return Err(MosaicError::invalid_contact(format!(
                    "grid {} does not belong to mosaic {}",
                    grid, mosaic
                )));
            }
            if !range.fits(&record.dims) {
                return Err(MosaicError::invalid_contact(format!(
                    "range {:?}..={:?} does not fit grid {} with dims {:?}",
                    range.lo, range.hi, grid, record.dims
                )));
            }
        }
        if contact.range_a.cell_count() != contact.range_b.cell_count() {
            return Err(MosaicError::invalid_contact(format!(
                "ranges hold {} and {} cells",
                contact.range_a.cell_count(),
                contact.range_b.cell_count()
            )));
        }

        let record = self.mosaics.find_mut(mosaic)?;
        record.contacts.push(contact);
        let index = record.contacts.len() - 1;
        debug!(mosaic = %mosaic, contact = index, "Added contact");
        Ok(index)
    }

    // ------------------------------------------------------------------
    // Query
    // ------------------------------------------------------------------

    pub fn mosaic(&self, mosaic: Handle<Mosaic>) -> Result<&Mosaic> {
        self.mosaics.find(mosaic)
    }

    pub fn grid(&self, grid: Handle<Grid>) -> Result<&Grid> {
        self.grids.find(grid)
    }

    pub fn data(&self, data: Handle<Data>) -> Result<&Data> {
        self.data.find(data)
    }

    pub fn ndims(&self, mosaic: Handle<Mosaic>) -> Result<usize> {
        Ok(self.mosaics.find(mosaic)?.ndims())
    }

    pub fn ngrids(&self, mosaic: Handle<Mosaic>) -> Result<usize> {
        Ok(self.mosaics.find(mosaic)?.ngrids())
    }

    pub fn ncontacts(&self, mosaic: Handle<Mosaic>) -> Result<usize> {
        Ok(self.mosaics.find(mosaic)?.ncontacts())
    }

    pub fn grids(&self, mosaic: Handle<Mosaic>) -> Result<&[Handle<Grid>]> {
        Ok(self.mosaics.find(mosaic)?.grids())
    }

    pub fn contacts(&self, mosaic: Handle<Mosaic>) -> Result<&[Contact]> {
        Ok(self.mosaics.find(mosaic)?.contacts())
    }

    pub fn dims(&self, grid: Handle<Grid>) -> Result<&[usize]> {
        Ok(self.grids.find(grid)?.dims())
    }

    pub fn data_type(&self, grid: Handle<Grid>) -> Result<DataType> {
        Ok(self.grids.find(grid)?.data_type())
    }

    pub fn mask_of(&self, grid: Handle<Grid>) -> Result<Option<&[bool]>> {
        Ok(self.grids.find(grid)?.mask())
    }

    pub fn mosaic_of(&self, grid: Handle<Grid>) -> Result<Handle<Mosaic>> {
        Ok(self.grids.find(grid)?.mosaic())
    }

    pub fn grid_of(&self, data: Handle<Data>) -> Result<Handle<Grid>> {
        Ok(self.data.find(data)?.grid())
    }

    pub fn values(&self, data: Handle<Data>) -> Result<Option<&DataValues>> {
        Ok(self.data.find(data)?.values())
    }

    /// Number of live records of each kind: (mosaics, grids, data).
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.mosaics.len(), self.grids.len(), self.data.len())
    }

    // ------------------------------------------------------------------
    // Raw handles
    // ------------------------------------------------------------------

    pub fn resolve_mosaic(&self, raw: RawHandle) -> Result<Handle<Mosaic>> {
        self.mosaics.resolve(raw)
    }

    pub fn resolve_grid(&self, raw: RawHandle) -> Result<Handle<Grid>> {
        self.grids.resolve(raw)
    }

    pub fn resolve_data(&self, raw: RawHandle) -> Result<Handle<Data>> {
        self.data.resolve(raw)
    }

    // ------------------------------------------------------------------
    // Free
    // ------------------------------------------------------------------

    /// Free a data record and release its reference on the grid.
    pub fn free_data(&mut self, data: Handle<Data>) -> Result<()> {
        let record = self.data.free(data)?;
        if let Ok(grid) = self.grids.find_mut(record.grid) {
            grid.data_refs = grid.data_refs.saturating_sub(1);
        }
        debug!(data = %data, "Freed data");
        Ok(())
    }

    /// Free a grid; rejected while data records or contacts refer to it.
    pub fn free_grid(&mut self, grid: Handle<Grid>) -> Result<()> {
        let record = self.grids.find(grid)?;
        let mosaic = record.mosaic;
        let contact_refs = self
            .mosaics
            .find(mosaic)
            .map(|m| m.contacts.iter().filter(|c| c.references(grid)).count())
            .unwrap_or(0);
        let references = record.data_refs + contact_refs;
        if references > 0 {
            warn!(grid = %grid, references, "Refusing to free referenced grid");
            return Err(MosaicError::HandleInUse {
                kind: ObjectKind::Grid,
                handle: grid.to_raw().0,
                references,
            });
        }

        self.grids.free(grid)?;
        if let Ok(record) = self.mosaics.find_mut(mosaic) {
            record.grids.retain(|&g| g != grid);
        }
        debug!(grid = %grid, "Freed grid");
        Ok(())
    }

    /// Free a mosaic; rejected while it still has grids.
    pub fn free_mosaic(&mut self, mosaic: Handle<Mosaic>) -> Result<()> {
        let ngrids = self.mosaics.find(mosaic)?.ngrids();
        if ngrids > 0 {
            warn!(mosaic = %mosaic, ngrids, "Refusing to free mosaic with live grids");
            return Err(MosaicError::HandleInUse {
                kind: ObjectKind::Mosaic,
                handle: mosaic.to_raw().0,
                references: ngrids,
            });
        }
        self.mosaics.free(mosaic)?;
        debug!(mosaic = %mosaic, "Freed mosaic");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sampling
    // ------------------------------------------------------------------

    fn field(&self, data: Handle<Data>) -> Result<AnyField<'_>> {
        let record = self.data.find(data)?;
        let grid = self.grids.find(record.grid)?;
        let values = record
            .values
            .as_ref()
            .ok_or(MosaicError::MissingValues {
                handle: data.to_raw().0,
            })?;
        Ok(match values {
            DataValues::Float32(v) => {
                AnyField::F32(FieldView::new(&grid.dims, v)?.with_mask(grid.mask())?)
            }
            DataValues::Float64(v) => {
                AnyField::F64(FieldView::new(&grid.dims, v)?.with_mask(grid.mask())?)
            }
        })
    }

    /// Sample a data record with the configured method and mask policy.
    pub fn interpolate(&self, data: Handle<Data>, position: &CellPosition) -> Result<f64> {
        self.interpolate_with(data, position, self.config.method, self.config.mask_policy)
    }

    /// Sample a data record with an explicit method and mask policy.
    pub fn interpolate_with(
        &self,
        data: Handle<Data>,
        position: &CellPosition,
        method: InterpolationMethod,
        policy: MaskPolicy,
    ) -> Result<f64> {
        let result = match self.field(data)? {
            AnyField::F32(field) => {
                interpolation::interpolate(&field, position, method, policy).map(f64::from)
            }
            AnyField::F64(field) => interpolation::interpolate(&field, position, method, policy),
        };
        if let Err(MosaicError::MaskedCell { flat }) = &result {
            warn!(data = %data, cell = flat, %policy, "Interpolation touched a masked cell");
        }
        result
    }

    /// Sample at continuous index-space coordinates.
    pub fn interpolate_coords(&self, data: Handle<Data>, coords: &[f64]) -> Result<f64> {
        let grid = self.grid_of(data)?;
        let position = CellPosition::from_coords(self.dims(grid)?, coords)?;
        self.interpolate(data, &position)
    }

    /// Sample many positions; each position succeeds or fails independently.
    pub fn interpolate_many(
        &self,
        data: Handle<Data>,
        positions: &[CellPosition],
    ) -> Result<Vec<Result<f64>>> {
        let method = self.config.method;
        let policy = self.config.mask_policy;
        let threshold = self.config.parallel_threshold;
        Ok(match self.field(data)? {
            AnyField::F32(field) => {
                interpolation::interpolate_many(&field, positions, method, policy, threshold)
                    .into_iter()
                    .map(|r| r.map(f64::from))
                    .collect()
            }
            AnyField::F64(field) => {
                interpolation::interpolate_many(&field, positions, method, policy, threshold)
            }
        })
    }

    /// Index-space derivative of a data record at a node.
    pub fn gradient(&self, data: Handle<Data>, node: &[usize]) -> Result<Vec<f64>> {
        match self.field(data)? {
            AnyField::F32(field) => Ok(interpolation::gradient(&field, node)?
                .into_iter()
                .map(f64::from)
                .collect()),
            AnyField::F64(field) => interpolation::gradient(&field, node),
        }
    }

    // ------------------------------------------------------------------
    // Coordinates
    // ------------------------------------------------------------------

    /// Physical coordinate fields widened to `f64`, one data record per
    /// dimension, all on the same grid. Returns that grid and the fields.
    pub(crate) fn coordinate_values(
        &self,
        coords: &[Handle<Data>],
    ) -> Result<(Handle<Grid>, Vec<Vec<f64>>)> {
        let first = coords
            .first()
            .ok_or_else(|| MosaicError::invalid_dimensions("no coordinate data given"))?;
        let grid = self.grid_of(*first)?;
        let ndims = self.grids.find(grid)?.dims.len();
        if coords.len() != ndims {
            return Err(MosaicError::shape_mismatch(ndims, coords.len()));
        }

        let fields = coords
            .iter()
            .map(|&data| {
                let record = self.data.find(data)?;
                if record.grid != grid {
                    return Err(MosaicError::invalid_dimensions(format!(
                        "coordinate data {} is not defined on grid {}",
                        data, grid
                    )));
                }
                let values = record.values().ok_or(MosaicError::MissingValues {
                    handle: data.to_raw().0,
                })?;
                Ok((0..values.len()).filter_map(|flat| values.get_f64(flat)).collect())
            })
            .collect::<Result<Vec<Vec<f64>>>>()?;
        Ok((grid, fields))
    }

    /// Jacobian check of a grid's coordinate data at `node`, flagged singular
    /// against the configured `singular_tolerance`.
    pub fn check_grid_transform(
        &self,
        coords: &[Handle<Data>],
        node: &[usize],
    ) -> Result<TransformCheck> {
        let (grid, fields) = self.coordinate_values(coords)?;
        let dims = self.dims(grid)?;
        let views = fields
            .iter()
            .map(|field| FieldView::new(dims, field))
            .collect::<Result<Vec<_>>>()?;
        transform::check_transform(&views, node, self.config.singular_tolerance)
    }

    // ------------------------------------------------------------------
    // Contacts
    // ------------------------------------------------------------------

    /// Copy values across a contact from `source` (on one side) into `target`
    /// (on the other). Cells masked on either side are left untouched.
    /// Returns the number of cells written.
    pub fn copy_across_contact(
        &mut self,
        mosaic: Handle<Mosaic>,
        contact_index: usize,
        source: Handle<Data>,
        target: Handle<Data>,
    ) -> Result<usize> {
        let contacts = self.mosaics.find(mosaic)?.contacts();
        let contact = contacts.get(contact_index).ok_or_else(|| {
            MosaicError::out_of_range(contact_index.to_string(), contacts.len().to_string())
        })?;

        let source_grid = self.grid_of(source)?;
        let target_grid = self.grid_of(target)?;
        let (source_range, target_range) =
            if source_grid == contact.grid_a && target_grid == contact.grid_b {
                (&contact.range_a, &contact.range_b)
            } else if source_grid == contact.grid_b && target_grid == contact.grid_a {
                (&contact.range_b, &contact.range_a)
            } else {
                return Err(MosaicError::invalid_contact(format!(
                    "contact {} does not join grids {} and {}",
                    contact_index, source_grid, target_grid
                )));
            };

        let source_record = self.grids.find(source_grid)?;
        let target_record = self.grids.find(target_grid)?;
        let source_values = self
            .data
            .find(source)?
            .values()
            .ok_or(MosaicError::MissingValues {
                handle: source.to_raw().0,
            })?;

        let mut writes = Vec::with_capacity(source_range.cell_count());
        for (from, to) in source_range.indices()?.iter().zip(target_range.indices()?.iter()) {
            let from_flat = index::flatten(&source_record.dims, from)?;
            if let Some(mask) = source_record.mask() {
                if !mask[from_flat] {
                    continue;
                }
            }
            let to_flat = index::flatten(&target_record.dims, to)?;
            if let Some(mask) = target_record.mask() {
                if !mask[to_flat] {
                    continue;
                }
            }
            if let Some(value) = source_values.get_f64(from_flat) {
                writes.push((to_flat, value));
            }
        }

        let target_type = target_record.data_type;
        let target_len = target_record.cell_count();
        let target_data = self.data.find_mut(target)?;
        let values = target_data
            .values
            .get_or_insert_with(|| DataValues::filled_nan(target_type, target_len));
        for &(flat, value) in &writes {
            values.set_f64(flat, value);
        }

        debug!(
            mosaic = %mosaic,
            contact = contact_index,
            cells = writes.len(),
            "Copied values across contact"
        );
        Ok(writes.len())
    }
}

impl Default for MosaicContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_2d() -> (MosaicContext, Handle<Mosaic>, Handle<Grid>, Handle<Data>) {
        let mut ctx = MosaicContext::new();
        let mosaic = ctx.define_mosaic(2).unwrap();
        let grid = ctx.define_grid(mosaic, &[2, 3], DataType::Float64).unwrap();
        let data = ctx.define_data(grid).unwrap();
        ctx.set_values(data, DataValues::Float64((0..6).map(f64::from).collect()))
            .unwrap();
        (ctx, mosaic, grid, data)
    }

    #[test]
    fn test_queries() {
        let (ctx, mosaic, grid, data) = setup_2d();
        assert_eq!(ctx.ndims(mosaic).unwrap(), 2);
        assert_eq!(ctx.ngrids(mosaic).unwrap(), 1);
        assert_eq!(ctx.ncontacts(mosaic).unwrap(), 0);
        assert_eq!(ctx.dims(grid).unwrap(), &[2, 3]);
        assert_eq!(ctx.data_type(grid).unwrap(), DataType::Float64);
        assert_eq!(ctx.mask_of(grid).unwrap(), None);
        assert_eq!(ctx.mosaic_of(grid).unwrap(), mosaic);
        assert_eq!(ctx.grid_of(data).unwrap(), grid);
        assert_eq!(ctx.counts(), (1, 1, 1));
    }

    #[test]
    fn test_define_rejects_bad_dims() {
        let mut ctx = MosaicContext::new();
        assert!(ctx.define_mosaic(0).is_err());
        let mosaic = ctx.define_mosaic(2).unwrap();
        assert!(ctx.define_grid(mosaic, &[3], DataType::Float32).is_err());
        assert!(ctx.define_grid(mosaic, &[3, 0], DataType::Float32).is_err());
        assert_eq!(ctx.ngrids(mosaic).unwrap(), 0);
    }

    #[test]
    fn test_wrong_kind_raw_handle() {
        let (ctx, _mosaic, grid, data) = setup_2d();
        assert!(matches!(
            ctx.resolve_grid(data.to_raw()),
            Err(MosaicError::InvalidHandle {
                kind: ObjectKind::Grid,
                ..
            })
        ));
        assert_eq!(ctx.resolve_grid(grid.to_raw()).unwrap(), grid);
        assert_eq!(ctx.resolve_data(data.to_raw()).unwrap(), data);
    }

    #[test]
    fn test_set_values_checks_type_and_length() {
        let (mut ctx, _mosaic, _grid, data) = setup_2d();
        assert!(matches!(
            ctx.set_values(data, DataValues::Float32(vec![0.0; 6])),
            Err(MosaicError::TypeMismatch { .. })
        ));
        assert_eq!(
            ctx.set_values(data, DataValues::Float64(vec![0.0; 5])),
            Err(MosaicError::shape_mismatch(6, 5))
        );
    }

    #[test]
    fn test_set_mask_checks_length() {
        let (mut ctx, _mosaic, grid, _data) = setup_2d();
        assert!(ctx.set_mask(grid, vec![true; 5]).is_err());
        ctx.set_mask(grid, vec![true; 6]).unwrap();
        assert_eq!(ctx.mask_of(grid).unwrap().map(|m| m.len()), Some(6));
        ctx.clear_mask(grid).unwrap();
        assert_eq!(ctx.mask_of(grid).unwrap(), None);
    }

    #[test]
    fn test_interpolate_through_context() {
        let (ctx, _mosaic, _grid, data) = setup_2d();
        // value = 3*i + j
        let v = ctx.interpolate_coords(data, &[0.5, 1.5]).unwrap();
        assert!((v - 3.0).abs() < 1e-12);
        assert_eq!(ctx.interpolate_coords(data, &[1.0, 2.0]).unwrap(), 5.0);
        assert_eq!(ctx.gradient(data, &[0, 1]).unwrap(), vec![3.0, 1.0]);
    }

    #[test]
    fn test_interpolate_without_values() {
        let mut ctx = MosaicContext::new();
        let mosaic = ctx.define_mosaic(1).unwrap();
        let grid = ctx.define_grid(mosaic, &[4], DataType::Float32).unwrap();
        let data = ctx.define_data(grid).unwrap();
        assert!(matches!(
            ctx.interpolate_coords(data, &[1.0]),
            Err(MosaicError::MissingValues { .. })
        ));
    }

    #[test]
    fn test_free_order_is_enforced() {
        let (mut ctx, mosaic, grid, data) = setup_2d();

        assert!(matches!(
            ctx.free_grid(grid),
            Err(MosaicError::HandleInUse { references: 1, .. })
        ));
        assert!(matches!(
            ctx.free_mosaic(mosaic),
            Err(MosaicError::HandleInUse { references: 1, .. })
        ));

        ctx.free_data(data).unwrap();
        assert!(ctx.grid_of(data).is_err());
        ctx.free_grid(grid).unwrap();
        assert_eq!(ctx.ngrids(mosaic).unwrap(), 0);
        ctx.free_mosaic(mosaic).unwrap();
        assert!(ctx.ndims(mosaic).is_err());
        assert_eq!(ctx.counts(), (0, 0, 0));
    }

    #[test]
    fn test_index_range() {
        let range = IndexRange::new(vec![1, 0], vec![2, 1]).unwrap();
        assert_eq!(range.cell_count(), 4);
        assert_eq!(
            range.indices().unwrap(),
            vec![vec![1, 0], vec![1, 1], vec![2, 0], vec![2, 1]]
        );
        assert!(range.fits(&[3, 2]));
        assert!(!range.fits(&[2, 2]));
        assert!(IndexRange::new(vec![2], vec![1]).is_err());
    }

    #[test]
    fn test_index_range_deserialize_checks_corners() {
        let range: IndexRange = serde_yaml::from_str("lo: [0, 1]\nhi: [2, 1]\n").unwrap();
        assert_eq!(range.lo(), &[0, 1]);
        assert_eq!(range.hi(), &[2, 1]);
        assert_eq!(range.extents(), vec![3, 1]);

        let inverted = serde_yaml::from_str::<IndexRange>("lo: [2]\nhi: [1]\n");
        assert!(inverted.is_err());
        let ragged = serde_yaml::from_str::<IndexRange>("lo: [0, 0]\nhi: [1]\n");
        assert!(ragged.is_err());
    }

    fn squashed_grid(config: InterpolationConfig) -> (MosaicContext, [Handle<Data>; 2]) {
        // x = i, y = 1e-6 * j: determinant 1e-6 everywhere.
        let mut ctx = MosaicContext::with_config(config).unwrap();
        let mosaic = ctx.define_mosaic(2).unwrap();
        let grid = ctx.define_grid(mosaic, &[3, 3], DataType::Float64).unwrap();
        let x = ctx.define_data(grid).unwrap();
        let y = ctx.define_data(grid).unwrap();
        let xs = (0..9).map(|k| (k / 3) as f64).collect();
        let ys = (0..9).map(|k| (k % 3) as f64 * 1e-6).collect();
        ctx.set_values(x, DataValues::Float64(xs)).unwrap();
        ctx.set_values(y, DataValues::Float64(ys)).unwrap();
        (ctx, [x, y])
    }

    #[test]
    fn test_check_grid_transform_uses_configured_tolerance() {
        let (ctx, coords) = squashed_grid(InterpolationConfig::default());
        let check = ctx.check_grid_transform(&coords, &[1, 1]).unwrap();
        assert!((check.determinant - 1e-6).abs() < 1e-15);
        assert!(!check.singular);

        let loose = InterpolationConfig {
            singular_tolerance: 1e-3,
            ..InterpolationConfig::default()
        };
        let (ctx, coords) = squashed_grid(loose);
        assert!(ctx.check_grid_transform(&coords, &[1, 1]).unwrap().singular);
        assert!(matches!(
            ctx.check_grid_transform(&coords[..1], &[1, 1]),
            Err(MosaicError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_coordinates_must_share_a_grid() {
        let (mut ctx, mosaic, grid, data) = setup_2d();
        let other = ctx.define_grid(mosaic, &[2, 3], DataType::Float64).unwrap();
        let foreign = ctx.define_data(other).unwrap();
        ctx.set_values(foreign, DataValues::Float64(vec![0.0; 6]))
            .unwrap();
        assert!(ctx.check_grid_transform(&[data, foreign], &[0, 0]).is_err());

        let empty = ctx.define_data(grid).unwrap();
        assert!(matches!(
            ctx.check_grid_transform(&[data, empty], &[0, 0]),
            Err(MosaicError::MissingValues { .. })
        ));
    }
}

//! Declarative mosaic descriptions.
//!
//! A description names its grids, says how to fill each one, lists the
//! contacts between them and, optionally, the positions to sample:
//!
//! ```yaml
//! ndims: 2
//! grids:
//!   - name: west
//!     dims: [3, 4]
//!     values: { kind: plane, coefficients: [1.0, 0.5], offset: 2.0 }
//!   - name: east
//!     dims: [3, 4]
//!     data_type: float32
//!     values: { kind: ramp }
//! contacts:
//!   - { grid_a: west, lo_a: [0, 3], hi_a: [2, 3], grid_b: east, lo_b: [0, 0], hi_b: [2, 0] }
//! queries:
//!   - { grid: west, coords: [1.5, 2.25] }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::InterpolationConfig;
use crate::error::{MosaicError, Result, STATUS_OK};
use crate::index;
use crate::interpolation::CellPosition;
use crate::model::{Contact, Data, DataValues, Grid, IndexRange, Mosaic, MosaicContext};
use crate::registry::Handle;
use crate::types::{DataType, InterpolationMethod};

// ============================================================================
// Description types
// ============================================================================

/// A complete mosaic as read from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MosaicDescription {
    pub ndims: usize,
    pub grids: Vec<GridDescription>,
    #[serde(default)]
    pub contacts: Vec<ContactDescription>,
    #[serde(default)]
    pub queries: Vec<QueryDescription>,
    /// Overrides for the sampling configuration.
    #[serde(default)]
    pub interpolation: Option<InterpolationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridDescription {
    pub name: String,
    pub dims: Vec<usize>,
    #[serde(default)]
    pub data_type: DataType,
    /// How to fill the grid's data record; no record is created when absent.
    #[serde(default)]
    pub values: Option<ValuesSpec>,
    /// Row-major validity mask (`true` = valid).
    #[serde(default)]
    pub mask: Option<Vec<bool>>,
}

/// Generator for a grid's cell values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ValuesSpec {
    /// Explicit row-major values.
    Inline { values: Vec<f64> },
    /// Each cell holds its own flat index.
    Ramp,
    /// `offset + sum(coefficients[d] * index[d])`.
    Plane { coefficients: Vec<f64>, offset: f64 },
    Constant { value: f64 },
}

impl ValuesSpec {
    /// Materialize the values for a grid of the given extents.
    pub fn generate(&self, dims: &[usize]) -> Result<Vec<f64>> {
        let count = index::cell_count(dims);
        match self {
            Self::Inline { values } => {
                if values.len() != count {
                    return Err(MosaicError::shape_mismatch(count, values.len()));
                }
                Ok(values.clone())
            }
            Self::Ramp => Ok((0..count).map(|flat| flat as f64).collect()),
            Self::Plane {
                coefficients,
                offset,
            } => {
                if coefficients.len() != dims.len() {
                    return Err(MosaicError::shape_mismatch(dims.len(), coefficients.len()));
                }
                (0..count)
                    .map(|flat| {
                        let idx = index::unflatten(dims, flat)?;
                        Ok(idx
                            .iter()
                            .zip(coefficients)
                            .fold(*offset, |acc, (&i, c)| acc + c * i as f64))
                    })
                    .collect()
            }
            Self::Constant { value } => Ok(vec![*value; count]),
        }
    }
}

/// Contact between two named grids; ranges are inclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactDescription {
    pub grid_a: String,
    pub lo_a: Vec<usize>,
    pub hi_a: Vec<usize>,
    pub grid_b: String,
    pub lo_b: Vec<usize>,
    pub hi_b: Vec<usize>,
}

/// A sample request at continuous index-space coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDescription {
    pub grid: String,
    pub coords: Vec<f64>,
    /// Overrides the configured method for this query.
    #[serde(default)]
    pub method: Option<InterpolationMethod>,
}

/// Outcome of one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub grid: String,
    pub coords: Vec<f64>,
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: i32,
}

impl MosaicDescription {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Define every grid and contact in a fresh context.
    pub fn build(&self) -> Result<BuiltMosaic> {
        let mut context = match &self.interpolation {
            Some(config) => MosaicContext::with_config(config.clone())?,
            None => MosaicContext::new(),
        };
        let mosaic = context.define_mosaic(self.ndims)?;

        let mut grids = BTreeMap::new();
        for desc in &self.grids {
            if grids.contains_key(&desc.name) {
                return Err(MosaicError::Description(format!(
                    "duplicate grid name '{}'",
                    desc.name
                )));
            }
            let grid = context.define_grid(mosaic, &desc.dims, desc.data_type)?;
            if let Some(mask) = &desc.mask {
                context.set_mask(grid, mask.clone())?;
            }
            let data = match &desc.values {
                Some(generator) => {
                    let values = generator.generate(&desc.dims)?;
                    let data = context.define_data(grid)?;
                    context.set_values(data, DataValues::from_f64(desc.data_type, values))?;
                    Some(data)
                }
                None => None,
            };
            grids.insert(desc.name.clone(), NamedGrid { grid, data });
        }

        let mut built = BuiltMosaic {
            context,
            mosaic,
            grids,
        };
        for desc in &self.contacts {
            let contact = Contact {
                grid_a: built.grid_handle(&desc.grid_a)?,
                range_a: IndexRange::new(desc.lo_a.clone(), desc.hi_a.clone())?,
                grid_b: built.grid_handle(&desc.grid_b)?,
                range_b: IndexRange::new(desc.lo_b.clone(), desc.hi_b.clone())?,
            };
            built.context.add_contact(mosaic, contact)?;
        }

        info!(
            mosaic = %mosaic,
            grids = built.grids.len(),
            contacts = self.contacts.len(),
            "Built mosaic from description"
        );
        Ok(built)
    }
}

// ============================================================================
// Built mosaic
// ============================================================================

/// Handles created for one named grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedGrid {
    pub grid: Handle<Grid>,
    pub data: Option<Handle<Data>>,
}

/// A context populated from a [`MosaicDescription`].
pub struct BuiltMosaic {
    pub context: MosaicContext,
    pub mosaic: Handle<Mosaic>,
    pub grids: BTreeMap<String, NamedGrid>,
}

impl BuiltMosaic {
    pub fn grid_handle(&self, name: &str) -> Result<Handle<Grid>> {
        self.named(name).map(|g| g.grid)
    }

    /// The data record of a named grid.
    pub fn data_handle(&self, name: &str) -> Result<Handle<Data>> {
        self.named(name)?.data.ok_or_else(|| {
            MosaicError::Description(format!("grid '{}' has no values", name))
        })
    }

    fn named(&self, name: &str) -> Result<NamedGrid> {
        self.grids
            .get(name)
            .copied()
            .ok_or_else(|| MosaicError::Description(format!("unknown grid '{}'", name)))
    }

    /// Evaluate one query.
    pub fn query(&self, query: &QueryDescription) -> Result<f64> {
        let data = self.data_handle(&query.grid)?;
        let dims = self.context.dims(self.grid_handle(&query.grid)?)?;
        let position = CellPosition::from_coords(dims, &query.coords)?;
        let config = self.context.config();
        self.context.interpolate_with(
            data,
            &position,
            query.method.unwrap_or(config.method),
            config.mask_policy,
        )
    }

    /// Evaluate every query; failures are reported per query.
    pub fn run_queries(&self, queries: &[QueryDescription]) -> Vec<QueryResult> {
        queries
            .iter()
            .map(|q| {
                let result = self.query(q);
                debug!(grid = %q.grid, coords = ?q.coords, ok = result.is_ok(), "Ran query");
                match result {
                    Ok(value) => QueryResult {
                        grid: q.grid.clone(),
                        coords: q.coords.clone(),
                        value: Some(value),
                        error: None,
                        status: STATUS_OK,
                    },
                    Err(e) => QueryResult {
                        grid: q.grid.clone(),
                        coords: q.coords.clone(),
                        value: None,
                        status: e.status_code(),
                        error: Some(e.to_string()),
                    },
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    const TWO_GRIDS: &str = r#"
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
  - { grid: east, coords: [0.2, 0.4], method: nearest }
  - { grid: nowhere, coords: [0.0, 0.0] }
"#;

    #[test]
    fn test_build_two_grids() {
        let desc = MosaicDescription::from_yaml_str(TWO_GRIDS).unwrap();
        let built = desc.build().unwrap();

        assert_eq!(built.context.ngrids(built.mosaic).unwrap(), 2);
        assert_eq!(built.context.ncontacts(built.mosaic).unwrap(), 1);
        let east = built.grid_handle("east").unwrap();
        assert_eq!(built.context.data_type(east).unwrap(), DataType::Float32);
        assert!(built.context.mask_of(east).unwrap().is_some());
    }

    #[test]
    fn test_run_queries() {
        let desc = MosaicDescription::from_yaml_str(TWO_GRIDS).unwrap();
        let built = desc.build().unwrap();
        let results = built.run_queries(&desc.queries);

        assert_eq!(results.len(), 4);
        // 2 + 1.5 + 0.5 * 2.25
        let west = results[0].value.unwrap();
        assert!((west - 4.625).abs() < 1e-12);
        assert_eq!(results[0].status, STATUS_OK);

        // Cell (0,0) of east touches the masked node (1,1).
        assert_eq!(results[1].value, None);
        assert_eq!(results[1].status, ErrorCode::MaskedCell as i32);

        // Nearest node is (0,0).
        assert_eq!(results[2].value, Some(0.0));

        assert_eq!(results[3].status, ErrorCode::Description as i32);
        assert!(results[3].error.as_deref().unwrap_or("").contains("nowhere"));
    }

    #[test]
    fn test_values_spec_generation() {
        let dims = [2, 3];
        assert_eq!(
            ValuesSpec::Ramp.generate(&dims).unwrap(),
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]
        );
        assert_eq!(
            ValuesSpec::Constant { value: 7.5 }.generate(&dims).unwrap(),
            vec![7.5; 6]
        );
        let plane = ValuesSpec::Plane {
            coefficients: vec![10.0, 1.0],
            offset: 0.0,
        };
        assert_eq!(
            plane.generate(&dims).unwrap(),
            vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0]
        );
        assert!(ValuesSpec::Inline { values: vec![1.0] }
            .generate(&dims)
            .is_err());
        let bad_plane = ValuesSpec::Plane {
            coefficients: vec![1.0],
            offset: 0.0,
        };
        assert!(bad_plane.generate(&dims).is_err());
    }

    #[test]
    fn test_duplicate_and_unknown_names() {
        let duplicate = r#"
ndims: 1
grids:
  - { name: a, dims: [3] }
  - { name: a, dims: [4] }
"#;
        let desc = MosaicDescription::from_yaml_str(duplicate).unwrap();
        assert!(matches!(desc.build(), Err(MosaicError::Description(_))));

        let unknown = r#"
ndims: 1
grids:
  - { name: a, dims: [3] }
contacts:
  - { grid_a: a, lo_a: [0], hi_a: [0], grid_b: b, lo_b: [0], hi_b: [0] }
"#;
        let desc = MosaicDescription::from_yaml_str(unknown).unwrap();
        assert!(matches!(desc.build(), Err(MosaicError::Description(_))));
    }

    #[test]
    fn test_grid_without_values_has_no_data() {
        let yaml = "ndims: 1\ngrids:\n  - { name: bare, dims: [5] }\n";
        let built = MosaicDescription::from_yaml_str(yaml)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(built.context.counts(), (1, 1, 0));
        assert!(built.data_handle("bare").is_err());
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(
            MosaicDescription::from_yaml_str("ndims: [oops"),
            Err(MosaicError::Description(_))
        ));
    }

    #[test]
    fn test_interpolation_override() {
        let yaml = r#"
ndims: 1
interpolation:
  method: nearest
grids:
  - { name: line, dims: [4], values: { kind: ramp } }
queries:
  - { grid: line, coords: [1.6] }
"#;
        let desc = MosaicDescription::from_yaml_str(yaml).unwrap();
        let built = desc.build().unwrap();
        assert_eq!(built.context.config().method, InterpolationMethod::Nearest);
        assert_eq!(built.run_queries(&desc.queries)[0].value, Some(2.0));
    }
}

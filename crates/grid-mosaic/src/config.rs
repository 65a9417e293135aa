//! Configuration for sampling and transform checks.

use serde::{Deserialize, Serialize};

use crate::error::{MosaicError, Result};
use crate::types::{InterpolationMethod, MaskPolicy};

/// Configuration for interpolation and Jacobian checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolationConfig {
    /// Sampling method used by `MosaicContext::interpolate`.
    pub method: InterpolationMethod,

    /// Behavior when a required corner is masked.
    pub mask_policy: MaskPolicy,

    /// Determinants with magnitude at or below this are reported as singular
    /// by `MosaicContext::check_grid_transform` and stop the index search in
    /// `MosaicContext::regrid`.
    pub singular_tolerance: f64,

    /// Batch size from which `interpolate_many` runs on the rayon pool.
    pub parallel_threshold: usize,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            method: InterpolationMethod::Multilinear,
            mask_policy: MaskPolicy::Propagate,
            singular_tolerance: 1e-12,
            parallel_threshold: 4096,
        }
    }
}

impl InterpolationConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("MOSAIC_INTERPOLATION") {
            config.method = InterpolationMethod::from_str(&val);
        }

        if let Ok(val) = std::env::var("MOSAIC_MASK_POLICY") {
            config.mask_policy = MaskPolicy::from_str(&val);
        }

        if let Ok(val) = std::env::var("MOSAIC_SINGULAR_TOLERANCE") {
            if let Ok(tolerance) = val.parse() {
                config.singular_tolerance = tolerance;
            }
        }

        if let Ok(val) = std::env::var("MOSAIC_PARALLEL_THRESHOLD") {
            if let Ok(threshold) = val.parse() {
                config.parallel_threshold = threshold;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.singular_tolerance.is_finite() || self.singular_tolerance < 0.0 {
            return Err(MosaicError::Config(
                "singular_tolerance must be finite and >= 0".to_string(),
            ));
        }

        if self.parallel_threshold == 0 {
            return Err(MosaicError::Config(
                "parallel_threshold must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

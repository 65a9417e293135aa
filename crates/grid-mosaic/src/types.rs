//! Core types shared across the mosaic modules.

use serde::{Deserialize, Serialize};

/// Largest supported grid dimensionality.
///
/// Bounds the 3^N neighbor stencil (43 046 721 offsets at 16 dimensions).
pub const MAX_NDIMS: usize = 16;

/// Multidimensional cell coordinate, one entry per dimension.
pub type MultiIndex = Vec<usize>;

/// Relative offset with every entry in {-1, 0, 1}.
pub type CornerVector = Vec<i8>;

/// The kinds of record addressable by handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Mosaic,
    Grid,
    Data,
}

impl ObjectKind {
    /// Tag stored in the high byte of a raw handle.
    pub(crate) fn tag(self) -> u64 {
        match self {
            Self::Mosaic => 1,
            Self::Grid => 2,
            Self::Data => 3,
        }
    }

    pub(crate) fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            1 => Some(Self::Mosaic),
            2 => Some(Self::Grid),
            3 => Some(Self::Data),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mosaic => "mosaic",
            Self::Grid => "grid",
            Self::Data => "data",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Scalar storage kind of a grid's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// 32-bit IEEE float.
    Float32,
    /// 64-bit IEEE float.
    #[default]
    Float64,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What interpolation does when a required corner is masked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskPolicy {
    /// Fail with `MaskedCell` as soon as a required corner is masked.
    #[default]
    Propagate,
    /// Drop masked corners and rescale the remaining weights to sum to one.
    Renormalize,
    /// Return NaN for the sample.
    Nan,
}

impl MaskPolicy {
    /// Parse from string (case-insensitive). Unknown names fall back to `Propagate`.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "renormalize" | "reweight" | "skip" => Self::Renormalize,
            "nan" => Self::Nan,
            _ => Self::Propagate,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Propagate => "propagate",
            Self::Renormalize => "renormalize",
            Self::Nan => "nan",
        }
    }
}

impl std::fmt::Display for MaskPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Interpolation method for sampling a grid at a fractional position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMethod {
    /// Nearest node (preserves exact values).
    Nearest,
    /// Multilinear over the 2^N corners of the enclosing cell.
    #[default]
    Multilinear,
}

impl InterpolationMethod {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "nearest" => Self::Nearest,
            _ => Self::Multilinear,
        }
    }
}

impl std::fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nearest => write!(f, "nearest"),
            Self::Multilinear => write!(f, "multilinear"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_kind_tags() {
        for kind in [ObjectKind::Mosaic, ObjectKind::Grid, ObjectKind::Data] {
            assert_eq!(ObjectKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(ObjectKind::from_tag(0), None);
        assert_eq!(ObjectKind::from_tag(4), None);
    }

    #[test]
    fn test_data_type_names() {
        let parsed: DataType = serde_yaml::from_str("float32").unwrap();
        assert_eq!(parsed, DataType::Float32);
        assert_eq!(DataType::Float64.to_string(), "float64");
        assert!(serde_yaml::from_str::<DataType>("double").is_err());
    }

    #[test]
    fn test_mask_policy_from_str() {
        assert_eq!(MaskPolicy::from_str("RENORMALIZE"), MaskPolicy::Renormalize);
        assert_eq!(MaskPolicy::from_str("skip"), MaskPolicy::Renormalize);
        assert_eq!(MaskPolicy::from_str("nan"), MaskPolicy::Nan);
        assert_eq!(MaskPolicy::from_str("invalid"), MaskPolicy::Propagate);
    }

    #[test]
    fn test_interpolation_method_from_str() {
        assert_eq!(
            InterpolationMethod::from_str("nearest"),
            InterpolationMethod::Nearest
        );
        assert_eq!(
            InterpolationMethod::from_str("LINEAR"),
            InterpolationMethod::Multilinear
        );
        assert_eq!(InterpolationMethod::Multilinear.to_string(), "multilinear");
    }
}

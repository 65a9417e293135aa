//! Error types and numeric status codes for mosaic operations.

use thiserror::Error;

use crate::types::{DataType, ObjectKind};

/// Status code returned for a successful operation.
pub const STATUS_OK: i32 = 0;

/// Errors that can occur while manipulating mosaics, grids and data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MosaicError {
    /// The handle was never issued, has been freed, or names another kind.
    #[error("invalid {kind} handle: {handle:#x}")]
    InvalidHandle { kind: ObjectKind, handle: u64 },

    /// An index lies outside its declared range.
    #[error("index {requested} is out of range (limit {limit})")]
    OutOfRange { requested: String, limit: String },

    /// The interpolation stencil reaches outside the grid.
    #[error("position {requested} is outside grid bounds {grid}")]
    OutOfBounds { requested: String, grid: String },

    /// A required cell is marked invalid by the grid mask.
    #[error("cell {flat} is masked")]
    MaskedCell { flat: usize },

    /// Dimensionality or extents are unusable.
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// Two sequences that must agree in length do not.
    #[error("shape mismatch: expected {expected} elements, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Values were supplied in a precision that differs from the grid's.
    #[error("data type mismatch: grid stores {expected}, got {actual}")]
    TypeMismatch { expected: DataType, actual: DataType },

    /// A fractional position is non-finite or outside `[0, 1)`.
    #[error("invalid position: {0}")]
    InvalidPosition(String),

    /// The record is still referenced and cannot be freed.
    #[error("{kind} handle {handle:#x} is still referenced {references} time(s)")]
    HandleInUse {
        kind: ObjectKind,
        handle: u64,
        references: usize,
    },

    /// A contact record does not fit the grids it joins.
    #[error("invalid contact: {0}")]
    InvalidContact(String),

    /// A data record has no values attached yet.
    #[error("data handle {handle:#x} has no values")]
    MissingValues { handle: u64 },

    /// No more handles can be issued for this kind.
    #[error("{0} registry is full")]
    RegistryFull(ObjectKind),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A mosaic description could not be parsed or built.
    #[error("description error: {0}")]
    Description(String),

    /// The coordinate Jacobian cannot be inverted at the current iterate.
    #[error("singular coordinate transform at {at} (determinant {determinant:e})")]
    SingularTransform { at: String, determinant: f64 },
}

/// Stable numeric codes for [`MosaicError`] variants.
///
/// Zero is reserved for success (see [`STATUS_OK`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    InvalidHandle = 1,
    OutOfRange = 2,
    OutOfBounds = 3,
    MaskedCell = 4,
    InvalidDimensions = 5,
    ShapeMismatch = 6,
    TypeMismatch = 7,
    InvalidPosition = 8,
    HandleInUse = 9,
    InvalidContact = 10,
    MissingValues = 11,
    RegistryFull = 12,
    Config = 13,
    Description = 14,
    SingularTransform = 15,
}

impl ErrorCode {
    /// Look up the code for a raw status value.
    pub fn from_status(status: i32) -> Option<Self> {
        Some(match status {
            1 => Self::InvalidHandle,
            2 => Self::OutOfRange,
            3 => Self::OutOfBounds,
            4 => Self::MaskedCell,
            5 => Self::InvalidDimensions,
            6 => Self::ShapeMismatch,
            7 => Self::TypeMismatch,
            8 => Self::InvalidPosition,
            9 => Self::HandleInUse,
            10 => Self::InvalidContact,
            11 => Self::MissingValues,
            12 => Self::RegistryFull,
            13 => Self::Config,
            14 => Self::Description,
            15 => Self::SingularTransform,
            _ => return None,
        })
    }

    /// The raw status value.
    pub fn status(self) -> i32 {
        self as i32
    }
}

impl MosaicError {
    /// Create an InvalidHandle error.
    pub fn invalid_handle(kind: ObjectKind, handle: u64) -> Self {
        Self::InvalidHandle { kind, handle }
    }

    /// Create an OutOfRange error.
    pub fn out_of_range(requested: impl Into<String>, limit: impl Into<String>) -> Self {
        Self::OutOfRange {
            requested: requested.into(),
            limit: limit.into(),
        }
    }

    /// Create an OutOfBounds error.
    pub fn out_of_bounds(requested: impl Into<String>, grid: impl Into<String>) -> Self {
        Self::OutOfBounds {
            requested: requested.into(),
            grid: grid.into(),
        }
    }

    /// Create an InvalidDimensions error.
    pub fn invalid_dimensions(msg: impl Into<String>) -> Self {
        Self::InvalidDimensions(msg.into())
    }

    /// Create an InvalidPosition error.
    pub fn invalid_position(msg: impl Into<String>) -> Self {
        Self::InvalidPosition(msg.into())
    }

    /// Create an InvalidContact error.
    pub fn invalid_contact(msg: impl Into<String>) -> Self {
        Self::InvalidContact(msg.into())
    }

    /// Create a ShapeMismatch error.
    pub fn shape_mismatch(expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch { expected, actual }
    }

    /// The enumerated code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidHandle { .. } => ErrorCode::InvalidHandle,
            Self::OutOfRange { .. } => ErrorCode::OutOfRange,
            Self::OutOfBounds { .. } => ErrorCode::OutOfBounds,
            Self::MaskedCell { .. } => ErrorCode::MaskedCell,
            Self::InvalidDimensions(_) => ErrorCode::InvalidDimensions,
            Self::ShapeMismatch { .. } => ErrorCode::ShapeMismatch,
            Self::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            Self::InvalidPosition(_) => ErrorCode::InvalidPosition,
            Self::HandleInUse { .. } => ErrorCode::HandleInUse,
            Self::InvalidContact(_) => ErrorCode::InvalidContact,
            Self::MissingValues { .. } => ErrorCode::MissingValues,
            Self::RegistryFull(_) => ErrorCode::RegistryFull,
            Self::Config(_) => ErrorCode::Config,
            Self::Description(_) => ErrorCode::Description,
            Self::SingularTransform { .. } => ErrorCode::SingularTransform,
        }
    }

    /// The nonzero status code for this error.
    pub fn status_code(&self) -> i32 {
        self.code().status()
    }

    /// Whether the caller can reasonably continue (data-quality conditions).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MaskedCell { .. })
    }
}

impl From<serde_yaml::Error> for MosaicError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Description(err.to_string())
    }
}

/// Map a result to its status code, `STATUS_OK` on success.
pub fn status_of<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => STATUS_OK,
        Err(err) => err.status_code(),
    }
}

/// Result type for mosaic operations.
pub type Result<T> = std::result::Result<T, MosaicError>;

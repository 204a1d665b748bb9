//! Common errors across the bruker-opus crate

pub type OpusResult<T> = Result<T, OpusError>;

/// Errors raised while decoding the contents of an Opus file.
///
/// Apart from [`OpusError::ReadError`] (which can only come from reading a file from disk),
/// none of these abort decoding a whole file: they are attached to the block that raised them
/// and that block ends up in the decoded file's parse error bucket.
#[derive(Debug, thiserror::Error)]
pub enum OpusError {
    #[error("Error reading from Opus file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Buffer too short while reading {what}: needed {needed} bytes, {available} available")]
    TooShort{what: &'static str, needed: usize, available: usize},
    #[error("Invalid {pointer_descr} pointer: {inner}")]
    InvalidPointer{pointer_descr: &'static str, inner: OpusPointerError},
    #[error("Length of parameter {key} ({actual} bytes) is too short for its type ({expected} bytes)")]
    ParamLengthMismatch{key: String, expected: usize, actual: usize},
    #[error("Parameter {key} has a negative size ({size} words)")]
    NegativeParamSize{key: String, size: i16},
    #[error("Required parameter '{0}' is missing")]
    MissingParameter(String),
    #[error("Parameter '{key}' has the wrong type: {inner}")]
    ParamType{key: String, inner: OpusTypeError},
    #[error("Invalid data series layout: {0}")]
    InvalidSeries(String),
    #[error("Invalid report layout: {0}")]
    InvalidReport(String),
    #[error("Unsupported block layout: {0}")]
    Unsupported(String),
}

impl OpusError {
    pub(crate) fn too_short(what: &'static str, needed: usize, available: usize) -> Self {
        Self::TooShort { what, needed, available }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OpusPointerError {
    #[error("pointer is negative")]
    Negative,
    #[error("pointer is past the end of the buffer")]
    OutOfBounds,
    #[error("pointer overlaps the file header")]
    OverlapsHeader,
}

#[derive(Debug, thiserror::Error)]
pub enum OpusTypeError {
    #[error("Could not convert Opus parameter value into {expected}, was {actual}")]
    ValueIntoError{expected: String, actual: String}
}

/// Errors converting the x-axis of a data record into other units
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UnitError {
    #[error("x-axis unit conversion is not applicable to {0} data")]
    NotSpectral(String),
    #[error("x-axis unit code '{0}' is not a spectral unit")]
    UnknownUnit(String),
    #[error("record has no x-axis unit (DXU) parameter")]
    MissingUnit,
    #[error("mirror velocity (VEL) is not available for this record")]
    MissingVelocity,
}

/// Errors loading decoding options
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not load decoding options: {0}")]
    Figment(#[from] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(value: figment::Error) -> Self {
        Self::Figment(Box::new(value))
    }
}

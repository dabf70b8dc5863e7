//! Error types for metarray

use crate::types::DType;
use std::borrow::Cow;
use std::io;
use thiserror::Error;

/// Crate result alias
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error raised by any metarray operation
#[derive(Debug, Error)]
pub enum Error {
    /// Flat-format header (or frame record) does not decode to the expected mapping
    #[error("malformed header: {message} at position {position}")]
    MalformedHeader {
        message: Cow<'static, str>,
        position: usize,
    },
    /// No reader exists for the declared format version
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(String),
    /// Lengths or shapes disagree
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("no axis named {0}")]
    UnknownAxis(String),
    #[error("axis {axis} has no column named {column}")]
    UnknownColumn { axis: usize, column: String },
    /// Positional selector used after a named one
    #[error("positional indexes may not follow named indexes")]
    OrderingError,
    #[error("too many selectors: {given} given for {ndim} axes")]
    TooManySelectors { given: usize, ndim: usize },
    #[error("index {index} is out of bounds for axis {axis} with size {len}")]
    IndexOutOfBounds { axis: usize, index: isize, len: usize },
    /// Value range selection on an axis that carries no values
    #[error("axis {0} has no associated values")]
    MissingValues(usize),
    #[error("file declares more than one dynamic axis")]
    MultipleDynamicAxes,
    #[error("dataset can not be memory-mapped: {0}")]
    NotMappable(Cow<'static, str>),
    #[error("mapped data is not aligned for {0}")]
    NotAligned(DType),
    #[error("cannot append to axis info key {0:?}; it is not present in the target file")]
    UnknownAppendKey(String),
    #[error("incompatible options: read_all_data and writable can not both be set")]
    IncompatibleAppendOptions,
    #[error("invalid options: {0}")]
    InvalidOptions(Cow<'static, str>),
    /// Target file was produced by a different format version
    #[error("file was written with format version {found}, expected {expected}; will not modify")]
    VersionConflict { found: String, expected: String },
    #[error("can not decode metadata key {key:?}: {reason}")]
    MetadataDecodeError { key: String, reason: String },
    #[error("{0} support is not available in this build")]
    BackendUnavailable(&'static str),
    #[error("invalid axis info: {0}")]
    InvalidInfo(String),
    #[error("dtype mismatch: expected {expected}, got {actual}")]
    DTypeMismatch { expected: DType, actual: DType },
    #[error("operation not supported for dtype {0}")]
    UnsupportedDType(DType),
    #[error("operation requires a 2-D array, got {0} dimensions")]
    UnsupportedRank(usize),
    #[error("reduction over an empty axis")]
    EmptyReduction,
    #[error("array storage is read-only")]
    ReadOnly,
    /// Structural damage in a container file
    #[error("corrupt container: {message} at offset {offset}")]
    Corrupt {
        message: Cow<'static, str>,
        offset: u64,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn malformed(message: impl Into<Cow<'static, str>>, position: usize) -> Self {
        Error::MalformedHeader {
            message: message.into(),
            position,
        }
    }

    pub(crate) fn corrupt(message: impl Into<Cow<'static, str>>, offset: u64) -> Self {
        Error::Corrupt {
            message: message.into(),
            offset,
        }
    }

    pub(crate) fn shape(message: impl Into<String>) -> Self {
        Error::ShapeMismatch(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offender() {
        let err = Error::UnknownColumn {
            axis: 1,
            column: "rainfall".into(),
        };
        assert_eq!(err.to_string(), "axis 1 has no column named rainfall");

        let err = Error::malformed("expected ':'", 17);
        assert!(err.to_string().contains("position 17"));

        let err = Error::UnknownAppendKey("gain".into());
        assert!(err.to_string().contains("\"gain\""));
    }

    #[test]
    fn test_io_errors_convert() {
        let io = io::Error::new(io::ErrorKind::UnexpectedEof, "short read");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}

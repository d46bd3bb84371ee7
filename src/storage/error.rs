//! Metric log error types
//!
//! Storage faults are always propagated to the caller. Codec errors describe
//! a single line that could not be decoded; the engine logs and drops those
//! lines instead of failing the whole read.

use thiserror::Error;

/// Errors raised while encoding or decoding a single metric line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Leading tag is neither a process nor a flow node tag
    #[error("Unrecognized record tag: {0:?}")]
    UnknownTag(String),

    /// Line has fewer columns than its layout requires
    #[error("Missing column {index} ({name}) in {tag} line")]
    MissingField {
        tag: &'static str,
        index: usize,
        name: &'static str,
    },

    /// Timestamp column is not ISO-8601
    #[error("Invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp { value: String, reason: String },

    /// Measurement point name outside the closed set
    #[error("Unknown measurement point: {0:?}")]
    UnknownMeasurementPoint(String),

    /// Payload column is not valid JSON
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// A field to be written contains a column or line delimiter
    #[error("Field {field} contains a reserved character: {value:?}")]
    ReservedCharacter { field: &'static str, value: String },
}

/// Errors that can occur in the metric log engine
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Process model id cannot be used as a file name
    #[error("Invalid process model id: {0:?}")]
    InvalidModelId(String),
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

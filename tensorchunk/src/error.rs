//! Error types for chunk storage, engines and merge

use std::io;

use tensorchunk_core::{Dtype, FormatError};
use thiserror::Error;

/// Errors raised by the chunk storage engine
#[derive(Debug, Error)]
pub enum Error {
    /// Key is absent from the storage provider
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Write attempted against a read-only provider
    #[error("storage is read-only: {0}")]
    ReadOnly(String),

    /// Storage backend failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Pipeline output was not a map of tensor name to samples
    #[error("invalid transform output: {0}")]
    InvalidTransformOutput(String),

    /// Non-linked sample appended to a linked tensor
    #[error("linked tensors only accept linked samples, got {0}")]
    LinkedSampleType(&'static str),

    /// Sample kind not accepted where it was used
    #[error("expected a {expected} sample, got {actual}")]
    SampleKind {
        /// Accepted kind
        expected: &'static str,
        /// Kind received
        actual: &'static str,
    },

    /// In-place update not supported by the chunk strategy
    #[error("update not supported: {0}")]
    UnsupportedUpdate(&'static str),

    /// Sample larger than a chunk while tiling is disabled
    #[error("sample of {size} bytes exceeds max chunk size {max}")]
    SampleTooLarge {
        /// Serialized sample size
        size: u64,
        /// Chunk capacity
        max: u64,
    },

    /// Known-incomplete feature
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// Workers disagree on dtype during merge
    #[error("dtype mismatch: expected {expected}, got {actual}")]
    DtypeMismatch {
        /// Dtype of the destination
        expected: Dtype,
        /// Dtype found in the worker
        actual: Dtype,
    },

    /// Workers disagree on sample rank during merge
    #[error("shape rank mismatch: expected {expected}, got {actual}")]
    ShapeRankMismatch {
        /// Rank of the destination
        expected: usize,
        /// Rank found in the worker
        actual: usize,
    },

    /// Sample shape does not fit the tensor
    #[error("invalid shape: expected {expected:?}, got {actual:?}")]
    InvalidShape {
        /// Expected shape
        expected: Vec<usize>,
        /// Actual shape
        actual: Vec<usize>,
    },

    /// Codec failure
    #[error("compression error: {0}")]
    Compression(String),

    /// Sample index past the end of the tensor
    #[error("index {index} out of bounds for tensor of length {length}")]
    IndexOutOfBounds {
        /// Requested index
        index: u64,
        /// Tensor length
        length: u64,
    },

    /// Index entry and chunk id encoder disagree
    #[error("corrupted index: {0}")]
    CorruptedIndex(String),

    /// Credential key not registered
    #[error("unknown credentials key: {0}")]
    UnknownCreds(String),

    /// No decoder can handle the media at a path
    #[error("media decode error: {0}")]
    Media(String),

    /// Configuration rejected
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Layout or encoder error from the core crate
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON metadata error
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for chunk storage operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error only means a missing key
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::KeyNotFound(_))
    }
}

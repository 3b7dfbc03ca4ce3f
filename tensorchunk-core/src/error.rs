//! Error types for chunk layout and encoder operations

/// Errors that can occur while encoding, decoding or validating chunk layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    /// Invalid encoder header
    InvalidHeader,
    /// Index out of bounds
    IndexOutOfBounds,
    /// Unsupported format version
    UnsupportedFormat,
    /// Chunk name is not a valid hex identifier
    InvalidChunkName,
    /// Data corruption detected
    CorruptedData,
    /// Insufficient buffer space
    InsufficientBuffer,
    /// Byte range start is past its end
    InvalidRange,
    /// Byte length not aligned to element size
    ArrayAlignment,
    /// Size calculation would overflow
    ArraySizeOverflow,
    /// Shape text could not be parsed
    InvalidShape,
    /// Dtype tag is unknown
    UnknownDtype,
    /// Operation on an encoder without rows
    EmptyEncoder,
    /// Tile relationships cannot be recovered from a bare identifier
    NotImplemented,
}

impl core::fmt::Display for FormatError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            FormatError::InvalidHeader => "Invalid encoder header",
            FormatError::IndexOutOfBounds => "Index out of bounds",
            FormatError::UnsupportedFormat => "Unsupported format version",
            FormatError::InvalidChunkName => "Invalid chunk name",
            FormatError::CorruptedData => "Data corruption detected",
            FormatError::InsufficientBuffer => "Insufficient buffer space",
            FormatError::InvalidRange => "Invalid byte range",
            FormatError::ArrayAlignment => "Byte length not aligned to element size",
            FormatError::ArraySizeOverflow => "Array size overflow",
            FormatError::InvalidShape => "Invalid shape",
            FormatError::UnknownDtype => "Unknown dtype",
            FormatError::EmptyEncoder => "Encoder has no rows",
            FormatError::NotImplemented => {
                "Tile detection from a bare chunk id is not implemented; use a tile registry"
            }
        };
        write!(f, "{msg}")
    }
}

impl core::error::Error for FormatError {}

/// Result type for core format operations
pub type Result<T> = core::result::Result<T, FormatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_as_error_source() {
        let err: &dyn core::error::Error = &FormatError::EmptyEncoder;
        assert!(err.source().is_none());
        assert_eq!(std::format!("{}", FormatError::InvalidRange), "Invalid byte range");
    }
}

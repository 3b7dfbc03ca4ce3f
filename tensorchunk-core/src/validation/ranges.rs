//! Byte range and chunk capacity checks

use crate::{FormatError, Result};

/// Validate a `[start, end)` range against a buffer of `total_size` bytes
pub const fn validate_byte_range(start: usize, end: usize, total_size: usize) -> Result<()> {
    if start > end {
        return Err(FormatError::InvalidRange);
    }

    if end > total_size {
        return Err(FormatError::IndexOutOfBounds);
    }

    Ok(())
}

/// Whether a payload of `len` bytes fits a chunk already holding `used` bytes
///
/// A payload that lands exactly on the capacity fits.
pub const fn fits_in_chunk(used: u64, len: u64, max_chunk_size: u64) -> bool {
    match used.checked_add(len) {
        Some(total) => total <= max_chunk_size,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_byte_range() {
        assert_eq!(validate_byte_range(0, 10, 20), Ok(()));
        assert_eq!(validate_byte_range(0, 20, 20), Ok(()));
        assert_eq!(validate_byte_range(10, 10, 20), Ok(()));

        assert_eq!(validate_byte_range(15, 10, 20), Err(FormatError::InvalidRange));
        assert_eq!(validate_byte_range(0, 25, 20), Err(FormatError::IndexOutOfBounds));
    }

    #[test]
    fn test_fits_in_chunk() {
        assert!(fits_in_chunk(0, 100, 300));
        assert!(fits_in_chunk(100, 200, 300));
        assert!(!fits_in_chunk(100, 250, 300));
        assert!(!fits_in_chunk(0, 301, 300));
        assert!(!fits_in_chunk(u64::MAX, 1, u64::MAX));
    }
}

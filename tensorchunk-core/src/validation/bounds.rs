//! Array bounds validation for typed sample payloads

use crate::{Dtype, FormatError, Result};

/// Number of elements a byte length holds for `dtype`
///
/// Fails when the length is not a whole number of elements.
pub const fn validate_array_bounds(byte_len: usize, dtype: Dtype) -> Result<usize> {
    let element_size = dtype.size_bytes();

    if byte_len % element_size != 0 {
        return Err(FormatError::ArrayAlignment);
    }

    let count = byte_len / element_size;

    // Reject counts that would overflow byte arithmetic downstream
    if count > usize::MAX / 8 {
        return Err(FormatError::ArraySizeOverflow);
    }

    Ok(count)
}

/// Product of a shape's dimensions with overflow protection
///
/// The empty shape (a scalar) holds one element.
pub fn num_elements(shape: &[usize]) -> Result<usize> {
    shape.iter().try_fold(1usize, |acc, dim| {
        acc.checked_mul(*dim).ok_or(FormatError::ArraySizeOverflow)
    })
}

/// Check that `byte_len` is exactly a `shape` array of `dtype`
pub fn validate_shape_bytes(shape: &[usize], dtype: Dtype, byte_len: usize) -> Result<()> {
    let expected = num_elements(shape)?;
    if validate_array_bounds(byte_len, dtype)? != expected {
        return Err(FormatError::InvalidShape);
    }
    Ok(())
}

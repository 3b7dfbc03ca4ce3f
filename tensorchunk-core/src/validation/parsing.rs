//! Parsing helpers for command-line arguments
//!
//! Pure string parsing with no std dependency.

#[cfg(feature = "alloc")]
use alloc::vec::Vec;
use core::ops::Range;

use crate::{FormatError, Result};

/// Parse a range string in the format "start:end" or "start-end"
pub fn parse_range(range_str: &str) -> Result<Range<usize>> {
    if range_str.is_empty() {
        return Err(FormatError::InvalidRange);
    }

    let split = range_str
        .find(':')
        .or_else(|| range_str.find('-'))
        .ok_or(FormatError::InvalidRange)?;

    let start = parse_usize(&range_str[..split])?;
    let end = parse_usize(&range_str[split + 1..])?;

    if start > end {
        return Err(FormatError::InvalidRange);
    }

    Ok(start..end)
}

/// Parse a usize from a string with error handling
fn parse_usize(s: &str) -> Result<usize> {
    if s.is_empty() {
        return Err(FormatError::InvalidRange);
    }

    let mut result: usize = 0;

    for byte in s.bytes() {
        if !byte.is_ascii_digit() {
            return Err(FormatError::InvalidRange);
        }

        let digit = (byte - b'0') as usize;

        if result > (usize::MAX - digit) / 10 {
            return Err(FormatError::ArraySizeOverflow);
        }

        result = result * 10 + digit;
    }

    Ok(result)
}

/// Parse a shape such as "3,4", "(3, 4)" or "(3,)"; "()" is a scalar
#[cfg(feature = "alloc")]
pub fn parse_shape(shape_str: &str) -> Result<Vec<usize>> {
    let trimmed = shape_str.trim();
    let inner = trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(trimmed);

    let mut shape = Vec::new();
    for part in inner.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        shape.push(parse_usize(part).map_err(|_| FormatError::InvalidShape)?);
    }
    Ok(shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("0:10"), Ok(0..10));
        assert_eq!(parse_range("100:200"), Ok(100..200));
        assert_eq!(parse_range("5-15"), Ok(5..15));

        assert_eq!(parse_range(""), Err(FormatError::InvalidRange));
        assert_eq!(parse_range("10:5"), Err(FormatError::InvalidRange));
        assert_eq!(parse_range("abc:def"), Err(FormatError::InvalidRange));
        assert_eq!(parse_range("10"), Err(FormatError::InvalidRange));
        assert_eq!(parse_range("10:"), Err(FormatError::InvalidRange));
        assert_eq!(parse_range(":10"), Err(FormatError::InvalidRange));
    }

    #[test]
    fn test_parse_usize() {
        assert_eq!(parse_usize("0"), Ok(0));
        assert_eq!(parse_usize("999999"), Ok(999999));
        assert_eq!(parse_usize("12a"), Err(FormatError::InvalidRange));
        assert_eq!(parse_usize("-123"), Err(FormatError::InvalidRange));
    }

    #[test]
    fn test_parse_shape() {
        assert_eq!(parse_shape("3,4"), Ok(vec![3, 4]));
        assert_eq!(parse_shape("(3, 4)"), Ok(vec![3, 4]));
        assert_eq!(parse_shape("(3,)"), Ok(vec![3]));
        assert_eq!(parse_shape("()"), Ok(vec![]));
        assert_eq!(parse_shape("(a, 4)"), Err(FormatError::InvalidShape));
    }
}

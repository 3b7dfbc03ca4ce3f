//! Binary layout for persisted run-length encoders
//!
//! Encoders are stored as a fixed 16-byte header followed by `row_count`
//! rows of `(value u64 LE, cumulative u64 LE)`. Cumulative counts must be
//! non-decreasing; anything else is rejected as corrupted.

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use super::constants::row_table::*;
use super::constants::MAX_ROW_COUNT;
use crate::{FormatError, Result};

/// Fixed-size row table header (16 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowTableHeader {
    /// Magic bytes identifying the encoder kind
    pub magic: [u8; 4],
    /// Version number (1)
    pub version: u8,
    /// Kind tag, reserved for sharded encoders (0 = unsharded)
    pub kind: u8,
    /// Padding for alignment
    pub _padding: [u8; 2],
    /// Number of rows following the header
    pub row_count: u64,
}

impl RowTableHeader {
    /// Create a header for `row_count` rows
    pub const fn new(magic: [u8; 4], row_count: u64) -> Self {
        Self {
            magic,
            version: VERSION,
            kind: 0,
            _padding: [0; 2],
            row_count,
        }
    }

    /// Parse a header and check it carries the expected magic
    pub const fn from_bytes(bytes: &[u8], expected_magic: [u8; 4]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(FormatError::InsufficientBuffer);
        }

        if bytes[0] != expected_magic[0]
            || bytes[1] != expected_magic[1]
            || bytes[2] != expected_magic[2]
            || bytes[3] != expected_magic[3]
        {
            return Err(FormatError::InvalidHeader);
        }

        let version = bytes[4];
        if version > VERSION {
            return Err(FormatError::UnsupportedFormat);
        }

        let row_count = u64::from_le_bytes([
            bytes[8], bytes[9], bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
        ]);
        if row_count > MAX_ROW_COUNT {
            return Err(FormatError::CorruptedData);
        }

        Ok(Self {
            magic: expected_magic,
            version,
            kind: bytes[5],
            _padding: [0; 2],
            row_count,
        })
    }

    /// Convert header to bytes
    pub const fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];

        bytes[0] = self.magic[0];
        bytes[1] = self.magic[1];
        bytes[2] = self.magic[2];
        bytes[3] = self.magic[3];
        bytes[4] = self.version;
        bytes[5] = self.kind;
        // Padding bytes 6-7 already zeroed

        let count = self.row_count.to_le_bytes();
        let mut i = 0;
        while i < 8 {
            bytes[8 + i] = count[i];
            i += 1;
        }

        bytes
    }

    /// Total encoded size including rows
    pub const fn total_size(&self) -> usize {
        HEADER_SIZE + self.row_count as usize * ROW_SIZE
    }
}

/// Encode `(value, cumulative)` rows behind a header with `magic`
#[cfg(feature = "alloc")]
pub fn encode_rows(magic: [u8; 4], rows: &[(u64, u64)]) -> Vec<u8> {
    let header = RowTableHeader::new(magic, rows.len() as u64);
    let mut bytes = Vec::with_capacity(header.total_size());
    bytes.extend_from_slice(&header.to_bytes());
    for &(value, cumulative) in rows {
        bytes.extend_from_slice(&value.to_le_bytes());
        bytes.extend_from_slice(&cumulative.to_le_bytes());
    }
    bytes
}

/// Decode rows written by [`encode_rows`]
#[cfg(feature = "alloc")]
pub fn decode_rows(magic: [u8; 4], bytes: &[u8]) -> Result<Vec<(u64, u64)>> {
    let header = RowTableHeader::from_bytes(bytes, magic)?;
    if bytes.len() != header.total_size() {
        return Err(FormatError::CorruptedData);
    }

    let mut rows = Vec::with_capacity(header.row_count as usize);
    let mut previous = 0u64;
    for row in bytes[HEADER_SIZE..].chunks_exact(ROW_SIZE) {
        let mut value = [0u8; 8];
        let mut cumulative = [0u8; 8];
        value.copy_from_slice(&row[..8]);
        cumulative.copy_from_slice(&row[8..]);
        let cumulative = u64::from_le_bytes(cumulative);
        if cumulative < previous {
            return Err(FormatError::CorruptedData);
        }
        previous = cumulative;
        rows.push((u64::from_le_bytes(value), cumulative));
    }
    Ok(rows)
}

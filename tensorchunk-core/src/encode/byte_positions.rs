//! Per-chunk byte range header
//!
//! Records `(start_byte, end_byte)` for every sample of a chunk in insertion
//! order. Consecutive samples with the same byte length share one row of
//! `(num_bytes, start_byte, cumulative)`.

use alloc::vec::Vec;

use crate::{FormatError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ByteRow {
    num_bytes: u64,
    start_byte: u64,
    cumulative: u64,
}

/// Run-length encoded byte ranges of the samples in one chunk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BytePositionsEncoder {
    rows: Vec<ByteRow>,
}

impl BytePositionsEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the byte length of each sample in order
    pub fn from_sizes<I: IntoIterator<Item = u64>>(sizes: I) -> Self {
        let mut encoder = Self::new();
        for size in sizes {
            encoder.register_samples(size, 1);
        }
        encoder
    }

    /// Number of samples recorded
    pub fn num_samples(&self) -> u64 {
        self.rows.last().map(|r| r.cumulative).unwrap_or(0)
    }

    /// Number of bytes covered by all samples; equals the chunk buffer length
    pub fn total_bytes(&self) -> u64 {
        match self.rows.last() {
            Some(row) => {
                let start_index = self.row_start_index(self.rows.len() - 1);
                row.start_byte + row.num_bytes * (row.cumulative - start_index)
            }
            None => 0,
        }
    }

    /// Record `count` samples of `num_bytes` each
    pub fn register_samples(&mut self, num_bytes: u64, count: u64) {
        if count == 0 {
            return;
        }
        let total = self.num_samples() + count;
        if let Some(last) = self.rows.last_mut() {
            if last.num_bytes == num_bytes {
                last.cumulative = total;
                return;
            }
        }
        let start_byte = self.total_bytes();
        self.rows.push(ByteRow {
            num_bytes,
            start_byte,
            cumulative: total,
        });
    }

    fn row_start_index(&self, row: usize) -> u64 {
        if row == 0 {
            0
        } else {
            self.rows[row - 1].cumulative
        }
    }

    /// `(start_byte, end_byte)` of the sample at `local_index`
    pub fn get(&self, local_index: u64) -> Result<(u64, u64)> {
        let row = self.rows.partition_point(|r| r.cumulative <= local_index);
        let entry = self.rows.get(row).ok_or(FormatError::IndexOutOfBounds)?;
        let offset = local_index - self.row_start_index(row);
        let start = entry.start_byte + offset * entry.num_bytes;
        Ok((start, start + entry.num_bytes))
    }

    /// Byte length of every sample in order
    pub fn sizes(&self) -> Vec<u64> {
        let mut sizes = Vec::with_capacity(self.num_samples() as usize);
        for (i, row) in self.rows.iter().enumerate() {
            let count = row.cumulative - self.row_start_index(i);
            sizes.extend(core::iter::repeat(row.num_bytes).take(count as usize));
        }
        sizes
    }

    /// Change the byte length of one sample, shifting every later range
    pub fn set_num_bytes(&mut self, local_index: u64, num_bytes: u64) -> Result<()> {
        let mut sizes = self.sizes();
        let slot = sizes
            .get_mut(local_index as usize)
            .ok_or(FormatError::IndexOutOfBounds)?;
        *slot = num_bytes;
        *self = Self::from_sizes(sizes);
        Ok(())
    }
}

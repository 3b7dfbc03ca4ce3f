//! Global mapping from sample index to the chunks holding it
//!
//! Rows are `(chunk_id, cumulative_sample_count)`. Row `i` owns samples
//! `[cum(i - 1), cum(i))`. A sample tiled across several chunks shows up as
//! consecutive rows sharing one cumulative count, and every one of those rows
//! owns it.

use alloc::vec::Vec;

use crate::chunk_id::ChunkId;
use crate::format::constants::row_table::CHUNK_IDS_MAGIC;
use crate::format::{decode_rows, encode_rows};
use crate::{FormatError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkIdEncoder {
    rows: Vec<(ChunkId, u64)>,
}

impl ChunkIdEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw rows, validating monotonic cumulative counts
    pub fn from_rows(rows: Vec<(ChunkId, u64)>) -> Result<Self> {
        let mut previous = 0;
        for (_, cumulative) in &rows {
            if *cumulative < previous {
                return Err(FormatError::CorruptedData);
            }
            previous = *cumulative;
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[(ChunkId, u64)] {
        &self.rows
    }

    /// Total number of samples registered
    pub fn num_samples(&self) -> u64 {
        self.rows.last().map(|(_, c)| *c).unwrap_or(0)
    }

    /// Number of chunk rows, tile chunks included
    pub fn num_chunks(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last_chunk_id(&self) -> Option<ChunkId> {
        self.rows.last().map(|(id, _)| *id)
    }

    /// Iterate chunk ids in storage order
    pub fn chunk_ids(&self) -> impl Iterator<Item = ChunkId> + '_ {
        self.rows.iter().map(|(id, _)| *id)
    }

    /// Open a new chunk holding the next `count` samples
    pub fn register_chunk_with_samples(&mut self, id: ChunkId, count: u64) {
        let cumulative = self.num_samples() + count;
        self.rows.push((id, cumulative));
    }

    /// Record a tile chunk that shares the last registered sample
    pub fn register_tile_chunk(&mut self, id: ChunkId) -> Result<()> {
        let cumulative = match self.rows.last() {
            Some((_, c)) if *c > 0 => *c,
            _ => return Err(FormatError::EmptyEncoder),
        };
        self.rows.push((id, cumulative));
        Ok(())
    }

    /// Grow the last chunk by `count` samples
    pub fn register_samples(&mut self, count: u64) -> Result<()> {
        let last = self.rows.last_mut().ok_or(FormatError::EmptyEncoder)?;
        last.1 += count;
        Ok(())
    }

    fn row_start(&self, row: usize) -> u64 {
        if row == 0 {
            0
        } else {
            self.rows[row - 1].1
        }
    }

    /// Index of the first row owning sample `index`
    pub fn row_of(&self, index: u64) -> Result<usize> {
        let row = self.rows.partition_point(|(_, c)| *c <= index);
        if row >= self.rows.len() {
            return Err(FormatError::IndexOutOfBounds);
        }
        Ok(row)
    }

    /// Every chunk holding sample `index`, in tile order
    pub fn chunk_ids_for(&self, index: u64) -> Result<Vec<ChunkId>> {
        let row = self.row_of(index)?;
        let cumulative = self.rows[row].1;
        Ok(self.rows[row..]
            .iter()
            .take_while(|(_, c)| *c == cumulative)
            .map(|(id, _)| *id)
            .collect())
    }

    /// Position of sample `index` inside its (first) chunk
    pub fn local_index(&self, index: u64) -> Result<u64> {
        let row = self.row_of(index)?;
        Ok(index - self.row_start(row))
    }

    /// Number of samples whose first chunk is at `row`; zero for tile rows
    pub fn samples_in_row(&self, row: usize) -> Result<u64> {
        let (_, cumulative) = self.rows.get(row).ok_or(FormatError::IndexOutOfBounds)?;
        Ok(cumulative - self.row_start(row))
    }

    /// Append rows of `other` with their counts shifted by `offset`
    pub fn extend_shifted(&mut self, other: &ChunkIdEncoder, offset: u64) -> Result<()> {
        if offset < self.num_samples() {
            return Err(FormatError::CorruptedData);
        }
        self.rows
            .extend(other.rows.iter().map(|(id, c)| (*id, c + offset)));
        Ok(())
    }

    /// Fold row `row` into the row before it; the earlier chunk absorbs the
    /// later chunk's samples
    pub fn coalesce_into_previous(&mut self, row: usize) -> Result<()> {
        if row == 0 || row >= self.rows.len() {
            return Err(FormatError::IndexOutOfBounds);
        }
        let (_, cumulative) = self.rows.remove(row);
        self.rows[row - 1].1 = cumulative;
        Ok(())
    }

    /// Persisted row table form
    pub fn to_bytes(&self) -> Vec<u8> {
        let rows: Vec<(u64, u64)> = self.rows.iter().map(|(id, c)| (id.value(), *c)).collect();
        encode_rows(CHUNK_IDS_MAGIC, &rows)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let rows = decode_rows(CHUNK_IDS_MAGIC, bytes)?;
        Ok(Self {
            rows: rows.into_iter().map(|(id, c)| (ChunkId(id), c)).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn encoder() -> ChunkIdEncoder {
        let mut encoder = ChunkIdEncoder::new();
        encoder.register_chunk_with_samples(ChunkId(0xa), 2);
        encoder.register_samples(1).unwrap();
        encoder.register_chunk_with_samples(ChunkId(0xb), 1);
        encoder.register_tile_chunk(ChunkId(0xc)).unwrap();
        encoder.register_chunk_with_samples(ChunkId(0xd), 4);
        encoder
    }

    #[test]
    fn test_lookup() {
        let encoder = encoder();
        assert_eq!(encoder.num_samples(), 8);
        assert_eq!(encoder.num_chunks(), 4);
        assert_eq!(encoder.chunk_ids_for(0), Ok(vec![ChunkId(0xa)]));
        assert_eq!(encoder.chunk_ids_for(2), Ok(vec![ChunkId(0xa)]));
        assert_eq!(encoder.local_index(2), Ok(2));
        assert_eq!(encoder.chunk_ids_for(3), Ok(vec![ChunkId(0xb), ChunkId(0xc)]));
        assert_eq!(encoder.local_index(3), Ok(0));
        assert_eq!(encoder.chunk_ids_for(4), Ok(vec![ChunkId(0xd)]));
        assert_eq!(encoder.local_index(7), Ok(3));
        assert_eq!(encoder.chunk_ids_for(8), Err(FormatError::IndexOutOfBounds));
        assert_eq!(encoder.samples_in_row(2), Ok(0));
    }

    #[test]
    fn test_register_on_empty() {
        let mut encoder = ChunkIdEncoder::new();
        assert_eq!(encoder.register_samples(1), Err(FormatError::EmptyEncoder));
        assert_eq!(encoder.register_tile_chunk(ChunkId(1)), Err(FormatError::EmptyEncoder));
        assert_eq!(encoder.last_chunk_id(), None);
    }

    #[test]
    fn test_extend_shifted() {
        let mut first = ChunkIdEncoder::from_rows(vec![(ChunkId(1), 3), (ChunkId(2), 5)]).unwrap();
        let second = ChunkIdEncoder::from_rows(vec![(ChunkId(3), 2), (ChunkId(4), 6)]).unwrap();
        first.extend_shifted(&second, 5).unwrap();
        assert_eq!(
            first.rows(),
            &[(ChunkId(1), 3), (ChunkId(2), 5), (ChunkId(3), 7), (ChunkId(4), 11)]
        );
        assert_eq!(first.extend_shifted(&second, 4), Err(FormatError::CorruptedData));
    }

    #[test]
    fn test_coalesce_into_previous() {
        let mut encoder =
            ChunkIdEncoder::from_rows(vec![(ChunkId(1), 3), (ChunkId(2), 5), (ChunkId(3), 9)])
                .unwrap();
        encoder.coalesce_into_previous(1).unwrap();
        assert_eq!(encoder.rows(), &[(ChunkId(1), 5), (ChunkId(3), 9)]);
        assert_eq!(encoder.chunk_ids_for(4), Ok(vec![ChunkId(1)]));
        assert_eq!(encoder.local_index(4), Ok(4));
        assert_eq!(encoder.coalesce_into_previous(0), Err(FormatError::IndexOutOfBounds));
    }

    #[test]
    fn test_persisted_form() {
        let encoder = encoder();
        let bytes = encoder.to_bytes();
        assert_eq!(&bytes[..4], b"CIDX");
        assert_eq!(ChunkIdEncoder::from_bytes(&bytes), Ok(encoder));
    }
}

//! Per-chunk shape header
//!
//! Shapes are recorded per sample in insertion order; runs of samples with an
//! identical shape share one row, which keeps fixed-shape tensors at a single
//! row per chunk.

use alloc::vec::Vec;

use super::runs::Runs;
use crate::Result;

/// Run-length encoded shapes of the samples in one chunk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShapesEncoder {
    runs: Runs<Vec<usize>>,
}

impl ShapesEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_samples(&self) -> u64 {
        self.runs.num_samples()
    }

    /// Record `count` samples of `shape`
    pub fn register_samples(&mut self, shape: &[usize], count: u64) {
        self.runs.push(shape.to_vec(), count);
    }

    /// Shape of the sample at `local_index`
    pub fn get(&self, local_index: u64) -> Result<&[usize]> {
        self.runs.get(local_index).map(Vec::as_slice)
    }

    /// Replace the shape of one sample
    pub fn set(&mut self, local_index: u64, shape: &[usize]) -> Result<()> {
        self.runs.set(local_index, shape.to_vec())
    }

    /// Number of distinct runs
    pub fn num_rows(&self) -> usize {
        self.runs.rows().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FormatError;

    #[test]
    fn test_fixed_shape_single_row() {
        let mut shapes = ShapesEncoder::new();
        shapes.register_samples(&[28, 28], 3);
        shapes.register_samples(&[28, 28], 2);
        assert_eq!(shapes.num_rows(), 1);
        assert_eq!(shapes.get(4), Ok(&[28usize, 28][..]));
    }

    #[test]
    fn test_ragged_shapes() {
        let mut shapes = ShapesEncoder::new();
        shapes.register_samples(&[1], 1);
        shapes.register_samples(&[3, 2], 1);
        shapes.set(0, &[5]).unwrap();
        assert_eq!(shapes.get(0), Ok(&[5usize][..]));
        assert_eq!(shapes.get(1), Ok(&[3usize, 2][..]));
        assert_eq!(shapes.get(2), Err(FormatError::IndexOutOfBounds));
    }
}

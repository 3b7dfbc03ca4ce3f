//! Sample and sub-sample indexing
//!
//! An [`Index`] is a list of per-dimension entries. The first entry selects
//! samples of the tensor; the rest sub-select inside each sample. Slices
//! follow Python semantics: negative bounds count from the end and bounds
//! are clamped.

use crate::error::{Error, Result};

/// One dimension of an index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimIndex {
    /// Single position; the dimension is dropped from the result
    Int(i64),
    /// Strided range; `None` bounds default to the full extent
    Slice {
        start: Option<i64>,
        stop: Option<i64>,
        step: i64,
    },
}

impl DimIndex {
    /// The full extent of a dimension
    pub const fn full() -> Self {
        DimIndex::Slice {
            start: None,
            stop: None,
            step: 1,
        }
    }

    /// `start..stop` with unit step
    pub const fn range(start: i64, stop: i64) -> Self {
        DimIndex::Slice {
            start: Some(start),
            stop: Some(stop),
            step: 1,
        }
    }

    /// Positions selected in a dimension of length `len`, in selection order
    pub fn positions(&self, len: usize) -> Result<Vec<usize>> {
        match *self {
            DimIndex::Int(i) => Ok(vec![normalize_int(i, len)?]),
            DimIndex::Slice { start, stop, step } => {
                let slice = SliceIndices::resolve(start, stop, step, len)?;
                Ok(slice.iter().collect())
            }
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, DimIndex::Int(_))
    }
}

/// Resolve a possibly negative position against `len`
pub fn normalize_int(index: i64, len: usize) -> Result<usize> {
    let len_i = len as i64;
    let resolved = if index < 0 { index + len_i } else { index };
    if resolved < 0 || resolved >= len_i {
        return Err(Error::IndexOutOfBounds {
            index: index.unsigned_abs(),
            length: len as u64,
        });
    }
    Ok(resolved as usize)
}

/// Concrete slice bounds after clamping, as `slice.indices(len)` yields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceIndices {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl SliceIndices {
    pub fn resolve(start: Option<i64>, stop: Option<i64>, step: i64, len: usize) -> Result<Self> {
        if step == 0 {
            return Err(Error::Format(tensorchunk_core::FormatError::InvalidRange));
        }
        let len = len as i64;
        let clamp = |bound: i64, low: i64, high: i64| {
            let bound = if bound < 0 { bound + len } else { bound };
            bound.clamp(low, high)
        };

        let (start, stop) = if step > 0 {
            (
                start.map_or(0, |s| clamp(s, 0, len)),
                stop.map_or(len, |s| clamp(s, 0, len)),
            )
        } else {
            (
                start.map_or(len - 1, |s| clamp(s, -1, len - 1)),
                stop.map_or(-1, |s| clamp(s, -1, len - 1)),
            )
        };
        Ok(Self { start, stop, step })
    }

    /// Number of positions selected
    pub fn len(&self) -> usize {
        let (span, step) = if self.step > 0 {
            (self.stop - self.start, self.step)
        } else {
            (self.start - self.stop, -self.step)
        };
        if span <= 0 {
            0
        } else {
            ((span + step - 1) / step) as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> {
        let Self { start, step, .. } = *self;
        (0..self.len() as i64).map(move |k| (start + k * step) as usize)
    }
}

/// Ascending frame window handed to a media decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameWindow {
    pub start: usize,
    pub stop: usize,
    pub step: usize,
    /// Frames must be returned in descending order
    pub reverse: bool,
}

impl FrameWindow {
    pub fn num_frames(&self) -> usize {
        if self.stop <= self.start {
            0
        } else {
            (self.stop - self.start).div_ceil(self.step)
        }
    }
}

/// Turn an optional frame sub-index into an ascending decode window
///
/// Negative steps select the same frames as the mirrored ascending window,
/// flagged for reversal.
pub fn normalize_frame_index(index: Option<&DimIndex>, num_frames: usize) -> Result<FrameWindow> {
    match index {
        None => Ok(FrameWindow {
            start: 0,
            stop: num_frames,
            step: 1,
            reverse: false,
        }),
        Some(DimIndex::Int(i)) => {
            let frame = normalize_int(*i, num_frames)?;
            Ok(FrameWindow {
                start: frame,
                stop: frame + 1,
                step: 1,
                reverse: false,
            })
        }
        Some(DimIndex::Slice { start, stop, step }) => {
            let slice = SliceIndices::resolve(*start, *stop, *step, num_frames)?;
            if slice.step > 0 {
                return Ok(FrameWindow {
                    start: slice.start as usize,
                    stop: (slice.stop.max(slice.start)) as usize,
                    step: slice.step as usize,
                    reverse: false,
                });
            }
            let step = (-slice.step) as usize;
            match slice.iter().last() {
                Some(lowest) => Ok(FrameWindow {
                    start: lowest,
                    stop: slice.start as usize + 1,
                    step,
                    reverse: true,
                }),
                None => Ok(FrameWindow {
                    start: 0,
                    stop: 0,
                    step,
                    reverse: true,
                }),
            }
        }
    }
}

/// Multi-dimensional index into a tensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    values: Vec<DimIndex>,
}

impl Index {
    pub fn new(values: Vec<DimIndex>) -> Self {
        if values.is_empty() {
            return Self::all();
        }
        Self { values }
    }

    /// Every sample
    pub fn all() -> Self {
        Self {
            values: vec![DimIndex::full()],
        }
    }

    /// A single sample
    pub fn int(index: i64) -> Self {
        Self {
            values: vec![DimIndex::Int(index)],
        }
    }

    pub fn values(&self) -> &[DimIndex] {
        &self.values
    }

    /// The entry selecting samples
    pub fn sample_entry(&self) -> &DimIndex {
        &self.values[0]
    }

    /// Entries applied inside each sample
    pub fn sub_index(&self) -> &[DimIndex] {
        &self.values[1..]
    }

    /// Whether the sample entry picks exactly one sample
    pub fn is_single_sample(&self) -> bool {
        self.values[0].is_int()
    }

    /// Global sample indices selected in a tensor of `length` samples
    pub fn sample_indices(&self, length: u64) -> Result<Vec<u64>> {
        Ok(self.values[0]
            .positions(length as usize)?
            .into_iter()
            .map(|i| i as u64)
            .collect())
    }
}

//! Chunks: bounded append-only buffers of serialized samples
//!
//! Every chunk keeps its payload bytes plus two run-length headers, one for
//! per-sample byte ranges and one for shapes. How samples are serialized
//! depends on the tensor's compression settings, so the strategy is chosen
//! once per tensor and shared by all of its chunks.

mod chunk_compressed;
pub mod serialize;
mod sample_compressed;
mod uncompressed;

pub use chunk_compressed::ChunkCompressedChunk;
pub use sample_compressed::SampleCompressedChunk;
pub use uncompressed::UncompressedChunk;

use tensorchunk_core::validation::{fits_in_chunk, validate_byte_range};
use tensorchunk_core::{BytePositionsEncoder, ChunkId, Dtype, ShapesEncoder};
use tracing::trace;

use crate::compression::Compression;
use crate::config::ChunkConfig;
use crate::error::{Error, Result};
use crate::meta::{Htype, IndexEntry, TensorMeta};
use crate::sample::{Sample, SampleValue, SerializedSample};

/// Tensor-level settings every chunk of a tensor shares
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkArgs {
    pub max_chunk_size: u64,
    pub dtype: Dtype,
    pub htype: Htype,
    pub text_like: bool,
    pub sample_compression: Option<Compression>,
    pub chunk_compression: Option<Compression>,
}

impl ChunkArgs {
    pub fn from_meta(meta: &TensorMeta, config: &ChunkConfig) -> Self {
        Self {
            max_chunk_size: meta.max_chunk_size.unwrap_or(config.max_chunk_size),
            dtype: meta.dtype_or_default(),
            htype: meta.htype,
            text_like: meta.is_text_like(),
            sample_compression: meta.sample_compression,
            chunk_compression: meta.chunk_compression,
        }
    }
}

/// Result of offering samples to a chunk
#[derive(Debug)]
pub struct ExtendOutcome {
    /// Number of leading samples the chunk took
    pub accepted: usize,
    /// The offered samples; every one the chunk looked at is returned in its
    /// serialized form so a retry does not serialize it again
    pub samples: Vec<Sample>,
}

/// Payload and headers shared by every strategy
#[derive(Debug, Clone)]
pub struct ChunkData {
    pub id: ChunkId,
    pub args: ChunkArgs,
    pub data: Vec<u8>,
    pub byte_positions: BytePositionsEncoder,
    pub shapes: ShapesEncoder,
}

impl ChunkData {
    pub fn new(id: ChunkId, args: ChunkArgs) -> Self {
        Self {
            id,
            args,
            data: Vec::new(),
            byte_positions: BytePositionsEncoder::new(),
            shapes: ShapesEncoder::new(),
        }
    }

    /// Rebuild from raw (uncompressed) payload and the entries of its samples
    pub fn from_entries(id: ChunkId, args: ChunkArgs, data: Vec<u8>, entries: &[IndexEntry]) -> Result<Self> {
        let mut chunk = Self::new(id, args);
        for entry in entries {
            validate_byte_range(entry.start_byte as usize, entry.end_byte as usize, data.len())?;
            if entry.start_byte != chunk.byte_positions.total_bytes() {
                return Err(Error::CorruptedIndex(format!(
                    "entry starting at {} does not follow byte {}",
                    entry.start_byte,
                    chunk.byte_positions.total_bytes()
                )));
            }
            let shape = entry.shape.clone().unwrap_or_default();
            chunk.register(entry.end_byte - entry.start_byte, &shape);
        }
        if chunk.byte_positions.total_bytes() != data.len() as u64 {
            return Err(Error::CorruptedIndex(format!(
                "chunk {} holds {} bytes, entries cover {}",
                id,
                data.len(),
                chunk.byte_positions.total_bytes()
            )));
        }
        chunk.data = data;
        Ok(chunk)
    }

    fn register(&mut self, num_bytes: u64, shape: &[usize]) {
        self.byte_positions.register_samples(num_bytes, 1);
        self.shapes.register_samples(shape, 1);
    }

    fn append(&mut self, serialized: &SerializedSample) {
        self.data.extend_from_slice(&serialized.buffer);
        self.register(serialized.buffer.len() as u64, &serialized.shape);
    }

    pub fn num_samples(&self) -> u64 {
        self.byte_positions.num_samples()
    }

    pub fn sample_bytes(&self, local_index: u64) -> Result<&[u8]> {
        let (start, end) = self.byte_positions.get(local_index)?;
        Ok(&self.data[start as usize..end as usize])
    }

    /// Replace one sample's payload, shifting later samples
    fn replace(&mut self, local_index: u64, serialized: SerializedSample) -> Result<()> {
        let (start, end) = self.byte_positions.get(local_index)?;
        let new_len = self.data.len() as u64 - (end - start) + serialized.buffer.len() as u64;
        if new_len > self.args.max_chunk_size {
            return Err(Error::UnsupportedUpdate("updated sample does not fit its chunk"));
        }
        self.data
            .splice(start as usize..end as usize, serialized.buffer.iter().copied());
        self.byte_positions
            .set_num_bytes(local_index, serialized.buffer.len() as u64)?;
        self.shapes.set(local_index, &serialized.shape)?;
        Ok(())
    }
}

/// Operations every chunk strategy provides
pub trait ChunkOps {
    fn chunk_data(&self) -> &ChunkData;

    fn chunk_data_mut(&mut self) -> &mut ChunkData;

    /// Stored payload and shape of one sample
    fn serialize_sample(&self, sample: Sample) -> Result<SerializedSample>;

    /// Decode the sample at `local_index`; `cast` converts to the tensor dtype
    fn read_sample(&self, local_index: u64, cast: bool) -> Result<SampleValue>;

    /// Replace the sample at `local_index`
    fn update_sample(&mut self, local_index: u64, sample: Sample) -> Result<()> {
        let serialized = self.serialize_sample(sample)?;
        self.chunk_data_mut().replace(local_index, serialized)
    }

    /// Bytes written to storage on flush
    fn to_stored_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.chunk_data().data.clone())
    }

    /// Compression recorded in index entries for this chunk's samples
    fn entry_compression(&self) -> Option<Compression> {
        None
    }

    /// Append samples in order until one does not fit
    fn extend_if_has_space(&mut self, samples: Vec<Sample>) -> Result<ExtendOutcome> {
        let max_chunk_size = self.chunk_data().args.max_chunk_size;
        let mut returned = Vec::with_capacity(samples.len());
        let mut accepted = 0;
        let mut remaining = samples.into_iter();

        // Nothing is appended until every visited sample has serialized
        let mut used = self.chunk_data().data.len() as u64;
        for sample in remaining.by_ref() {
            let serialized = self.serialize_sample(sample)?;
            let len = serialized.buffer.len() as u64;
            let fits = fits_in_chunk(used, len, max_chunk_size);
            returned.push(serialized);
            if !fits {
                break;
            }
            used += len;
            accepted += 1;
        }

        let data = self.chunk_data_mut();
        for serialized in &returned[..accepted] {
            data.append(serialized);
        }
        let mut returned: Vec<Sample> = returned.into_iter().map(Sample::Serialized).collect();
        returned.extend(remaining);

        trace!(
            chunk = %self.chunk_data().id,
            accepted,
            bytes = self.chunk_data().data.len(),
            "extended chunk"
        );
        Ok(ExtendOutcome {
            accepted,
            samples: returned,
        })
    }

    fn num_samples(&self) -> u64 {
        self.chunk_data().num_samples()
    }

    /// Number of payload bytes held in memory
    fn num_data_bytes(&self) -> u64 {
        self.chunk_data().data.len() as u64
    }

    fn id(&self) -> ChunkId {
        self.chunk_data().id
    }

    fn byte_range(&self, local_index: u64) -> Result<(u64, u64)> {
        Ok(self.chunk_data().byte_positions.get(local_index)?)
    }

    fn shape(&self, local_index: u64) -> Result<Vec<usize>> {
        Ok(self.chunk_data().shapes.get(local_index)?.to_vec())
    }

    /// Index entry describing the sample at `local_index`
    fn index_entry(&self, local_index: u64) -> Result<IndexEntry> {
        Ok(IndexEntry::single(
            self.id().to_string(),
            self.byte_range(local_index)?,
            self.shape(local_index)?,
            self.entry_compression(),
        ))
    }
}

/// A chunk with its tensor's strategy
#[derive(Debug, Clone)]
pub enum Chunk {
    SampleCompressed(SampleCompressedChunk),
    ChunkCompressed(ChunkCompressedChunk),
    Uncompressed(UncompressedChunk),
}

impl Chunk {
    /// Empty chunk using the strategy `args` call for
    pub fn new(id: ChunkId, args: ChunkArgs) -> Self {
        Self::from_data(ChunkData::new(id, args))
    }

    pub fn from_data(data: ChunkData) -> Self {
        match (data.args.sample_compression, data.args.chunk_compression) {
            (Some(compression), _) => Chunk::SampleCompressed(SampleCompressedChunk::new(data, compression)),
            (None, Some(compression)) => Chunk::ChunkCompressed(ChunkCompressedChunk::new(data, compression)),
            (None, None) => Chunk::Uncompressed(UncompressedChunk::new(data)),
        }
    }

    fn ops(&self) -> &dyn ChunkOps {
        match self {
            Chunk::SampleCompressed(chunk) => chunk,
            Chunk::ChunkCompressed(chunk) => chunk,
            Chunk::Uncompressed(chunk) => chunk,
        }
    }

    fn ops_mut(&mut self) -> &mut dyn ChunkOps {
        match self {
            Chunk::SampleCompressed(chunk) => chunk,
            Chunk::ChunkCompressed(chunk) => chunk,
            Chunk::Uncompressed(chunk) => chunk,
        }
    }
}

impl ChunkOps for Chunk {
    fn chunk_data(&self) -> &ChunkData {
        self.ops().chunk_data()
    }

    fn chunk_data_mut(&mut self) -> &mut ChunkData {
        self.ops_mut().chunk_data_mut()
    }

    fn serialize_sample(&self, sample: Sample) -> Result<SerializedSample> {
        self.ops().serialize_sample(sample)
    }

    fn read_sample(&self, local_index: u64, cast: bool) -> Result<SampleValue> {
        self.ops().read_sample(local_index, cast)
    }

    fn update_sample(&mut self, local_index: u64, sample: Sample) -> Result<()> {
        self.ops_mut().update_sample(local_index, sample)
    }

    fn to_stored_bytes(&self) -> Result<Vec<u8>> {
        self.ops().to_stored_bytes()
    }

    fn entry_compression(&self) -> Option<Compression> {
        self.ops().entry_compression()
    }

    fn extend_if_has_space(&mut self, samples: Vec<Sample>) -> Result<ExtendOutcome> {
        self.ops_mut().extend_if_has_space(samples)
    }
}

/// Serialize for strategies that store raw element bytes
pub(crate) fn serialize_raw(args: &ChunkArgs, sample: Sample) -> Result<SerializedSample> {
    if args.text_like {
        if let Sample::Serialized(serialized) = sample {
            let bytes = match serialized.compression {
                None => serialized.buffer,
                Some(compression) => compression.decompress_bytes(&serialized.buffer)?,
            };
            return Ok(SerializedSample {
                buffer: bytes,
                compression: None,
                shape: vec![1],
            });
        }
        return Ok(SerializedSample {
            buffer: serialize::text_to_bytes(&sample, args.htype)?,
            compression: None,
            shape: vec![1],
        });
    }

    let sample = match sample {
        Sample::Serialized(serialized) if serialized.compression.is_none() => return Ok(serialized),
        other => other,
    };

    let array = serialize::sample_to_array(sample, args.dtype)?.cast(args.dtype)?;
    let shape = serialize::normalize_shape(array.shape());
    Ok(SerializedSample {
        buffer: array.into_data(),
        compression: None,
        shape,
    })
}

/// Decode a raw payload
pub(crate) fn read_raw(args: &ChunkArgs, bytes: &[u8], shape: &[usize]) -> Result<SampleValue> {
    if args.text_like {
        return serialize::bytes_to_text(bytes, args.htype);
    }
    let array = crate::array::SampleArray::new(args.dtype, shape.to_vec(), bytes.to_vec())?;
    Ok(SampleValue::Array(array))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn args(max_chunk_size: u64) -> ChunkArgs {
        ChunkArgs {
            max_chunk_size,
            dtype: Dtype::U8,
            htype: Htype::Generic,
            text_like: false,
            sample_compression: None,
            chunk_compression: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::args;
    use super::*;
    use crate::array::SampleArray;

    fn bytes_sample(len: usize) -> Sample {
        Sample::Array(SampleArray::from_vec(vec![7u8; len]))
    }

    #[test]
    fn test_capacity_stops_at_first_misfit() {
        let mut chunk = Chunk::new(ChunkId(1), args(300));
        let outcome = chunk
            .extend_if_has_space(vec![bytes_sample(100), bytes_sample(250), bytes_sample(10)])
            .unwrap();

        assert_eq!(outcome.accepted, 1);
        assert_eq!(chunk.num_samples(), 1);
        assert_eq!(chunk.num_data_bytes(), 100);
        assert!(matches!(outcome.samples[0], Sample::Serialized(_)));
        assert!(matches!(outcome.samples[1], Sample::Serialized(_)));
        assert!(matches!(outcome.samples[2], Sample::Array(_)));

        let mut fresh = Chunk::new(ChunkId(2), args(300));
        let outcome = fresh.extend_if_has_space(outcome.samples[1..].to_vec()).unwrap();
        assert_eq!(outcome.accepted, 2);
        assert_eq!(fresh.byte_range(1).unwrap(), (250, 260));
    }

    #[test]
    fn test_exact_fit_is_accepted() {
        let mut chunk = Chunk::new(ChunkId(1), args(10));
        let outcome = chunk
            .extend_if_has_space(vec![bytes_sample(4), bytes_sample(6), bytes_sample(1)])
            .unwrap();
        assert_eq!(outcome.accepted, 2);
    }

    #[test]
    fn test_from_entries_checks_coverage() {
        let args = args(100);
        let entries = vec![
            IndexEntry::single("1".into(), (0, 3), vec![3], None),
            IndexEntry::single("1".into(), (3, 5), vec![2], None),
        ];
        let data = ChunkData::from_entries(ChunkId(1), args.clone(), vec![1, 2, 3, 4, 5], &entries).unwrap();
        assert_eq!(data.sample_bytes(1).unwrap(), &[4, 5]);

        assert!(ChunkData::from_entries(ChunkId(1), args.clone(), vec![0; 6], &entries).is_err());
        let gap = vec![IndexEntry::single("1".into(), (1, 3), vec![2], None)];
        assert!(ChunkData::from_entries(ChunkId(1), args, vec![0; 3], &gap).is_err());
    }

    #[test]
    fn test_rejected_sample_leaves_chunk_untouched() {
        let mut chunk = Chunk::new(ChunkId(1), args(100));
        chunk.extend_if_has_space(vec![bytes_sample(5)]).unwrap();

        let result = chunk.extend_if_has_space(vec![bytes_sample(3), Sample::Text("x".into()), bytes_sample(2)]);
        assert!(matches!(result, Err(Error::SampleKind { actual: "text", .. })));
        assert_eq!(chunk.num_samples(), 1);
        assert_eq!(chunk.num_data_bytes(), 5);

        let outcome = chunk.extend_if_has_space(vec![bytes_sample(3)]).unwrap();
        assert_eq!(outcome.accepted, 1);
        assert_eq!(chunk.byte_range(1).unwrap(), (5, 8));
    }
}

//! Chunks compressed as a whole when flushed
//!
//! Samples are kept raw in memory and the capacity applies to the raw
//! buffer. Readers of a stored chunk decompress it before slicing.

use super::{read_raw, serialize_raw, ChunkData, ChunkOps};
use crate::compression::Compression;
use crate::error::Result;
use crate::sample::{Sample, SampleValue, SerializedSample};

#[derive(Debug, Clone)]
pub struct ChunkCompressedChunk {
    data: ChunkData,
    compression: Compression,
}

impl ChunkCompressedChunk {
    pub fn new(data: ChunkData, compression: Compression) -> Self {
        Self { data, compression }
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }
}

impl ChunkOps for ChunkCompressedChunk {
    fn chunk_data(&self) -> &ChunkData {
        &self.data
    }

    fn chunk_data_mut(&mut self) -> &mut ChunkData {
        &mut self.data
    }

    fn serialize_sample(&self, sample: Sample) -> Result<SerializedSample> {
        serialize_raw(&self.data.args, sample)
    }

    fn read_sample(&self, local_index: u64, _cast: bool) -> Result<SampleValue> {
        let bytes = self.data.sample_bytes(local_index)?;
        let shape = self.data.shapes.get(local_index)?;
        read_raw(&self.data.args, bytes, shape)
    }

    fn to_stored_bytes(&self) -> Result<Vec<u8>> {
        self.compression.compress_bytes(&self.data.data)
    }
}

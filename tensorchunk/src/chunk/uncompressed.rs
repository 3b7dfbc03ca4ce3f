//! Chunks holding raw element bytes

use super::{read_raw, serialize_raw, ChunkData, ChunkOps};
use crate::error::Result;
use crate::sample::{Sample, SampleValue, SerializedSample};

#[derive(Debug, Clone)]
pub struct UncompressedChunk {
    data: ChunkData,
}

impl UncompressedChunk {
    pub fn new(data: ChunkData) -> Self {
        Self { data }
    }
}

impl ChunkOps for UncompressedChunk {
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
}

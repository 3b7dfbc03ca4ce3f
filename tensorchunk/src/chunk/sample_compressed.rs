//! Chunks whose samples are compressed one by one
//!
//! Each payload is an independent compressed blob, so samples can be
//! decoded in isolation but never rewritten in place.

use super::serialize::{bytes_to_text, normalize_shape, sample_to_array, text_to_bytes};
use super::{ChunkData, ChunkOps};
use crate::compression::Compression;
use crate::error::{Error, Result};
use crate::sample::{Sample, SampleValue, SerializedSample};

#[derive(Debug, Clone)]
pub struct SampleCompressedChunk {
    data: ChunkData,
    compression: Compression,
}

impl SampleCompressedChunk {
    pub fn new(data: ChunkData, compression: Compression) -> Self {
        Self { data, compression }
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }
}

impl ChunkOps for SampleCompressedChunk {
    fn chunk_data(&self) -> &ChunkData {
        &self.data
    }

    fn chunk_data_mut(&mut self) -> &mut ChunkData {
        &mut self.data
    }

    fn serialize_sample(&self, sample: Sample) -> Result<SerializedSample> {
        let args = &self.data.args;
        let compression = self.compression;

        let sample = match sample {
            Sample::Serialized(serialized) if serialized.compression == Some(compression) => {
                let shape = if args.text_like {
                    vec![1]
                } else {
                    normalize_shape(&serialized.shape)
                };
                return Ok(SerializedSample { shape, ..serialized });
            }
            other => other,
        };

        if args.text_like {
            let text = match sample {
                Sample::Serialized(serialized) => match serialized.compression {
                    Some(other) => other.decompress_bytes(&serialized.buffer)?,
                    None => serialized.buffer,
                },
                other => text_to_bytes(&other, args.htype)?,
            };
            return Ok(SerializedSample {
                buffer: compression.compress_bytes(&text)?,
                compression: Some(compression),
                shape: vec![1],
            });
        }

        let mut array = sample_to_array(sample, args.dtype)?;
        if compression.is_byte_compression() {
            // byte codecs do not record dtype
            array = array.cast(args.dtype)?;
        }
        Ok(SerializedSample {
            buffer: compression.compress_array(&array)?,
            compression: Some(compression),
            shape: normalize_shape(array.shape()),
        })
    }

    fn read_sample(&self, local_index: u64, cast: bool) -> Result<SampleValue> {
        let args = &self.data.args;
        let buffer = self.data.sample_bytes(local_index)?;

        if args.text_like {
            let bytes = self.compression.decompress_bytes(buffer)?;
            return bytes_to_text(&bytes, args.htype);
        }

        let shape = self.data.shapes.get(local_index)?;
        let mut array = self.compression.decompress_array(buffer, shape, args.dtype)?;
        if cast && array.dtype() != args.dtype {
            array = array.cast(args.dtype)?;
        }
        if array.shape() != shape {
            array = array.reshape(shape.to_vec())?;
        }
        Ok(SampleValue::Array(array))
    }

    fn update_sample(&mut self, _local_index: u64, _sample: Sample) -> Result<()> {
        Err(Error::UnsupportedUpdate(
            "samples in sample-compressed chunks cannot be rewritten",
        ))
    }

    fn entry_compression(&self) -> Option<Compression> {
        Some(self.compression)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::args;
    use super::super::{Chunk, ChunkArgs};
    use super::*;
    use crate::array::SampleArray;
    use crate::meta::Htype;
    use serde_json::json;
    use tensorchunk_core::{ChunkId, Dtype};

    fn chunk(compression: Compression, dtype: Dtype, max: u64) -> Chunk {
        Chunk::new(
            ChunkId(1),
            ChunkArgs {
                dtype,
                sample_compression: Some(compression),
                ..args(max)
            },
        )
    }

    #[test]
    fn test_array_roundtrip_with_byte_codec_casts_first() {
        let mut chunk = chunk(Compression::Lz4, Dtype::U16, 1 << 20);
        let input = SampleArray::from_slice(&[2, 2], &[1.0f64, 2.0, 3.0, 4.0]).unwrap();
        let outcome = chunk.extend_if_has_space(vec![input.into()]).unwrap();
        assert_eq!(outcome.accepted, 1);

        let value = chunk.read_sample(0, true).unwrap();
        let array = value.as_array().unwrap();
        assert_eq!(array.dtype(), Dtype::U16);
        assert_eq!(array.shape(), &[2, 2]);
        assert_eq!(array.to_vec::<u16>().unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(chunk.index_entry(0).unwrap().compression, Some(Compression::Lz4));
    }

    #[test]
    fn test_npy_decodes_then_casts() {
        let mut chunk = chunk(Compression::Npy, Dtype::I32, 1 << 20);
        let input = SampleArray::from_slice(&[3], &[1.5f64, -2.0, 7.9]).unwrap();
        chunk.extend_if_has_space(vec![input.into()]).unwrap();

        let cast = chunk.read_sample(0, true).unwrap();
        assert_eq!(cast.as_array().unwrap().to_vec::<i32>().unwrap(), vec![1, -2, 7]);

        let stored = chunk.read_sample(0, false).unwrap();
        assert_eq!(stored.as_array().unwrap().dtype(), Dtype::F64);
        assert_eq!(stored.as_array().unwrap().to_vec::<f64>().unwrap(), vec![1.5, -2.0, 7.9]);
    }

    #[test]
    fn test_scalar_shape_becomes_one() {
        let mut chunk = chunk(Compression::Zstd, Dtype::F32, 1 << 20);
        let scalar = SampleArray::new(Dtype::F32, vec![], 1.0f32.to_le_bytes().to_vec()).unwrap();
        chunk.extend_if_has_space(vec![scalar.into()]).unwrap();
        assert_eq!(chunk.shape(0).unwrap(), vec![1]);
        assert_eq!(chunk.read_sample(0, true).unwrap().as_array().unwrap().shape(), &[1]);
    }

    #[test]
    fn test_text_and_json() {
        let mut text = Chunk::new(
            ChunkId(2),
            ChunkArgs {
                dtype: Dtype::Str,
                htype: Htype::Json,
                text_like: true,
                sample_compression: Some(Compression::Zstd),
                ..args(1 << 20)
            },
        );
        text.extend_if_has_space(vec![json!({"k": [1, 2]}).into(), "plain".into()])
            .unwrap();
        assert_eq!(text.shape(0).unwrap(), vec![1]);
        assert_eq!(
            text.read_sample(0, true).unwrap(),
            SampleValue::Json(json!({"k": [1, 2]}))
        );
        assert_eq!(text.read_sample(1, true).unwrap(), SampleValue::Json(json!("plain")));
    }

    #[test]
    fn test_memoized_samples_are_not_recompressed() {
        let mut first = chunk(Compression::Zstd, Dtype::U8, 8);
        let big = SampleArray::from_vec((0..64u8).collect::<Vec<_>>());
        let outcome = first.extend_if_has_space(vec![big.into()]).unwrap();
        assert_eq!(outcome.accepted, 0);
        let Sample::Serialized(memo) = &outcome.samples[0] else {
            panic!("sample was not memoized");
        };

        let mut second = chunk(Compression::Zstd, Dtype::U8, 1 << 20);
        second.extend_if_has_space(outcome.samples.clone()).unwrap();
        assert_eq!(second.chunk_data().data, memo.buffer);
    }

    #[test]
    fn test_update_is_rejected() {
        let mut chunk = chunk(Compression::Lz4, Dtype::U8, 1 << 20);
        chunk
            .extend_if_has_space(vec![SampleArray::from_vec(vec![1u8]).into()])
            .unwrap();
        assert!(matches!(
            chunk.update_sample(0, SampleArray::from_vec(vec![2u8]).into()),
            Err(Error::UnsupportedUpdate(_))
        ));
    }
}

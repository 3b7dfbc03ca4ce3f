//! Sample reconstruction from an index entry and the bytes of its chunks

use tensorchunk_core::validation::validate_byte_range;
use tracing::warn;

use crate::array::SampleArray;
use crate::chunk::serialize::bytes_to_text;
use crate::chunk::ChunkArgs;
use crate::error::{Error, Result};
use crate::meta::IndexEntry;
use crate::sample::SampleValue;

/// Rebuild the sample `entry` describes
///
/// `chunks` holds the uncompressed payload of every chunk named by the entry,
/// in order. A sample spanning several chunks ends at `end_byte` of the last
/// one, so the concatenated range ends after all earlier chunks plus
/// `end_byte`.
pub fn sample_from_index_entry<B: AsRef<[u8]>>(
    entry: &IndexEntry,
    chunks: &[B],
    args: &ChunkArgs,
    cast: bool,
) -> Result<SampleValue> {
    if entry.chunk_names.is_empty() {
        if args.text_like {
            return Ok(SampleValue::Text(String::new()));
        }
        let shape = entry.shape.clone().unwrap_or_else(|| vec![0]);
        return Ok(SampleValue::Array(SampleArray::zeros(args.dtype, &shape)?));
    }
    if chunks.len() != entry.chunk_names.len() {
        return Err(Error::CorruptedIndex(format!(
            "entry names {} chunks, got {}",
            entry.chunk_names.len(),
            chunks.len()
        )));
    }

    let joined;
    let buffer: &[u8] = match chunks {
        [single] => single.as_ref(),
        many => {
            joined = many.iter().flat_map(|c| c.as_ref().iter().copied()).collect::<Vec<u8>>();
            &joined
        }
    };
    let leading: usize = chunks[..chunks.len() - 1].iter().map(|c| c.as_ref().len()).sum();
    let start = entry.start_byte as usize;
    let end = leading + entry.end_byte as usize;
    validate_byte_range(start, end, buffer.len())?;
    let bytes = &buffer[start..end];

    match entry.compression {
        None if args.text_like => bytes_to_text(bytes, args.htype),
        None => {
            let array = match &entry.shape {
                Some(shape) => SampleArray::new(args.dtype, shape.clone(), bytes.to_vec())?,
                None => {
                    warn!(
                        chunks = ?entry.chunk_names,
                        "no shape recorded for sample, returning flat array"
                    );
                    let len = bytes.len() / args.dtype.size_bytes();
                    SampleArray::new(args.dtype, vec![len], bytes.to_vec())?
                }
            };
            Ok(SampleValue::Array(array))
        }
        Some(compression) if args.text_like => {
            bytes_to_text(&compression.decompress_bytes(bytes)?, args.htype)
        }
        Some(compression) => {
            let shape = entry.shape.as_deref().unwrap_or(&[]);
            let mut array = compression.decompress_array(bytes, shape, args.dtype)?;
            if cast && array.dtype() != args.dtype {
                array = array.cast(args.dtype)?;
            }
            if !shape.is_empty() && array.shape() != shape {
                array = array.reshape(shape.to_vec())?;
            }
            Ok(SampleValue::Array(array))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::test_support::args;
    use crate::compression::Compression;
    use tensorchunk_core::Dtype;

    fn entry(names: &[&str], range: (u64, u64), shape: Option<Vec<usize>>) -> IndexEntry {
        IndexEntry {
            chunk_names: names.iter().map(|n| n.to_string()).collect(),
            start_byte: range.0,
            end_byte: range.1,
            shape,
            compression: None,
        }
    }

    #[test]
    fn test_no_chunks_gives_zeros() {
        let value = sample_from_index_entry::<Vec<u8>>(&entry(&[], (0, 0), Some(vec![2, 3])), &[], &args(10), true)
            .unwrap();
        let array = value.into_array().unwrap();
        assert_eq!(array.shape(), &[2, 3]);
        assert!(array.data().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_single_chunk_slice() {
        let chunk = vec![9u8, 1, 2, 3, 9];
        let value = sample_from_index_entry(&entry(&["a"], (1, 4), Some(vec![3])), &[chunk], &args(10), true)
            .unwrap();
        assert_eq!(value.as_array().unwrap().data(), &[1, 2, 3]);
    }

    #[test]
    fn test_span_across_chunks() {
        let chunks = vec![vec![1u8, 2, 3], vec![4u8, 5, 6], vec![7u8, 8, 0]];
        let value = sample_from_index_entry(
            &entry(&["a", "b", "c"], (0, 2), Some(vec![8])),
            &chunks,
            &args(3),
            true,
        )
        .unwrap();
        assert_eq!(value.as_array().unwrap().data(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_missing_shape_degrades_to_flat() {
        let chunk = 7u16.to_le_bytes().repeat(3);
        let args = ChunkArgs { dtype: Dtype::U16, ..args(10) };
        let value = sample_from_index_entry(&entry(&["a"], (0, 6), None), &[chunk], &args, true).unwrap();
        assert_eq!(value.as_array().unwrap().shape(), &[3]);
        assert_eq!(value.as_array().unwrap().to_vec::<u16>().unwrap(), vec![7, 7, 7]);
    }

    #[test]
    fn test_compressed_payload_is_decoded_then_cast() {
        let stored = SampleArray::from_slice(&[2], &[2.5f64, 4.0]).unwrap();
        let payload = Compression::Npy.compress_array(&stored).unwrap();
        let mut e = entry(&["a"], (0, payload.len() as u64), Some(vec![2]));
        e.compression = Some(Compression::Npy);
        let args = ChunkArgs { dtype: Dtype::U8, ..args(1024) };

        let cast = sample_from_index_entry(&e, &[payload.clone()], &args, true).unwrap();
        assert_eq!(cast.as_array().unwrap().to_vec::<u8>().unwrap(), vec![2, 4]);
        let raw = sample_from_index_entry(&e, &[payload], &args, false).unwrap();
        assert_eq!(raw.as_array().unwrap().dtype(), Dtype::F64);
    }

    #[test]
    fn test_range_past_buffer_is_rejected() {
        let result = sample_from_index_entry(&entry(&["a"], (0, 9), Some(vec![9])), &[vec![0u8; 4]], &args(10), true);
        assert!(matches!(result, Err(Error::Format(_))));
    }
}

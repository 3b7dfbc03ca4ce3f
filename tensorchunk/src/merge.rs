//! Distributed merge of per-worker tensor outputs
//!
//! Workers fill independent engines for disjoint, contiguous sample ranges.
//! Their metadata is folded into the destination in worker order, which
//! defines the final global order. At every worker boundary the
//! destination's last chunk and the worker's first chunk are usually both
//! under-filled; when they fit together the first is appended to the last
//! and deleted.

use tensorchunk_core::{chunk_name_from_id, ChunkIdEncoder, CredsEncoder};
use tracing::{debug, info};

use crate::chunk::ChunkArgs;
use crate::engine::ChunkEngine;
use crate::error::{Error, Result};
use crate::linked::LinkedChunkEngine;
use crate::meta::{IndexMeta, TensorMeta, TileRegistry};

/// Everything one worker produced for one tensor
#[derive(Debug, Clone, Default)]
pub struct WorkerOutput {
    pub tensor_meta: TensorMeta,
    pub index_meta: IndexMeta,
    pub chunk_id_encoder: ChunkIdEncoder,
    pub tiles: TileRegistry,
    /// Present for linked tensors
    pub creds_encoder: Option<CredsEncoder>,
}

impl WorkerOutput {
    /// Flush a worker engine and collect its metadata
    pub fn from_engine(engine: &mut ChunkEngine) -> Result<Self> {
        engine.flush()?;
        Ok(Self {
            tensor_meta: engine.tensor_meta()?,
            index_meta: engine.index_meta()?,
            chunk_id_encoder: engine.chunk_id_encoder()?,
            tiles: engine.tile_registry()?,
            creds_encoder: None,
        })
    }

    pub fn from_linked(engine: &mut LinkedChunkEngine) -> Result<Self> {
        engine.flush()?;
        let mut output = Self::from_engine(engine.base_mut())?;
        output.creds_encoder = Some(engine.creds_encoder()?);
        Ok(output)
    }
}

/// What a merge did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeSummary {
    pub workers: usize,
    pub samples: u64,
    pub corner_merges: usize,
}

/// Fold worker tensor metadata into `destination`
///
/// Workers without samples are skipped. The first worker with samples is
/// adopted wholesale; later ones must agree on dtype and rank and widen the
/// shape bounds.
pub fn merge_tensor_metas<'a, I>(destination: TensorMeta, workers: I) -> Result<TensorMeta>
where
    I: IntoIterator<Item = &'a TensorMeta>,
{
    workers.into_iter().try_fold(destination, |mut merged, worker| {
        if worker.is_empty() {
            return Ok(merged);
        }
        if merged.is_empty() {
            return Ok(TensorMeta {
                length: merged.length + worker.length,
                ..worker.clone()
            });
        }

        let (expected, actual) = (merged.dtype_or_default(), worker.dtype_or_default());
        if expected != actual {
            return Err(Error::DtypeMismatch { expected, actual });
        }
        merged.update_shape_interval(&worker.min_shape)?;
        merged.update_shape_interval(&worker.max_shape)?;
        merged.length += worker.length;
        Ok(merged)
    })
}

/// Append worker encoders in order, shifting each by the samples before it
pub fn merge_chunk_id_encoders<'a, I>(destination: ChunkIdEncoder, workers: I) -> Result<ChunkIdEncoder>
where
    I: IntoIterator<Item = &'a ChunkIdEncoder>,
{
    let offset = destination.num_samples();
    let (merged, _) = workers
        .into_iter()
        .try_fold((destination, offset), |(mut merged, offset), worker| {
            merged.extend_shifted(worker, offset)?;
            Ok::<_, Error>((merged, offset + worker.num_samples()))
        })?;
    Ok(merged)
}

/// Append worker creds encoders in order
pub fn merge_creds_encoders<'a, I>(destination: CredsEncoder, workers: I) -> CredsEncoder
where
    I: IntoIterator<Item = &'a CredsEncoder>,
{
    workers.into_iter().fold(destination, |mut merged, worker| {
        merged.extend_from(worker);
        merged
    })
}

/// Destination state threaded through the per-worker fold
struct MergeState {
    index: IndexMeta,
    encoder: ChunkIdEncoder,
    tiles: TileRegistry,
    corner_merges: usize,
}

/// Merge worker outputs into `destination` and flush it
///
/// Worker chunks must already be in the destination's chunk storage. The
/// destination is flushed first so its last chunk can be coalesced. Its
/// metadata is only replaced once every worker has been folded in.
pub fn merge_into(destination: &mut ChunkEngine, workers: &[WorkerOutput]) -> Result<MergeSummary> {
    destination.flush()?;
    let current = destination.tensor_meta()?;
    let before = current.length;
    let stored_as = (current.sample_compression, current.chunk_compression);
    let was_empty = current.is_empty();
    let meta = merge_tensor_metas(current, workers.iter().map(|w| &w.tensor_meta))?;
    if !was_empty && (meta.sample_compression, meta.chunk_compression) != stored_as {
        return Err(Error::Config(format!(
            "workers of {} use different compression than the destination",
            destination.key()
        )));
    }

    let args = ChunkArgs::from_meta(&meta, destination.config());
    let threshold = destination.config().corner_merge_threshold;
    let initial = MergeState {
        index: destination.index_meta()?,
        encoder: destination.chunk_id_encoder()?,
        tiles: destination.tile_registry()?,
        corner_merges: 0,
    };

    let state = workers.iter().try_fold(initial, |mut state, worker| {
        if worker.chunk_id_encoder.is_empty() {
            return Ok::<_, Error>(state);
        }
        let boundary_row = state.encoder.num_chunks();
        let boundary_entry = state.index.len();
        let offset = state.encoder.num_samples();

        state.encoder.extend_shifted(&worker.chunk_id_encoder, offset)?;
        state.index.extend_from(&worker.index_meta);
        state.tiles.merge(&worker.tiles);

        if boundary_row > 0
            && merge_corner(destination, &mut state, boundary_row, boundary_entry, threshold, &args)?
        {
            state.corner_merges += 1;
        }
        Ok(state)
    })?;

    if state.encoder.num_samples() != meta.length || state.index.len() as u64 != meta.length {
        return Err(Error::CorruptedIndex(format!(
            "merged {} encoder samples and {} entries for a tensor of length {}",
            state.encoder.num_samples(),
            state.index.len(),
            meta.length
        )));
    }

    destination.replace_tensor_meta(meta.clone());
    destination.replace_index_meta(state.index);
    destination.replace_chunk_id_encoder(state.encoder);
    destination.replace_tile_registry(state.tiles);
    destination.flush()?;

    let summary = MergeSummary {
        workers: workers.len(),
        samples: meta.length - before,
        corner_merges: state.corner_merges,
    };
    info!(
        tensor = destination.key(),
        workers = summary.workers,
        samples = summary.samples,
        corner_merges = summary.corner_merges,
        "merged worker outputs"
    );
    Ok(summary)
}

/// Merge linked worker outputs, including their creds encoders
pub fn merge_linked_into(destination: &mut LinkedChunkEngine, workers: &[WorkerOutput]) -> Result<MergeSummary> {
    let creds = merge_creds_encoders(
        destination.creds_encoder()?,
        workers.iter().filter_map(|w| w.creds_encoder.as_ref()),
    );
    let summary = merge_into(destination.base_mut(), workers)?;
    destination.replace_creds_encoder(creds);
    destination.flush()?;
    Ok(summary)
}

/// Byte size of the chunk holding the samples from `first_entry` on
///
/// A tiled first sample counts as a full chunk.
fn first_chunk_size(index: &IndexMeta, first_entry: usize, name: &str, max_chunk_size: u64) -> Result<u64> {
    let entry = index.get(first_entry as u64)?;
    if entry.is_multi_chunk() {
        return Ok(max_chunk_size);
    }
    let size = index.entries[first_entry..]
        .iter()
        .take_while(|e| e.chunk_names.len() == 1 && e.chunk_names[0] == name)
        .last()
        .map(|e| e.end_byte)
        .unwrap_or(0);
    Ok(size)
}

/// Append the chunk at `boundary_row` to the one before it if both fit
fn merge_corner(
    destination: &ChunkEngine,
    state: &mut MergeState,
    boundary_row: usize,
    boundary_entry: usize,
    threshold: u64,
    args: &ChunkArgs,
) -> Result<bool> {
    let max_chunk_size = args.max_chunk_size;
    let rows = state.encoder.rows();
    let (last_id, first_id) = (rows[boundary_row - 1].0, rows[boundary_row].0);
    let last_entry = state.index.get(boundary_entry as u64 - 1)?;
    if state.tiles.is_tile(last_id) || last_entry.is_multi_chunk() {
        return Ok(false);
    }

    let first_name = chunk_name_from_id(first_id);
    let last_name = chunk_name_from_id(last_id);
    let first_size = first_chunk_size(&state.index, boundary_entry, &first_name, max_chunk_size)?;
    let last_size = last_entry.end_byte;
    if first_size >= threshold || first_size + last_size > max_chunk_size {
        return Ok(false);
    }

    let last_bytes = destination.chunk_payload_with(last_id, args)?;
    let first_bytes = destination.chunk_payload_with(first_id, args)?;
    let shift = last_bytes.len() as u64;
    let mut merged = Vec::with_capacity(last_bytes.len() + first_bytes.len());
    merged.extend_from_slice(&last_bytes);
    merged.extend_from_slice(&first_bytes);

    destination.rewrite_chunk(last_id, &merged, args)?;
    destination.delete_chunk(first_id)?;
    let remapped = state.index.remap_chunk(boundary_entry, &first_name, &last_name, shift);
    state.encoder.coalesce_into_previous(boundary_row)?;

    debug!(
        tensor = destination.key(),
        absorbed = %first_name,
        into = %last_name,
        remapped,
        bytes = merged.len(),
        "merged corner chunks"
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::SampleArray;
    use crate::config::ChunkConfig;
    use crate::meta::Htype;
    use crate::storage::{MemoryProvider, StorageProvider};
    use proptest::prelude::*;
    use std::sync::Arc;
    use tensorchunk_core::{ChunkId, Dtype};

    fn meta(length: u64, min: Vec<usize>, max: Vec<usize>) -> TensorMeta {
        TensorMeta {
            length,
            min_shape: min,
            max_shape: max,
            ..TensorMeta::new(Htype::Generic, Dtype::F32)
        }
    }

    #[test]
    fn test_empty_worker_contributes_nothing() {
        let merged = merge_tensor_metas(
            TensorMeta::new(Htype::Generic, Dtype::F32),
            &[meta(5, vec![2, 2], vec![2, 2]), meta(0, vec![], vec![])],
        )
        .unwrap();
        assert_eq!(merged.length, 5);
        assert_eq!(merged.min_shape, vec![2, 2]);
        assert_eq!(merged.max_shape, vec![2, 2]);
    }

    #[test]
    fn test_meta_bounds_widen() {
        let merged = merge_tensor_metas(
            TensorMeta::default(),
            &[meta(2, vec![1, 4], vec![3, 4]), meta(3, vec![2, 1], vec![2, 9])],
        )
        .unwrap();
        assert_eq!(merged.length, 5);
        assert_eq!(merged.min_shape, vec![1, 1]);
        assert_eq!(merged.max_shape, vec![3, 9]);
    }

    #[test]
    fn test_meta_conflicts() {
        let other_dtype = TensorMeta {
            dtype: Some(Dtype::U8),
            ..meta(1, vec![2], vec![2])
        };
        assert!(matches!(
            merge_tensor_metas(TensorMeta::default(), &[meta(1, vec![2], vec![2]), other_dtype]),
            Err(Error::DtypeMismatch { .. })
        ));
        assert!(matches!(
            merge_tensor_metas(
                TensorMeta::default(),
                &[meta(1, vec![2], vec![2]), meta(1, vec![2, 2], vec![2, 2])]
            ),
            Err(Error::ShapeRankMismatch { expected: 1, actual: 2 })
        ));
    }

    #[test]
    fn test_encoder_offsets() {
        let a = ChunkIdEncoder::from_rows(vec![(ChunkId(1), 2), (ChunkId(2), 5)]).unwrap();
        let b = ChunkIdEncoder::from_rows(vec![(ChunkId(3), 3)]).unwrap();
        let c = ChunkIdEncoder::from_rows(vec![(ChunkId(4), 1), (ChunkId(5), 4)]).unwrap();
        let dest = ChunkIdEncoder::from_rows(vec![(ChunkId(9), 1)]).unwrap();

        let merged = merge_chunk_id_encoders(dest, [&a, &b, &c]).unwrap();
        let cumulative: Vec<u64> = merged.rows().iter().map(|(_, c)| *c).collect();
        assert_eq!(cumulative, vec![1, 3, 6, 9, 10, 13]);
    }

    proptest! {
        #[test]
        fn encoder_merge_preserves_counts(counts in prop::collection::vec(prop::collection::vec(1u64..20, 1..5), 1..6)) {
            let workers: Vec<ChunkIdEncoder> = counts
                .iter()
                .enumerate()
                .map(|(w, chunks)| {
                    let mut encoder = ChunkIdEncoder::new();
                    for (c, n) in chunks.iter().enumerate() {
                        encoder.register_chunk_with_samples(ChunkId((w * 100 + c) as u64), *n);
                    }
                    encoder
                })
                .collect();
            let merged = merge_chunk_id_encoders(ChunkIdEncoder::new(), &workers).unwrap();

            let mut offset = 0;
            for (w, worker) in workers.iter().enumerate() {
                for i in 0..worker.num_samples() {
                    let expected = worker.chunk_ids_for(i).unwrap();
                    prop_assert_eq!(merged.chunk_ids_for(offset + i).unwrap(), expected);
                }
                offset += counts[w].iter().sum::<u64>();
            }
            prop_assert_eq!(merged.num_samples(), offset);
        }
    }

    #[test]
    fn test_creds_merge() {
        let mut a = CredsEncoder::new();
        a.register_samples(1, 2);
        let mut b = CredsEncoder::new();
        b.register_samples(1, 1);
        b.register_samples(0, 1);
        let merged = merge_creds_encoders(CredsEncoder::new(), [&a, &b]);
        assert_eq!(merged.rows(), &[(1, 3), (0, 4)]);
    }

    fn worker(shared: &Arc<MemoryProvider>, config: &ChunkConfig, samples: &[usize], fill: u8) -> WorkerOutput {
        let mut engine = ChunkEngine::with_meta_storage(
            "t",
            shared.clone(),
            Arc::new(MemoryProvider::new()),
            config.clone(),
        );
        engine.create_tensor(TensorMeta::new(Htype::Generic, Dtype::U8)).unwrap();
        engine
            .extend(
                samples
                    .iter()
                    .map(|len| SampleArray::from_vec(vec![fill; *len]).into())
                    .collect(),
            )
            .unwrap();
        WorkerOutput::from_engine(&mut engine).unwrap()
    }

    #[test]
    fn test_corner_chunks_coalesce() {
        let shared = Arc::new(MemoryProvider::new());
        let config = ChunkConfig::with_max_chunk_size(100).with_corner_merge_threshold(50);
        // worker 0: [60] [50]; worker 1: [20] [90]
        let w0 = worker(&shared, &config, &[60, 50], 1);
        let w1 = worker(&shared, &config, &[20, 90], 2);
        assert_eq!(shared.keys_with_prefix("t/chunks/").len(), 4);

        let mut dest = ChunkEngine::new("t", shared.clone(), config);
        dest.create_tensor(TensorMeta::new(Htype::Generic, Dtype::U8)).unwrap();
        let summary = merge_into(&mut dest, &[w0, w1]).unwrap();

        assert_eq!(summary.corner_merges, 1);
        assert_eq!(summary.samples, 4);
        assert_eq!(shared.keys_with_prefix("t/chunks/").len(), 3);

        let encoder = dest.chunk_id_encoder().unwrap();
        assert_eq!(encoder.num_chunks(), 3);
        let index = dest.index_meta().unwrap();
        assert_eq!(index.entries[2].chunk_names, index.entries[1].chunk_names);
        assert_eq!((index.entries[2].start_byte, index.entries[2].end_byte), (50, 70));
        assert_ne!(index.entries[3].chunk_names, index.entries[2].chunk_names);

        for (i, (len, fill)) in [(60, 1u8), (50, 1), (20, 2), (90, 2)].into_iter().enumerate() {
            let value = dest.read_sample(i as u64, true).unwrap();
            assert_eq!(value.as_array().unwrap().data(), vec![fill; len].as_slice());
        }
        assert!(shared.exists("t/tensor_meta.json").unwrap());
    }

    #[test]
    fn test_large_first_chunk_is_kept() {
        let shared = Arc::new(MemoryProvider::new());
        let config = ChunkConfig::with_max_chunk_size(100).with_corner_merge_threshold(50);
        let w0 = worker(&shared, &config, &[30], 1);
        let w1 = worker(&shared, &config, &[60], 2);
        let w2 = worker(&shared, &config, &[], 3);

        let mut dest = ChunkEngine::new("t", shared.clone(), config);
        dest.create_tensor(TensorMeta::new(Htype::Generic, Dtype::U8)).unwrap();
        let summary = merge_into(&mut dest, &[w0, w1, w2]).unwrap();
        assert_eq!(summary.corner_merges, 0);
        assert_eq!(dest.chunk_id_encoder().unwrap().num_chunks(), 2);
        assert_eq!(dest.num_samples().unwrap(), 2);
    }

    #[test]
    fn test_unflushed_destination_tail_is_merged() {
        let shared = Arc::new(MemoryProvider::new());
        let config = ChunkConfig::with_max_chunk_size(100).with_corner_merge_threshold(500);
        let mut dest = ChunkEngine::new("t", shared.clone(), config.clone());
        dest.create_tensor(TensorMeta::new(Htype::Generic, Dtype::U8)).unwrap();
        dest.extend(vec![SampleArray::from_vec(vec![7u8; 10]).into()]).unwrap();
        assert!(shared.keys_with_prefix("t/chunks/").is_empty());

        let w = worker(&shared, &config, &[10], 2);
        let summary = merge_into(&mut dest, &[w]).unwrap();

        assert_eq!(summary.samples, 1);
        assert_eq!(summary.corner_merges, 1);
        assert_eq!(dest.num_samples().unwrap(), 2);
        assert_eq!(dest.chunk_id_encoder().unwrap().num_samples(), 2);
        assert_eq!(dest.chunk_id_encoder().unwrap().num_chunks(), 1);
        assert_eq!(dest.index_meta().unwrap().len(), 2);
        assert_eq!(shared.keys_with_prefix("t/chunks/").len(), 1);
        for (i, fill) in [7u8, 2].into_iter().enumerate() {
            let value = dest.read_sample(i as u64, true).unwrap();
            assert_eq!(value.as_array().unwrap().data(), vec![fill; 10].as_slice());
        }
    }

    #[test]
    fn test_failed_merge_leaves_destination_intact() {
        let shared = Arc::new(MemoryProvider::new());
        let config = ChunkConfig::with_max_chunk_size(100).with_corner_merge_threshold(500);
        let mut dest = ChunkEngine::new("t", shared.clone(), config.clone());
        dest.create_tensor(TensorMeta::new(Htype::Generic, Dtype::U8)).unwrap();
        dest.extend(vec![SampleArray::from_vec(vec![7u8; 10]).into()]).unwrap();

        let good = worker(&shared, &config, &[10], 2);
        let mut floats = ChunkEngine::with_meta_storage(
            "t",
            shared.clone(),
            Arc::new(MemoryProvider::new()),
            config.clone(),
        );
        floats.create_tensor(TensorMeta::new(Htype::Generic, Dtype::F32)).unwrap();
        floats.extend(vec![SampleArray::from_vec(vec![1.5f32]).into()]).unwrap();
        let bad = WorkerOutput::from_engine(&mut floats).unwrap();

        assert!(matches!(merge_into(&mut dest, &[good, bad]), Err(Error::DtypeMismatch { .. })));
        assert_eq!(dest.num_samples().unwrap(), 1);
        assert_eq!(dest.chunk_id_encoder().unwrap().num_samples(), 1);
        assert_eq!(dest.index_meta().unwrap().len(), 1);
        assert_eq!(dest.tensor_meta().unwrap().dtype, Some(Dtype::U8));

        dest.extend(vec![SampleArray::from_vec(vec![3u8; 4]).into()]).unwrap();
        assert_eq!(dest.num_samples().unwrap(), 2);
        assert_eq!(dest.read_sample(1, true).unwrap().as_array().unwrap().data(), &[3u8; 4]);
        assert_eq!(dest.read_sample(0, true).unwrap().as_array().unwrap().data(), &[7u8; 10]);
    }
}

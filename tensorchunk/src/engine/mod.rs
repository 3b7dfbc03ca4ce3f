//! Chunk engine: the mapping from global sample indices to chunks
//!
//! One engine owns one tensor for one writer. Writes go into an open chunk
//! until it is full; the chunk is then sealed to storage and a new one is
//! opened. Reads resolve a sample index through the chunk id encoder, fetch
//! the bytes of every chunk holding the sample and decode them.
//!
//! Chunk objects and metadata objects may live in different providers. The
//! transform driver uses this to write chunks straight into the destination
//! while keeping each worker's metadata private until the merge.

mod read;

pub use read::sample_from_index_entry;

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;
use tensorchunk_core::{chunk_name_from_id, derive_tile_chunk_id, ChunkId, ChunkIdEncoder, Dtype};
use tracing::debug;
use uuid::Uuid;

use crate::array::SampleArray;
use crate::chunk::{Chunk, ChunkArgs, ChunkData, ChunkOps};
use crate::config::ChunkConfig;
use crate::error::{Error, Result};
use crate::index::{DimIndex, Index};
use crate::keys::{chunk_key, FIRST_COMMIT_ID};
use crate::meta::{IndexEntry, IndexMeta, MetaCache, TensorMeta, TileRegistry};
use crate::sample::{Sample, SampleValue, SerializedSample};
use crate::storage::{StorageProvider, StoredBytes};

/// Fresh chunk id from a random UUID
pub fn random_chunk_id() -> ChunkId {
    ChunkId::from_uuid(Uuid::new_v4())
}

/// Reads and writes the chunks of one tensor
#[derive(Debug)]
pub struct ChunkEngine {
    key: String,
    storage: Arc<dyn StorageProvider>,
    meta_storage: Arc<dyn StorageProvider>,
    config: ChunkConfig,
    commit_id: String,
    tensor_meta: MetaCache<TensorMeta>,
    index_meta: MetaCache<IndexMeta>,
    chunk_id_encoder: MetaCache<ChunkIdEncoder>,
    tiles: MetaCache<TileRegistry>,
    open_chunk: Option<Chunk>,
    read_cache: RwLock<HashMap<ChunkId, StoredBytes>>,
    data_cachable: bool,
}

impl ChunkEngine {
    /// Engine keeping chunks and metadata in the same provider
    pub fn new(key: &str, storage: Arc<dyn StorageProvider>, config: ChunkConfig) -> Self {
        Self::with_meta_storage(key, storage.clone(), storage, config)
    }

    /// Engine writing chunks to `storage` and metadata to `meta_storage`
    pub fn with_meta_storage(
        key: &str,
        storage: Arc<dyn StorageProvider>,
        meta_storage: Arc<dyn StorageProvider>,
        config: ChunkConfig,
    ) -> Self {
        Self {
            key: key.to_string(),
            storage,
            meta_storage,
            config,
            commit_id: FIRST_COMMIT_ID.to_string(),
            tensor_meta: MetaCache::new(key),
            index_meta: MetaCache::new(key),
            chunk_id_encoder: MetaCache::new(key),
            tiles: MetaCache::new(key),
            open_chunk: None,
            read_cache: RwLock::new(HashMap::new()),
            data_cachable: true,
        }
    }

    /// Stop keeping fetched chunk bytes in memory
    pub(crate) fn without_data_cache(mut self) -> Self {
        self.data_cachable = false;
        self
    }

    /// Declare the tensor's settings; fails once samples exist
    pub fn create_tensor(&self, meta: TensorMeta) -> Result<()> {
        let length = self.num_samples()?;
        if length > 0 {
            return Err(Error::Config(format!(
                "tensor {} already holds {length} samples",
                self.key
            )));
        }
        debug!(tensor = %self.key, htype = ?meta.htype, dtype = ?meta.dtype, "created tensor");
        self.tensor_meta.replace(&self.commit_id, meta);
        Ok(())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn commit_id(&self) -> &str {
        &self.commit_id
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Provider holding chunk objects
    pub fn storage(&self) -> &Arc<dyn StorageProvider> {
        &self.storage
    }

    /// Provider holding metadata objects
    pub fn meta_storage(&self) -> &Arc<dyn StorageProvider> {
        &self.meta_storage
    }

    /// Whether fetched chunk bytes are kept in the engine's read cache
    pub fn is_data_cachable(&self) -> bool {
        self.data_cachable
    }

    pub fn tensor_meta(&self) -> Result<TensorMeta> {
        self.tensor_meta.get(&*self.meta_storage, &self.commit_id)
    }

    pub fn index_meta(&self) -> Result<IndexMeta> {
        self.index_meta.get(&*self.meta_storage, &self.commit_id)
    }

    pub fn chunk_id_encoder(&self) -> Result<ChunkIdEncoder> {
        self.chunk_id_encoder.get(&*self.meta_storage, &self.commit_id)
    }

    pub fn tile_registry(&self) -> Result<TileRegistry> {
        self.tiles.get(&*self.meta_storage, &self.commit_id)
    }

    pub fn num_samples(&self) -> Result<u64> {
        self.tensor_meta.read(&*self.meta_storage, &self.commit_id, |meta| meta.length)
    }

    /// Settings shared by every chunk of this tensor
    pub fn chunk_args(&self) -> Result<ChunkArgs> {
        let config = &self.config;
        self.tensor_meta.read(&*self.meta_storage, &self.commit_id, |meta| {
            ChunkArgs::from_meta(meta, config)
        })
    }

    /// Switch to another commit, flushing pending writes first
    ///
    /// Every cached metadata object and chunk is dropped; they are reloaded
    /// for the new commit on next use.
    pub fn checkout(&mut self, commit_id: &str) -> Result<()> {
        if commit_id == self.commit_id {
            return Ok(());
        }
        self.flush()?;
        self.commit_id = commit_id.to_string();
        self.tensor_meta.invalidate();
        self.index_meta.invalidate();
        self.chunk_id_encoder.invalidate();
        self.tiles.invalidate();
        self.read_cache.write().clear();
        debug!(tensor = %self.key, commit = commit_id, "checked out commit");
        Ok(())
    }

    /// Append samples in order
    ///
    /// The whole batch is serialized and checked first; a rejected sample
    /// leaves the tensor unchanged.
    pub fn extend(&mut self, samples: Vec<Sample>) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let args = self.chunk_args()?;
        let mut pending = self.serialize_batch(samples, &args)?;

        while !pending.is_empty() {
            let chunk = self
                .open_chunk
                .get_or_insert_with(|| Chunk::new(random_chunk_id(), args.clone()));
            let before = chunk.num_samples();
            let outcome = chunk.extend_if_has_space(pending)?;
            let mut rest = outcome.samples;

            if outcome.accepted > 0 {
                self.register_accepted(before, outcome.accepted as u64, args.dtype)?;
                rest.drain(..outcome.accepted);
            } else if before == 0 {
                let oversized = rest.remove(0);
                self.write_tiled(oversized, &args)?;
            } else {
                self.seal_open_chunk()?;
            }
            pending = rest;
        }
        Ok(())
    }

    fn serialize_batch(&self, samples: Vec<Sample>, args: &ChunkArgs) -> Result<Vec<Sample>> {
        let scratch;
        let serializer = match &self.open_chunk {
            Some(chunk) => chunk,
            None => {
                scratch = Chunk::new(ChunkId(0), args.clone());
                &scratch
            }
        };
        samples
            .into_iter()
            .map(|sample| {
                let serialized = serializer.serialize_sample(sample)?;
                let size = serialized.buffer.len() as u64;
                if !self.config.tiling && size > args.max_chunk_size {
                    return Err(Error::SampleTooLarge {
                        size,
                        max: args.max_chunk_size,
                    });
                }
                Ok(Sample::Serialized(serialized))
            })
            .collect()
    }

    fn register_accepted(&mut self, before: u64, accepted: u64, dtype: Dtype) -> Result<()> {
        let chunk = self
            .open_chunk
            .as_ref()
            .ok_or_else(|| Error::Storage(format!("no open chunk for {}", self.key)))?;
        let id = chunk.id();
        let entries = (before..before + accepted)
            .map(|local| chunk.index_entry(local))
            .collect::<Result<Vec<_>>>()?;

        self.record_samples(entries, dtype, |encoder| {
            if before == 0 {
                encoder.register_chunk_with_samples(id, accepted);
                Ok(())
            } else {
                encoder.register_samples(accepted)
            }
        })
    }

    fn record_samples(
        &self,
        entries: Vec<IndexEntry>,
        dtype: Dtype,
        encode: impl FnOnce(&mut ChunkIdEncoder) -> tensorchunk_core::Result<()>,
    ) -> Result<()> {
        let storage = &*self.meta_storage;
        let commit = &self.commit_id;

        self.chunk_id_encoder.write(storage, commit, encode)??;
        self.tensor_meta.write(storage, commit, |meta| -> Result<()> {
            meta.dtype.get_or_insert(dtype);
            for entry in &entries {
                meta.register_samples(entry.shape.as_deref().unwrap_or(&[]), 1)?;
            }
            Ok(())
        })??;
        self.index_meta.write(storage, commit, |index| {
            for entry in entries {
                index.add_entry(entry);
            }
        })
    }

    /// Split a sample larger than any chunk over a root chunk and its tiles
    fn write_tiled(&mut self, sample: Sample, args: &ChunkArgs) -> Result<()> {
        let serialized: SerializedSample = match sample {
            Sample::Serialized(serialized) => serialized,
            other => {
                return Err(Error::SampleKind {
                    expected: "serialized",
                    actual: other.kind(),
                })
            }
        };
        let max = args.max_chunk_size;
        if !self.config.tiling {
            return Err(Error::SampleTooLarge {
                size: serialized.buffer.len() as u64,
                max,
            });
        }

        let root = match self.open_chunk.take() {
            Some(chunk) => chunk.id(),
            None => random_chunk_id(),
        };
        let fragments: Vec<&[u8]> = serialized.buffer.chunks(max.max(1) as usize).collect();
        let count = fragments.len();
        let mut ids = Vec::with_capacity(count);
        let mut tiles = Vec::with_capacity(count.saturating_sub(1));

        for (i, fragment) in fragments.iter().enumerate() {
            let id = if i == 0 {
                root
            } else {
                let tile_shape = vec![i, count];
                let id = derive_tile_chunk_id(root, &tile_shape);
                tiles.push((id, tile_shape));
                id
            };
            self.put_chunk(id, fragment, args)?;
            ids.push(id);
        }

        let entry = IndexEntry {
            chunk_names: ids.iter().map(|id| chunk_name_from_id(*id)).collect(),
            start_byte: 0,
            end_byte: fragments.last().map(|f| f.len() as u64).unwrap_or(0),
            shape: Some(serialized.shape.clone()),
            compression: serialized.compression,
        };
        let tile_ids: Vec<ChunkId> = ids[1..].to_vec();
        self.record_samples(vec![entry], args.dtype, |encoder| {
            encoder.register_chunk_with_samples(root, 1);
            for id in tile_ids {
                encoder.register_tile_chunk(id)?;
            }
            Ok(())
        })?;
        self.tiles.write(&*self.meta_storage, &self.commit_id, |registry| {
            for (id, tile_shape) in tiles {
                registry.register(id, root, tile_shape);
            }
        })?;

        debug!(
            tensor = %self.key,
            root = %root,
            tiles = count,
            bytes = serialized.buffer.len(),
            "tiled oversized sample"
        );
        Ok(())
    }

    /// Store a chunk payload, compressing it for chunk-compressed tensors
    fn put_chunk(&self, id: ChunkId, payload: &[u8], args: &ChunkArgs) -> Result<()> {
        let key = chunk_key(&self.key, id);
        match args.chunk_compression {
            Some(compression) => self.storage.put(&key, &compression.compress_bytes(payload)?)?,
            None => self.storage.put(&key, payload)?,
        }
        self.read_cache.write().remove(&id);
        Ok(())
    }

    /// Overwrite a sealed chunk with a new uncompressed payload
    pub(crate) fn rewrite_chunk(&self, id: ChunkId, payload: &[u8], args: &ChunkArgs) -> Result<()> {
        self.read_cache.write().remove(&id);
        self.put_chunk(id, payload, args)
    }

    pub(crate) fn delete_chunk(&self, id: ChunkId) -> Result<()> {
        self.read_cache.write().remove(&id);
        self.storage.delete(&chunk_key(&self.key, id))
    }

    fn seal_open_chunk(&mut self) -> Result<()> {
        let Some(chunk) = self.open_chunk.take() else {
            return Ok(());
        };
        if chunk.num_samples() == 0 {
            return Ok(());
        }
        let stored = chunk.to_stored_bytes()?;
        self.storage.put(&chunk_key(&self.key, chunk.id()), &stored)?;
        debug!(
            tensor = %self.key,
            chunk = %chunk.id(),
            samples = chunk.num_samples(),
            bytes = stored.len(),
            "sealed chunk"
        );
        if self.data_cachable {
            let payload = StoredBytes::from(chunk.chunk_data().data.clone());
            self.read_cache.write().insert(chunk.id(), payload);
        }
        Ok(())
    }

    /// Seal the open chunk and persist every changed metadata object
    pub fn flush(&mut self) -> Result<()> {
        self.seal_open_chunk()?;
        let storage = &*self.meta_storage;
        self.tensor_meta.flush(storage)?;
        self.index_meta.flush(storage)?;
        self.chunk_id_encoder.flush(storage)?;
        self.tiles.flush(storage)?;
        Ok(())
    }

    pub(crate) fn replace_tensor_meta(&self, meta: TensorMeta) {
        self.tensor_meta.replace(&self.commit_id, meta);
    }

    pub(crate) fn replace_index_meta(&self, index: IndexMeta) {
        self.index_meta.replace(&self.commit_id, index);
    }

    pub(crate) fn replace_chunk_id_encoder(&self, encoder: ChunkIdEncoder) {
        self.chunk_id_encoder.replace(&self.commit_id, encoder);
    }

    pub(crate) fn replace_tile_registry(&self, registry: TileRegistry) {
        self.tiles.replace(&self.commit_id, registry);
    }

    fn check_index(&self, index: u64) -> Result<()> {
        let length = self.num_samples()?;
        if index >= length {
            return Err(Error::IndexOutOfBounds { index, length });
        }
        Ok(())
    }

    /// Chunk ids holding a sample and its index inside the first of them
    fn locate(&self, global_index: u64) -> Result<(Vec<ChunkId>, u64)> {
        let located = self.chunk_id_encoder.read(&*self.meta_storage, &self.commit_id, |encoder| {
            encoder
                .chunk_ids_for(global_index)
                .and_then(|ids| Ok((ids, encoder.local_index(global_index)?)))
        })??;
        Ok(located)
    }

    fn open_chunk_holding(&self, ids: &[ChunkId]) -> Option<&Chunk> {
        match (ids, &self.open_chunk) {
            ([id], Some(chunk)) if chunk.id() == *id => Some(chunk),
            _ => None,
        }
    }

    /// Uncompressed payload of a sealed chunk
    pub fn chunk_payload(&self, id: ChunkId) -> Result<StoredBytes> {
        self.chunk_payload_with(id, &self.chunk_args()?)
    }

    /// Payload of chunk `id` stored with the compression in `args`
    pub(crate) fn chunk_payload_with(&self, id: ChunkId, args: &ChunkArgs) -> Result<StoredBytes> {
        if let Some(bytes) = self.read_cache.read().get(&id) {
            return Ok(bytes.clone());
        }
        let stored = self.storage.get(&chunk_key(&self.key, id))?;
        let payload = match args.chunk_compression {
            Some(compression) => StoredBytes::from(compression.decompress_bytes(&stored)?),
            None => stored,
        };
        if self.data_cachable {
            self.read_cache.write().insert(id, payload.clone());
        }
        Ok(payload)
    }

    /// Decode the sample at `global_index`
    ///
    /// With `cast` the value is converted to the tensor dtype; otherwise
    /// compressed samples come back in the dtype they were stored with.
    pub fn read_sample(&self, global_index: u64, cast: bool) -> Result<SampleValue> {
        self.check_index(global_index)?;
        let (ids, local) = self.locate(global_index)?;
        if let Some(chunk) = self.open_chunk_holding(&ids) {
            return chunk.read_sample(local, cast);
        }

        let entry = self
            .index_meta
            .read(&*self.meta_storage, &self.commit_id, |index| index.get(global_index).cloned())??;
        let expected: Vec<String> = ids.iter().map(|id| chunk_name_from_id(*id)).collect();
        if entry.chunk_names != expected {
            return Err(Error::CorruptedIndex(format!(
                "sample {global_index} lists chunks {:?}, encoder has {:?}",
                entry.chunk_names, expected
            )));
        }

        let chunks = ids
            .iter()
            .map(|id| self.chunk_payload(*id))
            .collect::<Result<Vec<_>>>()?;
        sample_from_index_entry(&entry, &chunks, &self.chunk_args()?, cast)
    }

    /// Decode one sample and apply the per-sample part of an index
    pub fn get_basic_sample(&self, global_index: u64, sub_index: &[DimIndex]) -> Result<SampleValue> {
        let value = self.read_sample(global_index, true)?;
        apply_sub_index(value, sub_index)
    }

    /// Samples selected by `index`, stacked along a leading axis unless the
    /// index picks a single sample
    pub fn numpy(&self, index: &Index) -> Result<SampleArray> {
        let indices = index.sample_indices(self.num_samples()?)?;
        let sub_index = index.sub_index();
        let mut arrays = indices
            .iter()
            .map(|i| self.get_basic_sample(*i, sub_index)?.into_array())
            .collect::<Result<Vec<_>>>()?;

        if index.is_single_sample() {
            if let Some(array) = arrays.pop() {
                return Ok(array);
            }
        }
        SampleArray::stack(&arrays)
    }

    /// Replace the sample at `global_index`
    ///
    /// Samples in sealed sample-compressed chunks and tiled samples cannot be
    /// rewritten. Raw chunks are loaded, patched and written back.
    pub fn update(&mut self, global_index: u64, sample: Sample) -> Result<()> {
        self.check_index(global_index)?;
        let (ids, local) = self.locate(global_index)?;
        let &[id] = ids.as_slice() else {
            return Err(Error::UnsupportedUpdate("tiled samples cannot be updated in place"));
        };
        let first = global_index - local;

        let (entries, shape) = match self.open_chunk.as_mut().filter(|chunk| chunk.id() == id) {
            Some(chunk) => {
                chunk.update_sample(local, sample)?;
                let entries = (local..chunk.num_samples())
                    .map(|j| chunk.index_entry(j))
                    .collect::<Result<Vec<_>>>()?;
                (entries, chunk.shape(local)?)
            }
            None => self.update_sealed(id, first, local, sample)?,
        };

        let storage = &*self.meta_storage;
        self.index_meta.write(storage, &self.commit_id, |index| -> Result<()> {
            for (offset, entry) in entries.into_iter().enumerate() {
                *index.get_mut(global_index + offset as u64)? = entry;
            }
            Ok(())
        })??;
        self.tensor_meta
            .write(storage, &self.commit_id, |meta| meta.update_shape_interval(&shape))??;
        Ok(())
    }

    fn update_sealed(
        &self,
        id: ChunkId,
        first: u64,
        local: u64,
        sample: Sample,
    ) -> Result<(Vec<IndexEntry>, Vec<usize>)> {
        let args = self.chunk_args()?;
        if args.sample_compression.is_some() {
            return Err(Error::UnsupportedUpdate(
                "samples in sealed sample-compressed chunks cannot be rewritten",
            ));
        }

        let count = self.chunk_id_encoder.read(&*self.meta_storage, &self.commit_id, |encoder| {
            encoder
                .row_of(first)
                .and_then(|row| encoder.samples_in_row(row))
        })??;
        let entries = self.index_meta.read(&*self.meta_storage, &self.commit_id, |index| {
            (first..first + count)
                .map(|i| index.get(i).cloned())
                .collect::<Result<Vec<_>>>()
        })??;

        let payload = self.chunk_payload(id)?;
        let data = ChunkData::from_entries(id, args.clone(), payload.to_vec(), &entries)?;
        let mut chunk = Chunk::from_data(data);
        chunk.update_sample(local, sample)?;
        self.put_chunk(id, &chunk.chunk_data().data, &args)?;
        debug!(tensor = %self.key, chunk = %id, local, "rewrote sealed chunk");

        let entries = (local..count)
            .map(|j| chunk.index_entry(j))
            .collect::<Result<Vec<_>>>()?;
        Ok((entries, chunk.shape(local)?))
    }
}

/// Apply the per-sample part of an index to a decoded value
pub fn apply_sub_index(value: SampleValue, sub_index: &[DimIndex]) -> Result<SampleValue> {
    if sub_index.is_empty() {
        return Ok(value);
    }
    match value {
        SampleValue::Array(array) => Ok(SampleValue::Array(array.select(sub_index)?)),
        SampleValue::Text(_) => Err(Error::SampleKind {
            expected: "array",
            actual: "text",
        }),
        SampleValue::Json(_) => Err(Error::SampleKind {
            expected: "array",
            actual: "json",
        }),
    }
}

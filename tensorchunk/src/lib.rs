//! tensorchunk - chunk storage engine for tensor datasets
//!
//! Samples of a tensor are serialized into append-only chunks of bounded size
//! and stored under random identifiers in a key-value storage provider. A
//! per-tensor chunk id encoder maps every global sample index to the chunks
//! holding it, so a read touches only the chunks it needs.
//!
//! ## Architecture
//!
//! - **tensorchunk-core**: dtypes, chunk identifiers, run-length encoders and
//!   their binary layout (no I/O)
//! - **tensorchunk**: chunks, codecs, storage providers, metadata caches,
//!   engines, distributed merge and the transform driver
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tensorchunk::{ChunkConfig, ChunkEngine, Dtype, Htype, MemoryProvider, SampleArray, TensorMeta};
//!
//! fn example() -> tensorchunk::Result<()> {
//!     let storage = Arc::new(MemoryProvider::new());
//!     let mut engine = ChunkEngine::new("images", storage, ChunkConfig::default());
//!     engine.create_tensor(TensorMeta::new(Htype::Generic, Dtype::U8))?;
//!
//!     let sample = SampleArray::from_slice(&[2, 2], &[1u8, 2, 3, 4])?;
//!     engine.extend(vec![sample.into()])?;
//!     engine.flush()?;
//!
//!     let value = engine.read_sample(0, true)?;
//!     println!("{:?}", value.as_array().map(|a| a.shape().to_vec()));
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Chunk strategies**: uncompressed, sample-compressed and
//!   chunk-compressed tensors (`lz4`, `zstd`, `npy`)
//! - **Tiling**: samples larger than a chunk span a root chunk and tiles
//! - **Linked tensors**: samples that reference external objects, with
//!   per-sample credentials and windowed video decode
//! - **Distributed merge**: per-worker outputs folded into one tensor with
//!   boundary chunks coalesced
//! - **Storage**: in-memory, local filesystem (memory-mapped reads with the
//!   `mmap` feature) and read-only HTTP (`http` feature)

pub use tensorchunk_core::{chunk_id_from_name, chunk_name_from_id, ChunkId, ChunkIdEncoder, CredsEncoder, Dtype};

pub mod array;
pub mod chunk;
pub mod compression;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod keys;
pub mod linked;
pub mod merge;
pub mod meta;
pub mod sample;
pub mod storage;
pub mod transform;

pub use array::SampleArray;
pub use chunk::{Chunk, ChunkArgs};
pub use compression::Compression;
pub use config::ChunkConfig;
pub use engine::{random_chunk_id, ChunkEngine};
pub use error::{Error, Result};
pub use index::{DimIndex, Index};
pub use linked::{LinkCreds, LinkedChunkEngine, MediaDecoder, NpyDecoder, ProviderFactory};
pub use merge::{merge_into, merge_linked_into, MergeSummary, WorkerOutput};
pub use meta::{Htype, IndexEntry, IndexMeta, LoadOutcome, TensorMeta, TileRegistry};
pub use sample::{LinkedSample, Sample, SampleValue};
pub use storage::{LocalProvider, MemoryProvider, StorageProvider};
#[cfg(feature = "http")]
pub use storage::HttpProvider;
pub use transform::{Output, Transform};

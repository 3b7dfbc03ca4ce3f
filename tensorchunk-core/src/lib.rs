#![cfg_attr(not(test), no_std)]

//! tensorchunk core - chunk layout definitions for tensor storage
//!
//! This crate provides the pure, I/O-free parts of the chunk storage engine:
//! dtypes, the chunk identifier scheme, the run-length encoders that map
//! samples to byte ranges, shapes, chunks and credentials, and the binary
//! layout those encoders persist in.

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod chunk_id;
pub mod dtype;
#[cfg(feature = "alloc")]
pub mod encode;
pub mod error;
pub mod format;
pub mod validation;

pub use chunk_id::{chunk_id_from_name, chunk_uuid_from_id, is_tile_chunk_id, ChunkId};
#[cfg(feature = "alloc")]
pub use chunk_id::{canonical_shape, chunk_name_from_id, derive_tile_chunk_id, derive_tile_shape};
pub use dtype::{Dtype, Element};
#[cfg(feature = "alloc")]
pub use encode::{BytePositionsEncoder, ChunkIdEncoder, CredsEncoder, ShapesEncoder, NO_CREDS};
pub use error::*;

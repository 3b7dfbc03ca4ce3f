//! Chunk identifier scheme
//!
//! A chunk id is the upper 64 bits of a random 128-bit UUID. Its name, the
//! last component of the chunk's storage key, is the lowercase hex of the id
//! with no prefix and no zero padding.
//!
//! Tile chunks, which hold fragments of one oversized sample, get ids derived
//! deterministically from their root chunk id and a tile shape through a
//! name-based (v5) UUID, so independent writers converge on the same names.
//! The derivation is one-way: recovering the root or the tile shape from a bare
//! id is not possible and fails loudly. Callers that need detection keep a side
//! table from tile id to `(root, tile shape)`.

#[cfg(feature = "alloc")]
use alloc::{string::String, vec::Vec};

use crate::{FormatError, Result};
use uuid::Uuid;

/// Number of bits dropped from a UUID to fit a chunk id
pub const UUID_SHIFT_AMOUNT: u32 = 64;

/// Maximum length of a chunk name in hex digits
pub const MAX_CHUNK_NAME_LEN: usize = 16;

/// Identifier of a chunk, used as its storage key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ChunkId(pub u64);

impl ChunkId {
    /// Truncate a UUID to a chunk id
    pub fn from_uuid(uuid: Uuid) -> Self {
        ChunkId((uuid.as_u128() >> UUID_SHIFT_AMOUNT) as u64)
    }

    /// Raw integer value
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl From<u64> for ChunkId {
    fn from(value: u64) -> Self {
        ChunkId(value)
    }
}

/// Returns the hex of `id` with no prefix; this is the chunk's name.
#[cfg(feature = "alloc")]
pub fn chunk_name_from_id(id: ChunkId) -> String {
    alloc::format!("{id}")
}

/// Parses a name produced by [`chunk_name_from_id`] back into an id
pub fn chunk_id_from_name(name: &str) -> Result<ChunkId> {
    if name.is_empty() || name.len() > MAX_CHUNK_NAME_LEN {
        return Err(FormatError::InvalidChunkName);
    }
    if !name.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(FormatError::InvalidChunkName);
    }
    u64::from_str_radix(name, 16)
        .map(ChunkId)
        .map_err(|_| FormatError::InvalidChunkName)
}

/// Rebuild the 128-bit value a chunk id was truncated from
///
/// Equivalent to left-padding the name to 16 hex digits and appending 16 zero
/// digits before parsing it as a UUID.
pub const fn chunk_uuid_from_id(id: ChunkId) -> Uuid {
    Uuid::from_u128((id.0 as u128) << UUID_SHIFT_AMOUNT)
}

/// Render a tile shape the canonical way: `(a, b)`, `(a,)` or `()`
#[cfg(feature = "alloc")]
pub fn canonical_shape(shape: &[usize]) -> String {
    use core::fmt::Write;

    let mut out = String::from("(");
    for (i, dim) in shape.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{dim}");
    }
    if shape.len() == 1 {
        out.push(',');
    }
    out.push(')');
    out
}

/// Derive the id of a tile chunk from its root chunk and tile shape
///
/// The root's UUID is the namespace and the canonical tile shape the name.
#[cfg(feature = "alloc")]
pub fn derive_tile_chunk_id(root_chunk_id: ChunkId, tile_shape: &[usize]) -> ChunkId {
    let namespace = chunk_uuid_from_id(root_chunk_id);
    let name = canonical_shape(tile_shape);
    ChunkId::from_uuid(Uuid::new_v5(&namespace, name.as_bytes()))
}

/// Whether `id` names a tile chunk. Not recoverable from the id alone.
pub fn is_tile_chunk_id(_id: ChunkId) -> Result<bool> {
    Err(FormatError::NotImplemented)
}

/// Tile shape encoded in a tile chunk id. Not recoverable from the id alone.
#[cfg(feature = "alloc")]
pub fn derive_tile_shape(_id: ChunkId) -> Result<Vec<usize>> {
    Err(FormatError::NotImplemented)
}

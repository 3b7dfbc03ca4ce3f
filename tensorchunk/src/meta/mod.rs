//! Metadata objects and their commit-scoped cache

pub mod cache;
pub mod index_meta;
pub mod tensor_meta;
pub mod tiles;

pub use cache::{LoadOutcome, MetaCache};
pub use index_meta::{IndexEntry, IndexMeta};
pub use tensor_meta::{Htype, TensorMeta};
pub use tiles::TileRegistry;

use tensorchunk_core::{ChunkIdEncoder, CredsEncoder};

use crate::error::Result;
use crate::keys;

/// An object persisted under `<tensor>/<ARTIFACT>` for each commit
pub trait MetaObject: Clone + Default + Send + Sync + 'static {
    const ARTIFACT: &'static str;

    fn to_bytes(&self) -> Result<Vec<u8>>;

    fn from_bytes(bytes: &[u8]) -> Result<Self>;
}

macro_rules! json_meta_object {
    ($ty:ty, $artifact:expr) => {
        impl MetaObject for $ty {
            const ARTIFACT: &'static str = $artifact;

            fn to_bytes(&self) -> Result<Vec<u8>> {
                Ok(serde_json::to_vec(self)?)
            }

            fn from_bytes(bytes: &[u8]) -> Result<Self> {
                Ok(serde_json::from_slice(bytes)?)
            }
        }
    };
}

json_meta_object!(TensorMeta, keys::TENSOR_META_FILENAME);
json_meta_object!(IndexMeta, keys::INDEX_META_FILENAME);
json_meta_object!(TileRegistry, keys::TILE_REGISTRY_FILENAME);

impl MetaObject for ChunkIdEncoder {
    const ARTIFACT: &'static str = keys::CHUNK_ID_ENCODER_FILENAME;

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(ChunkIdEncoder::to_bytes(self))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(ChunkIdEncoder::from_bytes(bytes)?)
    }
}

impl MetaObject for CredsEncoder {
    const ARTIFACT: &'static str = keys::CREDS_ENCODER_FILENAME;

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(CredsEncoder::to_bytes(self))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(CredsEncoder::from_bytes(bytes)?)
    }
}

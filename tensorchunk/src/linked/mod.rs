//! Linked tensors: samples that reference externally stored objects

mod link_creds;
mod linked_chunk_engine;
mod media;

pub use link_creds::{Creds, LinkCreds, ProviderFactory, ProviderFamily};
pub use linked_chunk_engine::LinkedChunkEngine;
pub use media::{MediaDecoder, NpyDecoder};

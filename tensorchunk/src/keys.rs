//! Storage key layout
//!
//! Chunks live at `<tensor>/chunks/<name>`. Metadata for the first commit
//! lives at `<tensor>/<artifact>`; later commits nest it under
//! `versions/<commit>/`.

use tensorchunk_core::{chunk_name_from_id, ChunkId};

/// Commit id of the initial version of every dataset
pub const FIRST_COMMIT_ID: &str = "firstdbf9474d461a19e9333c2fd19b46115348f";

pub const TENSOR_META_FILENAME: &str = "tensor_meta.json";
pub const INDEX_META_FILENAME: &str = "index_meta.json";
pub const CHUNK_ID_ENCODER_FILENAME: &str = "chunks_index/unsharded";
pub const CREDS_ENCODER_FILENAME: &str = "creds_index/creds";
pub const TILE_REGISTRY_FILENAME: &str = "tile_index.json";

const CHUNKS_FOLDER: &str = "chunks";
const VERSIONS_FOLDER: &str = "versions";

/// Key of a chunk object
pub fn chunk_key(tensor_key: &str, id: ChunkId) -> String {
    chunk_key_from_name(tensor_key, &chunk_name_from_id(id))
}

pub fn chunk_key_from_name(tensor_key: &str, name: &str) -> String {
    format!("{tensor_key}/{CHUNKS_FOLDER}/{name}")
}

/// Key of a metadata artifact under a commit
pub fn meta_key(tensor_key: &str, commit_id: &str, artifact: &str) -> String {
    if commit_id == FIRST_COMMIT_ID {
        format!("{tensor_key}/{artifact}")
    } else {
        format!("{VERSIONS_FOLDER}/{commit_id}/{tensor_key}/{artifact}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys() {
        assert_eq!(chunk_key("images", ChunkId(0xbeef)), "images/chunks/beef");
        assert_eq!(
            meta_key("images", FIRST_COMMIT_ID, TENSOR_META_FILENAME),
            "images/tensor_meta.json"
        );
        assert_eq!(
            meta_key("images", "abc", CHUNK_ID_ENCODER_FILENAME),
            "versions/abc/images/chunks_index/unsharded"
        );
    }
}

//! Side table recording which chunks are tiles of an oversized sample
//!
//! Tile chunk ids are one-way derivations of their root id, so detection
//! needs this table.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tensorchunk_core::ChunkId;

/// Persisted form of one registry row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRecord {
    pub id: ChunkId,
    pub root: ChunkId,
    pub tile_shape: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<TileRecord>", into = "Vec<TileRecord>")]
pub struct TileRegistry {
    tiles: HashMap<ChunkId, (ChunkId, Vec<usize>)>,
}

impl TileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Record `id` as the tile of `root` at `tile_shape`
    pub fn register(&mut self, id: ChunkId, root: ChunkId, tile_shape: Vec<usize>) {
        self.tiles.insert(id, (root, tile_shape));
    }

    pub fn is_tile(&self, id: ChunkId) -> bool {
        self.tiles.contains_key(&id)
    }

    pub fn tile_shape(&self, id: ChunkId) -> Option<&[usize]> {
        self.tiles.get(&id).map(|(_, shape)| shape.as_slice())
    }

    pub fn root_of(&self, id: ChunkId) -> Option<ChunkId> {
        self.tiles.get(&id).map(|(root, _)| *root)
    }

    /// Union with another registry
    pub fn merge(&mut self, other: &TileRegistry) {
        for (id, entry) in &other.tiles {
            self.tiles.insert(*id, entry.clone());
        }
    }
}

impl From<Vec<TileRecord>> for TileRegistry {
    fn from(records: Vec<TileRecord>) -> Self {
        Self {
            tiles: records
                .into_iter()
                .map(|r| (r.id, (r.root, r.tile_shape)))
                .collect(),
        }
    }
}

impl From<TileRegistry> for Vec<TileRecord> {
    fn from(registry: TileRegistry) -> Self {
        let mut records: Vec<TileRecord> = registry
            .tiles
            .into_iter()
            .map(|(id, (root, tile_shape))| TileRecord {
                id,
                root,
                tile_shape,
            })
            .collect();
        records.sort_by_key(|r| r.id);
        records
    }
}

//! Tile Log
//!
//! RFC 6962 Merkle tree materialised as C2SP tlog-tiles on top of a
//! [`crate::blob::BlobStore`]. Entry tiles hold the leaf hashes
//! themselves; hash tiles at levels 1+ are built lazily as entry tiles
//! (and lower hash tiles) fill, per §4.D's append algorithm.
//!
//! Internal storage always addresses a tile by its canonical full-tile
//! key (`path::entry_tile_path(index, None)` / `path::hash_tile_path`);
//! the `.p/<W>` partial-width suffix from §4.D is a presentational
//! convention for external tile serving, reconstructed on demand by
//! truncating the canonical bytes rather than being a distinct storage
//! key (Design Note "one key per tile, partial width is a view").

pub mod hashing;
pub mod path;

use std::sync::Arc;

use crate::blob::{BlobResult, BlobStore};

/// Number of leaves per tile level (C2SP tlog-tiles).
pub const TILE_WIDTH: usize = 256;

/// RFC 6962 Merkle tree backed by tile storage in a [`BlobStore`].
pub struct TileLog {
    blob: Arc<dyn BlobStore>,
}

impl TileLog {
    pub fn new(blob: Arc<dyn BlobStore>) -> Self {
        Self { blob }
    }

    /// The canonical entry-tile key and within-tile offset for `entry_id`.
    pub fn entry_tile_key_for(entry_id: u64) -> (String, u32) {
        let tile_index = entry_id >> 8;
        let offset = (entry_id & 0xFF) as u32;
        (path::entry_tile_path(tile_index, None), offset)
    }

    /// Append `leaf_hash` at `entry_id` (must equal the current tree size).
    /// Writes the rightmost entry tile and, when that tile becomes full,
    /// recursively promotes its combined hash into the next level.
    pub async fn append_leaf(&self, entry_id: u64, leaf_hash: [u8; 32]) -> BlobResult<()> {
        let tile_index = entry_id >> 8;
        let offset = (entry_id & 0xFF) as usize;
        self.write_entry_at_offset(0, tile_index, offset, &leaf_hash)
            .await?;

        if offset == TILE_WIDTH - 1 {
            self.promote_full_tile(0, tile_index).await?;
        }
        Ok(())
    }

    /// Read-modify-write a single 32-byte entry into the tile at
    /// `(level, tile_index)`, offset `offset`.
    async fn write_entry_at_offset(
        &self,
        level: u32,
        tile_index: u64,
        offset: usize,
        hash: &[u8; 32],
    ) -> BlobResult<()> {
        let key = Self::canonical_key(level, tile_index);
        let mut bytes = self.blob.get(&key).await?.unwrap_or_default();
        let needed = (offset + 1) * 32;
        if bytes.len() < needed {
            bytes.resize(needed, 0);
        }
        bytes[offset * 32..offset * 32 + 32].copy_from_slice(hash);
        self.blob.put(&key, bytes).await
    }

    fn canonical_key(level: u32, tile_index: u64) -> String {
        if level == 0 {
            path::entry_tile_path(tile_index, None)
        } else {
            path::hash_tile_path(level, tile_index, None)
        }
    }

    /// Combine a just-completed full tile's 256 entries into one hash and
    /// append it as a single entry at the next level up, recursing if that
    /// causes the parent tile to fill in turn.
    async fn promote_full_tile(&self, level: u32, tile_index: u64) -> BlobResult<()> {
        let entries = self.read_full_tile(level, tile_index).await?;
        let combined = hashing::mth_from_leaf_hashes(&entries);

        let parent_level = level + 1;
        let parent_offset = (tile_index & 0xFF) as usize;
        let parent_tile_index = tile_index >> 8;

        self.write_entry_at_offset(parent_level, parent_tile_index, parent_offset, &combined)
            .await?;

        if parent_offset == TILE_WIDTH - 1 {
            Box::pin(self.promote_full_tile(parent_level, parent_tile_index)).await?;
        }
        Ok(())
    }

    /// Read a full (256-entry) tile's 32-byte entries.
    async fn read_full_tile(&self, level: u32, tile_index: u64) -> BlobResult<Vec<[u8; 32]>> {
        let key = Self::canonical_key(level, tile_index);
        let bytes = self.blob.get(&key).await?.unwrap_or_default();
        Ok(bytes
            .chunks_exact(32)
            .map(|c| {
                let mut a = [0u8; 32];
                a.copy_from_slice(c);
                a
            })
            .collect())
    }

    /// Read a single leaf hash by `entry_id`, or `None` if not yet written.
    pub async fn get_leaf_hash(&self, entry_id: u64) -> BlobResult<Option<[u8; 32]>> {
        let tile_index = entry_id >> 8;
        let offset = (entry_id & 0xFF) as usize;
        let key = path::entry_tile_path(tile_index, None);
        let Some(bytes) = self.blob.get(&key).await? else {
            return Ok(None);
        };
        if bytes.len() < (offset + 1) * 32 {
            return Ok(None);
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes[offset * 32..offset * 32 + 32]);
        Ok(Some(out))
    }

    /// All leaf hashes for entries `[0, tree_size)`, read from entry tiles.
    /// This is the "incremental from stored tiles" production root path;
    /// the audit/recomputation path instead sources statement hashes from
    /// the metadata store (`hashing::mth_from_statement_hashes`).
    pub async fn leaf_hashes_upto(&self, tree_size: u64) -> BlobResult<Vec<[u8; 32]>> {
        if tree_size == 0 {
            return Ok(Vec::new());
        }

        let full_tiles = tree_size >> 8;
        let remainder = (tree_size & 0xFF) as usize;
        let mut leaves = Vec::with_capacity(tree_size as usize);

        for t in 0..full_tiles {
            leaves.extend(self.read_full_tile(0, t).await?);
        }

        if remainder > 0 {
            let key = path::entry_tile_path(full_tiles, None);
            let bytes = self.blob.get(&key).await?.unwrap_or_default();
            for chunk in bytes.chunks(32).take(remainder) {
                let mut a = [0u8; 32];
                a.copy_from_slice(chunk);
                leaves.push(a);
            }
        }

        Ok(leaves)
    }

    /// The Merkle root for tree size `tree_size`, computed incrementally
    /// from stored tiles.
    pub async fn root_at(&self, tree_size: u64) -> BlobResult<[u8; 32]> {
        let leaves = self.leaf_hashes_upto(tree_size).await?;
        Ok(hashing::mth_from_leaf_hashes(&leaves))
    }

    /// Serve raw tile bytes for external tile-serving queries, honouring
    /// the partial-width view into the canonical full-tile bytes.
    pub async fn get_tile_bytes(
        &self,
        level: Option<u32>,
        tile_index: u64,
        partial_width: Option<u8>,
    ) -> BlobResult<Option<Vec<u8>>> {
        let key = match level {
            Some(l) => Self::canonical_key(l, tile_index),
            None => path::entry_tile_path(tile_index, None),
        };
        let Some(bytes) = self.blob.get(&key).await? else {
            return Ok(None);
        };
        match partial_width {
            Some(w) => Ok(Some(bytes[..(w as usize * 32).min(bytes.len())].to_vec())),
            None => Ok(Some(bytes)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::memory::MemoryBlobStore;

    fn sample_leaf(i: u64) -> [u8; 32] {
        hashing::leaf_hash(format!("stmt-{i}").as_bytes())
    }

    #[tokio::test]
    async fn test_append_and_root_single_leaf() {
        let blob: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let log = TileLog::new(blob);
        log.append_leaf(0, sample_leaf(0)).await.unwrap();

        let root = log.root_at(1).await.unwrap();
        assert_eq!(root, sample_leaf(0));
    }

    #[tokio::test]
    async fn test_incremental_matches_recomputation() {
        let blob: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let log = TileLog::new(blob);

        let mut statement_hashes = Vec::new();
        for i in 0..37u64 {
            let stmt = format!("stmt-{i}").into_bytes();
            log.append_leaf(i, hashing::leaf_hash(&stmt)).await.unwrap();
            statement_hashes.push(stmt);
        }

        let incremental = log.root_at(37).await.unwrap();
        let recomputed = hashing::mth_from_statement_hashes(&statement_hashes);
        assert_eq!(incremental, recomputed);
    }

    #[tokio::test]
    async fn test_tile_boundary_at_256() {
        let blob: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let log = TileLog::new(blob);

        for i in 0..257u64 {
            log.append_leaf(i, sample_leaf(i)).await.unwrap();
        }

        let (key_255, _) = TileLog::entry_tile_key_for(255);
        let (key_256, _) = TileLog::entry_tile_key_for(256);
        assert_eq!(key_255, "tile/entries/000");
        assert_eq!(key_256, "tile/entries/001");

        let root = log.root_at(257).await.unwrap();
        let leaves: Vec<[u8; 32]> = (0..257).map(sample_leaf).collect();
        assert_eq!(root, hashing::mth_from_leaf_hashes(&leaves));
    }

    #[tokio::test]
    async fn test_get_leaf_hash_roundtrip() {
        let blob: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let log = TileLog::new(blob);
        log.append_leaf(3, sample_leaf(3)).await.unwrap();

        assert_eq!(log.get_leaf_hash(3).await.unwrap(), Some(sample_leaf(3)));
        assert_eq!(log.get_leaf_hash(4).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_tree_root() {
        let blob: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let log = TileLog::new(blob);
        assert_eq!(log.root_at(0).await.unwrap(), hashing::empty_root());
    }
}

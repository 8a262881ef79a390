use std::sync::Arc;

use pchaind_primitives::encoding::{decode, encode};
use pchaind_primitives::{Block, Hash256};
use pchaind_storage::{Column, KeyValueStore, StoreError, WriteBatch};

const META_BEST_BLOCK_KEY: &[u8] = b"best_block";

/// Canonical chain head: the highest canonical height and its hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainTip {
    pub height: u64,
    pub hash: Hash256,
}

/// Canonical-chain index over the store: height -> hash -> block, plus
/// the best-block pointer. Assumes a single writer per operation.
pub struct ChainIndex<S> {
    store: Arc<S>,
}

impl<S: KeyValueStore> ChainIndex<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn canonical_hash(&self, height: u64) -> Result<Option<Hash256>, StoreError> {
        let bytes = match self.store.get(Column::Canon, &height_key(height))? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        decode_hash(&bytes).map(Some).map_err(StoreError::Backend)
    }

    pub fn block_by_hash(&self, hash: &Hash256) -> Result<Option<Block>, StoreError> {
        let bytes = match self.store.get(Column::Block, hash)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        decode::<Block>(&bytes)
            .map(Some)
            .map_err(|err| StoreError::Backend(format!("stored block undecodable: {err}")))
    }

    pub fn block_by_height(&self, height: u64) -> Result<Option<Block>, StoreError> {
        let hash = match self.canonical_hash(height)? {
            Some(hash) => hash,
            None => return Ok(None),
        };
        self.block_by_hash(&hash)
    }

    pub fn best_block(&self) -> Result<Option<ChainTip>, StoreError> {
        let bytes = match self.store.get(Column::Meta, META_BEST_BLOCK_KEY)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        if bytes.len() != 40 {
            return Err(StoreError::Backend(
                "invalid best block pointer".to_string(),
            ));
        }
        let mut height = [0u8; 8];
        height.copy_from_slice(&bytes[..8]);
        let hash = decode_hash(&bytes[8..]).map_err(StoreError::Backend)?;
        Ok(Some(ChainTip {
            height: u64::from_le_bytes(height),
            hash,
        }))
    }

    /// Insert a block and make it canonical at its height, advancing the
    /// best pointer when it extends the chain.
    pub fn insert_block(&self, block: &Block) -> Result<Hash256, StoreError> {
        let hash = block.hash();
        let mut batch = WriteBatch::new();
        self.stage_block(&mut batch, block, &hash)?;
        self.store.write_batch(&batch)?;
        Ok(hash)
    }

    /// Stage a block insert on an existing batch (used by genesis setup
    /// so trie nodes and block land in one commit).
    pub fn stage_block(
        &self,
        batch: &mut WriteBatch,
        block: &Block,
        hash: &Hash256,
    ) -> Result<(), StoreError> {
        let height = block.header.height;
        batch.put(Column::Block, hash, encode(block));
        batch.put(Column::Canon, height_key(height), *hash);

        let advances = match self.best_block()? {
            Some(tip) => height >= tip.height,
            None => true,
        };
        if advances {
            let mut pointer = [0u8; 40];
            pointer[..8].copy_from_slice(&height.to_le_bytes());
            pointer[8..].copy_from_slice(hash);
            batch.put(Column::Meta, META_BEST_BLOCK_KEY, pointer);
        }
        Ok(())
    }
}

pub fn height_key(height: u64) -> [u8; 8] {
    height.to_le_bytes()
}

fn decode_hash(bytes: &[u8]) -> Result<Hash256, String> {
    if bytes.len() != 32 {
        return Err("invalid hash length".to_string());
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(bytes);
    Ok(hash)
}

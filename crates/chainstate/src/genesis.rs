use std::collections::BTreeMap;
use std::io::Read;

use primitive_types::U256;
use serde::Deserialize;

use pchaind_primitives::encoding::encode;
use pchaind_primitives::{
    address_from_hex, bytes_to_hex, AccountRecord, Block, BlockHeader, Hash256, ZERO_HASH,
};
use pchaind_storage::{KeyValueStore, StoreError, WriteBatch};
use pchaind_trie::{build_trie, empty_root_hash, TrieError};

use crate::index::ChainIndex;

/// JSON genesis description: chain parameters plus the initial account
/// allocations keyed by hex address.
#[derive(Clone, Debug, Deserialize)]
pub struct GenesisSpec {
    pub name: String,
    pub chain_id: u64,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub alloc: BTreeMap<String, GenesisAccount>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GenesisAccount {
    /// Decimal balance string; hex addresses are case-insensitive.
    pub balance: String,
    #[serde(default)]
    pub nonce: u64,
}

impl GenesisSpec {
    pub fn from_json(reader: impl Read) -> Result<Self, GenesisError> {
        serde_json::from_reader(reader).map_err(|err| GenesisError::Spec(err.to_string()))
    }
}

#[derive(Debug)]
pub enum GenesisError {
    Spec(String),
    Store(StoreError),
    Trie(TrieError),
    /// A different genesis is already present in this database.
    Mismatch { stored: Hash256, computed: Hash256 },
}

impl std::fmt::Display for GenesisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenesisError::Spec(message) => write!(f, "invalid genesis spec: {message}"),
            GenesisError::Store(err) => write!(f, "{err}"),
            GenesisError::Trie(err) => write!(f, "{err}"),
            GenesisError::Mismatch { stored, computed } => write!(
                f,
                "database already holds genesis {} (spec computes {})",
                bytes_to_hex(stored),
                bytes_to_hex(computed)
            ),
        }
    }
}

impl std::error::Error for GenesisError {}

impl From<StoreError> for GenesisError {
    fn from(err: StoreError) -> Self {
        GenesisError::Store(err)
    }
}

impl From<TrieError> for GenesisError {
    fn from(err: TrieError) -> Self {
        GenesisError::Trie(err)
    }
}

/// Compute the genesis block for `spec` and write it, with its state
/// trie, into the store behind `index`. Idempotent: a database already
/// initialized from the same spec returns the same hash without writing;
/// a database initialized from a different genesis is a hard mismatch.
pub fn setup_genesis<S: KeyValueStore>(
    index: &ChainIndex<S>,
    spec: &GenesisSpec,
) -> Result<Hash256, GenesisError> {
    let mut batch = WriteBatch::new();
    let state_root = build_state_trie(&mut batch, spec)?;

    let block = Block {
        header: BlockHeader {
            height: 0,
            parent_hash: ZERO_HASH,
            state_root,
            tx_root: Block::compute_tx_root(&[]),
            time: spec.timestamp,
        },
        transactions: Vec::new(),
    };
    let computed = block.hash();

    if let Some(stored) = index.canonical_hash(0)? {
        if stored == computed {
            return Ok(computed);
        }
        return Err(GenesisError::Mismatch { stored, computed });
    }

    index.stage_block(&mut batch, &block, &computed)?;
    index.store().write_batch(&batch)?;
    Ok(computed)
}

fn build_state_trie(
    batch: &mut WriteBatch,
    spec: &GenesisSpec,
) -> Result<Hash256, GenesisError> {
    let mut entries = Vec::with_capacity(spec.alloc.len());
    for (raw_address, account) in &spec.alloc {
        let address = address_from_hex(raw_address)
            .map_err(|err| GenesisError::Spec(format!("alloc address {raw_address:?}: {err}")))?;
        let balance = U256::from_dec_str(&account.balance)
            .map_err(|err| GenesisError::Spec(format!("alloc balance for {raw_address:?}: {err}")))?;
        let record = AccountRecord {
            nonce: account.nonce,
            balance,
            storage_root: empty_root_hash(),
            tx1_root: empty_root_hash(),
            tx3_root: empty_root_hash(),
            proxied_root: empty_root_hash(),
            reward_root: empty_root_hash(),
        };
        entries.push((address.to_vec(), encode(&record)));
    }
    Ok(build_trie(batch, entries)?)
}
